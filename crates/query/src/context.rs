// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use memrel_db::{Database, DatabaseConfig, DbCounters};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// Carried through selection construction in place of any global state: planner configuration,
/// observability counters, and a source of statement-unique keys.
#[derive(Clone)]
pub struct BuildContext {
    config: Arc<DatabaseConfig>,
    counters: Arc<DbCounters>,
    next_key: Rc<Cell<u64>>,
}

impl BuildContext {
    pub fn new(db: &Database) -> Self {
        Self::with_config(db.config().clone(), db.counters().clone())
    }

    pub fn with_config(config: DatabaseConfig, counters: Arc<DbCounters>) -> Self {
        Self {
            config: Arc::new(config),
            counters,
            next_key: Rc::new(Cell::new(0)),
        }
    }

    pub fn config(&self) -> &Arc<DatabaseConfig> {
        &self.config
    }

    pub fn counters(&self) -> &Arc<DbCounters> {
        &self.counters
    }

    /// A key unique among everything built from this context, e.g. for transient memoization.
    pub fn unique_key(&self, prefix: &str) -> String {
        let n = self.next_key.get();
        self.next_key.set(n + 1);
        format!("{prefix}#{n}")
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("config", &self.config)
            .finish()
    }
}
