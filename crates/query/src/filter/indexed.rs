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

use crate::derived_index::RestrictiveIndex;
use crate::selection::{ColumnInfo, IndexSource, Plan, Probe, RowStream, Selection};
use memrel_db::{DatabaseConfig, Error, Expr, Row, Transaction};
use memrel_var::Value;
use std::sync::Arc;

/// Serves a single-key predicate with one traversal of a source index.
#[derive(Debug)]
pub struct IndexFilter {
    source: Arc<dyn Selection>,
    predicate: Expr,
    index: Arc<dyn IndexSource>,
    probe: Probe,
    config: Arc<DatabaseConfig>,
}

impl IndexFilter {
    pub fn new(
        source: Arc<dyn Selection>,
        predicate: Expr,
        index: Arc<dyn IndexSource>,
        probe: Probe,
        config: Arc<DatabaseConfig>,
    ) -> Self {
        Self {
            source,
            predicate,
            index,
            probe,
            config,
        }
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    fn count(&self, t: &Transaction, key: Option<&[Value]>) -> f64 {
        // A key the index cannot compare is reported as cheap; the traversal surfaces the error.
        self.index.stats(t, key).map(|s| s.count as f64).unwrap_or(0.0)
    }
}

impl Selection for IndexFilter {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        match self.index.scan(&self.probe, t) {
            Ok(rows) => rows,
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn has_item(&self, row: &Row, t: &Transaction) -> Result<bool, Error> {
        Ok(self.predicate.test(&row.values)? && self.source.has_item(row, t)?)
    }

    fn admits(&self, row: &Row, _t: &Transaction) -> Result<bool, Error> {
        self.predicate.test(&row.values)
    }

    fn get_index(&self, exprs: &[Expr]) -> Option<Arc<dyn IndexSource>> {
        let inner = self.source.get_index(exprs)?;
        Some(Arc::new(RestrictiveIndex::new(inner, self.predicate.clone())))
    }

    /// Equality-like probes report the exact bucket sizes; ranges an estimated fraction of the
    /// index.
    fn entropy(&self, t: &Transaction) -> f64 {
        let total = self.count(t, None);
        match &self.probe {
            Probe::Eq(key) => self.count(t, Some(key)),
            Probe::In(keys) => keys.iter().map(|k| self.count(t, Some(k))).sum(),
            Probe::IsNull => {
                let nulls = vec![Value::Null; self.index.key_types().len()];
                self.count(t, Some(&nulls))
            }
            Probe::IsNotNull => {
                let nulls = vec![Value::Null; self.index.key_types().len()];
                (total - self.count(t, Some(&nulls))).max(0.0)
            }
            Probe::Gt(_) | Probe::Ge(_) | Probe::Lt(_) | Probe::Le(_) | Probe::NotIn(_) => {
                total * self.config.range_selectivity
            }
            Probe::Between(..) => total * self.config.between_selectivity,
            Probe::Prefix(_) => total * self.config.prefix_selectivity,
        }
    }

    fn explain(&self, t: &Transaction) -> Plan {
        Plan::new(
            "IndexFilter",
            format!("{} {}", self.index.describe(), self.probe),
            self.entropy(t),
        )
        .with_child(self.source.explain(t))
    }
}
