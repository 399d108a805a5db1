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

use crate::Error;
use crate::database::Database;
use crate::tx::Transaction;
use tracing::{debug, warn};

/// Maps statement-level transaction control onto the fork tree.
///
/// Outside an explicit block, statements run against the root scope. `begin` forks a child for
/// the block; `commit` and `rollback` end it. Every statement runs in its own fork of the current
/// scope, so a failing statement leaves no partial effects.
pub struct Session {
    db: Database,
    tx: Transaction,
    in_block: bool,
}

impl Session {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tx: Transaction::root(),
            in_block: false,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// The current scope: the open block if any, the root otherwise.
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn in_transaction(&self) -> bool {
        self.in_block
    }

    pub fn begin(&mut self) -> Result<(), Error> {
        if self.in_block {
            return Err(Error::InvalidQuery(
                "there is already a transaction in progress".into(),
            ));
        }
        self.tx = self.tx.fork();
        self.in_block = true;
        debug!(tx = self.tx.id(), "begin");
        Ok(())
    }

    pub fn commit(&mut self) {
        if !self.in_block {
            warn!("there is no transaction in progress");
            return;
        }
        debug!(tx = self.tx.id(), "commit");
        self.tx = self.tx.commit();
        self.in_block = false;
        self.db.counters().commits.incr();
    }

    pub fn rollback(&mut self) {
        if !self.in_block {
            warn!("there is no transaction in progress");
            return;
        }
        debug!(tx = self.tx.id(), "rollback");
        self.tx = self.tx.rollback();
        self.in_block = false;
        self.db.counters().rollbacks.incr();
    }

    /// Runs one statement. The statement's transient cache starts empty.
    pub fn execute<T>(
        &mut self,
        f: impl FnOnce(&Database, &Transaction) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let statement = self.tx.fork();
        statement.clear_transient();
        match f(&self.db, &statement) {
            Ok(v) => {
                statement.commit();
                Ok(v)
            }
            Err(e) => {
                statement.rollback();
                Err(e)
            }
        }
    }

    /// Runs a schema change. Pending work is fully committed first; an open block continues in a
    /// fresh fork afterwards.
    pub fn ddl<T>(
        &mut self,
        f: impl FnOnce(&mut Database, &Transaction) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let root = self.tx.full_commit();
        let result = f(&mut self.db, &root);
        self.tx = if self.in_block { root.fork() } else { root };
        result
    }
}
