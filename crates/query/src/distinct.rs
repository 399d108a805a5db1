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

use crate::selection::{ColumnInfo, Plan, RowStream, Selection};
use ahash::AHasher;
use itertools::Itertools;
use memrel_db::{Error, Expr, Row, Transaction};
use memrel_var::Value;
use std::collections::HashSet;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

/// Keeps the first row for each distinct key. The key is the whole row unless `DISTINCT ON`
/// expressions are given.
#[derive(Debug)]
pub struct Distinct {
    source: Arc<dyn Selection>,
    on: Option<Vec<Expr>>,
}

impl Distinct {
    pub fn new(source: Arc<dyn Selection>, on: Option<Vec<Expr>>) -> Result<Self, Error> {
        let arity = source.columns().len();
        if let Some(c) = on
            .iter()
            .flatten()
            .flat_map(|e| e.columns())
            .find(|c| *c >= arity)
        {
            return Err(Error::InvalidQuery(format!(
                "DISTINCT ON references column position {c}, source has {arity} columns"
            )));
        }
        Ok(Self { source, on })
    }

    fn key(&self, row: &Row) -> Result<Vec<Value>, Error> {
        match &self.on {
            None => Ok(row.to_vec()),
            Some(exprs) => exprs.iter().map(|e| e.eval(&row.values)).collect(),
        }
    }
}

impl Selection for Distinct {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        let mut seen: HashSet<Vec<Value>, BuildHasherDefault<AHasher>> = HashSet::default();
        Box::new(self.source.enumerate(t).filter_map(move |r| {
            let row = match r {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            match self.key(&row) {
                Ok(key) => seen.insert(key).then_some(Ok(row)),
                Err(e) => Some(Err(e)),
            }
        }))
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.source.entropy(t)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let detail = match &self.on {
            None => "all columns".to_string(),
            Some(exprs) => exprs.iter().join(", "),
        };
        Plan::new("Distinct", detail, self.entropy(t)).with_child(self.source.explain(t))
    }
}
