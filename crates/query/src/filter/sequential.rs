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
use crate::filter::restrict;
use crate::selection::{ColumnInfo, IndexSource, Plan, RowStream, Selection, empty_stream};
use memrel_db::{Error, Expr, IndexStats, Row, Transaction};
use std::sync::Arc;

/// Evaluates the predicate against every source row.
#[derive(Debug)]
pub struct SeqFilter {
    source: Arc<dyn Selection>,
    predicate: Expr,
    penalty: f64,
}

impl SeqFilter {
    pub fn new(source: Arc<dyn Selection>, predicate: Expr, penalty: f64) -> Self {
        Self {
            source,
            predicate,
            penalty,
        }
    }
}

impl Selection for SeqFilter {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        restrict(self.source.enumerate(t), &self.predicate)
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

    fn entropy(&self, t: &Transaction) -> f64 {
        self.source.entropy(t) * self.penalty
    }

    fn explain(&self, t: &Transaction) -> Plan {
        Plan::new("SeqFilter", self.predicate.to_string(), self.entropy(t))
            .with_child(self.source.explain(t))
    }
}

/// A predicate that can never hold. Never touches its source.
#[derive(Debug)]
pub struct FalseFilter {
    source: Arc<dyn Selection>,
    predicate: Expr,
}

impl FalseFilter {
    pub fn new(source: Arc<dyn Selection>, predicate: Expr) -> Self {
        Self { source, predicate }
    }
}

impl Selection for FalseFilter {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, _t: &'a Transaction) -> RowStream<'a> {
        empty_stream()
    }

    fn has_item(&self, _row: &Row, _t: &Transaction) -> Result<bool, Error> {
        Ok(false)
    }

    fn admits(&self, _row: &Row, _t: &Transaction) -> Result<bool, Error> {
        Ok(false)
    }

    fn stats(&self, _t: &Transaction) -> Option<IndexStats> {
        Some(IndexStats { count: 0 })
    }

    fn entropy(&self, _t: &Transaction) -> f64 {
        0.0
    }

    fn explain(&self, t: &Transaction) -> Plan {
        Plan::new("FalseFilter", self.predicate.to_string(), 0.0).with_child(self.source.explain(t))
    }
}
