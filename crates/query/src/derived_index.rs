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

//! Indexes seen through an operator that sits between a table and the caller.

use crate::selection::{IndexSource, KeyBounds, Probe, RowStream};
use memrel_db::{Error, Expr, IndexStats, Row, Transaction};
use memrel_var::{DataType, Value};
use std::sync::Arc;

/// Rows from the underlying index reshaped through a projection list.
#[derive(Debug)]
pub struct MappedIndex {
    inner: Arc<dyn IndexSource>,
    exprs: Arc<[Expr]>,
    derive_ids: bool,
}

impl MappedIndex {
    pub fn new(inner: Arc<dyn IndexSource>, exprs: Arc<[Expr]>, derive_ids: bool) -> Self {
        Self {
            inner,
            exprs,
            derive_ids,
        }
    }
}

/// Evaluates `exprs` over `row`. Reshaped rows get an identity derived from the source row;
/// plain relabelling keeps the source identity.
pub(crate) fn project_row(row: Row, exprs: &[Expr], derive_ids: bool) -> Result<Row, Error> {
    let values = exprs
        .iter()
        .map(|e| e.eval(&row.values))
        .collect::<Result<Vec<_>, _>>()?;
    let id = if derive_ids {
        row.id.derived("p")
    } else {
        row.id
    };
    Ok(Row::new(id, values))
}

impl IndexSource for MappedIndex {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn key_types(&self) -> Vec<DataType> {
        self.inner.key_types()
    }

    fn scan<'a>(&'a self, probe: &Probe, t: &'a Transaction) -> Result<RowStream<'a>, Error> {
        let rows = self.inner.scan(probe, t)?;
        Ok(Box::new(
            rows.map(move |r| r.and_then(|row| project_row(row, &self.exprs, self.derive_ids))),
        ))
    }

    fn stats(&self, t: &Transaction, key: Option<&[Value]>) -> Result<IndexStats, Error> {
        self.inner.stats(t, key)
    }

    fn distinct_keys(&self, t: &Transaction) -> usize {
        self.inner.distinct_keys(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.inner.entropy(t)
    }

    fn is_unique(&self) -> bool {
        self.inner.is_unique()
    }

    fn keys(&self, t: &Transaction) -> Option<Vec<(Vec<Value>, usize)>> {
        self.inner.keys(t)
    }

    fn bounds(&self, t: &Transaction) -> Option<KeyBounds> {
        self.inner.bounds(t)
    }
}

/// Rows from the underlying index that also satisfy a filter predicate. Counts reported are upper
/// bounds, so key counts and bounds are withheld.
#[derive(Debug)]
pub struct RestrictiveIndex {
    inner: Arc<dyn IndexSource>,
    predicate: Expr,
}

impl RestrictiveIndex {
    pub fn new(inner: Arc<dyn IndexSource>, predicate: Expr) -> Self {
        Self { inner, predicate }
    }
}

impl IndexSource for RestrictiveIndex {
    fn describe(&self) -> String {
        format!("{} where {}", self.inner.describe(), self.predicate)
    }

    fn key_types(&self) -> Vec<DataType> {
        self.inner.key_types()
    }

    fn scan<'a>(&'a self, probe: &Probe, t: &'a Transaction) -> Result<RowStream<'a>, Error> {
        let rows = self.inner.scan(probe, t)?;
        Ok(crate::filter::restrict(rows, &self.predicate))
    }

    fn stats(&self, t: &Transaction, key: Option<&[Value]>) -> Result<IndexStats, Error> {
        self.inner.stats(t, key)
    }

    fn distinct_keys(&self, t: &Transaction) -> usize {
        self.inner.distinct_keys(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.inner.entropy(t)
    }

    fn is_unique(&self) -> bool {
        self.inner.is_unique()
    }
}
