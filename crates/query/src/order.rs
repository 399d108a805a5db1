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
use itertools::Itertools;
use memrel_db::{Error, Expr, IndexStats, Row, Transaction};
use memrel_var::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// One sort key. Null placement is independent of direction.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderKey {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_last: bool,
}

impl OrderKey {
    /// Ascending, nulls last.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_last: true,
        }
    }

    /// Descending, nulls first.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls_last: false,
        }
    }

    pub fn nulls_last(mut self, nulls_last: bool) -> Self {
        self.nulls_last = nulls_last;
        self
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_last => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, true) if self.nulls_last => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) if self.descending => b.cmp(a),
            (false, false) => a.cmp(b),
        }
    }
}

/// Materializes the source and sorts it. Ties keep source order.
#[derive(Debug)]
pub struct OrderBy {
    source: Arc<dyn Selection>,
    keys: Vec<OrderKey>,
}

impl OrderBy {
    pub fn new(source: Arc<dyn Selection>, keys: Vec<OrderKey>) -> Result<Self, Error> {
        let arity = source.columns().len();
        for key in &keys {
            if let Some(c) = key.expr.columns().into_iter().find(|c| *c >= arity) {
                return Err(Error::InvalidQuery(format!(
                    "ORDER BY references column position {c}, source has {arity} columns"
                )));
            }
        }
        Ok(Self { source, keys })
    }

    fn sorted(&self, t: &Transaction) -> Result<Vec<Row>, Error> {
        let mut keyed = Vec::new();
        for row in self.source.enumerate(t) {
            let row = row?;
            let key = self
                .keys
                .iter()
                .map(|k| k.expr.eval(&row.values))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((key, row));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            self.keys
                .iter()
                .zip(a.iter().zip(b))
                .map(|(k, (a, b))| k.compare(a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

impl Selection for OrderBy {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        match self.sorted(t) {
            Ok(rows) => Box::new(rows.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn has_item(&self, row: &Row, t: &Transaction) -> Result<bool, Error> {
        self.source.has_item(row, t)
    }

    fn stats(&self, t: &Transaction) -> Option<IndexStats> {
        self.source.stats(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.source.entropy(t)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let detail = self
            .keys
            .iter()
            .map(|k| {
                format!(
                    "{} {} nulls {}",
                    k.expr,
                    if k.descending { "desc" } else { "asc" },
                    if k.nulls_last { "last" } else { "first" }
                )
            })
            .join(", ");
        Plan::new("OrderBy", detail, self.entropy(t)).with_child(self.source.explain(t))
    }
}
