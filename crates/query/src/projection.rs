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

use crate::derived_index::{MappedIndex, project_row};
use crate::selection::{ColumnInfo, IndexSource, Plan, RowStream, Selection};
use itertools::Itertools;
use memrel_db::{Error, Expr, IndexStats, Transaction};
use std::sync::Arc;

/// Computes output columns from source rows. Output rows carry an identity derived from their
/// source row, except under a plain alias, and index lookups on outputs are rewritten into
/// lookups on the source.
#[derive(Debug)]
pub struct Projection {
    source: Arc<dyn Selection>,
    exprs: Arc<[Expr]>,
    columns: Vec<ColumnInfo>,
    derive_ids: bool,
}

impl Projection {
    pub fn new(source: Arc<dyn Selection>, items: Vec<(Expr, String)>) -> Result<Self, Error> {
        let arity = source.columns().len();
        let types: Vec<_> = source.columns().iter().map(|c| c.data_type.clone()).collect();
        let mut columns = Vec::with_capacity(items.len());
        let mut exprs = Vec::with_capacity(items.len());
        for (expr, name) in items {
            if let Some(c) = expr.columns().into_iter().find(|c| *c >= arity) {
                return Err(Error::InvalidQuery(format!(
                    "projection references column position {c}, source has {arity} columns"
                )));
            }
            let qualifier = expr
                .as_column()
                .and_then(|c| source.columns()[c].qualifier.clone());
            columns.push(ColumnInfo {
                name,
                qualifier,
                data_type: expr.data_type(&types),
            });
            exprs.push(expr);
        }
        Ok(Self {
            source,
            exprs: exprs.into(),
            columns,
            derive_ids: true,
        })
    }

    /// Every source column, re-qualified with `alias`. Rows keep their identity, so an aliased
    /// table can still drive `UPDATE` and `DELETE`.
    pub fn aliased(source: Arc<dyn Selection>, alias: &str) -> Self {
        let columns: Vec<ColumnInfo> = source
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name.clone(), Some(alias), c.data_type.clone()))
            .collect();
        let exprs: Vec<Expr> = (0..columns.len()).map(Expr::Column).collect();
        Self {
            source,
            exprs: exprs.into(),
            columns,
            derive_ids: false,
        }
    }
}

impl Selection for Projection {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        Box::new(
            self.source
                .enumerate(t)
                .map(move |r| r.and_then(|row| project_row(row, &self.exprs, self.derive_ids))),
        )
    }

    fn get_index(&self, exprs: &[Expr]) -> Option<Arc<dyn IndexSource>> {
        let rewritten: Vec<Expr> = exprs.iter().map(|e| e.substitute(&self.exprs)).collect();
        let inner = self.source.get_index(&rewritten)?;
        Some(Arc::new(MappedIndex::new(
            inner,
            self.exprs.clone(),
            self.derive_ids,
        )))
    }

    fn stats(&self, t: &Transaction) -> Option<IndexStats> {
        self.source.stats(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.source.entropy(t)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let detail = self
            .exprs
            .iter()
            .zip(&self.columns)
            .map(|(e, c)| format!("{e} as {}", c.name))
            .join(", ");
        Plan::new("Project", detail, self.entropy(t)).with_child(self.source.explain(t))
    }
}
