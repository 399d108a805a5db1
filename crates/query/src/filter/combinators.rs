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
use crate::selection::{ColumnInfo, IndexSource, Plan, RowStream, Selection};
use ahash::AHasher;
use memrel_db::{Error, Expr, Row, RowId, Transaction};
use std::collections::HashSet;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use tracing::debug;

/// Conjunction of filters over one source. Each enumeration drives the child with the lowest
/// entropy under the enumerating transaction and checks the others per row.
#[derive(Debug)]
pub struct AndFilter {
    source: Arc<dyn Selection>,
    predicate: Expr,
    children: Vec<Arc<dyn Selection>>,
}

impl AndFilter {
    pub fn new(
        source: Arc<dyn Selection>,
        predicate: Expr,
        children: Vec<Arc<dyn Selection>>,
    ) -> Self {
        Self {
            source,
            predicate,
            children,
        }
    }

    fn ranked(&self, t: &Transaction) -> Vec<(f64, usize)> {
        let mut ranked: Vec<(f64, usize)> = self
            .children
            .iter()
            .enumerate()
            .map(|(i, c)| (c.entropy(t), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        ranked
    }
}

impl Selection for AndFilter {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        let ranked = self.ranked(t);
        let Some(&(entropy, driver)) = ranked.first() else {
            return self.source.enumerate(t);
        };
        debug!(driver, entropy, children = self.children.len(), "AND filter strategy");
        let checks: Vec<&Arc<dyn Selection>> =
            ranked[1..].iter().map(|(_, i)| &self.children[*i]).collect();
        Box::new(
            self.children[driver]
                .enumerate(t)
                .filter_map(move |r| {
                    let row = match r {
                        Ok(row) => row,
                        Err(e) => return Some(Err(e)),
                    };
                    for check in &checks {
                        match check.admits(&row, t) {
                            Ok(true) => {}
                            Ok(false) => return None,
                            Err(e) => return Some(Err(e)),
                        }
                    }
                    Some(Ok(row))
                }),
        )
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
        self.ranked(t).first().map(|(e, _)| *e).unwrap_or(0.0)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let mut plan = Plan::new("And", self.predicate.to_string(), self.entropy(t));
        for (_, i) in self.ranked(t) {
            plan = plan.with_child(self.children[i].explain(t));
        }
        plan
    }
}

/// Disjunction of two filters over one source, each served by its own index. Rows matched by
/// both branches are yielded once.
#[derive(Debug)]
pub struct OrFilter {
    source: Arc<dyn Selection>,
    predicate: Expr,
    left: Arc<dyn Selection>,
    right: Arc<dyn Selection>,
}

impl OrFilter {
    pub fn new(
        source: Arc<dyn Selection>,
        predicate: Expr,
        left: Arc<dyn Selection>,
        right: Arc<dyn Selection>,
    ) -> Self {
        Self {
            source,
            predicate,
            left,
            right,
        }
    }
}

impl Selection for OrFilter {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        let mut seen: HashSet<RowId, BuildHasherDefault<AHasher>> = HashSet::default();
        Box::new(
            self.left
                .enumerate(t)
                .chain(self.right.enumerate(t))
                .filter(move |r| match r {
                    Ok(row) => seen.insert(row.id.clone()),
                    Err(_) => true,
                }),
        )
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
        self.left.entropy(t) + self.right.entropy(t)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        Plan::new("Or", self.predicate.to_string(), self.entropy(t))
            .with_child(self.left.explain(t))
            .with_child(self.right.explain(t))
    }
}
