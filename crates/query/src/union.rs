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
use memrel_db::{Error, Row, Transaction};
use memrel_var::Value;
use std::collections::HashSet;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

/// `UNION` / `UNION ALL` of two selections with the same arity and compatible column types.
#[derive(Debug)]
pub struct Union {
    left: Arc<dyn Selection>,
    right: Arc<dyn Selection>,
    all: bool,
    columns: Vec<ColumnInfo>,
}

impl Union {
    pub fn new(left: Arc<dyn Selection>, right: Arc<dyn Selection>, all: bool) -> Result<Self, Error> {
        if left.columns().len() != right.columns().len() {
            return Err(Error::InvalidQuery(format!(
                "each UNION query must have the same number of columns ({} vs {})",
                left.columns().len(),
                right.columns().len()
            )));
        }
        let columns = left
            .columns()
            .iter()
            .zip(right.columns())
            .map(|(l, r)| {
                Ok(ColumnInfo {
                    name: l.name.clone(),
                    qualifier: None,
                    data_type: l.data_type.unify(&r.data_type)?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self {
            left,
            right,
            all,
            columns,
        })
    }
}

impl Selection for Union {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        let branch = |rows: RowStream<'a>, tag: &'static str| {
            rows.map(move |r| {
                r.map(|row| Row {
                    id: row.id.derived(tag),
                    values: row.values,
                })
            })
        };
        let rows = branch(self.left.enumerate(t), "l").chain(branch(self.right.enumerate(t), "r"));
        if self.all {
            return Box::new(rows);
        }
        let mut seen: HashSet<Vec<Value>, BuildHasherDefault<AHasher>> = HashSet::default();
        Box::new(rows.filter(move |r| match r {
            Ok(row) => seen.insert(row.to_vec()),
            Err(_) => true,
        }))
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.left.entropy(t) + self.right.entropy(t)
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let op = if self.all { "UnionAll" } else { "Union" };
        Plan::new(op, "", self.entropy(t))
            .with_child(self.left.explain(t))
            .with_child(self.right.explain(t))
    }
}
