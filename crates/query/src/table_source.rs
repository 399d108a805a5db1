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

use crate::selection::{
    ColumnInfo, IndexSource, KeyBounds, Plan, Probe, RowStream, Selection,
};
use memrel_db::{Error, Expr, Index, IndexStats, Row, Table, Transaction};
use memrel_var::{DataType, Value};
use std::sync::Arc;

/// Base relation: every row of a table as of the transaction it is enumerated under.
#[derive(Debug)]
pub struct TableSelection {
    table: Arc<Table>,
    columns: Vec<ColumnInfo>,
}

impl TableSelection {
    pub fn new(table: Arc<Table>) -> Self {
        let qualifier = table.name().to_string();
        Self::aliased(table, &qualifier)
    }

    pub fn aliased(table: Arc<Table>, alias: &str) -> Self {
        let columns = table
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name.clone(), Some(alias), c.data_type.clone()))
            .collect();
        Self { table, columns }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }
}

impl Selection for TableSelection {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        Box::new(self.table.scan(t).map(Ok))
    }

    fn has_item(&self, row: &Row, t: &Transaction) -> Result<bool, Error> {
        Ok(self
            .table
            .get(t, &row.id)
            .is_some_and(|stored| stored.values == row.values))
    }

    fn get_index(&self, exprs: &[Expr]) -> Option<Arc<dyn IndexSource>> {
        let index = self.table.find_index(exprs)?;
        Some(Arc::new(TableIndex {
            table: self.table.clone(),
            index,
        }))
    }

    fn stats(&self, t: &Transaction) -> Option<IndexStats> {
        Some(IndexStats {
            count: self.table.len(t),
        })
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.table.len(t) as f64
    }

    fn explain(&self, t: &Transaction) -> Plan {
        Plan::new("Scan", self.table.name(), self.entropy(t))
    }
}

/// A table index, yielding the table's own rows.
#[derive(Debug)]
pub struct TableIndex {
    table: Arc<Table>,
    index: Arc<Index>,
}

impl IndexSource for TableIndex {
    fn describe(&self) -> String {
        format!("{}.{}", self.table.name(), self.index.name())
    }

    fn key_types(&self) -> Vec<DataType> {
        self.index.key_types().to_vec()
    }

    fn scan<'a>(&'a self, probe: &Probe, t: &'a Transaction) -> Result<RowStream<'a>, Error> {
        let index = &self.index;
        let scan = match probe {
            Probe::Eq(k) => index.eq(index.probe(k.clone())?, t),
            Probe::Gt(k) => index.gt(index.probe(k.clone())?, t),
            Probe::Ge(k) => index.ge(index.probe(k.clone())?, t),
            Probe::Lt(k) => index.lt(index.probe(k.clone())?, t),
            Probe::Le(k) => index.le(index.probe(k.clone())?, t),
            Probe::Between(low, high) => {
                index.between(index.probe(low.clone())?, index.probe(high.clone())?, t)
            }
            Probe::Prefix(p) => index.prefix(p, t)?,
            Probe::In(keys) => {
                let keys = index.sorted_probes(keys.clone())?;
                return Ok(Box::new(
                    keys.into_iter().flat_map(move |k| index.eq(k, t)).map(Ok),
                ));
            }
            Probe::NotIn(keys) => index.nin(index.sorted_probes(keys.clone())?, t),
            Probe::IsNull => index.is_null(t),
            Probe::IsNotNull => index.is_not_null(t),
        };
        Ok(Box::new(scan.map(Ok)))
    }

    fn stats(&self, t: &Transaction, key: Option<&[Value]>) -> Result<IndexStats, Error> {
        match key {
            None => Ok(self.index.stats(t, None)),
            Some(key) => {
                let key = self.index.probe(key.to_vec())?;
                Ok(self.index.stats(t, Some(&key)))
            }
        }
    }

    fn distinct_keys(&self, t: &Transaction) -> usize {
        self.index.distinct_keys(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.index.entropy(t)
    }

    fn is_unique(&self) -> bool {
        self.index.is_unique()
    }

    fn keys(&self, t: &Transaction) -> Option<Vec<(Vec<Value>, usize)>> {
        Some(self.index.keys(t).map(|(k, n)| (k.values(), n)).collect())
    }

    fn bounds(&self, t: &Transaction) -> Option<KeyBounds> {
        Some(KeyBounds {
            min: self.index.min_key(t).map(|k| k.values()),
            max: self.index.max_key(t).map(|k| k.values()),
        })
    }
}
