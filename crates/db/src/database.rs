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

use crate::config::DatabaseConfig;
use crate::counters::DbCounters;
use crate::index::{Index, IndexDef};
use crate::row::RowIdGen;
use crate::table::{AlterColumn, ColumnDef, Table, TableSchema};
use crate::tx::{SlotAllocator, Transaction};
use crate::{Error, ObjectKind};
use ahash::AHasher;
use indexmap::IndexMap;
use memrel_var::Value;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use tracing::debug;

/// The catalog: every table by name, plus the resources shared by everything built against it.
///
/// Schema changes are not versioned by transactions. Callers run them against a fully committed
/// root scope (see `Session::ddl`).
pub struct Database {
    tables: IndexMap<String, Arc<Table>, BuildHasherDefault<AHasher>>,
    config: DatabaseConfig,
    counters: Arc<DbCounters>,
    ids: Arc<RowIdGen>,
    slots: Arc<SlotAllocator>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DatabaseConfig::default())
    }
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            tables: IndexMap::default(),
            config,
            counters: Arc::new(DbCounters::new()),
            ids: Arc::new(RowIdGen::new()),
            slots: Arc::new(SlotAllocator::new()),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn counters(&self) -> &Arc<DbCounters> {
        &self.counters
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.tables.values()
    }

    pub fn get_table(&self, name: &str) -> Result<Arc<Table>, Error> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(ObjectKind::Table, name))
    }

    pub fn declare_table(&mut self, t: &Transaction, schema: TableSchema) -> Result<Arc<Table>, Error> {
        if self.tables.contains_key(&schema.name) {
            return Err(Error::already_exists(ObjectKind::Table, &schema.name));
        }
        let table = Table::create(schema, t, self.ids.clone(), self.slots.clone())?;
        if let Some(index) = table.indexes().iter().find(|i| self.index_owner(i.name()).is_some()) {
            let name = index.name().to_string();
            table.drop_data(t);
            return Err(Error::already_exists(ObjectKind::Index, name));
        }
        let table = Arc::new(table);
        self.tables.insert(table.name().to_string(), table.clone());
        Ok(table)
    }

    pub fn drop_table(&mut self, t: &Transaction, name: &str) -> Result<(), Error> {
        let table = self
            .tables
            .shift_remove(name)
            .ok_or_else(|| Error::not_found(ObjectKind::Table, name))?;
        table.drop_data(t);
        debug!(table = name, "dropped table");
        Ok(())
    }

    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<(), Error> {
        if self.tables.contains_key(new) {
            return Err(Error::already_exists(ObjectKind::Table, new));
        }
        let table = self
            .tables
            .shift_remove(old)
            .ok_or_else(|| Error::not_found(ObjectKind::Table, old))?;
        let mut table = table.as_ref().clone();
        table.set_name(new.to_string());
        self.tables.insert(new.to_string(), Arc::new(table));
        Ok(())
    }

    fn index_owner(&self, index: &str) -> Option<&Arc<Table>> {
        self.tables.values().find(|t| t.index(index).is_some())
    }

    /// Applies a schema change to a copy of the named table, installing the copy only if the
    /// change succeeds.
    fn alter_table<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Table) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut table = self.get_table(name)?.as_ref().clone();
        let result = f(&mut table)?;
        self.tables.insert(name.to_string(), Arc::new(table));
        Ok(result)
    }

    pub fn create_index(
        &mut self,
        t: &Transaction,
        table: &str,
        def: IndexDef,
    ) -> Result<Arc<Index>, Error> {
        if let Some(name) = &def.name {
            if self.index_owner(name).is_some() {
                return Err(Error::already_exists(ObjectKind::Index, name));
            }
        }
        self.alter_table(table, |table| table.create_index(t, def))
    }

    pub fn drop_index(&mut self, t: &Transaction, name: &str) -> Result<(), Error> {
        let owner = self
            .index_owner(name)
            .map(|owner| owner.name().to_string())
            .ok_or_else(|| Error::not_found(ObjectKind::Index, name))?;
        self.alter_table(&owner, |table| table.drop_index(t, name))
    }

    pub fn rename_index(&mut self, old: &str, new: &str) -> Result<(), Error> {
        if self.index_owner(new).is_some() {
            return Err(Error::already_exists(ObjectKind::Index, new));
        }
        let owner = self
            .index_owner(old)
            .map(|owner| owner.name().to_string())
            .ok_or_else(|| Error::not_found(ObjectKind::Index, old))?;
        self.alter_table(&owner, |table| table.rename_index(old, new))
    }

    pub fn add_column(&mut self, t: &Transaction, table: &str, def: ColumnDef) -> Result<(), Error> {
        self.alter_table(table, |table| table.add_column(t, def))
    }

    pub fn drop_column(&mut self, t: &Transaction, table: &str, column: &str) -> Result<(), Error> {
        self.alter_table(table, |table| table.drop_column(t, column))
    }

    pub fn alter_column(
        &mut self,
        t: &Transaction,
        table: &str,
        column: &str,
        change: AlterColumn,
    ) -> Result<(), Error> {
        self.alter_table(table, |table| table.alter_column(t, column, change))
    }

    pub fn rename_column(&mut self, table: &str, old: &str, new: &str) -> Result<(), Error> {
        self.alter_table(table, |table| table.rename_column(old, new))
    }

    pub fn add_check(
        &mut self,
        t: &Transaction,
        table: &str,
        name: Option<String>,
        expr: crate::Expr,
    ) -> Result<(), Error> {
        self.alter_table(table, |table| table.add_check(t, name, expr))
    }

    pub fn truncate(&self, t: &Transaction, table: &str) -> Result<(), Error> {
        self.get_table(table)?.truncate(t);
        Ok(())
    }

    /// Convenience for seeding: inserts each row of explicit values.
    pub fn insert_rows(
        &self,
        t: &Transaction,
        table: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<usize, Error> {
        let table = self.get_table(table)?;
        let count = rows.len();
        for values in rows {
            table.insert_values(t, values)?;
        }
        Ok(count)
    }
}
