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

//! The table store: one relation's rows, columns, constraints and indexes.
//!
//! Row data lives in the table's slot of a `Transaction`; index trees live in their own slots.
//! The schema (columns, indexes, checks) is plain data held by the `Table` value itself and is
//! not versioned.

use crate::expr::{Expr, truth};
use crate::index::{Index, IndexDef, KeyColumn};
use crate::row::{Row, RowId, RowIdGen};
use crate::tx::{Binding, RowSet, SlotAllocator, SlotKey, Transaction};
use crate::{ConstraintViolation, Error, ObjectKind};
use memrel_var::{DataType, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Expr>,
    pub generated: Option<Expr>,
    pub serial: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            generated: None,
            serial: false,
            primary_key: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, expr: Expr) -> Self {
        self.default = Some(expr);
        self
    }

    /// Stored generated column computed from the other columns of the row.
    pub fn generated(mut self, expr: Expr) -> Self {
        self.generated = Some(expr);
        self
    }

    /// Auto-incrementing integer column.
    pub fn serial(mut self) -> Self {
        self.serial = true;
        self.data_type = DataType::Int;
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Expr>,
    pub generated: Option<Expr>,
    pub serial: Option<SlotKey>,
    /// Names of the indexes keyed on this column.
    pub indexes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckConstraint {
    pub name: String,
    pub expr: Expr,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub checks: Vec<(Option<String>, Expr)>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn check(mut self, name: Option<&str>, expr: Expr) -> Self {
        self.checks.push((name.map(str::to_string), expr));
        self
    }
}

/// `ON CONFLICT` behaviour of an insert.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum OnConflict {
    #[default]
    Error,
    /// Skip the row when it collides on `target` (any unique index when `None`).
    DoNothing { target: Option<String> },
    /// Update the existing row instead. `assignments` and `filter` are evaluated against the
    /// existing row's columns followed by the proposed row's columns.
    DoUpdate {
        target: Option<String>,
        assignments: Vec<(usize, Expr)>,
        filter: Option<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlterColumn {
    SetType(DataType),
    SetDefault(Expr),
    DropDefault,
    SetNotNull,
    DropNotNull,
}

#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    indexes: Vec<Arc<Index>>,
    checks: Vec<CheckConstraint>,
    slot: SlotKey,
    ids: Arc<RowIdGen>,
    slots: Arc<SlotAllocator>,
}

/// Runs `f` in a scratch fork of `t`, keeping its writes only if it succeeds.
fn atomically<T>(
    t: &Transaction,
    f: impl FnOnce(&Transaction) -> Result<T, Error>,
) -> Result<T, Error> {
    let scratch = t.fork();
    match f(&scratch) {
        Ok(v) => {
            scratch.commit();
            Ok(v)
        }
        Err(e) => {
            scratch.rollback();
            Err(e)
        }
    }
}

fn next_serial(t: &Transaction, slot: SlotKey) -> Value {
    let n = t.sequence(slot) + 1;
    t.set(slot, Binding::Sequence(n));
    Value::Int(n)
}

fn constant_default(column: &str, expr: &Option<Expr>) -> Result<(), Error> {
    match expr {
        Some(e) if !e.is_constant() => Err(Error::InvalidQuery(format!(
            "default for column {column} cannot reference other columns"
        ))),
        _ => Ok(()),
    }
}

impl Table {
    pub(crate) fn create(
        schema: TableSchema,
        t: &Transaction,
        ids: Arc<RowIdGen>,
        slots: Arc<SlotAllocator>,
    ) -> Result<Table, Error> {
        let mut columns: Vec<Column> = Vec::with_capacity(schema.columns.len());
        for def in &schema.columns {
            if columns.iter().any(|c| c.name == def.name) {
                return Err(Error::already_exists(ObjectKind::Column, &def.name));
            }
            constant_default(&def.name, &def.default)?;
            columns.push(Column {
                name: def.name.clone(),
                data_type: def.data_type.clone(),
                nullable: def.nullable,
                default: def.default.clone(),
                generated: def.generated.clone(),
                serial: def.serial.then(|| slots.next_slot()),
                indexes: vec![],
            });
        }
        let mut table = Table {
            name: schema.name.clone(),
            columns,
            indexes: vec![],
            checks: vec![],
            slot: slots.next_slot(),
            ids,
            slots,
        };
        t.set(table.slot, Binding::Rows(RowSet::new()));

        for (name, expr) in schema.checks {
            table.add_check(t, name, expr)?;
        }
        let mut primary: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if !schema.primary_key.is_empty() {
            if !primary.is_empty() {
                return Err(Error::already_exists(
                    ObjectKind::Constraint,
                    format!("{}_pkey", table.name),
                ));
            }
            primary = schema.primary_key;
        }
        if !primary.is_empty() {
            let def = table.key_def(&primary)?.primary();
            table.create_index(t, def)?;
        }
        for def in schema.columns.iter().filter(|c| c.unique && !c.primary_key) {
            let def = table.key_def(std::slice::from_ref(&def.name))?.unique();
            table.create_index(t, def)?;
        }
        debug!(table = %table.name, columns = table.columns.len(), "declared table");
        Ok(table)
    }

    fn key_def(&self, columns: &[String]) -> Result<IndexDef, Error> {
        let keys = columns
            .iter()
            .map(|c| Ok(KeyColumn::asc(Expr::Column(self.column_position(c)?))))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(IndexDef::new(keys))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn slot(&self) -> SlotKey {
        self.slot
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_position(&self, name: &str) -> Result<usize, Error> {
        self.column_index(name)
            .ok_or_else(|| Error::not_found(ObjectKind::Column, name))
    }

    pub fn column(&self, name: &str) -> Result<&Column, Error> {
        Ok(&self.columns[self.column_position(name)?])
    }

    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&Arc<Index>> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    /// An index keyed exactly on `exprs`, preferring unique ones.
    pub fn find_index(&self, exprs: &[Expr]) -> Option<Arc<Index>> {
        let mut covering = self.indexes.iter().filter(|i| i.covers(exprs));
        let first = covering.next()?;
        if first.is_unique() {
            return Some(first.clone());
        }
        Some(covering.find(|i| i.is_unique()).unwrap_or(first).clone())
    }

    pub fn primary_index(&self) -> Option<&Arc<Index>> {
        self.indexes.iter().find(|i| i.is_primary())
    }

    pub fn checks(&self) -> &[CheckConstraint] {
        &self.checks
    }

    // Reads

    /// Every row, in identity (insertion) order.
    pub fn scan(&self, t: &Transaction) -> impl Iterator<Item = Row> + use<> {
        t.rows(self.slot).into_iter().map(|(_, row)| row)
    }

    pub fn get(&self, t: &Transaction, id: &RowId) -> Option<Row> {
        t.rows(self.slot).get(id).cloned()
    }

    pub fn contains(&self, t: &Transaction, id: &RowId) -> bool {
        t.rows(self.slot).contains_key(id)
    }

    pub fn len(&self, t: &Transaction) -> usize {
        t.rows(self.slot).len()
    }

    pub fn is_empty(&self, t: &Transaction) -> bool {
        self.len(t) == 0
    }

    // Row mutation

    /// Fills in serial values, defaults and generated columns, coerces to the column types and
    /// validates not-null and check constraints. `None` stands for `DEFAULT`.
    fn complete_row(&self, t: &Transaction, values: Vec<Option<Value>>) -> Result<Vec<Value>, Error> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidQuery(format!(
                "table {} has {} columns but {} values were supplied",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        let mut out = Vec::with_capacity(values.len());
        for (column, value) in self.columns.iter().zip(values) {
            if column.generated.is_some() {
                if value.as_ref().is_some_and(|v| !v.is_null()) {
                    return Err(ConstraintViolation::GeneratedColumn {
                        column: column.name.clone(),
                    }
                    .into());
                }
                out.push(Value::Null);
                continue;
            }
            let value = match (value, column.serial) {
                (Some(v), _) if !v.is_null() => v,
                (_, Some(seq)) => next_serial(t, seq),
                (Some(null), None) => null,
                (None, None) => match &column.default {
                    Some(default) => default.eval(&[])?,
                    None => Value::Null,
                },
            };
            out.push(value.coerce_to(&column.data_type)?);
        }
        self.fill_generated(&mut out)?;
        self.validate(&out)?;
        Ok(out)
    }

    fn fill_generated(&self, values: &mut [Value]) -> Result<(), Error> {
        for (i, column) in self.columns.iter().enumerate() {
            if let Some(generated) = &column.generated {
                values[i] = generated.eval(values)?.coerce_to(&column.data_type)?;
            }
        }
        Ok(())
    }

    fn validate(&self, values: &[Value]) -> Result<(), Error> {
        for (column, value) in self.columns.iter().zip(values) {
            if !column.nullable && value.is_null() {
                return Err(ConstraintViolation::NotNullColumn {
                    column: column.name.clone(),
                }
                .into());
            }
        }
        for check in &self.checks {
            if truth(&check.expr.eval(values)?)? == Some(false) {
                return Err(ConstraintViolation::Check {
                    name: check.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// The existing row `row` collides with under `on_conflict`'s target, if any.
    fn find_conflict(
        &self,
        t: &Transaction,
        row: &Row,
        on_conflict: &OnConflict,
    ) -> Result<Option<Row>, Error> {
        let target = match on_conflict {
            OnConflict::Error => return Ok(None),
            OnConflict::DoNothing { target } | OnConflict::DoUpdate { target, .. } => target,
        };
        if let Some(name) = target {
            if self.index(name).is_none_or(|i| !i.is_unique()) {
                return Err(Error::InvalidQuery(format!(
                    "there is no unique index named {name} to use as a conflict target"
                )));
            }
        }
        let rows = t.rows(self.slot);
        for index in self.indexes.iter().filter(|i| i.is_unique()) {
            if target.as_ref().is_some_and(|name| name != index.name()) {
                continue;
            }
            let key = index.key_of(row)?;
            if key.has_null() {
                continue;
            }
            if let Some(bucket) = t.tree(index.slot()).get(&key) {
                if let Some(existing) = bucket.iter().find(|id| *id != &row.id) {
                    return Ok(rows.get(existing).cloned());
                }
            }
        }
        Ok(None)
    }

    /// Inserts a row. Returns `None` if `ON CONFLICT` skipped it, or the updated existing row for
    /// `DO UPDATE`.
    pub fn insert(
        &self,
        t: &Transaction,
        values: Vec<Option<Value>>,
        on_conflict: &OnConflict,
    ) -> Result<Option<Row>, Error> {
        let values = self.complete_row(t, values)?;
        let row = Row::new(self.ids.next_id(), values);
        if let Some(existing) = self.find_conflict(t, &row, on_conflict)? {
            let OnConflict::DoUpdate {
                assignments,
                filter,
                ..
            } = on_conflict
            else {
                return Ok(None);
            };
            let mut combined = existing.to_vec();
            combined.extend(row.values.iter().cloned());
            if let Some(filter) = filter {
                if !filter.test(&combined)? {
                    return Ok(None);
                }
            }
            let changes = assignments
                .iter()
                .map(|(c, e)| Ok((*c, e.eval(&combined)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            return self.update(t, &existing.id, changes).map(Some);
        }
        self.persist(t, &row)?;
        Ok(Some(row))
    }

    /// Inserts explicit values, failing on any conflict.
    pub fn insert_values(&self, t: &Transaction, values: Vec<Value>) -> Result<Row, Error> {
        let row = self.insert(t, values.into_iter().map(Some).collect(), &OnConflict::Error)?;
        row.ok_or_else(|| Error::Internal("insert without ON CONFLICT produced no row".into()))
    }

    fn persist(&self, t: &Transaction, row: &Row) -> Result<(), Error> {
        for index in &self.indexes {
            index.check(row, t)?;
        }
        for index in &self.indexes {
            index.add(row, t)?;
        }
        let mut rows = t.rows(self.slot);
        rows.insert(row.id.clone(), row.clone());
        t.set(self.slot, Binding::Rows(rows));
        Ok(())
    }

    /// Applies `changes` (column position, new value) to the row with identity `id`, keeping the
    /// identity.
    pub fn update(
        &self,
        t: &Transaction,
        id: &RowId,
        changes: Vec<(usize, Value)>,
    ) -> Result<Row, Error> {
        let old = self
            .get(t, id)
            .ok_or_else(|| Error::not_found(ObjectKind::Row, id.as_str()))?;
        let mut values = old.to_vec();
        for (position, value) in changes {
            let column = self.columns.get(position).ok_or_else(|| {
                Error::InvalidQuery(format!("column position {position} out of range"))
            })?;
            if column.generated.is_some() {
                return Err(ConstraintViolation::GeneratedColumn {
                    column: column.name.clone(),
                }
                .into());
            }
            values[position] = value.coerce_to(&column.data_type)?;
        }
        self.fill_generated(&mut values)?;
        self.validate(&values)?;
        let new = old.with_values(values);
        for index in &self.indexes {
            index.check(&new, t)?;
        }
        for index in &self.indexes {
            index.delete(&old, t)?;
            index.add(&new, t)?;
        }
        let mut rows = t.rows(self.slot);
        rows.insert(new.id.clone(), new.clone());
        t.set(self.slot, Binding::Rows(rows));
        Ok(new)
    }

    /// Removes the row with identity `id`. The row must be a member of the table.
    pub fn delete(&self, t: &Transaction, id: &RowId) -> Result<Row, Error> {
        let mut rows = t.rows(self.slot);
        let Some(row) = rows.remove(id) else {
            return Err(Error::Internal(format!(
                "row {id} is not a member of table {}",
                self.name
            )));
        };
        for index in &self.indexes {
            index.delete(&row, t)?;
        }
        t.set(self.slot, Binding::Rows(rows));
        Ok(row)
    }

    pub fn truncate(&self, t: &Transaction) {
        t.set(self.slot, Binding::Rows(RowSet::new()));
        for index in &self.indexes {
            index.clear(t);
        }
    }

    /// Releases every slot this table owns.
    pub(crate) fn drop_data(&self, t: &Transaction) {
        t.remove(self.slot);
        for index in &self.indexes {
            t.remove(index.slot());
        }
        for seq in self.columns.iter().filter_map(|c| c.serial) {
            t.remove(seq);
        }
    }

    // Schema mutation

    fn refresh_index_refs(&mut self) {
        for (position, column) in self.columns.iter_mut().enumerate() {
            column.indexes = self
                .indexes
                .iter()
                .filter(|i| i.references_column(position))
                .map(|i| i.name().to_string())
                .collect();
        }
    }

    fn default_index_name(&self, def: &IndexDef) -> String {
        if def.primary {
            return format!("{}_pkey", self.name);
        }
        let parts: Vec<&str> = def
            .columns
            .iter()
            .map(|k| match k.expr.as_column() {
                Some(c) => self.columns.get(c).map(|c| c.name.as_str()).unwrap_or("expr"),
                None => "expr",
            })
            .collect();
        let suffix = if def.unique { "key" } else { "idx" };
        format!("{}_{}_{suffix}", self.name, parts.join("_"))
    }

    pub fn create_index(&mut self, t: &Transaction, def: IndexDef) -> Result<Arc<Index>, Error> {
        if def.columns.is_empty() {
            return Err(Error::InvalidQuery("an index needs at least one key".into()));
        }
        for key in &def.columns {
            if let Some(c) = key.expr.columns().into_iter().find(|c| *c >= self.columns.len()) {
                return Err(Error::InvalidQuery(format!(
                    "index key references column position {c} of table {}",
                    self.name
                )));
            }
        }
        if def.primary && self.primary_index().is_some() {
            return Err(Error::already_exists(
                ObjectKind::Constraint,
                format!("{}_pkey", self.name),
            ));
        }
        let name = def.name.clone().unwrap_or_else(|| self.default_index_name(&def));
        if self.index(&name).is_some() {
            return Err(Error::already_exists(ObjectKind::Index, name));
        }
        if let Some(existing) = self.indexes.iter().find(|i| i.same_signature(&def.columns)) {
            return Err(Error::already_exists(ObjectKind::Index, existing.name()));
        }
        let index = Index::new(
            name,
            &def,
            &self.column_types(),
            self.slots.next_slot(),
            self.slot,
        );
        atomically(t, |s| {
            index.clear(s);
            for row in self.scan(s) {
                index.add(&row, s)?;
            }
            Ok(())
        })?;
        if def.primary {
            for c in def.columns.iter().filter_map(|k| k.expr.as_column()) {
                self.columns[c].nullable = false;
            }
        }
        debug!(table = %self.name, index = %index.name(), unique = index.is_unique(), "created index");
        let index = Arc::new(index);
        self.indexes.push(index.clone());
        self.refresh_index_refs();
        Ok(index)
    }

    pub fn drop_index(&mut self, t: &Transaction, name: &str) -> Result<(), Error> {
        let position = self
            .indexes
            .iter()
            .position(|i| i.name() == name)
            .ok_or_else(|| Error::not_found(ObjectKind::Index, name))?;
        let index = self.indexes.remove(position);
        t.remove(index.slot());
        self.refresh_index_refs();
        debug!(table = %self.name, index = name, "dropped index");
        Ok(())
    }

    pub(crate) fn rename_index(&mut self, old: &str, new: &str) -> Result<(), Error> {
        let position = self
            .indexes
            .iter()
            .position(|i| i.name() == old)
            .ok_or_else(|| Error::not_found(ObjectKind::Index, old))?;
        let mut index = self.indexes[position].as_ref().clone();
        index.set_name(new.to_string());
        self.indexes[position] = Arc::new(index);
        self.refresh_index_refs();
        Ok(())
    }

    pub fn add_column(&mut self, t: &Transaction, def: ColumnDef) -> Result<(), Error> {
        if self.column_index(&def.name).is_some() {
            return Err(Error::already_exists(ObjectKind::Column, &def.name));
        }
        constant_default(&def.name, &def.default)?;
        let column = Column {
            name: def.name.clone(),
            data_type: def.data_type.clone(),
            nullable: def.nullable,
            default: def.default.clone(),
            generated: def.generated.clone(),
            serial: def.serial.then(|| self.slots.next_slot()),
            indexes: vec![],
        };
        atomically(t, |s| {
            let mut rows = RowSet::new();
            for row in self.scan(s) {
                let mut values = row.to_vec();
                let value = if let Some(seq) = column.serial {
                    next_serial(s, seq)
                } else if let Some(generated) = &column.generated {
                    values.push(Value::Null);
                    let v = generated.eval(&values)?;
                    values.pop();
                    v
                } else if let Some(default) = &column.default {
                    default.eval(&[])?
                } else {
                    Value::Null
                };
                let value = value.coerce_to(&column.data_type)?;
                if !column.nullable && value.is_null() {
                    return Err(ConstraintViolation::NotNullColumn {
                        column: column.name.clone(),
                    }
                    .into());
                }
                values.push(value);
                rows.insert(row.id.clone(), row.with_values(values));
            }
            s.set(self.slot, Binding::Rows(rows));
            Ok(())
        })?;
        self.columns.push(column);
        debug!(table = %self.name, column = %def.name, "added column");

        let key = if def.primary_key {
            Some(self.key_def(std::slice::from_ref(&def.name))?.primary())
        } else if def.unique {
            Some(self.key_def(std::slice::from_ref(&def.name))?.unique())
        } else {
            None
        };
        if let Some(key) = key {
            if let Err(e) = self.create_index(t, key) {
                self.drop_column(t, &def.name)?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drops a column along with every index and check that reads it.
    pub fn drop_column(&mut self, t: &Transaction, name: &str) -> Result<(), Error> {
        let position = self.column_position(name)?;
        if let Some(dependent) = self.columns.iter().enumerate().find(|(i, c)| {
            *i != position
                && c.generated
                    .as_ref()
                    .is_some_and(|g| g.columns().contains(&position))
        }) {
            return Err(Error::InvalidQuery(format!(
                "cannot drop column {name} because generated column {} depends on it",
                dependent.1.name
            )));
        }
        let map = |c: usize| match c.cmp(&position) {
            std::cmp::Ordering::Less => Some(c),
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(c - 1),
        };

        atomically(t, |s| {
            let rows: RowSet = self
                .scan(s)
                .map(|row| {
                    let mut values = row.to_vec();
                    values.remove(position);
                    (row.id.clone(), row.with_values(values))
                })
                .collect();
            s.set(self.slot, Binding::Rows(rows));
            Ok(())
        })?;

        let mut kept = Vec::with_capacity(self.indexes.len());
        for index in self.indexes.drain(..) {
            match index.remapped(&map) {
                Some(remapped) => kept.push(Arc::new(remapped)),
                None => {
                    debug!(index = %index.name(), "dropping index with dropped column");
                    t.remove(index.slot());
                }
            }
        }
        self.indexes = kept;
        self.checks = self
            .checks
            .drain(..)
            .filter_map(|c| {
                c.expr.remap(&map).map(|expr| CheckConstraint {
                    name: c.name,
                    expr,
                })
            })
            .collect();
        let removed = self.columns.remove(position);
        if let Some(seq) = removed.serial {
            t.remove(seq);
        }
        for column in self.columns.iter_mut() {
            column.generated = column.generated.as_ref().and_then(|g| g.remap(&map));
        }
        self.refresh_index_refs();
        debug!(table = %self.name, column = name, "dropped column");
        Ok(())
    }

    pub fn alter_column(
        &mut self,
        t: &Transaction,
        name: &str,
        change: AlterColumn,
    ) -> Result<(), Error> {
        let position = self.column_position(name)?;
        match change {
            AlterColumn::SetType(to) => {
                let mut types = self.column_types();
                types[position] = to.clone();
                let affected: Vec<Index> = self
                    .indexes
                    .iter()
                    .filter(|i| i.references_column(position))
                    .map(|i| i.with_key_types(&types))
                    .collect();
                atomically(t, |s| {
                    let mut rows = RowSet::new();
                    for row in self.scan(s) {
                        let mut values = row.to_vec();
                        values[position] = values[position].cast_to(&to)?;
                        rows.insert(row.id.clone(), row.with_values(values));
                    }
                    s.set(self.slot, Binding::Rows(rows));
                    for index in &affected {
                        index.clear(s);
                        for row in self.scan(s) {
                            index.add(&row, s)?;
                        }
                    }
                    Ok(())
                })?;
                for index in affected {
                    if let Some(slot) = self.indexes.iter_mut().find(|i| i.name() == index.name()) {
                        *slot = Arc::new(index);
                    }
                }
                self.columns[position].data_type = to;
            }
            AlterColumn::SetDefault(expr) => {
                constant_default(name, &Some(expr.clone()))?;
                self.columns[position].default = Some(expr);
            }
            AlterColumn::DropDefault => self.columns[position].default = None,
            AlterColumn::SetNotNull => {
                if self.scan(t).any(|row| row.values[position].is_null()) {
                    return Err(ConstraintViolation::NotNullColumn {
                        column: name.to_string(),
                    }
                    .into());
                }
                self.columns[position].nullable = false;
            }
            AlterColumn::DropNotNull => {
                if self
                    .primary_index()
                    .is_some_and(|i| i.references_column(position))
                {
                    return Err(Error::InvalidQuery(format!(
                        "column {name} is in a primary key"
                    )));
                }
                self.columns[position].nullable = true;
            }
        }
        debug!(table = %self.name, column = name, "altered column");
        Ok(())
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<(), Error> {
        if self.column_index(new).is_some() {
            return Err(Error::already_exists(ObjectKind::Column, new));
        }
        let position = self.column_position(old)?;
        self.columns[position].name = new.to_string();
        Ok(())
    }

    pub fn add_check(
        &mut self,
        t: &Transaction,
        name: Option<String>,
        expr: Expr,
    ) -> Result<(), Error> {
        let name = name.unwrap_or_else(|| format!("{}_check{}", self.name, self.checks.len() + 1));
        if self.checks.iter().any(|c| c.name == name) {
            return Err(Error::already_exists(ObjectKind::Constraint, name));
        }
        for row in self.scan(t) {
            if truth(&expr.eval(&row.values)?)? == Some(false) {
                return Err(ConstraintViolation::Check { name }.into());
            }
        }
        self.checks.push(CheckConstraint { name, expr });
        Ok(())
    }
}
