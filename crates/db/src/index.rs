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

//! Transactionally versioned B-tree secondary indexes.
//!
//! An index maps a key tuple, computed from the row through the index's key expressions, to a
//! bucket holding the identities of the rows sharing that key. Both the tree and its buckets are persistent maps bound to the
//! index's slot in a `Transaction`, so every mutation is undone by rollback for free.
//!
//! Range traversals are expressed in value order of the leading key column. For a descending
//! index the bounds are swapped into tree order before walking.

use crate::expr::Expr;
use crate::row::{Row, RowId};
use crate::tx::{Binding, Bucket, IndexTree, RowSet, SlotKey, Transaction};
use crate::{ConstraintViolation, Error};
use memrel_var::{DataType, Value};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::ops::Bound;
use std::sync::Arc;
use tracing::trace;

/// One key-producing expression of an index, with its sort flags.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyColumn {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_last: bool,
}

impl KeyColumn {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_last: true,
        }
    }

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
}

#[derive(Clone, Debug)]
pub struct KeyPart {
    pub value: Value,
    descending: bool,
    nulls_last: bool,
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.value.is_null(), other.value.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_last => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, true) if self.nulls_last => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let ord = self.value.cmp(&other.value);
                if self.descending { ord.reverse() } else { ord }
            }
        }
    }
}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

/// A key tuple, ordered lexicographically by the index's comparator.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct IndexKey(Arc<[KeyPart]>);

impl IndexKey {
    pub fn values(&self) -> Vec<Value> {
        self.0.iter().map(|p| p.value.clone()).collect()
    }

    pub fn first(&self) -> Option<&Value> {
        self.0.first().map(|p| &p.value)
    }

    pub fn has_null(&self) -> bool {
        self.0.iter().any(|p| p.value.is_null())
    }

    pub fn all_null(&self) -> bool {
        self.0.iter().all(|p| p.value.is_null())
    }
}

impl Display for IndexKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.value.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub count: usize,
}

/// What a caller asks for when creating an index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDef {
    pub name: Option<String>,
    pub columns: Vec<KeyColumn>,
    pub unique: bool,
    pub not_null: bool,
    pub primary: bool,
}

impl IndexDef {
    pub fn new(columns: Vec<KeyColumn>) -> Self {
        Self {
            name: None,
            columns,
            unique: false,
            not_null: false,
            primary: false,
        }
    }

    pub fn on(expr: Expr) -> Self {
        Self::new(vec![KeyColumn::asc(expr)])
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.unique = true;
        self.not_null = true;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Index {
    name: String,
    columns: Vec<KeyColumn>,
    key_types: Vec<DataType>,
    unique: bool,
    not_null: bool,
    primary: bool,
    slot: SlotKey,
    table_slot: SlotKey,
}

impl Index {
    pub(crate) fn new(
        name: String,
        def: &IndexDef,
        column_types: &[DataType],
        slot: SlotKey,
        table_slot: SlotKey,
    ) -> Self {
        let key_types = def
            .columns
            .iter()
            .map(|c| c.expr.data_type(column_types))
            .collect();
        Self {
            name,
            columns: def.columns.clone(),
            key_types,
            unique: def.unique || def.primary,
            not_null: def.not_null || def.primary,
            primary: def.primary,
            slot,
            table_slot,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    pub fn expressions(&self) -> Vec<Expr> {
        self.columns.iter().map(|c| c.expr.clone()).collect()
    }

    pub fn key_types(&self) -> &[DataType] {
        &self.key_types
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn requires_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn slot(&self) -> SlotKey {
        self.slot
    }

    pub fn is_descending(&self) -> bool {
        self.columns.first().is_some_and(|c| c.descending)
    }

    /// True when the index keys exactly the given expressions, in order.
    pub fn covers(&self, exprs: &[Expr]) -> bool {
        self.columns.len() == exprs.len() && self.columns.iter().zip(exprs).all(|(c, e)| &c.expr == e)
    }

    /// Same keys and same flags.
    pub fn same_signature(&self, columns: &[KeyColumn]) -> bool {
        self.columns == columns
    }

    pub(crate) fn references_column(&self, column: usize) -> bool {
        self.columns
            .iter()
            .any(|c| c.expr.columns().contains(&column))
    }

    /// The same index with its key expressions renumbered, if every referenced column survives.
    pub(crate) fn remapped(&self, map: &impl Fn(usize) -> Option<usize>) -> Option<Index> {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                c.expr.remap(map).map(|expr| KeyColumn {
                    expr,
                    descending: c.descending,
                    nulls_last: c.nulls_last,
                })
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Index {
            columns,
            ..self.clone()
        })
    }

    pub(crate) fn with_key_types(&self, column_types: &[DataType]) -> Index {
        Index {
            key_types: self
                .columns
                .iter()
                .map(|c| c.expr.data_type(column_types))
                .collect(),
            ..self.clone()
        }
    }

    fn make_key(&self, values: Vec<Value>) -> IndexKey {
        IndexKey(
            values
                .into_iter()
                .zip(&self.columns)
                .map(|(value, c)| KeyPart {
                    value,
                    descending: c.descending,
                    nulls_last: c.nulls_last,
                })
                .collect(),
        )
    }

    pub fn key_of(&self, row: &Row) -> Result<IndexKey, Error> {
        let values = self
            .columns
            .iter()
            .map(|c| c.expr.eval(&row.values))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.make_key(values))
    }

    /// Builds a lookup key from probe values, refusing values that cannot be compared with the
    /// indexed types.
    pub fn probe(&self, values: Vec<Value>) -> Result<IndexKey, Error> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidQuery(format!(
                "index {} has {} key columns, got {} probe values",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        for (v, ty) in values.iter().zip(&self.key_types) {
            ty.check_comparable(&v.data_type())?;
        }
        Ok(self.make_key(values))
    }

    /// Probe keys sorted by the index comparator, as `nin` expects them.
    pub fn sorted_probes(&self, probes: Vec<Vec<Value>>) -> Result<Vec<IndexKey>, Error> {
        let mut keys = probes
            .into_iter()
            .map(|p| self.probe(p))
            .collect::<Result<Vec<_>, _>>()?;
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    /// Verifies `row` could be added without mutating anything. Returns its key.
    pub fn check(&self, row: &Row, t: &Transaction) -> Result<IndexKey, Error> {
        let key = self.key_of(row)?;
        if self.not_null && key.has_null() {
            return Err(ConstraintViolation::NotNullIndex {
                index: self.name.clone(),
            }
            .into());
        }
        // SQL unique indexes treat nulls as distinct.
        if self.unique && !key.has_null() {
            if let Some(bucket) = t.tree(self.slot).get(&key) {
                if bucket.iter().any(|id| id != &row.id) {
                    return Err(ConstraintViolation::Unique {
                        index: self.name.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(key)
    }

    /// Adds `row` under its key. Re-adding a row already present under the same identity is a
    /// no-op.
    pub fn add(&self, row: &Row, t: &Transaction) -> Result<(), Error> {
        let key = self.check(row, t)?;
        let mut tree = t.tree(self.slot);
        let mut bucket = tree.get(&key).cloned().unwrap_or_default();
        bucket.insert(row.id.clone());
        trace!(index = %self.name, %key, row = %row.id, "index add");
        tree.insert(key, bucket);
        t.set(self.slot, Binding::Tree(tree));
        Ok(())
    }

    pub fn delete(&self, row: &Row, t: &Transaction) -> Result<(), Error> {
        let key = self.key_of(row)?;
        let mut tree = t.tree(self.slot);
        let Some(mut bucket) = tree.get(&key).cloned() else {
            return Ok(());
        };
        bucket.remove(&row.id);
        if bucket.is_empty() {
            tree.remove(&key);
        } else {
            tree.insert(key, bucket);
        }
        t.set(self.slot, Binding::Tree(tree));
        Ok(())
    }

    pub fn clear(&self, t: &Transaction) {
        t.set(self.slot, Binding::Tree(IndexTree::new()));
    }

    fn scan(
        &self,
        t: &Transaction,
        lower: Bound<IndexKey>,
        upper: Bound<IndexKey>,
        nulls: NullMode,
    ) -> IndexScan {
        IndexScan {
            cursor: Cursor::new(t.tree(self.slot), lower, upper, nulls),
            rows: t.rows(self.table_slot),
            excluded: VecDeque::new(),
            pending: Vec::new().into_iter(),
        }
    }

    /// Value-ordered bounds to a non-null tree traversal.
    fn value_range(
        &self,
        t: &Transaction,
        low: Bound<IndexKey>,
        high: Bound<IndexKey>,
    ) -> IndexScan {
        if self.is_descending() {
            self.scan(t, high, low, NullMode::Skip)
        } else {
            self.scan(t, low, high, NullMode::Skip)
        }
    }

    /// Every row in key order, null keys included.
    pub fn all(&self, t: &Transaction) -> IndexScan {
        self.scan(t, Bound::Unbounded, Bound::Unbounded, NullMode::Include)
    }

    pub fn eq(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.scan(
            t,
            Bound::Included(key.clone()),
            Bound::Included(key),
            NullMode::Include,
        )
    }

    pub fn gt(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.value_range(t, Bound::Excluded(key), Bound::Unbounded)
    }

    pub fn ge(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.value_range(t, Bound::Included(key), Bound::Unbounded)
    }

    pub fn lt(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.value_range(t, Bound::Unbounded, Bound::Excluded(key))
    }

    pub fn le(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.value_range(t, Bound::Unbounded, Bound::Included(key))
    }

    pub fn between(&self, low: IndexKey, high: IndexKey, t: &Transaction) -> IndexScan {
        self.value_range(t, Bound::Included(low), Bound::Included(high))
    }

    /// Rows whose leading text key starts with `prefix`.
    pub fn prefix(&self, prefix: &str, t: &Transaction) -> Result<IndexScan, Error> {
        if self.columns.len() != 1 {
            return Err(Error::Unsupported(format!(
                "prefix traversal over composite index {}",
                self.name
            )));
        }
        let low = self.probe(vec![memrel_var::v_text(prefix)])?;
        let high = match successor(prefix) {
            Some(s) => Bound::Excluded(self.make_key(vec![memrel_var::v_text(&s)])),
            None => Bound::Unbounded,
        };
        Ok(self.value_range(t, Bound::Included(low), high))
    }

    /// Every non-null key except `key`.
    pub fn neq(&self, key: IndexKey, t: &Transaction) -> IndexScan {
        self.nin(vec![key], t)
    }

    /// Every non-null key except the given ones, which must be sorted by the index comparator.
    /// Yields the runs of rows strictly between successive excluded keys.
    pub fn nin(&self, keys: Vec<IndexKey>, t: &Transaction) -> IndexScan {
        debug_assert!(keys.is_sorted(), "nin keys must be pre-sorted");
        let mut scan = self.scan(t, Bound::Unbounded, Bound::Unbounded, NullMode::Skip);
        scan.excluded = keys.into();
        scan
    }

    /// Rows whose key is entirely null.
    pub fn is_null(&self, t: &Transaction) -> IndexScan {
        let key = self.make_key(vec![Value::Null; self.columns.len()]);
        self.eq(key, t)
    }

    pub fn is_not_null(&self, t: &Transaction) -> IndexScan {
        self.scan(t, Bound::Unbounded, Bound::Unbounded, NullMode::Skip)
    }

    pub fn has_key(&self, key: &IndexKey, t: &Transaction) -> bool {
        t.tree(self.slot).contains_key(key)
    }

    /// Row count, either overall or under one key.
    pub fn stats(&self, t: &Transaction, key: Option<&IndexKey>) -> IndexStats {
        let count = match key {
            None => t.rows(self.table_slot).len(),
            Some(key) => t.tree(self.slot).get(key).map(|b| b.len()).unwrap_or(0),
        };
        IndexStats { count }
    }

    pub fn distinct_keys(&self, t: &Transaction) -> usize {
        t.tree(self.slot).len()
    }

    /// `distinct_keys / total_rows`, 0 when empty.
    pub fn entropy(&self, t: &Transaction) -> f64 {
        let total = self.stats(t, None).count;
        if total == 0 {
            return 0.0;
        }
        self.distinct_keys(t) as f64 / total as f64
    }

    /// Distinct keys in tree order with their bucket sizes.
    pub fn keys(&self, t: &Transaction) -> KeyScan {
        KeyScan {
            cursor: Cursor::new(
                t.tree(self.slot),
                Bound::Unbounded,
                Bound::Unbounded,
                NullMode::Include,
            ),
        }
    }

    /// Smallest non-null key in value order.
    pub fn min_key(&self, t: &Transaction) -> Option<IndexKey> {
        let tree = t.tree(self.slot);
        let mut non_null = tree.keys().filter(|k| !k.has_null());
        if self.is_descending() {
            non_null.next_back().cloned()
        } else {
            non_null.next().cloned()
        }
    }

    /// Largest non-null key in value order.
    pub fn max_key(&self, t: &Transaction) -> Option<IndexKey> {
        let tree = t.tree(self.slot);
        let mut non_null = tree.keys().filter(|k| !k.has_null());
        if self.is_descending() {
            non_null.next().cloned()
        } else {
            non_null.next_back().cloned()
        }
    }
}

/// The smallest string greater than every string starting with `prefix`.
fn successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NullMode {
    Include,
    Skip,
}

/// Walks a snapshot of a tree one key at a time, re-seeking past the last key seen. Owns its
/// snapshot, so it outlives the borrow of the transaction it came from.
struct Cursor {
    tree: IndexTree,
    lower: Bound<IndexKey>,
    upper: Bound<IndexKey>,
    nulls: NullMode,
}

impl Cursor {
    fn new(tree: IndexTree, lower: Bound<IndexKey>, upper: Bound<IndexKey>, nulls: NullMode) -> Self {
        Self {
            tree,
            lower,
            upper,
            nulls,
        }
    }

    fn is_empty_range(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
                l >= u
            }
            _ => false,
        }
    }

    fn next_entry(&mut self) -> Option<(IndexKey, Bucket)> {
        loop {
            if self.is_empty_range() {
                return None;
            }
            let (key, bucket) = self
                .tree
                .range((self.lower.clone(), self.upper.clone()))
                .next()
                .map(|(k, b)| (k.clone(), b.clone()))?;
            self.lower = Bound::Excluded(key.clone());
            if self.nulls == NullMode::Skip && key.has_null() {
                continue;
            }
            return Some((key, bucket));
        }
    }
}

/// Lazy row sequence produced by an index traversal. Resolves identities against the table's row
/// set as of the start of the traversal.
pub struct IndexScan {
    cursor: Cursor,
    rows: RowSet,
    excluded: VecDeque<IndexKey>,
    pending: std::vec::IntoIter<RowId>,
}

impl Iterator for IndexScan {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.pending.next() {
                match self.rows.get(&id) {
                    Some(row) => return Some(row.clone()),
                    None => continue,
                }
            }
            let (key, bucket) = self.cursor.next_entry()?;
            while self.excluded.front().is_some_and(|e| e < &key) {
                self.excluded.pop_front();
            }
            if self.excluded.front() == Some(&key) {
                continue;
            }
            self.pending = bucket.iter().cloned().collect::<Vec<_>>().into_iter();
        }
    }
}

pub struct KeyScan {
    cursor: Cursor,
}

impl Iterator for KeyScan {
    type Item = (IndexKey, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_entry().map(|(k, b)| (k, b.len()))
    }
}
