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

//! Versioned slot bindings with fork / commit / rollback.
//!
//! A `Transaction` is a node in a fork tree. Forking copies the parent's binding map, which is a
//! persistent `imbl` map, so a fork costs O(1) and the child reads its parent's state as of the
//! fork. Writes land in the child only. Committing folds every slot the child wrote back into the
//! parent; rolling back simply drops the child.

use crate::index::IndexKey;
use crate::row::{Row, RowId};
use imbl::{OrdMap, OrdSet};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Handle for a versioned binding. Tables, indexes and sequences each own one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey(pub u64);

#[derive(Debug, Default)]
pub struct SlotAllocator(AtomicU64);

impl SlotAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next_slot(&self) -> SlotKey {
        SlotKey(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

pub type RowSet = OrdMap<RowId, Row>;
/// Identities of the rows sharing one index key.
pub type Bucket = OrdSet<RowId>;
pub type IndexTree = OrdMap<IndexKey, Bucket>;

#[derive(Clone, Debug)]
pub enum Binding {
    Rows(RowSet),
    Tree(IndexTree),
    Sequence(i64),
}

struct TxState {
    id: u64,
    depth: usize,
    parent: Option<Transaction>,
    bindings: OrdMap<SlotKey, Binding>,
    written: OrdSet<SlotKey>,
    transient: HashMap<String, Rc<dyn Any>>,
    open: bool,
    next_id: Rc<Cell<u64>>,
}

/// Transaction handle. Clones share the same underlying scope.
#[derive(Clone)]
pub struct Transaction(Rc<RefCell<TxState>>);

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.borrow();
        f.debug_struct("Transaction")
            .field("id", &state.id)
            .field("depth", &state.depth)
            .field("open", &state.open)
            .finish()
    }
}

impl Transaction {
    pub fn root() -> Self {
        Transaction(Rc::new(RefCell::new(TxState {
            id: 0,
            depth: 0,
            parent: None,
            bindings: OrdMap::new(),
            written: OrdSet::new(),
            transient: HashMap::new(),
            open: true,
            next_id: Rc::new(Cell::new(1)),
        })))
    }

    fn state(&self) -> std::cell::Ref<'_, TxState> {
        let state = self.0.borrow();
        assert!(
            state.open,
            "transaction {} used after commit or rollback",
            state.id
        );
        state
    }

    fn state_mut(&self) -> std::cell::RefMut<'_, TxState> {
        let state = self.0.borrow_mut();
        assert!(
            state.open,
            "transaction {} used after commit or rollback",
            state.id
        );
        state
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    pub fn depth(&self) -> usize {
        self.0.borrow().depth
    }

    pub fn is_open(&self) -> bool {
        self.0.borrow().open
    }

    pub fn is_root(&self) -> bool {
        self.0.borrow().parent.is_none()
    }

    /// True when both handles refer to the same scope.
    pub fn same_scope(&self, other: &Transaction) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, slot: SlotKey) -> Option<Binding> {
        self.state().bindings.get(&slot).cloned()
    }

    /// Binds `slot` within this scope. Earlier forks keep their own view.
    pub fn set(&self, slot: SlotKey, value: Binding) {
        let mut state = self.state_mut();
        state.bindings.insert(slot, value);
        state.written.insert(slot);
    }

    pub fn remove(&self, slot: SlotKey) {
        let mut state = self.state_mut();
        state.bindings.remove(&slot);
        state.written.insert(slot);
    }

    pub fn rows(&self, slot: SlotKey) -> RowSet {
        match self.get(slot) {
            Some(Binding::Rows(rows)) => rows,
            _ => RowSet::new(),
        }
    }

    pub fn tree(&self, slot: SlotKey) -> IndexTree {
        match self.get(slot) {
            Some(Binding::Tree(tree)) => tree,
            _ => IndexTree::new(),
        }
    }

    pub fn sequence(&self, slot: SlotKey) -> i64 {
        match self.get(slot) {
            Some(Binding::Sequence(n)) => n,
            _ => 0,
        }
    }

    pub fn fork(&self) -> Transaction {
        let state = self.state();
        let id = state.next_id.get();
        state.next_id.set(id + 1);
        trace!(parent = state.id, child = id, "fork");
        Transaction(Rc::new(RefCell::new(TxState {
            id,
            depth: state.depth + 1,
            parent: Some(self.clone()),
            bindings: state.bindings.clone(),
            written: OrdSet::new(),
            transient: HashMap::new(),
            open: true,
            next_id: state.next_id.clone(),
        })))
    }

    /// Folds this scope's writes into its parent and returns the parent. Committing the root
    /// returns a fresh fork of it.
    pub fn commit(&self) -> Transaction {
        let parent = self.state().parent.clone();
        let Some(parent) = parent else {
            return self.fork();
        };
        let mut state = self.state_mut();
        {
            let mut target = parent.state_mut();
            for slot in state.written.iter() {
                match state.bindings.get(slot) {
                    Some(binding) => target.bindings.insert(*slot, binding.clone()),
                    None => target.bindings.remove(slot),
                };
                target.written.insert(*slot);
            }
        }
        trace!(tx = state.id, writes = state.written.len(), "commit");
        state.open = false;
        state.transient.clear();
        parent
    }

    /// Discards this scope's writes and returns the parent. Rolling back the root leaves it as is.
    pub fn rollback(&self) -> Transaction {
        let parent = self.state().parent.clone();
        let Some(parent) = parent else {
            return self.clone();
        };
        let mut state = self.state_mut();
        trace!(tx = state.id, writes = state.written.len(), "rollback");
        state.open = false;
        state.bindings = OrdMap::new();
        state.transient.clear();
        parent
    }

    /// Commits repeatedly until the root is reached, and returns the root.
    pub fn full_commit(&self) -> Transaction {
        let mut tx = self.clone();
        while !tx.is_root() {
            tx = tx.commit();
        }
        tx
    }

    pub fn clear_transient(&self) {
        self.state_mut().transient.clear();
    }

    pub fn get_transient<T: Any>(&self, key: &str) -> Option<Rc<T>> {
        let value = self.state().transient.get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    pub fn set_transient<T: Any>(&self, key: impl Into<String>, value: T) -> Rc<T> {
        let value = Rc::new(value);
        self.state_mut()
            .transient
            .insert(key.into(), value.clone() as Rc<dyn Any>);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(n: i64) -> Binding {
        Binding::Sequence(n)
    }

    #[test]
    fn test_fork_reads_through_to_parent() {
        let root = Transaction::root();
        root.set(SlotKey(1), seq(10));
        let child = root.fork();
        assert_eq!(child.sequence(SlotKey(1)), 10);
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn test_child_writes_invisible_until_commit() {
        let root = Transaction::root();
        root.set(SlotKey(1), seq(1));
        let child = root.fork();
        child.set(SlotKey(1), seq(2));
        child.set(SlotKey(2), seq(3));
        assert_eq!(root.sequence(SlotKey(1)), 1);
        assert!(root.get(SlotKey(2)).is_none());

        let parent = child.commit();
        assert!(parent.same_scope(&root));
        assert_eq!(root.sequence(SlotKey(1)), 2);
        assert_eq!(root.sequence(SlotKey(2)), 3);
    }

    #[test]
    fn test_rollback_discards() {
        let root = Transaction::root();
        root.set(SlotKey(1), seq(1));
        let child = root.fork();
        child.set(SlotKey(1), seq(5));
        child.remove(SlotKey(1));
        let parent = child.rollback();
        assert_eq!(parent.sequence(SlotKey(1)), 1);
        assert!(!child.is_open());
    }

    #[test]
    fn test_committed_removal_propagates() {
        let root = Transaction::root();
        root.set(SlotKey(4), seq(1));
        let child = root.fork();
        child.remove(SlotKey(4));
        child.commit();
        assert!(root.get(SlotKey(4)).is_none());
    }

    #[test]
    fn test_sibling_forks_are_isolated() {
        let root = Transaction::root();
        let a = root.fork();
        let b = root.fork();
        a.set(SlotKey(1), seq(1));
        assert!(b.get(SlotKey(1)).is_none());
        a.commit();
        // b forked before a committed, so keeps its snapshot.
        assert!(b.get(SlotKey(1)).is_none());
    }

    #[test]
    fn test_full_commit_reaches_root() {
        let root = Transaction::root();
        let t = root.fork().fork().fork();
        t.set(SlotKey(9), seq(9));
        let top = t.full_commit();
        assert!(top.same_scope(&root));
        assert_eq!(root.sequence(SlotKey(9)), 9);
    }

    #[test]
    fn test_commit_on_root_forks() {
        let root = Transaction::root();
        let next = root.commit();
        assert_eq!(next.depth(), 1);
        assert!(root.is_open());
    }

    #[test]
    fn test_transient_cache() {
        let t = Transaction::root().fork();
        t.set_transient("affected", 3usize);
        assert_eq!(t.get_transient::<usize>("affected").as_deref(), Some(&3));
        assert!(t.get_transient::<String>("affected").is_none());
        t.clear_transient();
        assert!(t.get_transient::<usize>("affected").is_none());
    }

    #[test]
    #[should_panic(expected = "used after commit or rollback")]
    fn test_stale_handle_panics() {
        let root = Transaction::root();
        let child = root.fork();
        child.rollback();
        child.get(SlotKey(1));
    }
}
