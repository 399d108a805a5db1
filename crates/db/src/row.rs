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

use memrel_var::Value;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Synthetic, process-unique row identity. Assigned once at first insertion and preserved across
/// updates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(Arc<str>);

impl RowId {
    pub fn new(id: &str) -> Self {
        RowId(Arc::from(id))
    }

    /// Identity of a row produced by combining a left and a right row. A missing side (the
    /// null-extended side of an outer join) is rendered as `-`.
    pub fn joined(left: Option<&RowId>, right: Option<&RowId>) -> Self {
        let l = left.map(|id| id.as_str()).unwrap_or("-");
        let r = right.map(|id| id.as_str()).unwrap_or("-");
        RowId(Arc::from(format!("{l}/{r}")))
    }

    /// Identity of a row an operator produced from this one, e.g. by reshaping it. Distinct tags
    /// give distinct identities.
    pub fn derived(&self, tag: &str) -> Self {
        RowId(Arc::from(format!("{}:{tag}", self.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic row identity source. Ids are zero-padded hex, so their lexical order is their
/// allocation order.
#[derive(Debug, Default)]
pub struct RowIdGen(AtomicU64);

impl RowIdGen {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next_id(&self) -> RowId {
        let n = self.0.fetch_add(1, Ordering::Relaxed);
        RowId(Arc::from(format!("{n:016x}")))
    }
}

/// A positional bag of values plus its identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Row {
    pub id: RowId,
    pub values: Arc<[Value]>,
}

impl Row {
    pub fn new(id: RowId, values: Vec<Value>) -> Self {
        Self {
            id,
            values: Arc::from(values),
        }
    }

    pub fn get(&self, column: usize) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Same identity, different contents.
    pub fn with_values(&self, values: Vec<Value>) -> Self {
        Row::new(self.id.clone(), values)
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.values.to_vec()
    }
}
