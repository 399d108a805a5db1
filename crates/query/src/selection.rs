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

//! The contract every relational operator implements.
//!
//! A `Selection` holds only its recipe. All data is read through the `Transaction` handed to each
//! call, and all iteration state lives in the returned stream, so one selection can be enumerated
//! any number of times against any transaction.

use itertools::Itertools;
use memrel_db::{Error, Expr, IndexStats, ObjectKind, Row, Transaction};
use memrel_var::{DataType, Value};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row, Error>> + 'a>;

pub fn empty_stream<'a>() -> RowStream<'a> {
    Box::new(std::iter::empty())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Table name or alias the column can be qualified with.
    pub qualifier: Option<String>,
    pub data_type: DataType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, qualifier: Option<&str>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            qualifier: qualifier.map(str::to_string),
            data_type,
        }
    }

    /// Matches `name` or `qualifier.name`.
    pub fn matches(&self, reference: &str) -> bool {
        match reference.split_once('.') {
            Some((q, n)) => self.qualifier.as_deref() == Some(q) && self.name == n,
            None => self.name == reference,
        }
    }
}

pub fn resolve_column(columns: &[ColumnInfo], reference: &str) -> Result<usize, Error> {
    let mut found = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.matches(reference))
        .map(|(i, _)| i);
    let Some(first) = found.next() else {
        return Err(Error::not_found(ObjectKind::Column, reference));
    };
    if found.next().is_some() {
        return Err(Error::InvalidQuery(format!(
            "column reference \"{reference}\" is ambiguous"
        )));
    }
    Ok(first)
}

/// An index traversal request, in value order.
#[derive(Clone, Debug, PartialEq)]
pub enum Probe {
    Eq(Vec<Value>),
    Gt(Vec<Value>),
    Ge(Vec<Value>),
    Lt(Vec<Value>),
    Le(Vec<Value>),
    Between(Vec<Value>, Vec<Value>),
    Prefix(String),
    In(Vec<Vec<Value>>),
    NotIn(Vec<Vec<Value>>),
    IsNull,
    IsNotNull,
}

impl Display for Probe {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn key(values: &[Value]) -> String {
            values.iter().join(", ")
        }
        fn keys(list: &[Vec<Value>]) -> String {
            list.iter().map(|k| key(k)).join("; ")
        }
        match self {
            Probe::Eq(k) => write!(f, "= {}", key(k)),
            Probe::Gt(k) => write!(f, "> {}", key(k)),
            Probe::Ge(k) => write!(f, ">= {}", key(k)),
            Probe::Lt(k) => write!(f, "< {}", key(k)),
            Probe::Le(k) => write!(f, "<= {}", key(k)),
            Probe::Between(l, h) => write!(f, "between {} and {}", key(l), key(h)),
            Probe::Prefix(p) => write!(f, "prefix '{p}'"),
            Probe::In(list) => write!(f, "in ({})", keys(list)),
            Probe::NotIn(list) => write!(f, "not in ({})", keys(list)),
            Probe::IsNull => write!(f, "is null"),
            Probe::IsNotNull => write!(f, "is not null"),
        }
    }
}

/// Smallest and largest non-null keys, in value order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyBounds {
    pub min: Option<Vec<Value>>,
    pub max: Option<Vec<Value>>,
}

/// An index as seen through some selection: traversals yield rows shaped like that selection's
/// output and restricted to its membership.
pub trait IndexSource: Debug {
    fn describe(&self) -> String;

    fn key_types(&self) -> Vec<DataType>;

    fn scan<'a>(&'a self, probe: &Probe, t: &'a Transaction) -> Result<RowStream<'a>, Error>;

    /// Row count overall, or under one key. An upper bound for restricted sources.
    fn stats(&self, t: &Transaction, key: Option<&[Value]>) -> Result<IndexStats, Error>;

    fn distinct_keys(&self, t: &Transaction) -> usize;

    fn entropy(&self, t: &Transaction) -> f64;

    fn is_unique(&self) -> bool;

    /// Distinct keys in index order with their exact row counts. `None` when the counts of the
    /// underlying index do not describe this source exactly.
    fn keys(&self, _t: &Transaction) -> Option<Vec<(Vec<Value>, usize)>> {
        None
    }

    /// `None` when the bounds of the underlying index do not describe this source exactly.
    fn bounds(&self, _t: &Transaction) -> Option<KeyBounds> {
        None
    }
}

pub trait Selection: Debug {
    fn columns(&self) -> &[ColumnInfo];

    fn get_column(&self, reference: &str) -> Result<usize, Error> {
        resolve_column(self.columns(), reference)
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a>;

    /// Whether `row` (same identity, same values) is part of this selection's output.
    fn has_item(&self, row: &Row, t: &Transaction) -> Result<bool, Error> {
        for candidate in self.enumerate(t) {
            let candidate = candidate?;
            if candidate.id == row.id && candidate.values == row.values {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `row`, already known to be a row of this selection's input, passes it. Filters
    /// answer from their predicate alone.
    fn admits(&self, row: &Row, t: &Transaction) -> Result<bool, Error> {
        self.has_item(row, t)
    }

    /// An index keyed on `exprs`, expressed over this selection's columns.
    fn get_index(&self, _exprs: &[Expr]) -> Option<Arc<dyn IndexSource>> {
        None
    }

    /// Exact row count, when it is cheap to know.
    fn stats(&self, _t: &Transaction) -> Option<IndexStats> {
        None
    }

    /// Cost estimate of enumerating this selection. Lower is cheaper.
    fn entropy(&self, t: &Transaction) -> f64;

    fn explain(&self, t: &Transaction) -> Plan;
}

pub fn collect_rows(selection: &dyn Selection, t: &Transaction) -> Result<Vec<Row>, Error> {
    selection.enumerate(t).collect()
}

/// Operator tree annotated with the strategy each node would use right now.
#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub operator: &'static str,
    pub detail: String,
    pub entropy: f64,
    pub children: Vec<Plan>,
}

impl Plan {
    pub fn new(operator: &'static str, detail: impl Into<String>, entropy: f64) -> Self {
        Self {
            operator,
            detail: detail.into(),
            entropy,
            children: vec![],
        }
    }

    pub fn with_child(mut self, child: Plan) -> Self {
        self.children.push(child);
        self
    }

    /// First node, depth first, running `operator`.
    pub fn find(&self, operator: &str) -> Option<&Plan> {
        if self.operator == operator {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(operator))
    }

    fn fmt_indented(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        writeln!(
            f,
            "{:indent$}{} {} (entropy={:.2})",
            "",
            self.operator,
            self.detail,
            self.entropy,
            indent = depth * 2
        )?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}
