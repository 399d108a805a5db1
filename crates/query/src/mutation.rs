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

//! `INSERT`, `UPDATE` and `DELETE` as selections over their affected rows (`RETURNING *`).
//!
//! A mutation runs the first time it is enumerated within a statement. Its outcome is memoized in
//! the statement transaction's transient cache, so enumerating it again, or reading its affected
//! count, never applies the change twice.

use crate::context::BuildContext;
use crate::selection::{ColumnInfo, Plan, RowStream, Selection, collect_rows};
use crate::table_source::TableSelection;
use memrel_db::{Error, Expr, OnConflict, Row, Table, Transaction};
use memrel_var::Value;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Rows a mutation produced: inserted, updated (new values) or deleted (old values).
#[derive(Debug)]
pub struct MutationResult {
    pub rows: Vec<Row>,
}

impl MutationResult {
    pub fn affected(&self) -> usize {
        self.rows.len()
    }
}

/// Where inserted rows come from. `None` in a values row means `DEFAULT`.
#[derive(Debug)]
pub enum InsertSource {
    Values(Vec<Vec<Option<Expr>>>),
    Query(Arc<dyn Selection>),
}

#[derive(Debug)]
enum Kind {
    Insert {
        targets: Vec<usize>,
        source: InsertSource,
        on_conflict: OnConflict,
    },
    Update {
        source: Arc<dyn Selection>,
        assignments: Vec<(usize, Expr)>,
    },
    Delete {
        source: Arc<dyn Selection>,
    },
}

#[derive(Debug)]
pub struct Mutation {
    table: Arc<Table>,
    kind: Kind,
    key: String,
    columns: Vec<ColumnInfo>,
}

impl Mutation {
    /// `targets` names the columns values are given for, in order; empty means all columns.
    pub fn insert(
        ctx: &BuildContext,
        table: Arc<Table>,
        targets: &[&str],
        source: InsertSource,
        on_conflict: OnConflict,
    ) -> Result<Self, Error> {
        let targets = if targets.is_empty() {
            (0..table.columns().len()).collect()
        } else {
            targets
                .iter()
                .map(|name| table.column_position(name))
                .collect::<Result<Vec<_>, _>>()?
        };
        let widths: Vec<usize> = match &source {
            InsertSource::Values(rows) => rows.iter().map(Vec::len).collect(),
            InsertSource::Query(query) => vec![query.columns().len()],
        };
        if let Some(width) = widths.into_iter().find(|w| *w != targets.len()) {
            return Err(Error::InvalidQuery(format!(
                "INSERT into {} has {width} expressions for {} target columns",
                table.name(),
                targets.len()
            )));
        }
        if let InsertSource::Values(rows) = &source {
            if rows.iter().flatten().flatten().any(|e| !e.is_constant()) {
                return Err(Error::InvalidQuery(
                    "INSERT ... VALUES expressions cannot reference columns".into(),
                ));
            }
        }
        Ok(Self::new(
            ctx,
            table,
            Kind::Insert {
                targets,
                source,
                on_conflict,
            },
        ))
    }

    /// Updates every row of `source`, which must yield rows of `table` (e.g. a filter over a
    /// scan of it). Assignments are evaluated against the old row.
    pub fn update(
        ctx: &BuildContext,
        table: Arc<Table>,
        source: Arc<dyn Selection>,
        assignments: Vec<(usize, Expr)>,
    ) -> Result<Self, Error> {
        Self::check_source(&table, source.as_ref())?;
        let arity = table.columns().len();
        if let Some(c) = assignments
            .iter()
            .flat_map(|(target, e)| std::iter::once(*target).chain(e.columns()))
            .find(|c| *c >= arity)
        {
            return Err(Error::InvalidQuery(format!(
                "UPDATE references column position {c}, {} has {arity} columns",
                table.name()
            )));
        }
        Ok(Self::new(
            ctx,
            table,
            Kind::Update {
                source,
                assignments,
            },
        ))
    }

    pub fn delete(
        ctx: &BuildContext,
        table: Arc<Table>,
        source: Arc<dyn Selection>,
    ) -> Result<Self, Error> {
        Self::check_source(&table, source.as_ref())?;
        Ok(Self::new(ctx, table, Kind::Delete { source }))
    }

    fn new(ctx: &BuildContext, table: Arc<Table>, kind: Kind) -> Self {
        let columns = TableSelection::new(table.clone()).columns().to_vec();
        let key = ctx.unique_key(&format!("mutation:{}", table.name()));
        Self {
            table,
            kind,
            key,
            columns,
        }
    }

    fn check_source(table: &Table, source: &dyn Selection) -> Result<(), Error> {
        if source.columns().len() != table.columns().len() {
            return Err(Error::InvalidQuery(format!(
                "mutation source has {} columns, {} has {}",
                source.columns().len(),
                table.name(),
                table.columns().len()
            )));
        }
        Ok(())
    }

    /// Applies the mutation once per statement transaction and returns its outcome.
    pub fn execute(&self, t: &Transaction) -> Result<Rc<MutationResult>, Error> {
        if let Some(done) = t.get_transient::<MutationResult>(&self.key) {
            return Ok(done);
        }
        let result = self.run(t)?;
        debug!(
            table = self.table.name(),
            key = %self.key,
            affected = result.affected(),
            "mutation applied"
        );
        Ok(t.set_transient(self.key.clone(), result))
    }

    pub fn affected(&self, t: &Transaction) -> Result<usize, Error> {
        Ok(self.execute(t)?.affected())
    }

    fn run(&self, t: &Transaction) -> Result<MutationResult, Error> {
        let mut rows = vec![];
        match &self.kind {
            Kind::Insert {
                targets,
                source,
                on_conflict,
            } => {
                let inputs: Vec<Vec<Option<Value>>> = match source {
                    InsertSource::Values(values) => values
                        .iter()
                        .map(|row| {
                            row.iter()
                                .map(|e| e.as_ref().map(|e| e.eval(&[])).transpose())
                                .collect::<Result<Vec<_>, _>>()
                        })
                        .collect::<Result<_, _>>()?,
                    InsertSource::Query(query) => collect_rows(query.as_ref(), t)?
                        .into_iter()
                        .map(|row| row.values.iter().cloned().map(Some).collect())
                        .collect(),
                };
                for input in inputs {
                    let mut full = vec![None; self.table.columns().len()];
                    for (target, value) in targets.iter().zip(input) {
                        full[*target] = value;
                    }
                    if let Some(row) = self.table.insert(t, full, on_conflict)? {
                        rows.push(row);
                    }
                }
            }
            Kind::Update {
                source,
                assignments,
            } => {
                for row in collect_rows(source.as_ref(), t)? {
                    let changes = assignments
                        .iter()
                        .map(|(c, e)| Ok((*c, e.eval(&row.values)?)))
                        .collect::<Result<Vec<_>, Error>>()?;
                    rows.push(self.table.update(t, &row.id, changes)?);
                }
            }
            Kind::Delete { source } => {
                for row in collect_rows(source.as_ref(), t)? {
                    rows.push(self.table.delete(t, &row.id)?);
                }
            }
        }
        Ok(MutationResult { rows })
    }

    fn verb(&self) -> &'static str {
        match self.kind {
            Kind::Insert { .. } => "Insert",
            Kind::Update { .. } => "Update",
            Kind::Delete { .. } => "Delete",
        }
    }
}

impl Selection for Mutation {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        match self.execute(t) {
            Ok(result) => Box::new((0..result.rows.len()).map(move |i| Ok(result.rows[i].clone()))),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn entropy(&self, _t: &Transaction) -> f64 {
        1.0
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let plan = Plan::new(self.verb(), self.table.name(), self.entropy(t));
        match &self.kind {
            Kind::Insert {
                source: InsertSource::Query(source),
                ..
            }
            | Kind::Update { source, .. }
            | Kind::Delete { source } => plan.with_child(source.explain(t)),
            Kind::Insert { .. } => plan,
        }
    }
}
