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

//! Two-way joins. Every enumeration re-ranks the available strategies against the enumerating
//! transaction: each equality clause with an index on one side lets the other side drive and
//! probe that index per row. Without a usable strategy the join degrades to a nested loop over
//! the full cross product, which is reported as catastrophic.

use crate::selection::{
    ColumnInfo, IndexSource, Plan, Probe, RowStream, Selection, empty_stream,
};
use ahash::AHasher;
use memrel_db::{BinaryOp, DatabaseConfig, DbCounters, Error, Expr, IndexStats, Row, RowId, Transaction};
use memrel_var::{DataType, Value};
use std::cell::RefCell;
use std::collections::HashSet;
use std::hash::BuildHasherDefault;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Clone, Debug, PartialEq)]
pub enum JoinCondition {
    /// Predicate over the left columns followed by the right columns.
    On(Expr),
    Using(Vec<String>),
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// `left = right`, each half expressed over its own side's columns.
#[derive(Clone, Debug)]
struct EquiClause {
    left: Expr,
    right: Expr,
}

impl EquiClause {
    fn expr(&self, side: Side) -> &Expr {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

/// Drive `drive`, probe `index` on the other side with the driving row's half of `clause`.
#[derive(Debug)]
struct Strategy {
    drive: Side,
    clause: usize,
    index: Arc<dyn IndexSource>,
}

#[derive(Clone, Copy, Debug)]
enum Choice {
    Index(usize),
    Fallback(Side),
}

type IdSet = HashSet<RowId, BuildHasherDefault<AHasher>>;

#[derive(Debug)]
struct JoinCore {
    left: Arc<dyn Selection>,
    right: Arc<dyn Selection>,
    kind: JoinKind,
    on: Option<Expr>,
    clauses: Vec<EquiClause>,
    strategies: Vec<Strategy>,
    config: Arc<DatabaseConfig>,
    counters: Arc<DbCounters>,
}

impl JoinCore {
    fn side(&self, side: Side) -> &Arc<dyn Selection> {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn arity(&self, side: Side) -> usize {
        self.side(side).columns().len()
    }

    /// The side whose rows survive without a match.
    fn preserved(&self) -> Option<Side> {
        match self.kind {
            JoinKind::Left => Some(Side::Left),
            JoinKind::Right => Some(Side::Right),
            _ => None,
        }
    }

    fn fanout(strategy: &Strategy, t: &Transaction) -> f64 {
        let entropy = strategy.index.entropy(t);
        if entropy > 0.0 { 1.0 / entropy } else { 0.0 }
    }

    /// Lowest driving entropy wins; ties go to the index with the smaller expected fanout. The
    /// cross product is only taken when no index strategy exists, since an empty side makes its
    /// size zero without making it cheaper than a probe.
    fn choose(&self, t: &Transaction) -> (Choice, f64) {
        let mut best: Option<(f64, f64, usize)> = None;
        for (i, strategy) in self.strategies.iter().enumerate() {
            let driving = self.side(strategy.drive).entropy(t);
            let fanout = Self::fanout(strategy, t);
            let better = match best {
                None => true,
                Some((d, f, _)) => driving < d || (driving == d && fanout < f),
            };
            if better {
                best = Some((driving, fanout, i));
            }
        }
        match best {
            Some((driving, fanout, i)) => (Choice::Index(i), driving * fanout.max(1.0)),
            None => (
                Choice::Fallback(self.preserved().unwrap_or(Side::Left)),
                self.left.entropy(t) * self.right.entropy(t),
            ),
        }
    }

    /// Best strategy driving from `side`, for lookups that must start there.
    fn strategy_from(&self, side: Side, t: &Transaction) -> Option<&Strategy> {
        self.strategies
            .iter()
            .filter(|s| s.drive == side)
            .min_by(|a, b| Self::fanout(a, t).total_cmp(&Self::fanout(b, t)))
    }

    fn combine(&self, left: Option<&Row>, right: Option<&Row>) -> Row {
        let mut values = Vec::with_capacity(self.arity(Side::Left) + self.arity(Side::Right));
        for (row, side) in [(left, Side::Left), (right, Side::Right)] {
            match row {
                Some(row) => values.extend(row.values.iter().cloned()),
                None => values.extend(std::iter::repeat_n(Value::Null, self.arity(side))),
            }
        }
        Row::new(
            RowId::joined(left.map(|r| &r.id), right.map(|r| &r.id)),
            values,
        )
    }

    fn candidates<'a>(
        &'a self,
        drive: Side,
        row: &Row,
        strategy: Option<&'a Strategy>,
        t: &'a Transaction,
    ) -> Result<RowStream<'a>, Error> {
        let Some(strategy) = strategy else {
            return Ok(self.side(drive.other()).enumerate(t));
        };
        let key = self.clauses[strategy.clause]
            .expr(drive)
            .eval(&row.values)?;
        if key.is_null() {
            return Ok(empty_stream());
        }
        strategy.index.scan(&Probe::Eq(vec![key]), t)
    }

    /// All output rows for one driving row. `matched` collects the partner rows that joined, when
    /// the partner side is preserved and has to be completed afterwards.
    fn expand(
        &self,
        drive: Side,
        row: &Row,
        strategy: Option<&Strategy>,
        matched: Option<&RefCell<IdSet>>,
        t: &Transaction,
    ) -> Vec<Result<Row, Error>> {
        let mut out = vec![];
        let candidates = match self.candidates(drive, row, strategy, t) {
            Ok(c) => c,
            Err(e) => return vec![Err(e)],
        };
        for candidate in candidates {
            let candidate = match candidate {
                Ok(c) => c,
                Err(e) => {
                    out.push(Err(e));
                    return out;
                }
            };
            let joined = match drive {
                Side::Left => self.combine(Some(row), Some(&candidate)),
                Side::Right => self.combine(Some(&candidate), Some(row)),
            };
            let passes = match &self.on {
                Some(on) => on.test(&joined.values),
                None => Ok(true),
            };
            match passes {
                Ok(true) => {
                    if let Some(matched) = matched {
                        matched.borrow_mut().insert(candidate.id.clone());
                    }
                    out.push(Ok(joined));
                }
                Ok(false) => {}
                Err(e) => {
                    out.push(Err(e));
                    return out;
                }
            }
        }
        if out.is_empty() && self.preserved() == Some(drive) {
            out.push(Ok(self.null_extend(drive, row)));
        }
        out
    }

    fn null_extend(&self, side: Side, row: &Row) -> Row {
        match side {
            Side::Left => self.combine(Some(row), None),
            Side::Right => self.combine(None, Some(row)),
        }
    }

    fn run<'a>(
        &'a self,
        drive: Side,
        strategy: Option<&'a Strategy>,
        driving: RowStream<'a>,
        t: &'a Transaction,
    ) -> RowStream<'a> {
        // Driving from the non-preserved side: preserved rows nobody matched are emitted once the
        // driving side is exhausted.
        let partner = drive.other();
        let completes = self.preserved() == Some(partner);
        let matched: Rc<RefCell<IdSet>> = Rc::default();
        let tracking = completes.then(|| matched.clone());
        let main = driving.flat_map(move |r| match r {
            Ok(row) => self.expand(drive, &row, strategy, tracking.as_deref(), t),
            Err(e) => vec![Err(e)],
        });
        if !completes {
            return Box::new(main);
        }
        let rest = std::iter::once(()).flat_map(move |_| {
            let matched = matched.clone();
            self.side(partner).enumerate(t).filter_map(move |r| match r {
                Ok(row) if matched.borrow().contains(&row.id) => None,
                Ok(row) => Some(Ok(self.null_extend(partner, &row))),
                Err(e) => Some(Err(e)),
            })
        });
        Box::new(main.chain(rest))
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        let (choice, entropy) = self.choose(t);
        match choice {
            Choice::Index(i) => {
                let strategy = &self.strategies[i];
                self.counters.index_joins.incr();
                debug!(
                    drive = ?strategy.drive,
                    index = %strategy.index.describe(),
                    entropy,
                    "join strategy"
                );
                let driving = self.side(strategy.drive).enumerate(t);
                self.run(strategy.drive, Some(strategy), driving, t)
            }
            Choice::Fallback(drive) => {
                if self.kind != JoinKind::Cross {
                    self.counters.catastrophic_joins.incr();
                    if self.config.warn_on_catastrophic_join {
                        warn!(
                            left = self.left.entropy(t),
                            right = self.right.entropy(t),
                            condition = ?self.on.as_ref().map(|e| e.to_string()),
                            "catastrophic join: no usable index, enumerating the full cross product"
                        );
                    }
                }
                let driving = self.side(drive).enumerate(t);
                self.run(drive, None, driving, t)
            }
        }
    }

    fn detail(&self, choice: Choice) -> String {
        let kind = format!("{:?}", self.kind).to_lowercase();
        match choice {
            Choice::Index(i) => {
                let s = &self.strategies[i];
                let drive = format!("{:?}", s.drive).to_lowercase();
                format!("{kind} drive {drive} probe {}", s.index.describe())
            }
            Choice::Fallback(_) if self.kind == JoinKind::Cross => "cross product".to_string(),
            Choice::Fallback(_) => format!("{kind} catastrophic cross product"),
        }
    }
}

/// Join of two selections. Output columns are the left side's followed by the right side's.
#[derive(Debug)]
pub struct Join {
    core: Arc<JoinCore>,
    columns: Vec<ColumnInfo>,
}

impl Join {
    pub fn new(
        left: Arc<dyn Selection>,
        right: Arc<dyn Selection>,
        kind: JoinKind,
        condition: JoinCondition,
        config: Arc<DatabaseConfig>,
        counters: Arc<DbCounters>,
    ) -> Result<Self, Error> {
        if kind == JoinKind::Full {
            return Err(Error::Unsupported("FULL OUTER JOIN".into()));
        }
        let left_arity = left.columns().len();
        let total = left_arity + right.columns().len();
        let on = match (kind, condition) {
            (JoinKind::Cross, JoinCondition::None) => None,
            (JoinKind::Cross, _) => {
                return Err(Error::InvalidQuery(
                    "CROSS JOIN does not take a join condition".into(),
                ));
            }
            (_, JoinCondition::None) => {
                return Err(Error::InvalidQuery(format!(
                    "{kind:?} join requires a join condition"
                )));
            }
            (_, JoinCondition::On(expr)) => {
                let columns = expr.columns();
                if columns.is_empty() {
                    return Err(Error::InvalidQuery(format!(
                        "join condition {expr} references neither side"
                    )));
                }
                if let Some(c) = columns.into_iter().find(|c| *c >= total) {
                    return Err(Error::InvalidQuery(format!(
                        "join condition references column position {c}, join has {total} columns"
                    )));
                }
                Some(expr)
            }
            (_, JoinCondition::Using(names)) => {
                let terms = names
                    .iter()
                    .map(|name| {
                        let l = left.get_column(name)?;
                        let r = right.get_column(name)?;
                        Ok(Expr::Column(l).equals(Expr::Column(left_arity + r)))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                let Some(on) = Expr::conjunction(terms) else {
                    return Err(Error::InvalidQuery("USING requires at least one column".into()));
                };
                Some(on)
            }
        };

        let clauses: Vec<EquiClause> = on
            .as_ref()
            .map(|on| {
                on.conjuncts()
                    .iter()
                    .filter_map(|term| equi_clause(term, left_arity))
                    .collect()
            })
            .unwrap_or_default();

        let mut strategies = vec![];
        for (i, clause) in clauses.iter().enumerate() {
            if let Some(index) = right.get_index(std::slice::from_ref(&clause.right)) {
                strategies.push(Strategy {
                    drive: Side::Left,
                    clause: i,
                    index,
                });
            }
            if let Some(index) = left.get_index(std::slice::from_ref(&clause.left)) {
                strategies.push(Strategy {
                    drive: Side::Right,
                    clause: i,
                    index,
                });
            }
        }
        debug!(
            ?kind,
            clauses = clauses.len(),
            strategies = strategies.len(),
            "join built"
        );

        let mut columns = left.columns().to_vec();
        columns.extend(right.columns().iter().cloned());
        Ok(Self {
            core: Arc::new(JoinCore {
                left,
                right,
                kind,
                on,
                clauses,
                strategies,
                config,
                counters,
            }),
            columns,
        })
    }

    pub fn kind(&self) -> JoinKind {
        self.core.kind
    }
}

/// Splits `a = b` into halves over each side, if each half references exactly one side.
fn equi_clause(term: &Expr, left_arity: usize) -> Option<EquiClause> {
    let Expr::Binary(BinaryOp::Eq, a, b) = term else {
        return None;
    };
    let side_of = |e: &Expr| -> Option<Side> {
        let columns = e.columns();
        if columns.is_empty() {
            None
        } else if columns.iter().all(|c| *c < left_arity) {
            Some(Side::Left)
        } else if columns.iter().all(|c| *c >= left_arity) {
            Some(Side::Right)
        } else {
            None
        }
    };
    let to_right = |e: &Expr| e.remap(&|c| c.checked_sub(left_arity));
    match (side_of(a.as_ref())?, side_of(b.as_ref())?) {
        (Side::Left, Side::Right) => Some(EquiClause {
            left: a.as_ref().clone(),
            right: to_right(b.as_ref())?,
        }),
        (Side::Right, Side::Left) => Some(EquiClause {
            left: b.as_ref().clone(),
            right: to_right(a.as_ref())?,
        }),
        _ => None,
    }
}

impl Selection for Join {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        self.core.enumerate(t)
    }

    /// Lookups on the columns of a side that is never null-extended, served by that side's index
    /// and expanded through the join.
    fn get_index(&self, exprs: &[Expr]) -> Option<Arc<dyn IndexSource>> {
        let left_arity = self.core.arity(Side::Left);
        let columns: Vec<usize> = exprs.iter().flat_map(|e| e.columns()).collect();
        if columns.is_empty() {
            return None;
        }
        let (side, exprs) = if columns.iter().all(|c| *c < left_arity) {
            (Side::Left, exprs.to_vec())
        } else if columns.iter().all(|c| *c >= left_arity) {
            let shifted = exprs
                .iter()
                .map(|e| e.remap(&|c| c.checked_sub(left_arity)))
                .collect::<Option<Vec<_>>>()?;
            (Side::Right, shifted)
        } else {
            return None;
        };
        if self.core.preserved() == Some(side.other()) {
            return None;
        }
        let inner = self.core.side(side).get_index(&exprs)?;
        Some(Arc::new(JoinIndex {
            core: self.core.clone(),
            side,
            inner,
        }))
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        self.core.choose(t).1
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let (choice, entropy) = self.core.choose(t);
        Plan::new("Join", self.core.detail(choice), entropy)
            .with_child(self.core.left.explain(t))
            .with_child(self.core.right.explain(t))
    }
}

/// An index of one join side, expanded into joined rows.
#[derive(Debug)]
pub struct JoinIndex {
    core: Arc<JoinCore>,
    side: Side,
    inner: Arc<dyn IndexSource>,
}

impl IndexSource for JoinIndex {
    fn describe(&self) -> String {
        format!("join({})", self.inner.describe())
    }

    fn key_types(&self) -> Vec<DataType> {
        self.inner.key_types()
    }

    fn scan<'a>(&'a self, probe: &Probe, t: &'a Transaction) -> Result<RowStream<'a>, Error> {
        let driving = self.inner.scan(probe, t)?;
        let strategy = self.core.strategy_from(self.side, t);
        Ok(self.core.run(self.side, strategy, driving, t))
    }

    fn stats(&self, t: &Transaction, key: Option<&[Value]>) -> Result<IndexStats, Error> {
        self.inner.stats(t, key)
    }

    fn distinct_keys(&self, t: &Transaction) -> usize {
        self.inner.distinct_keys(t)
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        if self.core.strategy_from(self.side, t).is_some() {
            self.inner.entropy(t)
        } else {
            self.core.left.entropy(t) * self.core.right.entropy(t)
        }
    }

    fn is_unique(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{SelectionExt, scan_as};
    use crate::context::BuildContext;
    use crate::selection::collect_rows;
    use memrel_db::{ColumnDef, Database, IndexDef, TableSchema, col, lit};
    use memrel_var::{DataType, v_int};
    use tracing_test::traced_test;

    fn two_tables(t: &Transaction) -> Database {
        let mut db = Database::default();
        for name in ["a", "b"] {
            db.declare_table(
                t,
                TableSchema::new(name)
                    .column(ColumnDef::new("x", DataType::Int))
                    .column(ColumnDef::new("y", DataType::Int)),
            )
            .unwrap();
        }
        db.insert_rows(t, "a", (1..=3).map(|i| vec![v_int(i), v_int(i * 10)]).collect())
            .unwrap();
        db.insert_rows(t, "b", (2..=4).map(|i| vec![v_int(i), v_int(i * 10)]).collect())
            .unwrap();
        db
    }

    #[test]
    #[traced_test]
    fn test_join_without_equality_is_catastrophic() {
        let t = Transaction::root();
        let db = two_tables(&t);
        let ctx = BuildContext::new(&db);
        let a = scan_as(&db, "a", "a").unwrap();
        let b = scan_as(&db, "b", "b").unwrap();
        let join = a
            .join(&ctx, b, JoinKind::Inner, JoinCondition::On(col(0).lt(col(2))))
            .unwrap();
        // x < x' over {1,2,3} x {2,3,4}: 3 + 2 + 1 pairs.
        assert_eq!(collect_rows(join.as_ref(), &t).unwrap().len(), 6);
        assert_eq!(db.counters().catastrophic_joins.get(), 1);
        assert!(logs_contain("catastrophic join"));
        assert_eq!(join.entropy(&t), 9.0);
    }

    #[test]
    #[traced_test]
    fn test_indexed_join_is_not_catastrophic() {
        let t = Transaction::root();
        let mut db = two_tables(&t);
        db.create_index(&t, "b", IndexDef::on(col(0))).unwrap();
        let ctx = BuildContext::new(&db);
        let a = scan_as(&db, "a", "a").unwrap();
        let b = scan_as(&db, "b", "b").unwrap();
        let join = a
            .join(&ctx, b, JoinKind::Inner, JoinCondition::On(col(0).equals(col(2))))
            .unwrap();
        assert_eq!(collect_rows(join.as_ref(), &t).unwrap().len(), 2);
        assert_eq!(db.counters().catastrophic_joins.get(), 0);
        assert_eq!(db.counters().index_joins.get(), 1);
        assert!(!logs_contain("catastrophic join"));
        assert!(join.explain(&t).detail.contains("drive left"));
    }

    #[test]
    #[traced_test]
    fn test_empty_indexed_side_is_not_catastrophic() {
        let t = Transaction::root();
        let mut db = two_tables(&t);
        db.create_index(&t, "b", IndexDef::on(col(0))).unwrap();
        db.truncate(&t, "b").unwrap();
        let ctx = BuildContext::new(&db);
        let a = scan_as(&db, "a", "a").unwrap();
        let b = scan_as(&db, "b", "b").unwrap();
        let join = a
            .join(&ctx, b, JoinKind::Left, JoinCondition::On(col(0).equals(col(2))))
            .unwrap();
        let rows = collect_rows(join.as_ref(), &t).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.values[2].is_null()));
        assert_eq!(db.counters().catastrophic_joins.get(), 0);
        assert!(!logs_contain("catastrophic join"));
        let plan = join.explain(&t);
        assert!(!plan.detail.contains("catastrophic"), "{}", plan.detail);
        assert!(plan.detail.contains("drive left"));
    }

    #[test]
    fn test_cross_join_is_not_catastrophic() {
        let t = Transaction::root();
        let db = two_tables(&t);
        let ctx = BuildContext::new(&db);
        let a = scan_as(&db, "a", "a").unwrap();
        let b = scan_as(&db, "b", "b").unwrap();
        let join = a.join(&ctx, b, JoinKind::Cross, JoinCondition::None).unwrap();
        assert_eq!(collect_rows(join.as_ref(), &t).unwrap().len(), 9);
        assert_eq!(db.counters().catastrophic_joins.get(), 0);
    }

    #[test]
    fn test_equi_clause_split() {
        let clause = equi_clause(&col(3).equals(col(0)), 2).unwrap();
        assert_eq!(clause.left, col(0));
        assert_eq!(clause.right, col(1));
        let clause = equi_clause(&col(1).equals(col(2).gt(lit(5))), 2).unwrap();
        assert_eq!(clause.right, col(0).gt(lit(5)));
        assert!(equi_clause(&col(0).equals(col(1)), 2).is_none());
        assert!(equi_clause(&col(0).lt(col(2)), 2).is_none());
        assert!(equi_clause(&col(0).equals(lit(1)), 2).is_none());
    }
}
