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

//! Predicate filters. `build_filter` inspects the predicate's shape and picks, per term, an
//! index-backed traversal when the source can serve one, or a sequential scan otherwise.

mod combinators;
mod indexed;
mod sequential;

pub use combinators::{AndFilter, OrFilter};
pub use indexed::IndexFilter;
pub use sequential::{FalseFilter, SeqFilter};

use crate::context::BuildContext;
use crate::selection::{Probe, RowStream, Selection};
use memrel_db::expr::{like_prefix, truth};
use memrel_db::{BinaryOp, Error, Expr, UnaryOp};
use memrel_var::{DataType, Value};
use std::sync::Arc;

/// Keeps the rows of `rows` satisfying `predicate`; errors pass through.
pub(crate) fn restrict<'a>(rows: RowStream<'a>, predicate: &'a Expr) -> RowStream<'a> {
    Box::new(rows.filter_map(move |r| match r {
        Ok(row) => match predicate.test(&row.values) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    }))
}

/// How a predicate can be served.
#[derive(Debug)]
enum Shape {
    /// References no columns and evaluated cleanly.
    Constant(Option<bool>),
    /// Can never be true, e.g. a comparison against null.
    Never,
    And(Vec<Expr>),
    Or(Expr, Expr),
    /// A single traversal over an index keyed on the expression.
    Probe(Expr, Probe),
    Other,
}

fn constant(expr: &Expr) -> Option<Value> {
    if expr.is_constant() {
        expr.eval(&[]).ok()
    } else {
        None
    }
}

fn classify(predicate: &Expr) -> Shape {
    if predicate.is_constant() {
        return match predicate.eval(&[]).and_then(|v| truth(&v)) {
            Ok(b) => Shape::Constant(b),
            Err(_) => Shape::Other,
        };
    }
    let conjuncts = predicate.conjuncts();
    if conjuncts.len() > 1 {
        return Shape::And(conjuncts);
    }
    match predicate {
        Expr::Binary(BinaryOp::Or, l, r) => Shape::Or(l.as_ref().clone(), r.as_ref().clone()),
        Expr::Binary(op, l, r) if op.is_comparison() => {
            let (key, op, value) = match (constant(l), constant(r)) {
                (None, Some(v)) => (l.as_ref(), *op, v),
                (Some(v), None) => (r.as_ref(), op.flip(), v),
                _ => return Shape::Other,
            };
            if value.is_null() {
                return Shape::Never;
            }
            let probe = match op {
                BinaryOp::Eq => Probe::Eq(vec![value]),
                BinaryOp::Neq => Probe::NotIn(vec![vec![value]]),
                BinaryOp::Lt => Probe::Lt(vec![value]),
                BinaryOp::Le => Probe::Le(vec![value]),
                BinaryOp::Gt => Probe::Gt(vec![value]),
                BinaryOp::Ge => Probe::Ge(vec![value]),
                _ => return Shape::Other,
            };
            Shape::Probe(key.clone(), probe)
        }
        Expr::Between {
            expr,
            low,
            high,
            negated: false,
        } if !expr.is_constant() => match (constant(low), constant(high)) {
            (Some(low), Some(high)) if low.is_null() || high.is_null() => Shape::Never,
            (Some(low), Some(high)) => {
                Shape::Probe(expr.as_ref().clone(), Probe::Between(vec![low], vec![high]))
            }
            _ => Shape::Other,
        },
        Expr::InList {
            expr,
            list,
            negated,
        } if !expr.is_constant() && !list.is_empty() => {
            let Some(mut values) = list.iter().map(constant).collect::<Option<Vec<_>>>() else {
                return Shape::Other;
            };
            if *negated {
                if values.iter().any(Value::is_null) {
                    return Shape::Never;
                }
            } else {
                values.retain(|v| !v.is_null());
                if values.is_empty() {
                    return Shape::Never;
                }
            }
            values.sort();
            values.dedup();
            let keys = values.into_iter().map(|v| vec![v]).collect();
            let probe = if *negated {
                Probe::NotIn(keys)
            } else {
                Probe::In(keys)
            };
            Shape::Probe(expr.as_ref().clone(), probe)
        }
        Expr::Like {
            expr,
            pattern,
            negated: false,
            case_insensitive: false,
        } if !expr.is_constant() => match constant(pattern) {
            Some(Value::Null) => Shape::Never,
            Some(Value::Text(p)) => match like_prefix(&p) {
                Some(prefix) => Shape::Probe(expr.as_ref().clone(), Probe::Prefix(prefix.into())),
                None => Shape::Other,
            },
            _ => Shape::Other,
        },
        Expr::Unary(UnaryOp::IsNull, e) => Shape::Probe(e.as_ref().clone(), Probe::IsNull),
        Expr::Unary(UnaryOp::IsNotNull, e) => Shape::Probe(e.as_ref().clone(), Probe::IsNotNull),
        _ => Shape::Other,
    }
}

fn usable_index(
    source: &Arc<dyn Selection>,
    key: &Expr,
    probe: &Probe,
) -> Option<Arc<dyn crate::selection::IndexSource>> {
    let index = source.get_index(std::slice::from_ref(key))?;
    if matches!(probe, Probe::Prefix(_)) && index.key_types().first() != Some(&DataType::Text) {
        return None;
    }
    Some(index)
}

/// Whether the predicate can be answered without a sequential pass over the source.
fn indexable(source: &Arc<dyn Selection>, predicate: &Expr) -> bool {
    match classify(predicate) {
        Shape::Constant(_) | Shape::Never => true,
        Shape::And(terms) => terms.iter().any(|t| indexable(source, t)),
        Shape::Or(l, r) => indexable(source, &l) && indexable(source, &r),
        Shape::Probe(key, probe) => usable_index(source, &key, &probe).is_some(),
        Shape::Other => false,
    }
}

pub fn build_filter(
    ctx: &BuildContext,
    source: Arc<dyn Selection>,
    predicate: Expr,
) -> Result<Arc<dyn Selection>, Error> {
    let arity = source.columns().len();
    if let Some(c) = predicate.columns().into_iter().find(|c| *c >= arity) {
        return Err(Error::InvalidQuery(format!(
            "filter references column position {c}, source has {arity} columns"
        )));
    }
    let penalty = ctx.config().seq_scan_penalty;
    let filter: Arc<dyn Selection> = match classify(&predicate) {
        Shape::Constant(Some(true)) => source,
        Shape::Constant(_) | Shape::Never => Arc::new(FalseFilter::new(source, predicate)),
        Shape::And(terms) => {
            let (served, rest): (Vec<Expr>, Vec<Expr>) =
                terms.into_iter().partition(|t| indexable(&source, t));
            if served.is_empty() {
                Arc::new(SeqFilter::new(source, predicate, penalty))
            } else {
                let mut children = served
                    .into_iter()
                    .map(|term| build_filter(ctx, source.clone(), term))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(rest) = Expr::conjunction(rest) {
                    children.push(Arc::new(SeqFilter::new(source.clone(), rest, penalty)));
                }
                Arc::new(AndFilter::new(source, predicate, children))
            }
        }
        Shape::Or(l, r) => {
            if indexable(&source, &l) && indexable(&source, &r) {
                let left = build_filter(ctx, source.clone(), l)?;
                let right = build_filter(ctx, source.clone(), r)?;
                Arc::new(OrFilter::new(source, predicate, left, right))
            } else {
                Arc::new(SeqFilter::new(source, predicate, penalty))
            }
        }
        Shape::Probe(key, probe) => match usable_index(&source, &key, &probe) {
            Some(index) => Arc::new(IndexFilter::new(
                source,
                predicate,
                index,
                probe,
                ctx.config().clone(),
            )),
            None => Arc::new(SeqFilter::new(source, predicate, penalty)),
        },
        Shape::Other => Arc::new(SeqFilter::new(source, predicate, penalty)),
    };
    Ok(filter)
}
