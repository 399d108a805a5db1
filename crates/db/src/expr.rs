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

//! Positional scalar expressions.
//!
//! Expressions address the columns of the row they are evaluated against by position. Name
//! resolution happens above this layer.

use crate::Error;
use memrel_var::{CastError, DataType, Value, v_array, v_bool, v_text};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    IsNull,
    IsNotNull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// The operator obtained by swapping the operands: `a < b` is `b > a`.
    pub fn flip(&self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => *other,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Column(usize),
    Const(Value),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        case_insensitive: bool,
    },
    Cast(Box<Expr>, DataType),
    Coalesce(Vec<Expr>),
}

pub fn col(index: usize) -> Expr {
    Expr::Column(index)
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Const(value.into())
}

impl Expr {
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn equals(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Eq, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Neq, self, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Gt, self, other)
    }

    pub fn ge(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Ge, self, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Lt, self, other)
    }

    pub fn le(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Le, self, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::binary(BinaryOp::Or, self, other)
    }

    pub fn negate(self) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::Unary(UnaryOp::IsNull, Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::Unary(UnaryOp::IsNotNull, Box::new(self))
    }

    pub fn between(self, low: Expr, high: Expr) -> Expr {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
            negated: false,
        }
    }

    pub fn in_list(self, list: Vec<Expr>, negated: bool) -> Expr {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated,
        }
    }

    pub fn like(self, pattern: Expr) -> Expr {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
            negated: false,
            case_insensitive: false,
        }
    }

    pub fn cast(self, to: DataType) -> Expr {
        Expr::Cast(Box::new(self), to)
    }

    pub fn as_column(&self) -> Option<usize> {
        match self {
            Expr::Column(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Visits every sub-expression, this one included.
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Column(_) | Expr::Const(_) => {}
            Expr::Unary(_, e) | Expr::Cast(e, _) => e.walk(f),
            Expr::Binary(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                expr.walk(f);
                low.walk(f);
                high.walk(f);
            }
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::Coalesce(list) => list.iter().for_each(|e| e.walk(f)),
        }
    }

    /// Sorted, de-duplicated column positions this expression reads.
    pub fn columns(&self) -> Vec<usize> {
        let mut columns = vec![];
        self.walk(&mut |e| {
            if let Expr::Column(i) = e {
                columns.push(*i);
            }
        });
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    pub fn is_constant(&self) -> bool {
        self.columns().is_empty()
    }

    /// Rebuilds the expression bottom-up, letting `f` replace any node.
    pub fn transform(&self, f: &impl Fn(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        let t = |e: &Expr| Box::new(e.transform(f));
        match self {
            Expr::Column(_) | Expr::Const(_) => self.clone(),
            Expr::Unary(op, e) => Expr::Unary(*op, t(e)),
            Expr::Cast(e, ty) => Expr::Cast(t(e), ty.clone()),
            Expr::Binary(op, l, r) => Expr::Binary(*op, t(l), t(r)),
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: t(expr),
                list: list.iter().map(|e| e.transform(f)).collect(),
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => Expr::Between {
                expr: t(expr),
                low: t(low),
                high: t(high),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => Expr::Like {
                expr: t(expr),
                pattern: t(pattern),
                negated: *negated,
                case_insensitive: *case_insensitive,
            },
            Expr::Coalesce(list) => Expr::Coalesce(list.iter().map(|e| e.transform(f)).collect()),
        }
    }

    /// Replaces each `Column(i)` with `exprs[i]`. Used to express a derived column in terms of the
    /// source it was projected from.
    pub fn substitute(&self, exprs: &[Expr]) -> Expr {
        self.transform(&|e| match e {
            Expr::Column(i) => exprs.get(*i).cloned(),
            _ => None,
        })
    }

    pub fn shift(&self, offset: usize) -> Expr {
        self.transform(&|e| match e {
            Expr::Column(i) => Some(Expr::Column(i + offset)),
            _ => None,
        })
    }

    /// Renumbers column references through `map`; `None` if some referenced column has no image.
    pub fn remap(&self, map: &impl Fn(usize) -> Option<usize>) -> Option<Expr> {
        if self.columns().into_iter().any(|c| map(c).is_none()) {
            return None;
        }
        Some(self.transform(&|e| match e {
            Expr::Column(i) => map(*i).map(Expr::Column),
            _ => None,
        }))
    }

    /// Splits a conjunction into its top-level terms.
    pub fn conjuncts(&self) -> Vec<Expr> {
        match self {
            Expr::Binary(BinaryOp::And, l, r) => {
                let mut terms = l.conjuncts();
                terms.extend(r.conjuncts());
                terms
            }
            other => vec![other.clone()],
        }
    }

    pub fn conjunction(terms: Vec<Expr>) -> Option<Expr> {
        terms.into_iter().reduce(|acc, e| acc.and(e))
    }

    /// Static result type given the types of the input columns.
    pub fn data_type(&self, columns: &[DataType]) -> DataType {
        match self {
            Expr::Column(i) => columns.get(*i).cloned().unwrap_or(DataType::Null),
            Expr::Const(v) => v.data_type(),
            Expr::Unary(UnaryOp::Neg, e) => e.data_type(columns),
            Expr::Unary(..)
            | Expr::InList { .. }
            | Expr::Between { .. }
            | Expr::Like { .. } => DataType::Bool,
            Expr::Binary(op, l, r) => match op {
                op if op.is_comparison() => DataType::Bool,
                BinaryOp::And | BinaryOp::Or => DataType::Bool,
                BinaryOp::Concat => match l.data_type(columns) {
                    DataType::Array(elem) => DataType::Array(elem),
                    _ => DataType::Text,
                },
                _ => {
                    let l = l.data_type(columns);
                    l.unify(&r.data_type(columns)).unwrap_or(l)
                }
            },
            Expr::Cast(_, ty) => ty.clone(),
            Expr::Coalesce(list) => list
                .iter()
                .map(|e| e.data_type(columns))
                .fold(DataType::Null, |acc, t| acc.unify(&t).unwrap_or(acc)),
        }
    }

    pub fn eval(&self, row: &[Value]) -> Result<Value, Error> {
        match self {
            Expr::Column(i) => row
                .get(*i)
                .cloned()
                .ok_or_else(|| Error::Internal(format!("column position {i} out of range"))),
            Expr::Const(v) => Ok(v.clone()),
            Expr::Unary(op, e) => {
                let v = e.eval(row)?;
                match op {
                    UnaryOp::IsNull => Ok(v_bool(v.is_null())),
                    UnaryOp::IsNotNull => Ok(v_bool(!v.is_null())),
                    UnaryOp::Not => Ok(match truth(&v)? {
                        Some(b) => v_bool(!b),
                        None => Value::Null,
                    }),
                    UnaryOp::Neg => match v {
                        Value::Null => Ok(Value::Null),
                        Value::Int(i) => i
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| Error::Arithmetic("integer out of range".into())),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(incompatible(&DataType::Int, &other)),
                    },
                }
            }
            Expr::Binary(BinaryOp::And, l, r) => {
                let l = truth(&l.eval(row)?)?;
                if l == Some(false) {
                    return Ok(v_bool(false));
                }
                let r = truth(&r.eval(row)?)?;
                Ok(match (l, r) {
                    (_, Some(false)) => v_bool(false),
                    (Some(true), Some(true)) => v_bool(true),
                    _ => Value::Null,
                })
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                let l = truth(&l.eval(row)?)?;
                if l == Some(true) {
                    return Ok(v_bool(true));
                }
                let r = truth(&r.eval(row)?)?;
                Ok(match (l, r) {
                    (_, Some(true)) => v_bool(true),
                    (Some(false), Some(false)) => v_bool(false),
                    _ => Value::Null,
                })
            }
            Expr::Binary(op, l, r) => binary(*op, &l.eval(row)?, &r.eval(row)?),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.eval(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                let mut found = false;
                for item in list {
                    match v.sql_eq(&item.eval(row)?)? {
                        Some(true) => {
                            found = true;
                            break;
                        }
                        Some(false) => {}
                        None => saw_null = true,
                    }
                }
                Ok(match (found, saw_null) {
                    (true, _) => v_bool(!negated),
                    (false, true) => Value::Null,
                    (false, false) => v_bool(*negated),
                })
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let v = expr.eval(row)?;
                let ge = v.sql_cmp(&low.eval(row)?)?.map(|o| o != Ordering::Less);
                let le = v.sql_cmp(&high.eval(row)?)?.map(|o| o != Ordering::Greater);
                let within = match (ge, le) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(within.map(|b| v_bool(b != *negated)).unwrap_or(Value::Null))
            }
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let v = expr.eval(row)?;
                let p = pattern.eval(row)?;
                match (&v, &p) {
                    (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                    (Value::Text(s), Value::Text(p)) => {
                        let matched = if *case_insensitive {
                            like_match(&s.to_lowercase(), &p.to_lowercase())
                        } else {
                            like_match(s, p)
                        };
                        Ok(v_bool(matched != *negated))
                    }
                    (Value::Text(_), other) | (other, _) => Err(incompatible(&DataType::Text, other)),
                }
            }
            Expr::Cast(e, ty) => Ok(e.eval(row)?.cast_to(ty)?),
            Expr::Coalesce(list) => {
                for e in list {
                    let v = e.eval(row)?;
                    if !v.is_null() {
                        return Ok(v);
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    /// Evaluates a predicate: only `true` passes, `false` and `null` do not.
    pub fn test(&self, row: &[Value]) -> Result<bool, Error> {
        Ok(truth(&self.eval(row)?)? == Some(true))
    }
}

fn incompatible(expected: &DataType, got: &Value) -> Error {
    Error::Cast(CastError::Incompatible {
        left: expected.clone(),
        right: got.data_type(),
    })
}

/// Three-valued truth of a value.
pub fn truth(v: &Value) -> Result<Option<bool>, Error> {
    match v {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(incompatible(&DataType::Bool, other)),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, Error> {
    if op.is_comparison() {
        let Some(ord) = l.sql_cmp(r)? else {
            return Ok(Value::Null);
        };
        let b = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::Neq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Le => ord != Ordering::Greater,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::Ge => ord != Ordering::Less,
            _ => unreachable!("not a comparison"),
        };
        return Ok(v_bool(b));
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Concat {
        return Ok(match (l, r) {
            (Value::Array(a), Value::Array(b)) => v_array(a.iter().chain(b.iter()).cloned()),
            (Value::Array(a), v) => v_array(a.iter().cloned().chain(std::iter::once(v.clone()))),
            _ => v_text(&format!("{l}{r}")),
        });
    }
    let overflow = || Error::Arithmetic("integer out of range".into());
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b).ok_or_else(overflow)?,
                BinaryOp::Sub => a.checked_sub(*b).ok_or_else(overflow)?,
                BinaryOp::Mul => a.checked_mul(*b).ok_or_else(overflow)?,
                BinaryOp::Div | BinaryOp::Mod if *b == 0 => {
                    return Err(Error::Arithmetic("division by zero".into()));
                }
                BinaryOp::Div => a.checked_div(*b).ok_or_else(overflow)?,
                BinaryOp::Mod => a.checked_rem(*b).ok_or_else(overflow)?,
                _ => unreachable!("not arithmetic"),
            };
            Ok(Value::Int(result))
        }
        _ => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                let (bad, ok) = if l.as_f64().is_none() { (l, r) } else { (r, l) };
                let expected = if ok.as_f64().is_some() { ok.data_type() } else { DataType::Int };
                return Err(incompatible(&expected, bad));
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
                    return Err(Error::Arithmetic("division by zero".into()));
                }
                BinaryOp::Div => a / b,
                BinaryOp::Mod => a % b,
                _ => unreachable!("not arithmetic"),
            };
            Ok(Value::Float(result))
        }
    }
}

/// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
pub fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    let (mut si, mut pi) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while si < s.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == s[si]) {
            si += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '%' {
            backtrack = Some((pi, si));
            pi += 1;
        } else if let Some((bp, bs)) = backtrack {
            pi = bp + 1;
            si = bs + 1;
            backtrack = Some((bp, bs + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

/// The literal prefix of a `LIKE` pattern that ends in a single trailing `%` and has no other
/// wildcard, e.g. `abc%` gives `abc`.
pub fn like_prefix(pattern: &str) -> Option<&str> {
    let prefix = pattern.strip_suffix('%')?;
    if prefix.contains(['%', '_']) {
        return None;
    }
    Some(prefix)
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Column(i) => write!(f, "${i}"),
            Expr::Const(Value::Text(s)) => write!(f, "'{s}'"),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Unary(UnaryOp::Not, e) => write!(f, "NOT ({e})"),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-({e})"),
            Expr::Unary(UnaryOp::IsNull, e) => write!(f, "{e} IS NULL"),
            Expr::Unary(UnaryOp::IsNotNull, e) => write!(f, "{e} IS NOT NULL"),
            Expr::Binary(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{expr} {not}IN ({})", items.join(", "))
            }
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{expr} {not}BETWEEN {low} AND {high}")
            }
            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let not = if *negated { "NOT " } else { "" };
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                write!(f, "{expr} {not}{op} {pattern}")
            }
            Expr::Cast(e, ty) => write!(f, "CAST({e} AS {ty})"),
            Expr::Coalesce(list) => {
                let items: Vec<String> = list.iter().map(|e| e.to_string()).collect();
                write!(f, "COALESCE({})", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memrel_var::{v_float, v_int, v_null};

    #[test]
    fn test_three_valued_logic() {
        let row = [v_int(1), v_null()];
        let unknown = col(1).equals(lit(1));
        assert_eq!(unknown.eval(&row).unwrap(), v_null());
        assert_eq!(
            unknown.clone().or(col(0).equals(lit(1))).eval(&row).unwrap(),
            v_bool(true)
        );
        assert_eq!(
            unknown.clone().and(col(0).equals(lit(2))).eval(&row).unwrap(),
            v_bool(false)
        );
        assert!(!unknown.test(&row).unwrap());
    }

    #[test]
    fn test_arithmetic() {
        let row = [v_int(7), v_float(0.5)];
        assert_eq!(
            Expr::binary(BinaryOp::Add, col(0), col(1)).eval(&row).unwrap(),
            v_float(7.5)
        );
        assert_eq!(
            Expr::binary(BinaryOp::Div, col(0), lit(0i64)).eval(&row),
            Err(Error::Arithmetic("division by zero".into()))
        );
        assert_eq!(
            Expr::binary(BinaryOp::Mod, col(0), lit(4i64)).eval(&row).unwrap(),
            v_int(3)
        );
    }

    #[test]
    fn test_in_list_with_null() {
        let row = [v_int(3)];
        let e = col(0).in_list(vec![lit(1i64), Expr::Const(v_null())], false);
        assert_eq!(e.eval(&row).unwrap(), v_null());
        let e = col(0).in_list(vec![lit(1i64), lit(3i64)], true);
        assert_eq!(e.eval(&row).unwrap(), v_bool(false));
    }

    #[test]
    fn test_like() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "_ello"));
        assert!(like_match("hello", "%"));
        assert!(!like_match("hello", "h_o"));
        assert!(like_match("abcabd", "%abd"));
        assert_eq!(like_prefix("ab%"), Some("ab"));
        assert_eq!(like_prefix("a_b%"), None);
        assert_eq!(like_prefix("ab"), None);
    }

    #[test]
    fn test_comparing_incompatible_types_fails() {
        let row = [v_int(3), v_text("3")];
        assert!(matches!(
            col(0).equals(col(1)).eval(&row),
            Err(Error::Cast(CastError::Incompatible { .. }))
        ));
    }

    #[test]
    fn test_substitute_and_remap() {
        let e = col(0).gt(col(1));
        let projected = e.substitute(&[col(4), lit(2i64)]);
        assert_eq!(projected, col(4).gt(lit(2i64)));
        let dropped = col(0).gt(col(2)).remap(&|c| if c == 1 { None } else if c > 1 { Some(c - 1) } else { Some(c) });
        assert_eq!(dropped, Some(col(0).gt(col(1))));
        assert_eq!(col(1).equals(lit(1i64)).remap(&|c| if c == 1 { None } else { Some(c) }), None);
    }
}
