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

use crate::{CastError, DataType};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single SQL value.
///
/// `Value` carries two orderings. The `Ord` impl is total and is what index keys, sort keys and
/// hash-based grouping use: integers and floats compare numerically with each other, and values
/// of different type classes order by a fixed type rank (null first). `sql_cmp` is the SQL
/// comparison: it yields `None` when either operand is null and refuses incompatible types.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Arc<str>),
    Array(Arc<[Value]>),
    Json(Arc<serde_json::Value>),
}

pub fn v_null() -> Value {
    Value::Null
}

pub fn v_bool(b: bool) -> Value {
    Value::Bool(b)
}

pub fn v_int(i: i64) -> Value {
    Value::Int(i)
}

pub fn v_float(f: f64) -> Value {
    Value::Float(f)
}

pub fn v_text(s: &str) -> Value {
    Value::Text(Arc::from(s))
}

pub fn v_array<I: IntoIterator<Item = Value>>(items: I) -> Value {
    Value::Array(items.into_iter().collect())
}

pub fn v_json(json: serde_json::Value) -> Value {
    Value::Json(Arc::new(json))
}

impl Value {
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Array(_) => 4,
            Value::Json(_) => 5,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Either numeric variant, widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Text(_) => DataType::Text,
            Value::Array(items) => {
                let elem = items
                    .iter()
                    .find(|v| !v.is_null())
                    .map(|v| v.data_type())
                    .unwrap_or(DataType::Null);
                DataType::Array(Box::new(elem))
            }
            Value::Json(_) => DataType::Json,
        }
    }

    /// SQL comparison. `Ok(None)` when either side is null.
    pub fn sql_cmp(&self, other: &Value) -> Result<Option<Ordering>, CastError> {
        if self.is_null() || other.is_null() {
            return Ok(None);
        }
        self.data_type().check_comparable(&other.data_type())?;
        Ok(Some(self.cmp(other)))
    }

    /// SQL equality. `Ok(None)` when either side is null.
    pub fn sql_eq(&self, other: &Value) -> Result<Option<bool>, CastError> {
        Ok(self.sql_cmp(other)?.map(|o| o == Ordering::Equal))
    }

    /// Implicit (assignment) conversion, as applied when a value is stored into a column.
    pub fn coerce_to(&self, to: &DataType) -> Result<Value, CastError> {
        match (self, to) {
            (Value::Null, _) | (_, DataType::Null) => Ok(self.clone()),
            (Value::Int(i), DataType::Float) => Ok(Value::Float(*i as f64)),
            (Value::Float(f), DataType::Int) => {
                let rounded = f.round();
                // `as` saturates, so out-of-range floats are refused before converting.
                if !(-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&rounded) {
                    return Err(self.invalid_cast(to));
                }
                Ok(Value::Int(rounded as i64))
            }
            (Value::Array(items), DataType::Array(elem)) => {
                let items = items
                    .iter()
                    .map(|v| v.coerce_to(elem))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(v_array(items))
            }
            (Value::Json(_), DataType::Json) => Ok(self.clone()),
            (Value::Text(s), DataType::Json) => serde_json::from_str(s)
                .map(v_json)
                .map_err(|_| self.invalid_cast(to)),
            (v, DataType::Json) => Ok(v_json(v.to_json())),
            (v, t) if v.data_type() == *t => Ok(v.clone()),
            _ => Err(self.invalid_cast(to)),
        }
    }

    /// Explicit `CAST(value AS type)`. Accepts everything `coerce_to` does, plus text parsing and
    /// formatting.
    pub fn cast_to(&self, to: &DataType) -> Result<Value, CastError> {
        if let Ok(v) = self.coerce_to(to) {
            return Ok(v);
        }
        match (self, to) {
            (Value::Text(s), DataType::Int) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.invalid_cast(to)),
            (Value::Text(s), DataType::Float) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.invalid_cast(to)),
            (Value::Text(s), DataType::Bool) => match s.trim().to_lowercase().as_str() {
                "t" | "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                "f" | "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err(self.invalid_cast(to)),
            },
            (Value::Bool(b), DataType::Int) => Ok(Value::Int(i64::from(*b))),
            (Value::Int(i), DataType::Bool) => Ok(Value::Bool(*i != 0)),
            (v, DataType::Text) => Ok(v_text(&v.to_string())),
            _ => Err(self.invalid_cast(to)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.to_string()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Json(j) => j.as_ref().clone(),
        }
    }

    fn invalid_cast(&self, to: &DataType) -> CastError {
        CastError::InvalidCast {
            value: self.to_string(),
            to: to.clone(),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
            (Value::Int(l), Value::Int(r)) => l.cmp(r),
            (Value::Float(l), Value::Float(r)) => l.partial_cmp(r).unwrap_or_else(|| l.total_cmp(r)),
            (Value::Int(l), Value::Float(r)) => cmp_int_float(*l, *r),
            (Value::Float(l), Value::Int(r)) => cmp_int_float(*r, *l).reverse(),
            (Value::Text(l), Value::Text(r)) => l.cmp(r),
            (Value::Array(l), Value::Array(r)) => l.iter().cmp(r.iter()),
            (Value::Json(l), Value::Json(r)) => l.to_string().cmp(&r.to_string()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

/// Exact comparison of an integer with a float. NaNs order like `f64::total_cmp` places them.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0f64.partial_cmp(&(f - whole)).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            // Numerics hash through their f64 image so that `Int(1) == Float(1.0)` hash alike.
            Value::Int(i) => (*i as f64).to_bits().hash(state),
            Value::Float(f) if *f == 0.0 => 0f64.to_bits().hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Array(items) => items.hash(state),
            Value::Json(j) => j.to_string().hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "}}")
            }
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        v_text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
