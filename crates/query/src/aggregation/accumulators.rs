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

//! Aggregate functions and their per-group accumulators.

use crate::selection::Selection;
use ahash::AHasher;
use memrel_db::expr::truth;
use memrel_db::{Error, Expr, Transaction};
use memrel_var::{DataType, Value, v_array, v_bool, v_float, v_int, v_json, v_text};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::hash::BuildHasherDefault;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunction {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    ArrayAgg,
    JsonAgg,
    StringAgg,
    BoolAnd,
    BoolOr,
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AggregateFunction::CountStar | AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::ArrayAgg => "array_agg",
            AggregateFunction::JsonAgg => "json_agg",
            AggregateFunction::StringAgg => "string_agg",
            AggregateFunction::BoolAnd => "bool_and",
            AggregateFunction::BoolOr => "bool_or",
        };
        write!(f, "{name}")
    }
}

/// One aggregate in a `GROUP BY` output list.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub arg: Option<Expr>,
    pub distinct: bool,
    /// Separator for `string_agg`.
    pub delimiter: String,
    pub alias: String,
}

impl AggregateCall {
    pub fn count_star(alias: &str) -> Self {
        Self {
            function: AggregateFunction::CountStar,
            arg: None,
            distinct: false,
            delimiter: String::new(),
            alias: alias.to_string(),
        }
    }

    pub fn new(function: AggregateFunction, arg: Expr, alias: &str) -> Self {
        Self {
            function,
            arg: Some(arg),
            distinct: false,
            delimiter: String::new(),
            alias: alias.to_string(),
        }
    }

    pub fn string_agg(arg: Expr, delimiter: &str, alias: &str) -> Self {
        Self {
            delimiter: delimiter.to_string(),
            ..Self::new(AggregateFunction::StringAgg, arg, alias)
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}

impl Display for AggregateCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let distinct = if self.distinct { "distinct " } else { "" };
        match &self.arg {
            None => write!(f, "{}(*)", self.function),
            Some(arg) => write!(f, "{}({distinct}{arg})", self.function),
        }
    }
}

/// Running state for one group.
pub trait GroupAccumulator {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error>;

    fn finish(self: Box<Self>) -> Result<Value, Error>;
}

/// An aggregate function bound to its argument. Besides accumulating groups row by row, an
/// aggregator may know how to answer without iterating at all.
pub trait Aggregator: std::fmt::Debug {
    fn call(&self) -> &AggregateCall;

    fn output_type(&self) -> DataType;

    fn create_group(&self) -> Box<dyn GroupAccumulator>;

    /// The value over the whole of `source`, from metadata alone.
    fn compute_direct(&self, _source: &dyn Selection, _t: &Transaction) -> Option<Value> {
        None
    }

    /// Whether `compute_from_index` can answer for groups keyed by `group_keys`.
    fn supports_index(&self, _group_keys: &[Expr]) -> bool {
        false
    }

    /// The value for one group, given the group's key and row count.
    fn compute_from_index(&self, _key: &[Value], _count: usize, _group_keys: &[Expr]) -> Option<Value> {
        None
    }
}

/// Binds `call` against a source with the given column types.
pub fn build_aggregator(call: &AggregateCall, input: &[DataType]) -> Result<Box<dyn Aggregator>, Error> {
    let arg_type = call.arg.as_ref().map(|a| a.data_type(input));
    let invalid = |ty: &DataType| -> Result<Box<dyn Aggregator>, Error> {
        Err(Error::InvalidQuery(format!(
            "function {}({ty}) does not exist",
            call.function
        )))
    };
    match (call.function, &arg_type) {
        (AggregateFunction::CountStar, None) => {}
        (AggregateFunction::CountStar, Some(_)) => {
            return Err(Error::InvalidQuery("count(*) takes no argument".into()));
        }
        (_, None) => {
            return Err(Error::InvalidQuery(format!(
                "{} requires an argument",
                call.function
            )));
        }
        (AggregateFunction::Sum | AggregateFunction::Avg, Some(ty))
            if !ty.is_numeric() && *ty != DataType::Null =>
        {
            return invalid(ty);
        }
        (AggregateFunction::BoolAnd | AggregateFunction::BoolOr, Some(ty))
            if !matches!(ty, DataType::Bool | DataType::Null) =>
        {
            return invalid(ty);
        }
        _ => {}
    }
    Ok(Box::new(FunctionAggregator {
        call: call.clone(),
        arg_type: arg_type.unwrap_or(DataType::Null),
    }))
}

#[derive(Debug)]
struct FunctionAggregator {
    call: AggregateCall,
    arg_type: DataType,
}

impl FunctionAggregator {
    fn key_position(&self, group_keys: &[Expr]) -> Option<usize> {
        let arg = self.call.arg.as_ref()?;
        group_keys.iter().position(|k| k == arg)
    }
}

impl Aggregator for FunctionAggregator {
    fn call(&self) -> &AggregateCall {
        &self.call
    }

    fn output_type(&self) -> DataType {
        match self.call.function {
            AggregateFunction::CountStar | AggregateFunction::Count => DataType::Int,
            AggregateFunction::Avg => DataType::Float,
            AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                self.arg_type.clone()
            }
            AggregateFunction::ArrayAgg => DataType::Array(Box::new(self.arg_type.clone())),
            AggregateFunction::JsonAgg => DataType::Json,
            AggregateFunction::StringAgg => DataType::Text,
            AggregateFunction::BoolAnd | AggregateFunction::BoolOr => DataType::Bool,
        }
    }

    fn create_group(&self) -> Box<dyn GroupAccumulator> {
        let arg = self.call.arg.clone().unwrap_or(Expr::Const(Value::Null));
        let inner: Box<dyn GroupAccumulator> = match self.call.function {
            AggregateFunction::CountStar => Box::new(CountStar(0)),
            AggregateFunction::Count => Box::new(Count { arg: arg.clone(), n: 0 }),
            AggregateFunction::Sum => Box::new(Sum {
                arg: arg.clone(),
                total: None,
            }),
            AggregateFunction::Avg => Box::new(Avg {
                arg: arg.clone(),
                total: 0.0,
                n: 0,
            }),
            AggregateFunction::Min => Box::new(Extreme {
                arg: arg.clone(),
                keep: Ordering::Less,
                best: None,
            }),
            AggregateFunction::Max => Box::new(Extreme {
                arg: arg.clone(),
                keep: Ordering::Greater,
                best: None,
            }),
            AggregateFunction::ArrayAgg => Box::new(ArrayAgg {
                arg: arg.clone(),
                items: vec![],
            }),
            AggregateFunction::JsonAgg => Box::new(JsonAgg {
                arg: arg.clone(),
                items: vec![],
            }),
            AggregateFunction::StringAgg => Box::new(StringAgg {
                arg: arg.clone(),
                delimiter: self.call.delimiter.clone(),
                out: None,
            }),
            AggregateFunction::BoolAnd => Box::new(BoolFold {
                arg: arg.clone(),
                and: true,
                acc: None,
            }),
            AggregateFunction::BoolOr => Box::new(BoolFold {
                arg: arg.clone(),
                and: false,
                acc: None,
            }),
        };
        if self.call.distinct && self.call.function != AggregateFunction::CountStar {
            Box::new(DistinctAccumulator {
                arg,
                seen: HashSet::default(),
                inner,
            })
        } else {
            inner
        }
    }

    fn compute_direct(&self, source: &dyn Selection, t: &Transaction) -> Option<Value> {
        match self.call.function {
            AggregateFunction::CountStar => {
                source.stats(t).map(|s| v_int(s.count as i64))
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                let arg = self.call.arg.as_ref()?;
                let bounds = source.get_index(std::slice::from_ref(arg))?.bounds(t)?;
                let key = if self.call.function == AggregateFunction::Min {
                    bounds.min
                } else {
                    bounds.max
                };
                Some(key.and_then(|k| k.into_iter().next()).unwrap_or(Value::Null))
            }
            _ => None,
        }
    }

    fn supports_index(&self, group_keys: &[Expr]) -> bool {
        match self.call.function {
            AggregateFunction::CountStar => true,
            AggregateFunction::Count | AggregateFunction::Min | AggregateFunction::Max => {
                self.key_position(group_keys).is_some()
            }
            _ => false,
        }
    }

    fn compute_from_index(&self, key: &[Value], count: usize, group_keys: &[Expr]) -> Option<Value> {
        match self.call.function {
            AggregateFunction::CountStar => Some(v_int(count as i64)),
            AggregateFunction::Count => {
                let value = key.get(self.key_position(group_keys)?)?;
                Some(v_int(match (value.is_null(), self.call.distinct) {
                    (true, _) => 0,
                    (false, true) => 1,
                    (false, false) => count as i64,
                }))
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                key.get(self.key_position(group_keys)?).cloned()
            }
            _ => None,
        }
    }
}

struct CountStar(i64);

impl GroupAccumulator for CountStar {
    fn feed_item(&mut self, _row: &[Value]) -> Result<(), Error> {
        self.0 += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(v_int(self.0))
    }
}

struct Count {
    arg: Expr,
    n: i64,
}

impl GroupAccumulator for Count {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        if !self.arg.eval(row)?.is_null() {
            self.n += 1;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(v_int(self.n))
    }
}

/// Integer sums stay integral and fail on overflow; any float promotes the sum to float.
struct Sum {
    arg: Expr,
    total: Option<Value>,
}

impl GroupAccumulator for Sum {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        let v = self.arg.eval(row)?;
        if v.is_null() {
            return Ok(());
        }
        let next = match (self.total.take(), &v) {
            (None, Value::Int(_) | Value::Float(_)) => v.clone(),
            (Some(Value::Int(a)), Value::Int(b)) => v_int(
                a.checked_add(*b)
                    .ok_or_else(|| Error::Arithmetic("integer out of range".into()))?,
            ),
            (Some(total), _) => match (total.as_f64(), v.as_f64()) {
                (Some(a), Some(b)) => v_float(a + b),
                _ => return Err(non_numeric("sum", &v)),
            },
            (None, _) => return Err(non_numeric("sum", &v)),
        };
        self.total = Some(next);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(self.total.unwrap_or(Value::Null))
    }
}

fn non_numeric(function: &str, v: &Value) -> Error {
    Error::InvalidQuery(format!("{function} over non-numeric value {v}"))
}

struct Avg {
    arg: Expr,
    total: f64,
    n: u64,
}

impl GroupAccumulator for Avg {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        let v = self.arg.eval(row)?;
        if v.is_null() {
            return Ok(());
        }
        self.total += v.as_f64().ok_or_else(|| non_numeric("avg", &v))?;
        self.n += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        if self.n == 0 {
            return Ok(Value::Null);
        }
        Ok(v_float(self.total / self.n as f64))
    }
}

/// `min` keeps values ordering `Less` than the best so far, `max` those ordering `Greater`.
struct Extreme {
    arg: Expr,
    keep: Ordering,
    best: Option<Value>,
}

impl GroupAccumulator for Extreme {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        let v = self.arg.eval(row)?;
        if v.is_null() {
            return Ok(());
        }
        let replace = match &self.best {
            None => true,
            Some(best) => v.sql_cmp(best)? == Some(self.keep),
        };
        if replace {
            self.best = Some(v);
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(self.best.unwrap_or(Value::Null))
    }
}

struct ArrayAgg {
    arg: Expr,
    items: Vec<Value>,
}

impl GroupAccumulator for ArrayAgg {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        self.items.push(self.arg.eval(row)?);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        if self.items.is_empty() {
            return Ok(Value::Null);
        }
        Ok(v_array(self.items))
    }
}

struct JsonAgg {
    arg: Expr,
    items: Vec<serde_json::Value>,
}

impl GroupAccumulator for JsonAgg {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        self.items.push(self.arg.eval(row)?.to_json());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        if self.items.is_empty() {
            return Ok(Value::Null);
        }
        Ok(v_json(serde_json::Value::Array(self.items)))
    }
}

struct StringAgg {
    arg: Expr,
    delimiter: String,
    out: Option<String>,
}

impl GroupAccumulator for StringAgg {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        let v = self.arg.eval(row)?;
        if v.is_null() {
            return Ok(());
        }
        let text = match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        };
        match &mut self.out {
            None => self.out = Some(text),
            Some(out) => {
                out.push_str(&self.delimiter);
                out.push_str(&text);
            }
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(self.out.map(|s| v_text(&s)).unwrap_or(Value::Null))
    }
}

struct BoolFold {
    arg: Expr,
    and: bool,
    acc: Option<bool>,
}

impl GroupAccumulator for BoolFold {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        let Some(b) = truth(&self.arg.eval(row)?)? else {
            return Ok(());
        };
        self.acc = Some(match self.acc {
            None => b,
            Some(acc) if self.and => acc && b,
            Some(acc) => acc || b,
        });
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        Ok(self.acc.map(v_bool).unwrap_or(Value::Null))
    }
}

/// Forwards only the first row carrying each distinct argument value.
struct DistinctAccumulator {
    arg: Expr,
    seen: HashSet<Value, BuildHasherDefault<AHasher>>,
    inner: Box<dyn GroupAccumulator>,
}

impl GroupAccumulator for DistinctAccumulator {
    fn feed_item(&mut self, row: &[Value]) -> Result<(), Error> {
        if self.seen.insert(self.arg.eval(row)?) {
            self.inner.feed_item(row)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Value, Error> {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memrel_db::col;
    use memrel_var::v_null;
    use pretty_assertions::assert_eq;

    fn run(call: AggregateCall, ty: DataType, values: Vec<Value>) -> Result<Value, Error> {
        let aggregator = build_aggregator(&call, &[ty])?;
        let mut group = aggregator.create_group();
        for v in values {
            group.feed_item(&[v])?;
        }
        group.finish()
    }

    #[test]
    fn test_empty_groups() {
        let empty = |f| run(AggregateCall::new(f, col(0), "a"), DataType::Int, vec![]).unwrap();
        assert_eq!(empty(AggregateFunction::Count), v_int(0));
        assert_eq!(empty(AggregateFunction::Sum), v_null());
        assert_eq!(empty(AggregateFunction::Avg), v_null());
        assert_eq!(empty(AggregateFunction::Min), v_null());
        assert_eq!(empty(AggregateFunction::ArrayAgg), v_null());
        assert_eq!(
            run(AggregateCall::count_star("n"), DataType::Int, vec![]).unwrap(),
            v_int(0)
        );
    }

    #[test]
    fn test_numeric_aggregates_skip_nulls() {
        let values = vec![v_int(4), v_null(), v_int(2), v_int(4)];
        let call = |f| AggregateCall::new(f, col(0), "a");
        assert_eq!(
            run(call(AggregateFunction::Sum), DataType::Int, values.clone()).unwrap(),
            v_int(10)
        );
        assert_eq!(
            run(call(AggregateFunction::Count), DataType::Int, values.clone()).unwrap(),
            v_int(3)
        );
        assert_eq!(
            run(call(AggregateFunction::Min), DataType::Int, values.clone()).unwrap(),
            v_int(2)
        );
        assert_eq!(
            run(call(AggregateFunction::Max), DataType::Int, values.clone()).unwrap(),
            v_int(4)
        );
        assert_eq!(
            run(call(AggregateFunction::Sum).distinct(), DataType::Int, values.clone()).unwrap(),
            v_int(6)
        );
        assert_eq!(
            run(call(AggregateFunction::Avg).distinct(), DataType::Int, values.clone()).unwrap(),
            v_float(3.0)
        );
        assert_eq!(
            run(call(AggregateFunction::Count).distinct(), DataType::Int, values).unwrap(),
            v_int(2)
        );
    }

    #[test]
    fn test_sum_overflow_and_promotion() {
        let call = AggregateCall::new(AggregateFunction::Sum, col(0), "s");
        assert!(matches!(
            run(call.clone(), DataType::Int, vec![v_int(i64::MAX), v_int(1)]),
            Err(Error::Arithmetic(_))
        ));
        assert_eq!(
            run(call, DataType::Float, vec![v_int(1), v_float(0.5)]).unwrap(),
            v_float(1.5)
        );
    }

    #[test]
    fn test_collection_aggregates() {
        let values = vec![v_text("a"), v_null(), v_text("b")];
        assert_eq!(
            run(
                AggregateCall::string_agg(col(0), ", ", "s"),
                DataType::Text,
                values.clone()
            )
            .unwrap(),
            v_text("a, b")
        );
        assert_eq!(
            run(
                AggregateCall::new(AggregateFunction::ArrayAgg, col(0), "a"),
                DataType::Text,
                values.clone()
            )
            .unwrap(),
            v_array(values.clone())
        );
        assert_eq!(
            run(
                AggregateCall::new(AggregateFunction::JsonAgg, col(0), "j"),
                DataType::Text,
                values
            )
            .unwrap(),
            v_json(serde_json::json!(["a", null, "b"]))
        );
    }

    #[test]
    fn test_bool_aggregates() {
        let values = vec![v_bool(true), v_null(), v_bool(false)];
        let call = |f| AggregateCall::new(f, col(0), "b");
        assert_eq!(
            run(call(AggregateFunction::BoolAnd), DataType::Bool, values.clone()).unwrap(),
            v_bool(false)
        );
        assert_eq!(
            run(call(AggregateFunction::BoolOr), DataType::Bool, values).unwrap(),
            v_bool(true)
        );
    }

    #[test]
    fn test_argument_validation() {
        assert!(matches!(
            build_aggregator(
                &AggregateCall::new(AggregateFunction::Sum, col(0), "s"),
                &[DataType::Text]
            ),
            Err(Error::InvalidQuery(_))
        ));
        let mut call = AggregateCall::count_star("n");
        call.arg = Some(col(0));
        assert!(build_aggregator(&call, &[DataType::Int]).is_err());
    }
}
