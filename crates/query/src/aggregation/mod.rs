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

//! `GROUP BY` and aggregate evaluation in three tiers, tried cheapest first:
//!
//! * direct: no grouping keys and every aggregate answerable from metadata (row counts, index
//!   bounds), without touching rows;
//! * index-assisted: an index keyed exactly on the grouping expressions, whose distinct keys and
//!   bucket sizes answer every aggregate;
//! * sequential: one pass over the source, grouping in first-seen order.

mod accumulators;

pub use accumulators::{
    AggregateCall, AggregateFunction, Aggregator, GroupAccumulator, build_aggregator,
};

use crate::selection::{ColumnInfo, Plan, RowStream, Selection};
use ahash::AHasher;
use indexmap::IndexMap;
use itertools::Itertools;
use memrel_db::{DbCounters, Error, Expr, Row, RowId, Transaction};
use memrel_var::Value;
use std::hash::BuildHasherDefault;
use std::sync::Arc;
use tracing::debug;

type Groups = IndexMap<Vec<Value>, Vec<Box<dyn GroupAccumulator>>, BuildHasherDefault<AHasher>>;

enum Tier {
    Direct(Vec<Value>),
    Index(Vec<(Vec<Value>, usize)>),
    Sequential,
}

impl Tier {
    fn name(&self) -> &'static str {
        match self {
            Tier::Direct(_) => "direct",
            Tier::Index(_) => "index",
            Tier::Sequential => "sequential",
        }
    }
}

/// Output columns are the grouping keys followed by the aggregates.
#[derive(Debug)]
pub struct Aggregation {
    source: Arc<dyn Selection>,
    keys: Vec<Expr>,
    aggregators: Vec<Box<dyn Aggregator>>,
    columns: Vec<ColumnInfo>,
    counters: Arc<DbCounters>,
}

impl Aggregation {
    pub fn new(
        source: Arc<dyn Selection>,
        keys: Vec<Expr>,
        calls: Vec<AggregateCall>,
        counters: Arc<DbCounters>,
    ) -> Result<Self, Error> {
        let arity = source.columns().len();
        let referenced = keys
            .iter()
            .chain(calls.iter().filter_map(|c| c.arg.as_ref()))
            .flat_map(|e| e.columns());
        if let Some(c) = referenced.into_iter().find(|c| *c >= arity) {
            return Err(Error::InvalidQuery(format!(
                "aggregation references column position {c}, source has {arity} columns"
            )));
        }
        let types: Vec<_> = source.columns().iter().map(|c| c.data_type.clone()).collect();
        let aggregators = calls
            .iter()
            .map(|call| build_aggregator(call, &types))
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns: Vec<ColumnInfo> = keys
            .iter()
            .map(|key| match key.as_column() {
                Some(c) => source.columns()[c].clone(),
                None => ColumnInfo::new("?column?", None, key.data_type(&types)),
            })
            .collect();
        columns.extend(
            aggregators
                .iter()
                .map(|a| ColumnInfo::new(a.call().alias.clone(), None, a.output_type())),
        );
        Ok(Self {
            source,
            keys,
            aggregators,
            columns,
            counters,
        })
    }

    fn tier(&self, t: &Transaction) -> Tier {
        if self.keys.is_empty() {
            let direct = self
                .aggregators
                .iter()
                .map(|a| a.compute_direct(self.source.as_ref(), t))
                .collect::<Option<Vec<_>>>();
            if let Some(values) = direct {
                return Tier::Direct(values);
            }
            return Tier::Sequential;
        }
        if !self.aggregators.iter().all(|a| a.supports_index(&self.keys)) {
            return Tier::Sequential;
        }
        match self.source.get_index(&self.keys).and_then(|i| i.keys(t)) {
            Some(keys) => Tier::Index(keys),
            None => Tier::Sequential,
        }
    }

    fn group_row(n: usize, values: Vec<Value>) -> Row {
        Row::new(RowId::new(&format!("group:{n:08x}")), values)
    }

    fn compute(&self, t: &Transaction) -> Result<Vec<Row>, Error> {
        let tier = self.tier(t);
        debug!(tier = tier.name(), keys = self.keys.len(), "aggregation tier");
        match tier {
            Tier::Direct(values) => {
                self.counters.direct_aggregations.incr();
                Ok(vec![Self::group_row(0, values)])
            }
            Tier::Index(keys) => {
                self.counters.index_aggregations.incr();
                keys.into_iter()
                    .enumerate()
                    .map(|(n, (key, count))| {
                        let mut values = key.clone();
                        for aggregator in &self.aggregators {
                            let value = aggregator
                                .compute_from_index(&key, count, &self.keys)
                                .ok_or_else(|| {
                                    Error::Internal(format!(
                                        "{} cannot be answered from an index",
                                        aggregator.call()
                                    ))
                                })?;
                            values.push(value);
                        }
                        Ok(Self::group_row(n, values))
                    })
                    .collect()
            }
            Tier::Sequential => {
                self.counters.sequential_aggregations.incr();
                self.sequential(t)
            }
        }
    }

    fn sequential(&self, t: &Transaction) -> Result<Vec<Row>, Error> {
        let mut groups = Groups::default();
        // Without grouping keys there is exactly one group, even over no rows.
        if self.keys.is_empty() {
            groups.insert(vec![], self.new_group());
        }
        for row in self.source.enumerate(t) {
            let row = row?;
            let key = self
                .keys
                .iter()
                .map(|k| k.eval(&row.values))
                .collect::<Result<Vec<_>, _>>()?;
            let group = groups.entry(key).or_insert_with(|| self.new_group());
            for accumulator in group.iter_mut() {
                accumulator.feed_item(&row.values)?;
            }
        }
        groups
            .into_iter()
            .enumerate()
            .map(|(n, (mut values, accumulators))| {
                for accumulator in accumulators {
                    values.push(accumulator.finish()?);
                }
                Ok(Self::group_row(n, values))
            })
            .collect()
    }

    fn new_group(&self) -> Vec<Box<dyn GroupAccumulator>> {
        self.aggregators.iter().map(|a| a.create_group()).collect()
    }
}

impl Selection for Aggregation {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        match self.compute(t) {
            Ok(rows) => Box::new(rows.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        match self.tier(t) {
            Tier::Direct(_) => 1.0,
            Tier::Index(keys) => keys.len() as f64,
            Tier::Sequential => self.source.entropy(t),
        }
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let tier = self.tier(t);
        let keys = self.keys.iter().join(", ");
        let calls = self
            .aggregators
            .iter()
            .map(|a| format!("{} as {}", a.call(), a.call().alias))
            .join(", ");
        Plan::new(
            "Aggregate",
            format!("{} group by [{keys}] compute [{calls}]", tier.name()),
            self.entropy(t),
        )
        .with_child(self.source.explain(t))
    }
}
