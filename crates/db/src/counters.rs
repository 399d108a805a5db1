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

use std::sync::atomic::{AtomicU64, Ordering};

/// A named monotonic counter.
#[derive(Debug)]
pub struct Counter {
    pub operation: &'static str,
    count: AtomicU64,
}

impl Counter {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            count: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn incr(&self) {
        self.add(1);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Planner and transaction observability hooks, shared by the database with everything built
/// against it.
#[derive(Debug)]
pub struct DbCounters {
    pub catastrophic_joins: Counter,
    pub index_joins: Counter,
    pub direct_aggregations: Counter,
    pub index_aggregations: Counter,
    pub sequential_aggregations: Counter,
    pub commits: Counter,
    pub rollbacks: Counter,
}

impl DbCounters {
    pub fn new() -> Self {
        Self {
            catastrophic_joins: Counter::new("catastrophic_joins"),
            index_joins: Counter::new("index_joins"),
            direct_aggregations: Counter::new("direct_aggregations"),
            index_aggregations: Counter::new("index_aggregations"),
            sequential_aggregations: Counter::new("sequential_aggregations"),
            commits: Counter::new("commits"),
            rollbacks: Counter::new("rollbacks"),
        }
    }

    pub fn all_counters(&self) -> Vec<&Counter> {
        vec![
            &self.catastrophic_joins,
            &self.index_joins,
            &self.direct_aggregations,
            &self.index_aggregations,
            &self.sequential_aggregations,
            &self.commits,
            &self.rollbacks,
        ]
    }
}

impl Default for DbCounters {
    fn default() -> Self {
        Self::new()
    }
}
