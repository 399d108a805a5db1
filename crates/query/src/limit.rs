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

use crate::selection::{ColumnInfo, Plan, RowStream, Selection, empty_stream};
use memrel_db::{Error, IndexStats, Row, Transaction};
use std::sync::Arc;

/// `LIMIT` / `OFFSET`. Pulls no more source rows than it needs.
#[derive(Debug)]
pub struct Limit {
    source: Arc<dyn Selection>,
    limit: Option<i64>,
    offset: usize,
}

impl Limit {
    pub fn new(source: Arc<dyn Selection>, limit: Option<i64>, offset: i64) -> Result<Self, Error> {
        let offset = usize::try_from(offset)
            .map_err(|_| Error::InvalidQuery("OFFSET must not be negative".into()))?;
        Ok(Self {
            source,
            limit,
            offset,
        })
    }

    fn take(&self) -> Option<usize> {
        self.limit.map(|l| usize::try_from(l).unwrap_or(0))
    }
}

struct LimitStream<'a> {
    inner: RowStream<'a>,
    skip: usize,
    remaining: Option<usize>,
}

impl Iterator for LimitStream<'_> {
    type Item = Result<Row, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining == Some(0) {
                return None;
            }
            let row = match self.inner.next()? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = &mut self.remaining {
                *remaining -= 1;
            }
            return Some(Ok(row));
        }
    }
}

impl Selection for Limit {
    fn columns(&self) -> &[ColumnInfo] {
        self.source.columns()
    }

    fn enumerate<'a>(&'a self, t: &'a Transaction) -> RowStream<'a> {
        if self.take() == Some(0) {
            return empty_stream();
        }
        Box::new(LimitStream {
            inner: self.source.enumerate(t),
            skip: self.offset,
            remaining: self.take(),
        })
    }

    fn stats(&self, t: &Transaction) -> Option<IndexStats> {
        let count = self.source.stats(t)?.count.saturating_sub(self.offset);
        Some(IndexStats {
            count: self.take().map_or(count, |l| count.min(l)),
        })
    }

    fn entropy(&self, t: &Transaction) -> f64 {
        let source = self.source.entropy(t);
        match self.take() {
            Some(l) => source.min((l + self.offset) as f64),
            None => source,
        }
    }

    fn explain(&self, t: &Transaction) -> Plan {
        let detail = match self.limit {
            Some(l) => format!("limit {l} offset {}", self.offset),
            None => format!("offset {}", self.offset),
        };
        Plan::new("Limit", detail, self.entropy(t)).with_child(self.source.explain(t))
    }
}
