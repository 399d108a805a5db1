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

use crate::aggregation::{AggregateCall, Aggregation};
use crate::context::BuildContext;
use crate::distinct::Distinct;
use crate::filter::build_filter;
use crate::join::{Join, JoinCondition, JoinKind};
use crate::limit::Limit;
use crate::order::{OrderKey, OrderBy};
use crate::projection::Projection;
use crate::selection::Selection;
use crate::table_source::TableSelection;
use crate::union::Union;
use memrel_db::{Database, Error, Expr};
use std::sync::Arc;

/// Every row of `table`, columns qualified by the table name.
pub fn scan(db: &Database, table: &str) -> Result<Arc<dyn Selection>, Error> {
    Ok(Arc::new(TableSelection::new(db.get_table(table)?)))
}

/// Every row of `table`, columns qualified by `alias`.
pub fn scan_as(db: &Database, table: &str, alias: &str) -> Result<Arc<dyn Selection>, Error> {
    Ok(Arc::new(TableSelection::aliased(db.get_table(table)?, alias)))
}

/// Composes operators on top of a selection.
pub trait SelectionExt {
    /// Positional expression for a column reference (`col` or `alias.col`).
    fn column(&self, reference: &str) -> Result<Expr, Error>;

    fn filter(&self, ctx: &BuildContext, predicate: Expr) -> Result<Arc<dyn Selection>, Error>;

    fn select(&self, items: Vec<(Expr, &str)>) -> Result<Arc<dyn Selection>, Error>;

    fn select_columns(&self, references: &[&str]) -> Result<Arc<dyn Selection>, Error>;

    fn alias(&self, alias: &str) -> Arc<dyn Selection>;

    fn order_by(&self, keys: Vec<OrderKey>) -> Result<Arc<dyn Selection>, Error>;

    fn limit(&self, limit: Option<i64>, offset: i64) -> Result<Arc<dyn Selection>, Error>;

    fn distinct(&self, on: Option<Vec<Expr>>) -> Result<Arc<dyn Selection>, Error>;

    fn group_by(
        &self,
        ctx: &BuildContext,
        keys: Vec<Expr>,
        aggregates: Vec<AggregateCall>,
    ) -> Result<Arc<dyn Selection>, Error>;

    fn join(
        &self,
        ctx: &BuildContext,
        other: Arc<dyn Selection>,
        kind: JoinKind,
        condition: JoinCondition,
    ) -> Result<Arc<dyn Selection>, Error>;

    fn union(&self, other: Arc<dyn Selection>, all: bool) -> Result<Arc<dyn Selection>, Error>;
}

impl SelectionExt for Arc<dyn Selection> {
    fn column(&self, reference: &str) -> Result<Expr, Error> {
        Ok(Expr::Column(self.get_column(reference)?))
    }

    fn filter(&self, ctx: &BuildContext, predicate: Expr) -> Result<Arc<dyn Selection>, Error> {
        build_filter(ctx, self.clone(), predicate)
    }

    fn select(&self, items: Vec<(Expr, &str)>) -> Result<Arc<dyn Selection>, Error> {
        let items = items
            .into_iter()
            .map(|(e, name)| (e, name.to_string()))
            .collect();
        Ok(Arc::new(Projection::new(self.clone(), items)?))
    }

    fn select_columns(&self, references: &[&str]) -> Result<Arc<dyn Selection>, Error> {
        let items = references
            .iter()
            .map(|r| {
                let position = self.get_column(r)?;
                Ok((Expr::Column(position), self.columns()[position].name.clone()))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Arc::new(Projection::new(self.clone(), items)?))
    }

    fn alias(&self, alias: &str) -> Arc<dyn Selection> {
        Arc::new(Projection::aliased(self.clone(), alias))
    }

    fn order_by(&self, keys: Vec<OrderKey>) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(OrderBy::new(self.clone(), keys)?))
    }

    fn limit(&self, limit: Option<i64>, offset: i64) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(Limit::new(self.clone(), limit, offset)?))
    }

    fn distinct(&self, on: Option<Vec<Expr>>) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(Distinct::new(self.clone(), on)?))
    }

    fn group_by(
        &self,
        ctx: &BuildContext,
        keys: Vec<Expr>,
        aggregates: Vec<AggregateCall>,
    ) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(Aggregation::new(
            self.clone(),
            keys,
            aggregates,
            ctx.counters().clone(),
        )?))
    }

    fn join(
        &self,
        ctx: &BuildContext,
        other: Arc<dyn Selection>,
        kind: JoinKind,
        condition: JoinCondition,
    ) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(Join::new(
            self.clone(),
            other,
            kind,
            condition,
            ctx.config().clone(),
            ctx.counters().clone(),
        )?))
    }

    fn union(&self, other: Arc<dyn Selection>, all: bool) -> Result<Arc<dyn Selection>, Error> {
        Ok(Arc::new(Union::new(self.clone(), other, all)?))
    }
}
