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

//! Relational operators over `memrel-db` tables.
//!
//! Queries are trees of [`Selection`]s. A selection is an immutable recipe; enumerating it
//! against a [`memrel_db::Transaction`] produces rows. Strategy decisions (which index drives a
//! filter conjunction, which side of a join probes the other, which aggregation tier applies) are
//! remade on every enumeration from the statistics visible to that transaction.

mod aggregation;
mod builder;
mod context;
mod derived_index;
mod distinct;
mod filter;
mod join;
mod limit;
mod mutation;
mod order;
mod projection;
mod selection;
mod table_source;
mod union;

pub use aggregation::{
    AggregateCall, AggregateFunction, Aggregation, Aggregator, GroupAccumulator, build_aggregator,
};
pub use builder::{SelectionExt, scan, scan_as};
pub use context::BuildContext;
pub use derived_index::{MappedIndex, RestrictiveIndex};
pub use distinct::Distinct;
pub use filter::{AndFilter, FalseFilter, IndexFilter, OrFilter, SeqFilter, build_filter};
pub use join::{Join, JoinCondition, JoinIndex, JoinKind};
pub use limit::Limit;
pub use mutation::{InsertSource, Mutation, MutationResult};
pub use order::{OrderBy, OrderKey};
pub use projection::Projection;
pub use selection::{
    ColumnInfo, IndexSource, KeyBounds, Plan, Probe, RowStream, Selection, collect_rows,
    empty_stream, resolve_column,
};
pub use table_source::{TableIndex, TableSelection};
pub use union::Union;
