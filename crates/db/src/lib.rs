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

//! Transactional in-memory storage: versioned slot bindings, B-tree secondary indexes and table
//! stores, plus the catalog and session surfaces the statement layer drives.

mod config;
mod counters;
mod database;
mod error;
pub mod expr;
pub mod index;
mod row;
mod session;
pub mod table;
pub mod tx;

pub use config::DatabaseConfig;
pub use counters::{Counter, DbCounters};
pub use database::Database;
pub use error::{ConstraintViolation, Error, ObjectKind};
pub use expr::{BinaryOp, Expr, UnaryOp, col, lit};
pub use index::{Index, IndexDef, IndexKey, IndexScan, IndexStats, KeyColumn};
pub use row::{Row, RowId, RowIdGen};
pub use session::Session;
pub use table::{AlterColumn, Column, ColumnDef, OnConflict, Table, TableSchema};
pub use tx::{SlotKey, Transaction};
