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

use memrel_var::CastError;
use std::fmt::{Display, Formatter};

/// The kind of catalog or storage object an error refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
    Row,
    Constraint,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Table => "table",
            ObjectKind::Column => "column",
            ObjectKind::Index => "index",
            ObjectKind::Row => "row",
            ObjectKind::Constraint => "constraint",
        };
        write!(f, "{s}")
    }
}

/// Raised by indexes and tables before any structure is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstraintViolation {
    #[error("duplicate key value violates unique constraint \"{index}\"")]
    Unique { index: String },
    #[error("null value in column \"{column}\" violates not-null constraint")]
    NotNullColumn { column: String },
    #[error("null value in key of index \"{index}\" violates not-null constraint")]
    NotNullIndex { index: String },
    #[error("new row violates check constraint \"{name}\"")]
    Check { name: String },
    #[error("cannot insert a non-DEFAULT value into generated column \"{column}\"")]
    GeneratedColumn { column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    ConstraintViolation(#[from] ConstraintViolation),
    #[error("{kind} \"{name}\" does not exist")]
    NotFound { kind: ObjectKind, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: ObjectKind, name: String },
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("{0}")]
    Arithmetic(String),
    /// Corrupted bookkeeping. Never the result of user input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ObjectKind, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }
}
