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

use crate::CastError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The semantic type of a column or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// The type of an untyped `NULL` literal.
    Null,
    Bool,
    Int,
    Float,
    Text,
    Array(Box<DataType>),
    Json,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Whether values of `self` and `other` can be compared and ordered against each other.
    /// An untyped null is comparable with everything.
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Null, _) | (_, DataType::Null) => true,
            (l, r) if l.is_numeric() && r.is_numeric() => true,
            (DataType::Array(l), DataType::Array(r)) => l.is_comparable_with(r),
            (l, r) => l == r,
        }
    }

    pub fn check_comparable(&self, other: &DataType) -> Result<(), CastError> {
        if self.is_comparable_with(other) {
            Ok(())
        } else {
            Err(CastError::Incompatible {
                left: self.clone(),
                right: other.clone(),
            })
        }
    }

    /// The type two comparable operands are reconciled into, e.g. `int + float` yields `float`.
    pub fn unify(&self, other: &DataType) -> Result<DataType, CastError> {
        match (self, other) {
            (DataType::Null, t) | (t, DataType::Null) => Ok(t.clone()),
            (DataType::Int, DataType::Float) | (DataType::Float, DataType::Int) => {
                Ok(DataType::Float)
            }
            (l, r) if l.is_comparable_with(r) => Ok(l.clone()),
            (l, r) => Err(CastError::Incompatible {
                left: l.clone(),
                right: r.clone(),
            }),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if let Some(elem) = s.strip_suffix("[]") {
            return DataType::parse(elem).map(|e| DataType::Array(Box::new(e)));
        }
        match s.as_str() {
            "bool" | "boolean" => Some(DataType::Bool),
            "int" | "int4" | "int8" | "integer" | "bigint" | "smallint" | "serial" => {
                Some(DataType::Int)
            }
            "float" | "float4" | "float8" | "real" | "double precision" | "numeric" => {
                Some(DataType::Float)
            }
            "text" | "varchar" | "char" | "character varying" => Some(DataType::Text),
            "json" | "jsonb" => Some(DataType::Json),
            _ => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Bool => write!(f, "boolean"),
            DataType::Int => write!(f, "integer"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "text"),
            DataType::Array(elem) => write!(f, "{elem}[]"),
            DataType::Json => write!(f, "jsonb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_types_are_comparable() {
        assert!(DataType::Int.is_comparable_with(&DataType::Float));
        assert!(DataType::Null.is_comparable_with(&DataType::Text));
        assert!(!DataType::Int.is_comparable_with(&DataType::Text));
        assert!(
            DataType::Array(Box::new(DataType::Int))
                .is_comparable_with(&DataType::Array(Box::new(DataType::Float)))
        );
    }

    #[test]
    fn test_unify() {
        assert_eq!(DataType::Int.unify(&DataType::Float), Ok(DataType::Float));
        assert_eq!(DataType::Null.unify(&DataType::Text), Ok(DataType::Text));
        assert_eq!(
            DataType::Bool.unify(&DataType::Int),
            Err(CastError::Incompatible {
                left: DataType::Bool,
                right: DataType::Int
            })
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(DataType::parse("INTEGER"), Some(DataType::Int));
        assert_eq!(
            DataType::parse("text[]"),
            Some(DataType::Array(Box::new(DataType::Text)))
        );
        assert_eq!(DataType::parse("jsonb"), Some(DataType::Json));
        assert_eq!(DataType::parse("geometry"), None);
    }
}
