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

//! Primitive value types for the memrel engine: the `Value` enum, its `DataType`, and the
//! comparison/ordering contract every other layer relies on.

mod data_type;
mod error;
mod value;

pub use data_type::DataType;
pub use error::CastError;
pub use value::{Value, v_array, v_bool, v_float, v_int, v_json, v_null, v_text};
