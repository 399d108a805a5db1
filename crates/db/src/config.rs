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

use serde::{Deserialize, Serialize};

pub const DEFAULT_SEQ_SCAN_PENALTY: f64 = 1.5;

/// Tuning knobs for the planner heuristics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Multiplier applied to the entropy of a sequential filter, so that an index-backed
    /// alternative over the same source is preferred whenever one exists.
    pub seq_scan_penalty: f64,
    /// Estimated fraction of an index's rows produced by a one-sided range traversal
    /// (`>`, `>=`, `<`, `<=`, `<>`).
    pub range_selectivity: f64,
    /// Estimated fraction of an index's rows produced by a `BETWEEN` traversal.
    pub between_selectivity: f64,
    /// Estimated fraction of an index's rows produced by a prefix (`LIKE 'abc%'`) traversal.
    pub prefix_selectivity: f64,
    /// Whether a join falling back to a full cross product logs a warning.
    pub warn_on_catastrophic_join: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            seq_scan_penalty: DEFAULT_SEQ_SCAN_PENALTY,
            range_selectivity: 0.5,
            between_selectivity: 0.25,
            prefix_selectivity: 0.2,
            warn_on_catastrophic_join: true,
        }
    }
}
