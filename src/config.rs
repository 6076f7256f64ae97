// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Domain policy constants, loadable from TOML.
//!
//! ```toml
//! repeat_breeding_gap_days = 7
//! pd_due_days = 75
//! cow_gestation_days = 280
//! buffalo_gestation_days = 310
//! service_fee = "300"
//! super_admin_emails = ["chief@example.org"]
//! ```

use crate::base::Jati;
use crate::error::ConfigError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// A repeat A.I. more than this many days after the previous one marks
    /// the previous cycle as failed.
    pub repeat_breeding_gap_days: i64,
    /// Days after A.I. at which a pregnancy diagnosis becomes overdue.
    pub pd_due_days: i64,
    pub cow_gestation_days: i64,
    pub buffalo_gestation_days: i64,
    /// Days since A.I. from which a pregnant animal is "approaching" calving.
    pub calving_approach_days: i64,
    pub tag_min_len: usize,
    pub tag_max_len: usize,
    /// Fee charged per A.I. service, printed on the receipt.
    pub service_fee: Decimal,
    /// Accounts that see every tenant regardless of role.
    pub super_admin_emails: Vec<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            repeat_breeding_gap_days: 7,
            pd_due_days: 75,
            cow_gestation_days: 280,
            buffalo_gestation_days: 310,
            calving_approach_days: 270,
            tag_min_len: 8,
            tag_max_len: 12,
            service_fee: dec!(300),
            super_admin_emails: Vec::new(),
        }
    }
}

impl LedgerConfig {
    /// Reads a TOML file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.tag_min_len > config.tag_max_len {
            return Err(ConfigError::Invalid(format!(
                "tag_min_len ({}) exceeds tag_max_len ({})",
                config.tag_min_len, config.tag_max_len
            )));
        }
        Ok(config)
    }

    pub fn gestation_days(&self, jati: Jati) -> i64 {
        match jati {
            Jati::Cow => self.cow_gestation_days,
            Jati::Buffalo => self.buffalo_gestation_days,
        }
    }
}
