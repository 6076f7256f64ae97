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

//! Error types for ledger operations.

use crate::base::{BookId, BreedingId, BullId, SemenType};
use crate::breeding::BreedingStatus;
use crate::saga::SagaStep;
use crate::safety::PregnancyBlock;
use chrono::NaiveDate;
use thiserror::Error;

/// Ledger operation errors.
///
/// Validation variants are raised before any write happens. Safety variants
/// carry the offending record so the caller can offer the confirm or unlock
/// workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // --- entry validation ---
    /// No receipt number given and no active book to draw one from
    #[error("receipt number is missing")]
    MissingReceipt,

    #[error("no bull selected")]
    MissingBull,

    #[error("tag number must be {min} to {max} digits, got {len}")]
    InvalidTagLength { len: usize, min: usize, max: usize },

    #[error("tag number must contain digits only: {0}")]
    InvalidTag(String),

    #[error("semen type not selected")]
    MissingSemenType,

    #[error("village is compulsory")]
    MissingVillage,

    #[error("breed not selected")]
    MissingBreed,

    /// Manual receipt number already used in the same series
    #[error("receipt #{number} already exists in the {semen_type} series")]
    DuplicateReceipt { number: u32, semen_type: SemenType },

    #[error("bull carries {bull} semen but the entry is {entry}")]
    BullSemenMismatch { bull: SemenType, entry: SemenType },

    // --- stock ---
    #[error("no doses left for bull {0}")]
    InsufficientStock(BullId),

    #[error("cannot discard {requested} doses, only {available} available")]
    DiscardExceedsStock { requested: u32, available: u32 },

    #[error("quantity must be positive")]
    ZeroQuantity,

    // --- safety ---
    #[error("animal is pregnant, entry blocked ({})", .0.reason.as_str())]
    BlockedPregnant(PregnancyBlock),

    /// Same tag already inseminated on the same date; needs confirmation
    #[error("an entry for this tag already exists on the same date ({existing})")]
    DuplicateEntry { existing: BreedingId },

    // --- state machine ---
    #[error("cannot {action} a record in status '{from}'")]
    InvalidTransition {
        from: BreedingStatus,
        action: &'static str,
    },

    #[error("no pregnant record found for tag {0}")]
    NotPregnant(String),

    /// An abortion cannot predate the pregnancy it ends
    #[error("abortion dated {date} is before the pregnancy recorded on {since}")]
    AbortionBeforePregnancy { date: NaiveDate, since: NaiveDate },

    // --- lookups ---
    #[error("breeding record {0} not found")]
    RecordNotFound(BreedingId),

    #[error("bull {0} not found")]
    BullNotFound(BullId),

    #[error("receipt book {0} not found")]
    BookNotFound(BookId),

    /// Empty range, or one reaching the last representable number
    #[error("receipt book range {start}..={end} is invalid")]
    InvalidBookRange { start: u32, end: u32 },

    // --- store ---
    #[error("document {id} not found in {collection}")]
    DocumentNotFound { collection: &'static str, id: String },

    #[error("document {id} already exists in {collection}")]
    DuplicateDocument { collection: &'static str, id: String },

    #[error("collection {0} is read-only")]
    ReadOnly(&'static str),

    // --- saga ---
    /// A write failed after earlier writes of the same operation succeeded.
    /// Completed steps have been compensated.
    #[error("save failed at step {step}: {reason}")]
    PartialFailure { step: SagaStep, reason: String },
}

/// Configuration loading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("inconsistent config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::LedgerError;
    use crate::base::{BreedingId, SemenType};
    use chrono::NaiveDate;

    #[test]
    fn error_display_messages() {
        assert_eq!(LedgerError::MissingReceipt.to_string(), "receipt number is missing");
        assert_eq!(LedgerError::MissingBull.to_string(), "no bull selected");
        assert_eq!(
            LedgerError::InvalidTagLength { len: 5, min: 8, max: 12 }.to_string(),
            "tag number must be 8 to 12 digits, got 5"
        );
        assert_eq!(
            LedgerError::DuplicateReceipt {
                number: 42,
                semen_type: SemenType::Sexed
            }
            .to_string(),
            "receipt #42 already exists in the Sexed series"
        );
        assert_eq!(
            LedgerError::DiscardExceedsStock {
                requested: 10,
                available: 3
            }
            .to_string(),
            "cannot discard 10 doses, only 3 available"
        );
        assert_eq!(LedgerError::ReadOnly("bulls").to_string(), "collection bulls is read-only");
        assert_eq!(
            LedgerError::AbortionBeforePregnancy {
                date: NaiveDate::from_ymd_opt(2024, 2, 15).unwrap(),
                since: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            }
            .to_string(),
            "abortion dated 2024-02-15 is before the pregnancy recorded on 2024-03-01"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = LedgerError::DuplicateEntry {
            existing: BreedingId::generate(),
        };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
