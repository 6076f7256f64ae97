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

//! Breeding records and their lifecycle.
//!
//! One [`BreedingRecord`] per insemination. Its status only changes through
//! [`BreedingRecord::apply`], which rejects any move not listed below.
//!
//! ```text
//!   A.I. Done ──pd(+)──► Pregnant (PD+) ──calve──► Empty (+ calf)
//!       │                    │
//!       ├──pd(-)──► Empty    ├──abort──────────► Aborted
//!       ├──repeat─► Empty    └──false positive─► Empty
//!       └──abort──► Aborted
//! ```
//!
//! `Empty` closes the cycle; the next insemination of the tag opens a new
//! record.

use crate::base::{BreedingId, BullId, CalvingId, Jati, SemenType, TreatmentId, UserId};
use crate::error::LedgerError;
use crate::store::Document;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum BreedingStatus {
    #[serde(rename = "A.I. Done")]
    AiDone,
    Pregnant,
    #[serde(rename = "Pregnant (PD+)")]
    PregnantConfirmed,
    Empty,
    Aborted,
    /// Written by older clients; behaves like `Empty`.
    Calved,
}

impl BreedingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiDone => "A.I. Done",
            Self::Pregnant => "Pregnant",
            Self::PregnantConfirmed => "Pregnant (PD+)",
            Self::Empty => "Empty",
            Self::Aborted => "Aborted",
            Self::Calved => "Calved",
        }
    }

    pub fn is_pregnant(&self) -> bool {
        matches!(self, Self::Pregnant | Self::PregnantConfirmed)
    }
}

impl fmt::Display for BreedingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PdResult {
    Positive,
    Negative,
}

impl std::str::FromStr for PdResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "+" | "pd+" => Ok(Self::Positive),
            "negative" | "-" | "pd-" => Ok(Self::Negative),
            other => Err(format!("unknown P.D. result '{other}'")),
        }
    }
}

/// A requested lifecycle move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    RecordPd { result: PdResult, date: NaiveDate },
    /// Inferred failure of this cycle because the tag was inseminated again.
    RepeatBreeding { on: NaiveDate },
    Abort,
    CorrectFalsePositive,
    Calve { gender: String, date: NaiveDate },
}

impl Transition {
    fn name(&self) -> &'static str {
        match self {
            Self::RecordPd { .. } => "record P.D. on",
            Self::RepeatBreeding { .. } => "mark repeat breeding on",
            Self::Abort => "abort",
            Self::CorrectFalsePositive => "correct a false positive on",
            Self::Calve { .. } => "record calving on",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum AuditAction {
    SemenTypeChanged,
    BullChanged,
}

/// One compensating edit, kept on the record it changed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: AuditAction,
    pub old_receipt: u32,
    pub old_type: SemenType,
    pub new_receipt: u32,
    pub new_type: SemenType,
    pub old_bull: BullId,
    pub new_bull: BullId,
    pub user: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BreedingRecord {
    pub id: BreedingId,
    pub date: NaiveDate,
    /// Ear tag, or a synthetic name-based id when `untagged`.
    pub tag_no: String,
    #[serde(default)]
    pub untagged: bool,
    pub owner_name: String,
    pub mobile_number: String,
    pub village: String,
    pub category: String,
    pub jati: Jati,
    pub breed: String,
    pub semen_type: SemenType,
    pub bull_id: BullId,
    pub bull_name: String,
    pub receipt_no: u32,
    pub cost: Decimal,
    pub status: BreedingStatus,
    pub pd_result: Option<PdResult>,
    pub pd_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    pub calf_gender: Option<String>,
    pub last_calving_date: Option<NaiveDate>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub audit_history: Vec<AuditEntry>,
}

impl BreedingRecord {
    /// Whether this record still describes a pregnant animal.
    ///
    /// A positive result on a record that was never moved out of
    /// `A.I. Done` counts too.
    pub fn is_pregnant(&self) -> bool {
        self.status.is_pregnant()
            || (self.status == BreedingStatus::AiDone && self.pd_result == Some(PdResult::Positive))
    }

    /// Applies a lifecycle move in place.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidTransition`] when the move is not allowed from
    /// the current status. The record is left unchanged.
    pub fn apply(&mut self, transition: Transition) -> Result<(), LedgerError> {
        use BreedingStatus::*;

        let allowed = match &transition {
            Transition::RecordPd { .. } => {
                matches!(self.status, AiDone | Pregnant | PregnantConfirmed | Empty)
            }
            Transition::RepeatBreeding { .. } => matches!(self.status, AiDone | Pregnant),
            Transition::Abort => matches!(self.status, AiDone | Pregnant | PregnantConfirmed),
            Transition::CorrectFalsePositive => self.is_pregnant(),
            Transition::Calve { .. } => true,
        };
        if !allowed {
            return Err(LedgerError::InvalidTransition {
                from: self.status,
                action: transition.name(),
            });
        }

        match transition {
            Transition::RecordPd { result, date } => {
                self.pd_result = Some(result);
                self.pd_date = Some(date);
                self.status = match result {
                    PdResult::Positive => PregnantConfirmed,
                    PdResult::Negative => Empty,
                };
            }
            Transition::RepeatBreeding { on } => {
                self.pd_result = Some(PdResult::Negative);
                self.status = Empty;
                self.push_note(&format!("[Auto-negative: repeat A.I. on {on}]"));
            }
            Transition::Abort => {
                self.status = Aborted;
            }
            Transition::CorrectFalsePositive => {
                self.pd_result = Some(PdResult::Negative);
                self.status = Empty;
            }
            Transition::Calve { gender, date } => {
                self.push_note(&format!("[Delivered: {gender} on {date}]"));
                self.status = Empty;
                self.calf_gender = Some(gender);
                self.last_calving_date = Some(date);
            }
        }
        Ok(())
    }

    fn push_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push(' ');
        }
        self.notes.push_str(note);
    }
}

impl Document for BreedingRecord {
    type Id = BreedingId;
    const COLLECTION: &'static str = "breeding";

    fn id(&self) -> BreedingId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TreatmentKind {
    #[serde(rename = "PD")]
    Pd,
    Abortion,
}

/// Diagnostic record in the treatments collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Treatment {
    pub id: TreatmentId,
    pub kind: TreatmentKind,
    pub tag_no: String,
    pub date: NaiveDate,
    /// Set for P.D. checks.
    pub result: Option<PdResult>,
    pub breeding_id: Option<BreedingId>,
    #[serde(default)]
    pub notes: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl Treatment {
    pub fn pd(
        tag_no: &str,
        date: NaiveDate,
        result: PdResult,
        breeding_id: Option<BreedingId>,
        user_id: UserId,
    ) -> Self {
        Self {
            id: TreatmentId::generate(),
            kind: TreatmentKind::Pd,
            tag_no: tag_no.to_string(),
            date,
            result: Some(result),
            breeding_id,
            notes: String::new(),
            user_id,
            created_at: Utc::now(),
        }
    }

    pub fn abortion(
        tag_no: &str,
        date: NaiveDate,
        breeding_id: Option<BreedingId>,
        user_id: UserId,
    ) -> Self {
        Self {
            id: TreatmentId::generate(),
            kind: TreatmentKind::Abortion,
            tag_no: tag_no.to_string(),
            date,
            result: None,
            breeding_id,
            notes: "Recorded via pregnancy unlock".to_string(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

impl Document for Treatment {
    type Id = TreatmentId;
    const COLLECTION: &'static str = "treatments";

    fn id(&self) -> TreatmentId {
        self.id
    }
}

/// Append-only birth record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CalvingEvent {
    pub id: CalvingId,
    pub breeding_id: BreedingId,
    pub tag_no: String,
    pub owner_name: String,
    pub village: String,
    pub mobile_number: String,
    pub calving_date: NaiveDate,
    pub gender: String,
    pub mother_jati: Jati,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl CalvingEvent {
    pub fn for_record(record: &BreedingRecord, gender: &str, date: NaiveDate) -> Self {
        Self {
            id: CalvingId::generate(),
            breeding_id: record.id,
            tag_no: record.tag_no.clone(),
            owner_name: record.owner_name.clone(),
            village: record.village.clone(),
            mobile_number: record.mobile_number.clone(),
            calving_date: date,
            gender: gender.to_string(),
            mother_jati: record.jati,
            user_id: record.user_id.clone(),
            created_at: Utc::now(),
        }
    }
}

impl Document for CalvingEvent {
    type Id = CalvingId;
    const COLLECTION: &'static str = "calving";

    fn id(&self) -> CalvingId {
        self.id
    }
}
