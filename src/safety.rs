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

//! Pre-entry safety checks.
//!
//! Run in order before a new insemination of a tag is saved:
//!
//! 1. Latest P.D. treatment for the tag is positive and no abortion or
//!    calving has been recorded since: blocked (`PD_List_Positive`).
//! 2. Latest breeding record for the tag is still pregnant and dated on a
//!    different day: blocked (`Legacy_Pregnant`).
//! 3. A breeding record exists for the tag on the same day: warning
//!    (`Duplicate`), unless the operator already confirmed it.
//!
//! Tags are matched across every tenant; an animal is the same animal
//! whichever center inseminates it.

use crate::base::{BreedingId, TreatmentId};
use crate::breeding::{BreedingRecord, PdResult, Treatment, TreatmentKind};
use crate::store::{LedgerStore, Query};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockReason {
    PdListPositive,
    LegacyPregnant,
    Duplicate,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PdListPositive => "PD_List_Positive",
            Self::LegacyPregnant => "Legacy_Pregnant",
            Self::Duplicate => "Duplicate",
        }
    }
}

/// Why an entry was refused, with the record the unlock workflow acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PregnancyBlock {
    pub reason: BlockReason,
    pub tag_no: String,
    /// Positive P.D. treatment, for `PD_List_Positive`.
    pub treatment: Option<TreatmentId>,
    /// Pregnant breeding record, for `Legacy_Pregnant`.
    pub breeding: Option<BreedingId>,
    /// Date of the diagnosis or insemination that established pregnancy.
    pub since: NaiveDate,
}

impl PregnancyBlock {
    pub fn is_legacy(&self) -> bool {
        self.reason == BlockReason::LegacyPregnant
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SafetyVerdict {
    Clear,
    Blocked(PregnancyBlock),
    /// Same tag already inseminated on the same day.
    DuplicateWarning(BreedingId),
}

impl SafetyVerdict {
    pub fn reason(&self) -> Option<BlockReason> {
        match self {
            Self::Clear => None,
            Self::Blocked(block) => Some(block.reason),
            Self::DuplicateWarning(_) => Some(BlockReason::Duplicate),
        }
    }
}

/// How the operator resolved a pregnancy block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnlockOutcome {
    /// The pregnancy ended; an abortion is recorded.
    Abortion,
    /// The positive diagnosis was wrong.
    FalsePositive,
}

impl std::str::FromStr for UnlockOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-', '_'], "").as_str() {
            "abortion" => Ok(Self::Abortion),
            "falsepositive" => Ok(Self::FalsePositive),
            other => Err(format!("unknown unlock outcome '{other}'")),
        }
    }
}

/// Runs the three checks for a new entry of `tag_no` on `date`.
pub fn check_animal(
    store: &LedgerStore,
    tag_no: &str,
    date: NaiveDate,
    confirm_duplicate: bool,
) -> SafetyVerdict {
    if let Some(block) = positive_pd(store, tag_no) {
        debug!(tag_no, reason = block.reason.as_str(), "entry blocked");
        return SafetyVerdict::Blocked(block);
    }

    if let Some(latest) = latest_record(store, tag_no)
        && latest.is_pregnant()
        && latest.date != date
    {
        debug!(tag_no, record = %latest.id, "entry blocked by pregnant breeding record");
        return SafetyVerdict::Blocked(PregnancyBlock {
            reason: BlockReason::LegacyPregnant,
            tag_no: tag_no.to_string(),
            treatment: None,
            breeding: Some(latest.id),
            since: latest.pd_date.unwrap_or(latest.date),
        });
    }

    if !confirm_duplicate {
        let same_day =
            Query::new().filter(|r: &BreedingRecord| r.tag_no == tag_no && r.date == date);
        if let Some(existing) = store.breeding().first(same_day) {
            return SafetyVerdict::DuplicateWarning(existing.id);
        }
    }

    SafetyVerdict::Clear
}

/// Most recent breeding record of a tag, by date then creation time.
pub fn latest_record(store: &LedgerStore, tag_no: &str) -> Option<BreedingRecord> {
    let query = Query::new()
        .filter(|r: &BreedingRecord| r.tag_no == tag_no)
        .order_by_desc(|r: &BreedingRecord| (r.date, r.created_at));
    store.breeding().first(query)
}

/// Most recent P.D. treatment of a tag.
pub fn latest_pd(store: &LedgerStore, tag_no: &str) -> Option<Treatment> {
    let query = Query::new()
        .filter(|t: &Treatment| t.kind == TreatmentKind::Pd && t.tag_no == tag_no)
        .order_by_desc(|t: &Treatment| (t.date, t.created_at));
    store.treatments().first(query)
}

fn positive_pd(store: &LedgerStore, tag_no: &str) -> Option<PregnancyBlock> {
    let pd = latest_pd(store, tag_no)?;
    if pd.result != Some(PdResult::Positive) {
        return None;
    }

    // An abortion or birth on or after the diagnosis ends that pregnancy
    let aborted = store
        .treatments()
        .first(Query::new().filter(|t: &Treatment| {
            t.kind == TreatmentKind::Abortion && t.tag_no == tag_no && t.date >= pd.date
        }))
        .is_some();
    let calved = store
        .calvings()
        .all()
        .iter()
        .any(|c| c.tag_no == tag_no && c.calving_date >= pd.date);
    if aborted || calved {
        return None;
    }

    Some(PregnancyBlock {
        reason: BlockReason::PdListPositive,
        tag_no: tag_no.to_string(),
        treatment: Some(pd.id),
        breeding: pd.breeding_id,
        since: pd.date,
    })
}
