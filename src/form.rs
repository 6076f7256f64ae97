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

//! The A.I. entry form and its field validation.

use crate::base::{BullId, Jati, SemenType};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tag used for an untagged animal without a name.
pub const UNTAGGED: &str = "Untagged";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ReceiptMode {
    /// Take the active book's next number.
    #[default]
    Auto,
    /// Number typed by the operator, e.g. to fill a gap.
    Manual(u32),
}

/// Raw form input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntryForm {
    pub date: NaiveDate,
    pub tag_no: String,
    pub untagged: bool,
    pub animal_name: Option<String>,
    pub bull_id: Option<BullId>,
    pub semen_type: Option<SemenType>,
    pub receipt: ReceiptMode,
    pub owner_name: String,
    pub mobile_number: String,
    pub village: String,
    pub category: String,
    pub jati: Jati,
    pub breed: String,
    /// Defaults to the configured service fee.
    pub cost: Option<Decimal>,
    pub notes: String,
    /// Operator confirmed saving a second entry for the tag on the same day.
    pub confirm_duplicate: bool,
}

impl EntryForm {
    /// A form with only the required fields set.
    pub fn new(
        date: NaiveDate,
        tag_no: impl Into<String>,
        bull_id: BullId,
        semen_type: SemenType,
        jati: Jati,
        breed: impl Into<String>,
        village: impl Into<String>,
    ) -> Self {
        Self {
            date,
            tag_no: tag_no.into(),
            untagged: false,
            animal_name: None,
            bull_id: Some(bull_id),
            semen_type: Some(semen_type),
            receipt: ReceiptMode::Auto,
            owner_name: String::new(),
            mobile_number: String::new(),
            village: village.into(),
            category: String::new(),
            jati,
            breed: breed.into(),
            cost: None,
            notes: String::new(),
            confirm_duplicate: false,
        }
    }

    pub fn untagged(mut self, animal_name: Option<&str>) -> Self {
        self.untagged = true;
        self.animal_name = animal_name.map(str::to_string);
        self
    }

    pub fn manual_receipt(mut self, number: u32) -> Self {
        self.receipt = ReceiptMode::Manual(number);
        self
    }

    pub fn owner(mut self, name: impl Into<String>, mobile: impl Into<String>) -> Self {
        self.owner_name = name.into();
        self.mobile_number = mobile.into();
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirm_duplicate = true;
        self
    }

    /// Tag that will be stored: the ear tag, or a name-based id for
    /// untagged animals.
    pub fn effective_tag(&self) -> String {
        if !self.untagged {
            return self.tag_no.trim().to_string();
        }
        match self.animal_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => UNTAGGED.to_string(),
        }
    }

    /// Checks fields in form order and resolves the receipt number.
    ///
    /// `next_number` is the active book's next number for the chosen type;
    /// `receipt_taken` reports whether a manual number is already used in
    /// that series.
    pub fn validate(
        &self,
        config: &LedgerConfig,
        next_number: Option<u32>,
        receipt_taken: impl FnOnce(u32, SemenType) -> bool,
    ) -> Result<ValidatedEntry, LedgerError> {
        let receipt_no = match self.receipt {
            ReceiptMode::Manual(0) => return Err(LedgerError::MissingReceipt),
            ReceiptMode::Manual(number) => Some(number),
            ReceiptMode::Auto if self.semen_type.is_some() => {
                Some(next_number.ok_or(LedgerError::MissingReceipt)?)
            }
            ReceiptMode::Auto => None,
        };

        let manual = matches!(self.receipt, ReceiptMode::Manual(_));
        if let (true, Some(number), Some(semen_type)) = (manual, receipt_no, self.semen_type)
            && receipt_taken(number, semen_type)
        {
            return Err(LedgerError::DuplicateReceipt { number, semen_type });
        }

        let bull_id = self.bull_id.ok_or(LedgerError::MissingBull)?;

        let tag_no = self.effective_tag();
        if !self.untagged {
            let len = tag_no.chars().count();
            if len < config.tag_min_len || len > config.tag_max_len {
                return Err(LedgerError::InvalidTagLength {
                    len,
                    min: config.tag_min_len,
                    max: config.tag_max_len,
                });
            }
            if !tag_no.chars().all(|c| c.is_ascii_digit()) {
                return Err(LedgerError::InvalidTag(tag_no));
            }
        }

        let semen_type = self.semen_type.ok_or(LedgerError::MissingSemenType)?;
        if self.village.trim().is_empty() {
            return Err(LedgerError::MissingVillage);
        }
        if self.breed.trim().is_empty() {
            return Err(LedgerError::MissingBreed);
        }

        Ok(ValidatedEntry {
            date: self.date,
            tag_no,
            untagged: self.untagged,
            bull_id,
            semen_type,
            receipt_no: receipt_no.ok_or(LedgerError::MissingReceipt)?,
            manual_receipt: manual,
            owner_name: self.owner_name.trim().to_string(),
            mobile_number: self.mobile_number.trim().to_string(),
            village: self.village.trim().to_string(),
            category: self.category.clone(),
            jati: self.jati,
            breed: self.breed.trim().to_string(),
            cost: self.cost.unwrap_or(config.service_fee),
            notes: self.notes.clone(),
            confirm_duplicate: self.confirm_duplicate,
        })
    }
}

/// A form that passed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEntry {
    pub date: NaiveDate,
    pub tag_no: String,
    pub untagged: bool,
    pub bull_id: BullId,
    pub semen_type: SemenType,
    pub receipt_no: u32,
    pub manual_receipt: bool,
    pub owner_name: String,
    pub mobile_number: String,
    pub village: String,
    pub category: String,
    pub jati: Jati,
    pub breed: String,
    pub cost: Decimal,
    pub notes: String,
    pub confirm_duplicate: bool,
}
