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

//! Semen stock register.
//!
//! A [`BullBatch`] is one received lot of straws with its live dose count.
//! Discards are kept as separate [`StockDebit`] records so the month ledger
//! can replay them (see [`crate::ledger`]).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use breeding_ledger_rs::{Jati, LedgerStore, NewBatch, SemenStock, SemenType, UserId};
//! use chrono::NaiveDate;
//!
//! let stock = SemenStock::new(Arc::new(LedgerStore::new()));
//! let vet = UserId::new("vet-1");
//! let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
//!
//! let gir = NewBatch::new("GIR-7", Jati::Cow, "GIR", SemenType::Conventional, 50).on(date);
//! let batch = stock.receive(&vet, gir).unwrap();
//! stock.discard(batch.id, 5, "broken straws", date).unwrap();
//! assert_eq!(stock.batch(batch.id).unwrap().doses, 45);
//! ```

use crate::base::{BullId, DebitId, Jati, SemenType, UserId};
use crate::error::LedgerError;
use crate::store::{Document, LedgerStore, Query};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A received semen lot (CREDIT).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BullBatch {
    pub id: BullId,
    pub owner: UserId,
    pub name: String,
    /// Bull number printed on the straw.
    #[serde(default)]
    pub number: String,
    pub jati: Jati,
    pub breed: String,
    pub semen_type: SemenType,
    /// Date received.
    pub date: NaiveDate,
    /// Current balance.
    pub doses: u32,
    pub created_at: DateTime<Utc>,
}

impl Document for BullBatch {
    type Id = BullId;
    const COLLECTION: &'static str = "bulls";

    fn id(&self) -> BullId {
        self.id
    }
}

/// A discard (DEBIT) against a batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StockDebit {
    pub id: DebitId,
    pub owner: UserId,
    pub bull_id: BullId,
    pub date: NaiveDate,
    pub quantity: u32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Document for StockDebit {
    type Id = DebitId;
    const COLLECTION: &'static str = "stock_debits";

    fn id(&self) -> DebitId {
        self.id
    }
}

/// Fields of a batch being received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub name: String,
    pub number: String,
    pub jati: Jati,
    pub breed: String,
    pub semen_type: SemenType,
    pub doses: u32,
    /// Defaults to today.
    pub date: Option<NaiveDate>,
}

impl NewBatch {
    pub fn new(
        name: impl Into<String>,
        jati: Jati,
        breed: impl Into<String>,
        semen_type: SemenType,
        doses: u32,
    ) -> Self {
        Self {
            name: name.into(),
            number: String::new(),
            jati,
            breed: breed.into(),
            semen_type,
            doses,
            date: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }
}

/// Editable fields of an existing batch. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchUpdate {
    pub name: Option<String>,
    pub number: Option<String>,
    pub breed: Option<String>,
    pub date: Option<NaiveDate>,
    pub doses: Option<u32>,
}

/// Whether a bull of `bull_breed` may serve an animal of `breed`.
///
/// `"HF CROSS"` serves `"HF"`; the non-descript breed of a species takes
/// any bull of that species.
pub fn breed_matches(bull_breed: &str, jati: Jati, breed: &str) -> bool {
    breed == jati.non_descript_breed()
        || bull_breed == breed
        || bull_breed
            .strip_prefix(breed)
            .is_some_and(|rest| rest.starts_with(' '))
}

/// Write side of the stock register.
pub struct SemenStock {
    store: Arc<LedgerStore>,
}

impl SemenStock {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Records a received batch with `doses` as its opening balance.
    pub fn receive(&self, owner: &UserId, batch: NewBatch) -> Result<BullBatch, LedgerError> {
        if batch.doses == 0 {
            return Err(LedgerError::ZeroQuantity);
        }
        let record = BullBatch {
            id: BullId::generate(),
            owner: owner.clone(),
            name: batch.name,
            number: batch.number,
            jati: batch.jati,
            breed: batch.breed,
            semen_type: batch.semen_type,
            date: batch.date.unwrap_or_else(|| Utc::now().date_naive()),
            doses: batch.doses,
            created_at: Utc::now(),
        };
        self.store.bulls().insert(record.clone())?;

        info!(bull = %record.id, name = %record.name, doses = record.doses, "batch received");
        Ok(record)
    }

    /// Writes off `quantity` doses.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroQuantity`] for a zero quantity.
    /// - [`LedgerError::DiscardExceedsStock`] when `quantity` exceeds the balance.
    pub fn discard(
        &self,
        bull_id: BullId,
        quantity: u32,
        reason: &str,
        date: NaiveDate,
    ) -> Result<StockDebit, LedgerError> {
        if quantity == 0 {
            return Err(LedgerError::ZeroQuantity);
        }

        let owner = self.bulls_update(bull_id, |batch| {
            if quantity > batch.doses {
                return Err(LedgerError::DiscardExceedsStock {
                    requested: quantity,
                    available: batch.doses,
                });
            }
            batch.doses -= quantity;
            Ok(batch.owner.clone())
        })?;

        let debit = StockDebit {
            id: DebitId::generate(),
            owner,
            bull_id,
            date,
            quantity,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        if let Err(error) = self.store.stock_debits().insert(debit.clone()) {
            warn!(bull = %bull_id, %error, "discard not recorded, restoring doses");
            self.bulls_update(bull_id, |batch| {
                batch.doses += quantity;
                Ok(())
            })?;
            return Err(error);
        }

        info!(bull = %bull_id, quantity, reason, "doses discarded");
        Ok(debit)
    }

    /// Takes one dose for an insemination.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientStock`] when the batch is empty.
    pub fn decrement_for_use(&self, bull_id: BullId) -> Result<u32, LedgerError> {
        self.bulls_update(bull_id, |batch| {
            if batch.doses == 0 {
                return Err(LedgerError::InsufficientStock(bull_id));
            }
            batch.doses -= 1;
            Ok(batch.doses)
        })
    }

    /// Returns one dose from a cancelled or edited insemination.
    pub fn increment_for_use(&self, bull_id: BullId) -> Result<u32, LedgerError> {
        self.bulls_update(bull_id, |batch| {
            batch.doses += 1;
            Ok(batch.doses)
        })
    }

    pub fn update(&self, bull_id: BullId, changes: BatchUpdate) -> Result<BullBatch, LedgerError> {
        let updated = self.bulls_update(bull_id, |batch| {
            if let Some(name) = changes.name {
                batch.name = name;
            }
            if let Some(number) = changes.number {
                batch.number = number;
            }
            if let Some(breed) = changes.breed {
                batch.breed = breed;
            }
            if let Some(date) = changes.date {
                batch.date = date;
            }
            if let Some(doses) = changes.doses {
                batch.doses = doses;
            }
            Ok(batch.clone())
        })?;
        info!(bull = %bull_id, doses = updated.doses, "batch updated");
        Ok(updated)
    }

    /// Deletes a batch and its discard history.
    pub fn delete(&self, bull_id: BullId) -> Result<BullBatch, LedgerError> {
        let batch = self.store.bulls().remove(&bull_id).map_err(|e| match e {
            LedgerError::DocumentNotFound { .. } => LedgerError::BullNotFound(bull_id),
            other => other,
        })?;
        for debit in self.debits_for(bull_id) {
            self.store.stock_debits().remove(&debit.id)?;
        }
        info!(bull = %bull_id, "batch deleted");
        Ok(batch)
    }

    pub fn batch(&self, bull_id: BullId) -> Result<BullBatch, LedgerError> {
        self.store.bulls().get(&bull_id).ok_or(LedgerError::BullNotFound(bull_id))
    }

    pub fn batches(&self, owner: &UserId) -> Vec<BullBatch> {
        let query = Query::new()
            .filter(|b: &BullBatch| &b.owner == owner)
            .order_by(|a: &BullBatch, b: &BullBatch| (a.date, &a.name).cmp(&(b.date, &b.name)));
        self.store.bulls().query(&query)
    }

    pub fn debits_for(&self, bull_id: BullId) -> Vec<StockDebit> {
        self.store
            .stock_debits()
            .query(&Query::new().filter(|d: &StockDebit| d.bull_id == bull_id))
    }

    /// Batches offered on the entry form for an animal.
    pub fn selectable_bulls(
        &self,
        owner: &UserId,
        jati: Jati,
        breed: &str,
        semen_type: SemenType,
    ) -> Vec<BullBatch> {
        let query = Query::new()
            .filter(|b: &BullBatch| {
                &b.owner == owner
                    && b.jati == jati
                    && b.semen_type == semen_type
                    && b.doses > 0
                    && breed_matches(&b.breed, jati, breed)
            })
            .order_by(|a: &BullBatch, b: &BullBatch| a.name.cmp(&b.name));
        self.store.bulls().query(&query)
    }

    fn bulls_update<R>(
        &self,
        bull_id: BullId,
        mutate: impl FnOnce(&mut BullBatch) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        self.store.bulls().update(&bull_id, mutate).map_err(|e| match e {
            LedgerError::DocumentNotFound { .. } => LedgerError::BullNotFound(bull_id),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SemenStock, UserId) {
        (SemenStock::new(Arc::new(LedgerStore::new())), UserId::new("vet-1"))
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn breed_prefix_matching() {
        assert!(breed_matches("GIR", Jati::Cow, "GIR"));
        assert!(breed_matches("H.F CROSS", Jati::Cow, "H.F"));
        assert!(!breed_matches("H.FX", Jati::Cow, "H.F"));
        assert!(breed_matches("MURRAH", Jati::Buffalo, "N.D. BUFFALO"));
        assert!(!breed_matches("MURRAH", Jati::Buffalo, "N.D."));
    }

    #[test]
    fn zero_dose_batch_rejected() {
        let (stock, vet) = setup();
        let empty = NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Sexed, 0);
        let result = stock.receive(&vet, empty);
        assert_eq!(result, Err(LedgerError::ZeroQuantity));
    }

    #[test]
    fn receive_defaults_to_today() {
        let (stock, vet) = setup();
        let batch = stock
            .receive(&vet, NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Sexed, 3))
            .unwrap();
        assert_eq!(batch.date, Utc::now().date_naive());
    }

    #[test]
    fn discard_over_balance_leaves_stock_untouched() {
        let (stock, vet) = setup();
        let gir = NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Sexed, 3).on(day(2024, 1, 1));
        let batch = stock.receive(&vet, gir).unwrap();

        let result = stock.discard(batch.id, 4, "expired", day(2024, 1, 2));
        assert_eq!(
            result,
            Err(LedgerError::DiscardExceedsStock {
                requested: 4,
                available: 3
            })
        );
        assert_eq!(stock.batch(batch.id).unwrap().doses, 3);
        assert!(stock.debits_for(batch.id).is_empty());
    }

    #[test]
    fn empty_batch_cannot_be_used() {
        let (stock, vet) = setup();
        let batch = stock
            .receive(&vet, NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Sexed, 1))
            .unwrap();
        assert_eq!(stock.decrement_for_use(batch.id), Ok(0));
        assert_eq!(
            stock.decrement_for_use(batch.id),
            Err(LedgerError::InsufficientStock(batch.id))
        );
        assert_eq!(stock.increment_for_use(batch.id), Ok(1));
    }

    #[test]
    fn selectable_bulls_filter() {
        let (stock, vet) = setup();
        let gir = stock
            .receive(&vet, NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Conventional, 5))
            .unwrap();
        stock
            .receive(&vet, NewBatch::new("HF-1", Jati::Cow, "H.F", SemenType::Conventional, 5))
            .unwrap();
        stock
            .receive(&vet, NewBatch::new("GIR-S", Jati::Cow, "GIR", SemenType::Sexed, 5))
            .unwrap();
        let empty = stock
            .receive(&vet, NewBatch::new("GIR-2", Jati::Cow, "GIR", SemenType::Conventional, 1))
            .unwrap();
        stock.decrement_for_use(empty.id).unwrap();
        let theirs = NewBatch::new("GIR-X", Jati::Cow, "GIR", SemenType::Conventional, 5);
        stock.receive(&UserId::new("vet-2"), theirs).unwrap();

        let offered = stock.selectable_bulls(&vet, Jati::Cow, "GIR", SemenType::Conventional);
        assert_eq!(offered.iter().map(|b| b.id).collect::<Vec<_>>(), vec![gir.id]);

        let any_cow = stock.selectable_bulls(&vet, Jati::Cow, "N.D.", SemenType::Conventional);
        assert_eq!(any_cow.len(), 2);
    }

    #[test]
    fn delete_removes_debits() {
        let (stock, vet) = setup();
        let batch = stock
            .receive(&vet, NewBatch::new("GIR-1", Jati::Cow, "GIR", SemenType::Sexed, 10))
            .unwrap();
        stock.discard(batch.id, 2, "damaged", day(2024, 1, 2)).unwrap();

        stock.delete(batch.id).unwrap();
        assert!(stock.debits_for(batch.id).is_empty());
        assert_eq!(stock.batch(batch.id), Err(LedgerError::BullNotFound(batch.id)));
    }
}
