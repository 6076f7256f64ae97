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

//! Breeding entry orchestration.
//!
//! The [`Engine`] owns the store and coordinates the receipt allocator, the
//! stock register and the breeding records for every write that touches
//! more than one of them.
//!
//! # Operations
//!
//! | Operation | Writes, in order |
//! |-----------|------------------|
//! | `create_entry` | auto-negative prior, persist record, take dose, advance receipt |
//! | `edit_entry` | restore old receipt, advance new one, refund old bull, take dose, update |
//! | `delete_entry` | restore receipt, refund bull, delete record |
//! | `record_pd` | update record, append P.D. treatment |
//! | `record_calving` | update every record of the tag, append calving event |
//! | `unlock` | abortion treatment or P.D. correction, update record |
//!
//! Each operation runs as a [`Saga`]; the log of the latest one is kept in
//! [`Engine::last_saga`].
//!
//! # Thread Safety
//!
//! Multi-step operations are serialised by one engine-wide lock, so the
//! "next number" and "doses left" reads cannot go stale before the writes
//! that depend on them. Reads and reports do not take the lock.

use crate::base::{BookId, BreedingId, BullId, Jati, SemenType, UserId};
use crate::breeding::{
    AuditAction, AuditEntry, BreedingRecord, BreedingStatus, CalvingEvent, PdResult, Transition,
    Treatment,
};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::form::{EntryForm, ReceiptMode, ValidatedEntry};
use crate::identity::Identity;
use crate::ledger::{
    self, BookBalance, DiscardEvent, MonthWindow, ReceiptUsage, StockBalance, UsageEvent,
};
use crate::receipt::{Issued, ReceiptAllocator};
use crate::safety::{self, PregnancyBlock, SafetyVerdict, UnlockOutcome};
use crate::saga::{Saga, SagaLog, SagaStep};
use crate::schedule::{self, CalvingDue, CalvingFilter, PdDue, PdFilter};
use crate::stock::{BullBatch, SemenStock};
use crate::store::{LedgerStore, Query, StoreSnapshot};
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owner details of a tag's latest record, used to prefill the entry form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryFill {
    pub owner_name: String,
    pub mobile_number: String,
    pub category: String,
    pub village: String,
    pub jati: Jati,
    pub breed: String,
    pub last_date: NaiveDate,
    pub last_status: BreedingStatus,
}

/// Breeding ledger facade.
///
/// # Invariants
///
/// - A batch's `doses` never drops below zero.
/// - At most one receipt book per (owner, semen type) is active.
/// - An entry is only saved once every safety check passed or was
///   explicitly confirmed.
pub struct Engine {
    store: Arc<LedgerStore>,
    receipts: ReceiptAllocator,
    stock: SemenStock,
    config: LedgerConfig,
    write_lock: Mutex<()>,
    last_saga: Mutex<Option<SagaLog>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self::with_store(Arc::new(LedgerStore::new()), config)
    }

    pub fn with_store(store: Arc<LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            receipts: ReceiptAllocator::new(Arc::clone(&store)),
            stock: SemenStock::new(Arc::clone(&store)),
            store,
            config,
            write_lock: Mutex::new(()),
            last_saga: Mutex::new(None),
        }
    }

    /// Rebuilds an engine from saved state.
    pub fn from_snapshot(
        snapshot: StoreSnapshot,
        config: LedgerConfig,
    ) -> Result<Self, LedgerError> {
        Ok(Self::with_store(Arc::new(LedgerStore::from_snapshot(snapshot)?), config))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    pub fn receipts(&self) -> &ReceiptAllocator {
        &self.receipts
    }

    pub fn stock(&self) -> &SemenStock {
        &self.stock
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Step log of the most recent multi-write operation.
    pub fn last_saga(&self) -> Option<SagaLog> {
        self.last_saga.lock().clone()
    }

    /// Next automatic receipt number for the operator.
    pub fn next_number(&self, identity: &Identity, semen_type: SemenType) -> Option<u32> {
        self.receipts.next_number(identity.scope(), semen_type)
    }

    // ------------------------------------------------------------------
    // Entry write path
    // ------------------------------------------------------------------

    /// Validates and saves a new insemination.
    ///
    /// # Errors
    ///
    /// - Field validation errors from [`EntryForm::validate`].
    /// - [`LedgerError::BullNotFound`], [`LedgerError::InsufficientStock`],
    ///   [`LedgerError::BullSemenMismatch`] for the selected bull.
    /// - [`LedgerError::BlockedPregnant`] or [`LedgerError::DuplicateEntry`]
    ///   from the safety checks.
    /// - [`LedgerError::PartialFailure`] if a write failed; earlier writes
    ///   are undone.
    pub fn create_entry(
        &self,
        identity: &Identity,
        form: &EntryForm,
    ) -> Result<BreedingRecord, LedgerError> {
        let _guard = self.write_lock.lock();
        let owner = identity.scope();

        let slot = form.semen_type.and_then(|t| self.receipts.next_slot(owner, t));
        let next = slot.map(|(_, number)| number);
        let entry = form.validate(&self.config, next, |n, t| {
            self.receipt_taken(owner, n, t, None)
        })?;
        let bull = self.usable_bull(entry.bull_id, entry.semen_type)?;

        if !entry.untagged {
            let verdict = safety::check_animal(
                &self.store,
                &entry.tag_no,
                entry.date,
                entry.confirm_duplicate,
            );
            match verdict {
                SafetyVerdict::Clear => {}
                SafetyVerdict::Blocked(block) => return Err(LedgerError::BlockedPregnant(block)),
                SafetyVerdict::DuplicateWarning(existing) => {
                    return Err(LedgerError::DuplicateEntry { existing });
                }
            }
        }

        let record = new_record(&entry, &bull, owner);
        let mut saga = Saga::new("create_entry");
        let result = self.create_steps(&mut saga, &entry, record, slot);
        self.keep_log(saga);

        if let Ok(record) = &result {
            info!(
                record = %record.id,
                tag = %record.tag_no,
                receipt = record.receipt_no,
                "entry saved"
            );
        }
        result
    }

    fn create_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        entry: &ValidatedEntry,
        record: BreedingRecord,
        slot: Option<(BookId, u32)>,
    ) -> Result<BreedingRecord, LedgerError> {
        match self.repeat_breeding_candidate(entry) {
            Some(prior) => {
                let prior_id = prior.id;
                saga.run(
                    SagaStep::AutoNegative,
                    || {
                        self.store.breeding().update(&prior_id, |r| {
                            r.apply(Transition::RepeatBreeding { on: entry.date })
                        })
                    },
                    move |()| self.put_back(prior),
                )?;
            }
            None => saga.skip(SagaStep::AutoNegative),
        }

        let id = record.id;
        saga.run(
            SagaStep::PersistRecord,
            || self.store.breeding().insert(record.clone()),
            move |()| self.store.breeding().remove(&id).map(drop),
        )?;

        let bull_id = entry.bull_id;
        saga.run(
            SagaStep::DecrementStock,
            || self.stock.decrement_for_use(bull_id),
            move |_| self.stock.increment_for_use(bull_id).map(drop),
        )?;

        self.advance_receipt(saga, entry, slot)?;
        Ok(record)
    }

    /// Latest earlier record of the tag, if the new entry is far enough
    /// after it to mean that cycle failed.
    fn repeat_breeding_candidate(&self, entry: &ValidatedEntry) -> Option<BreedingRecord> {
        if entry.untagged {
            return None;
        }
        let prior = self.store.breeding().first(
            Query::new()
                .filter(|r: &BreedingRecord| r.tag_no == entry.tag_no && r.date < entry.date)
                .order_by_desc(|r: &BreedingRecord| (r.date, r.created_at)),
        )?;

        let gap = (entry.date - prior.date).num_days();
        if gap <= self.config.repeat_breeding_gap_days {
            debug!(tag = %entry.tag_no, gap, "repeat within window, treated as same cycle");
            return None;
        }
        if !matches!(prior.status, BreedingStatus::AiDone | BreedingStatus::Pregnant) {
            debug!(tag = %entry.tag_no, status = %prior.status, "prior cycle already closed");
            return None;
        }
        Some(prior)
    }

    /// Applies a form to an existing record, compensating receipt and stock
    /// for a changed semen type or bull.
    ///
    /// With [`ReceiptMode::Auto`] and an unchanged semen type the record
    /// keeps its receipt number. Safety checks do not run on edits.
    pub fn edit_entry(
        &self,
        identity: &Identity,
        id: BreedingId,
        form: &EntryForm,
    ) -> Result<BreedingRecord, LedgerError> {
        let _guard = self.write_lock.lock();
        let original = self.record(id)?;
        let owner = original.user_id.clone();

        let mut form = form.clone();
        if form.receipt == ReceiptMode::Auto && form.semen_type == Some(original.semen_type) {
            form.receipt = ReceiptMode::Manual(original.receipt_no);
        }
        let slot = form.semen_type.and_then(|t| self.receipts.next_slot(&owner, t));
        let next = slot.map(|(_, number)| number);
        let entry = form.validate(&self.config, next, |n, t| {
            self.receipt_taken(&owner, n, t, Some(id))
        })?;

        let type_changed = original.semen_type != entry.semen_type;
        let bull_changed = original.bull_id != entry.bull_id;
        let bull = if bull_changed {
            self.usable_bull(entry.bull_id, entry.semen_type)?
        } else {
            let bull = self.stock.batch(entry.bull_id)?;
            if bull.semen_type != entry.semen_type {
                return Err(LedgerError::BullSemenMismatch {
                    bull: bull.semen_type,
                    entry: entry.semen_type,
                });
            }
            bull
        };

        let audit = (type_changed || bull_changed).then(|| AuditEntry {
            at: Utc::now(),
            action: if type_changed {
                AuditAction::SemenTypeChanged
            } else {
                AuditAction::BullChanged
            },
            old_receipt: original.receipt_no,
            old_type: original.semen_type,
            new_receipt: entry.receipt_no,
            new_type: entry.semen_type,
            old_bull: original.bull_id,
            new_bull: entry.bull_id,
            user: identity.user_id.clone(),
        });

        let mut saga = Saga::new("edit_entry");
        let result = self.edit_steps(&mut saga, &original, &entry, &bull, slot, audit);
        self.keep_log(saga);

        if let Ok(record) = &result {
            info!(record = %record.id, type_changed, bull_changed, "entry edited");
        }
        result
    }

    fn edit_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        original: &BreedingRecord,
        entry: &ValidatedEntry,
        bull: &BullBatch,
        slot: Option<(BookId, u32)>,
        audit: Option<AuditEntry>,
    ) -> Result<BreedingRecord, LedgerError> {
        let owner = original.user_id.clone();

        if original.semen_type != entry.semen_type {
            let (old_type, old_receipt) = (original.semen_type, original.receipt_no);
            saga.run(
                SagaStep::RestoreReceipt,
                || self.receipts.restore(&owner, old_type, old_receipt),
                move |outcome| self.receipts.undo_restore(outcome),
            )?;

            self.advance_receipt(saga, entry, slot)?;
        }

        if original.bull_id != entry.bull_id {
            self.refund_dose(saga, original.bull_id)?;
            let new_bull = entry.bull_id;
            saga.run(
                SagaStep::DecrementStock,
                || self.stock.decrement_for_use(new_bull),
                move |_| self.stock.increment_for_use(new_bull).map(drop),
            )?;
        }

        saga.run_final(SagaStep::UpdateRecord, || {
            self.store.breeding().update(&original.id, |r| {
                r.date = entry.date;
                r.tag_no = entry.tag_no.clone();
                r.untagged = entry.untagged;
                r.owner_name = entry.owner_name.clone();
                r.mobile_number = entry.mobile_number.clone();
                r.village = entry.village.clone();
                r.category = entry.category.clone();
                r.jati = entry.jati;
                r.breed = entry.breed.clone();
                r.semen_type = entry.semen_type;
                r.bull_id = bull.id;
                r.bull_name = bull.name.clone();
                r.receipt_no = entry.receipt_no;
                r.cost = entry.cost;
                r.notes = entry.notes.clone();
                r.audit_history.extend(audit);
                Ok(r.clone())
            })
        })
    }

    /// Deletes a record and returns its receipt number and dose.
    pub fn delete_entry(
        &self,
        identity: &Identity,
        id: BreedingId,
    ) -> Result<BreedingRecord, LedgerError> {
        let _guard = self.write_lock.lock();
        let record = self.record(id)?;

        let mut saga = Saga::new("delete_entry");
        let result = self.delete_steps(&mut saga, &record);
        self.keep_log(saga);

        if result.is_ok() {
            info!(
                record = %id,
                receipt = record.receipt_no,
                by = %identity.user_id,
                "entry deleted"
            );
        }
        result.map(|()| record)
    }

    fn delete_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        record: &BreedingRecord,
    ) -> Result<(), LedgerError> {
        let owner = record.user_id.clone();
        let (semen_type, receipt_no) = (record.semen_type, record.receipt_no);
        saga.run(
            SagaStep::RestoreReceipt,
            || self.receipts.restore(&owner, semen_type, receipt_no),
            move |outcome| self.receipts.undo_restore(outcome),
        )?;

        self.refund_dose(saga, record.bull_id)?;

        saga.run_final(SagaStep::DeleteRecord, || {
            self.store.breeding().remove(&record.id).map(drop)
        })
    }

    /// Consumes the receipt number read during validation from the book it
    /// was read from. Backfilling a gap below the pointer must not move it.
    fn advance_receipt<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        entry: &ValidatedEntry,
        slot: Option<(BookId, u32)>,
    ) -> Result<(), LedgerError> {
        match slot {
            Some((book_id, next)) if entry.receipt_no >= next => {
                saga.run(
                    SagaStep::AdvanceReceipt,
                    || self.receipts.advance_book(book_id),
                    move |issued: Option<Issued>| {
                        issued.map_or(Ok(()), |i| self.receipts.undo_advance(i))
                    },
                )?;
            }
            _ => saga.skip(SagaStep::AdvanceReceipt),
        }
        Ok(())
    }

    /// Gives one dose back to a batch. A deleted batch is skipped.
    fn refund_dose<'a>(&'a self, saga: &mut Saga<'a>, bull_id: BullId) -> Result<(), LedgerError> {
        if self.stock.batch(bull_id).is_err() {
            warn!(bull = %bull_id, "batch no longer exists, dose not refunded");
            saga.skip(SagaStep::IncrementStock);
            return Ok(());
        }
        saga.run(
            SagaStep::IncrementStock,
            || self.stock.increment_for_use(bull_id),
            move |_| self.stock.decrement_for_use(bull_id).map(drop),
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Records a pregnancy diagnosis on one insemination.
    pub fn record_pd(
        &self,
        identity: &Identity,
        id: BreedingId,
        result: PdResult,
        date: NaiveDate,
    ) -> Result<BreedingRecord, LedgerError> {
        let _guard = self.write_lock.lock();
        let before = self.record(id)?;

        let mut saga = Saga::new("record_pd");
        let outcome = self.pd_steps(&mut saga, identity, before, result, date);
        self.keep_log(saga);

        if let Ok(record) = &outcome {
            info!(record = %id, tag = %record.tag_no, ?result, "P.D. recorded");
        }
        outcome
    }

    fn pd_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        identity: &Identity,
        before: BreedingRecord,
        result: PdResult,
        date: NaiveDate,
    ) -> Result<BreedingRecord, LedgerError> {
        let id = before.id;
        let updated = saga.run(
            SagaStep::UpdateRecord,
            || {
                self.store.breeding().update(&id, |r| {
                    r.apply(Transition::RecordPd { result, date })?;
                    Ok(r.clone())
                })
            },
            move |_| self.put_back(before),
        )?;
        let user = identity.user_id.clone();
        let treatment = Treatment::pd(&updated.tag_no, date, result, Some(id), user);
        saga.run_final(SagaStep::RecordTreatment, || {
            self.store.treatments().insert(treatment)
        })?;
        Ok(updated)
    }

    /// Marks a tag as delivered.
    ///
    /// Every record of the tag is reset to `Empty` with the calf details,
    /// and one calving event is appended for the latest pregnant record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotPregnant`] if no record of the tag is pregnant.
    pub fn record_calving(
        &self,
        identity: &Identity,
        tag_no: &str,
        gender: &str,
        date: NaiveDate,
    ) -> Result<CalvingEvent, LedgerError> {
        let _guard = self.write_lock.lock();
        let records = self.store.breeding().query(
            &Query::new()
                .filter(|r: &BreedingRecord| r.tag_no == tag_no)
                .order_by_desc(|r: &BreedingRecord| (r.date, r.created_at)),
        );
        let mother = records
            .iter()
            .find(|r| r.is_pregnant())
            .cloned()
            .ok_or_else(|| LedgerError::NotPregnant(tag_no.to_string()))?;

        let mut saga = Saga::new("record_calving");
        let outcome = self.calving_steps(&mut saga, &records, &mother, gender, date);
        self.keep_log(saga);

        if outcome.is_ok() {
            info!(
                tag = tag_no,
                gender,
                records = records.len(),
                by = %identity.user_id,
                "calving recorded"
            );
        }
        outcome
    }

    fn calving_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        records: &[BreedingRecord],
        mother: &BreedingRecord,
        gender: &str,
        date: NaiveDate,
    ) -> Result<CalvingEvent, LedgerError> {
        for record in records {
            let snapshot = record.clone();
            saga.run(
                SagaStep::UpdateRecord,
                || {
                    self.store.breeding().update(&record.id, |r| {
                        r.apply(Transition::Calve {
                            gender: gender.to_string(),
                            date,
                        })
                    })
                },
                move |()| self.put_back(snapshot),
            )?;
        }
        let event = CalvingEvent::for_record(mother, gender, date);
        saga.run_final(SagaStep::RecordCalving, || self.store.calvings().insert(event.clone()))?;
        Ok(event)
    }

    /// Runs the pre-entry safety checks without saving anything.
    pub fn check_animal(
        &self,
        tag_no: &str,
        date: NaiveDate,
        confirm_duplicate: bool,
    ) -> SafetyVerdict {
        safety::check_animal(&self.store, tag_no, date, confirm_duplicate)
    }

    /// Resolves a pregnancy block so the next entry for the tag can be saved.
    ///
    /// `Abortion` appends an abortion treatment and marks the pregnant record
    /// `Aborted`. `FalsePositive` corrects the positive P.D. treatment (or,
    /// for a legacy block, the breeding record itself) to negative.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AbortionBeforePregnancy`] when an abortion is dated
    /// before the block's diagnosis or insemination.
    pub fn unlock(
        &self,
        identity: &Identity,
        block: &PregnancyBlock,
        outcome: UnlockOutcome,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        if outcome == UnlockOutcome::Abortion && date < block.since {
            return Err(LedgerError::AbortionBeforePregnancy {
                date,
                since: block.since,
            });
        }
        let _guard = self.write_lock.lock();

        // Legacy blocks point at the breeding record directly
        let target = match block.breeding.filter(|_| block.is_legacy()) {
            Some(id) => Some(self.record(id)?),
            None => self.store.breeding().first(
                Query::new()
                    .filter(|r: &BreedingRecord| r.tag_no == block.tag_no && r.is_pregnant())
                    .order_by_desc(|r: &BreedingRecord| (r.date, r.created_at)),
            ),
        };

        let mut saga = Saga::new("unlock");
        let result = self.unlock_steps(&mut saga, identity, block, target.as_ref(), outcome, date);
        self.keep_log(saga);

        if result.is_ok() {
            info!(
                tag = %block.tag_no,
                reason = block.reason.as_str(),
                ?outcome,
                "pregnancy block resolved"
            );
        }
        result
    }

    fn unlock_steps<'a>(
        &'a self,
        saga: &mut Saga<'a>,
        identity: &Identity,
        block: &PregnancyBlock,
        target: Option<&BreedingRecord>,
        outcome: UnlockOutcome,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        match (outcome, block.treatment) {
            (UnlockOutcome::Abortion, _) => {
                let breeding = target.map(|r| r.id);
                let user = identity.user_id.clone();
                let treatment = Treatment::abortion(&block.tag_no, date, breeding, user);
                let treatment_id = treatment.id;
                saga.run(
                    SagaStep::RecordTreatment,
                    || self.store.treatments().insert(treatment),
                    move |()| self.store.treatments().remove(&treatment_id).map(drop),
                )?;
            }
            (UnlockOutcome::FalsePositive, Some(pd_id)) if !block.is_legacy() => {
                let before = self.store.treatments().get(&pd_id);
                saga.run(
                    SagaStep::UpdateTreatment,
                    || {
                        self.store.treatments().update(&pd_id, |t| {
                            t.result = Some(PdResult::Negative);
                            t.notes = "Correction: false positive".to_string();
                            Ok(())
                        })
                    },
                    move |()| match before {
                        Some(original) => self.store.treatments().update(&pd_id, |t| {
                            *t = original;
                            Ok(())
                        }),
                        None => Ok(()),
                    },
                )?;
            }
            (UnlockOutcome::FalsePositive, _) => saga.skip(SagaStep::UpdateTreatment),
        }

        let Some(record) = target else {
            debug!(tag = %block.tag_no, "no pregnant breeding record to correct");
            saga.skip(SagaStep::UpdateRecord);
            return Ok(());
        };
        let transition = match outcome {
            UnlockOutcome::Abortion => Transition::Abort,
            UnlockOutcome::FalsePositive => Transition::CorrectFalsePositive,
        };
        saga.run_final(SagaStep::UpdateRecord, || {
            self.store.breeding().update(&record.id, |r| r.apply(transition))
        })
    }

    // ------------------------------------------------------------------
    // Reads and reports
    // ------------------------------------------------------------------

    pub fn record(&self, id: BreedingId) -> Result<BreedingRecord, LedgerError> {
        self.store.breeding().get(&id).ok_or(LedgerError::RecordNotFound(id))
    }

    /// Records the operator may see, newest first.
    pub fn records(&self, identity: &Identity) -> Vec<BreedingRecord> {
        self.store.breeding().query(
            &Query::new()
                .filter(|r: &BreedingRecord| identity.can_view(&r.user_id, &self.config))
                .order_by_desc(|r: &BreedingRecord| (r.date, r.created_at)),
        )
    }

    /// Best-effort owner details from the tag's latest record.
    pub fn lookup_history(&self, tag_no: &str) -> Option<HistoryFill> {
        let tag_no = tag_no.trim();
        if tag_no.len() < self.config.tag_min_len {
            return None;
        }
        let latest = safety::latest_record(&self.store, tag_no);
        if latest.is_none() {
            debug!(tag = tag_no, "no history for tag");
        }
        latest.map(|r| HistoryFill {
            owner_name: r.owner_name,
            mobile_number: r.mobile_number,
            category: r.category,
            village: r.village,
            jati: r.jati,
            breed: r.breed,
            last_date: r.date,
            last_status: r.status,
        })
    }

    /// Month ledger of one batch; `None` if it was received after the month.
    pub fn monthly_balance(
        &self,
        bull_id: BullId,
        window: MonthWindow,
    ) -> Result<Option<StockBalance>, LedgerError> {
        let batch = self.stock.batch(bull_id)?;
        let (usage, discards) = self.stock_events(|id| id == bull_id);
        Ok(ledger::monthly_balance(&batch, &usage, &discards, window))
    }

    /// Month ledger of every batch the operator owns.
    pub fn stock_report(&self, identity: &Identity, window: MonthWindow) -> Vec<StockBalance> {
        let batches = self.stock.batches(identity.scope());
        let (usage, discards) = self.stock_events(|id| batches.iter().any(|b| b.id == id));
        batches
            .iter()
            .filter_map(|b| ledger::monthly_balance(b, &usage, &discards, window))
            .collect()
    }

    /// Month ledger of every receipt book the operator owns.
    pub fn receipt_report(&self, identity: &Identity, window: MonthWindow) -> Vec<BookBalance> {
        let owner = identity.scope();
        let usage: Vec<ReceiptUsage> = self
            .store
            .breeding()
            .query(&Query::new().filter(|r: &BreedingRecord| &r.user_id == owner))
            .iter()
            .map(ReceiptUsage::from)
            .collect();
        self.receipts
            .books(owner)
            .iter()
            .filter_map(|book| ledger::book_balance(book, &usage, window))
            .collect()
    }

    pub fn pd_due_list(
        &self,
        identity: &Identity,
        filter: PdFilter,
        today: NaiveDate,
    ) -> Vec<PdDue> {
        schedule::pd_due_list(&self.records(identity), filter, today, &self.config)
    }

    pub fn calving_due_list(
        &self,
        identity: &Identity,
        filter: CalvingFilter,
        today: NaiveDate,
    ) -> Vec<CalvingDue> {
        schedule::calving_due_list(&self.records(identity), filter, today, &self.config)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn usable_bull(
        &self,
        bull_id: BullId,
        semen_type: SemenType,
    ) -> Result<BullBatch, LedgerError> {
        let bull = self.stock.batch(bull_id)?;
        if bull.doses == 0 {
            return Err(LedgerError::InsufficientStock(bull_id));
        }
        if bull.semen_type != semen_type {
            return Err(LedgerError::BullSemenMismatch {
                bull: bull.semen_type,
                entry: semen_type,
            });
        }
        Ok(bull)
    }

    fn receipt_taken(
        &self,
        owner: &UserId,
        number: u32,
        semen_type: SemenType,
        except: Option<BreedingId>,
    ) -> bool {
        self.store
            .breeding()
            .first(Query::new().filter(|r: &BreedingRecord| {
                &r.user_id == owner
                    && r.receipt_no == number
                    && r.semen_type == semen_type
                    && Some(r.id) != except
            }))
            .is_some()
    }

    fn stock_events(
        &self,
        wanted: impl Fn(BullId) -> bool,
    ) -> (Vec<UsageEvent>, Vec<DiscardEvent>) {
        let usage = self
            .store
            .breeding()
            .query(&Query::new().filter(|r: &BreedingRecord| wanted(r.bull_id)))
            .iter()
            .map(UsageEvent::from)
            .collect();
        let discards = self
            .store
            .stock_debits()
            .all()
            .iter()
            .filter(|d| wanted(d.bull_id))
            .map(DiscardEvent::from)
            .collect();
        (usage, discards)
    }

    /// Overwrites a breeding record with an earlier copy.
    fn put_back(&self, snapshot: BreedingRecord) -> Result<(), LedgerError> {
        let id = snapshot.id;
        self.store.breeding().update(&id, |r| {
            *r = snapshot;
            Ok(())
        })
    }

    fn keep_log(&self, saga: Saga<'_>) {
        *self.last_saga.lock() = Some(saga.finish());
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn new_record(entry: &ValidatedEntry, bull: &BullBatch, owner: &UserId) -> BreedingRecord {
    BreedingRecord {
        id: BreedingId::generate(),
        date: entry.date,
        tag_no: entry.tag_no.clone(),
        untagged: entry.untagged,
        owner_name: entry.owner_name.clone(),
        mobile_number: entry.mobile_number.clone(),
        village: entry.village.clone(),
        category: entry.category.clone(),
        jati: entry.jati,
        breed: entry.breed.clone(),
        semen_type: entry.semen_type,
        bull_id: bull.id,
        bull_name: bull.name.clone(),
        receipt_no: entry.receipt_no,
        cost: entry.cost,
        status: BreedingStatus::AiDone,
        pd_result: None,
        pd_date: None,
        notes: entry.notes.clone(),
        calf_gender: None,
        last_calving_date: None,
        user_id: owner.clone(),
        created_at: Utc::now(),
        audit_history: Vec::new(),
    }
}
