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

//! # Breeding Ledger
//!
//! Records engine for artificial-insemination field centres: sequential
//! receipt books, semen stock with monthly ledgers, and the breeding and
//! pregnancy lifecycle of each tagged animal.
//!
//! ## Core Components
//!
//! - [`Engine`]: Entry point; validates forms and coordinates every write
//!   that spans receipts, stock and breeding records
//! - [`ReceiptAllocator`]: Receipt books and sequential number issuing
//! - [`SemenStock`]: Bull semen batches, discards and selectable bulls
//! - [`BreedingRecord`]: One insemination and its pregnancy state machine
//! - [`LedgerError`]: Every rejection the engine can return
//!
//! ## Example
//!
//! ```
//! use breeding_ledger_rs::{Engine, EntryForm, Identity, Jati, NewBatch, SemenType};
//! use chrono::NaiveDate;
//!
//! let engine = Engine::new();
//! let vet = Identity::user("u1", "Dr. Patil");
//! let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
//!
//! engine
//!     .receipts()
//!     .create(vet.scope(), 101, 150, SemenType::Conventional, day)
//!     .unwrap();
//! let hf = NewBatch::new("HF 1042", Jati::Cow, "HF", SemenType::Conventional, 10).on(day);
//! let bull = engine.stock().receive(vet.scope(), hf).unwrap();
//!
//! let form = EntryForm::new(
//!     day,
//!     "12345678",
//!     bull.id,
//!     SemenType::Conventional,
//!     Jati::Cow,
//!     "HF",
//!     "Khed",
//! );
//! let record = engine.create_entry(&vet, &form).unwrap();
//!
//! assert_eq!(record.receipt_no, 101);
//! assert_eq!(engine.next_number(&vet, SemenType::Conventional), Some(102));
//! assert_eq!(engine.stock().batch(bull.id).unwrap().doses, 9);
//! ```
//!
//! ## Thread Safety
//!
//! Collections are sharded maps; single-document updates are atomic.
//! Multi-document operations on the [`Engine`] are serialised so that
//! concurrent entries never share a receipt number.

mod base;
pub mod breeding;
pub mod config;
mod engine;
pub mod error;
mod form;
mod identity;
pub mod ledger;
pub mod receipt;
pub mod safety;
pub mod saga;
pub mod schedule;
pub mod stock;
pub mod store;
pub mod telemetry;

pub use base::{
    BookId, BreedingId, BullId, CalvingId, DebitId, Jati, SemenType, TreatmentId, UserId,
};
pub use breeding::{
    AuditAction, AuditEntry, BreedingRecord, BreedingStatus, CalvingEvent, PdResult, Transition,
    Treatment, TreatmentKind,
};
pub use config::LedgerConfig;
pub use engine::{Engine, HistoryFill};
pub use error::{ConfigError, LedgerError};
pub use form::{EntryForm, ReceiptMode, UNTAGGED, ValidatedEntry};
pub use identity::{Identity, Role};
pub use ledger::{BookBalance, MonthWindow, StockBalance};
pub use receipt::{BookStatus, Issued, ReceiptAllocator, ReceiptBook, RestoreOutcome};
pub use safety::{BlockReason, PregnancyBlock, SafetyVerdict, UnlockOutcome};
pub use saga::{SagaLog, SagaStep, StepStatus};
pub use schedule::{CalvingDue, CalvingFilter, PdDue, PdFilter};
pub use stock::{BatchUpdate, BullBatch, NewBatch, SemenStock, StockDebit};
pub use store::{Collection, LedgerStore, Query, StoreSnapshot};
