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

//! Receipt book allocation.
//!
//! A book is a pre-printed range `start..=end` of receipt numbers for one
//! semen type. `current` is the next number to hand out.
//!
//! ```text
//!  Pending ──activate──► Active ──advance past end──► Completed
//!                          │
//!                          └──another book activated──► Completed
//! ```
//!
//! # Invariants
//!
//! - At most one `Active` book per (owner, semen type).
//! - `start <= current <= end + 1`; `current == end + 1` only when
//!   `Completed`, unless the range was edited afterwards.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use breeding_ledger_rs::{LedgerStore, ReceiptAllocator, SemenType, UserId};
//! use chrono::NaiveDate;
//!
//! let store = Arc::new(LedgerStore::new());
//! let receipts = ReceiptAllocator::new(store);
//! let vet = UserId::new("vet-1");
//! let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//!
//! receipts.create(&vet, 101, 200, SemenType::Conventional, date).unwrap();
//! assert_eq!(receipts.next_number(&vet, SemenType::Conventional), Some(101));
//! ```

use crate::base::{BookId, SemenType, UserId};
use crate::error::LedgerError;
use crate::store::{Document, LedgerStore, Query};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReceiptBook {
    pub id: BookId,
    pub owner: UserId,
    pub semen_type: SemenType,
    pub start: u32,
    pub end: u32,
    pub current: u32,
    pub status: BookStatus,
    /// Numbers voided out of order; never reissued.
    #[serde(default)]
    pub restored_count: u32,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl ReceiptBook {
    pub fn capacity(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, number: u32) -> bool {
        (self.start..=self.end).contains(&number)
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.start <= self.end,
            "Invariant violated: empty range {}..={}",
            self.start,
            self.end
        );
        debug_assert!(
            self.current >= self.start && self.current <= self.end + 1,
            "Invariant violated: current {} outside {}..={}",
            self.current,
            self.start,
            self.end + 1
        );
    }
}

impl Document for ReceiptBook {
    type Id = BookId;
    const COLLECTION: &'static str = "receipt_books";

    fn id(&self) -> BookId {
        self.id
    }
}

/// `end + 1` marks an exhausted book, so `end` must stay below `u32::MAX`.
fn check_range(start: u32, end: u32) -> Result<(), LedgerError> {
    if start > end || end == u32::MAX {
        return Err(LedgerError::InvalidBookRange { start, end });
    }
    Ok(())
}

/// A number handed out by [`ReceiptAllocator::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    pub book: BookId,
    pub number: u32,
    /// The advance exhausted the book.
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The number was the last one issued; `current` moved back.
    Rewound(BookId),
    /// Recorded as a permanent gap.
    GapRecorded(BookId),
    /// No book to restore into.
    NoBook,
}

/// Hands out sequential receipt numbers from each owner's active book.
pub struct ReceiptAllocator {
    store: Arc<LedgerStore>,
    /// Serialises multi-book writes (create, activate).
    lock: Mutex<()>,
}

impl ReceiptAllocator {
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Creates a book. It becomes active if the owner has no active book of
    /// that type.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidBookRange`] when `start > end` or `end` is
    /// `u32::MAX`.
    pub fn create(
        &self,
        owner: &UserId,
        start: u32,
        end: u32,
        semen_type: SemenType,
        date: NaiveDate,
    ) -> Result<ReceiptBook, LedgerError> {
        check_range(start, end)?;

        let _guard = self.lock.lock();
        let status = if self.active_book(owner, semen_type).is_some() {
            BookStatus::Pending
        } else {
            BookStatus::Active
        };
        let book = ReceiptBook {
            id: BookId::generate(),
            owner: owner.clone(),
            semen_type,
            start,
            end,
            current: start,
            status,
            restored_count: 0,
            date,
            created_at: Utc::now(),
        };
        book.assert_invariants();
        self.store.receipt_books().insert(book.clone())?;

        info!(book = %book.id, %owner, %semen_type, start, end, ?status, "receipt book created");
        Ok(book)
    }

    /// Makes `book_id` the active book of its type, completing the previous one.
    pub fn activate(&self, book_id: BookId) -> Result<(), LedgerError> {
        let _guard = self.lock.lock();
        let book = self.book(book_id)?;

        let others = Query::new().filter(|b: &ReceiptBook| {
            b.owner == book.owner
                && b.semen_type == book.semen_type
                && b.status == BookStatus::Active
                && b.id != book_id
        });
        for other in self.store.receipt_books().query(&others) {
            self.store.receipt_books().update(&other.id, |b| {
                b.status = BookStatus::Completed;
                Ok(())
            })?;
            debug!(book = %other.id, "receipt book completed by activation");
        }

        self.store.receipt_books().update(&book_id, |b| {
            b.status = BookStatus::Active;
            Ok(())
        })?;
        info!(book = %book_id, semen_type = %book.semen_type, "receipt book activated");
        Ok(())
    }

    pub fn book(&self, book_id: BookId) -> Result<ReceiptBook, LedgerError> {
        self.store
            .receipt_books()
            .get(&book_id)
            .ok_or(LedgerError::BookNotFound(book_id))
    }

    pub fn books(&self, owner: &UserId) -> Vec<ReceiptBook> {
        let query = Query::new()
            .filter(|b: &ReceiptBook| &b.owner == owner)
            .order_by(|a: &ReceiptBook, b: &ReceiptBook| {
                (a.semen_type, a.start).cmp(&(b.semen_type, b.start))
            });
        self.store.receipt_books().query(&query)
    }

    pub fn active_book(&self, owner: &UserId, semen_type: SemenType) -> Option<ReceiptBook> {
        self.store.receipt_books().first(Query::new().filter(|b: &ReceiptBook| {
            &b.owner == owner && b.semen_type == semen_type && b.status == BookStatus::Active
        }))
    }

    /// Next number the active book would issue. Never mutates.
    pub fn next_number(&self, owner: &UserId, semen_type: SemenType) -> Option<u32> {
        self.next_slot(owner, semen_type).map(|(_, number)| number)
    }

    /// Like [`next_number`](Self::next_number), together with the book the
    /// number comes from.
    pub fn next_slot(&self, owner: &UserId, semen_type: SemenType) -> Option<(BookId, u32)> {
        self.active_book(owner, semen_type)
            .filter(|book| book.current <= book.end)
            .map(|book| (book.id, book.current))
    }

    /// Consumes the next number of the active book. A no-op without one.
    pub fn advance(
        &self,
        owner: &UserId,
        semen_type: SemenType,
    ) -> Result<Option<Issued>, LedgerError> {
        let Some(book) = self.active_book(owner, semen_type) else {
            debug!(%owner, %semen_type, "no active book, advance skipped");
            return Ok(None);
        };
        self.advance_book(book.id)
    }

    /// Consumes the next number of `book_id`, even if another book has been
    /// activated since that number was read. A no-op on an exhausted book.
    pub fn advance_book(&self, book_id: BookId) -> Result<Option<Issued>, LedgerError> {
        let issued = self.store.receipt_books().update(&book_id, |b| {
            if b.current > b.end {
                return Ok(None);
            }
            let number = b.current;
            b.current += 1;
            let completed = b.current > b.end && b.status == BookStatus::Active;
            if b.current > b.end {
                b.status = BookStatus::Completed;
            }
            b.assert_invariants();
            Ok(Some(Issued {
                book: b.id,
                number,
                completed,
            }))
        })?;

        match issued {
            Some(issued) if issued.completed => {
                info!(book = %issued.book, "receipt book completed");
            }
            Some(_) => {}
            None => debug!(book = %book_id, "book exhausted, advance skipped"),
        }
        Ok(issued)
    }

    /// Reverses one [`advance`](Self::advance).
    pub fn undo_advance(&self, issued: Issued) -> Result<(), LedgerError> {
        self.store.receipt_books().update(&issued.book, |b| {
            if b.current == issued.number + 1 {
                b.current = issued.number;
                if issued.completed {
                    b.status = BookStatus::Active;
                }
            }
            Ok(())
        })
    }

    /// Returns a receipt number to its book.
    ///
    /// The book whose range contains `number` is targeted, falling back to
    /// the active book. If `number` was the last one issued by an active
    /// book, `current` rewinds; otherwise the book's `restored_count` grows
    /// and no other number moves.
    pub fn restore(
        &self,
        owner: &UserId,
        semen_type: SemenType,
        number: u32,
    ) -> Result<RestoreOutcome, LedgerError> {
        let containing = self.store.receipt_books().first(
            Query::new()
                .filter(|b: &ReceiptBook| {
                    &b.owner == owner && b.semen_type == semen_type && b.contains(number)
                })
                .order_by_desc(|b: &ReceiptBook| b.status == BookStatus::Active),
        );
        let Some(book) = containing.or_else(|| self.active_book(owner, semen_type)) else {
            debug!(%owner, %semen_type, number, "no book to restore into");
            return Ok(RestoreOutcome::NoBook);
        };

        let outcome = self.store.receipt_books().update(&book.id, |b| {
            if b.status == BookStatus::Active && b.current > b.start && number == b.current - 1 {
                b.current -= 1;
                b.assert_invariants();
                Ok(RestoreOutcome::Rewound(b.id))
            } else {
                b.restored_count += 1;
                Ok(RestoreOutcome::GapRecorded(b.id))
            }
        })?;

        debug!(book = %book.id, number, ?outcome, "receipt restored");
        Ok(outcome)
    }

    /// Reverses one [`restore`](Self::restore).
    pub fn undo_restore(&self, outcome: RestoreOutcome) -> Result<(), LedgerError> {
        match outcome {
            RestoreOutcome::Rewound(id) => self.store.receipt_books().update(&id, |b| {
                b.current = (b.current + 1).min(b.end + 1);
                if b.current > b.end {
                    b.status = BookStatus::Completed;
                }
                Ok(())
            }),
            RestoreOutcome::GapRecorded(id) => self.store.receipt_books().update(&id, |b| {
                b.restored_count = b.restored_count.saturating_sub(1);
                Ok(())
            }),
            RestoreOutcome::NoBook => Ok(()),
        }
    }

    /// Changes a book's range and date. `current` is clamped into the new range.
    pub fn update_range(
        &self,
        book_id: BookId,
        start: u32,
        end: u32,
        date: NaiveDate,
    ) -> Result<ReceiptBook, LedgerError> {
        check_range(start, end)?;
        self.store.receipt_books().update(&book_id, |b| {
            b.start = start;
            b.end = end;
            b.date = date;
            b.current = b.current.clamp(start, end + 1);
            if b.current > end {
                b.status = BookStatus::Completed;
            }
            b.assert_invariants();
            Ok(b.clone())
        })
    }

    pub fn delete(&self, book_id: BookId) -> Result<ReceiptBook, LedgerError> {
        let book = self.store.receipt_books().remove(&book_id)?;
        info!(book = %book_id, "receipt book deleted");
        Ok(book)
    }
}
