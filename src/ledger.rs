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

//! Month-bounded balances replayed from raw events.
//!
//! No balance snapshot is stored, so the opening balance of any month is
//! rebuilt from the batch's original size and every event before the month.
//! The original size itself is reconstructed:
//!
//! ```text
//! original = live doses + lifetime uses + lifetime discards
//! previous = max(0, (original if received before month) - uses before - discards before)
//! closing  = previous + (original if received in month) - uses in month - discards in month
//! ```

use crate::base::{BookId, BullId, SemenType};
use crate::breeding::BreedingRecord;
use crate::receipt::{BookStatus, ReceiptBook};
use crate::stock::{BullBatch, StockDebit};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Calendar month `[start, end]`, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    /// `None` for an invalid month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    pub fn containing(date: NaiveDate) -> Option<Self> {
        Self::new(date.year(), date.month())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn is_before(&self, date: NaiveDate) -> bool {
        date < self.start
    }
}

/// One dose used by an insemination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEvent {
    pub bull_id: BullId,
    pub date: NaiveDate,
}

impl From<&BreedingRecord> for UsageEvent {
    fn from(record: &BreedingRecord) -> Self {
        Self {
            bull_id: record.bull_id,
            date: record.date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscardEvent {
    pub bull_id: BullId,
    pub date: NaiveDate,
    pub quantity: u32,
}

impl From<&StockDebit> for DiscardEvent {
    fn from(debit: &StockDebit) -> Self {
        Self {
            bull_id: debit.bull_id,
            date: debit.date,
            quantity: debit.quantity,
        }
    }
}

/// Stock movement of one batch over one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockBalance {
    pub bull_id: BullId,
    pub name: String,
    pub semen_type: SemenType,
    pub previous_stock: i64,
    pub added_this_month: i64,
    pub used_this_month: i64,
    pub discarded_this_month: i64,
    pub closing_balance: i64,
}

/// Replays a batch's history up to the end of `window`.
///
/// Returns `None` for a batch received after the window; it did not exist
/// in that month.
pub fn monthly_balance(
    batch: &BullBatch,
    usage: &[UsageEvent],
    discards: &[DiscardEvent],
    window: MonthWindow,
) -> Option<StockBalance> {
    if batch.date > window.end {
        return None;
    }

    let uses: Vec<NaiveDate> = usage
        .iter()
        .filter(|u| u.bull_id == batch.id)
        .map(|u| u.date)
        .collect();
    let debits: Vec<(NaiveDate, i64)> = discards
        .iter()
        .filter(|d| d.bull_id == batch.id)
        .map(|d| (d.date, i64::from(d.quantity)))
        .collect();

    let discarded_total: i64 = debits.iter().map(|(_, q)| q).sum();
    let original = i64::from(batch.doses) + uses.len() as i64 + discarded_total;

    let used_before = uses.iter().filter(|d| window.is_before(**d)).count() as i64;
    let discarded_before: i64 = debits
        .iter()
        .filter(|(d, _)| window.is_before(*d))
        .map(|(_, q)| q)
        .sum();
    let added_before = if window.is_before(batch.date) { original } else { 0 };
    let previous_stock = (added_before - used_before - discarded_before).max(0);

    let used_this_month = uses.iter().filter(|d| window.contains(**d)).count() as i64;
    let discarded_this_month: i64 = debits
        .iter()
        .filter(|(d, _)| window.contains(*d))
        .map(|(_, q)| q)
        .sum();
    let added_this_month = if window.contains(batch.date) { original } else { 0 };

    Some(StockBalance {
        bull_id: batch.id,
        name: batch.name.clone(),
        semen_type: batch.semen_type,
        previous_stock,
        added_this_month,
        used_this_month,
        discarded_this_month,
        closing_balance: previous_stock + added_this_month - used_this_month - discarded_this_month,
    })
}

/// A receipt number consumed by an insemination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptUsage {
    pub receipt_no: u32,
    pub semen_type: SemenType,
    pub date: NaiveDate,
    pub cost: Decimal,
}

impl From<&BreedingRecord> for ReceiptUsage {
    fn from(record: &BreedingRecord) -> Self {
        Self {
            receipt_no: record.receipt_no,
            semen_type: record.semen_type,
            date: record.date,
            cost: record.cost,
        }
    }
}

/// Receipt movement of one book over one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookBalance {
    pub book_id: BookId,
    pub semen_type: SemenType,
    pub start: u32,
    pub end: u32,
    pub status: BookStatus,
    pub previous: i64,
    pub added: i64,
    pub used: i64,
    pub closing: i64,
    /// Service fees on receipts issued this month.
    pub collected: Decimal,
}

/// Same replay as [`monthly_balance`], counting receipts of the book's range.
pub fn book_balance(
    book: &ReceiptBook,
    usage: &[ReceiptUsage],
    window: MonthWindow,
) -> Option<BookBalance> {
    if book.date > window.end {
        return None;
    }

    let capacity = i64::from(book.capacity());
    let in_book: Vec<&ReceiptUsage> = usage
        .iter()
        .filter(|u| u.semen_type == book.semen_type && book.contains(u.receipt_no))
        .collect();

    let used_before = in_book.iter().filter(|u| window.is_before(u.date)).count() as i64;
    let added_before = if window.is_before(book.date) { capacity } else { 0 };
    let previous = (added_before - used_before).max(0);

    let this_month: Vec<&&ReceiptUsage> =
        in_book.iter().filter(|u| window.contains(u.date)).collect();
    let used = this_month.len() as i64;
    let added = if window.contains(book.date) { capacity } else { 0 };

    Some(BookBalance {
        book_id: book.id,
        semen_type: book.semen_type,
        start: book.start,
        end: book.end,
        status: book.status,
        previous,
        added,
        used,
        closing: previous + added - used,
        collected: this_month.iter().map(|u| u.cost).sum(),
    })
}
