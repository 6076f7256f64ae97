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

//! Receipt book allocator integration tests.

use breeding_ledger_rs::{
    BookStatus, LedgerError, LedgerStore, ReceiptAllocator, RestoreOutcome, SemenType, UserId,
};
use chrono::NaiveDate;
use std::sync::Arc;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn allocator() -> (ReceiptAllocator, UserId) {
    (ReceiptAllocator::new(Arc::new(LedgerStore::new())), UserId::new("vet-1"))
}

#[test]
fn first_book_is_active_and_issues_from_start() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 101, 200, SemenType::Conventional, day(2024, 1, 1)).unwrap();

    assert_eq!(book.status, BookStatus::Active);
    assert_eq!(receipts.next_number(&owner, SemenType::Conventional), Some(101));
    assert_eq!(receipts.next_number(&owner, SemenType::Sexed), None);
}

#[test]
fn book_completes_after_last_number() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 101, 200, SemenType::Conventional, day(2024, 1, 1)).unwrap();

    for expected in 101..=200 {
        let issued = receipts.advance(&owner, SemenType::Conventional).unwrap().unwrap();
        assert_eq!(issued.number, expected);
    }

    let book = receipts.book(book.id).unwrap();
    assert_eq!(book.status, BookStatus::Completed);
    assert_eq!(book.current, 201);
    assert_eq!(receipts.next_number(&owner, SemenType::Conventional), None);

    // no active book left: further advances do nothing
    assert_eq!(receipts.advance(&owner, SemenType::Conventional).unwrap(), None);
    assert_eq!(receipts.book(book.id).unwrap().current, 201);
}

#[test]
fn second_book_waits_until_activated() {
    let (receipts, owner) = allocator();
    let first = receipts.create(&owner, 1, 50, SemenType::Sexed, day(2024, 1, 1)).unwrap();
    let second = receipts.create(&owner, 51, 100, SemenType::Sexed, day(2024, 2, 1)).unwrap();
    assert_eq!(second.status, BookStatus::Pending);

    receipts.activate(second.id).unwrap();

    assert_eq!(receipts.book(first.id).unwrap().status, BookStatus::Completed);
    assert_eq!(receipts.next_number(&owner, SemenType::Sexed), Some(51));
}

#[test]
fn series_are_separate_per_owner_and_type() {
    let (receipts, owner) = allocator();
    let other = UserId::new("vet-2");
    receipts.create(&owner, 1, 10, SemenType::Conventional, day(2024, 1, 1)).unwrap();
    receipts.create(&owner, 500, 510, SemenType::Sexed, day(2024, 1, 1)).unwrap();
    receipts.create(&other, 1, 10, SemenType::Conventional, day(2024, 1, 1)).unwrap();

    receipts.advance(&owner, SemenType::Conventional).unwrap();

    assert_eq!(receipts.next_number(&owner, SemenType::Conventional), Some(2));
    assert_eq!(receipts.next_number(&owner, SemenType::Sexed), Some(500));
    assert_eq!(receipts.next_number(&other, SemenType::Conventional), Some(1));
}

#[test]
fn restoring_last_issued_number_rewinds() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 101, 200, SemenType::Conventional, day(2024, 1, 1)).unwrap();
    receipts.advance(&owner, SemenType::Conventional).unwrap();
    receipts.advance(&owner, SemenType::Conventional).unwrap();

    let outcome = receipts.restore(&owner, SemenType::Conventional, 102).unwrap();

    assert_eq!(outcome, RestoreOutcome::Rewound(book.id));
    assert_eq!(receipts.next_number(&owner, SemenType::Conventional), Some(102));
}

#[test]
fn restoring_older_number_records_gap_each_time() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 101, 200, SemenType::Conventional, day(2024, 1, 1)).unwrap();
    for _ in 0..5 {
        receipts.advance(&owner, SemenType::Conventional).unwrap();
    }

    receipts.restore(&owner, SemenType::Conventional, 102).unwrap();
    receipts.restore(&owner, SemenType::Conventional, 102).unwrap();

    let book = receipts.book(book.id).unwrap();
    assert_eq!(book.restored_count, 2);
    assert_eq!(book.current, 106);
}

#[test]
fn restore_without_any_book_is_noop() {
    let (receipts, owner) = allocator();
    assert_eq!(
        receipts.restore(&owner, SemenType::Sexed, 7).unwrap(),
        RestoreOutcome::NoBook
    );
}

#[test]
fn undo_advance_reopens_completed_book() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 1, 1, SemenType::Conventional, day(2024, 1, 1)).unwrap();

    let issued = receipts.advance(&owner, SemenType::Conventional).unwrap().unwrap();
    assert!(issued.completed);

    receipts.undo_advance(issued).unwrap();
    let book = receipts.book(book.id).unwrap();
    assert_eq!(book.status, BookStatus::Active);
    assert_eq!(book.current, 1);
}

#[test]
fn range_edit_clamps_pointer() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 1, 100, SemenType::Conventional, day(2024, 1, 1)).unwrap();
    for _ in 0..10 {
        receipts.advance(&owner, SemenType::Conventional).unwrap();
    }

    let shrunk = receipts.update_range(book.id, 1, 5, day(2024, 1, 2)).unwrap();

    assert_eq!(shrunk.current, 6);
    assert_eq!(shrunk.status, BookStatus::Completed);
    assert_eq!(
        receipts.update_range(book.id, 9, 3, day(2024, 1, 2)),
        Err(LedgerError::InvalidBookRange { start: 9, end: 3 })
    );
}

#[test]
fn deleted_book_is_gone() {
    let (receipts, owner) = allocator();
    let book = receipts.create(&owner, 1, 10, SemenType::Conventional, day(2024, 1, 1)).unwrap();

    receipts.delete(book.id).unwrap();

    assert!(receipts.books(&owner).is_empty());
    assert_eq!(receipts.book(book.id), Err(LedgerError::BookNotFound(book.id)));
}

#[test]
fn range_must_end_below_last_representable_number() {
    let (receipts, owner) = allocator();
    let date = day(2024, 1, 1);

    assert_eq!(
        receipts.create(&owner, u32::MAX - 1, u32::MAX, SemenType::Sexed, date),
        Err(LedgerError::InvalidBookRange {
            start: u32::MAX - 1,
            end: u32::MAX
        })
    );

    // the highest valid book still issues every number and completes
    let top = receipts.create(&owner, u32::MAX - 2, u32::MAX - 1, SemenType::Sexed, date).unwrap();
    assert_eq!(top.capacity(), 2);
    receipts.advance(&owner, SemenType::Sexed).unwrap();
    let last = receipts.advance(&owner, SemenType::Sexed).unwrap().unwrap();
    assert_eq!(last.number, u32::MAX - 1);
    assert!(last.completed);
    assert_eq!(receipts.book(top.id).unwrap().current, u32::MAX);

    assert_eq!(
        receipts.update_range(top.id, 0, u32::MAX, date),
        Err(LedgerError::InvalidBookRange {
            start: 0,
            end: u32::MAX
        })
    );
}

#[test]
fn advance_targets_the_book_the_number_came_from() {
    let (receipts, owner) = allocator();
    let date = day(2024, 1, 1);
    let first = receipts.create(&owner, 1, 100, SemenType::Conventional, date).unwrap();
    let second = receipts.create(&owner, 500, 600, SemenType::Conventional, date).unwrap();

    let (book_id, number) = receipts.next_slot(&owner, SemenType::Conventional).unwrap();
    assert_eq!((book_id, number), (first.id, 1));

    // another book activated between reading the number and consuming it
    receipts.activate(second.id).unwrap();
    let issued = receipts.advance_book(book_id).unwrap().unwrap();

    assert_eq!(issued.number, 1);
    assert!(!issued.completed);
    assert_eq!(receipts.book(first.id).unwrap().current, 2);
    assert_eq!(receipts.next_number(&owner, SemenType::Conventional), Some(500));

    // undoing must not reopen the book that activation completed
    receipts.undo_advance(issued).unwrap();
    let first = receipts.book(first.id).unwrap();
    assert_eq!(first.current, 1);
    assert_eq!(first.status, BookStatus::Completed);
}
