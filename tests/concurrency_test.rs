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

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! Many threads write entries, stock movements and reports against one
//! engine. The detector thread panics if the lock graph ever cycles.

use breeding_ledger_rs::{
    BullBatch, BullId, Engine, EntryForm, Identity, Jati, LedgerError, MonthWindow, NewBatch,
    SemenType,
};
use chrono::NaiveDate;
use parking_lot::deadlock;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

/// Starts a background thread that checks for deadlocks every 100ms.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn vet() -> Identity {
    Identity::user("vet-1", "Vet One")
}

fn receive(engine: &Engine, name: &str, semen_type: SemenType, doses: u32) -> BullBatch {
    let batch = NewBatch::new(name, Jati::Cow, "HF", semen_type, doses).on(day(1));
    engine.stock().receive(vet().scope(), batch).unwrap()
}

fn entry(date: NaiveDate, tag: String, bull_id: BullId, semen_type: SemenType) -> EntryForm {
    EntryForm::new(date, tag, bull_id, semen_type, Jati::Cow, "HF", "Khed")
}

#[test]
fn concurrent_entries_never_share_a_receipt() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    engine.receipts().create(vet().scope(), 1, 1000, SemenType::Conventional, day(1)).unwrap();
    let bull = receive(&engine, "HF 1", SemenType::Conventional, 1000);

    const NUM_THREADS: u32 = 8;
    const PER_THREAD: u32 = 25;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let bull_id = bull.id;
            thread::spawn(move || {
                let mut receipts = Vec::new();
                for i in 0..PER_THREAD {
                    let tag = format!("{}", 10_000_000 + t * 1000 + i);
                    let form = entry(day(15), tag, bull_id, SemenType::Conventional);
                    receipts.push(engine.create_entry(&vet(), &form).unwrap().receipt_no);
                }
                receipts
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for number in handle.join().unwrap() {
            assert!(seen.insert(number), "receipt #{number} issued twice");
        }
    }

    let total = NUM_THREADS * PER_THREAD;
    assert_eq!(seen.len() as u32, total);
    assert_eq!(engine.next_number(&vet(), SemenType::Conventional), Some(total + 1));
    assert_eq!(engine.stock().batch(bull.id).unwrap().doses, 1000 - total);

    stop_deadlock_detector(detector);
}

#[test]
fn concurrent_uses_and_discards_never_overdraw() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    let bull = receive(&engine, "HF 1", SemenType::Conventional, 100);
    let taken = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let taken = Arc::clone(&taken);
            let bull_id = bull.id;
            thread::spawn(move || {
                for _ in 0..20 {
                    let result = if t % 2 == 0 {
                        engine.stock().decrement_for_use(bull_id).map(|_| 1)
                    } else {
                        engine.stock().discard(bull_id, 3, "expired", day(2)).map(|_| 3)
                    };
                    match result {
                        Ok(n) => {
                            taken.fetch_add(n, Ordering::SeqCst);
                        }
                        Err(
                            LedgerError::InsufficientStock(_)
                            | LedgerError::DiscardExceedsStock { .. },
                        ) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let left = engine.stock().batch(bull.id).unwrap().doses;
    assert_eq!(left + taken.load(Ordering::SeqCst), 100);

    stop_deadlock_detector(detector);
}

#[test]
fn reports_and_subscribers_during_writes() {
    let detector = start_deadlock_detector();
    let engine = Arc::new(Engine::new());
    engine.receipts().create(vet().scope(), 1, 500, SemenType::Sexed, day(1)).unwrap();
    let bull = receive(&engine, "HF S", SemenType::Sexed, 500);
    let changes = engine.store().breeding().subscribe();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let engine = Arc::clone(&engine);
        let done = Arc::clone(&done);
        let bull_id = bull.id;
        thread::spawn(move || {
            for i in 0..100u32 {
                let tag = format!("{}", 20_000_000 + i);
                let form = entry(day(10), tag, bull_id, SemenType::Sexed);
                let record = engine.create_entry(&vet(), &form).unwrap();
                if i % 3 == 0 {
                    engine.delete_entry(&vet(), record.id).unwrap();
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let window = MonthWindow::new(2024, 1).unwrap();
                while !done.load(Ordering::SeqCst) {
                    let _ = engine.stock_report(&vet(), window);
                    let _ = engine.receipt_report(&vet(), window);
                    let _ = engine.records(&vet());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // 100 creates plus 34 deletes, AutoNegative never fires on distinct tags
    assert_eq!(changes.try_iter().count(), 134);
    assert_eq!(engine.records(&vet()).len(), 66);
    assert_eq!(engine.stock().batch(bull.id).unwrap().doses, 500 - 66);

    stop_deadlock_detector(detector);
}
