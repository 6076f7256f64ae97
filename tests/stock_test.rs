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

//! Semen stock and monthly ledger integration tests.

use breeding_ledger_rs::{
    BatchUpdate, BullBatch, Engine, EntryForm, Identity, Jati, LedgerError, LedgerStore,
    MonthWindow, NewBatch, SemenStock, SemenType, StockBalance, UserId,
};
use chrono::NaiveDate;
use std::sync::Arc;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn month(y: i32, m: u32) -> MonthWindow {
    MonthWindow::new(y, m).unwrap()
}

fn columns(s: StockBalance) -> (i64, i64, i64, i64, i64) {
    (
        s.previous_stock,
        s.added_this_month,
        s.used_this_month,
        s.discarded_this_month,
        s.closing_balance,
    )
}

#[test]
fn receive_then_discard_balances() {
    let engine = Engine::new();
    let vet = Identity::user("vet-1", "Vet");
    let hf = NewBatch::new("HF 1042", Jati::Cow, "HF", SemenType::Conventional, 100);
    let bull = engine.stock().receive(vet.scope(), hf.on(day(2024, 1, 5))).unwrap();

    engine.stock().discard(bull.id, 30, "expired", day(2024, 1, 20)).unwrap();

    let balance = engine.monthly_balance(bull.id, month(2024, 1)).unwrap().unwrap();
    assert_eq!(balance.previous_stock, 0);
    assert_eq!(balance.added_this_month, 100);
    assert_eq!(balance.used_this_month, 0);
    assert_eq!(balance.discarded_this_month, 30);
    assert_eq!(balance.closing_balance, 70);
    assert_eq!(engine.stock().batch(bull.id).unwrap().doses, 70);
}

#[test]
fn ledger_across_two_months() {
    let engine = Engine::new();
    let vet = Identity::user("vet-1", "Vet");
    engine
        .receipts()
        .create(vet.scope(), 1, 100, SemenType::Conventional, day(2024, 1, 1))
        .unwrap();
    let gir = NewBatch::new("GIR 7", Jati::Cow, "GIR", SemenType::Conventional, 50);
    let bull = engine.stock().receive(vet.scope(), gir.on(day(2024, 1, 10))).unwrap();

    let form = EntryForm::new(
        day(2024, 1, 15),
        "12345678",
        bull.id,
        SemenType::Conventional,
        Jati::Cow,
        "GIR",
        "Khed",
    );
    engine.create_entry(&vet, &form).unwrap();
    assert_eq!(engine.stock().batch(bull.id).unwrap().doses, 49);

    engine.stock().discard(bull.id, 5, "damaged", day(2024, 2, 1)).unwrap();

    let jan = engine.monthly_balance(bull.id, month(2024, 1)).unwrap();
    assert_eq!(jan.map(columns), Some((0, 50, 1, 0, 49)));

    let feb = engine.monthly_balance(bull.id, month(2024, 2)).unwrap();
    assert_eq!(feb.map(columns), Some((49, 0, 0, 5, 44)));

    // received after December: did not exist yet
    assert_eq!(engine.monthly_balance(bull.id, month(2023, 12)).unwrap(), None);
}

#[test]
fn discard_rules() {
    let stock = SemenStock::new(Arc::new(LedgerStore::new()));
    let owner = UserId::new("vet-1");
    let bull = stock
        .receive(&owner, NewBatch::new("M 1", Jati::Buffalo, "MURRAH", SemenType::Conventional, 10))
        .unwrap();

    assert_eq!(stock.discard(bull.id, 0, "none", day(2024, 1, 1)), Err(LedgerError::ZeroQuantity));
    assert_eq!(
        stock.discard(bull.id, 11, "too many", day(2024, 1, 1)),
        Err(LedgerError::DiscardExceedsStock { requested: 11, available: 10 })
    );
    assert_eq!(stock.batch(bull.id).unwrap().doses, 10);
    assert!(stock.debits_for(bull.id).is_empty());
}

#[test]
fn empty_batch_cannot_be_used() {
    let stock = SemenStock::new(Arc::new(LedgerStore::new()));
    let owner = UserId::new("vet-1");
    let bull = stock
        .receive(&owner, NewBatch::new("S 1", Jati::Cow, "HF", SemenType::Sexed, 1))
        .unwrap();

    assert_eq!(stock.decrement_for_use(bull.id), Ok(0));
    assert_eq!(stock.decrement_for_use(bull.id), Err(LedgerError::InsufficientStock(bull.id)));
    assert_eq!(stock.increment_for_use(bull.id), Ok(1));
}

#[test]
fn zero_dose_batch_rejected() {
    let stock = SemenStock::new(Arc::new(LedgerStore::new()));
    let empty = NewBatch::new("X", Jati::Cow, "HF", SemenType::Sexed, 0);
    let result = stock.receive(&UserId::new("vet-1"), empty);
    assert_eq!(result, Err(LedgerError::ZeroQuantity));
}

#[test]
fn selectable_bulls_follow_species_breed_and_type() {
    let stock = SemenStock::new(Arc::new(LedgerStore::new()));
    let owner = UserId::new("vet-1");
    let hf = stock
        .receive(&owner, NewBatch::new("HF 1", Jati::Cow, "HF", SemenType::Conventional, 5))
        .unwrap();
    let hf_cross = stock
        .receive(&owner, NewBatch::new("HF X", Jati::Cow, "HF CROSS", SemenType::Conventional, 5))
        .unwrap();
    stock
        .receive(&owner, NewBatch::new("HF S", Jati::Cow, "HF", SemenType::Sexed, 5))
        .unwrap();
    stock
        .receive(&owner, NewBatch::new("MUR", Jati::Buffalo, "MURRAH", SemenType::Conventional, 5))
        .unwrap();
    let empty = stock
        .receive(&owner, NewBatch::new("HF 0", Jati::Cow, "HF", SemenType::Conventional, 1))
        .unwrap();
    stock.decrement_for_use(empty.id).unwrap();

    let offered = |owner: &UserId, jati: Jati, breed: &str| {
        stock
            .selectable_bulls(owner, jati, breed, SemenType::Conventional)
            .into_iter()
            .map(|b: BullBatch| b.name)
            .collect::<Vec<_>>()
    };

    assert_eq!(
        offered(&owner, Jati::Cow, "HF"),
        vec![hf.name.clone(), hf_cross.name.clone()]
    );
    assert_eq!(offered(&owner, Jati::Cow, "N.D."), vec![hf.name, hf_cross.name]);
    assert_eq!(offered(&owner, Jati::Buffalo, "N.D. BUFFALO"), vec!["MUR".to_string()]);
    assert!(offered(&UserId::new("vet-2"), Jati::Cow, "HF").is_empty());
}

#[test]
fn update_and_delete_batch() {
    let stock = SemenStock::new(Arc::new(LedgerStore::new()));
    let owner = UserId::new("vet-1");
    let bull = stock
        .receive(&owner, NewBatch::new("HF 1", Jati::Cow, "HF", SemenType::Conventional, 20))
        .unwrap();
    stock.discard(bull.id, 2, "broken straw", day(2024, 1, 2)).unwrap();

    let updated = stock
        .update(
            bull.id,
            BatchUpdate {
                name: Some("HF 1 (A)".into()),
                doses: Some(25),
                ..BatchUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "HF 1 (A)");
    assert_eq!(updated.doses, 25);

    stock.delete(bull.id).unwrap();
    assert_eq!(stock.batch(bull.id), Err(LedgerError::BullNotFound(bull.id)));
    assert!(stock.debits_for(bull.id).is_empty());
}

#[test]
fn stock_report_skips_future_batches() {
    let engine = Engine::new();
    let vet = Identity::user("vet-1", "Vet");
    for (name, received) in [("A", day(2024, 1, 3)), ("B", day(2024, 3, 3))] {
        let batch = NewBatch::new(name, Jati::Cow, "HF", SemenType::Conventional, 10);
        engine.stock().receive(vet.scope(), batch.on(received)).unwrap();
    }

    let report = engine.stock_report(&vet, month(2024, 2));

    assert_eq!(report.len(), 1);
    assert_eq!(report[0].name, "A");
    assert_eq!(report[0].previous_stock, 10);
    assert_eq!(report[0].closing_balance, 10);
}
