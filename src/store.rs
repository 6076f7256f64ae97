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

//! Document store backing the ledger.
//!
//! Every record type lives in its own [`Collection`], a concurrent map of
//! versioned documents keyed by id. Collections support point reads,
//! filtered/ordered/limited queries, per-document atomic updates and change
//! subscription.
//!
//! # Thread Safety
//!
//! [`Collection::update`] runs its closure while holding the shard lock of
//! the target document, so a read-modify-write of a shared counter (a
//! book's `current`, a batch's `doses`) cannot interleave with another
//! writer. The closure must not touch the same collection.

use crate::breeding::{BreedingRecord, CalvingEvent, Treatment};
use crate::error::LedgerError;
use crate::receipt::ReceiptBook;
use crate::stock::{BullBatch, StockDebit};
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::debug;

/// A record stored in a [`Collection`].
pub trait Document: Clone + fmt::Debug + Send + Sync + 'static {
    type Id: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Collection name, used in errors and logs.
    const COLLECTION: &'static str;

    fn id(&self) -> Self::Id;
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T: Document> {
    Created(T),
    Updated(T),
    Deleted(T::Id),
}

#[derive(Debug, Clone)]
struct Versioned<T> {
    version: u64,
    doc: T,
}

/// Filter, order and limit applied to a collection scan.
pub struct Query<'a, T> {
    filters: Vec<Box<dyn Fn(&T) -> bool + 'a>>,
    order: Option<Box<dyn Fn(&T, &T) -> Ordering + 'a>>,
    limit: Option<usize>,
}

impl<'a, T> Query<'a, T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Adds a predicate. All predicates must hold.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'a) -> Self {
        self.filters.push(Box::new(predicate));
        self
    }

    pub fn order_by(mut self, compare: impl Fn(&T, &T) -> Ordering + 'a) -> Self {
        self.order = Some(Box::new(compare));
        self
    }

    /// Orders by `key`, largest first.
    pub fn order_by_desc<K: Ord>(self, key: impl Fn(&T) -> K + 'a) -> Self {
        self.order_by(move |a, b| key(b).cmp(&key(a)))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, doc: &T) -> bool {
        self.filters.iter().all(|predicate| predicate(doc))
    }
}

impl<T> Default for Query<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A concurrent collection of versioned documents.
pub struct Collection<T: Document> {
    docs: DashMap<T::Id, Versioned<T>>,
    watchers: Mutex<Vec<Sender<Change<T>>>>,
    read_only: AtomicBool,
}

impl<T: Document> Collection<T> {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
            watchers: Mutex::new(Vec::new()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Creates a document.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateDocument`] if the id is taken,
    /// [`LedgerError::ReadOnly`] if writes are disabled.
    pub fn insert(&self, doc: T) -> Result<(), LedgerError> {
        self.ensure_writable()?;
        let id = doc.id();

        // Entry API gives an atomic check-and-insert
        match self.docs.entry(id) {
            Entry::Occupied(_) => {
                return Err(LedgerError::DuplicateDocument {
                    collection: T::COLLECTION,
                    id: id.to_string(),
                });
            }
            Entry::Vacant(entry) => {
                entry.insert(Versioned {
                    version: 1,
                    doc: doc.clone(),
                });
            }
        }

        debug!(collection = T::COLLECTION, %id, "document created");
        self.notify(Change::Created(doc));
        Ok(())
    }

    pub fn get(&self, id: &T::Id) -> Option<T> {
        self.docs.get(id).map(|slot| slot.doc.clone())
    }

    /// Number of committed updates, starting at 1 on insert.
    pub fn version(&self, id: &T::Id) -> Option<u64> {
        self.docs.get(id).map(|slot| slot.version)
    }

    /// Applies `mutate` to a draft of the document and commits it only if
    /// the closure returns `Ok`.
    pub fn update<R>(
        &self,
        id: &T::Id,
        mutate: impl FnOnce(&mut T) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        self.ensure_writable()?;

        let (result, updated) = {
            let mut slot = self.docs.get_mut(id).ok_or_else(|| self.not_found(id))?;
            let mut draft = slot.doc.clone();
            let result = mutate(&mut draft)?;
            slot.doc = draft.clone();
            slot.version += 1;
            (result, draft)
        };

        self.notify(Change::Updated(updated));
        Ok(result)
    }

    /// Deletes a document, returning it.
    pub fn remove(&self, id: &T::Id) -> Result<T, LedgerError> {
        self.ensure_writable()?;
        let (_, slot) = self.docs.remove(id).ok_or_else(|| self.not_found(id))?;
        debug!(collection = T::COLLECTION, %id, "document deleted");
        self.notify(Change::Deleted(*id));
        Ok(slot.doc)
    }

    pub fn query(&self, query: &Query<'_, T>) -> Vec<T> {
        let mut matches: Vec<T> = self
            .docs
            .iter()
            .filter(|slot| query.matches(&slot.doc))
            .map(|slot| slot.doc.clone())
            .collect();

        if let Some(order) = &query.order {
            matches.sort_by(|a, b| order(a, b));
        }
        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        matches
    }

    /// First match of `query` after ordering.
    pub fn first(&self, query: Query<'_, T>) -> Option<T> {
        self.query(&query.limit(1)).into_iter().next()
    }

    pub fn all(&self) -> Vec<T> {
        self.docs.iter().map(|slot| slot.doc.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Live change feed. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<Change<T>> {
        let (tx, rx) = channel::unbounded();
        self.watchers.lock().push(tx);
        rx
    }

    /// Rejects every write with [`LedgerError::ReadOnly`] while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, AtomicOrdering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(AtomicOrdering::SeqCst)
    }

    fn ensure_writable(&self) -> Result<(), LedgerError> {
        if self.is_read_only() {
            return Err(LedgerError::ReadOnly(T::COLLECTION));
        }
        Ok(())
    }

    fn not_found(&self, id: &T::Id) -> LedgerError {
        LedgerError::DocumentNotFound {
            collection: T::COLLECTION,
            id: id.to_string(),
        }
    }

    fn notify(&self, change: Change<T>) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl<T: Document> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &T::COLLECTION)
            .field("len", &self.docs.len())
            .finish()
    }
}

/// All collections of one ledger.
#[derive(Debug, Default)]
pub struct LedgerStore {
    breeding: Collection<BreedingRecord>,
    bulls: Collection<BullBatch>,
    stock_debits: Collection<StockDebit>,
    receipt_books: Collection<ReceiptBook>,
    treatments: Collection<Treatment>,
    calvings: Collection<CalvingEvent>,
}

/// Serializable copy of a whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub breeding: Vec<BreedingRecord>,
    pub bulls: Vec<BullBatch>,
    pub stock_debits: Vec<StockDebit>,
    pub receipt_books: Vec<ReceiptBook>,
    pub treatments: Vec<Treatment>,
    pub calvings: Vec<CalvingEvent>,
}

impl LedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breeding(&self) -> &Collection<BreedingRecord> {
        &self.breeding
    }

    pub fn bulls(&self) -> &Collection<BullBatch> {
        &self.bulls
    }

    pub fn stock_debits(&self) -> &Collection<StockDebit> {
        &self.stock_debits
    }

    pub fn receipt_books(&self) -> &Collection<ReceiptBook> {
        &self.receipt_books
    }

    pub fn treatments(&self) -> &Collection<Treatment> {
        &self.treatments
    }

    pub fn calvings(&self) -> &Collection<CalvingEvent> {
        &self.calvings
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            breeding: self.breeding.all(),
            bulls: self.bulls.all(),
            stock_debits: self.stock_debits.all(),
            receipt_books: self.receipt_books.all(),
            treatments: self.treatments.all(),
            calvings: self.calvings.all(),
        }
    }

    /// Rebuilds a store from a snapshot.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateDocument`] if the snapshot repeats an id.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self, LedgerError> {
        let store = Self::new();
        load(&store.breeding, snapshot.breeding)?;
        load(&store.bulls, snapshot.bulls)?;
        load(&store.stock_debits, snapshot.stock_debits)?;
        load(&store.receipt_books, snapshot.receipt_books)?;
        load(&store.treatments, snapshot.treatments)?;
        load(&store.calvings, snapshot.calvings)?;
        Ok(store)
    }
}

fn load<T: Document>(collection: &Collection<T>, docs: Vec<T>) -> Result<(), LedgerError> {
    docs.into_iter().try_for_each(|doc| collection.insert(doc))
}
