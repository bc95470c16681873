// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foreman-storage: the single-writer element store.
//!
//! One SQLite database holds elements, tags, dependencies, the event
//! journal, document versions, the blocked-state cache, and inbox items.
//! Every mutation commits its journal event in the same transaction; the
//! blocked cache is recomputed after commit so it never reflects uncommitted
//! state.

mod blocked;
mod db;
#[cfg(test)]
pub(crate) mod test_helpers;
mod deps;
mod documents;
mod elements;
mod inbox;
mod journal;
mod query;
mod schema;
mod transfer;

pub use blocked::BlockedEntry;
pub use deps::{DepTree, NewDependency};
pub use elements::{DeleteOptions, UpdateOptions};
pub use inbox::{extract_mentions, InboxItem, InboxSource};
pub use journal::EventFilter;
pub use query::{ElementFilter, Hydrated, OrderDir, OrderField, Page};
pub use transfer::{ConflictStrategy, ImportOptions, ImportResult};

use db::Database;
use foreman_core::{Clock, IdGen, StoreError, SystemClock, UuidIdGen};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// The element store. Cheap to share behind an `Arc`; all methods take
/// `&self` and serialise writes internally.
pub struct Store<C: Clock = SystemClock, G: IdGen = UuidIdGen> {
    db: Database,
    clock: C,
    ids: G,
    rebuild_flagged: AtomicBool,
}

impl Store<SystemClock, UuidIdGen> {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, SystemClock, UuidIdGen)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::in_memory_with(SystemClock, UuidIdGen)
    }
}

impl<C: Clock, G: IdGen> Store<C, G> {
    pub fn open_with(path: &Path, clock: C, ids: G) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open(path)?,
            clock,
            ids,
            rebuild_flagged: AtomicBool::new(false),
        })
    }

    pub fn in_memory_with(clock: C, ids: G) -> Result<Self, StoreError> {
        Ok(Self {
            db: Database::open_in_memory()?,
            clock,
            ids,
            rebuild_flagged: AtomicBool::new(false),
        })
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// True when a cache maintenance failure was downgraded to a warning and
    /// a full rebuild is pending. [`Store::maintain`] clears it.
    pub fn rebuild_flagged(&self) -> bool {
        self.rebuild_flagged.load(Ordering::SeqCst)
    }

    pub(crate) fn flag_rebuild(&self) {
        self.rebuild_flagged.store(true, Ordering::SeqCst);
    }

    /// Run pending maintenance: a flagged blocked-cache rebuild.
    pub fn maintain(&self) -> Result<(), StoreError> {
        if self.rebuild_flagged.swap(false, Ordering::SeqCst) {
            self.rebuild_blocked_cache()?;
        }
        Ok(())
    }

    /// Allocate the next hierarchical child number for a parent id.
    pub fn next_child_number(&self, parent: &str) -> Result<u64, StoreError> {
        self.db.with_tx(|tx| db::next_child_number(tx, parent))
    }

    /// Drain the dirty set: element ids mutated since the last drain.
    /// Consumed by external search indexers.
    pub fn take_dirty(&self) -> Result<Vec<foreman_core::ElementId>, StoreError> {
        self.db.take_dirty()
    }

    /// Operational counters plus the database file size.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        self.db.stats()
    }
}

/// Store-wide counters for operational introspection.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub elements_by_kind: Vec<(String, u64)>,
    pub events: u64,
    pub dependencies: u64,
    pub blocked: u64,
    pub inbox_items: u64,
    pub file_size: u64,
}
