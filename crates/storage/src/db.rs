// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection handling and the transactional primitives the rest of the
//! store is built on.
//!
//! A single mutex-guarded connection serialises all writes; reads share it.
//! Transactions never cross a suspension point (the whole crate is
//! synchronous), so the lock is held only for the duration of one closure.

use crate::schema::{FTS_SCHEMA, SCHEMA};
use crate::StoreStats;
use foreman_core::{ElementId, StoreError};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Map an engine error into the store taxonomy.
pub(crate) fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

pub(crate) struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    fts_enabled: bool,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create dir: {e}")))?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let fts_enabled = Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_owned()),
            fts_enabled,
        })
    }

    pub(crate) fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let fts_enabled = Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
            fts_enabled,
        })
    }

    fn init(conn: &Connection) -> Result<bool, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        // FTS is optional: some sqlite builds ship without the fts5 module.
        let fts_enabled = match conn.execute_batch(FTS_SCHEMA) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "documents_fts unavailable, full-text search disabled");
                false
            }
        };
        Ok(fts_enabled)
    }

    pub(crate) fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    /// Run a read-only closure against the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a closure inside a writable transaction. Commit on `Ok`, roll
    /// back on `Err`.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                // Dropping the transaction rolls it back.
                Err(e)
            }
        }
    }

    pub(crate) fn take_dirty(&self) -> Result<Vec<ElementId>, StoreError> {
        self.with_tx(|tx| {
            let mut stmt = tx
                .prepare("SELECT element_id FROM dirty ORDER BY marked_at")
                .map_err(db_err)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            tx.execute("DELETE FROM dirty", []).map_err(db_err)?;
            Ok(ids.into_iter().map(ElementId::new).collect())
        })
    }

    pub(crate) fn stats(&self) -> Result<StoreStats, StoreError> {
        let file_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT type, COUNT(*) FROM elements GROUP BY type ORDER BY type")
                .map_err(db_err)?;
            let elements_by_kind = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;

            let count = |sql: &str| -> Result<u64, StoreError> {
                conn.query_row(sql, [], |row| row.get(0)).map_err(db_err)
            };

            Ok(StoreStats {
                elements_by_kind,
                events: count("SELECT COUNT(*) FROM events")?,
                dependencies: count("SELECT COUNT(*) FROM dependencies")?,
                blocked: count("SELECT COUNT(*) FROM blocked_cache")?,
                inbox_items: count("SELECT COUNT(*) FROM inbox_items")?,
                file_size,
            })
        })
    }
}

/// Allocate the next child number for a parent, starting at 1. Runs inside
/// the caller's transaction so the sequence is gapless.
pub(crate) fn next_child_number(tx: &Transaction, parent: &str) -> Result<u64, StoreError> {
    tx.execute(
        "INSERT INTO child_counters (parent_id, next_child) VALUES (?1, 1)
         ON CONFLICT(parent_id) DO UPDATE SET next_child = next_child + 1",
        [parent],
    )
    .map_err(db_err)?;
    tx.query_row(
        "SELECT next_child FROM child_counters WHERE parent_id = ?1",
        [parent],
        |row| row.get(0),
    )
    .map_err(db_err)
}

/// Record that an element changed since the last indexer drain.
pub(crate) fn mark_dirty(tx: &Transaction, id: &str, at: u64) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO dirty (element_id, marked_at) VALUES (?1, ?2)
         ON CONFLICT(element_id) DO UPDATE SET marked_at = ?2",
        rusqlite::params![id, at],
    )
    .map_err(db_err)?;
    Ok(())
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
