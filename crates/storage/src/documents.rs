// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document versioning and full-text upkeep.
//!
//! Every content-touching update snapshots the pre-image, so version N of a
//! document is always recoverable: versions 1..current-1 live in
//! `document_versions`, the current one in the element row.

use crate::db::db_err;
use crate::elements::UpdateOptions;
use crate::Store;
use foreman_core::{
    Clock, DocumentData, DocumentVersion, Element, ElementId, IdGen, StoreError,
};
use rusqlite::{OptionalExtension, Transaction};
use serde_json::Map;

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Snapshot the pre-image of a document into the version table. Runs
    /// inside the updating transaction.
    pub(crate) fn snapshot_document_version(
        &self,
        tx: &Transaction,
        id: &str,
        data: &DocumentData,
        now: u64,
    ) -> Result<(), StoreError> {
        tx.execute(
            "INSERT INTO document_versions (id, version, data, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id, version) DO UPDATE SET data = ?3, created_at = ?4",
            rusqlite::params![id, data.version, serde_json::to_string(data)?, now],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) fn fts_upsert(
        &self,
        tx: &Transaction,
        id: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        if !self.db.fts_enabled() {
            return Ok(());
        }
        tx.execute("DELETE FROM documents_fts WHERE element_id = ?1", [id])
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO documents_fts (content, element_id) VALUES (?1, ?2)",
            rusqlite::params![content, id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub(crate) fn fts_delete(&self, tx: &Transaction, id: &str) -> Result<(), StoreError> {
        if !self.db.fts_enabled() {
            return Ok(());
        }
        tx.execute("DELETE FROM documents_fts WHERE element_id = ?1", [id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Historical versions of a document, oldest first. The current version
    /// is the element row itself and is not included.
    pub fn document_versions(
        &self,
        id: &ElementId,
    ) -> Result<Vec<DocumentVersion>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT version, data, created_at FROM document_versions
                     WHERE id = ?1 ORDER BY version",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([id.as_str()], |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u64>(2)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;

            let mut versions = Vec::with_capacity(rows.len());
            for (version, data, created_at) in rows {
                let data: DocumentData = serde_json::from_str(&data).map_err(|e| {
                    StoreError::Storage(format!("corrupt version row {id}@{version}: {e}"))
                })?;
                versions.push(DocumentVersion {
                    id: id.clone(),
                    version,
                    data,
                    created_at,
                });
            }
            Ok(versions)
        })
    }

    /// One historical version, if snapshotted.
    pub fn document_version(
        &self,
        id: &ElementId,
        version: u32,
    ) -> Result<Option<DocumentVersion>, StoreError> {
        self.db.with_conn(|conn| {
            let row: Option<(String, u64)> = conn
                .query_row(
                    "SELECT data, created_at FROM document_versions
                     WHERE id = ?1 AND version = ?2",
                    rusqlite::params![id.as_str(), version],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;
            let Some((data, created_at)) = row else {
                return Ok(None);
            };
            let data: DocumentData = serde_json::from_str(&data).map_err(|e| {
                StoreError::Storage(format!("corrupt version row {id}@{version}: {e}"))
            })?;
            Ok(Some(DocumentVersion {
                id: id.clone(),
                version,
                data,
                created_at,
            }))
        })
    }

    pub fn archive_document(
        &self,
        id: &ElementId,
        actor: &str,
    ) -> Result<Element, StoreError> {
        let mut patch = Map::new();
        patch.insert("status".into(), "archived".into());
        self.update(
            id,
            patch,
            UpdateOptions {
                actor: Some(actor.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn unarchive_document(
        &self,
        id: &ElementId,
        actor: &str,
    ) -> Result<Element, StoreError> {
        let mut patch = Map::new();
        patch.insert("status".into(), "active".into());
        self.update(
            id,
            patch,
            UpdateOptions {
                actor: Some(actor.to_string()),
                ..Default::default()
            },
        )
    }

    /// Full-text match over document content. Errors with `Storage` when the
    /// fts5 module is unavailable in this build.
    pub fn search_documents(&self, needle: &str) -> Result<Vec<ElementId>, StoreError> {
        if !self.db.fts_enabled() {
            return Err(StoreError::Storage("full-text search unavailable".into()));
        }
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT element_id FROM documents_fts WHERE documents_fts MATCH ?1",
                )
                .map_err(db_err)?;
            let ids = stmt
                .query_map([needle], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(db_err)?;
            Ok(ids.into_iter().map(ElementId::new).collect())
        })
    }
}

#[cfg(test)]
#[path = "documents_tests.rs"]
mod tests;
