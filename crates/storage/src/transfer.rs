// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON import/export.
//!
//! Element lines are full flat element snapshots (`id` + `type` present);
//! dependency lines carry `blockedId`/`blockerId`. An overwrite import onto
//! a fresh store reproduces the element and dependency set exactly; the
//! journal records import events rather than the original history.

use crate::db::{db_err, mark_dirty};
use crate::journal::append_event;
use crate::Store;
use foreman_core::{Clock, Element, EventKind, IdGen, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do when an imported element already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictStrategy {
    #[default]
    Skip,
    Overwrite,
}

/// Options for [`Store::import_ndjson`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub conflict_strategy: ConflictStrategy,
    pub actor: Option<String>,
}

/// Import outcome. Per-line failures collect in `errors` without aborting
/// the rest of the stream.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub elements_imported: usize,
    pub dependencies_imported: usize,
    pub conflicts: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyLine {
    blocked_id: String,
    blocker_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    #[serde(default)]
    created_at: u64,
    #[serde(default)]
    created_by: String,
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Serialise every element (tombstones included) and every dependency,
    /// one JSON object per line.
    pub fn export_ndjson(&self) -> Result<String, StoreError> {
        let mut out = String::new();

        let elements = self.list(&crate::ElementFilter {
            include_deleted: true,
            order_by: crate::OrderField::CreatedAt,
            order: crate::OrderDir::Asc,
            ..Default::default()
        })?;
        for element in &elements {
            out.push_str(&serde_json::to_string(element)?);
            out.push('\n');
        }

        let deps = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT blocked_id, blocker_id, type, created_at, created_by, metadata
                     FROM dependencies ORDER BY created_at, blocked_id, blocker_id",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map([], |row| {
                    let metadata: Option<String> = row.get(5)?;
                    Ok(DependencyLine {
                        blocked_id: row.get(0)?,
                        blocker_id: row.get(1)?,
                        kind: row.get(2)?,
                        created_at: row.get(3)?,
                        created_by: row.get(4)?,
                        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
                    })
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(rows)
        })?;
        for dep in &deps {
            out.push_str(&serde_json::to_string(dep)?);
            out.push('\n');
        }

        Ok(out)
    }

    /// Import an NDJSON stream produced by [`Store::export_ndjson`] (or a
    /// compatible producer). Rebuilds the blocked cache afterwards.
    pub fn import_ndjson(
        &self,
        data: &str,
        opts: ImportOptions,
    ) -> Result<ImportResult, StoreError> {
        let mut result = ImportResult::default();
        let actor = opts.actor.clone().unwrap_or_else(|| "import".to_string());

        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    result.errors.push(format!("line {}: {e}", line_no + 1));
                    continue;
                }
            };

            if value.get("blockedId").is_some() && value.get("blockerId").is_some() {
                match serde_json::from_value::<DependencyLine>(value) {
                    Ok(dep) => self.import_dependency(dep, &opts, &mut result),
                    Err(e) => result.errors.push(format!("line {}: {e}", line_no + 1)),
                }
            } else if value.get("id").is_some() && value.get("type").is_some() {
                match serde_json::from_value::<Element>(value) {
                    Ok(element) => self.import_element(element, &actor, &opts, &mut result),
                    Err(e) => result.errors.push(format!("line {}: {e}", line_no + 1)),
                }
            } else {
                result
                    .errors
                    .push(format!("line {}: neither element nor dependency", line_no + 1));
            }
        }

        if !opts.dry_run {
            self.rebuild_blocked_cache()?;
        }
        Ok(result)
    }

    fn import_element(
        &self,
        element: Element,
        actor: &str,
        opts: &ImportOptions,
        result: &mut ImportResult,
    ) {
        let now = self.clock.epoch_ms();
        let outcome = self.db.with_tx(|tx| {
            let exists: bool = tx
                .query_row(
                    "SELECT COUNT(*) FROM elements WHERE id = ?1",
                    [element.id.as_str()],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(db_err)?
                > 0;

            if exists {
                match opts.conflict_strategy {
                    ConflictStrategy::Skip => return Ok(Some(element.id.to_string())),
                    ConflictStrategy::Overwrite => {}
                }
            }
            if opts.dry_run {
                return Ok(if exists {
                    Some(element.id.to_string())
                } else {
                    None
                });
            }

            tx.execute(
                "INSERT INTO elements
                     (id, type, data, content_hash, created_at, updated_at, created_by, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     data = ?3, content_hash = ?4, created_at = ?5, updated_at = ?6,
                     created_by = ?7, deleted_at = ?8",
                rusqlite::params![
                    element.id.as_str(),
                    element.kind().as_str(),
                    serde_json::to_string(&element.data)?,
                    element.content_hash,
                    element.created_at,
                    element.updated_at,
                    element.created_by,
                    element.deleted_at,
                ],
            )
            .map_err(db_err)?;

            tx.execute("DELETE FROM tags WHERE element_id = ?1", [element.id.as_str()])
                .map_err(db_err)?;
            for tag in &element.tags {
                tx.execute(
                    "INSERT INTO tags (element_id, tag) VALUES (?1, ?2)",
                    rusqlite::params![element.id.as_str(), tag],
                )
                .map_err(db_err)?;
            }

            append_event(
                tx,
                element.id.as_str(),
                if exists {
                    EventKind::Updated
                } else {
                    EventKind::Created
                },
                actor,
                None,
                Some(&crate::elements::element_snapshot(&element)),
                now,
            )?;
            mark_dirty(tx, element.id.as_str(), now)?;
            Ok(if exists {
                Some(element.id.to_string())
            } else {
                None
            })
        });

        match outcome {
            Ok(Some(conflicted)) => {
                result.conflicts.push(conflicted);
                if opts.conflict_strategy == ConflictStrategy::Overwrite && !opts.dry_run {
                    result.elements_imported += 1;
                }
            }
            Ok(None) => result.elements_imported += 1,
            Err(e) => result.errors.push(e.to_string()),
        }
    }

    fn import_dependency(
        &self,
        dep: DependencyLine,
        opts: &ImportOptions,
        result: &mut ImportResult,
    ) {
        if opts.dry_run {
            result.dependencies_imported += 1;
            return;
        }
        let outcome = self.db.with_tx(|tx| {
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO dependencies
                         (blocked_id, blocker_id, type, created_at, created_by, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        dep.blocked_id,
                        dep.blocker_id,
                        dep.kind,
                        dep.created_at,
                        dep.created_by,
                        dep.metadata.as_ref().map(|m| m.to_string()),
                    ],
                )
                .map_err(db_err)?;
            Ok(inserted > 0)
        });
        match outcome {
            Ok(true) => result.dependencies_imported += 1,
            Ok(false) => result.conflicts.push(format!(
                "dependency ({}, {}, {})",
                dep.blocked_id, dep.blocker_id, dep.kind
            )),
            Err(e) => result.errors.push(e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
