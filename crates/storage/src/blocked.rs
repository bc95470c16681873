// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The blocked-state cache: a materialised answer to "is X blocked right
//! now, and by what?".
//!
//! Entries are recomputed from scratch after every triggering commit (status
//! change, edge add/remove, soft delete, gate change) and propagated to
//! transitive dependents by BFS. A full rebuild runs the same per-element
//! computation over every candidate, so incremental maintenance and rebuild
//! always agree.
//!
//! Cache maintenance never fails the user path: errors downgrade to warnings
//! and flag a rebuild.

use crate::db::db_err;
use crate::deps::{dependencies_of_conn, dependents_of_conn};
use crate::elements::load_element;
use crate::journal::append_event;
use crate::Store;
use foreman_core::{
    Clock, DependencyKind, ElementData, ElementId, EventKind, GateState, IdGen, StoreError,
    TaskStatus,
};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// One cache row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub element_id: ElementId,
    pub blocked_by: Vec<ElementId>,
    pub reason: Option<String>,
}

const BLOCKING_KINDS: [DependencyKind; 4] = [
    DependencyKind::Blocks,
    DependencyKind::Awaits,
    DependencyKind::ParentChild,
    DependencyKind::Gate,
];

/// Evaluate the blocking rules for one element, fresh from row state.
///
/// `visiting` guards the transitive rule against cross-class cycles: a
/// blocker already on the walk contributes nothing further.
fn compute_blocked(
    conn: &Connection,
    id: &str,
    visiting: &mut HashSet<String>,
) -> Result<Option<(Vec<ElementId>, String)>, StoreError> {
    let Some(element) = load_element(conn, id)? else {
        return Ok(None);
    };
    if element.is_tombstoned() {
        return Ok(None);
    }

    visiting.insert(id.to_string());

    let mut blocked_by: Vec<ElementId> = Vec::new();
    let mut reasons: Vec<String> = Vec::new();
    let mut note = |blocker: &ElementId, reason: String, blocked_by: &mut Vec<ElementId>| {
        if !blocked_by.contains(blocker) {
            blocked_by.push(blocker.clone());
        }
        reasons.push(reason);
    };

    for dep in dependencies_of_conn(conn, id, Some(&BLOCKING_KINDS))? {
        let Some(blocker) = load_element(conn, dep.blocker.as_str())? else {
            continue;
        };
        if blocker.is_tombstoned() {
            continue;
        }

        let mut direct = false;
        match dep.kind {
            DependencyKind::Blocks => {
                if !blocker.data.is_terminal() {
                    let status = blocker.data.status_str().unwrap_or("open");
                    note(
                        &dep.blocker,
                        format!("blocked by {} ({status})", dep.blocker),
                        &mut blocked_by,
                    );
                    direct = true;
                }
            }
            DependencyKind::Awaits => {
                if !blocker.data.is_terminal() {
                    let status = blocker.data.status_str().unwrap_or("open");
                    note(
                        &dep.blocker,
                        format!("awaits {} ({status})", dep.blocker),
                        &mut blocked_by,
                    );
                    direct = true;
                } else {
                    let gate = GateState::from_metadata(dep.metadata.as_ref());
                    if !gate.is_satisfied() {
                        note(
                            &dep.blocker,
                            format!(
                                "awaits approval from {} on {}",
                                gate.pending().join(", "),
                                dep.blocker
                            ),
                            &mut blocked_by,
                        );
                        direct = true;
                    }
                }
            }
            DependencyKind::Gate => {
                let gate = GateState::from_metadata(dep.metadata.as_ref());
                if !gate.is_satisfied() {
                    note(
                        &dep.blocker,
                        format!(
                            "gate {} awaiting approval from {}",
                            dep.blocker,
                            gate.pending().join(", ")
                        ),
                        &mut blocked_by,
                    );
                    direct = true;
                }
            }
            DependencyKind::ParentChild => match &blocker.data {
                ElementData::Plan(p) => {
                    if matches!(p.status, foreman_core::PlanStatus::Draft) {
                        note(
                            &dep.blocker,
                            format!("parent plan {} is draft", dep.blocker),
                            &mut blocked_by,
                        );
                        direct = true;
                    }
                }
                ElementData::Workflow(w) => {
                    if w.status.gates_children() {
                        note(
                            &dep.blocker,
                            format!("parent workflow {} is {}", dep.blocker, w.status),
                            &mut blocked_by,
                        );
                        direct = true;
                    }
                }
                _ => {}
            },
            _ => {}
        }

        // Transitive rule: a blocker that is itself blocked blocks us, even
        // when the edge's own condition is satisfied.
        if !direct && !visiting.contains(dep.blocker.as_str()) {
            if compute_blocked(conn, dep.blocker.as_str(), visiting)?.is_some() {
                note(
                    &dep.blocker,
                    format!("{} is itself blocked", dep.blocker),
                    &mut blocked_by,
                );
            }
        }
    }

    visiting.remove(id);

    if blocked_by.is_empty() {
        Ok(None)
    } else {
        Ok(Some((blocked_by, reasons.join("; "))))
    }
}

fn read_entry(conn: &Connection, id: &str) -> Result<Option<BlockedEntry>, StoreError> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT blocked_by, reason FROM blocked_cache WHERE element_id = ?1",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((blocked_by, reason)) = row else {
        return Ok(None);
    };
    let ids: Vec<String> = serde_json::from_str(&blocked_by)
        .map_err(|e| StoreError::Storage(format!("corrupt blocked_cache row {id}: {e}")))?;
    Ok(Some(BlockedEntry {
        element_id: ElementId::new(id),
        blocked_by: ids.into_iter().map(ElementId::new).collect(),
        reason,
    }))
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// O(1) membership check against the cache.
    pub fn is_blocked(&self, id: &ElementId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let hit: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM blocked_cache WHERE element_id = ?1",
                    [id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            Ok(hit.is_some())
        })
    }

    pub fn blocked_entry(&self, id: &ElementId) -> Result<Option<BlockedEntry>, StoreError> {
        self.db.with_conn(|conn| read_entry(conn, id.as_str()))
    }

    pub fn blocked_entries(&self) -> Result<Vec<BlockedEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT element_id FROM blocked_cache ORDER BY element_id")
                .map_err(db_err)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(db_err)?;
            let mut entries = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(entry) = read_entry(conn, &id)? {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
    }

    /// Recompute the entries for `seeds` and everything transitively
    /// dependent on them. Never fails the caller: errors are logged and a
    /// rebuild is flagged.
    pub(crate) fn invalidate_blocked(&self, seeds: &[ElementId]) {
        if let Err(e) = self.recompute_from(seeds) {
            warn!(error = %e, "blocked cache maintenance failed, flagging rebuild");
            self.flag_rebuild();
        }
    }

    fn recompute_from(&self, seeds: &[ElementId]) -> Result<(), StoreError> {
        let mut queue: VecDeque<(ElementId, bool)> =
            seeds.iter().map(|id| (id.clone(), true)).collect();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some((id, is_seed)) = queue.pop_front() {
            if !visited.insert(id.as_str().to_string()) {
                continue;
            }
            let changed = self.recompute_one(&id)?;

            // A seed's dependents must be reassessed even when the seed's
            // own entry is unchanged: its *status* may be what changed.
            if changed || is_seed {
                let dependents = self.db.with_conn(|conn| {
                    dependents_of_conn(conn, id.as_str(), Some(&BLOCKING_KINDS))
                })?;
                for dep in dependents {
                    queue.push_back((dep.blocked, false));
                }
            }
        }
        Ok(())
    }

    /// Recompute one entry and apply it, coupling task status where the
    /// membership flips. Returns whether the stored entry changed.
    fn recompute_one(&self, id: &ElementId) -> Result<bool, StoreError> {
        let desired = self
            .db
            .with_conn(|conn| compute_blocked(conn, id.as_str(), &mut HashSet::new()))?;
        let now = self.clock.epoch_ms();

        self.db.with_tx(|tx| {
            let existing = read_entry(tx, id.as_str())?;

            match (&existing, &desired) {
                (None, None) => Ok(false),
                (Some(old), Some((blocked_by, reason))) => {
                    let same = old.blocked_by.iter().map(|b| b.as_str()).eq(
                        blocked_by.iter().map(|b| b.as_str()),
                    ) && old.reason.as_deref() == Some(reason.as_str());
                    if same {
                        return Ok(false);
                    }
                    write_row(tx, id.as_str(), blocked_by, reason)?;
                    Ok(true)
                }
                (None, Some((blocked_by, reason))) => {
                    write_row(tx, id.as_str(), blocked_by, reason)?;
                    self.couple_status_on_block(tx, id, now)?;
                    Ok(true)
                }
                (Some(_), None) => {
                    tx.execute(
                        "DELETE FROM blocked_cache WHERE element_id = ?1",
                        [id.as_str()],
                    )
                    .map_err(db_err)?;
                    self.couple_status_on_unblock(tx, id, now)?;
                    Ok(true)
                }
            }
        })
    }

    /// Entering the cache: an open/in-progress task is parked as blocked,
    /// with the prior status recorded in the event payload.
    fn couple_status_on_block(
        &self,
        tx: &rusqlite::Transaction,
        id: &ElementId,
        now: u64,
    ) -> Result<(), StoreError> {
        let Some(mut element) = load_element(tx, id.as_str())? else {
            return Ok(());
        };
        let Some(task) = element.as_task_mut() else {
            return Ok(());
        };
        if !task.status.is_workable() {
            return Ok(());
        }
        let prior = task.status;
        task.status = TaskStatus::Blocked;
        write_status(tx, &mut element, now)?;
        append_event(
            tx,
            id.as_str(),
            EventKind::AutoBlocked,
            "system",
            Some(&serde_json::json!({ "status": prior.as_str() })),
            Some(&serde_json::json!({ "status": "blocked" })),
            now,
        )?;
        Ok(())
    }

    /// Leaving the cache: restore the status recorded by the latest
    /// auto_blocked event. Event-sourced so a cache rebuild cannot lose it.
    fn couple_status_on_unblock(
        &self,
        tx: &rusqlite::Transaction,
        id: &ElementId,
        now: u64,
    ) -> Result<(), StoreError> {
        let Some(mut element) = load_element(tx, id.as_str())? else {
            return Ok(());
        };
        let Some(task) = element.as_task_mut() else {
            return Ok(());
        };
        if task.status != TaskStatus::Blocked {
            return Ok(());
        }

        let prior: Option<String> = tx
            .query_row(
                "SELECT old_value FROM events
                 WHERE element_id = ?1 AND event_type = 'auto_blocked'
                 ORDER BY seq DESC LIMIT 1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let prior = prior
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .and_then(|v| v.get("status").and_then(Value::as_str).map(str::to_string));
        let restored = match prior.as_deref() {
            Some("in_progress") => TaskStatus::InProgress,
            _ => TaskStatus::Open,
        };

        task.status = restored;
        write_status(tx, &mut element, now)?;
        append_event(
            tx,
            id.as_str(),
            EventKind::AutoUnblocked,
            "system",
            Some(&serde_json::json!({ "status": "blocked" })),
            Some(&serde_json::json!({ "status": restored.as_str() })),
            now,
        )?;
        Ok(())
    }

    /// Idempotent full rebuild; yields the same table as incremental
    /// maintenance. Returns the number of blocked entries afterwards.
    pub fn rebuild_blocked_cache(&self) -> Result<usize, StoreError> {
        let candidates: Vec<ElementId> = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT blocked_id FROM dependencies
                     WHERE type IN ('blocks', 'awaits', 'parent-child', 'gate')
                     UNION
                     SELECT element_id FROM blocked_cache",
                )
                .map_err(db_err)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(db_err)?;
            Ok(ids.into_iter().map(ElementId::new).collect())
        })?;

        for id in &candidates {
            self.recompute_one(id)?;
        }

        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM blocked_cache", [], |row| row.get(0))
                .map_err(db_err)
        })
    }

    /// Record an approval on the gate edge `(blocked, blocker)`. Idempotent
    /// per approver. Recomputes the blocked endpoint afterwards.
    pub fn record_approval(
        &self,
        blocked: &ElementId,
        blocker: &ElementId,
        approver: &str,
    ) -> Result<GateState, StoreError> {
        let gate = self.mutate_gate(blocked, blocker, |gate| {
            if gate.approve(approver) {
                Some((
                    EventKind::GateApproved,
                    serde_json::json!({
                        "blocker": blocker.as_str(),
                        "approver": approver,
                    }),
                ))
            } else {
                None
            }
        })?;
        self.invalidate_blocked(std::slice::from_ref(blocked));
        Ok(gate)
    }

    /// Revoke an approval. Idempotent when the approver never approved.
    pub fn remove_approval(
        &self,
        blocked: &ElementId,
        blocker: &ElementId,
        approver: &str,
    ) -> Result<GateState, StoreError> {
        let gate = self.mutate_gate(blocked, blocker, |gate| {
            if gate.revoke(approver) {
                Some((
                    EventKind::GateRevoked,
                    serde_json::json!({
                        "blocker": blocker.as_str(),
                        "approver": approver,
                    }),
                ))
            } else {
                None
            }
        })?;
        self.invalidate_blocked(std::slice::from_ref(blocked));
        Ok(gate)
    }

    /// One-shot gate satisfaction with no per-approver tracking.
    pub fn satisfy_gate(
        &self,
        blocked: &ElementId,
        blocker: &ElementId,
        actor: &str,
    ) -> Result<(), StoreError> {
        self.mutate_gate(blocked, blocker, |gate| {
            if gate.satisfied {
                None
            } else {
                gate.satisfied = true;
                Some((
                    EventKind::GateApproved,
                    serde_json::json!({
                        "blocker": blocker.as_str(),
                        "actor": actor,
                        "satisfied": true,
                    }),
                ))
            }
        })?;
        self.invalidate_blocked(std::slice::from_ref(blocked));
        Ok(())
    }

    fn mutate_gate(
        &self,
        blocked: &ElementId,
        blocker: &ElementId,
        f: impl FnOnce(&mut GateState) -> Option<(EventKind, Value)>,
    ) -> Result<GateState, StoreError> {
        let now = self.clock.epoch_ms();
        self.db.with_tx(|tx| {
            let row: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT type, metadata FROM dependencies
                     WHERE blocked_id = ?1 AND blocker_id = ?2
                       AND type IN ('awaits', 'gate')
                     ORDER BY type LIMIT 1",
                    rusqlite::params![blocked.as_str(), blocker.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_err)?;
            let Some((kind, metadata)) = row else {
                return Err(StoreError::NotFound(format!(
                    "gate dependency ({blocked}, {blocker})"
                )));
            };

            let metadata: Option<Value> =
                metadata.and_then(|s| serde_json::from_str(&s).ok());
            let mut gate = GateState::from_metadata(metadata.as_ref());

            if let Some((event_kind, payload)) = f(&mut gate) {
                let merged = gate.apply_to_metadata(metadata.as_ref());
                tx.execute(
                    "UPDATE dependencies SET metadata = ?4
                     WHERE blocked_id = ?1 AND blocker_id = ?2 AND type = ?3",
                    rusqlite::params![
                        blocked.as_str(),
                        blocker.as_str(),
                        kind,
                        merged.to_string()
                    ],
                )
                .map_err(db_err)?;
                append_event(
                    tx,
                    blocked.as_str(),
                    event_kind,
                    payload
                        .get("approver")
                        .or_else(|| payload.get("actor"))
                        .and_then(Value::as_str)
                        .unwrap_or("system"),
                    None,
                    Some(&payload),
                    now,
                )?;
            }
            Ok(gate)
        })
    }
}

fn write_row(
    tx: &rusqlite::Transaction,
    id: &str,
    blocked_by: &[ElementId],
    reason: &str,
) -> Result<(), StoreError> {
    let ids: Vec<&str> = blocked_by.iter().map(|b| b.as_str()).collect();
    tx.execute(
        "INSERT INTO blocked_cache (element_id, blocked_by, reason)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(element_id) DO UPDATE SET blocked_by = ?2, reason = ?3",
        rusqlite::params![id, serde_json::to_string(&ids)?, reason],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Persist a status flip performed by the cache itself. Bypasses the normal
/// update path so the coupling does not re-enter cache notification.
fn write_status(
    tx: &rusqlite::Transaction,
    element: &mut foreman_core::Element,
    now: u64,
) -> Result<(), StoreError> {
    element.updated_at = now;
    element.content_hash = foreman_core::content_hash(&element.data);
    tx.execute(
        "UPDATE elements SET data = ?2, content_hash = ?3, updated_at = ?4 WHERE id = ?1",
        rusqlite::params![
            element.id.as_str(),
            serde_json::to_string(&element.data)?,
            element.content_hash,
            now,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

#[cfg(test)]
#[path = "blocked_tests.rs"]
mod tests;
