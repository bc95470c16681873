// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed dependency graph.
//!
//! Edges are unique `(blocked, blocker, kind)` triples. Additions in a
//! cycle-checked class run a BFS from the blocker over same-class out-edges
//! to reject cycles before they exist; the blocked cache therefore never has
//! to defend against same-class loops.

use crate::db::db_err;
use crate::elements::load_element;
use crate::journal::append_event;
use crate::Store;
use foreman_core::{
    Clock, Dependency, DependencyKind, ElementId, ElementKind, EventKind, IdGen, StoreError,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};

/// Input for [`Store::add_dependency`].
#[derive(Debug, Clone)]
pub struct NewDependency {
    pub blocked: ElementId,
    pub blocker: ElementId,
    pub kind: DependencyKind,
    pub metadata: Option<Value>,
    pub actor: String,
}

impl NewDependency {
    pub fn new(
        blocked: impl Into<ElementId>,
        blocker: impl Into<ElementId>,
        kind: DependencyKind,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            blocked: blocked.into(),
            blocker: blocker.into(),
            kind,
            metadata: None,
            actor: actor.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One node of [`Store::dependency_tree`].
#[derive(Debug, Clone)]
pub struct DepTree {
    pub id: ElementId,
    /// Edge kind that led here; `None` at the root.
    pub kind: Option<DependencyKind>,
    pub children: Vec<DepTree>,
    /// True when the walk stopped here (depth limit or revisit).
    pub truncated: bool,
}

/// Depth bound for tree walks.
const TREE_DEPTH_LIMIT: usize = 10;

fn row_to_dependency(row: &Row) -> Result<Dependency, rusqlite::Error> {
    let kind_str: String = row.get(2)?;
    let kind = DependencyKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown dependency type {kind_str}").into(),
        )
    })?;
    let metadata: Option<String> = row.get(5)?;
    Ok(Dependency {
        blocked: ElementId::new(row.get::<_, String>(0)?),
        blocker: ElementId::new(row.get::<_, String>(1)?),
        kind,
        created_at: row.get(3)?,
        created_by: row.get(4)?,
        metadata: metadata.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

const DEP_COLUMNS: &str = "blocked_id, blocker_id, type, created_at, created_by, metadata";

fn kind_list_sql(kinds: &[DependencyKind]) -> String {
    kinds
        .iter()
        .map(|k| format!("'{}'", k.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn dependencies_of_conn(
    conn: &Connection,
    id: &str,
    kinds: Option<&[DependencyKind]>,
) -> Result<Vec<Dependency>, StoreError> {
    let mut sql = format!("SELECT {DEP_COLUMNS} FROM dependencies WHERE blocked_id = ?1");
    if let Some(kinds) = kinds {
        sql.push_str(&format!(" AND type IN ({})", kind_list_sql(kinds)));
    }
    sql.push_str(" ORDER BY created_at, blocker_id");
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let deps = stmt
        .query_map([id], row_to_dependency)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(deps)
}

pub(crate) fn dependents_of_conn(
    conn: &Connection,
    id: &str,
    kinds: Option<&[DependencyKind]>,
) -> Result<Vec<Dependency>, StoreError> {
    let mut sql = format!("SELECT {DEP_COLUMNS} FROM dependencies WHERE blocker_id = ?1");
    if let Some(kinds) = kinds {
        sql.push_str(&format!(" AND type IN ({})", kind_list_sql(kinds)));
    }
    sql.push_str(" ORDER BY created_at, blocked_id");
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let deps = stmt
        .query_map([id], row_to_dependency)
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(deps)
}

/// BFS from `start` over same-kind out-edges looking for `needle`.
fn reaches(
    conn: &Connection,
    start: &str,
    needle: &str,
    kind: DependencyKind,
) -> Result<bool, StoreError> {
    let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(current) = queue.pop_front() {
        if current == needle {
            return Ok(true);
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        for dep in dependencies_of_conn(conn, &current, Some(&[kind]))? {
            queue.push_back(dep.blocker.as_str().to_string());
        }
    }
    Ok(false)
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Add a typed edge. Rejects duplicates, same-class cycles, second
    /// parents, and containers that do not accept children.
    pub fn add_dependency(&self, new: NewDependency) -> Result<Dependency, StoreError> {
        let now = self.clock.epoch_ms();

        let dep = self.db.with_tx(|tx| {
            let blocked = load_element(tx, new.blocked.as_str())?
                .ok_or_else(|| StoreError::not_found(&new.blocked))?;
            let blocker = load_element(tx, new.blocker.as_str())?
                .ok_or_else(|| StoreError::not_found(&new.blocker))?;
            if blocked.is_tombstoned() || blocker.is_tombstoned() {
                return Err(StoreError::Constraint(
                    "cannot depend on a tombstoned element".into(),
                ));
            }
            if new.blocked == new.blocker {
                return Err(StoreError::Constraint(
                    "element cannot depend on itself".into(),
                ));
            }

            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM dependencies
                     WHERE blocked_id = ?1 AND blocker_id = ?2 AND type = ?3",
                    rusqlite::params![
                        new.blocked.as_str(),
                        new.blocker.as_str(),
                        new.kind.as_str()
                    ],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!(
                    "dependency ({}, {}, {}) already exists",
                    new.blocked, new.blocker, new.kind
                )));
            }

            if new.kind == DependencyKind::ParentChild {
                if blocked.kind() != ElementKind::Task {
                    return Err(StoreError::Constraint(
                        "parent-child blocked endpoint must be a task".into(),
                    ));
                }
                match &blocker.data {
                    foreman_core::ElementData::Plan(p) => {
                        if !p.status.accepts_tasks() {
                            return Err(StoreError::Constraint(format!(
                                "plan {} is {} and does not accept tasks",
                                new.blocker, p.status
                            )));
                        }
                    }
                    foreman_core::ElementData::Workflow(_) => {}
                    _ => {
                        return Err(StoreError::Constraint(
                            "parent-child blocker must be a plan or workflow".into(),
                        ))
                    }
                }
                let existing_parent = dependencies_of_conn(
                    tx,
                    new.blocked.as_str(),
                    Some(&[DependencyKind::ParentChild]),
                )?;
                if !existing_parent.is_empty() {
                    return Err(StoreError::Conflict(format!(
                        "task {} already has a parent",
                        new.blocked
                    )));
                }
            }

            if new.kind.is_cycle_checked()
                && reaches(tx, new.blocker.as_str(), new.blocked.as_str(), new.kind)?
            {
                return Err(StoreError::Constraint(format!(
                    "adding ({}, {}, {}) would create a cycle",
                    new.blocked, new.blocker, new.kind
                )));
            }

            tx.execute(
                "INSERT INTO dependencies
                     (blocked_id, blocker_id, type, created_at, created_by, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.blocked.as_str(),
                    new.blocker.as_str(),
                    new.kind.as_str(),
                    now,
                    new.actor,
                    new.metadata.as_ref().map(|m| m.to_string()),
                ],
            )
            .map_err(db_err)?;

            append_event(
                tx,
                new.blocked.as_str(),
                EventKind::DependencyAdded,
                &new.actor,
                None,
                Some(&serde_json::json!({
                    "blocker": new.blocker.as_str(),
                    "kind": new.kind.as_str(),
                })),
                now,
            )?;

            Ok(Dependency {
                blocked: new.blocked.clone(),
                blocker: new.blocker.clone(),
                kind: new.kind,
                created_at: now,
                created_by: new.actor.clone(),
                metadata: new.metadata.clone(),
            })
        })?;

        if dep.kind.is_blocking() {
            self.invalidate_blocked(std::slice::from_ref(&dep.blocked));
        }
        Ok(dep)
    }

    /// Remove an edge and reassess the blocked endpoint.
    pub fn remove_dependency(
        &self,
        blocked: &ElementId,
        blocker: &ElementId,
        kind: DependencyKind,
        actor: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();

        self.db.with_tx(|tx| {
            let removed = tx
                .execute(
                    "DELETE FROM dependencies
                     WHERE blocked_id = ?1 AND blocker_id = ?2 AND type = ?3",
                    rusqlite::params![blocked.as_str(), blocker.as_str(), kind.as_str()],
                )
                .map_err(db_err)?;
            if removed == 0 {
                return Err(StoreError::NotFound(format!(
                    "dependency ({blocked}, {blocker}, {kind})"
                )));
            }
            append_event(
                tx,
                blocked.as_str(),
                EventKind::DependencyRemoved,
                actor,
                Some(&serde_json::json!({
                    "blocker": blocker.as_str(),
                    "kind": kind.as_str(),
                })),
                None,
                now,
            )?;
            Ok(())
        })?;

        if kind.is_blocking() {
            self.invalidate_blocked(std::slice::from_ref(blocked));
        }
        Ok(())
    }

    /// Outgoing edges: what `id` depends on.
    pub fn dependencies_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<Dependency>, StoreError> {
        self.db
            .with_conn(|conn| dependencies_of_conn(conn, id.as_str(), kinds))
    }

    /// Incoming edges: what depends on `id`.
    pub fn dependents_of(
        &self,
        id: &ElementId,
        kinds: Option<&[DependencyKind]>,
    ) -> Result<Vec<Dependency>, StoreError> {
        self.db
            .with_conn(|conn| dependents_of_conn(conn, id.as_str(), kinds))
    }

    /// The blocker tree under `id`, bounded to depth 10 with revisit
    /// protection.
    pub fn dependency_tree(&self, id: &ElementId) -> Result<DepTree, StoreError> {
        self.db.with_conn(|conn| {
            let mut visited = HashSet::new();
            build_tree(conn, id, None, 0, &mut visited)
        })
    }
}

fn build_tree(
    conn: &Connection,
    id: &ElementId,
    kind: Option<DependencyKind>,
    depth: usize,
    visited: &mut HashSet<String>,
) -> Result<DepTree, StoreError> {
    if depth >= TREE_DEPTH_LIMIT || !visited.insert(id.as_str().to_string()) {
        return Ok(DepTree {
            id: id.clone(),
            kind,
            children: Vec::new(),
            truncated: true,
        });
    }
    let mut children = Vec::new();
    for dep in dependencies_of_conn(conn, id.as_str(), None)? {
        children.push(build_tree(
            conn,
            &dep.blocker,
            Some(dep.kind),
            depth + 1,
            visited,
        )?);
    }
    Ok(DepTree {
        id: id.clone(),
        kind,
        children,
        truncated: false,
    })
}

#[cfg(test)]
#[path = "deps_tests.rs"]
mod tests;
