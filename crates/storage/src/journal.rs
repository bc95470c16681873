// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event journal.
//!
//! Events are written inside the transaction of the mutation they describe,
//! so the journal's autoincrement sequence matches commit order. Folding a
//! single element's events in ascending order reconstructs it at any past
//! timestamp.

use crate::db::db_err;
use crate::Store;
use foreman_core::{Clock, ElementId, EventKind, EventRecord, IdGen, StoreError};
use rusqlite::{Row, Transaction};
use serde_json::{Map, Value};

/// Query shape for journal reads.
#[derive(Debug, Default, Clone)]
pub struct EventFilter {
    pub element_id: Option<ElementId>,
    pub kind: Option<EventKind>,
    pub actor: Option<String>,
    pub after: Option<u64>,
    pub before: Option<u64>,
    pub ascending: bool,
    pub limit: Option<u64>,
}

impl EventFilter {
    pub fn for_element(id: impl Into<ElementId>) -> Self {
        Self {
            element_id: Some(id.into()),
            ascending: true,
            ..Default::default()
        }
    }
}

/// Append one journal row inside the caller's transaction.
pub(crate) fn append_event(
    tx: &Transaction,
    element_id: &str,
    kind: EventKind,
    actor: &str,
    old_value: Option<&Value>,
    new_value: Option<&Value>,
    at: u64,
) -> Result<u64, StoreError> {
    let old = old_value.map(|v| v.to_string());
    let new = new_value.map(|v| v.to_string());
    tx.execute(
        "INSERT INTO events (element_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![element_id, kind.as_str(), actor, old, new, at],
    )
    .map_err(db_err)?;
    Ok(tx.last_insert_rowid() as u64)
}

fn row_to_event(row: &Row) -> Result<EventRecord, rusqlite::Error> {
    let kind_str: String = row.get(3)?;
    let kind = EventKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown event type {kind_str}").into(),
        )
    })?;
    let old: Option<String> = row.get(4)?;
    let new: Option<String> = row.get(5)?;
    Ok(EventRecord {
        seq: row.get(0)?,
        element_id: ElementId::new(row.get::<_, String>(1)?),
        actor: row.get(2)?,
        kind,
        old_value: old.and_then(|s| serde_json::from_str(&s).ok()),
        new_value: new.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(6)?,
    })
}

const EVENT_COLUMNS: &str = "seq, element_id, actor, event_type, old_value, new_value, created_at";

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Events for one element in sequence order.
    pub fn events_for(
        &self,
        id: &ElementId,
        ascending: bool,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.events(EventFilter {
            element_id: Some(id.clone()),
            ascending,
            ..Default::default()
        })
    }

    /// General journal query: by element, type, actor, time window.
    pub fn events(&self, filter: EventFilter) -> Result<Vec<EventRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<rusqlite::types::Value> = Vec::new();

            if let Some(id) = &filter.element_id {
                clauses.push(format!("element_id = ?{}", params.len() + 1));
                params.push(id.to_string().into());
            }
            if let Some(kind) = filter.kind {
                clauses.push(format!("event_type = ?{}", params.len() + 1));
                params.push(kind.to_string().into());
            }
            if let Some(actor) = &filter.actor {
                clauses.push(format!("actor = ?{}", params.len() + 1));
                params.push(actor.to_string().into());
            }
            if let Some(after) = filter.after {
                clauses.push(format!("created_at >= ?{}", params.len() + 1));
                params.push((after as i64).into());
            }
            if let Some(before) = filter.before {
                clauses.push(format!("created_at <= ?{}", params.len() + 1));
                params.push((before as i64).into());
            }

            let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events");
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(if filter.ascending {
                " ORDER BY seq ASC"
            } else {
                " ORDER BY seq DESC"
            });
            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }

            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let events = stmt
                .query_map(rusqlite::params_from_iter(params), row_to_event)
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(events)
        })
    }

    /// Reconstruct an element's flat JSON snapshot as of `at`.
    ///
    /// Folds `new_value` diffs over the `created` snapshot, stopping after
    /// the last event with `created_at <= at`. Absent when the element was
    /// created after `at` or deleted before it.
    pub fn reconstruct_at(
        &self,
        id: &ElementId,
        at: u64,
    ) -> Result<Option<Value>, StoreError> {
        let events = self.events_for(id, true)?;
        let mut snapshot: Option<Map<String, Value>> = None;

        for event in events {
            if event.created_at > at {
                break;
            }
            match event.kind {
                EventKind::Created => {
                    if let Some(Value::Object(full)) = event.new_value {
                        snapshot = Some(full);
                    }
                }
                EventKind::Deleted => {
                    snapshot = None;
                }
                _ => {
                    if let (Some(acc), Some(Value::Object(diff))) =
                        (snapshot.as_mut(), event.new_value)
                    {
                        for (k, v) in diff {
                            acc.insert(k, v);
                        }
                        acc.insert("updated_at".into(), Value::from(event.created_at));
                    }
                }
            }
        }

        Ok(snapshot.map(Value::Object))
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
