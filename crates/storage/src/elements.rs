// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Element CRUD with per-variant validation.
//!
//! Each mutation runs in one transaction and writes exactly one primary
//! journal event (plus member/dependency events where those occur). Blocked
//! cache recomputation happens after commit, never inside the transaction.

use crate::db::{db_err, mark_dirty};
use crate::journal::append_event;
use crate::Store;
use foreman_core::{
    ChannelKind, Clock, Element, ElementData, ElementId, ElementKind, EventKind, IdGen,
    NewElement, StoreError, TaskStatus,
};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Options for [`Store::update`].
#[derive(Debug, Default, Clone)]
pub struct UpdateOptions {
    pub actor: Option<String>,
    /// Optimistic concurrency: fail with a conflict when the stored
    /// `updated_at` no longer matches.
    pub expected_updated_at: Option<u64>,
}

/// Options for [`Store::delete`].
#[derive(Debug, Default, Clone)]
pub struct DeleteOptions {
    pub actor: Option<String>,
    pub reason: Option<String>,
}

/// Header and payload fields that are never writable through a patch.
const PROTECTED_KEYS: &[&str] = &[
    "id",
    "type",
    "created_at",
    "created_by",
    "content_hash",
    "deleted_at",
    "version",
];

pub(crate) fn load_element(
    conn: &Connection,
    id: &str,
) -> Result<Option<Element>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, data, content_hash, created_at, updated_at, created_by, deleted_at
             FROM elements WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u64>(3)?,
                    row.get::<_, u64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<u64>>(6)?,
                ))
            },
        )
        .optional()
        .map_err(db_err)?;

    let Some((id, data, content_hash, created_at, updated_at, created_by, deleted_at)) = row
    else {
        return Ok(None);
    };

    let data: ElementData = serde_json::from_str(&data)
        .map_err(|e| StoreError::Storage(format!("corrupt element row {id}: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT tag FROM tags WHERE element_id = ?1")
        .map_err(db_err)?;
    let tags = stmt
        .query_map([&id], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(db_err)?;

    Ok(Some(Element {
        id: ElementId::new(id),
        data,
        tags,
        created_at,
        updated_at,
        created_by,
        deleted_at,
        content_hash,
    }))
}

/// Full flat snapshot used as the `created` event payload.
pub(crate) fn element_snapshot(element: &Element) -> Value {
    serde_json::to_value(element).unwrap_or(Value::Null)
}

fn require_live(conn: &Connection, id: &str) -> Result<Element, StoreError> {
    let element = load_element(conn, id)?.ok_or_else(|| StoreError::not_found(id))?;
    if element.is_tombstoned() {
        return Err(StoreError::not_found(id));
    }
    Ok(element)
}

/// Walk an entity's prospective `reports_to` chain looking for `start`.
fn reports_chain_contains(
    conn: &Connection,
    from: &ElementId,
    start: &str,
) -> Result<bool, StoreError> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut cursor = Some(from.clone());
    while let Some(current) = cursor {
        if current.as_str() == start {
            return Ok(true);
        }
        if !seen.insert(current.as_str().to_string()) {
            // Pre-existing cycle in stored data; treat as containing to be safe.
            return Ok(true);
        }
        let next = load_element(conn, current.as_str())?
            .and_then(|e| e.as_entity().and_then(|d| d.reports_to.clone()));
        cursor = next;
    }
    Ok(false)
}

fn entity_name_taken(
    conn: &Connection,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool, StoreError> {
    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM elements
             WHERE type = 'entity' AND deleted_at IS NULL
               AND json_extract(data, '$.name') = ?1
               AND (?2 IS NULL OR id != ?2)
             LIMIT 1",
            rusqlite::params![name, exclude_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    Ok(taken.is_some())
}

fn find_direct_channel(
    conn: &Connection,
    a: &str,
    b: &str,
) -> Result<Option<Element>, StoreError> {
    let mut key = [a.to_string(), b.to_string()];
    key.sort();
    let mut stmt = conn
        .prepare(
            "SELECT id FROM elements
             WHERE type = 'channel' AND deleted_at IS NULL
               AND json_extract(data, '$.channel_type') = 'direct'",
        )
        .map_err(db_err)?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    for id in ids {
        if let Some(element) = load_element(conn, &id)? {
            if let Some(channel) = element.as_channel() {
                if channel.direct_key() == Some((key[0].clone(), key[1].clone())) {
                    return Ok(Some(element));
                }
            }
        }
    }
    Ok(None)
}

/// Structural validation shared by create and update.
fn validate_data(data: &ElementData) -> Result<(), StoreError> {
    match data {
        ElementData::Task(t) => {
            if t.title.trim().is_empty() {
                return Err(StoreError::Validation("task title is required".into()));
            }
            for (field, value) in [("priority", t.priority), ("complexity", t.complexity)] {
                if !(1..=5).contains(&value) {
                    return Err(StoreError::Validation(format!(
                        "task {field} must be 1..=5, got {value}"
                    )));
                }
            }
        }
        ElementData::Plan(p) => {
            if p.title.trim().is_empty() {
                return Err(StoreError::Validation("plan title is required".into()));
            }
        }
        ElementData::Workflow(w) => {
            if w.title.trim().is_empty() {
                return Err(StoreError::Validation("workflow title is required".into()));
            }
        }
        ElementData::Channel(c) => {
            if c.members.is_empty() {
                return Err(StoreError::Validation("channel needs members".into()));
            }
            let unique: BTreeSet<&String> = c.members.iter().collect();
            if unique.len() != c.members.len() {
                return Err(StoreError::Validation("duplicate channel member".into()));
            }
            if c.channel_type == ChannelKind::Direct && c.members.len() != 2 {
                return Err(StoreError::Validation(
                    "direct channel needs exactly two members".into(),
                ));
            }
        }
        ElementData::Document(d) => {
            if d.version < 1 {
                return Err(StoreError::Validation("document version must be >= 1".into()));
            }
        }
        ElementData::Entity(e) => {
            if e.name.trim().is_empty() {
                return Err(StoreError::Validation("entity name is required".into()));
            }
        }
        ElementData::Team(t) => {
            let unique: BTreeSet<&String> = t.members.iter().collect();
            if unique.len() != t.members.len() {
                return Err(StoreError::Validation("duplicate team member".into()));
            }
        }
        ElementData::Library(l) => {
            if l.name.trim().is_empty() {
                return Err(StoreError::Validation("library name is required".into()));
            }
        }
        ElementData::Message(_) => {}
    }
    Ok(())
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Create an element. Assigns an id when the input carries none.
    ///
    /// Message creation also wires the thread `replies-to` dependency,
    /// extracts mentions from the referenced content document, and routes
    /// inbox items (see the inbox module).
    pub fn create(&self, new: NewElement) -> Result<Element, StoreError> {
        let now = self.clock.epoch_ms();
        let id = new
            .id
            .clone()
            .unwrap_or_else(|| ElementId::new(self.ids.next()));

        let element = Element {
            id: id.clone(),
            content_hash: foreman_core::content_hash(&new.data),
            data: new.data,
            tags: new.tags,
            created_at: now,
            updated_at: now,
            created_by: new.created_by,
            deleted_at: None,
        };

        self.db.with_tx(|tx| {
            if load_element(tx, id.as_str())?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "element {id} already exists"
                )));
            }

            validate_data(&element.data)?;
            self.validate_create_references(tx, &element)?;

            tx.execute(
                "INSERT INTO elements
                     (id, type, data, content_hash, created_at, updated_at, created_by, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)",
                rusqlite::params![
                    element.id.as_str(),
                    element.kind().as_str(),
                    serde_json::to_string(&element.data)?,
                    element.content_hash,
                    element.created_at,
                    element.updated_at,
                    element.created_by,
                ],
            )
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
                EventKind::Created,
                &element.created_by,
                None,
                Some(&element_snapshot(&element)),
                now,
            )?;

            if let ElementData::Message(msg) = &element.data {
                self.wire_message(tx, &element, msg, now)?;
            }

            if let ElementData::Document(doc) = &element.data {
                self.fts_upsert(tx, element.id.as_str(), &doc.content)?;
            }

            mark_dirty(tx, element.id.as_str(), now)?;
            Ok(())
        })?;

        Ok(element)
    }

    /// Validation that needs to look at other rows: uniqueness, referenced
    /// elements being alive, message structural rules.
    fn validate_create_references(
        &self,
        tx: &Transaction,
        element: &Element,
    ) -> Result<(), StoreError> {
        match &element.data {
            ElementData::Entity(e) => {
                if entity_name_taken(tx, &e.name, None)? {
                    return Err(StoreError::Conflict(format!(
                        "entity name {} already in use",
                        e.name
                    )));
                }
                if let Some(manager) = &e.reports_to {
                    let target = require_live(tx, manager.as_str())?;
                    if target.as_entity().is_none() {
                        return Err(StoreError::Constraint(format!(
                            "reports_to {manager} is not an entity"
                        )));
                    }
                }
            }
            ElementData::Channel(c) => {
                if c.channel_type == ChannelKind::Direct {
                    if find_direct_channel(tx, &c.members[0], &c.members[1])?.is_some() {
                        return Err(StoreError::Conflict(format!(
                            "direct channel for ({}, {}) already exists",
                            c.members[0], c.members[1]
                        )));
                    }
                }
            }
            ElementData::Message(m) => {
                let channel = require_live(tx, m.channel_id.as_str())?;
                let channel_data = channel.as_channel().ok_or_else(|| {
                    StoreError::Constraint(format!("{} is not a channel", m.channel_id))
                })?;
                if !channel_data.has_member(&m.sender) {
                    return Err(StoreError::Constraint(format!(
                        "sender {} is not a member of {}",
                        m.sender, m.channel_id
                    )));
                }
                for doc_ref in std::iter::once(&m.content_ref).chain(m.attachments.iter()) {
                    let doc = require_live(tx, doc_ref.as_str())?;
                    if doc.as_document().is_none() {
                        return Err(StoreError::Constraint(format!(
                            "{doc_ref} is not a document"
                        )));
                    }
                }
                if let Some(thread) = &m.thread_id {
                    let parent = require_live(tx, thread.as_str())?;
                    let parent_msg = parent.as_message().ok_or_else(|| {
                        StoreError::Constraint(format!("{thread} is not a message"))
                    })?;
                    if parent_msg.channel_id != m.channel_id {
                        return Err(StoreError::Constraint(
                            "thread parent lives in a different channel".into(),
                        ));
                    }
                }
            }
            ElementData::Task(t) => {
                if let Some(doc_ref) = &t.description_ref {
                    let doc = require_live(tx, doc_ref.as_str())?;
                    if doc.as_document().is_none() {
                        return Err(StoreError::Constraint(format!(
                            "{doc_ref} is not a document"
                        )));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Find the direct channel for a member pair (in either order) or create
    /// it.
    pub fn find_or_create_direct_channel(
        &self,
        a: &str,
        b: &str,
        created_by: &str,
    ) -> Result<Element, StoreError> {
        if a == b {
            return Err(StoreError::Validation(
                "direct channel members must differ".into(),
            ));
        }
        if let Some(existing) = self.db.with_conn(|conn| find_direct_channel(conn, a, b))? {
            return Ok(existing);
        }
        match self.create(NewElement::new(
            ElementData::Channel(foreman_core::ChannelData::direct(a, b)),
            created_by,
        )) {
            Ok(created) => Ok(created),
            // Lost a race with another writer thread; the channel exists now.
            Err(StoreError::Conflict(_)) => self
                .db
                .with_conn(|conn| find_direct_channel(conn, a, b))?
                .ok_or_else(|| StoreError::Storage("direct channel vanished".into())),
            Err(e) => Err(e),
        }
    }

    /// Fetch by id, including tombstoned elements.
    pub fn get(&self, id: &ElementId) -> Result<Option<Element>, StoreError> {
        self.db.with_conn(|conn| load_element(conn, id.as_str()))
    }

    /// Fetch by id or fail with not-found.
    pub fn require(&self, id: &ElementId) -> Result<Element, StoreError> {
        self.get(id)?.ok_or_else(|| StoreError::not_found(id))
    }

    /// Apply a flat JSON patch to an element's payload.
    ///
    /// `tags` replaces the tag set; `metadata` merges key-wise with `null`
    /// deleting a key; any other key overwrites the payload field. Protected
    /// header fields are rejected. Returns the updated element.
    pub fn update(
        &self,
        id: &ElementId,
        patch: Map<String, Value>,
        opts: UpdateOptions,
    ) -> Result<Element, StoreError> {
        let (element, status_changed) = self.update_inner(id, patch, opts)?;
        if status_changed {
            self.invalidate_blocked(std::slice::from_ref(id));
        }
        Ok(element)
    }

    fn update_inner(
        &self,
        id: &ElementId,
        patch: Map<String, Value>,
        opts: UpdateOptions,
    ) -> Result<(Element, bool), StoreError> {
        let now = self.clock.epoch_ms();

        self.db.with_tx(|tx| {
            let old = load_element(tx, id.as_str())?
                .ok_or_else(|| StoreError::not_found(id))?;

            if old.is_tombstoned() {
                return Err(StoreError::Constraint(format!(
                    "{id} is tombstoned and cannot be updated"
                )));
            }
            if old.kind() == ElementKind::Message {
                return Err(StoreError::Constraint("messages are immutable".into()));
            }
            if let Some(expected) = opts.expected_updated_at {
                if expected != old.updated_at {
                    return Err(StoreError::Conflict(format!(
                        "{id} was modified concurrently (expected updated_at {expected}, \
                         found {})",
                        old.updated_at
                    )));
                }
            }
            for key in patch.keys() {
                if PROTECTED_KEYS.contains(&key.as_str()) {
                    return Err(StoreError::Validation(format!(
                        "field {key} cannot be patched"
                    )));
                }
            }

            let actor = opts.actor.clone().unwrap_or_else(|| old.created_by.clone());

            // Split the tag patch off; everything else merges into the payload.
            let mut patch = patch;
            let new_tags: Option<BTreeSet<String>> = match patch.remove("tags") {
                None => None,
                Some(Value::Array(items)) => {
                    let mut set = BTreeSet::new();
                    for item in items {
                        match item {
                            Value::String(s) => {
                                set.insert(s);
                            }
                            other => {
                                return Err(StoreError::Validation(format!(
                                    "tags must be strings, got {other}"
                                )))
                            }
                        }
                    }
                    Some(set)
                }
                Some(other) => {
                    return Err(StoreError::Validation(format!(
                        "tags must be an array, got {other}"
                    )))
                }
            };

            let old_json = match serde_json::to_value(&old.data)? {
                Value::Object(map) => map,
                _ => return Err(StoreError::Storage("payload is not an object".into())),
            };

            if let Some(doc) = old.as_document() {
                let touches_content =
                    patch.contains_key("content") || patch.contains_key("content_type");
                if doc.immutable && touches_content {
                    return Err(StoreError::Constraint(format!(
                        "document {id} is immutable"
                    )));
                }
            }

            let mut new_json = old_json.clone();
            for (key, value) in patch {
                if key == "metadata" {
                    let Value::Object(meta_patch) = value else {
                        return Err(StoreError::Validation(
                            "metadata patch must be an object".into(),
                        ));
                    };
                    let target = new_json
                        .entry("metadata")
                        .or_insert_with(|| Value::Object(Map::new()));
                    let Value::Object(target_map) = target else {
                        return Err(StoreError::Storage("metadata is not an object".into()));
                    };
                    for (mk, mv) in meta_patch {
                        if mv.is_null() {
                            target_map.remove(&mk);
                        } else {
                            target_map.insert(mk, mv);
                        }
                    }
                } else if value.is_null() {
                    new_json.remove(&key);
                } else {
                    new_json.insert(key, value);
                }
            }

            let mut new_data: ElementData =
                serde_json::from_value(Value::Object(new_json.clone()))
                    .map_err(|e| StoreError::Validation(format!("invalid patch: {e}")))?;

            validate_data(&new_data)?;
            self.validate_update_references(tx, &old, &mut new_data, now)?;

            // Re-render after validation may have adjusted derived fields
            // (closed_at, version, finished_at).
            let new_json = match serde_json::to_value(&new_data)? {
                Value::Object(map) => map,
                _ => return Err(StoreError::Storage("payload is not an object".into())),
            };

            // Flat diff over payload keys.
            let mut old_diff = Map::new();
            let mut new_diff = Map::new();
            for key in old_json.keys().chain(new_json.keys()) {
                if old_diff.contains_key(key) || new_diff.contains_key(key) {
                    continue;
                }
                let before = old_json.get(key);
                let after = new_json.get(key);
                if before != after {
                    old_diff.insert(
                        key.clone(),
                        before.cloned().unwrap_or(Value::Null),
                    );
                    new_diff.insert(key.clone(), after.cloned().unwrap_or(Value::Null));
                }
            }

            let tags_changed = new_tags
                .as_ref()
                .map(|t| *t != old.tags)
                .unwrap_or(false);
            if let (true, Some(tags)) = (tags_changed, &new_tags) {
                old_diff.insert(
                    "tags".into(),
                    Value::Array(old.tags.iter().cloned().map(Value::String).collect()),
                );
                new_diff.insert(
                    "tags".into(),
                    Value::Array(tags.iter().cloned().map(Value::String).collect()),
                );
            }

            if old_diff.is_empty() {
                // Nothing changed; no event, no row touch.
                return Ok((old, false));
            }

            let status_changed = old_diff.contains_key("status");
            let kind = if status_changed {
                match (old.data.is_in_closed_set(), new_data.is_in_closed_set()) {
                    (false, true) => EventKind::Closed,
                    (true, false) => EventKind::Reopened,
                    _ => EventKind::Updated,
                }
            } else {
                EventKind::Updated
            };

            let mut updated = Element {
                id: old.id.clone(),
                content_hash: foreman_core::content_hash(&new_data),
                data: new_data,
                tags: new_tags.clone().unwrap_or_else(|| old.tags.clone()),
                created_at: old.created_at,
                updated_at: now,
                created_by: old.created_by.clone(),
                deleted_at: None,
            };
            if updated.updated_at == old.updated_at {
                // Keep the optimistic-concurrency token moving even within
                // one clock tick.
                updated.updated_at = old.updated_at + 1;
            }

            tx.execute(
                "UPDATE elements SET data = ?2, content_hash = ?3, updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![
                    updated.id.as_str(),
                    serde_json::to_string(&updated.data)?,
                    updated.content_hash,
                    updated.updated_at,
                ],
            )
            .map_err(db_err)?;

            if tags_changed {
                tx.execute("DELETE FROM tags WHERE element_id = ?1", [updated.id.as_str()])
                    .map_err(db_err)?;
                for tag in &updated.tags {
                    tx.execute(
                        "INSERT INTO tags (element_id, tag) VALUES (?1, ?2)",
                        rusqlite::params![updated.id.as_str(), tag],
                    )
                    .map_err(db_err)?;
                }
            }

            append_event(
                tx,
                updated.id.as_str(),
                kind,
                &actor,
                Some(&Value::Object(old_diff.clone())),
                Some(&Value::Object(new_diff.clone())),
                now,
            )?;

            self.write_member_events(tx, &old, &updated, &actor, now)?;

            if let (Some(before), Some(after)) = (old.as_document(), updated.as_document()) {
                if before.content != after.content {
                    self.fts_upsert(tx, updated.id.as_str(), &after.content)?;
                }
            }

            mark_dirty(tx, updated.id.as_str(), now)?;
            Ok((updated, status_changed))
        })
    }

    /// Update-time checks that need other rows, plus derived-field upkeep.
    fn validate_update_references(
        &self,
        tx: &Transaction,
        old: &Element,
        new_data: &mut ElementData,
        now: u64,
    ) -> Result<(), StoreError> {
        if old.kind() != new_data.kind() {
            return Err(StoreError::Constraint("element type cannot change".into()));
        }
        match (&old.data, new_data) {
            (ElementData::Entity(before), ElementData::Entity(after)) => {
                if before.name != after.name
                    && entity_name_taken(tx, &after.name, Some(old.id.as_str()))?
                {
                    return Err(StoreError::Conflict(format!(
                        "entity name {} already in use",
                        after.name
                    )));
                }
                if after.reports_to != before.reports_to {
                    if let Some(manager) = &after.reports_to {
                        if manager == &old.id {
                            return Err(StoreError::Constraint(
                                "entity cannot report to itself".into(),
                            ));
                        }
                        let target = require_live(tx, manager.as_str())?;
                        if target.as_entity().is_none() {
                            return Err(StoreError::Constraint(format!(
                                "reports_to {manager} is not an entity"
                            )));
                        }
                        if reports_chain_contains(tx, manager, old.id.as_str())? {
                            return Err(StoreError::Constraint(format!(
                                "reports_to {manager} would create a cycle"
                            )));
                        }
                    }
                }
            }
            (ElementData::Channel(before), ElementData::Channel(after)) => {
                if before.channel_type != after.channel_type {
                    return Err(StoreError::Constraint("channel type cannot change".into()));
                }
                if before.channel_type == ChannelKind::Direct
                    && before.members != after.members
                {
                    return Err(StoreError::Constraint(
                        "direct channel membership is immutable".into(),
                    ));
                }
            }
            (ElementData::Document(before), ElementData::Document(after)) => {
                if after.version != before.version {
                    return Err(StoreError::Validation(
                        "document version is managed by the store".into(),
                    ));
                }
                if before.content != after.content || before.content_type != after.content_type
                {
                    self.snapshot_document_version(tx, old.id.as_str(), before, now)?;
                    after.version = before.version + 1;
                }
            }
            (ElementData::Task(before), ElementData::Task(after)) => {
                if after.status == TaskStatus::Closed && before.status != TaskStatus::Closed {
                    if after.closed_at.is_none() {
                        after.closed_at = Some(now);
                    }
                } else if after.status != TaskStatus::Closed {
                    after.closed_at = None;
                }
            }
            (ElementData::Workflow(before), ElementData::Workflow(after)) => {
                if after.status.is_terminal() && !before.status.is_terminal() {
                    if after.finished_at.is_none() {
                        after.finished_at = Some(now);
                    }
                } else if !after.status.is_terminal() {
                    after.finished_at = None;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Emit member_added/member_removed events for channel and team
    /// membership changes.
    fn write_member_events(
        &self,
        tx: &Transaction,
        old: &Element,
        new: &Element,
        actor: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        let (before, after): (Vec<&String>, Vec<&String>) = match (&old.data, &new.data) {
            (ElementData::Channel(a), ElementData::Channel(b)) => {
                (a.members.iter().collect(), b.members.iter().collect())
            }
            (ElementData::Team(a), ElementData::Team(b)) => {
                (a.members.iter().collect(), b.members.iter().collect())
            }
            _ => return Ok(()),
        };

        for member in after.iter().filter(|m| !before.contains(m)) {
            append_event(
                tx,
                new.id.as_str(),
                EventKind::MemberAdded,
                actor,
                None,
                Some(&serde_json::json!({ "member": member })),
                now,
            )?;
        }
        for member in before.iter().filter(|m| !after.contains(m)) {
            append_event(
                tx,
                new.id.as_str(),
                EventKind::MemberRemoved,
                actor,
                Some(&serde_json::json!({ "member": member })),
                None,
                now,
            )?;
        }
        Ok(())
    }

    /// Soft delete: tombstone the row, hard-cascade its dependency edges,
    /// and reassess everything that depended on it.
    pub fn delete(&self, id: &ElementId, opts: DeleteOptions) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();

        let affected = self.db.with_tx(|tx| {
            let Some(mut element) = load_element(tx, id.as_str())? else {
                return Err(StoreError::not_found(id));
            };
            if element.is_tombstoned() {
                return Ok(Vec::new());
            }
            if element.kind() == ElementKind::Message {
                return Err(StoreError::Constraint(
                    "messages are immutable and cannot be deleted".into(),
                ));
            }

            let actor = opts
                .actor
                .clone()
                .unwrap_or_else(|| element.created_by.clone());

            // Capture neighbours that must be reassessed after the cascade:
            // everything that depended on this element through a blocking edge.
            let mut stmt = tx
                .prepare(
                    "SELECT blocked_id FROM dependencies
                     WHERE blocker_id = ?1
                       AND type IN ('blocks', 'awaits', 'parent-child', 'gate')",
                )
                .map_err(db_err)?;
            let affected: Vec<ElementId> = stmt
                .query_map([id.as_str()], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?
                .into_iter()
                .map(ElementId::new)
                .collect();

            let snapshot = element_snapshot(&element);
            element.tombstone(now);
            element.content_hash = foreman_core::content_hash(&element.data);

            tx.execute(
                "UPDATE elements SET data = ?2, content_hash = ?3, updated_at = ?4,
                        deleted_at = ?4
                 WHERE id = ?1",
                rusqlite::params![
                    id.as_str(),
                    serde_json::to_string(&element.data)?,
                    element.content_hash,
                    now,
                ],
            )
            .map_err(db_err)?;

            tx.execute(
                "DELETE FROM dependencies WHERE blocked_id = ?1 OR blocker_id = ?1",
                [id.as_str()],
            )
            .map_err(db_err)?;

            let mut tombstone_marker = Map::new();
            tombstone_marker.insert("deleted_at".into(), Value::from(now));
            if element.as_task().is_some() {
                tombstone_marker.insert("status".into(), Value::from("tombstone"));
            }
            if let Some(reason) = &opts.reason {
                tombstone_marker.insert("reason".into(), Value::from(reason.clone()));
            }

            append_event(
                tx,
                id.as_str(),
                EventKind::Deleted,
                &actor,
                Some(&snapshot),
                Some(&Value::Object(tombstone_marker)),
                now,
            )?;

            if element.as_document().is_some() {
                tx.execute("DELETE FROM document_versions WHERE id = ?1", [id.as_str()])
                    .map_err(db_err)?;
                self.fts_delete(tx, id.as_str())?;
            }

            mark_dirty(tx, id.as_str(), now)?;
            Ok(affected)
        })?;

        // Outside the transaction: the deleted element leaves the cache and
        // every captured neighbour is reassessed.
        let mut seeds = vec![id.clone()];
        seeds.extend(affected);
        self.invalidate_blocked(&seeds);
        Ok(())
    }
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// The management chain from an entity up to its root, starting with
    /// the entity's direct manager. Cycle-safe; stored cycles end the walk.
    pub fn reports_chain(&self, entity: &ElementId) -> Result<Vec<Element>, StoreError> {
        self.db.with_conn(|conn| {
            let mut chain = Vec::new();
            let mut seen: BTreeSet<String> = BTreeSet::new();
            seen.insert(entity.as_str().to_string());

            let mut cursor = load_element(conn, entity.as_str())?
                .ok_or_else(|| StoreError::not_found(entity))?
                .as_entity()
                .ok_or_else(|| StoreError::Constraint(format!("{entity} is not an entity")))?
                .reports_to
                .clone();

            while let Some(manager_id) = cursor {
                if !seen.insert(manager_id.as_str().to_string()) {
                    break;
                }
                let Some(manager) = load_element(conn, manager_id.as_str())? else {
                    break;
                };
                cursor = manager.as_entity().and_then(|e| e.reports_to.clone());
                chain.push(manager);
            }
            Ok(chain)
        })
    }

    /// Live entities reporting directly to the given entity.
    pub fn direct_reports(&self, entity: &ElementId) -> Result<Vec<Element>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM elements
                     WHERE type = 'entity' AND deleted_at IS NULL
                       AND json_extract(data, '$.reports_to') = ?1
                     ORDER BY id",
                )
                .map_err(db_err)?;
            let ids = stmt
                .query_map([entity.as_str()], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<Result<Vec<String>, _>>()
                .map_err(db_err)?;
            let mut reports = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(element) = load_element(conn, &id)? {
                    reports.push(element);
                }
            }
            Ok(reports)
        })
    }

    /// Hard delete: remove elements and every trace of them, journal rows
    /// included. Only workflow deletion and garbage collection use this;
    /// everything else tombstones.
    pub fn hard_delete(&self, ids: &[ElementId]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        let affected = self.db.with_tx(|tx| {
            let mut affected: Vec<ElementId> = Vec::new();
            for id in ids {
                let mut stmt = tx
                    .prepare(
                        "SELECT blocked_id FROM dependencies
                         WHERE blocker_id = ?1
                           AND type IN ('blocks', 'awaits', 'parent-child', 'gate')",
                    )
                    .map_err(db_err)?;
                let dependents = stmt
                    .query_map([id.as_str()], |row| row.get::<_, String>(0))
                    .map_err(db_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_err)?;
                for dependent in dependents {
                    let dependent = ElementId::new(dependent);
                    if !ids.contains(&dependent) && !affected.contains(&dependent) {
                        affected.push(dependent);
                    }
                }
            }

            for id in ids {
                let id = id.as_str();
                tx.execute("DELETE FROM elements WHERE id = ?1", [id])
                    .map_err(db_err)?;
                tx.execute("DELETE FROM tags WHERE element_id = ?1", [id])
                    .map_err(db_err)?;
                tx.execute(
                    "DELETE FROM dependencies WHERE blocked_id = ?1 OR blocker_id = ?1",
                    [id],
                )
                .map_err(db_err)?;
                tx.execute("DELETE FROM events WHERE element_id = ?1", [id])
                    .map_err(db_err)?;
                tx.execute("DELETE FROM document_versions WHERE id = ?1", [id])
                    .map_err(db_err)?;
                tx.execute("DELETE FROM blocked_cache WHERE element_id = ?1", [id])
                    .map_err(db_err)?;
                tx.execute("DELETE FROM inbox_items WHERE message_id = ?1", [id])
                    .map_err(db_err)?;
                self.fts_delete(tx, id)?;
            }
            Ok(affected)
        })?;

        self.invalidate_blocked(&affected);
        Ok(())
    }
}

#[cfg(test)]
#[path = "elements_tests.rs"]
mod tests;
