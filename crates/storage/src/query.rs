// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filtered listings over elements.
//!
//! Variant-specific fields are reached through `json_extract`; tags are
//! batch-fetched after the row scan so listings never run one query per
//! element. Corrupt rows are skipped, logged, and reported through the
//! page's `errors` side-channel.

use crate::db::db_err;
use crate::Store;
use foreman_core::{
    ChannelKind, Clock, Element, ElementData, ElementId, ElementKind, IdGen, StoreError,
};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Sortable fields. JSON-extracted fields sort by their payload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Id,
    Kind,
    Priority,
    Status,
    ScheduledFor,
    Deadline,
    Title,
}

impl OrderField {
    fn sql(&self) -> &'static str {
        match self {
            OrderField::CreatedAt => "e.created_at",
            OrderField::UpdatedAt => "e.updated_at",
            OrderField::Id => "e.id",
            OrderField::Kind => "e.type",
            OrderField::Priority => "json_extract(e.data, '$.priority')",
            OrderField::Status => "json_extract(e.data, '$.status')",
            OrderField::ScheduledFor => "json_extract(e.data, '$.scheduled_for')",
            OrderField::Deadline => "json_extract(e.data, '$.deadline')",
            OrderField::Title => "json_extract(e.data, '$.title')",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDir {
    Asc,
    #[default]
    Desc,
}

impl OrderDir {
    fn sql(&self) -> &'static str {
        match self {
            OrderDir::Asc => "ASC",
            OrderDir::Desc => "DESC",
        }
    }
}

/// Listing filter. Defaults select everything live, newest first.
#[derive(Debug, Clone, Default)]
pub struct ElementFilter {
    pub kind: Option<ElementKind>,
    /// Every listed tag must be present.
    pub tags_all: Vec<String>,
    /// At least one listed tag must be present.
    pub tags_any: Vec<String>,
    pub created_by: Option<String>,
    pub created_after: Option<u64>,
    pub created_before: Option<u64>,
    pub updated_after: Option<u64>,
    pub updated_before: Option<u64>,
    pub include_deleted: bool,
    /// Lifecycle status wire strings (task/plan/workflow/document).
    pub statuses: Vec<String>,
    pub assignee: Option<String>,
    pub owner: Option<String>,
    pub task_type: Option<String>,
    pub priority: Option<u8>,
    pub priority_at_most: Option<u8>,
    pub complexity: Option<u8>,
    /// Document category.
    pub category: Option<String>,
    /// Document version.
    pub version: Option<u32>,
    /// Message channel.
    pub channel_id: Option<ElementId>,
    pub sender: Option<String>,
    pub thread_id: Option<ElementId>,
    pub has_attachments: Option<bool>,
    pub channel_kind: Option<ChannelKind>,
    /// Channel or team member.
    pub member: Option<String>,
    pub visibility: Option<String>,
    /// Exact payload name (entity/team/library).
    pub name: Option<String>,
    /// `$.metadata.<key> = <value>` equality pairs.
    pub metadata: Vec<(String, String)>,
    pub order_by: OrderField,
    pub order: OrderDir,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ElementFilter {
    pub fn of_kind(kind: ElementKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.statuses.push(status.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }
}

/// One page of a listing. `errors` reports rows skipped as corrupt.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Element>,
    pub total: u64,
    pub errors: Vec<String>,
}

/// An element with its `*_ref` document content resolved.
#[derive(Debug, Clone)]
pub struct Hydrated {
    pub element: Element,
    pub content: Option<String>,
}

fn build_where(filter: &ElementFilter) -> (String, Vec<rusqlite::types::Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<rusqlite::types::Value> = Vec::new();

    let bind = |params: &mut Vec<rusqlite::types::Value>, v: rusqlite::types::Value| {
        params.push(v);
        params.len()
    };

    if !filter.include_deleted {
        clauses.push("e.deleted_at IS NULL".into());
    }
    if let Some(kind) = filter.kind {
        let n = bind(&mut params, kind.to_string().into());
        clauses.push(format!("e.type = ?{n}"));
    }
    if let Some(creator) = &filter.created_by {
        let n = bind(&mut params, creator.to_string().into());
        clauses.push(format!("e.created_by = ?{n}"));
    }
    if let Some(t) = filter.created_after {
        let n = bind(&mut params, (t as i64).into());
        clauses.push(format!("e.created_at >= ?{n}"));
    }
    if let Some(t) = filter.created_before {
        let n = bind(&mut params, (t as i64).into());
        clauses.push(format!("e.created_at <= ?{n}"));
    }
    if let Some(t) = filter.updated_after {
        let n = bind(&mut params, (t as i64).into());
        clauses.push(format!("e.updated_at >= ?{n}"));
    }
    if let Some(t) = filter.updated_before {
        let n = bind(&mut params, (t as i64).into());
        clauses.push(format!("e.updated_at <= ?{n}"));
    }
    if !filter.statuses.is_empty() {
        let list = filter
            .statuses
            .iter()
            .map(|s| {
                let n = bind(&mut params, s.to_string().into());
                format!("?{n}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!("json_extract(e.data, '$.status') IN ({list})"));
    }
    if let Some(assignee) = &filter.assignee {
        let n = bind(&mut params, assignee.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.assignee') = ?{n}"));
    }
    if let Some(owner) = &filter.owner {
        let n = bind(&mut params, owner.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.owner') = ?{n}"));
    }
    if let Some(task_type) = &filter.task_type {
        let n = bind(&mut params, task_type.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.task_type') = ?{n}"));
    }
    if let Some(priority) = filter.priority {
        let n = bind(&mut params, (priority as i64).into());
        clauses.push(format!("json_extract(e.data, '$.priority') = ?{n}"));
    }
    if let Some(max) = filter.priority_at_most {
        let n = bind(&mut params, (max as i64).into());
        clauses.push(format!("json_extract(e.data, '$.priority') <= ?{n}"));
    }
    if let Some(complexity) = filter.complexity {
        let n = bind(&mut params, (complexity as i64).into());
        clauses.push(format!("json_extract(e.data, '$.complexity') = ?{n}"));
    }
    if let Some(category) = &filter.category {
        let n = bind(&mut params, category.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.category') = ?{n}"));
    }
    if let Some(version) = filter.version {
        let n = bind(&mut params, (version as i64).into());
        clauses.push(format!("json_extract(e.data, '$.version') = ?{n}"));
    }
    if let Some(channel) = &filter.channel_id {
        let n = bind(&mut params, channel.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.channel_id') = ?{n}"));
    }
    if let Some(sender) = &filter.sender {
        let n = bind(&mut params, sender.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.sender') = ?{n}"));
    }
    if let Some(thread) = &filter.thread_id {
        let n = bind(&mut params, thread.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.thread_id') = ?{n}"));
    }
    if let Some(has) = filter.has_attachments {
        if has {
            clauses.push(
                "json_array_length(json_extract(e.data, '$.attachments')) > 0".into(),
            );
        } else {
            clauses.push(
                "COALESCE(json_array_length(json_extract(e.data, '$.attachments')), 0) = 0"
                    .into(),
            );
        }
    }
    if let Some(kind) = filter.channel_kind {
        let n = bind(&mut params, kind.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.channel_type') = ?{n}"));
    }
    if let Some(member) = &filter.member {
        let n = bind(&mut params, member.to_string().into());
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(json_extract(e.data, '$.members')) je \
             WHERE je.value = ?{n})"
        ));
    }
    if let Some(visibility) = &filter.visibility {
        let n = bind(&mut params, visibility.to_string().into());
        clauses.push(format!(
            "json_extract(e.data, '$.permissions.visibility') = ?{n}"
        ));
    }
    if let Some(name) = &filter.name {
        let n = bind(&mut params, name.to_string().into());
        clauses.push(format!("json_extract(e.data, '$.name') = ?{n}"));
    }
    for (key, value) in &filter.metadata {
        // Key is embedded in the JSON path, so restrict it to a safe charset.
        let safe: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let n = bind(&mut params, value.to_string().into());
        clauses.push(format!(
            "json_extract(e.data, '$.metadata.{safe}') = ?{n}"
        ));
    }
    for tag in &filter.tags_all {
        let n = bind(&mut params, tag.to_string().into());
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM tags t WHERE t.element_id = e.id AND t.tag = ?{n})"
        ));
    }
    if !filter.tags_any.is_empty() {
        let list = filter
            .tags_any
            .iter()
            .map(|t| {
                let n = bind(&mut params, t.to_string().into());
                format!("?{n}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM tags t WHERE t.element_id = e.id AND t.tag IN ({list}))"
        ));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

struct RawRow {
    id: String,
    data: String,
    content_hash: String,
    created_at: u64,
    updated_at: u64,
    created_by: String,
    deleted_at: Option<u64>,
}

fn scan_rows(
    conn: &Connection,
    filter: &ElementFilter,
    where_sql: &str,
    params: &[rusqlite::types::Value],
) -> Result<Vec<RawRow>, StoreError> {
    let mut sql = format!(
        "SELECT e.id, e.data, e.content_hash, e.created_at, e.updated_at, e.created_by, \
         e.deleted_at FROM elements e{where_sql}"
    );
    sql.push_str(&format!(
        " ORDER BY {} {}, e.id ASC",
        filter.order_by.sql(),
        filter.order.sql()
    ));
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = filter.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    } else if let Some(offset) = filter.offset {
        sql.push_str(&format!(" LIMIT -1 OFFSET {offset}"));
    }

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(RawRow {
                id: row.get(0)?,
                data: row.get(1)?,
                content_hash: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                created_by: row.get(5)?,
                deleted_at: row.get(6)?,
            })
        })
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(rows)
}

/// Fetch tags for a batch of ids in one query.
fn tags_for(
    conn: &Connection,
    ids: &[String],
) -> Result<HashMap<String, BTreeSet<String>>, StoreError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let placeholders = (1..=ids.len())
        .map(|n| format!("?{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql =
        format!("SELECT element_id, tag FROM tags WHERE element_id IN ({placeholders})");
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let mut map: HashMap<String, BTreeSet<String>> = HashMap::new();
    let rows = stmt
        .query_map(
            rusqlite::params_from_iter(ids.iter()),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    for (id, tag) in rows {
        map.entry(id).or_default().insert(tag);
    }
    Ok(map)
}

fn assemble(
    rows: Vec<RawRow>,
    tags: &mut HashMap<String, BTreeSet<String>>,
    errors: &mut Vec<String>,
) -> Vec<Element> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let data: ElementData = match serde_json::from_str(&row.data) {
            Ok(data) => data,
            Err(e) => {
                warn!(id = %row.id, error = %e, "skipping corrupt element row");
                errors.push(format!("corrupt element row {}: {e}", row.id));
                continue;
            }
        };
        items.push(Element {
            id: ElementId::new(row.id.clone()),
            data,
            tags: tags.remove(&row.id).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            deleted_at: row.deleted_at,
            content_hash: row.content_hash,
        });
    }
    items
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// List elements matching a filter. Corrupt rows are skipped and logged.
    pub fn list(&self, filter: &ElementFilter) -> Result<Vec<Element>, StoreError> {
        self.db.with_conn(|conn| {
            let (where_sql, params) = build_where(filter);
            let rows = scan_rows(conn, filter, &where_sql, &params)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut tags = tags_for(conn, &ids)?;
            let mut errors = Vec::new();
            Ok(assemble(rows, &mut tags, &mut errors))
        })
    }

    /// Paginated listing with a total count and explicit corrupt-row errors.
    pub fn list_paginated(&self, filter: &ElementFilter) -> Result<Page, StoreError> {
        self.db.with_conn(|conn| {
            let (where_sql, params) = build_where(filter);

            let count_sql = format!("SELECT COUNT(*) FROM elements e{where_sql}");
            let total: u64 = conn
                .query_row(
                    &count_sql,
                    rusqlite::params_from_iter(params.iter()),
                    |row| row.get(0),
                )
                .map_err(db_err)?;

            let rows = scan_rows(conn, filter, &where_sql, &params)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut tags = tags_for(conn, &ids)?;
            let mut errors = Vec::new();
            let items = assemble(rows, &mut tags, &mut errors);
            Ok(Page {
                items,
                total,
                errors,
            })
        })
    }

    /// Resolve each element's `*_ref` document content in one batched query.
    pub fn hydrate(&self, elements: Vec<Element>) -> Result<Vec<Hydrated>, StoreError> {
        let mut refs: Vec<String> = Vec::new();
        for element in &elements {
            if let Some(doc_ref) = element_content_ref(element) {
                if !refs.contains(&doc_ref.as_str().to_string()) {
                    refs.push(doc_ref.as_str().to_string());
                }
            }
        }

        let contents: HashMap<String, String> = if refs.is_empty() {
            HashMap::new()
        } else {
            self.db.with_conn(|conn| {
                let placeholders = (1..=refs.len())
                    .map(|n| format!("?{n}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT id, json_extract(data, '$.content') FROM elements
                     WHERE id IN ({placeholders}) AND type = 'document'"
                );
                let mut stmt = conn.prepare(&sql).map_err(db_err)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(refs.iter()), |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                    })
                    .map_err(db_err)?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(db_err)?;
                Ok(rows
                    .into_iter()
                    .filter_map(|(id, content)| content.map(|c| (id, c)))
                    .collect())
            })?
        };

        Ok(elements
            .into_iter()
            .map(|element| {
                let content = element_content_ref(&element)
                    .and_then(|r| contents.get(r.as_str()).cloned());
                Hydrated { element, content }
            })
            .collect())
    }
}

fn element_content_ref(element: &Element) -> Option<&ElementId> {
    match &element.data {
        ElementData::Task(t) => t.description_ref.as_ref(),
        ElementData::Message(m) => Some(&m.content_ref),
        ElementData::Library(l) => l.description_ref.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
