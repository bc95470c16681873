// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQL schema.
//!
//! Variant payloads live in the `data` JSON column; variant-specific filters
//! go through `json_extract`. The FTS table is created separately because
//! some builds lack the fts5 module; the store degrades gracefully without it.

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS elements (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    data TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    deleted_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_elements_type ON elements(type);
CREATE INDEX IF NOT EXISTS idx_elements_created ON elements(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_elements_status
    ON elements(type, json_extract(data, '$.status'));

CREATE TABLE IF NOT EXISTS tags (
    element_id TEXT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (element_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);

CREATE TABLE IF NOT EXISTS dependencies (
    blocked_id TEXT NOT NULL,
    blocker_id TEXT NOT NULL,
    type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    metadata TEXT,
    PRIMARY KEY (blocked_id, blocker_id, type)
);

CREATE INDEX IF NOT EXISTS idx_deps_blocker ON dependencies(blocker_id, type);

CREATE TABLE IF NOT EXISTS events (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    element_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_element ON events(element_id, seq);
CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at);

CREATE TABLE IF NOT EXISTS document_versions (
    id TEXT NOT NULL,
    version INTEGER NOT NULL,
    data TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (id, version)
);

CREATE TABLE IF NOT EXISTS blocked_cache (
    element_id TEXT PRIMARY KEY,
    blocked_by TEXT NOT NULL,
    reason TEXT
);

CREATE TABLE IF NOT EXISTS inbox_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id TEXT NOT NULL,
    message_id TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    acked_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_inbox_recipient
    ON inbox_items(recipient_id, created_at DESC);

CREATE TABLE IF NOT EXISTS child_counters (
    parent_id TEXT PRIMARY KEY,
    next_child INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dirty (
    element_id TEXT PRIMARY KEY,
    marked_at INTEGER NOT NULL
);
"#;

pub(crate) const FTS_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts
    USING fts5(content, element_id UNINDEXED);
"#;
