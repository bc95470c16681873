// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbox items and the mention router.
//!
//! Routing runs inside the message-creating transaction, after the `created`
//! event: direct channels notify the other member, `@name` mentions notify
//! the named entities (with a `mentions` dependency as the audit trail), and
//! thread replies notify the parent sender. `suppress_inbox` skips the
//! router entirely; the thread `replies-to` dependency is wired regardless.

use crate::db::db_err;
use crate::elements::load_element;
use crate::journal::append_event;
use crate::Store;
use foreman_core::{
    ChannelKind, Clock, Element, ElementId, EventKind, IdGen, MessageData, StoreError,
};
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an inbox item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxSource {
    Direct,
    Mention,
    ThreadReply,
    Handoff,
}

impl InboxSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxSource::Direct => "direct",
            InboxSource::Mention => "mention",
            InboxSource::ThreadReply => "thread_reply",
            InboxSource::Handoff => "handoff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(InboxSource::Direct),
            "mention" => Some(InboxSource::Mention),
            "thread_reply" => Some(InboxSource::ThreadReply),
            "handoff" => Some(InboxSource::Handoff),
            _ => None,
        }
    }
}

impl fmt::Display for InboxSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One inbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    pub id: i64,
    pub recipient_id: String,
    pub message_id: ElementId,
    pub channel_id: ElementId,
    pub source: InboxSource,
    pub created_at: u64,
    pub acked_at: Option<u64>,
}

/// Pull `@name` tokens out of message content. A name is a run of
/// alphanumerics, underscores, or dashes; duplicates collapse to one.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut chars = content.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '@' {
            continue;
        }
        // A mention must not be glued to a preceding word (e.g. emails).
        if i > 0 {
            if let Some(prev) = content[..i].chars().next_back() {
                if prev.is_alphanumeric() {
                    continue;
                }
            }
        }
        let mut name = String::new();
        while let Some((_, nc)) = chars.peek() {
            if nc.is_alphanumeric() || *nc == '_' || *nc == '-' {
                name.push(*nc);
                chars.next();
            } else {
                break;
            }
        }
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn entity_by_name(conn: &Connection, name: &str) -> Result<Option<Element>, StoreError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM elements
             WHERE type = 'entity' AND deleted_at IS NULL
               AND json_extract(data, '$.name') = ?1
             LIMIT 1",
            [name],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;
    match id {
        Some(id) => load_element(conn, &id),
        None => Ok(None),
    }
}

pub(crate) fn insert_inbox_item(
    tx: &Transaction,
    recipient: &str,
    message_id: &str,
    channel_id: &str,
    source: InboxSource,
    at: u64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO inbox_items
             (recipient_id, message_id, channel_id, source_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![recipient, message_id, channel_id, source.as_str(), at],
    )
    .map_err(db_err)?;
    Ok(())
}

impl<C: Clock, G: IdGen> Store<C, G> {
    /// Message-create side effects: thread dependency, mention extraction,
    /// inbox routing. Runs inside the creating transaction, after the
    /// `created` event.
    pub(crate) fn wire_message(
        &self,
        tx: &Transaction,
        element: &Element,
        msg: &MessageData,
        now: u64,
    ) -> Result<(), StoreError> {
        // Thread marker is structural and survives inbox suppression.
        if let Some(parent) = &msg.thread_id {
            tx.execute(
                "INSERT INTO dependencies
                     (blocked_id, blocker_id, type, created_at, created_by, metadata)
                 VALUES (?1, ?2, 'replies-to', ?3, ?4, NULL)",
                rusqlite::params![element.id.as_str(), parent.as_str(), now, msg.sender],
            )
            .map_err(db_err)?;
            append_event(
                tx,
                element.id.as_str(),
                EventKind::DependencyAdded,
                &msg.sender,
                None,
                Some(&serde_json::json!({
                    "blocker": parent.as_str(),
                    "kind": "replies-to",
                })),
                now,
            )?;
        }

        if msg.suppress_inbox() {
            return Ok(());
        }

        let channel = load_element(tx, msg.channel_id.as_str())?
            .ok_or_else(|| StoreError::not_found(&msg.channel_id))?;
        let channel_data = channel
            .as_channel()
            .ok_or_else(|| StoreError::Constraint("message channel mismatch".into()))?;

        // Direct channel: one item for the other member. Group channels get
        // no broadcast items.
        if channel_data.channel_type == ChannelKind::Direct {
            for member in &channel_data.members {
                if member != &msg.sender {
                    insert_inbox_item(
                        tx,
                        member,
                        element.id.as_str(),
                        msg.channel_id.as_str(),
                        InboxSource::Direct,
                        now,
                    )?;
                }
            }
        }

        // Mentions come from the referenced content document.
        let content: Option<String> = tx
            .query_row(
                "SELECT json_extract(data, '$.content') FROM elements
                 WHERE id = ?1 AND type = 'document'",
                [msg.content_ref.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?
            .flatten();
        if let Some(content) = content {
            for name in extract_mentions(&content) {
                let Some(entity) = entity_by_name(tx, &name)? else {
                    continue;
                };
                if entity.id.as_str() == msg.sender {
                    continue;
                }
                tx.execute(
                    "INSERT OR IGNORE INTO dependencies
                         (blocked_id, blocker_id, type, created_at, created_by, metadata)
                     VALUES (?1, ?2, 'mentions', ?3, ?4, NULL)",
                    rusqlite::params![
                        element.id.as_str(),
                        entity.id.as_str(),
                        now,
                        msg.sender
                    ],
                )
                .map_err(db_err)?;
                append_event(
                    tx,
                    element.id.as_str(),
                    EventKind::DependencyAdded,
                    &msg.sender,
                    None,
                    Some(&serde_json::json!({
                        "blocker": entity.id.as_str(),
                        "kind": "mentions",
                    })),
                    now,
                )?;
                insert_inbox_item(
                    tx,
                    entity.id.as_str(),
                    element.id.as_str(),
                    msg.channel_id.as_str(),
                    InboxSource::Mention,
                    now,
                )?;
            }
        }

        // Thread replies notify the parent sender.
        if let Some(parent_id) = &msg.thread_id {
            if let Some(parent) = load_element(tx, parent_id.as_str())? {
                if let Some(parent_msg) = parent.as_message() {
                    if parent_msg.sender != msg.sender {
                        insert_inbox_item(
                            tx,
                            &parent_msg.sender,
                            element.id.as_str(),
                            msg.channel_id.as_str(),
                            InboxSource::ThreadReply,
                            now,
                        )?;
                    }
                }
            }
        }

        Ok(())
    }

    /// An explicit inbox push, used by the handoff service.
    pub fn push_inbox_item(
        &self,
        recipient: &str,
        message_id: &ElementId,
        channel_id: &ElementId,
        source: InboxSource,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.db.with_tx(|tx| {
            insert_inbox_item(
                tx,
                recipient,
                message_id.as_str(),
                channel_id.as_str(),
                source,
                now,
            )
        })
    }

    /// A recipient's inbox, newest first. Acked items are excluded unless
    /// requested.
    pub fn inbox_for(
        &self,
        recipient: &str,
        include_acked: bool,
        limit: Option<u64>,
    ) -> Result<Vec<InboxItem>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, recipient_id, message_id, channel_id, source_type, created_at, \
                 acked_at FROM inbox_items WHERE recipient_id = ?1",
            );
            if !include_acked {
                sql.push_str(" AND acked_at IS NULL");
            }
            sql.push_str(" ORDER BY created_at DESC, id DESC");
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            let mut stmt = conn.prepare(&sql).map_err(db_err)?;
            let items = stmt
                .query_map([recipient], |row| {
                    let source_str: String = row.get(4)?;
                    Ok(InboxItem {
                        id: row.get(0)?,
                        recipient_id: row.get(1)?,
                        message_id: ElementId::new(row.get::<_, String>(2)?),
                        channel_id: ElementId::new(row.get::<_, String>(3)?),
                        source: InboxSource::parse(&source_str)
                            .unwrap_or(InboxSource::Direct),
                        created_at: row.get(5)?,
                        acked_at: row.get(6)?,
                    })
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            Ok(items)
        })
    }

    /// Mark an inbox item handled.
    pub fn ack_inbox_item(&self, item_id: i64) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.db.with_tx(|tx| {
            let updated = tx
                .execute(
                    "UPDATE inbox_items SET acked_at = ?2 WHERE id = ?1 AND acked_at IS NULL",
                    rusqlite::params![item_id, now],
                )
                .map_err(db_err)?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("inbox item {item_id}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "inbox_tests.rs"]
mod tests;
