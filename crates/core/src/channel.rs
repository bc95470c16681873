// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel and message variants.
//!
//! A direct channel has exactly two members and immutable membership; the
//! store keys it by the sorted member pair so creating it twice (in either
//! member order) finds the existing channel. Messages are immutable and
//! undeletable once committed.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Direct,
    Group,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Direct => "direct",
            ChannelKind::Group => "group",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access rules for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPermissions {
    /// "public" or "private".
    #[serde(default = "default_visibility")]
    pub visibility: String,
    /// "open", "invite", or "closed".
    #[serde(default = "default_join_policy")]
    pub join_policy: String,
    /// Who may change membership: "anyone", "members", or "nobody".
    #[serde(default = "default_modify_members")]
    pub modify_members: String,
}

fn default_visibility() -> String {
    "public".to_string()
}

fn default_join_policy() -> String {
    "open".to_string()
}

fn default_modify_members() -> String {
    "members".to_string()
}

impl Default for ChannelPermissions {
    fn default() -> Self {
        Self {
            visibility: default_visibility(),
            join_policy: default_join_policy(),
            modify_members: default_modify_members(),
        }
    }
}

/// Channel payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub channel_type: ChannelKind,
    /// Member entity ids, insertion-ordered, no duplicates.
    pub members: Vec<String>,
    #[serde(default)]
    pub permissions: ChannelPermissions,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ChannelData {
    pub fn direct(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            name: None,
            channel_type: ChannelKind::Direct,
            members: vec![a.into(), b.into()],
            permissions: ChannelPermissions::default(),
            metadata: Map::new(),
        }
    }

    pub fn group(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            channel_type: ChannelKind::Group,
            members,
            permissions: ChannelPermissions::default(),
            metadata: Map::new(),
        }
    }

    /// Canonical identity of a direct channel: the sorted member pair.
    pub fn direct_key(&self) -> Option<(String, String)> {
        if self.channel_type != ChannelKind::Direct || self.members.len() != 2 {
            return None;
        }
        let mut pair = [self.members[0].clone(), self.members[1].clone()];
        pair.sort();
        let [a, b] = pair;
        Some((a, b))
    }

    pub fn has_member(&self, entity: &str) -> bool {
        self.members.iter().any(|m| m == entity)
    }
}

/// Message payload. Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub channel_id: ElementId,
    pub sender: String,
    /// Document holding the message body.
    pub content_ref: ElementId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<ElementId>,
    /// Parent message when this is a thread reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl MessageData {
    pub fn new(channel_id: ElementId, sender: impl Into<String>, content_ref: ElementId) -> Self {
        Self {
            channel_id,
            sender: sender.into(),
            content_ref,
            attachments: Vec::new(),
            thread_id: None,
            metadata: Map::new(),
        }
    }

    pub fn in_thread(mut self, parent: ElementId) -> Self {
        self.thread_id = Some(parent);
        self
    }

    /// Automated dispatch notifications set this to skip inbox routing.
    pub fn suppress_inbox(&self) -> bool {
        self.metadata
            .get("suppress_inbox")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
