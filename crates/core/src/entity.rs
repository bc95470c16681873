// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity, team, and library variants.
//!
//! Entities are people or agents; their names are globally unique among
//! non-tombstoned entities and the `reports_to` chain must stay acyclic.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entity payload. Agent entities additionally carry session projections in
/// `metadata` (see the session manager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    /// Globally unique among live entities.
    pub name: String,
    /// Manager in the org chart; the chain from any entity reaches a root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_to: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl EntityData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reports_to: None,
            metadata: Map::new(),
        }
    }

    pub fn reporting_to(mut self, manager: ElementId) -> Self {
        self.reports_to = Some(manager);
        self
    }

    /// Convenience accessor for a string-valued metadata key.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Team payload: a named set of member entities. Tasks may be assigned to a
/// team id; the scheduler expands team membership when matching assignees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TeamData {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: Some(name.into()),
            status: None,
            members,
            metadata: Map::new(),
        }
    }

    pub fn has_member(&self, entity: &str) -> bool {
        self.members.iter().any(|m| m == entity)
    }
}

/// Library payload: a named collection of documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl LibraryData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description_ref: None,
            metadata: Map::new(),
        }
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
