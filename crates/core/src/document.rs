// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document variant: versioned text content shared by reference.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Active => "active",
            DocumentStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_version() -> u32 {
    1
}

fn default_content_type() -> String {
    "text/markdown".to_string()
}

/// Document payload.
///
/// Content edits snapshot the pre-image into the version table and bump
/// `version`; the sequence is dense and monotonic. Setting `immutable`
/// freezes the content permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Document this one was forked from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub immutable: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DocumentData {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: default_content_type(),
            version: 1,
            previous_version_id: None,
            category: None,
            status: DocumentStatus::Active,
            immutable: false,
            metadata: Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }
}

/// A historical version row: the full payload as it was before the edit that
/// superseded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub id: ElementId,
    pub version: u32,
    pub data: DocumentData,
    pub created_at: u64,
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
