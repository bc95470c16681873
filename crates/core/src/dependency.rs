// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed directed edges between elements.
//!
//! An edge `(blocked, blocker, kind)` reads "blocked depends on blocker".
//! The triple is unique. `blocks`, `awaits`, and `parent-child` are the
//! blocking classes the cache and the cycle checker care about; `replies-to`
//! and `mentions` are informational.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Blocker must reach a terminal state first.
    Blocks,
    /// Blocker is the containing plan/workflow.
    ParentChild,
    /// Blocker must be terminal and the gate conditions satisfied.
    Awaits,
    /// Satisfaction depends on approvals alone.
    Gate,
    /// Thread reply marker. Never blocks.
    RepliesTo,
    /// Mention audit trail. Never blocks.
    Mentions,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Blocks => "blocks",
            DependencyKind::ParentChild => "parent-child",
            DependencyKind::Awaits => "awaits",
            DependencyKind::Gate => "gate",
            DependencyKind::RepliesTo => "replies-to",
            DependencyKind::Mentions => "mentions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(DependencyKind::Blocks),
            "parent-child" => Some(DependencyKind::ParentChild),
            "awaits" => Some(DependencyKind::Awaits),
            "gate" => Some(DependencyKind::Gate),
            "replies-to" => Some(DependencyKind::RepliesTo),
            "mentions" => Some(DependencyKind::Mentions),
            _ => None,
        }
    }

    /// Kinds the blocked-state cache evaluates.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            DependencyKind::Blocks
                | DependencyKind::ParentChild
                | DependencyKind::Awaits
                | DependencyKind::Gate
        )
    }

    /// Kinds whose own class must stay acyclic.
    pub fn is_cycle_checked(&self) -> bool {
        matches!(
            self,
            DependencyKind::Blocks | DependencyKind::ParentChild | DependencyKind::Awaits
        )
    }

    /// Kinds that carry gate approval state in their metadata.
    pub fn is_gated(&self) -> bool {
        matches!(self, DependencyKind::Awaits | DependencyKind::Gate)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub blocked: ElementId,
    pub blocker: ElementId,
    pub kind: DependencyKind,
    pub created_at: u64,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Gate approval bookkeeping carried in an `awaits`/`gate` edge's metadata.
///
/// The gate is satisfied once every required approver has an approval on
/// record and none has revoked since, or when it was explicitly satisfied
/// one-shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_approvals: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvals: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub satisfied: bool,
}

impl GateState {
    /// Read gate state out of edge metadata; missing metadata is an
    /// approval-free gate.
    pub fn from_metadata(metadata: Option<&Value>) -> Self {
        metadata
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    /// Merge gate state back into edge metadata, preserving unrelated keys.
    pub fn apply_to_metadata(&self, metadata: Option<&Value>) -> Value {
        let mut map = match metadata {
            Some(Value::Object(m)) => m.clone(),
            _ => serde_json::Map::new(),
        };
        map.remove("required_approvals");
        map.remove("approvals");
        map.remove("satisfied");
        if let Ok(Value::Object(own)) = serde_json::to_value(self) {
            for (k, v) in own {
                map.insert(k, v);
            }
        }
        Value::Object(map)
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
            || self
                .required_approvals
                .iter()
                .all(|r| self.approvals.iter().any(|a| a == r))
    }

    /// Record an approval. Returns false if the approver already approved.
    pub fn approve(&mut self, approver: &str) -> bool {
        if self.approvals.iter().any(|a| a == approver) {
            return false;
        }
        self.approvals.push(approver.to_string());
        true
    }

    /// Revoke an approval. Returns false if there was none to revoke.
    pub fn revoke(&mut self, approver: &str) -> bool {
        let before = self.approvals.len();
        self.approvals.retain(|a| a != approver);
        self.approvals.len() != before
    }

    /// Approvers still missing from the required set.
    pub fn pending(&self) -> Vec<&str> {
        self.required_approvals
            .iter()
            .filter(|r| !self.approvals.iter().any(|a| &a == r))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
#[path = "dependency_tests.rs"]
mod tests;
