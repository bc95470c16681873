// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journal event types.
//!
//! Every state transition appends exactly one event inside the transaction
//! that performs it. The journal is append-only; only workflow hard-delete
//! removes rows.

use crate::element::ElementId;
use crate::id::ShortId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What happened to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Closed,
    Reopened,
    Deleted,
    DependencyAdded,
    DependencyRemoved,
    MemberAdded,
    MemberRemoved,
    GateApproved,
    GateRevoked,
    /// The blocked-state cache moved the element into `blocked`.
    AutoBlocked,
    /// The blocked-state cache restored the prior status.
    AutoUnblocked,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Closed => "closed",
            EventKind::Reopened => "reopened",
            EventKind::Deleted => "deleted",
            EventKind::DependencyAdded => "dependency_added",
            EventKind::DependencyRemoved => "dependency_removed",
            EventKind::MemberAdded => "member_added",
            EventKind::MemberRemoved => "member_removed",
            EventKind::GateApproved => "gate_approved",
            EventKind::GateRevoked => "gate_revoked",
            EventKind::AutoBlocked => "auto_blocked",
            EventKind::AutoUnblocked => "auto_unblocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventKind::Created),
            "updated" => Some(EventKind::Updated),
            "closed" => Some(EventKind::Closed),
            "reopened" => Some(EventKind::Reopened),
            "deleted" => Some(EventKind::Deleted),
            "dependency_added" => Some(EventKind::DependencyAdded),
            "dependency_removed" => Some(EventKind::DependencyRemoved),
            "member_added" => Some(EventKind::MemberAdded),
            "member_removed" => Some(EventKind::MemberRemoved),
            "gate_approved" => Some(EventKind::GateApproved),
            "gate_revoked" => Some(EventKind::GateRevoked),
            "auto_blocked" => Some(EventKind::AutoBlocked),
            "auto_unblocked" => Some(EventKind::AutoUnblocked),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One journal row.
///
/// `old_value`/`new_value` are flat JSON objects holding the touched payload
/// fields; `created` carries the full element snapshot, `deleted` the
/// tombstone marker. Folding `new_value` objects in sequence reconstructs the
/// element at any point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub element_id: ElementId,
    pub kind: EventKind,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    pub created_at: u64,
}

impl EventRecord {
    /// One-line rendering for logs.
    pub fn log_summary(&self) -> String {
        let t = self.kind.as_str();
        let id = self.element_id.short(12);
        match self.kind {
            EventKind::Closed | EventKind::Reopened | EventKind::AutoBlocked
            | EventKind::AutoUnblocked => {
                let status = self
                    .new_value
                    .as_ref()
                    .and_then(|v| v.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                format!("{t} id={id} status={status}")
            }
            EventKind::DependencyAdded | EventKind::DependencyRemoved => {
                let blocker = self
                    .new_value
                    .as_ref()
                    .or(self.old_value.as_ref())
                    .and_then(|v| v.get("blocker"))
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                format!("{t} id={id} blocker={}", blocker.short(12))
            }
            EventKind::GateApproved | EventKind::GateRevoked => {
                format!("{t} id={id} actor={}", self.actor)
            }
            _ => format!("{t} id={id}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
