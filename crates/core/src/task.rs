// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task variant: the unit of schedulable work.

use crate::element::ElementId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Task lifecycle status.
///
/// `blocked` is owned by the blocked-state cache: the store moves a task into
/// it when a blocker appears and restores the prior status when the last
/// blocker clears. `tombstone` is set by soft delete only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
}

impl TaskStatus {
    /// Closed and tombstoned tasks satisfy `blocks`/`awaits` edges.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Closed | TaskStatus::Tombstone)
    }

    /// Statuses the ready scheduler considers workable.
    pub fn is_workable(&self) -> bool {
        matches!(self, TaskStatus::Open | TaskStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Deferred => "deferred",
            TaskStatus::Closed => "closed",
            TaskStatus::Tombstone => "tombstone",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority and complexity share the same 1..=5 scale (1 = highest/simplest).
pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 5;
pub const DEFAULT_PRIORITY: u8 = 3;
pub const DEFAULT_COMPLEXITY: u8 = 3;

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

fn default_complexity() -> u8 {
    DEFAULT_COMPLEXITY
}

/// Task payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskData {
    pub title: String,
    pub status: TaskStatus,
    /// 1..=5, 1 = most urgent.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// 1..=5, 1 = simplest.
    #[serde(default = "default_complexity")]
    pub complexity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Epoch ms deadline, informational.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
    /// Epoch ms before which the task must not be scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    /// Reference to a document holding the long-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ref: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TaskData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: TaskStatus::Open,
            priority: DEFAULT_PRIORITY,
            complexity: DEFAULT_COMPLEXITY,
            task_type: None,
            assignee: None,
            owner: None,
            deadline: None,
            scheduled_for: None,
            closed_at: None,
            close_reason: None,
            description_ref: None,
            metadata: Map::new(),
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
