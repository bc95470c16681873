// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan and workflow variants: containers that group tasks via
//! `parent-child` dependencies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Plan lifecycle. Tasks may only be added while the plan is draft or active;
/// a draft plan hides its children from the ready scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }

    /// Whether tasks can currently be added to the plan.
    pub fn accepts_tasks(&self) -> bool {
        matches!(self, PlanStatus::Draft | PlanStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Active => "active",
            PlanStatus::Completed => "completed",
            PlanStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plan payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanData {
    pub title: String,
    pub status: PlanStatus,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl PlanData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: PlanStatus::Draft,
            metadata: Map::new(),
        }
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }
}

/// Workflow lifecycle. A workflow in any non-running state prevents its
/// children from being scheduled; `completed` does not (finished workflows
/// no longer gate their children).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Non-running, non-finished states that keep children from running.
    pub fn gates_children(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Pending | WorkflowStatus::Cancelled | WorkflowStatus::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workflow payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowData {
    pub title: String,
    pub status: WorkflowStatus,
    /// Ephemeral workflows are garbage-collected after terminal completion.
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl WorkflowData {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: WorkflowStatus::Pending,
            ephemeral: false,
            finished_at: None,
            playbook_id: None,
            metadata: Map::new(),
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
