// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    backlog = { TaskStatus::Backlog, false },
    open = { TaskStatus::Open, false },
    in_progress = { TaskStatus::InProgress, false },
    blocked = { TaskStatus::Blocked, false },
    deferred = { TaskStatus::Deferred, false },
    closed = { TaskStatus::Closed, true },
    tombstone = { TaskStatus::Tombstone, true },
)]
fn terminal_statuses(status: TaskStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn workable_statuses() {
    assert!(TaskStatus::Open.is_workable());
    assert!(TaskStatus::InProgress.is_workable());
    assert!(!TaskStatus::Backlog.is_workable());
    assert!(!TaskStatus::Blocked.is_workable());
    assert!(!TaskStatus::Deferred.is_workable());
}

#[test]
fn status_serde_uses_snake_case() {
    let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
    assert_eq!(json, "\"in_progress\"");
    let parsed: TaskStatus = serde_json::from_str("\"tombstone\"").unwrap();
    assert_eq!(parsed, TaskStatus::Tombstone);
}

#[test]
fn new_task_defaults() {
    let task = TaskData::new("write docs");
    assert_eq!(task.status, TaskStatus::Open);
    assert_eq!(task.priority, DEFAULT_PRIORITY);
    assert_eq!(task.complexity, DEFAULT_COMPLEXITY);
    assert!(task.assignee.is_none());
    assert!(task.scheduled_for.is_none());
}

#[test]
fn task_round_trips_through_json() {
    let task = TaskData::new("triage")
        .with_status(TaskStatus::Backlog)
        .with_priority(1)
        .with_assignee("ann");
    let json = serde_json::to_string(&task).unwrap();
    let parsed: TaskData = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, task);
}

#[test]
fn defaulted_fields_are_omitted() {
    let task = TaskData::new("t");
    let json = serde_json::to_value(&task).unwrap();
    assert!(json.get("assignee").is_none());
    assert!(json.get("closed_at").is_none());
    assert!(json.get("metadata").is_none());
}
