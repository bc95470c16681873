// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::document::DocumentStatus;
use crate::plan::PlanStatus;
use crate::task::TaskData;

fn task_element(id: &str) -> Element {
    let data = ElementData::Task(TaskData::new("sample"));
    Element {
        id: ElementId::new(id),
        content_hash: crate::hash::content_hash(&data),
        data,
        tags: BTreeSet::new(),
        created_at: 1,
        updated_at: 1,
        created_by: "tester".to_string(),
        deleted_at: None,
    }
}

#[test]
fn element_serialises_flat() {
    let el = task_element("t-1");
    let json = serde_json::to_value(&el).unwrap();
    // Payload fields sit at the top level next to the header
    assert_eq!(json["id"], "t-1");
    assert_eq!(json["type"], "task");
    assert_eq!(json["title"], "sample");
    assert_eq!(json["status"], "open");
    assert_eq!(json["created_by"], "tester");
}

#[test]
fn element_round_trips_through_json() {
    let mut el = task_element("t-2");
    el.tags.insert("urgent".into());
    let json = serde_json::to_string(&el).unwrap();
    let parsed: Element = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, el);
}

#[test]
fn kind_matches_variant() {
    let el = task_element("t-3");
    assert_eq!(el.kind(), ElementKind::Task);
    assert_eq!(el.kind().as_str(), "task");
    assert_eq!(ElementKind::parse("task"), Some(ElementKind::Task));
    assert_eq!(ElementKind::parse("nope"), None);
}

#[test]
fn tombstone_marks_task_status() {
    let mut el = task_element("t-4");
    el.tombstone(99);
    assert_eq!(el.deleted_at, Some(99));
    assert!(el.is_tombstoned());
    assert_eq!(el.as_task().map(|t| t.status), Some(TaskStatus::Tombstone));
}

#[test]
fn terminal_blockers_per_variant() {
    let closed = ElementData::Task(TaskData::new("t").with_status(TaskStatus::Closed));
    assert!(closed.is_terminal());

    let open = ElementData::Task(TaskData::new("t"));
    assert!(!open.is_terminal());

    let active_plan = ElementData::Plan(crate::plan::PlanData::new("p").with_status(PlanStatus::Active));
    assert!(!active_plan.is_terminal());

    // Variants without a lifecycle never hold work back
    let doc = ElementData::Document(crate::document::DocumentData::new("x"));
    assert!(doc.is_terminal());
}

#[test]
fn closed_set_per_variant() {
    let draft = ElementData::Plan(crate::plan::PlanData::new("p"));
    assert!(draft.is_in_closed_set());

    let active = ElementData::Plan(crate::plan::PlanData::new("p").with_status(PlanStatus::Active));
    assert!(!active.is_in_closed_set());

    let mut doc = crate::document::DocumentData::new("x");
    doc.status = DocumentStatus::Archived;
    assert!(ElementData::Document(doc).is_in_closed_set());
}

#[test]
fn type_guards() {
    let el = task_element("t-5");
    assert!(el.as_task().is_some());
    assert!(el.as_plan().is_none());
    assert!(el.as_message().is_none());
}
