//! Ephemeral workflow garbage collection is a true hard delete.

use crate::prelude::{id, world};
use foreman_core::{
    DependencyKind, ElementData, NewElement, TaskStatus, WorkflowData, WorkflowStatus,
};
use foreman_engine::{GcOptions, Workflows};
use std::time::Duration;

#[test]
fn ephemeral_workflow_gc_erases_everything() {
    let w = world();

    let data = WorkflowData::new("one-shot run")
        .ephemeral()
        .with_status(WorkflowStatus::Running);
    w.store
        .create(NewElement::new(ElementData::Workflow(data), "spec").with_id("wf-1"))
        .unwrap();
    w.task("t-1", TaskStatus::Open, 3);
    w.task("t-2", TaskStatus::Open, 3);
    w.link("t-1", "wf-1", DependencyKind::ParentChild);
    w.link("t-2", "wf-1", DependencyKind::ParentChild);

    // Finish the workflow; finished_at stamps automatically
    w.store
        .update(
            &id("wf-1"),
            [("status".to_string(), serde_json::json!("completed"))]
                .into_iter()
                .collect(),
            Default::default(),
        )
        .unwrap();

    // An hour later, a 30-minute threshold collects it
    w.clock.advance(Duration::from_secs(3600));
    let result = Workflows::new(&w.store)
        .gc(GcOptions {
            max_age_ms: 30 * 60 * 1000,
            limit: None,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(result.workflows_deleted, 1);
    assert_eq!(result.tasks_deleted, 2);

    // Rows, children, and journal entries are all gone
    assert!(w.store.get(&id("wf-1")).unwrap().is_none());
    assert!(w.store.get(&id("t-1")).unwrap().is_none());
    assert!(w.store.get(&id("t-2")).unwrap().is_none());
    assert!(w.store.events_for(&id("wf-1"), true).unwrap().is_empty());
    assert!(w.store.events_for(&id("t-1"), true).unwrap().is_empty());
}

#[test]
fn soft_delete_of_a_blocker_releases_its_dependents() {
    let w = world();
    w.task("t-a", TaskStatus::Open, 3);
    w.task("t-b", TaskStatus::Open, 3);
    w.link("t-a", "t-b", DependencyKind::Blocks);
    assert!(w.store.is_blocked(&id("t-a")).unwrap());

    w.store.delete(&id("t-b"), Default::default()).unwrap();

    // t-a had only that blocker; it transitions back to workable
    assert!(!w.store.is_blocked(&id("t-a")).unwrap());
    let task = w.store.get(&id("t-a")).unwrap().unwrap();
    assert_eq!(task.as_task().unwrap().status, TaskStatus::Open);
    let events = w.store.events_for(&id("t-a"), true).unwrap();
    assert!(events
        .iter()
        .any(|e| e.kind == foreman_core::EventKind::AutoUnblocked));
}
