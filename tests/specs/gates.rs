//! Gate satisfaction: an awaits edge needs a terminal blocker AND every
//! required approval.

use crate::prelude::{id, world};
use foreman_core::{DependencyKind, PlanStatus, TaskStatus};
use foreman_storage::NewDependency;
use serde_json::json;

#[test]
fn gate_satisfaction_end_to_end() {
    let w = world();
    w.plan("pl-1", PlanStatus::Draft);
    w.task("t-a", TaskStatus::Open, 3);
    w.task("t-b", TaskStatus::Open, 2);

    w.store
        .add_dependency(
            NewDependency::new("t-a", "t-b", DependencyKind::Awaits, "spec")
                .with_metadata(json!({"required_approvals": ["alice", "bob"]})),
        )
        .unwrap();

    // t-a waits on t-b; only t-b is workable
    assert_eq!(w.ready_ids(), vec!["t-b"]);

    // First approval: the blocker is still open, so nothing changes
    w.store
        .record_approval(&id("t-a"), &id("t-b"), "alice")
        .unwrap();
    assert_eq!(w.ready_ids(), vec!["t-b"]);
    assert!(w.store.is_blocked(&id("t-a")).unwrap());

    // Blocker closes, but bob has not signed off
    w.close("t-b");
    assert!(w.store.is_blocked(&id("t-a")).unwrap());
    assert!(w.ready_ids().is_empty());

    // Second approval satisfies the gate
    w.store
        .record_approval(&id("t-a"), &id("t-b"), "bob")
        .unwrap();
    assert!(!w.store.is_blocked(&id("t-a")).unwrap());
    assert_eq!(w.ready_ids(), vec!["t-a"]);
}

#[test]
fn revocation_reblocks_until_reapproved() {
    let w = world();
    w.task("t-a", TaskStatus::Open, 3);
    w.task("t-b", TaskStatus::Closed, 3);
    w.store
        .add_dependency(
            NewDependency::new("t-a", "t-b", DependencyKind::Awaits, "spec")
                .with_metadata(json!({"required_approvals": ["alice"]})),
        )
        .unwrap();

    w.store
        .record_approval(&id("t-a"), &id("t-b"), "alice")
        .unwrap();
    assert_eq!(w.ready_ids(), vec!["t-a"]);

    w.store
        .remove_approval(&id("t-a"), &id("t-b"), "alice")
        .unwrap();
    assert!(w.ready_ids().is_empty());

    w.store
        .record_approval(&id("t-a"), &id("t-b"), "alice")
        .unwrap();
    assert_eq!(w.ready_ids(), vec!["t-a"]);
}
