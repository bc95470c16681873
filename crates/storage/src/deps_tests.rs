// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{create_plan, create_task, create_workflow, id, store};
use foreman_core::{EventKind, PlanStatus, TaskStatus, WorkflowStatus};

#[test]
fn add_and_read_back() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);

    let dep = store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap();
    assert_eq!(dep.blocked.as_str(), "t-a");

    let out = store.dependencies_of(&id("t-a"), None).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].blocker.as_str(), "t-b");

    let incoming = store.dependents_of(&id("t-b"), None).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].blocked.as_str(), "t-a");
}

#[test]
fn duplicate_triples_conflict() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);
    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap();
    let err = store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    // Same endpoints, different kind is a distinct edge
    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Awaits, "ann"))
        .unwrap();
}

#[test]
fn same_class_cycles_are_rejected() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);
    create_task(&store, "t-c", TaskStatus::Open);

    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap();
    store
        .add_dependency(NewDependency::new("t-b", "t-c", DependencyKind::Blocks, "ann"))
        .unwrap();

    let err = store
        .add_dependency(NewDependency::new("t-c", "t-a", DependencyKind::Blocks, "ann"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));

    // A different class may close the loop without complaint
    store
        .add_dependency(NewDependency::new("t-c", "t-a", DependencyKind::Awaits, "ann"))
        .unwrap();
}

#[test]
fn self_dependency_is_rejected() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    let err = store
        .add_dependency(NewDependency::new("t-a", "t-a", DependencyKind::Blocks, "ann"))
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[test]
fn tasks_have_at_most_one_parent() {
    let store = store();
    create_plan(&store, "pl-1", PlanStatus::Active);
    create_workflow(&store, "wf-1", WorkflowStatus::Running, false);
    create_task(&store, "t-a", TaskStatus::Open);

    store
        .add_dependency(NewDependency::new(
            "t-a",
            "pl-1",
            DependencyKind::ParentChild,
            "ann",
        ))
        .unwrap();
    let err = store
        .add_dependency(NewDependency::new(
            "t-a",
            "wf-1",
            DependencyKind::ParentChild,
            "ann",
        ))
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn parent_child_requires_container_blocker() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);
    let err = store
        .add_dependency(NewDependency::new(
            "t-a",
            "t-b",
            DependencyKind::ParentChild,
            "ann",
        ))
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[test]
fn completed_plans_do_not_accept_tasks() {
    let store = store();
    create_plan(&store, "pl-1", PlanStatus::Completed);
    create_task(&store, "t-a", TaskStatus::Open);
    let err = store
        .add_dependency(NewDependency::new(
            "t-a",
            "pl-1",
            DependencyKind::ParentChild,
            "ann",
        ))
        .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)));
}

#[test]
fn add_remove_leaves_graph_identical() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);

    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap();
    store
        .remove_dependency(&id("t-a"), &id("t-b"), DependencyKind::Blocks, "ann")
        .unwrap();

    assert!(store.dependencies_of(&id("t-a"), None).unwrap().is_empty());
    assert!(store.dependents_of(&id("t-b"), None).unwrap().is_empty());
    assert!(!store.is_blocked(&id("t-a")).unwrap());

    // The journal keeps both transitions
    let events = store.events_for(&id("t-a"), true).unwrap();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::DependencyAdded));
    assert!(kinds.contains(&EventKind::DependencyRemoved));
}

#[test]
fn remove_missing_dependency_is_not_found() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);
    let err = store
        .remove_dependency(&id("t-a"), &id("t-b"), DependencyKind::Blocks, "ann")
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn kind_filters_apply() {
    let store = store();
    create_task(&store, "t-a", TaskStatus::Open);
    create_task(&store, "t-b", TaskStatus::Open);
    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Blocks, "ann"))
        .unwrap();
    store
        .add_dependency(NewDependency::new("t-a", "t-b", DependencyKind::Awaits, "ann"))
        .unwrap();

    let only_blocks = store
        .dependencies_of(&id("t-a"), Some(&[DependencyKind::Blocks]))
        .unwrap();
    assert_eq!(only_blocks.len(), 1);
    assert_eq!(only_blocks[0].kind, DependencyKind::Blocks);
}

#[test]
fn dependency_tree_is_depth_limited_and_cycle_safe() {
    let store = store();
    // Chain deeper than the limit
    for i in 0..15 {
        create_task(&store, &format!("t-{i}"), TaskStatus::Open);
    }
    for i in 0..14 {
        store
            .add_dependency(NewDependency::new(
                format!("t-{i}").as_str(),
                format!("t-{}", i + 1).as_str(),
                DependencyKind::Blocks,
                "ann",
            ))
            .unwrap();
    }

    let tree = store.dependency_tree(&id("t-0")).unwrap();
    let mut depth = 0;
    let mut node = &tree;
    while let Some(child) = node.children.first() {
        depth += 1;
        node = child;
    }
    assert!(node.truncated);
    assert_eq!(depth, 10);
}
