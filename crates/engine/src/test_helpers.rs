// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the engine unit tests.

use foreman_core::{
    DependencyKind, Element, ElementData, ElementId, FakeClock, NewElement, PlanData,
    PlanStatus, SequentialIdGen, TaskData, TaskStatus, WorkflowData, WorkflowStatus,
};
use foreman_storage::{NewDependency, Store};

pub(crate) type TestStore = Store<FakeClock, SequentialIdGen>;

pub(crate) fn store() -> TestStore {
    store_with_clock(FakeClock::new())
}

pub(crate) fn store_with_clock(clock: FakeClock) -> TestStore {
    Store::in_memory_with(clock, SequentialIdGen::new("el")).unwrap()
}

pub(crate) fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

pub(crate) fn task(store: &TestStore, id: &str, status: TaskStatus, priority: u8) -> Element {
    store
        .create(
            NewElement::new(
                ElementData::Task(
                    TaskData::new(format!("task {id}"))
                        .with_status(status)
                        .with_priority(priority),
                ),
                "tester",
            )
            .with_id(id),
        )
        .unwrap_or_else(|e| panic!("create task {id}: {e}"))
}

pub(crate) fn plan(store: &TestStore, id: &str, status: PlanStatus) -> Element {
    store
        .create(
            NewElement::new(
                ElementData::Plan(PlanData::new(format!("plan {id}")).with_status(status)),
                "tester",
            )
            .with_id(id),
        )
        .unwrap_or_else(|e| panic!("create plan {id}: {e}"))
}

pub(crate) fn workflow(
    store: &TestStore,
    id: &str,
    status: WorkflowStatus,
    ephemeral: bool,
) -> Element {
    let mut data = WorkflowData::new(format!("workflow {id}")).with_status(status);
    data.ephemeral = ephemeral;
    store
        .create(NewElement::new(ElementData::Workflow(data), "tester").with_id(id))
        .unwrap_or_else(|e| panic!("create workflow {id}: {e}"))
}

pub(crate) fn link(store: &TestStore, blocked: &str, blocker: &str, kind: DependencyKind) {
    store
        .add_dependency(NewDependency::new(blocked, blocker, kind, "tester"))
        .unwrap_or_else(|e| panic!("link {blocked} -> {blocker}: {e}"));
}
