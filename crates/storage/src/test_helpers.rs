// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the storage unit tests.

use crate::Store;
use foreman_core::{
    ChannelData, DocumentData, Element, ElementData, ElementId, EntityData, FakeClock,
    NewElement, PlanData, PlanStatus, SequentialIdGen, TaskData, TaskStatus, WorkflowData,
    WorkflowStatus,
};

pub(crate) type TestStore = Store<FakeClock, SequentialIdGen>;

pub(crate) fn store() -> TestStore {
    store_with_clock(FakeClock::new())
}

pub(crate) fn store_with_clock(clock: FakeClock) -> TestStore {
    #[allow(clippy::unwrap_used)]
    Store::in_memory_with(clock, SequentialIdGen::new("el")).unwrap()
}

pub(crate) fn create_task(store: &TestStore, id: &str, status: TaskStatus) -> Element {
    create_task_with_priority(store, id, status, 3)
}

pub(crate) fn create_task_with_priority(
    store: &TestStore,
    id: &str,
    status: TaskStatus,
    priority: u8,
) -> Element {
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

pub(crate) fn create_plan(store: &TestStore, id: &str, status: PlanStatus) -> Element {
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

pub(crate) fn create_workflow(
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

pub(crate) fn create_entity(store: &TestStore, id: &str, name: &str) -> Element {
    store
        .create(NewElement::new(ElementData::Entity(EntityData::new(name)), "tester").with_id(id))
        .unwrap_or_else(|e| panic!("create entity {id}: {e}"))
}

pub(crate) fn create_document(store: &TestStore, id: &str, content: &str) -> Element {
    store
        .create(
            NewElement::new(ElementData::Document(DocumentData::new(content)), "tester")
                .with_id(id),
        )
        .unwrap_or_else(|e| panic!("create document {id}: {e}"))
}

pub(crate) fn create_group_channel(
    store: &TestStore,
    id: &str,
    name: &str,
    members: &[&str],
) -> Element {
    store
        .create(
            NewElement::new(
                ElementData::Channel(ChannelData::group(
                    name,
                    members.iter().map(|m| m.to_string()).collect(),
                )),
                "tester",
            )
            .with_id(id),
        )
        .unwrap_or_else(|e| panic!("create channel {id}: {e}"))
}

pub(crate) fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

pub(crate) fn patch(pairs: &[(&str, serde_json::Value)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
