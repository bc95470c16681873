//! Shared fixtures for the behavioural specs.

use foreman_core::{
    DependencyKind, Element, ElementData, ElementId, FakeClock, NewElement, PlanData,
    PlanStatus, SequentialIdGen, TaskData, TaskStatus,
};
use foreman_storage::{NewDependency, Store};
use std::sync::Arc;

pub type SpecStore = Store<FakeClock, SequentialIdGen>;

pub struct World {
    pub store: Arc<SpecStore>,
    pub clock: FakeClock,
}

pub fn world() -> World {
    let clock = FakeClock::new();
    let store = Arc::new(
        Store::in_memory_with(clock.clone(), SequentialIdGen::new("el")).unwrap(),
    );
    World { store, clock }
}

pub fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

impl World {
    pub fn task(&self, task_id: &str, status: TaskStatus, priority: u8) -> Element {
        self.store
            .create(
                NewElement::new(
                    ElementData::Task(
                        TaskData::new(format!("task {task_id}"))
                            .with_status(status)
                            .with_priority(priority),
                    ),
                    "spec",
                )
                .with_id(task_id),
            )
            .unwrap()
    }

    pub fn plan(&self, plan_id: &str, status: PlanStatus) -> Element {
        self.store
            .create(
                NewElement::new(
                    ElementData::Plan(PlanData::new(format!("plan {plan_id}")).with_status(status)),
                    "spec",
                )
                .with_id(plan_id),
            )
            .unwrap()
    }

    pub fn entity(&self, entity_id: &str, name: &str) -> Element {
        self.store
            .create(
                NewElement::new(
                    ElementData::Entity(foreman_core::EntityData::new(name)),
                    "spec",
                )
                .with_id(entity_id),
            )
            .unwrap()
    }

    pub fn document(&self, doc_id: &str, content: &str) -> Element {
        self.store
            .create(
                NewElement::new(
                    ElementData::Document(foreman_core::DocumentData::new(content)),
                    "spec",
                )
                .with_id(doc_id),
            )
            .unwrap()
    }

    pub fn link(&self, blocked: &str, blocker: &str, kind: DependencyKind) {
        self.store
            .add_dependency(NewDependency::new(blocked, blocker, kind, "spec"))
            .unwrap();
    }

    pub fn close(&self, task_id: &str) {
        self.store
            .update(
                &id(task_id),
                [("status".to_string(), serde_json::json!("closed"))]
                    .into_iter()
                    .collect(),
                Default::default(),
            )
            .unwrap();
    }

    pub fn ready_ids(&self) -> Vec<String> {
        foreman_engine::Scheduler::new(&self.store)
            .ready(&Default::default())
            .unwrap()
            .into_iter()
            .map(|r| r.task.id.to_string())
            .collect()
    }
}
