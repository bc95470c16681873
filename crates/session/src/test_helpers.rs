// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the session unit tests.

use crate::fake::FakeSpawner;
use crate::manager::SessionManager;
use foreman_core::{
    agent_meta, AgentRole, Element, ElementData, ElementId, EntityData, FakeClock, NewElement,
    SequentialIdGen,
};
use foreman_storage::Store;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub(crate) type TestStore = Store<FakeClock, SequentialIdGen>;
pub(crate) type TestManager = SessionManager<FakeSpawner, FakeClock, SequentialIdGen>;

pub(crate) struct Fixture {
    pub(crate) store: Arc<TestStore>,
    pub(crate) spawner: FakeSpawner,
    pub(crate) manager: TestManager,
    pub(crate) clock: FakeClock,
}

pub(crate) fn fixture() -> Fixture {
    let clock = FakeClock::new();
    let store = Arc::new(
        Store::in_memory_with(clock.clone(), SequentialIdGen::new("el")).unwrap(),
    );
    let spawner = FakeSpawner::new();
    let manager = SessionManager::new(
        spawner.clone(),
        store.clone(),
        SequentialIdGen::new("sess"),
    );
    Fixture {
        store,
        spawner,
        manager,
        clock,
    }
}

pub(crate) fn agent(fixture: &Fixture, id: &str, name: &str, role: AgentRole) -> Element {
    let mut data = EntityData::new(name);
    data.metadata
        .insert(agent_meta::ROLE.into(), json!(role.as_str()));
    data.metadata
        .insert(agent_meta::PROVIDER.into(), json!("claude"));
    fixture
        .store
        .create(NewElement::new(ElementData::Entity(data), "tester").with_id(id))
        .unwrap_or_else(|e| panic!("create agent {id}: {e}"))
}

pub(crate) fn id(s: &str) -> ElementId {
    ElementId::new(s)
}

/// Let spawned forwarding tasks drain their channels. Paused-time tests
/// auto-advance through this instantly.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub(crate) fn agent_meta_str(fixture: &Fixture, agent_id: &str, key: &str) -> Option<String> {
    let agent = fixture.store.get(&id(agent_id)).unwrap().unwrap();
    agent
        .data
        .metadata()
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
}
