//! Session reconciliation and the universal work principle, wired to the
//! real scheduler.

use crate::prelude::{id, world, SpecStore, World};
use foreman_core::{
    agent_meta, AgentRole, ElementId, SequentialIdGen, StoreError, TaskStatus,
};
use foreman_engine::{ReadyFilter, Scheduler};
use foreman_session::{
    FakeSpawner, ResumeOptions, SessionManager, StartOptions, TaskBrief,
};
use serde_json::json;
use std::sync::Arc;

type SpecManager = SessionManager<FakeSpawner, foreman_core::FakeClock, SequentialIdGen>;

fn manager(w: &World) -> (SpecManager, FakeSpawner) {
    let spawner = FakeSpawner::new();
    let manager = SessionManager::new(
        spawner.clone(),
        w.store.clone(),
        SequentialIdGen::new("sess"),
    );
    (manager, spawner)
}

fn make_agent(w: &World, agent_id: &str, name: &str) {
    w.entity(agent_id, name);
    w.store
        .update(
            &id(agent_id),
            [(
                "metadata".to_string(),
                json!({ (agent_meta::ROLE): AgentRole::Worker.as_str() }),
            )]
            .into_iter()
            .collect(),
            Default::default(),
        )
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn startup_reconciliation_resets_stale_agents() {
    let w = world();
    make_agent(&w, "ag-1", "agent-one");

    // Persisted as running with a provider id, but no live session exists
    w.store
        .update(
            &id("ag-1"),
            [(
                "metadata".to_string(),
                json!({
                    (agent_meta::SESSION_STATUS): "running",
                    (agent_meta::PROVIDER_SESSION_ID): "p1",
                }),
            )]
            .into_iter()
            .collect(),
            Default::default(),
        )
        .unwrap();

    let (manager, _) = manager(&w);
    let report = manager.reconcile_on_startup().await;
    assert_eq!(report.reconciled, 1);
    assert!(report.errors.is_empty());

    let agent = w.store.get(&id("ag-1")).unwrap().unwrap();
    assert_eq!(
        agent
            .data
            .metadata()
            .get(agent_meta::SESSION_STATUS)
            .and_then(|v| v.as_str()),
        Some("idle")
    );
}

#[tokio::test(start_paused = true)]
async fn resume_services_assigned_work_first() {
    let w = world();
    make_agent(&w, "ag-1", "agent-one");

    // The agent has an assigned ready task
    w.task("t-urgent", TaskStatus::Open, 1);
    w.store
        .update(
            &id("t-urgent"),
            [("assignee".to_string(), json!("ag-1"))].into_iter().collect(),
            Default::default(),
        )
        .unwrap();

    let (manager, spawner) = manager(&w);
    spawner.push_provider_session_id("prov-1");
    let first = manager
        .start_session(&id("ag-1"), StartOptions::default())
        .await
        .unwrap();
    manager.suspend_session(&first.id).await.unwrap();

    // The probe is the real scheduler
    let store: Arc<SpecStore> = w.store.clone();
    let probe = move |agent: &ElementId| -> Result<Option<TaskBrief>, StoreError> {
        let ready = Scheduler::new(&store).ready(&ReadyFilter {
            assignee: Some(agent.to_string()),
            limit: Some(1),
            ..Default::default()
        })?;
        Ok(ready.first().map(|r| TaskBrief {
            id: r.task.id.clone(),
            title: r
                .task
                .as_task()
                .map(|t| t.title.clone())
                .unwrap_or_default(),
            priority: r.effective_priority,
        }))
    };

    let outcome = manager
        .resume_session(
            &id("ag-1"),
            ResumeOptions {
                prompt: Some("carry on".into()),
                ..Default::default()
            },
            Some(&probe),
        )
        .await
        .unwrap();

    let pending = outcome.pending_task.unwrap();
    assert_eq!(pending.id.as_str(), "t-urgent");
    let prompt = spawner.last_prompt().unwrap();
    assert!(prompt.contains("t-urgent"));
    assert!(prompt.ends_with("carry on"));
}
