// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use foreman_core::ElementId;
use std::path::PathBuf;
use tokio::sync::mpsc;

fn opts(session: &str) -> SpawnOptions {
    SpawnOptions {
        session_id: SessionId::new(session),
        agent_id: ElementId::new("ag-1"),
        mode: SessionMode::Headless,
        provider: "claude".into(),
        model: None,
        working_dir: PathBuf::from("."),
        worktree: None,
        prompt: Some("go".into()),
        resume_session_id: None,
        env: Vec::new(),
    }
}

#[tokio::test]
async fn spawn_registers_and_records_the_call() {
    let spawner = FakeSpawner::new();
    let (tx, _rx) = mpsc::channel(8);
    let spawned = spawner.spawn(opts("s-1"), tx).await.unwrap();
    assert_eq!(spawned.id, SessionId::new("s-1"));
    assert!(spawned.pid.is_none());

    assert_eq!(spawner.calls().len(), 1);
    assert!(spawner.get_session(&SessionId::new("s-1")).await.is_some());
    assert_eq!(spawner.last_prompt().as_deref(), Some("go"));
}

#[tokio::test]
async fn scripted_provider_ids_surface_on_spawn() {
    let spawner = FakeSpawner::new();
    spawner.push_provider_session_id("prov-1");
    let (tx, _rx) = mpsc::channel(8);
    let spawned = spawner.spawn(opts("s-1"), tx).await.unwrap();
    assert_eq!(spawned.provider_session_id.as_deref(), Some("prov-1"));
}

#[tokio::test]
async fn fail_next_spawn_fails_exactly_once() {
    let spawner = FakeSpawner::new();
    spawner.fail_next_spawn("boom");
    let (tx, _rx) = mpsc::channel(8);
    assert!(spawner.spawn(opts("s-1"), tx).await.is_err());

    let (tx, _rx) = mpsc::channel(8);
    assert!(spawner.spawn(opts("s-2"), tx).await.is_ok());
}

#[tokio::test]
async fn exit_session_emits_and_deregisters() {
    let spawner = FakeSpawner::new();
    let (tx, mut rx) = mpsc::channel(8);
    spawner.spawn(opts("s-1"), tx).await.unwrap();

    spawner.exit_session(&SessionId::new("s-1"), Some(2)).await;
    assert!(matches!(
        rx.recv().await.unwrap(),
        SessionEvent::Exited { code: Some(2) }
    ));
    assert!(spawner.get_session(&SessionId::new("s-1")).await.is_none());
}

#[tokio::test]
async fn kill_silently_drops_liveness_without_events() {
    let spawner = FakeSpawner::new();
    let (tx, mut rx) = mpsc::channel(8);
    spawner.spawn(opts("s-1"), tx).await.unwrap();

    spawner.kill_silently(&SessionId::new("s-1"));
    assert!(spawner.get_session(&SessionId::new("s-1")).await.is_none());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn operations_on_unknown_sessions_are_not_found() {
    let spawner = FakeSpawner::new();
    let missing = SessionId::new("nope");
    assert!(matches!(
        spawner.terminate(&missing, true).await,
        Err(SpawnError::NotFound(_))
    ));
    assert!(matches!(
        spawner.send_input(&missing, "x").await,
        Err(SpawnError::NotFound(_))
    ));
}
