// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::manager::StartOptions;
use crate::test_helpers::{agent, agent_meta_str, fixture, id};
use foreman_core::{agent_meta, AgentRole, SessionStatus};
use foreman_storage::InboxSource;

fn request(summary: &str) -> HandoffRequest {
    HandoffRequest {
        context_summary: summary.into(),
        next_steps: Some("finish the migration".into()),
        reason: Some("context window".into()),
        task_ids: vec![],
    }
}

#[tokio::test(start_paused = true)]
async fn self_handoff_documents_notifies_and_suspends() {
    let fx = fixture();
    agent(&fx, "ag-1", "agent-one", AgentRole::Worker);
    fx.spawner.push_provider_session_id("prov-1");
    let session = fx
        .manager
        .start_session(&id("ag-1"), StartOptions::default())
        .await
        .unwrap();

    let outcome = HandoffService::new(&fx.manager)
        .self_handoff(&id("ag-1"), request("half way through the refactor"))
        .await
        .unwrap();

    // The handoff document carries the wire-format fields
    let doc = fx.store.get(&outcome.document_id).unwrap().unwrap();
    let data = doc.as_document().unwrap();
    assert_eq!(data.category.as_deref(), Some("handoff"));
    assert_eq!(data.content_type, "application/json");
    let body: serde_json::Value = serde_json::from_str(&data.content).unwrap();
    assert_eq!(body["type"], "handoff");
    assert_eq!(body["fromAgentId"], "ag-1");
    assert_eq!(body["toAgentId"], serde_json::Value::Null);
    assert_eq!(body["contextSummary"], "half way through the refactor");
    assert_eq!(body["providerSessionId"], "prov-1");

    // The message points at the document in the agent's own channel
    let message = fx.store.get(&outcome.message_id).unwrap().unwrap();
    let msg = message.as_message().unwrap();
    assert_eq!(msg.content_ref, outcome.document_id);
    assert_eq!(msg.channel_id, outcome.channel_id);

    // The successor finds it in the inbox
    let inbox = fx.store.inbox_for("ag-1", false, None).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, InboxSource::Handoff);
    assert_eq!(inbox[0].message_id, outcome.message_id);

    // And the source session is parked
    assert_eq!(
        fx.manager.get_session(&session.id).unwrap().status,
        SessionStatus::Suspended
    );
    assert_eq!(
        agent_meta_str(&fx, "ag-1", agent_meta::SESSION_STATUS).as_deref(),
        Some("suspended")
    );
}

#[tokio::test(start_paused = true)]
async fn agent_to_agent_handoff_targets_the_other_channel() {
    let fx = fixture();
    agent(&fx, "ag-src", "source", AgentRole::Worker);
    agent(&fx, "ag-dst", "target", AgentRole::Worker);
    let session = fx
        .manager
        .start_session(&id("ag-src"), StartOptions::default())
        .await
        .unwrap();

    let mut req = request("take over the release");
    req.task_ids = vec![id("t-1"), id("t-2")];
    let outcome = HandoffService::new(&fx.manager)
        .handoff_to(&id("ag-src"), &id("ag-dst"), req)
        .await
        .unwrap();

    let doc = fx.store.get(&outcome.document_id).unwrap().unwrap();
    let body: serde_json::Value =
        serde_json::from_str(&doc.as_document().unwrap().content).unwrap();
    assert_eq!(body["toAgentId"], "ag-dst");
    assert_eq!(body["taskIds"], serde_json::json!(["t-1", "t-2"]));

    // The target's channel hosts the message; the target is notified
    let channel = fx.store.get(&outcome.channel_id).unwrap().unwrap();
    assert_eq!(channel.as_channel().unwrap().name.as_deref(), Some("target"));
    let inbox = fx.store.inbox_for("ag-dst", false, None).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].source, InboxSource::Handoff);

    // Source suspended, target not woken
    assert_eq!(
        fx.manager.get_session(&session.id).unwrap().status,
        SessionStatus::Suspended
    );
    assert!(fx
        .manager
        .get_active_session(&id("ag-dst"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn handoff_requires_a_running_session() {
    let fx = fixture();
    agent(&fx, "ag-1", "agent-one", AgentRole::Worker);

    let err = HandoffService::new(&fx.manager)
        .self_handoff(&id("ag-1"), request("nothing running"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn repeated_handoffs_reuse_the_agent_channel() {
    let fx = fixture();
    agent(&fx, "ag-1", "agent-one", AgentRole::Worker);
    fx.spawner.push_provider_session_id("prov-1");

    let service = HandoffService::new(&fx.manager);
    let s1 = fx
        .manager
        .start_session(&id("ag-1"), StartOptions::default())
        .await
        .unwrap();
    let first = service
        .self_handoff(&id("ag-1"), request("round one"))
        .await
        .unwrap();
    // s1 suspended; start a successor and hand off again
    assert_eq!(
        fx.manager.get_session(&s1.id).unwrap().status,
        SessionStatus::Suspended
    );
    fx.manager
        .start_session(&id("ag-1"), StartOptions::default())
        .await
        .unwrap();
    let second = service
        .self_handoff(&id("ag-1"), request("round two"))
        .await
        .unwrap();

    assert_eq!(first.channel_id, second.channel_id);
    assert_eq!(fx.store.inbox_for("ag-1", false, None).unwrap().len(), 2);
}
