// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The handoff protocol: a structured, document-backed transfer of context
//! from one session to another.
//!
//! Both flavours write a handoff document, post a message pointing at it in
//! the receiving agent's channel, push an inbox item so the successor finds
//! it, and suspend the source session. Neither wakes the target.

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::spawner::Spawner;
use foreman_core::{
    ChannelData, Clock, DocumentData, Element, ElementData, ElementId, ElementKind, IdGen,
    MessageData, NewElement, SessionStatus,
};
use foreman_storage::{ElementFilter, InboxSource};
use serde_json::json;

/// Input for a handoff.
#[derive(Debug, Clone, Default)]
pub struct HandoffRequest {
    pub context_summary: String,
    pub next_steps: Option<String>,
    pub reason: Option<String>,
    /// Tasks transferred along with an agent-to-agent handoff.
    pub task_ids: Vec<ElementId>,
}

/// What a completed handoff left behind.
#[derive(Debug, Clone)]
pub struct HandoffOutcome {
    pub document_id: ElementId,
    pub message_id: ElementId,
    pub channel_id: ElementId,
}

/// Composes the session manager and the element store into the handoff
/// protocol.
pub struct HandoffService<'a, S: Spawner, C: Clock, G: IdGen> {
    manager: &'a SessionManager<S, C, G>,
}

impl<'a, S: Spawner, C: Clock, G: IdGen> HandoffService<'a, S, C, G> {
    pub fn new(manager: &'a SessionManager<S, C, G>) -> Self {
        Self { manager }
    }

    /// Same-agent handoff: park the current session with enough context for
    /// a successor session to pick the thread back up.
    pub async fn self_handoff(
        &self,
        agent_id: &ElementId,
        request: HandoffRequest,
    ) -> Result<HandoffOutcome, SessionError> {
        self.run_handoff(agent_id, None, request).await
    }

    /// Transfer context (and optionally tasks) to another agent. Does not
    /// wake the target.
    pub async fn handoff_to(
        &self,
        from_agent: &ElementId,
        to_agent: &ElementId,
        request: HandoffRequest,
    ) -> Result<HandoffOutcome, SessionError> {
        self.run_handoff(from_agent, Some(to_agent), request).await
    }

    async fn run_handoff(
        &self,
        from_agent: &ElementId,
        to_agent: Option<&ElementId>,
        request: HandoffRequest,
    ) -> Result<HandoffOutcome, SessionError> {
        let store = self.manager.store().clone();

        // The source must own a running session.
        let session = self
            .manager
            .get_active_session(from_agent)
            .await?
            .ok_or_else(|| SessionError::SessionNotFound(from_agent.to_string()))?;
        if session.status != SessionStatus::Running {
            return Err(SessionError::InvalidStatus {
                session: session.id.to_string(),
                status: session.status.to_string(),
                expected: "running".into(),
            });
        }
        if &session.agent_id != from_agent {
            return Err(SessionError::ForeignSession {
                session: session.id.to_string(),
                owner: session.agent_id.to_string(),
            });
        }

        let recipient = to_agent.unwrap_or(from_agent);
        let recipient_entity = store
            .get(recipient)?
            .ok_or_else(|| SessionError::AgentNotFound(recipient.to_string()))?;
        let recipient_name = recipient_entity
            .as_entity()
            .map(|e| e.name.clone())
            .ok_or_else(|| SessionError::NotAnAgent(recipient.to_string()))?;

        // The handoff document, in the wire format successors parse.
        let now = store.clock().epoch_ms();
        let body = json!({
            "type": "handoff",
            "fromAgentId": from_agent.as_str(),
            "toAgentId": to_agent.map(|id| id.as_str()),
            "contextSummary": request.context_summary,
            "nextSteps": request.next_steps,
            "reason": request.reason,
            "taskIds": request.task_ids.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
            "providerSessionId": session.provider_session_id,
            "initiatedAt": now,
        });
        let document = store.create(NewElement::new(
            ElementData::Document(
                DocumentData::new(body.to_string())
                    .with_content_type("application/json")
                    .with_category("handoff"),
            ),
            from_agent.as_str(),
        ))?;

        // The receiving agent's own channel, created on first use. The
        // source joins before posting so membership validation holds.
        let channel = self.agent_channel(&recipient_name, recipient)?;
        let channel = self.ensure_member(&channel, from_agent)?;

        let mut message = MessageData::new(
            channel.id.clone(),
            from_agent.as_str(),
            document.id.clone(),
        );
        // The explicit handoff inbox item below is the notification; the
        // router stays quiet.
        message
            .metadata
            .insert("suppress_inbox".into(), json!(true));
        let message = store.create(NewElement::new(ElementData::Message(message), from_agent.as_str()))?;

        store.push_inbox_item(
            recipient.as_str(),
            &message.id,
            &channel.id,
            InboxSource::Handoff,
        )?;

        self.manager.suspend_session(&session.id).await?;

        Ok(HandoffOutcome {
            document_id: document.id,
            message_id: message.id,
            channel_id: channel.id,
        })
    }

    /// Find or create the group channel named after an agent.
    fn agent_channel(
        &self,
        name: &str,
        agent_id: &ElementId,
    ) -> Result<Element, SessionError> {
        let store = self.manager.store();
        let existing = store.list(&ElementFilter {
            kind: Some(ElementKind::Channel),
            name: Some(name.to_string()),
            ..Default::default()
        })?;
        if let Some(channel) = existing.into_iter().next() {
            return Ok(channel);
        }
        Ok(store.create(NewElement::new(
            ElementData::Channel(ChannelData::group(
                name,
                vec![agent_id.as_str().to_string()],
            )),
            agent_id.as_str(),
        ))?)
    }

    fn ensure_member(
        &self,
        channel: &Element,
        member: &ElementId,
    ) -> Result<Element, SessionError> {
        let Some(data) = channel.as_channel() else {
            return Err(SessionError::Store(foreman_core::StoreError::Constraint(
                format!("{} is not a channel", channel.id),
            )));
        };
        if data.has_member(member.as_str()) {
            return Ok(channel.clone());
        }
        let mut members = data.members.clone();
        members.push(member.as_str().to_string());

        let mut patch = serde_json::Map::new();
        patch.insert("members".into(), json!(members));
        Ok(self.manager.store().update(
            &channel.id,
            patch,
            foreman_storage::UpdateOptions {
                actor: Some(member.as_str().to_string()),
                ..Default::default()
            },
        )?)
    }
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
