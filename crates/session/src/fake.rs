// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable in-memory spawner for tests.
//!
//! Records every call, lets tests inject provider session ids, failures,
//! events, and process exits, and keeps a registry the manager's liveness
//! probes can interrogate.

use crate::spawner::{SessionEvent, SpawnError, SpawnOptions, SpawnedSession, Spawner};
use async_trait::async_trait;
use foreman_core::{SessionId, SessionMode, SessionStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One recorded spawner invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnerCall {
    Spawn {
        agent: String,
        mode: SessionMode,
        resume: Option<String>,
        prompt: Option<String>,
    },
    Terminate {
        session: String,
        graceful: bool,
    },
    Suspend {
        session: String,
    },
    Interrupt {
        session: String,
    },
    WriteToPty {
        session: String,
        data: String,
    },
    SendInput {
        session: String,
        data: String,
    },
}

struct FakeSession {
    opts: SpawnOptions,
    alive: bool,
    events: mpsc::Sender<SessionEvent>,
    created_at: u64,
}

#[derive(Default)]
struct FakeState {
    sessions: HashMap<SessionId, FakeSession>,
    calls: Vec<SpawnerCall>,
    scripted_provider_ids: VecDeque<String>,
    fail_spawn: Option<String>,
    fail_suspend: Option<String>,
    next_created_at: u64,
}

/// Call-recording spawner with scripted behaviour.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<SpawnerCall> {
        self.state.lock().calls.clone()
    }

    /// Queue a provider session id for the next spawn to report.
    pub fn push_provider_session_id(&self, id: impl Into<String>) {
        self.state.lock().scripted_provider_ids.push_back(id.into());
    }

    /// Make the next spawn fail.
    pub fn fail_next_spawn(&self, message: impl Into<String>) {
        self.state.lock().fail_spawn = Some(message.into());
    }

    /// Make every suspend fail until cleared with `None`.
    pub fn fail_suspend(&self, message: Option<String>) {
        self.state.lock().fail_suspend = message;
    }

    /// The prompt the most recent spawn was given.
    pub fn last_prompt(&self) -> Option<String> {
        let state = self.state.lock();
        state.calls.iter().rev().find_map(|call| match call {
            SpawnerCall::Spawn { prompt, .. } => prompt.clone(),
            _ => None,
        })
    }

    /// Emit an event into a session's channel.
    pub async fn emit(&self, id: &SessionId, event: SessionEvent) {
        let sender = self.state.lock().sessions.get(id).map(|s| s.events.clone());
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Simulate the process exiting: marks the session dead and emits the
    /// exit event.
    pub async fn exit_session(&self, id: &SessionId, code: Option<i32>) {
        {
            let mut state = self.state.lock();
            if let Some(session) = state.sessions.get_mut(id) {
                session.alive = false;
            }
        }
        self.emit(id, SessionEvent::Exited { code }).await;
    }

    /// Kill the process without any event — a crash the manager only
    /// discovers through liveness probing.
    pub fn kill_silently(&self, id: &SessionId) {
        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(id) {
            session.alive = false;
        }
    }
}

#[async_trait]
impl Spawner for FakeSpawner {
    async fn spawn(
        &self,
        opts: SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SpawnedSession, SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::Spawn {
            agent: opts.agent_id.to_string(),
            mode: opts.mode,
            resume: opts.resume_session_id.clone(),
            prompt: opts.prompt.clone(),
        });

        if let Some(message) = state.fail_spawn.take() {
            return Err(SpawnError::SpawnFailed(message));
        }

        let provider_session_id = opts
            .resume_session_id
            .clone()
            .or_else(|| state.scripted_provider_ids.pop_front());
        state.next_created_at += 1;
        let created_at = state.next_created_at;

        let spawned = SpawnedSession {
            id: opts.session_id.clone(),
            provider_session_id,
            mode: opts.mode,
            // No real process: pid stays empty so liveness goes through the
            // registry rather than signal probing.
            pid: None,
            status: SessionStatus::Running,
            working_dir: opts.working_dir.clone(),
            created_at,
        };
        state.sessions.insert(
            opts.session_id.clone(),
            FakeSession {
                opts,
                alive: true,
                events,
                created_at,
            },
        );
        Ok(spawned)
    }

    async fn terminate(&self, id: &SessionId, graceful: bool) -> Result<(), SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::Terminate {
            session: id.to_string(),
            graceful,
        });
        match state.sessions.get_mut(id) {
            Some(session) => {
                session.alive = false;
                Ok(())
            }
            None => Err(SpawnError::NotFound(id.to_string())),
        }
    }

    async fn suspend(&self, id: &SessionId) -> Result<(), SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::Suspend {
            session: id.to_string(),
        });
        if let Some(message) = state.fail_suspend.clone() {
            return Err(SpawnError::SuspendFailed(message));
        }
        match state.sessions.get_mut(id) {
            Some(session) => {
                session.alive = false;
                Ok(())
            }
            None => Err(SpawnError::NotFound(id.to_string())),
        }
    }

    async fn interrupt(&self, id: &SessionId) -> Result<(), SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::Interrupt {
            session: id.to_string(),
        });
        if state.sessions.contains_key(id) {
            Ok(())
        } else {
            Err(SpawnError::NotFound(id.to_string()))
        }
    }

    async fn write_to_pty(&self, id: &SessionId, data: &str) -> Result<(), SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::WriteToPty {
            session: id.to_string(),
            data: data.to_string(),
        });
        if state.sessions.contains_key(id) {
            Ok(())
        } else {
            Err(SpawnError::NotFound(id.to_string()))
        }
    }

    async fn send_input(&self, id: &SessionId, data: &str) -> Result<(), SpawnError> {
        let mut state = self.state.lock();
        state.calls.push(SpawnerCall::SendInput {
            session: id.to_string(),
            data: data.to_string(),
        });
        if state.sessions.contains_key(id) {
            Ok(())
        } else {
            Err(SpawnError::NotFound(id.to_string()))
        }
    }

    async fn get_session(&self, id: &SessionId) -> Option<SpawnedSession> {
        let state = self.state.lock();
        let session = state.sessions.get(id)?;
        if !session.alive {
            return None;
        }
        Some(SpawnedSession {
            id: id.clone(),
            provider_session_id: session.opts.resume_session_id.clone(),
            mode: session.opts.mode,
            pid: None,
            status: SessionStatus::Running,
            working_dir: session.opts.working_dir.clone(),
            created_at: session.created_at,
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
