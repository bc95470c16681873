// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The spawner contract: how the session manager reaches external agent
//! processes.
//!
//! The manager creates the event channel and hands the sender to `spawn`
//! before awaiting anything, so an immediate process exit is buffered rather
//! than lost.

use async_trait::async_trait;
use foreman_core::{ElementId, SessionId, SessionMode, SessionStatus};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from spawner operations
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("suspend failed: {0}")]
    SuspendFailed(String),
    #[error("terminate failed: {0}")]
    TerminateFailed(String),
}

/// Everything a spawner needs to start one agent process.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Internal session id assigned by the manager.
    pub session_id: SessionId,
    pub agent_id: ElementId,
    pub mode: SessionMode,
    /// Provider binary or adapter name, from agent metadata.
    pub provider: String,
    pub model: Option<String>,
    pub working_dir: PathBuf,
    /// Git worktree the session operates in, when isolated from the main
    /// checkout.
    pub worktree: Option<PathBuf>,
    /// Initial or resume prompt.
    pub prompt: Option<String>,
    /// Provider session id to resume; `None` starts fresh.
    pub resume_session_id: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Snapshot of a process-level session as the spawner sees it.
#[derive(Debug, Clone)]
pub struct SpawnedSession {
    pub id: SessionId,
    pub provider_session_id: Option<String>,
    pub mode: SessionMode,
    pub pid: Option<u32>,
    pub status: SessionStatus,
    pub working_dir: PathBuf,
    pub created_at: u64,
}

/// Per-session events the spawner emits.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Structured provider event (parsed JSON line).
    Event(Value),
    /// Terminal output from an interactive session.
    PtyData(String),
    /// A stderr line from a headless process.
    Stderr(String),
    /// Unparseable output, passed through verbatim.
    Raw(String),
    /// Adapter-level failure the process may survive.
    Error(String),
    /// The provider assigned its session id (required for resume).
    ProviderSessionId(String),
    /// The process exited.
    Exited { code: Option<i32> },
}

impl SessionEvent {
    /// Whether this event represents process output and should tick the
    /// session's activity clock.
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            SessionEvent::PtyData(_) | SessionEvent::Raw(_) | SessionEvent::Event(_)
        )
    }
}

/// Adapter for spawning and controlling agent processes.
#[async_trait]
pub trait Spawner: Clone + Send + Sync + 'static {
    /// Start a process. Events flow into `events` from before this call
    /// returns; the caller must already be draining the channel.
    async fn spawn(
        &self,
        opts: SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SpawnedSession, SpawnError>;

    /// Stop the process. `graceful` asks politely first.
    async fn terminate(&self, id: &SessionId, graceful: bool) -> Result<(), SpawnError>;

    /// Release the process while preserving the provider's session id.
    async fn suspend(&self, id: &SessionId) -> Result<(), SpawnError>;

    /// Non-terminal signal to a running interactive process.
    async fn interrupt(&self, id: &SessionId) -> Result<(), SpawnError>;

    /// Write raw data to an interactive session's terminal.
    async fn write_to_pty(&self, id: &SessionId, data: &str) -> Result<(), SpawnError>;

    /// Write a line to a headless session's stdin.
    async fn send_input(&self, id: &SessionId, data: &str) -> Result<(), SpawnError>;

    /// Registry lookup; `None` once the process is gone.
    async fn get_session(&self, id: &SessionId) -> Option<SpawnedSession>;
}
