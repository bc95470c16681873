// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifiers, statuses, and the projection persisted into agent
//! entity metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Internal identifier for one live connection to an agent process.
    ///
    /// Distinct from the provider-assigned session id, which is opaque and
    /// only required for resume.
    pub struct SessionId;
}

/// How the agent process is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Piped stdio, stream-driven.
    Headless,
    /// PTY-backed terminal session.
    Interactive,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Headless => "headless",
            SessionMode::Interactive => "interactive",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session lifecycle.
///
/// ```text
///  starting → running → suspended   (process released, provider id kept)
///                     ↘ terminated  (stop or natural exit)
///  suspended → running              (resume via provider session id)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Transitional; serves event subscriptions racing process init.
    Starting,
    Running,
    Suspended,
    Terminating,
    Terminated,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Terminated)
    }

    /// Statuses that count against the one-active-session-per-agent rule.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionStatus::Starting | SessionStatus::Running | SessionStatus::Terminating
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Terminating => "terminating",
            SessionStatus::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role of an agent entity; determines the default session mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Director,
    Worker,
    EphemeralWorker,
    Steward,
}

impl AgentRole {
    /// Directors and persistent workers get a PTY; ephemeral workers and
    /// stewards run headless.
    pub fn default_mode(&self) -> SessionMode {
        match self {
            AgentRole::Director | AgentRole::Worker => SessionMode::Interactive,
            AgentRole::EphemeralWorker | AgentRole::Steward => SessionMode::Headless,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Director => "director",
            AgentRole::Worker => "worker",
            AgentRole::EphemeralWorker => "ephemeral_worker",
            AgentRole::Steward => "steward",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "director" => Some(AgentRole::Director),
            "worker" => Some(AgentRole::Worker),
            "ephemeral_worker" => Some(AgentRole::EphemeralWorker),
            "steward" => Some(AgentRole::Steward),
            _ => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded per-agent session history kept in the agent's metadata.
pub const SESSION_HISTORY_LIMIT: usize = 20;

/// One entry of the persisted session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_session_id: Option<String>,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub working_dir: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Metadata keys the session manager reads and writes on agent entities.
pub mod agent_meta {
    pub const ROLE: &str = "role";
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
    pub const SESSION_STATUS: &str = "session_status";
    pub const PROVIDER_SESSION_ID: &str = "provider_session_id";
    pub const SESSION_HISTORY: &str = "session_history";
    pub const LAST_SESSION_PID: &str = "last_session_pid";
    pub const LAST_WORKING_DIR: &str = "last_working_dir";
}

/// Values written to `agent_meta::SESSION_STATUS`.
pub mod agent_session_status {
    pub const RUNNING: &str = "running";
    pub const SUSPENDED: &str = "suspended";
    pub const IDLE: &str = "idle";
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
