// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager errors.
//!
//! Programmer errors (unknown agent, a session addressed through the wrong
//! agent) are distinct variants from operational failures, so callers can
//! treat the former as bugs and the latter as results.

use foreman_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("{0} is not an agent entity")]
    NotAnAgent(String),

    #[error("agent {0} already has an active session")]
    AlreadyActive(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {session} belongs to agent {owner}")]
    ForeignSession { session: String, owner: String },

    #[error("session {session} is {status}, expected {expected}")]
    InvalidStatus {
        session: String,
        status: String,
        expected: String,
    },

    #[error("session {0} is not interactive")]
    NotInteractive(String),

    #[error("no provider session id recorded for {0}; cannot resume")]
    NotResumable(String),

    #[error(transparent)]
    Spawn(#[from] crate::spawner::SpawnError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
