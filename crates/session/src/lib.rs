// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! foreman-session: agent process lifecycle management.
//!
//! The session manager owns the in-memory session tables and drives external
//! agent processes through the [`Spawner`] contract. Durable state — the
//! agent's session status, provider session id, and bounded history — is
//! projected into the agent entity's metadata through the store's normal
//! update path, so every projection write is audit-logged.

pub mod bus;
mod error;
pub mod handoff;
pub mod local;
pub mod manager;
pub mod reconcile;
pub mod spawner;
mod subprocess;
#[cfg(test)]
pub(crate) mod test_helpers;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSpawner, SpawnerCall};

pub use bus::SessionBus;
pub use error::SessionError;
pub use handoff::{HandoffOutcome, HandoffRequest, HandoffService};
pub use local::LocalSpawner;
pub use manager::{
    MessageContent, ResumeOptions, ResumeOutcome, SessionInfo, SessionManager, StartOptions,
    TaskBrief, WorkProbe,
};
pub use reconcile::ReconcileReport;
pub use spawner::{SessionEvent, SpawnError, SpawnOptions, SpawnedSession, Spawner};
