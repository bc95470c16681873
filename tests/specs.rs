//! Behavioural specifications for the foreman work substrate.
//!
//! These tests exercise the crates together the way an embedding daemon
//! would: store + engine + session manager, end to end.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/gates.rs"]
mod gates;

#[path = "specs/messaging.rs"]
mod messaging;

#[path = "specs/plans.rs"]
mod plans;

#[path = "specs/priority.rs"]
mod priority;

#[path = "specs/roundtrip.rs"]
mod roundtrip;

#[path = "specs/sessions.rs"]
mod sessions;

#[path = "specs/workflows.rs"]
mod workflows;
