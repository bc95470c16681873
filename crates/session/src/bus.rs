// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session event bus.
//!
//! One producer (the manager's forwarding task), any number of ordered
//! subscribers. Emission is serialised by construction: only the forwarding
//! task emits, so handlers observe events in spawner order.

use crate::spawner::SessionEvent;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// Broadcast bus carrying a session's events to its subscribers.
#[derive(Clone)]
pub struct SessionBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe from this point forward. Slow subscribers miss events
    /// rather than blocking the producer.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit to all current subscribers. Lagging or absent subscribers are
    /// not an error.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
