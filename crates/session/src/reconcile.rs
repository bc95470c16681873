// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation: persisted state vs the actual world.
//!
//! After a restart the in-memory session tables are empty, but agent
//! entities may still claim a running session. Each such agent is checked
//! against the live tables and the recorded pid; stale claims reset to idle.

use crate::manager::SessionManager;
use crate::spawner::Spawner;
use foreman_core::{
    agent_meta, agent_session_status, Clock, ElementKind, IdGen,
};
use foreman_storage::ElementFilter;
use serde_json::{json, Map, Value};
use tracing::info;

/// Outcome of [`SessionManager::reconcile_on_startup`].
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub reconciled: usize,
    pub errors: Vec<String>,
}

impl<S: Spawner, C: Clock, G: IdGen> SessionManager<S, C, G> {
    /// Reset agents whose persisted `session_status` claims a running
    /// session that no longer exists.
    pub async fn reconcile_on_startup(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let agents = match self.store().list(
            &ElementFilter::of_kind(ElementKind::Entity)
                .with_metadata(agent_meta::SESSION_STATUS, agent_session_status::RUNNING),
        ) {
            Ok(agents) => agents,
            Err(e) => {
                report.errors.push(format!("listing agents: {e}"));
                return report;
            }
        };

        for agent in agents {
            // A live in-memory session with an alive process is legitimate.
            match self.get_active_session(&agent.id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    report.errors.push(format!("{}: {e}", agent.id));
                    continue;
                }
            }

            // A recorded pid that is still alive also counts: the session
            // may belong to a previous incarnation we can't address, but the
            // process exists. A dead or absent pid does not.
            let pid = agent
                .data
                .metadata()
                .get(agent_meta::LAST_SESSION_PID)
                .and_then(Value::as_u64);
            if let Some(pid) = pid {
                if crate::manager::pid_alive(pid as u32) {
                    continue;
                }
            }

            let mut meta = Map::new();
            meta.insert(
                agent_meta::SESSION_STATUS.into(),
                json!(agent_session_status::IDLE),
            );
            meta.insert(agent_meta::LAST_SESSION_PID.into(), Value::Null);
            let mut patch = Map::new();
            patch.insert("metadata".into(), Value::Object(meta));

            match self.store().update(
                &agent.id,
                patch,
                foreman_storage::UpdateOptions {
                    actor: Some("session-manager".into()),
                    ..Default::default()
                },
            ) {
                Ok(_) => {
                    info!(agent = %agent.id, "reconciled stale running session to idle");
                    report.reconciled += 1;
                }
                Err(e) => report.errors.push(format!("{}: {e}", agent.id)),
            }
        }

        report
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
