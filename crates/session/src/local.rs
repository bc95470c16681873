// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local process spawner.
//!
//! Headless sessions are piped child processes whose stdout is parsed line
//! by line (JSON lines become structured events, the provider's session id
//! is sniffed out of them). Interactive sessions live in detached tmux
//! sessions; input goes through `send-keys` and liveness through
//! `has-session`. Every tmux invocation is bounded by a timeout so a hung
//! tmux server cannot wedge the session lifecycle.

use crate::spawner::{SessionEvent, SpawnError, SpawnOptions, SpawnedSession, Spawner};
use crate::subprocess::{run_with_timeout, tmux, TMUX_TIMEOUT};
use async_trait::async_trait;
use foreman_core::{SessionId, SessionMode, SessionStatus};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::warn;

/// Poll interval for tmux session liveness.
const TMUX_POLL_INTERVAL: Duration = Duration::from_secs(2);

struct LocalSession {
    mode: SessionMode,
    pid: Option<u32>,
    tmux_id: Option<String>,
    stdin: Option<Arc<tokio::sync::Mutex<tokio::process::ChildStdin>>>,
    alive: Arc<AtomicBool>,
    working_dir: PathBuf,
    provider_session_id: Option<String>,
    created_at: u64,
}

/// Spawner backed by local OS processes.
#[derive(Clone, Default)]
pub struct LocalSpawner {
    registry: Arc<Mutex<HashMap<SessionId, LocalSession>>>,
}

fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Provider CLI invocation shared by both modes.
fn provider_args(opts: &SpawnOptions) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(model) = &opts.model {
        args.push("--model".to_string());
        args.push(model.clone());
    }
    if let Some(resume) = &opts.resume_session_id {
        args.push("--resume".to_string());
        args.push(resume.clone());
    }
    if let Some(prompt) = &opts.prompt {
        args.push("-p".to_string());
        args.push(prompt.clone());
    }
    args
}

impl LocalSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    async fn spawn_headless(
        &self,
        opts: SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SpawnedSession, SpawnError> {
        let cwd = opts.worktree.clone().unwrap_or_else(|| opts.working_dir.clone());
        let mut cmd = Command::new(&opts.provider);
        cmd.args(provider_args(&opts))
            .current_dir(&cwd)
            .envs(opts.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::SpawnFailed(format!("{}: {e}", opts.provider)))?;
        let pid = child.id();
        let alive = Arc::new(AtomicBool::new(true));

        let stdin = child
            .stdin
            .take()
            .map(|s| Arc::new(tokio::sync::Mutex::new(s)));

        if let Some(stdout) = child.stdout.take() {
            let events = events.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match serde_json::from_str::<Value>(&line) {
                        Ok(value) => {
                            if let Some(session_id) =
                                value.get("session_id").and_then(Value::as_str)
                            {
                                let _ = events
                                    .send(SessionEvent::ProviderSessionId(
                                        session_id.to_string(),
                                    ))
                                    .await;
                            }
                            let _ = events.send(SessionEvent::Event(value)).await;
                        }
                        Err(_) => {
                            let _ = events.send(SessionEvent::Raw(line)).await;
                        }
                    }
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let events = events.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = events.send(SessionEvent::Stderr(line)).await;
                }
            });
        }

        {
            let events = events.clone();
            let alive = alive.clone();
            tokio::spawn(async move {
                let code = match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        let _ = events.send(SessionEvent::Error(e.to_string())).await;
                        None
                    }
                };
                alive.store(false, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Exited { code }).await;
            });
        }

        let created_at = epoch_ms_now();
        self.registry.lock().insert(
            opts.session_id.clone(),
            LocalSession {
                mode: SessionMode::Headless,
                pid,
                tmux_id: None,
                stdin,
                alive,
                working_dir: cwd.clone(),
                provider_session_id: opts.resume_session_id.clone(),
                created_at,
            },
        );

        Ok(SpawnedSession {
            id: opts.session_id,
            provider_session_id: opts.resume_session_id,
            mode: SessionMode::Headless,
            pid,
            status: SessionStatus::Running,
            working_dir: cwd,
            created_at,
        })
    }

    async fn spawn_interactive(
        &self,
        opts: SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SpawnedSession, SpawnError> {
        let cwd = opts.worktree.clone().unwrap_or_else(|| opts.working_dir.clone());
        if !cwd.exists() {
            return Err(SpawnError::SpawnFailed(format!(
                "working directory does not exist: {}",
                cwd.display()
            )));
        }

        let tmux_id = format!("foreman-{}", opts.session_id.short(12));

        // A leftover session under our name is stale; replace it.
        let existing = run_with_timeout(
            tmux(&["has-session", "-t", tmux_id.as_str()]),
            TMUX_TIMEOUT,
            "tmux has-session",
        )
        .await;
        if existing.map(|o| o.status.success()).unwrap_or(false) {
            warn!(tmux_id, "session already exists, killing first");
            let _ = run_with_timeout(
                tmux(&["kill-session", "-t", tmux_id.as_str()]),
                TMUX_TIMEOUT,
                "tmux kill-session",
            )
            .await;
        }

        let mut tmux_cmd = Command::new("tmux");
        tmux_cmd
            .arg("new-session")
            .arg("-d")
            .arg("-s")
            .arg(&tmux_id)
            .arg("-c")
            .arg(&cwd);
        for (key, value) in &opts.env {
            tmux_cmd.arg("-e").arg(format!("{key}={value}"));
        }

        let mut shell_cmd = opts.provider.clone();
        for arg in provider_args(&opts) {
            shell_cmd.push(' ');
            shell_cmd.push_str(&shell_quote(&arg));
        }
        tmux_cmd.arg(shell_cmd);

        let output = run_with_timeout(tmux_cmd, TMUX_TIMEOUT, "tmux new-session")
            .await
            .map_err(SpawnError::SpawnFailed)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpawnError::SpawnFailed(stderr.to_string()));
        }

        // The pane pid anchors zero-signal liveness probes.
        let pid = run_with_timeout(
            tmux(&["list-panes", "-t", tmux_id.as_str(), "-F", "#{pane_pid}"]),
            TMUX_TIMEOUT,
            "tmux list-panes",
        )
        .await
        .ok()
        .and_then(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .parse::<u32>()
                .ok()
        });

        let alive = Arc::new(AtomicBool::new(true));
        {
            let tmux_id = tmux_id.clone();
            let alive = alive.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(TMUX_POLL_INTERVAL).await;
                    let gone = match run_with_timeout(
                        tmux(&["has-session", "-t", tmux_id.as_str()]),
                        TMUX_TIMEOUT,
                        "tmux has-session",
                    )
                    .await
                    {
                        Ok(output) => !output.status.success(),
                        Err(e) => {
                            // Inconclusive probe; the next tick retries
                            // rather than reporting a false exit.
                            warn!(tmux_id, error = %e, "tmux liveness poll failed");
                            false
                        }
                    };
                    if gone {
                        alive.store(false, Ordering::SeqCst);
                        let _ = events.send(SessionEvent::Exited { code: None }).await;
                        break;
                    }
                }
            });
        }

        let created_at = epoch_ms_now();
        self.registry.lock().insert(
            opts.session_id.clone(),
            LocalSession {
                mode: SessionMode::Interactive,
                pid,
                tmux_id: Some(tmux_id),
                stdin: None,
                alive,
                working_dir: cwd.clone(),
                provider_session_id: opts.resume_session_id.clone(),
                created_at,
            },
        );

        Ok(SpawnedSession {
            id: opts.session_id,
            provider_session_id: opts.resume_session_id,
            mode: SessionMode::Interactive,
            pid,
            status: SessionStatus::Running,
            working_dir: cwd,
            created_at,
        })
    }

    fn signal(&self, id: &SessionId, signal: i32) -> Result<(), SpawnError> {
        let pid = self
            .registry
            .lock()
            .get(id)
            .and_then(|s| s.pid)
            .ok_or_else(|| SpawnError::NotFound(id.to_string()))?;
        send_signal(pid, signal).map_err(|e| SpawnError::SendFailed(e))
    }
}

#[async_trait]
impl Spawner for LocalSpawner {
    async fn spawn(
        &self,
        opts: SpawnOptions,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<SpawnedSession, SpawnError> {
        match opts.mode {
            SessionMode::Headless => self.spawn_headless(opts, events).await,
            SessionMode::Interactive => self.spawn_interactive(opts, events).await,
        }
    }

    async fn terminate(&self, id: &SessionId, graceful: bool) -> Result<(), SpawnError> {
        let (mode, tmux_id) = {
            let registry = self.registry.lock();
            let session = registry
                .get(id)
                .ok_or_else(|| SpawnError::NotFound(id.to_string()))?;
            (session.mode, session.tmux_id.clone())
        };
        match mode {
            SessionMode::Interactive => {
                if let Some(tmux_id) = tmux_id {
                    let _ = run_with_timeout(
                        tmux(&["kill-session", "-t", tmux_id.as_str()]),
                        TMUX_TIMEOUT,
                        "tmux kill-session",
                    )
                    .await;
                }
            }
            SessionMode::Headless => {
                // SIGTERM first; impatient callers escalate to SIGKILL.
                let signal = if graceful { libc_sigterm() } else { libc_sigkill() };
                self.signal(id, signal)?;
            }
        }
        Ok(())
    }

    async fn suspend(&self, id: &SessionId) -> Result<(), SpawnError> {
        // Releasing the process is enough: the provider keeps the session
        // transcript server-side, addressable by its session id.
        self.terminate(id, true).await.map_err(|e| match e {
            SpawnError::NotFound(id) => SpawnError::NotFound(id),
            other => SpawnError::SuspendFailed(other.to_string()),
        })
    }

    async fn interrupt(&self, id: &SessionId) -> Result<(), SpawnError> {
        let tmux_id = self
            .registry
            .lock()
            .get(id)
            .and_then(|s| s.tmux_id.clone());
        match tmux_id {
            Some(tmux_id) => {
                let output = run_with_timeout(
                    tmux(&["send-keys", "-t", tmux_id.as_str(), "Escape"]),
                    TMUX_TIMEOUT,
                    "tmux send-keys",
                )
                .await
                .map_err(SpawnError::SendFailed)?;
                if !output.status.success() {
                    return Err(SpawnError::NotFound(id.to_string()));
                }
                Ok(())
            }
            None => self.signal(id, libc_sigint()),
        }
    }

    async fn write_to_pty(&self, id: &SessionId, data: &str) -> Result<(), SpawnError> {
        let tmux_id = self
            .registry
            .lock()
            .get(id)
            .and_then(|s| s.tmux_id.clone())
            .ok_or_else(|| SpawnError::SendFailed(format!("{id} has no pty")))?;

        let output = if data == "\r" || data == "\n" {
            run_with_timeout(
                tmux(&["send-keys", "-t", tmux_id.as_str(), "Enter"]),
                TMUX_TIMEOUT,
                "tmux send-keys",
            )
            .await
        } else {
            // -l = literal mode, -- guards text starting with a dash
            run_with_timeout(
                tmux(&["send-keys", "-t", tmux_id.as_str(), "-l", "--", data]),
                TMUX_TIMEOUT,
                "tmux send-keys",
            )
            .await
        }
        .map_err(SpawnError::SendFailed)?;

        if !output.status.success() {
            return Err(SpawnError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn send_input(&self, id: &SessionId, data: &str) -> Result<(), SpawnError> {
        let stdin = self
            .registry
            .lock()
            .get(id)
            .and_then(|s| s.stdin.clone())
            .ok_or_else(|| SpawnError::SendFailed(format!("{id} has no stdin")))?;
        let mut stdin = stdin.lock().await;
        stdin
            .write_all(data.as_bytes())
            .await
            .map_err(|e| SpawnError::SendFailed(e.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| SpawnError::SendFailed(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SpawnError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Option<SpawnedSession> {
        let registry = self.registry.lock();
        let session = registry.get(id)?;
        if !session.alive.load(Ordering::SeqCst) {
            return None;
        }
        Some(SpawnedSession {
            id: id.clone(),
            provider_session_id: session.provider_session_id.clone(),
            mode: session.mode,
            pid: session.pid,
            status: SessionStatus::Running,
            working_dir: session.working_dir.clone(),
            created_at: session.created_at,
        })
    }
}

/// Minimal single-argument shell quoting for the tmux command line.
fn shell_quote(arg: &str) -> String {
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<(), String> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let signal = Signal::try_from(signal).map_err(|e| e.to_string())?;
    kill(Pid::from_raw(pid as i32), signal).map_err(|e| e.to_string())
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: i32) -> Result<(), String> {
    Err("signals unsupported on this platform".to_string())
}

#[cfg(unix)]
fn libc_sigterm() -> i32 {
    nix::sys::signal::Signal::SIGTERM as i32
}
#[cfg(unix)]
fn libc_sigkill() -> i32 {
    nix::sys::signal::Signal::SIGKILL as i32
}
#[cfg(unix)]
fn libc_sigint() -> i32 {
    nix::sys::signal::Signal::SIGINT as i32
}

#[cfg(not(unix))]
fn libc_sigterm() -> i32 {
    15
}
#[cfg(not(unix))]
fn libc_sigkill() -> i32 {
    9
}
#[cfg(not(unix))]
fn libc_sigint() -> i32 {
    2
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
