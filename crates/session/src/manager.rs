// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session manager: at-most-one active session per agent, lifecycle
//! transitions, event forwarding, liveness probing, and persisted history.
//!
//! In-memory session records are owned exclusively by this type. The durable
//! projection (status, provider session id, bounded history) lives in the
//! agent entity's metadata and goes through the store's update path so it is
//! journaled like any other mutation.

use crate::bus::SessionBus;
use crate::error::SessionError;
use crate::spawner::{SessionEvent, SpawnOptions, Spawner};
use foreman_core::{
    agent_meta, agent_session_status, AgentRole, Clock, Element, ElementId, IdGen, SessionId,
    SessionHistoryEntry, SessionMode, SessionStatus, StoreError, SESSION_HISTORY_LIMIT,
};
use foreman_storage::{ElementFilter, Store, UpdateOptions};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Terminal paste buffers need a beat between the body and the submitting
/// carriage return.
const INTERACTIVE_SUBMIT_DELAY: Duration = Duration::from_millis(1500);

/// How long a terminated session stays queryable before in-memory cleanup.
const CLEANUP_DELAY: Duration = Duration::from_secs(30);

/// Lines of recent output retained per session for handoff context.
const TRANSCRIPT_LIMIT: usize = 200;

/// Event channel depth between spawner and forwarding task.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Options for [`SessionManager::start_session`].
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub prompt: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub worktree: Option<PathBuf>,
    /// Override the role-derived mode.
    pub mode: Option<SessionMode>,
    /// Override the agent's configured provider/model.
    pub provider: Option<String>,
    pub model: Option<String>,
    pub env: Vec<(String, String)>,
}

/// Options for [`SessionManager::resume_session`].
#[derive(Debug, Clone, Default)]
pub struct ResumeOptions {
    /// Provider session id to resume; defaults to the one persisted on the
    /// agent.
    pub provider_session_id: Option<String>,
    pub prompt: Option<String>,
    /// Defaults to the working directory recorded in session history.
    pub working_dir: Option<PathBuf>,
}

/// The top ready task surfaced by the universal-work-principle probe.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskBrief {
    pub id: ElementId,
    pub title: String,
    pub priority: u8,
}

/// Resume-time probe: is there work already assigned to this agent?
///
/// The scheduler side implements this; the manager only consumes it, so the
/// session crate never depends on scheduling internals.
pub trait WorkProbe: Send + Sync {
    fn top_ready_task(&self, agent_id: &ElementId) -> Result<Option<TaskBrief>, StoreError>;
}

impl<F> WorkProbe for F
where
    F: Fn(&ElementId) -> Result<Option<TaskBrief>, StoreError> + Send + Sync,
{
    fn top_ready_task(&self, agent_id: &ElementId) -> Result<Option<TaskBrief>, StoreError> {
        self(agent_id)
    }
}

/// Outcome of [`SessionManager::resume_session`].
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub session: SessionInfo,
    /// The UWP task prepended to the resume prompt, if any.
    pub pending_task: Option<TaskBrief>,
}

/// Message body for [`SessionManager::send_message`].
#[derive(Debug, Clone)]
pub enum MessageContent {
    Literal(String),
    /// Resolve a document's content by reference.
    Ref(ElementId),
}

/// Read-only snapshot of a session record.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub agent_id: ElementId,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub provider_session_id: Option<String>,
    pub pid: Option<u32>,
    pub working_dir: PathBuf,
    pub worktree: Option<PathBuf>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub last_activity: u64,
    pub ended_at: Option<u64>,
}

struct SessionState {
    status: SessionStatus,
    provider_session_id: Option<String>,
    pid: Option<u32>,
    started_at: Option<u64>,
    last_activity: u64,
    ended_at: Option<u64>,
    transcript: VecDeque<String>,
}

/// One in-memory session record.
pub(crate) struct SessionHandle {
    pub(crate) id: SessionId,
    pub(crate) agent_id: ElementId,
    pub(crate) mode: SessionMode,
    pub(crate) working_dir: PathBuf,
    pub(crate) worktree: Option<PathBuf>,
    pub(crate) created_at: u64,
    bus: SessionBus,
    state: Mutex<SessionState>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn snapshot(&self) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            id: self.id.clone(),
            agent_id: self.agent_id.clone(),
            mode: self.mode,
            status: state.status,
            provider_session_id: state.provider_session_id.clone(),
            pid: state.pid,
            working_dir: self.working_dir.clone(),
            worktree: self.worktree.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            last_activity: state.last_activity,
            ended_at: state.ended_at,
        }
    }

    fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub(crate) fn transcript_tail(&self) -> Vec<String> {
        self.state.lock().transcript.iter().cloned().collect()
    }
}

struct Tables {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    by_agent: RwLock<HashMap<ElementId, SessionId>>,
}

/// Agent process lifecycle owner.
pub struct SessionManager<S: Spawner, C: Clock, G: IdGen> {
    spawner: S,
    store: Arc<Store<C, G>>,
    ids: G,
    tables: Arc<Tables>,
}

impl<S: Spawner, C: Clock, G: IdGen> SessionManager<S, C, G> {
    pub fn new(spawner: S, store: Arc<Store<C, G>>, ids: G) -> Self {
        Self {
            spawner,
            store,
            ids,
            tables: Arc::new(Tables {
                sessions: RwLock::new(HashMap::new()),
                by_agent: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<Store<C, G>> {
        &self.store
    }

    fn load_agent(&self, agent_id: &ElementId) -> Result<Element, SessionError> {
        let agent = self
            .store
            .get(agent_id)?
            .ok_or_else(|| SessionError::AgentNotFound(agent_id.to_string()))?;
        if agent.as_entity().is_none() || agent.is_tombstoned() {
            return Err(SessionError::NotAnAgent(agent_id.to_string()));
        }
        Ok(agent)
    }

    fn ensure_no_active_session(&self, agent_id: &ElementId) -> Result<(), SessionError> {
        let existing = self.tables.by_agent.read().get(agent_id).cloned();
        if let Some(session_id) = existing {
            if let Some(handle) = self.tables.sessions.read().get(&session_id) {
                if handle.status().is_active() {
                    return Err(SessionError::AlreadyActive(agent_id.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Start a fresh session for an agent.
    ///
    /// The event forwarder is attached before the spawner is awaited so an
    /// immediate exit is buffered, not lost.
    pub async fn start_session(
        &self,
        agent_id: &ElementId,
        opts: StartOptions,
    ) -> Result<SessionInfo, SessionError> {
        let agent = self.load_agent(agent_id)?;
        self.ensure_no_active_session(agent_id)?;
        let config = AgentConfig::from_entity(&agent);

        let spawn = SpawnOptions {
            session_id: SessionId::new(self.ids.next()),
            agent_id: agent_id.clone(),
            mode: opts.mode.unwrap_or_else(|| config.role.default_mode()),
            provider: opts.provider.unwrap_or(config.provider),
            model: opts.model.or(config.model),
            working_dir: opts
                .working_dir
                .or(config.last_working_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            worktree: opts.worktree,
            prompt: opts.prompt,
            resume_session_id: None,
            env: opts.env,
        };

        self.launch(spawn).await
    }

    /// Resume a suspended session from its provider session id.
    ///
    /// When a work probe is supplied, the agent's top ready task is looked
    /// up *before* resume and an instruction block naming it is prepended to
    /// the prompt — the agent services assigned work before continuing prior
    /// context.
    pub async fn resume_session(
        &self,
        agent_id: &ElementId,
        opts: ResumeOptions,
        probe: Option<&dyn WorkProbe>,
    ) -> Result<ResumeOutcome, SessionError> {
        let agent = self.load_agent(agent_id)?;
        self.ensure_no_active_session(agent_id)?;
        let config = AgentConfig::from_entity(&agent);

        let provider_session_id = opts
            .provider_session_id
            .or_else(|| config.provider_session_id.clone())
            .ok_or_else(|| SessionError::NotResumable(agent_id.to_string()))?;

        let pending_task = match probe {
            Some(probe) => probe.top_ready_task(agent_id)?,
            None => None,
        };
        let prompt = match (&pending_task, opts.prompt) {
            (Some(task), prompt) => {
                let mut block = format!(
                    "Before resuming prior context, service the work already \
                     assigned to you: task {} ({}, priority {}).",
                    task.id, task.title, task.priority
                );
                if let Some(prompt) = prompt {
                    block.push_str("\n\n");
                    block.push_str(&prompt);
                }
                Some(block)
            }
            (None, prompt) => prompt,
        };

        // Fall back to the directory the previous session ran in.
        let working_dir = opts
            .working_dir
            .or_else(|| {
                config
                    .history
                    .first()
                    .map(|entry| PathBuf::from(&entry.working_dir))
            })
            .or(config.last_working_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        let spawn = SpawnOptions {
            session_id: SessionId::new(self.ids.next()),
            agent_id: agent_id.clone(),
            mode: config.role.default_mode(),
            provider: config.provider,
            model: config.model,
            working_dir,
            worktree: None,
            prompt,
            resume_session_id: Some(provider_session_id),
            env: Vec::new(),
        };

        let session = self.launch(spawn).await?;
        Ok(ResumeOutcome {
            session,
            pending_task,
        })
    }

    /// Shared spawn path: register the record, attach forwarding, spawn,
    /// then persist the running projection.
    async fn launch(&self, spawn: SpawnOptions) -> Result<SessionInfo, SessionError> {
        let now = self.store.clock().epoch_ms();
        let handle = Arc::new(SessionHandle {
            id: spawn.session_id.clone(),
            agent_id: spawn.agent_id.clone(),
            mode: spawn.mode,
            working_dir: spawn.working_dir.clone(),
            worktree: spawn.worktree.clone(),
            created_at: now,
            bus: SessionBus::new(),
            state: Mutex::new(SessionState {
                status: SessionStatus::Starting,
                provider_session_id: spawn.resume_session_id.clone(),
                pid: None,
                started_at: None,
                last_activity: now,
                ended_at: None,
                transcript: VecDeque::new(),
            }),
            forwarder: Mutex::new(None),
        });

        // Register under both keys before anything can await.
        self.tables
            .sessions
            .write()
            .insert(handle.id.clone(), handle.clone());
        self.tables
            .by_agent
            .write()
            .insert(handle.agent_id.clone(), handle.id.clone());

        // Attach the forwarder before the spawner runs: events emitted
        // during process startup buffer in the channel.
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_events(self.store.clone(), handle.clone(), rx));
        *handle.forwarder.lock() = Some(forwarder);

        match self.spawner.spawn(spawn, tx).await {
            Ok(spawned) => {
                let provider_session_id;
                {
                    let mut state = handle.state.lock();
                    state.status = SessionStatus::Running;
                    state.started_at = Some(self.store.clock().epoch_ms());
                    state.pid = spawned.pid;
                    if state.provider_session_id.is_none() {
                        state.provider_session_id = spawned.provider_session_id.clone();
                    }
                    provider_session_id = state.provider_session_id.clone();
                }

                persist_projection(
                    &self.store,
                    &handle.agent_id,
                    agent_session_status::RUNNING,
                    provider_session_id.as_deref(),
                    handle.state.lock().pid,
                    Some(&handle.working_dir),
                )?;
                Ok(handle.snapshot())
            }
            Err(e) => {
                // Roll the registration back; the forwarder ends when the
                // channel drops.
                if let Some(task) = handle.forwarder.lock().take() {
                    task.abort();
                }
                self.tables.sessions.write().remove(&handle.id);
                let mut by_agent = self.tables.by_agent.write();
                if by_agent.get(&handle.agent_id) == Some(&handle.id) {
                    by_agent.remove(&handle.agent_id);
                }
                Err(e.into())
            }
        }
    }

    fn require_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Arc<SessionHandle>, SessionError> {
        self.tables
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    /// Suspend a running session, releasing the process but keeping the
    /// provider session id for later resume.
    pub async fn suspend_session(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let handle = self.require_session(session_id)?;
        let now = self.store.clock().epoch_ms();

        // Flip the status before asking the spawner: the exit handler must
        // see `suspended`, not a still-running record it would move to
        // terminated.
        {
            let mut state = handle.state.lock();
            if state.status != SessionStatus::Running {
                return Err(SessionError::InvalidStatus {
                    session: session_id.to_string(),
                    status: state.status.to_string(),
                    expected: "running".into(),
                });
            }
            state.status = SessionStatus::Suspended;
            state.ended_at = Some(now);
        }

        if let Err(e) = self.spawner.suspend(session_id).await {
            // Revert; the process is still there.
            let mut state = handle.state.lock();
            state.status = SessionStatus::Running;
            state.ended_at = None;
            return Err(e.into());
        }

        let provider_session_id = handle.state.lock().provider_session_id.clone();
        persist_projection(
            &self.store,
            &handle.agent_id,
            agent_session_status::SUSPENDED,
            provider_session_id.as_deref(),
            None,
            Some(&handle.working_dir),
        )?;
        push_history(&self.store, &handle, Some("suspended".into()))?;
        Ok(())
    }

    /// Terminate a session. Detaches listeners, schedules in-memory cleanup,
    /// and idles the agent.
    pub async fn stop_session(
        &self,
        session_id: &SessionId,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        let handle = self.require_session(session_id)?;
        let now = self.store.clock().epoch_ms();

        {
            let mut state = handle.state.lock();
            if state.status == SessionStatus::Terminated {
                return Ok(());
            }
            state.status = SessionStatus::Terminating;
        }

        if let Err(e) = self.spawner.terminate(session_id, true).await {
            warn!(session = %session_id, error = %e, "graceful terminate failed");
        }

        if let Some(task) = handle.forwarder.lock().take() {
            task.abort();
        }
        {
            let mut state = handle.state.lock();
            state.status = SessionStatus::Terminated;
            state.ended_at = Some(now);
        }

        persist_projection(
            &self.store,
            &handle.agent_id,
            agent_session_status::IDLE,
            handle.state.lock().provider_session_id.as_deref(),
            None,
            Some(&handle.working_dir),
        )?;
        push_history(&self.store, &handle, reason)?;

        let tables = self.tables.clone();
        let id = session_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CLEANUP_DELAY).await;
            tables.sessions.write().remove(&id);
        });
        Ok(())
    }

    /// Non-terminal interrupt, the programmatic analog of pressing Escape.
    /// Interactive sessions only; no state change.
    pub async fn interrupt_session(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let handle = self.require_session(session_id)?;
        if handle.mode != SessionMode::Interactive {
            return Err(SessionError::NotInteractive(session_id.to_string()));
        }
        self.spawner.interrupt(session_id).await?;
        Ok(())
    }

    /// Deliver a message into a running session.
    ///
    /// Interactive sessions get the body, a pause for the terminal to flush
    /// its paste buffer, then the carriage return. Headless sessions get a
    /// stdin line.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        sender: &str,
        content: MessageContent,
    ) -> Result<(), SessionError> {
        let handle = self.require_session(session_id)?;
        if handle.status() != SessionStatus::Running {
            return Err(SessionError::InvalidStatus {
                session: session_id.to_string(),
                status: handle.status().to_string(),
                expected: "running".into(),
            });
        }

        let body = match content {
            MessageContent::Literal(text) => text,
            MessageContent::Ref(doc_id) => {
                let doc = self
                    .store
                    .get(&doc_id)?
                    .ok_or_else(|| StoreError::not_found(&doc_id))?;
                doc.as_document()
                    .map(|d| d.content.clone())
                    .ok_or_else(|| {
                        StoreError::Constraint(format!("{doc_id} is not a document"))
                    })?
            }
        };
        let formatted = format!("[Message from {sender}]: {body}");

        match handle.mode {
            SessionMode::Interactive => {
                self.spawner.write_to_pty(session_id, &formatted).await?;
                tokio::time::sleep(INTERACTIVE_SUBMIT_DELAY).await;
                self.spawner.write_to_pty(session_id, "\r").await?;
            }
            SessionMode::Headless => {
                self.spawner.send_input(session_id, &formatted).await?;
            }
        }
        Ok(())
    }

    /// Subscribe to a session's event bus. Valid from `starting` onward, so
    /// subscriptions can race process initialisation.
    pub fn subscribe(
        &self,
        session_id: &SessionId,
    ) -> Result<tokio::sync::broadcast::Receiver<SessionEvent>, SessionError> {
        Ok(self.require_session(session_id)?.bus.subscribe())
    }

    /// Unprobed snapshot by session id.
    pub fn get_session(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.tables
            .sessions
            .read()
            .get(session_id)
            .map(|h| h.snapshot())
    }

    /// The agent's live session, liveness-checked: a record whose process
    /// has died is transitioned to terminated on the spot.
    pub async fn get_active_session(
        &self,
        agent_id: &ElementId,
    ) -> Result<Option<SessionInfo>, SessionError> {
        let session_id = self.tables.by_agent.read().get(agent_id).cloned();
        let Some(session_id) = session_id else {
            return Ok(None);
        };
        let Some(handle) = self.tables.sessions.read().get(&session_id).cloned() else {
            return Ok(None);
        };
        if handle.status() != SessionStatus::Running {
            return Ok(None);
        }
        if !self.probe_alive(&handle).await {
            self.bury_ghost(&handle)?;
            return Ok(None);
        }
        Ok(Some(handle.snapshot()))
    }

    /// All sessions, optionally only active ones. Active listings are
    /// liveness-checked the same way as [`Self::get_active_session`].
    pub async fn list_sessions(
        &self,
        active_only: bool,
    ) -> Result<Vec<SessionInfo>, SessionError> {
        let handles: Vec<Arc<SessionHandle>> =
            self.tables.sessions.read().values().cloned().collect();
        let mut result = Vec::new();
        for handle in handles {
            let status = handle.status();
            if active_only {
                if !status.is_active() {
                    continue;
                }
                if status == SessionStatus::Running && !self.probe_alive(&handle).await {
                    self.bury_ghost(&handle)?;
                    continue;
                }
            }
            result.push(handle.snapshot());
        }
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    /// Cross-check that the OS process behind a record is still there.
    async fn probe_alive(&self, handle: &Arc<SessionHandle>) -> bool {
        let pid = handle.state.lock().pid;
        match (handle.mode, pid) {
            (SessionMode::Interactive, Some(pid)) => pid_alive(pid),
            _ => self.spawner.get_session(&handle.id).await.is_some(),
        }
    }

    fn bury_ghost(&self, handle: &Arc<SessionHandle>) -> Result<(), SessionError> {
        debug!(session = %handle.id, agent = %handle.agent_id, "ghost session detected");
        let now = self.store.clock().epoch_ms();
        {
            let mut state = handle.state.lock();
            if state.status == SessionStatus::Terminated {
                return Ok(());
            }
            state.status = SessionStatus::Terminated;
            state.ended_at = Some(now);
        }
        if let Some(task) = handle.forwarder.lock().take() {
            task.abort();
        }
        persist_projection(
            &self.store,
            &handle.agent_id,
            agent_session_status::IDLE,
            handle.state.lock().provider_session_id.as_deref(),
            None,
            Some(&handle.working_dir),
        )?;
        push_history(&self.store, handle, Some("Process no longer alive".into()))?;
        Ok(())
    }

    /// Recent output tail for a session, newest last.
    pub fn capture_output(&self, session_id: &SessionId) -> Result<Vec<String>, SessionError> {
        Ok(self.require_session(session_id)?.transcript_tail())
    }

    /// Persisted history for one agent, newest first.
    pub fn session_history(
        &self,
        agent_id: &ElementId,
    ) -> Result<Vec<SessionHistoryEntry>, SessionError> {
        let agent = self.load_agent(agent_id)?;
        Ok(read_history(&agent))
    }

    /// Histories aggregated across every agent with the given role.
    pub fn history_for_role(
        &self,
        role: AgentRole,
    ) -> Result<Vec<(ElementId, SessionHistoryEntry)>, SessionError> {
        let agents = self.store.list(
            &ElementFilter::of_kind(foreman_core::ElementKind::Entity)
                .with_metadata(agent_meta::ROLE, role.as_str()),
        )?;
        let mut entries = Vec::new();
        for agent in &agents {
            for entry in read_history(agent) {
                entries.push((agent.id.clone(), entry));
            }
        }
        entries.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(entries)
    }

    /// The most recent non-running session for a role; what a successor
    /// queries to pick up its predecessor's context.
    pub fn previous_session(
        &self,
        role: AgentRole,
    ) -> Result<Option<(ElementId, SessionHistoryEntry)>, SessionError> {
        Ok(self
            .history_for_role(role)?
            .into_iter()
            .find(|(_, entry)| entry.status != SessionStatus::Running))
    }
}

/// Agent configuration pulled out of entity metadata.
struct AgentConfig {
    role: AgentRole,
    provider: String,
    model: Option<String>,
    provider_session_id: Option<String>,
    last_working_dir: Option<PathBuf>,
    history: Vec<SessionHistoryEntry>,
}

impl AgentConfig {
    fn from_entity(agent: &Element) -> Self {
        let meta = agent.data.metadata();
        let get = |key: &str| meta.get(key).and_then(Value::as_str);
        Self {
            role: get(agent_meta::ROLE)
                .and_then(AgentRole::parse)
                .unwrap_or(AgentRole::Worker),
            provider: get(agent_meta::PROVIDER).unwrap_or("claude").to_string(),
            model: get(agent_meta::MODEL).map(str::to_string),
            provider_session_id: get(agent_meta::PROVIDER_SESSION_ID).map(str::to_string),
            last_working_dir: get(agent_meta::LAST_WORKING_DIR).map(PathBuf::from),
            history: read_history(agent),
        }
    }
}

fn read_history(agent: &Element) -> Vec<SessionHistoryEntry> {
    agent
        .data
        .metadata()
        .get(agent_meta::SESSION_HISTORY)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Write the session projection into the agent's metadata through the
/// store's normal update path.
fn persist_projection<C: Clock, G: IdGen>(
    store: &Store<C, G>,
    agent_id: &ElementId,
    status: &str,
    provider_session_id: Option<&str>,
    pid: Option<u32>,
    working_dir: Option<&std::path::Path>,
) -> Result<(), StoreError> {
    let mut meta = Map::new();
    meta.insert(agent_meta::SESSION_STATUS.into(), json!(status));
    meta.insert(
        agent_meta::PROVIDER_SESSION_ID.into(),
        provider_session_id.map(Value::from).unwrap_or(Value::Null),
    );
    meta.insert(
        agent_meta::LAST_SESSION_PID.into(),
        pid.map(Value::from).unwrap_or(Value::Null),
    );
    if let Some(dir) = working_dir {
        meta.insert(
            agent_meta::LAST_WORKING_DIR.into(),
            json!(dir.display().to_string()),
        );
    }

    let mut patch = Map::new();
    patch.insert("metadata".into(), Value::Object(meta));
    store.update(
        agent_id,
        patch,
        UpdateOptions {
            actor: Some("session-manager".into()),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Append a finished (or suspended) session to the agent's bounded history.
fn push_history<C: Clock, G: IdGen>(
    store: &Store<C, G>,
    handle: &SessionHandle,
    reason: Option<String>,
) -> Result<(), StoreError> {
    let agent = match store.get(&handle.agent_id)? {
        Some(agent) => agent,
        None => return Ok(()),
    };
    let mut history = read_history(&agent);

    let state = handle.state.lock();
    let entry = SessionHistoryEntry {
        id: handle.id.clone(),
        provider_session_id: state.provider_session_id.clone(),
        mode: handle.mode,
        status: state.status,
        working_dir: handle.working_dir.display().to_string(),
        created_at: handle.created_at,
        ended_at: state.ended_at,
        reason,
    };
    drop(state);

    history.retain(|e| e.id != entry.id);
    history.insert(0, entry);
    history.truncate(SESSION_HISTORY_LIMIT);

    let mut meta = Map::new();
    meta.insert(
        agent_meta::SESSION_HISTORY.into(),
        serde_json::to_value(&history)?,
    );
    let mut patch = Map::new();
    patch.insert("metadata".into(), Value::Object(meta));
    store.update(
        &handle.agent_id,
        patch,
        UpdateOptions {
            actor: Some("session-manager".into()),
            ..Default::default()
        },
    )?;
    Ok(())
}

/// Per-session forwarding loop: spawner events → session bus, with activity
/// tracking, lazy provider-id persistence, and exit handling.
async fn forward_events<C: Clock, G: IdGen>(
    store: Arc<Store<C, G>>,
    handle: Arc<SessionHandle>,
    mut rx: mpsc::Receiver<SessionEvent>,
) {
    while let Some(event) = rx.recv().await {
        match &event {
            SessionEvent::ProviderSessionId(provider_id) => {
                let fresh = {
                    let mut state = handle.state.lock();
                    if state.provider_session_id.as_deref() != Some(provider_id) {
                        state.provider_session_id = Some(provider_id.clone());
                        true
                    } else {
                        false
                    }
                };
                if fresh {
                    let status = if handle.status() == SessionStatus::Suspended {
                        agent_session_status::SUSPENDED
                    } else {
                        agent_session_status::RUNNING
                    };
                    if let Err(e) = persist_projection(
                        &store,
                        &handle.agent_id,
                        status,
                        Some(provider_id),
                        handle.state.lock().pid,
                        Some(&handle.working_dir),
                    ) {
                        warn!(session = %handle.id, error = %e,
                              "failed to persist provider session id");
                    }
                }
            }
            SessionEvent::Exited { code } => {
                handle_exit(&store, &handle, *code);
                handle.bus.emit(event);
                break;
            }
            event if event.is_data() => {
                let mut state = handle.state.lock();
                state.last_activity = store.clock().epoch_ms();
                let line = match event {
                    SessionEvent::PtyData(s) | SessionEvent::Raw(s) => s.clone(),
                    SessionEvent::Event(v) => v.to_string(),
                    _ => String::new(),
                };
                if !line.is_empty() {
                    state.transcript.push_back(line);
                    while state.transcript.len() > TRANSCRIPT_LIMIT {
                        state.transcript.pop_front();
                    }
                }
            }
            _ => {}
        }
        handle.bus.emit(event);
    }
}

/// Natural-exit handling: terminal transition (unless already suspended or
/// terminated), agent idled, history appended.
fn handle_exit<C: Clock, G: IdGen>(
    store: &Arc<Store<C, G>>,
    handle: &Arc<SessionHandle>,
    code: Option<i32>,
) {
    let now = store.clock().epoch_ms();
    let transitioned = {
        let mut state = handle.state.lock();
        match state.status {
            SessionStatus::Suspended | SessionStatus::Terminated => false,
            _ => {
                state.status = SessionStatus::Terminated;
                state.ended_at = Some(now);
                true
            }
        }
    };
    if !transitioned {
        return;
    }

    debug!(session = %handle.id, ?code, "session process exited");
    let provider_session_id = handle.state.lock().provider_session_id.clone();
    if let Err(e) = persist_projection(
        store,
        &handle.agent_id,
        agent_session_status::IDLE,
        provider_session_id.as_deref(),
        None,
        Some(&handle.working_dir),
    ) {
        warn!(session = %handle.id, error = %e, "failed to idle agent after exit");
    }
    let reason = code.map(|c| format!("exited with code {c}"));
    if let Err(e) = push_history(store, handle, reason) {
        warn!(session = %handle.id, error = %e, "failed to record session history");
    }
}

/// Zero-signal liveness probe.
#[cfg(unix)]
pub(crate) fn pid_alive(pid: u32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub(crate) fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
