// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`SessionManager`]: create/send-message/pause-resume/end-fork. Every
//! transition is an effect the `Store` already knows how to apply and
//! persist durably, the same way the sandbox pool treats admission and
//! eviction as effects against shared state.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use orc_core::{AgentName, Clock, RunnerId, Sandbox, Session, SessionConfig, SessionId, SessionStatus, TenantId};
use orc_store::{SessionEventRow, Store};
use orc_wire::Event;
use tokio::sync::mpsc;

use crate::backend::RunnerBackend;
use crate::error::EngineError;
use crate::pool::EvictionHook;
use crate::workspace;

/// The backend to use plus which runner it binds to, `None` for the local
/// in-process backend (`selectBackend`).
pub struct SelectedBackend {
    pub runner_id: Option<RunnerId>,
    pub backend: Arc<dyn RunnerBackend>,
}

impl std::fmt::Debug for SelectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedBackend")
            .field("runner_id", &self.runner_id)
            .field("backend", &self.backend)
            .finish()
    }
}

/// Seam `SessionManager` uses to pick and route to runners, implemented by
/// `orc-daemon`'s `RunnerCoordinator` (Store-backed placement).
/// Defined here, next to its only consumer, so this crate never depends on
/// the daemon crate that does the placing.
#[async_trait]
pub trait BackendSelector: Send + Sync {
    async fn select_backend(&self) -> Result<SelectedBackend, EngineError>;
    async fn backend_for_runner(&self, runner_id: Option<&RunnerId>) -> Result<Arc<dyn RunnerBackend>, EngineError>;
}

/// Runs before a session-bound sandbox disappears under eviction or idle
/// sweep: snapshots its workspace and flips the session to `paused` so a
/// later resume can go cold without surprising the caller.
struct PauseOnEvictHook<C: Clock> {
    store: Arc<dyn Store>,
    data_dir: PathBuf,
    clock: C,
}

#[async_trait]
impl<C: Clock> EvictionHook for PauseOnEvictHook<C> {
    async fn on_before_evict(&self, sandbox: &Sandbox) {
        let Some(session_id) = &sandbox.session_id else { return };
        let Ok(Some(mut session)) = self.store.get_session(session_id).await else { return };
        if let Err(e) = workspace::persist_session_state(
            &self.data_dir,
            session_id,
            &sandbox.workspace_dir,
            &sandbox.agent_name,
            self.clock.epoch_ms(),
        )
        .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "eviction snapshot failed");
        }
        session.status = SessionStatus::Paused;
        if let Err(e) = self.store.update_session(&session).await {
            tracing::warn!(session_id = %session_id, error = %e, "failed to mark session paused on eviction");
        }
    }
}

pub struct SessionManager<C: Clock> {
    store: Arc<dyn Store>,
    selector: Arc<dyn BackendSelector>,
    hook: PauseOnEvictHook<C>,
    data_dir: PathBuf,
    clock: C,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(store: Arc<dyn Store>, selector: Arc<dyn BackendSelector>, data_dir: PathBuf, clock: C) -> Self {
        let hook = PauseOnEvictHook { store: store.clone(), data_dir: data_dir.clone(), clock: clock.clone() };
        Self { store, selector, hook, data_dir, clock }
    }

    async fn get(&self, session_id: &SessionId) -> Result<Session, EngineError> {
        self.store.get_session(session_id).await?.ok_or_else(|| EngineError::NotFound(session_id.to_string()))
    }

    async fn resolve_agent_dir(&self, tenant_id: &TenantId, agent_name: &AgentName) -> Result<PathBuf, EngineError> {
        let agent = self
            .store
            .get_agent(tenant_id, agent_name)
            .await?
            .ok_or_else(|| EngineError::AgentDirectoryMissing(agent_name.to_string()))?;
        if tokio::fs::metadata(&agent.path).await.is_err() {
            return Err(EngineError::AgentDirectoryMissing(agent.path.display().to_string()));
        }
        Ok(agent.path)
    }

    /// Create session: validate the agent, place on a runner,
    /// create the sandbox, insert the row already `active` — the handshake
    /// inside `create_sandbox` has already completed by the time this
    /// returns, so there's no separate "first successful query" gate.
    pub async fn create_session(
        &self,
        tenant_id: TenantId,
        agent_name: AgentName,
        config: SessionConfig,
    ) -> Result<Session, EngineError> {
        let agent_dir = self.resolve_agent_dir(&tenant_id, &agent_name).await?;
        let selected = self.selector.select_backend().await?;

        let session_id = SessionId::new();
        let now_ms = self.clock.epoch_ms();
        let mut session = Session::new(session_id.clone(), tenant_id, agent_name.clone(), config.clone(), now_ms);

        let config_json = serde_json::to_value(&config).unwrap_or_default();
        let created = selected
            .backend
            .create_sandbox(&session_id, &agent_name, agent_dir, config_json, None, &self.hook)
            .await?;

        session.sandbox_id = Some(created.sandbox_id);
        session.runner_id = selected.runner_id;
        session.status = SessionStatus::Active;
        self.store.insert_session(&session).await?;
        Ok(session)
    }

    /// Send message: forbids anything but `active` sessions,
    /// tees every event through the best-effort session-event log on its way
    /// to `sink`.
    pub async fn send_message(
        &self,
        session_id: &SessionId,
        prompt: String,
        options: serde_json::Value,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EngineError> {
        let session = self.get(session_id).await?;
        if !session.status.accepts_messages() {
            return Err(EngineError::SessionNotActive(session_id.clone()));
        }
        let sandbox_id = session.sandbox_id.clone().ok_or_else(|| EngineError::SessionNotActive(session_id.clone()))?;
        let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;

        self.append_event(session_id, "user", serde_json::json!({ "prompt": prompt })).await;

        let (tee_tx, mut tee_rx) = mpsc::channel(64);
        let forward = tokio::spawn({
            let store = self.store.clone();
            let clock = self.clock.clone();
            let session_id = session_id.clone();
            async move {
                while let Some(event) = tee_rx.recv().await {
                    let payload = serde_json::to_value(&event).unwrap_or(serde_json::Value::Null);
                    let row = next_event_row(&store, &session_id, "event", payload, clock.epoch_ms()).await;
                    if let Err(e) = store.append_session_event(row).await {
                        tracing::warn!(session_id = %session_id, error = %e, "append_session_event failed");
                    }
                    if sink.send(event).await.is_err() {
                        break;
                    }
                }
            }
        });

        let result = backend.query_streaming(&sandbox_id, prompt, session.sdk_session_resume_id.clone(), options, tee_tx).await;
        let _ = forward.await;

        let mut session = session;
        session.last_active_at_ms = self.clock.epoch_ms();
        self.store.update_session(&session).await?;
        result
    }

    async fn append_event(&self, session_id: &SessionId, role: &str, payload: serde_json::Value) {
        let row = next_event_row(&self.store, session_id, role, payload, self.clock.epoch_ms()).await;
        if let Err(e) = self.store.append_session_event(row).await {
            tracing::warn!(session_id = %session_id, error = %e, "append_session_event failed");
        }
    }

    pub async fn exec(&self, session_id: &SessionId, command: String, timeout_ms: u64) -> Result<Event, EngineError> {
        let session = self.get(session_id).await?;
        let sandbox_id = session.sandbox_id.clone().ok_or_else(|| EngineError::SessionNotActive(session_id.clone()))?;
        let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;
        backend.exec(&sandbox_id, command, timeout_ms).await
    }

    pub async fn interrupt(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let session = self.get(session_id).await?;
        let sandbox_id = session.sandbox_id.clone().ok_or_else(|| EngineError::SessionNotActive(session_id.clone()))?;
        let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;
        backend.interrupt(&sandbox_id).await
    }

    /// Pause: best-effort snapshot, then flip status regardless
    /// of whether the snapshot succeeded — a later resume just starts cold
    /// from an empty workspace instead.
    pub async fn pause(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.get(session_id).await?;
        if let Some(sandbox_id) = session.sandbox_id.clone() {
            let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;
            if let Err(e) = backend.persist_state(&sandbox_id, session_id, &session.agent_name).await {
                tracing::warn!(session_id = %session_id, error = %e, "pause snapshot failed, resume will be cold");
            }
        }
        session.status = SessionStatus::Paused;
        self.store.update_session(&session).await?;
        Ok(())
    }

    /// Resume: warm if the sandbox is still alive on its runner
    /// (one status flip), otherwise cold — a fresh sandbox seeded from the
    /// last snapshot, carrying the SDK's own resume id forward.
    pub async fn resume(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.get(session_id).await?;
        if !session.status.resumable() {
            return Err(EngineError::SessionNotActive(session_id.clone()));
        }

        if let Some(sandbox_id) = &session.sandbox_id {
            let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;
            if backend.is_alive(sandbox_id).await {
                session.status = SessionStatus::Active;
                self.store.update_session(&session).await?;
                return Ok(());
            }
        }

        let agent_dir = self.resolve_agent_dir(&session.tenant_id, &session.agent_name).await?;
        let selected = self.selector.select_backend().await?;
        let seed = workspace::has_snapshot(&self.data_dir, session_id)
            .await
            .then(|| workspace::snapshot_dir(&self.data_dir, session_id));

        let config_json = serde_json::to_value(&session.config).unwrap_or_default();
        let created = selected
            .backend
            .create_sandbox(session_id, &session.agent_name, agent_dir, config_json, seed, &self.hook)
            .await?;

        session.sandbox_id = Some(created.sandbox_id);
        session.runner_id = selected.runner_id;
        session.status = SessionStatus::Active;
        self.store.update_session(&session).await?;
        Ok(())
    }

    /// End: destroy the sandbox, retain the row as `ended`.
    pub async fn end(&self, session_id: &SessionId) -> Result<(), EngineError> {
        let mut session = self.get(session_id).await?;
        if let Some(sandbox_id) = session.sandbox_id.take() {
            let backend = self.selector.backend_for_runner(session.runner_id.as_ref()).await?;
            backend.destroy_sandbox(&sandbox_id).await?;
        }
        session.status = SessionStatus::Ended;
        self.store.update_session(&session).await?;
        Ok(())
    }

    /// Fork: snapshot the parent's current workspace, then seed
    /// a brand-new session+sandbox from it, carrying the parent's SDK resume
    /// id so the LLM side treats it as a continuation.
    pub async fn fork(&self, session_id: &SessionId) -> Result<Session, EngineError> {
        let parent = self.get(session_id).await?;
        let agent_dir = self.resolve_agent_dir(&parent.tenant_id, &parent.agent_name).await?;

        if let Some(sandbox_id) = &parent.sandbox_id {
            let backend = self.selector.backend_for_runner(parent.runner_id.as_ref()).await?;
            if let Err(e) = backend.persist_state(sandbox_id, session_id, &parent.agent_name).await {
                tracing::warn!(session_id = %session_id, error = %e, "fork snapshot failed, child starts from a clean workspace");
            }
        }

        let child_id = SessionId::new();
        let now_ms = self.clock.epoch_ms();
        let mut child = Session::new(child_id.clone(), parent.tenant_id.clone(), parent.agent_name.clone(), parent.config.clone(), now_ms);
        child.sdk_session_resume_id = parent.sdk_session_resume_id.clone();

        let selected = self.selector.select_backend().await?;
        let seed = workspace::has_snapshot(&self.data_dir, session_id)
            .await
            .then(|| workspace::snapshot_dir(&self.data_dir, session_id));
        let config_json = serde_json::to_value(&parent.config).unwrap_or_default();
        let created = selected
            .backend
            .create_sandbox(&child_id, &parent.agent_name, agent_dir, config_json, seed, &self.hook)
            .await?;

        child.sandbox_id = Some(created.sandbox_id);
        child.runner_id = selected.runner_id;
        child.status = SessionStatus::Active;
        self.store.insert_session(&child).await?;
        Ok(child)
    }
}

/// Best-effort append-only sequence numbering (the Message/SessionEvent
/// entity is explicitly peripheral, not part of the atomic Store contract) —
/// derived from the current row count rather than a dedicated counter column.
async fn next_event_row(
    store: &Arc<dyn Store>,
    session_id: &SessionId,
    role: &str,
    payload: serde_json::Value,
    now_ms: u64,
) -> SessionEventRow {
    let seq = store.list_session_events(session_id).await.map(|rows| rows.len() as i64).unwrap_or(0);
    SessionEventRow { session_id: session_id.clone(), seq, role: role.to_string(), payload, created_at_ms: now_ms }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
