// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`RunnerBackend`]: the uniform pool+bridge interface `SessionManager`
//! drives, local or remote. `LocalRunnerBackend` binds directly
//! to an in-process [`SandboxPool`]; the remote side (REST + SSE to another
//! node) is `orc-daemon`'s concern, grounded on this same trait.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use orc_core::{AgentName, Clock, SandboxId, SessionId};
use orc_wire::Event;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::pool::{CreatedSandbox, EvictionHook, SandboxPool};
use crate::workspace;

impl std::fmt::Debug for dyn RunnerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RunnerBackend")
    }
}

/// Forwards to the pool or to a remote runner, never both; `SessionManager`
/// is agnostic to which.
#[async_trait]
pub trait RunnerBackend: Send + Sync {
    async fn create_sandbox(
        &self,
        session_id: &SessionId,
        agent_name: &AgentName,
        agent_dir: PathBuf,
        config: serde_json::Value,
        seed_from: Option<PathBuf>,
        hook: &dyn EvictionHook,
    ) -> Result<CreatedSandbox, EngineError>;

    async fn destroy_sandbox(&self, sandbox_id: &SandboxId) -> Result<(), EngineError>;

    async fn query_streaming(
        &self,
        sandbox_id: &SandboxId,
        prompt: String,
        session_resume_id: Option<String>,
        options: serde_json::Value,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EngineError>;

    async fn exec(&self, sandbox_id: &SandboxId, command: String, timeout_ms: u64) -> Result<Event, EngineError>;

    async fn interrupt(&self, sandbox_id: &SandboxId) -> Result<(), EngineError>;

    /// Warm-resume check: is the sandbox still alive, i.e. can `resume` skip
    /// creating a new one.
    async fn is_alive(&self, sandbox_id: &SandboxId) -> bool;

    async fn persist_state(
        &self,
        sandbox_id: &SandboxId,
        session_id: &SessionId,
        agent_name: &AgentName,
    ) -> Result<(), EngineError>;
}

/// In-process backend: owns the workspace root and binds straight to the
/// node's [`SandboxPool`]. Used when the coordinator picks the local node,
/// or always in embedded (single-node) deployments.
pub struct LocalRunnerBackend<C: Clock> {
    pool: Arc<SandboxPool<C>>,
    workspace_root: PathBuf,
    data_dir: PathBuf,
    clock: C,
}

impl<C: Clock> LocalRunnerBackend<C> {
    pub fn new(pool: Arc<SandboxPool<C>>, workspace_root: PathBuf, data_dir: PathBuf, clock: C) -> Self {
        Self { pool, workspace_root, data_dir, clock }
    }

    fn workspace_dir_for(&self, sandbox_id: &SandboxId) -> PathBuf {
        self.workspace_root.join(sandbox_id.as_str())
    }
}

#[async_trait]
impl<C: Clock> RunnerBackend for LocalRunnerBackend<C> {
    async fn create_sandbox(
        &self,
        session_id: &SessionId,
        agent_name: &AgentName,
        agent_dir: PathBuf,
        config: serde_json::Value,
        seed_from: Option<PathBuf>,
        hook: &dyn EvictionHook,
    ) -> Result<CreatedSandbox, EngineError> {
        let sandbox_id = SandboxId::new();
        let workspace_dir = self.workspace_dir_for(&sandbox_id);
        tokio::fs::create_dir_all(&workspace_dir)
            .await
            .map_err(|e| EngineError::Workspace(format!("mkdir failed: {e}")))?;
        if let Some(seed) = seed_from {
            workspace::copy_seed(&seed, &workspace_dir)
                .await
                .map_err(|e| EngineError::Workspace(format!("seed failed: {e}")))?;
        }

        self.pool
            .create(sandbox_id, agent_name.clone(), agent_dir, workspace_dir, Some(session_id.clone()), config, hook)
            .await
    }

    async fn destroy_sandbox(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        self.pool.destroy_known(sandbox_id).await
    }

    async fn query_streaming(
        &self,
        sandbox_id: &SandboxId,
        prompt: String,
        session_resume_id: Option<String>,
        options: serde_json::Value,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EngineError> {
        self.pool.query_streaming(sandbox_id, prompt, session_resume_id, options, sink).await
    }

    async fn exec(&self, sandbox_id: &SandboxId, command: String, timeout_ms: u64) -> Result<Event, EngineError> {
        self.pool.exec(sandbox_id, command, timeout_ms).await
    }

    async fn interrupt(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        self.pool.interrupt(sandbox_id).await
    }

    async fn is_alive(&self, sandbox_id: &SandboxId) -> bool {
        self.pool.is_live(sandbox_id)
    }

    async fn persist_state(
        &self,
        sandbox_id: &SandboxId,
        session_id: &SessionId,
        agent_name: &AgentName,
    ) -> Result<(), EngineError> {
        let workspace_dir = self.workspace_dir_for(sandbox_id);
        let now_ms = self.clock.epoch_ms();
        workspace::persist_session_state(&self.data_dir, session_id, &workspace_dir, agent_name, now_ms)
            .await
            .map_err(|e| EngineError::Workspace(format!("persist failed: {e}")))
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
