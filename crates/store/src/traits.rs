// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Store` contract: durability and cross-coordinator
//! coordination. Every operation here is atomic at the row or table level —
//! no read-modify-write races are acceptable in an implementation.

use async_trait::async_trait;
use orc_core::{Agent, AgentName, Runner, RunnerId, Sandbox, SandboxId, SandboxState, Session, SessionId, TenantId};

use crate::error::StoreError;
use crate::types::{QueueItem, SessionEventRow};

#[async_trait]
pub trait Store: Send + Sync {
    // --- Runners ---
    async fn upsert_runner(&self, id: &RunnerId, host: &str, port: u16, max: u32) -> Result<(), StoreError>;
    async fn get_runner(&self, id: &RunnerId) -> Result<Option<Runner>, StoreError>;
    async fn heartbeat_runner(&self, id: &RunnerId, active: u32, warming: u32, now_ms: u64) -> Result<(), StoreError>;
    async fn select_best_runner(&self, cutoff_ms: u64) -> Result<Option<Runner>, StoreError>;
    async fn list_dead_runners(&self, cutoff_ms: u64) -> Result<Vec<Runner>, StoreError>;
    async fn bulk_pause_sessions_by_runner(&self, id: &RunnerId) -> Result<u64, StoreError>;
    async fn delete_runner(&self, id: &RunnerId) -> Result<(), StoreError>;

    // --- Sandboxes ---
    async fn get_sandbox(&self, id: &SandboxId) -> Result<Option<Sandbox>, StoreError>;
    async fn insert_sandbox(&self, sandbox: &Sandbox) -> Result<(), StoreError>;
    async fn update_sandbox_state(&self, id: &SandboxId, state: SandboxState) -> Result<(), StoreError>;
    async fn touch_sandbox(&self, id: &SandboxId, now_ms: u64) -> Result<(), StoreError>;
    async fn delete_sandbox(&self, id: &SandboxId) -> Result<(), StoreError>;
    async fn count_sandboxes(&self) -> Result<u64, StoreError>;
    async fn get_best_eviction_candidate(&self) -> Result<Option<Sandbox>, StoreError>;
    async fn get_idle_sandboxes(&self, older_than_ms: u64) -> Result<Vec<Sandbox>, StoreError>;
    async fn mark_all_sandboxes_cold(&self) -> Result<u64, StoreError>;

    // --- Sessions ---
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;
    async fn update_session(&self, session: &Session) -> Result<(), StoreError>;

    // --- Agents (CRUD glue) ---
    async fn get_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<Option<Agent>, StoreError>;
    async fn upsert_agent(&self, agent: &Agent) -> Result<(), StoreError>;
    async fn delete_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<(), StoreError>;
    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, StoreError>;

    // --- Messages / session events (append-only, best-effort) ---
    async fn append_session_event(&self, row: SessionEventRow) -> Result<(), StoreError>;
    async fn list_session_events(&self, session_id: &SessionId) -> Result<Vec<SessionEventRow>, StoreError>;

    // --- Queue (peripheral) ---
    async fn claim_queue_item(&self) -> Result<Option<QueueItem>, StoreError>;
}
