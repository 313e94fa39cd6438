// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `Store`: mutex-guarded maps keyed by ID, no I/O. Used as the
//! default test double and as the single-node "embedded" deployment mode.

use std::collections::HashMap;

use async_trait::async_trait;
use orc_core::{
    Agent, AgentName, Runner, RunnerId, Sandbox, SandboxId, SandboxState, Session, SessionId,
    SessionStatus, TenantId,
};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::traits::Store;
use crate::types::{QueueItem, QueueItemStatus, SessionEventRow};

#[derive(Default)]
struct Inner {
    runners: HashMap<RunnerId, Runner>,
    sandboxes: HashMap<SandboxId, Sandbox>,
    sessions: HashMap<SessionId, Session>,
    agents: HashMap<(TenantId, AgentName), Agent>,
    session_events: HashMap<SessionId, Vec<SessionEventRow>>,
    queue: Vec<QueueItem>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn upsert_runner(&self, id: &RunnerId, host: &str, port: u16, max: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .runners
            .entry(id.clone())
            .and_modify(|r| {
                r.host = host.to_string();
                r.port = port;
                r.max_sandboxes = max;
            })
            .or_insert_with(|| Runner::new(id.clone(), host.to_string(), port, max, 0));
        Ok(())
    }

    async fn get_runner(&self, id: &RunnerId) -> Result<Option<Runner>, StoreError> {
        Ok(self.inner.lock().runners.get(id).cloned())
    }

    async fn heartbeat_runner(&self, id: &RunnerId, active: u32, warming: u32, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let runner = inner
            .runners
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("runner {id}")))?;
        runner.active_count = active;
        runner.warming_count = warming;
        runner.last_heartbeat_at_ms = now_ms;
        Ok(())
    }

    async fn select_best_runner(&self, cutoff_ms: u64) -> Result<Option<Runner>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .runners
            .values()
            .filter(|r| r.last_heartbeat_at_ms > cutoff_ms)
            .max_by_key(|r| (r.available_capacity(), r.last_heartbeat_at_ms))
            .cloned())
    }

    async fn list_dead_runners(&self, cutoff_ms: u64) -> Result<Vec<Runner>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.runners.values().filter(|r| r.last_heartbeat_at_ms <= cutoff_ms).cloned().collect())
    }

    async fn bulk_pause_sessions_by_runner(&self, id: &RunnerId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut count = 0u64;
        for session in inner.sessions.values_mut() {
            if session.runner_id.as_ref() == Some(id) && session.status == SessionStatus::Active {
                session.status = SessionStatus::Paused;
                session.sandbox_id = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_runner(&self, id: &RunnerId) -> Result<(), StoreError> {
        self.inner.lock().runners.remove(id);
        Ok(())
    }

    async fn get_sandbox(&self, id: &SandboxId) -> Result<Option<Sandbox>, StoreError> {
        Ok(self.inner.lock().sandboxes.get(id).cloned())
    }

    async fn insert_sandbox(&self, sandbox: &Sandbox) -> Result<(), StoreError> {
        self.inner.lock().sandboxes.insert(sandbox.id.clone(), sandbox.clone());
        Ok(())
    }

    async fn update_sandbox_state(&self, id: &SandboxId, state: SandboxState) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let sandbox = inner.sandboxes.get_mut(id).ok_or_else(|| StoreError::NotFound(format!("sandbox {id}")))?;
        sandbox.state = state;
        Ok(())
    }

    async fn touch_sandbox(&self, id: &SandboxId, now_ms: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let sandbox = inner.sandboxes.get_mut(id).ok_or_else(|| StoreError::NotFound(format!("sandbox {id}")))?;
        sandbox.last_used_at_ms = now_ms;
        Ok(())
    }

    async fn delete_sandbox(&self, id: &SandboxId) -> Result<(), StoreError> {
        self.inner.lock().sandboxes.remove(id);
        Ok(())
    }

    async fn count_sandboxes(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().sandboxes.len() as u64)
    }

    async fn get_best_eviction_candidate(&self) -> Result<Option<Sandbox>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .sandboxes
            .values()
            .filter(|s| s.state.is_evictable())
            .min_by_key(|s| (s.state.eviction_rank(), s.last_used_at_ms))
            .cloned())
    }

    async fn get_idle_sandboxes(&self, older_than_ms: u64) -> Result<Vec<Sandbox>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<Sandbox> = inner
            .sandboxes
            .values()
            .filter(|s| s.state == SandboxState::Waiting && s.last_used_at_ms < older_than_ms)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.last_used_at_ms);
        Ok(rows)
    }

    async fn mark_all_sandboxes_cold(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let mut count = 0u64;
        for sandbox in inner.sandboxes.values_mut() {
            if sandbox.state != SandboxState::Cold {
                sandbox.state = SandboxState::Cold;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.lock().sessions.get(id).cloned())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.inner.lock().sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.sessions.contains_key(&session.id) {
            return Err(StoreError::NotFound(format!("session {}", session.id)));
        }
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<Option<Agent>, StoreError> {
        Ok(self.inner.lock().agents.get(&(tenant.clone(), name.clone())).cloned())
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.inner.lock().agents.insert((agent.tenant_id.clone(), agent.name.clone()), agent.clone());
        Ok(())
    }

    async fn delete_agent(&self, tenant: &TenantId, name: &AgentName) -> Result<(), StoreError> {
        self.inner.lock().agents.remove(&(tenant.clone(), name.clone()));
        Ok(())
    }

    async fn list_agents(&self, tenant: &TenantId) -> Result<Vec<Agent>, StoreError> {
        Ok(self
            .inner
            .lock()
            .agents
            .values()
            .filter(|a| &a.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn append_session_event(&self, row: SessionEventRow) -> Result<(), StoreError> {
        self.inner.lock().session_events.entry(row.session_id.clone()).or_default().push(row);
        Ok(())
    }

    async fn list_session_events(&self, session_id: &SessionId) -> Result<Vec<SessionEventRow>, StoreError> {
        Ok(self.inner.lock().session_events.get(session_id).cloned().unwrap_or_default())
    }

    async fn claim_queue_item(&self) -> Result<Option<QueueItem>, StoreError> {
        let mut inner = self.inner.lock();
        let claimed = inner.queue.iter_mut().find(|item| item.status == QueueItemStatus::Pending).map(|item| {
            item.status = QueueItemStatus::Claimed;
            item.clone()
        });
        Ok(claimed)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
