// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RunnerCoordinator`: registration, heartbeat, placement, routing cache,
//! and a liveness sweep with jitter to avoid thundering herds across
//! coordinators. Stays stateless beyond a small routing cache — placement
//! always trusts the Store's atomic queries rather than in-memory counters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orc_core::{Clock, RunnerId};
use orc_engine::{BackendSelector, EngineError, RunnerBackend, SelectedBackend};
use orc_store::Store;
use parking_lot::Mutex;
use rand::Rng;

use crate::remote_backend::RemoteRunnerBackend;

const HEARTBEAT_INTERVAL_SECS: u64 = 5;
const LIVENESS_TIMEOUT_SECS: u64 = 30;

/// Placement + routing seam shared by the gateway's session endpoints and
/// `SessionManager`. `local` is `Some` when this process also runs a
/// `SandboxPool` in-process (embedded or hybrid deployments); `None` for a
/// coordinator-only node that only ever routes to remote runners.
pub struct RunnerCoordinator<C: Clock> {
    store: Arc<dyn Store>,
    local: Option<Arc<dyn RunnerBackend>>,
    internal_secret: String,
    http: reqwest::Client,
    cache: Mutex<std::collections::HashMap<RunnerId, Arc<dyn RunnerBackend>>>,
    clock: C,
}

impl<C: Clock> RunnerCoordinator<C> {
    pub fn new(store: Arc<dyn Store>, local: Option<Arc<dyn RunnerBackend>>, internal_secret: String, clock: C) -> Self {
        Self {
            store,
            local,
            internal_secret,
            http: reqwest::Client::new(),
            cache: Mutex::new(std::collections::HashMap::new()),
            clock,
        }
    }

    /// Registration: upsert and return ready-to-heartbeat.
    pub async fn register(&self, id: &RunnerId, host: &str, port: u16, max_sandboxes: u32) -> Result<(), EngineError> {
        self.store.upsert_runner(id, host, port, max_sandboxes).await?;
        Ok(())
    }

    pub async fn heartbeat(&self, id: &RunnerId, active_count: u32, warming_count: u32) -> Result<(), EngineError> {
        self.store.heartbeat_runner(id, active_count, warming_count, self.clock.epoch_ms()).await?;
        Ok(())
    }

    /// Graceful deregistration: pause sessions, drop the row, evict the
    /// routing-cache entry. Distinct from `handle_dead_runner` only in who
    /// calls it (the runner itself, vs the liveness sweep finding it gone).
    pub async fn deregister(&self, id: &RunnerId) -> Result<(), EngineError> {
        self.handle_dead_runner(id).await
    }

    async fn handle_dead_runner(&self, id: &RunnerId) -> Result<(), EngineError> {
        self.store.bulk_pause_sessions_by_runner(id).await?;
        self.store.delete_runner(id).await?;
        self.cache.lock().remove(id);
        Ok(())
    }

    /// Background liveness sweep: fires every `livenessTimeout`
    /// with 0-5s jitter so coordinators don't all sweep in lockstep.
    pub fn spawn_liveness_sweep(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let jitter_ms = rand::thread_rng().gen_range(0..5_000);
                tokio::time::sleep(Duration::from_secs(LIVENESS_TIMEOUT_SECS) + Duration::from_millis(jitter_ms)).await;

                let cutoff_ms = coordinator.clock.epoch_ms().saturating_sub(LIVENESS_TIMEOUT_SECS * 1_000);
                let dead = match coordinator.store.list_dead_runners(cutoff_ms).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::warn!(error = %e, "liveness sweep: list_dead_runners failed");
                        continue;
                    }
                };
                for runner in dead {
                    if let Err(e) = coordinator.handle_dead_runner(&runner.id).await {
                        tracing::warn!(runner_id = %runner.id, error = %e, "liveness sweep: handle_dead_runner failed");
                    } else {
                        tracing::info!(runner_id = %runner.id, "reaped dead runner");
                    }
                }
            }
        });
    }

    pub fn heartbeat_interval() -> Duration {
        Duration::from_secs(HEARTBEAT_INTERVAL_SECS)
    }
}

#[async_trait]
impl<C: Clock> BackendSelector for RunnerCoordinator<C> {
    /// Placement (`selectBackend`): trust the Store's ordering,
    /// no redundant in-memory capacity check.
    async fn select_backend(&self) -> Result<SelectedBackend, EngineError> {
        let cutoff_ms = self.clock.epoch_ms().saturating_sub(LIVENESS_TIMEOUT_SECS * 1_000);
        if let Some(runner) = self.store.select_best_runner(cutoff_ms).await? {
            let backend = self.backend_for_runner(Some(&runner.id)).await?;
            return Ok(SelectedBackend { runner_id: Some(runner.id), backend });
        }
        if let Some(local) = &self.local {
            return Ok(SelectedBackend { runner_id: None, backend: local.clone() });
        }
        Err(EngineError::NoCapacity)
    }

    /// Routing to an existing session's runner: cached lookup, lazily
    /// constructed from the `runners` row on miss. `None` means the local
    /// in-process backend.
    async fn backend_for_runner(&self, runner_id: Option<&RunnerId>) -> Result<Arc<dyn RunnerBackend>, EngineError> {
        let Some(runner_id) = runner_id else {
            return self.local.clone().ok_or(EngineError::NoCapacity);
        };

        if let Some(cached) = self.cache.lock().get(runner_id).cloned() {
            return Ok(cached);
        }

        let runner = self
            .store
            .get_runner(runner_id)
            .await?
            .ok_or_else(|| EngineError::RunnerUnreachable(format!("runner {runner_id} no longer registered")))?;
        let backend: Arc<dyn RunnerBackend> =
            Arc::new(RemoteRunnerBackend::new(self.http.clone(), runner.base_url(), self.internal_secret.clone()));
        self.cache.lock().insert(runner_id.clone(), backend.clone());
        Ok(backend)
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
