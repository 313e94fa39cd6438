// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`SandboxPool`]: owns the live sandboxes on one node and enforces
//! capacity — async effect execution against shared state behind a mutex,
//! `tracing` around every transition, and a periodic sweep task for
//! eviction and idle cleanup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orc_core::{AgentName, Clock, Sandbox, SandboxId, SandboxState, SessionId};
use orc_sandbox::{BridgeClient, LaunchedSandbox, SandboxLauncher, SandboxSpec};
use orc_store::Store;
use orc_wire::Event;
use parking_lot::Mutex as PLMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::EngineError;

/// Called before a sandbox bound to a session is evicted or idle-swept, so
/// the session manager can snapshot the workspace and mark the session
/// `paused` before the sandbox disappears underneath it.
#[async_trait]
pub trait EvictionHook: Send + Sync {
    async fn on_before_evict(&self, sandbox: &Sandbox);
}

/// No-op hook for sandboxes with no bound session; also handy in tests.
pub struct NoopHook;

#[async_trait]
impl EvictionHook for NoopHook {
    async fn on_before_evict(&self, _sandbox: &Sandbox) {}
}

#[derive(Default)]
pub struct PoolMetrics {
    warming: AtomicUsize,
    warm: AtomicUsize,
    waiting: AtomicUsize,
    running: AtomicUsize,
    cold: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub warming: usize,
    pub warm: usize,
    pub waiting: usize,
    pub running: usize,
    pub cold: usize,
}

impl PoolMetricsSnapshot {
    pub fn active_count(&self) -> u32 {
        (self.warming + self.warm + self.waiting + self.running) as u32
    }
}

impl PoolMetrics {
    fn counter(&self, state: SandboxState) -> &AtomicUsize {
        match state {
            SandboxState::Warming => &self.warming,
            SandboxState::Warm => &self.warm,
            SandboxState::Waiting => &self.waiting,
            SandboxState::Running => &self.running,
            SandboxState::Cold => &self.cold,
        }
    }

    fn inc(&self, state: SandboxState) {
        self.counter(state).fetch_add(1, Ordering::Relaxed);
    }

    fn dec(&self, state: SandboxState) {
        self.counter(state).fetch_sub(1, Ordering::Relaxed);
    }

    fn transition(&self, from: SandboxState, to: SandboxState) {
        self.dec(from);
        self.inc(to);
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            warming: self.warming.load(Ordering::Relaxed),
            warm: self.warm.load(Ordering::Relaxed),
            waiting: self.waiting.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            cold: self.cold.load(Ordering::Relaxed),
        }
    }
}

struct LiveSandbox {
    bridge: AsyncMutex<BridgeClient>,
    events: AsyncMutex<mpsc::Receiver<Event>>,
    state: PLMutex<SandboxState>,
    session_id: PLMutex<Option<SessionId>>,
}

/// A freshly created sandbox, ready to be bound to a session by the caller.
#[derive(Debug)]
pub struct CreatedSandbox {
    pub sandbox_id: SandboxId,
    pub workspace_dir: PathBuf,
}

pub struct SandboxPool<C: Clock> {
    launcher: Arc<dyn SandboxLauncher>,
    store: Arc<dyn Store>,
    clock: C,
    capacity: u32,
    handshake_timeout: Duration,
    live: PLMutex<HashMap<SandboxId, Arc<LiveSandbox>>>,
    metrics: PoolMetrics,
    shutting_down: AtomicBool,
}

impl<C: Clock> SandboxPool<C> {
    pub fn new(
        launcher: Arc<dyn SandboxLauncher>,
        store: Arc<dyn Store>,
        clock: C,
        capacity: u32,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            store,
            clock,
            capacity,
            handshake_timeout,
            live: PLMutex::new(HashMap::new()),
            metrics: PoolMetrics::default(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Admission (`create`): evicts if at capacity, spawns via the
    /// launcher, waits for the bridge handshake, binds the session if given.
    pub async fn create(
        &self,
        sandbox_id: SandboxId,
        agent_name: AgentName,
        agent_dir: PathBuf,
        workspace_dir: PathBuf,
        session_id: Option<SessionId>,
        config: serde_json::Value,
        hook: &dyn EvictionHook,
    ) -> Result<CreatedSandbox, EngineError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(EngineError::ShuttingDown);
        }

        if self.store.count_sandboxes().await? >= self.capacity as u64 {
            self.evict_one(hook).await?;
        }

        let now_ms = self.clock.epoch_ms();
        let mut row = Sandbox::new(sandbox_id.clone(), agent_name, workspace_dir.clone(), now_ms);
        row.session_id = session_id.clone();
        self.store.insert_sandbox(&row).await?;
        self.metrics.inc(SandboxState::Warming);
        tracing::info!(sandbox_id = %sandbox_id, "sandbox warming");

        let spec = SandboxSpec { sandbox_id: sandbox_id.clone(), agent_dir, workspace_dir: workspace_dir.clone(), config };

        let launch_result = self.launcher.launch(spec).await;
        let launched = match launch_result {
            Ok(l) => l,
            Err(e) => {
                self.metrics.dec(SandboxState::Warming);
                let _ = self.store.delete_sandbox(&sandbox_id).await;
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "sandbox launch failed");
                return Err(e.into());
            }
        };

        let attached = self.attach(launched).await;
        let live = match attached {
            Ok(live) => live,
            Err(e) => {
                self.metrics.dec(SandboxState::Warming);
                let _ = self.store.delete_sandbox(&sandbox_id).await;
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "bridge handshake failed");
                return Err(e);
            }
        };

        self.metrics.transition(SandboxState::Warming, SandboxState::Warm);
        self.store.update_sandbox_state(&sandbox_id, SandboxState::Warm).await?;

        *live.session_id.lock() = session_id;
        *live.state.lock() = SandboxState::Waiting;
        self.metrics.transition(SandboxState::Warm, SandboxState::Waiting);
        self.store.update_sandbox_state(&sandbox_id, SandboxState::Waiting).await?;

        self.live.lock().insert(sandbox_id.clone(), live);
        tracing::info!(sandbox_id = %sandbox_id, "sandbox ready");

        Ok(CreatedSandbox { sandbox_id, workspace_dir })
    }

    async fn attach(&self, launched: LaunchedSandbox) -> Result<Arc<LiveSandbox>, EngineError> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let bridge = BridgeClient::attach(launched, event_tx, self.handshake_timeout).await?;
        Ok(Arc::new(LiveSandbox {
            bridge: AsyncMutex::new(bridge),
            events: AsyncMutex::new(event_rx),
            state: PLMutex::new(SandboxState::Warm),
            session_id: PLMutex::new(None),
        }))
    }

    /// Eviction priority: `cold < warm < waiting`, oldest
    /// `lastUsedAt` first; `running`/`warming` are never picked.
    async fn evict_one(&self, hook: &dyn EvictionHook) -> Result<(), EngineError> {
        let candidate = self.store.get_best_eviction_candidate().await?.ok_or(EngineError::CapacityExhausted)?;
        if candidate.session_id.is_some() {
            hook.on_before_evict(&candidate).await;
        }
        self.destroy(&candidate.id, candidate.state).await
    }

    /// Destroys a sandbox the caller doesn't have a cached state for
    /// (e.g. `SessionManager::end`), looking it up first.
    pub async fn destroy_known(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        let live_state = self.live.lock().get(sandbox_id).map(|l| *l.state.lock());
        let state = match live_state {
            Some(s) => s,
            None => self.store.get_sandbox(sandbox_id).await?.map(|s| s.state).unwrap_or(SandboxState::Cold),
        };
        self.destroy(sandbox_id, state).await
    }

    /// Whether this sandbox still has a live bridge connection on this node.
    pub fn is_live(&self, sandbox_id: &SandboxId) -> bool {
        self.live.lock().contains_key(sandbox_id)
    }

    async fn destroy(&self, sandbox_id: &SandboxId, known_state: SandboxState) -> Result<(), EngineError> {
        let live = self.live.lock().remove(sandbox_id);
        if let Some(live) = live {
            let state = *live.state.lock();
            self.metrics.dec(state);
            let mut bridge = live.bridge.lock().await;
            let _ = bridge.shutdown(Duration::from_secs(5)).await;
        } else {
            self.metrics.dec(known_state);
        }
        self.store.delete_sandbox(sandbox_id).await?;
        tracing::info!(sandbox_id = %sandbox_id, "sandbox destroyed");
        Ok(())
    }

    /// After this returns, the sandbox is protected from eviction.
    /// Synchronous in-memory flip; the durable write is best-effort
    /// and does not block the caller's observable state change.
    pub fn mark_running(&self, sandbox_id: &SandboxId) {
        self.transition_in_memory(sandbox_id, SandboxState::Running);
        self.touch_async(sandbox_id.clone(), SandboxState::Running);
    }

    pub fn mark_waiting(&self, sandbox_id: &SandboxId) {
        self.transition_in_memory(sandbox_id, SandboxState::Waiting);
        self.touch_async(sandbox_id.clone(), SandboxState::Waiting);
    }

    fn transition_in_memory(&self, sandbox_id: &SandboxId, to: SandboxState) {
        let live = self.live.lock().get(sandbox_id).cloned();
        if let Some(live) = live {
            let mut state = live.state.lock();
            self.metrics.transition(*state, to);
            *state = to;
        }
    }

    fn touch_async(&self, sandbox_id: SandboxId, state: SandboxState) {
        let store = self.store.clone();
        let now_ms = self.clock.epoch_ms();
        tokio::spawn(async move {
            if let Err(e) = store.touch_sandbox(&sandbox_id, now_ms).await {
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "touch_sandbox failed");
            }
            if let Err(e) = store.update_sandbox_state(&sandbox_id, state).await {
                tracing::warn!(sandbox_id = %sandbox_id, error = %e, "update_sandbox_state failed");
            }
        });
    }

    /// Runs one query turn, forwarding every event to `sink` until a
    /// terminal event arrives, then marks the sandbox `waiting` again.
    pub async fn query_streaming(
        &self,
        sandbox_id: &SandboxId,
        prompt: String,
        session_resume_id: Option<String>,
        options: serde_json::Value,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EngineError> {
        let live = self.live.lock().get(sandbox_id).cloned().ok_or_else(|| EngineError::NotFound(sandbox_id.to_string()))?;
        self.mark_running(sandbox_id);

        {
            let bridge = live.bridge.lock().await;
            bridge.query(prompt, session_resume_id, options).await?;
        }

        let mut events = live.events.lock().await;
        loop {
            match events.recv().await {
                Some(event) => {
                    let terminal = event.is_terminal();
                    let _ = sink.send(event).await;
                    if terminal {
                        break;
                    }
                }
                None => break,
            }
        }

        self.mark_waiting(sandbox_id);
        Ok(())
    }

    pub async fn exec(&self, sandbox_id: &SandboxId, command: String, timeout_ms: u64) -> Result<Event, EngineError> {
        let live = self.live.lock().get(sandbox_id).cloned().ok_or_else(|| EngineError::NotFound(sandbox_id.to_string()))?;
        self.mark_running(sandbox_id);
        {
            let bridge = live.bridge.lock().await;
            bridge.exec(command, timeout_ms).await?;
        }
        let mut events = live.events.lock().await;
        let result = loop {
            match events.recv().await {
                Some(event) if event.is_terminal() => break event,
                Some(_) => continue,
                None => break Event::Error { error: "bridge disconnected".into() },
            }
        };
        self.mark_waiting(sandbox_id);
        Ok(result)
    }

    pub async fn interrupt(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        let live = self.live.lock().get(sandbox_id).cloned().ok_or_else(|| EngineError::NotFound(sandbox_id.to_string()))?;
        live.bridge.lock().await.interrupt().await?;
        Ok(())
    }

    /// Idle sweep: one batch query, `onBeforeEvict` + destroy for
    /// every sandbox that's been `waiting` and session-bound since before the
    /// cutoff. Never touches `running`.
    pub async fn idle_sweep(&self, idle_timeout: Duration, hook: &dyn EvictionHook) -> Result<u64, EngineError> {
        let cutoff = self.clock.epoch_ms().saturating_sub(idle_timeout.as_millis() as u64);
        let idle = self.store.get_idle_sandboxes(cutoff).await?;
        let mut swept = 0u64;
        for sandbox in idle {
            if sandbox.state != SandboxState::Waiting || sandbox.session_id.is_none() {
                continue;
            }
            hook.on_before_evict(&sandbox).await;
            self.destroy(&sandbox.id, sandbox.state).await?;
            swept += 1;
        }
        Ok(swept)
    }

    /// Graceful shutdown: new `create` calls fail immediately;
    /// every live sandbox is sent `shutdown` and torn down concurrently.
    pub async fn destroy_all(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let ids: Vec<SandboxId> = self.live.lock().keys().cloned().collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let live = self.live.lock().remove(&id);
            let store = self.store.clone();
            tasks.push(tokio::spawn(async move {
                if let Some(live) = live {
                    let mut bridge = live.bridge.lock().await;
                    let _ = bridge.shutdown(Duration::from_secs(10)).await;
                }
                let _ = store.delete_sandbox(&id).await;
            }));
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("sandbox pool shut down");
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
