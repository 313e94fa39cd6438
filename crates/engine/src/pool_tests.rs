// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::{AgentName, FakeClock, SessionId};
use orc_sandbox::FakeLauncher;
use orc_store::MemStore;
use orc_wire::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct RecordingHook {
    evicted: PLMutex<Vec<SandboxId>>,
}

impl RecordingHook {
    fn new() -> Self {
        Self { evicted: PLMutex::new(Vec::new()) }
    }
}

#[async_trait]
impl EvictionHook for RecordingHook {
    async fn on_before_evict(&self, sandbox: &Sandbox) {
        self.evicted.lock().push(sandbox.id.clone());
    }
}

fn pool(launcher: Arc<FakeLauncher>, store: Arc<MemStore>, capacity: u32) -> Arc<SandboxPool<FakeClock>> {
    Arc::new(SandboxPool::new(launcher, store, FakeClock::new(), capacity, Duration::from_secs(1)))
}

/// Runs `pool.create(...)` to completion while concurrently completing the
/// bridge handshake on the fake launcher's daemon-side duplex for it.
async fn create_and_handshake(
    pool: Arc<SandboxPool<FakeClock>>,
    launcher: Arc<FakeLauncher>,
    sandbox_id: SandboxId,
    session_id: Option<SessionId>,
) -> Result<CreatedSandbox, EngineError> {
    let handshake_sandbox_id = sandbox_id.clone();
    let handshake = tokio::spawn(async move {
        let mut daemon_side = launcher.take_daemon_side(&handshake_sandbox_id).await;
        daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
        daemon_side
    });

    let result = pool
        .create(
            sandbox_id,
            AgentName::new("support"),
            PathBuf::from("/agents/support"),
            std::env::temp_dir().join("orc-pool-test"),
            session_id,
            serde_json::json!({}),
            &NoopHook,
        )
        .await;
    let daemon_side = handshake.await.expect("handshake task");
    result.map(|created| {
        daemon_sides().lock().insert(created.sandbox_id.clone(), daemon_side);
        created
    })
}

// Stashes daemon-side duplexes so later test steps (sending events, reading
// the command the pool wrote) can reach them after creation completes.
static DAEMON_SIDES: std::sync::OnceLock<PLMutex<HashMap<SandboxId, DuplexHalf>>> = std::sync::OnceLock::new();

type DuplexHalf = tokio::io::DuplexStream;

fn daemon_sides() -> &'static PLMutex<HashMap<SandboxId, DuplexHalf>> {
    DAEMON_SIDES.get_or_init(|| PLMutex::new(HashMap::new()))
}

#[tokio::test]
async fn create_admits_and_reaches_waiting() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 4);

    let sandbox_id = SandboxId::new();
    let result = create_and_handshake(the_pool.clone(), launcher, sandbox_id.clone(), Some(SessionId::new())).await;
    let created = result.expect("create");
    assert_eq!(created.sandbox_id, sandbox_id);

    let snapshot = the_pool.metrics();
    assert_eq!(snapshot.waiting, 1);
    assert_eq!(snapshot.active_count(), 1);

    let row = store.get_sandbox(&sandbox_id).await.expect("get").expect("some");
    assert_eq!(row.state, SandboxState::Waiting);
}

#[tokio::test]
async fn capacity_exhausted_when_everything_is_running() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 1);

    let running = SandboxId::new();
    let mut row = Sandbox::new(running.clone(), AgentName::new("a"), PathBuf::from("/tmp/a"), 0);
    row.state = SandboxState::Running;
    store.insert_sandbox(&row).await.expect("insert");

    let err = the_pool
        .create(
            SandboxId::new(),
            AgentName::new("b"),
            PathBuf::from("/agents/b"),
            std::env::temp_dir(),
            None,
            serde_json::json!({}),
            &NoopHook,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CapacityExhausted));
}

#[tokio::test]
async fn create_at_capacity_evicts_the_best_candidate_and_runs_the_hook() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 1);

    let cold_id = SandboxId::new();
    let mut cold = Sandbox::new(cold_id.clone(), AgentName::new("a"), PathBuf::from("/tmp/a"), 0);
    cold.state = SandboxState::Cold;
    cold.session_id = Some(SessionId::new());
    store.insert_sandbox(&cold).await.expect("insert");

    let hook = RecordingHook::new();
    let new_id = SandboxId::new();
    let handshake_id = new_id.clone();
    let handshake = tokio::spawn({
        let launcher = launcher.clone();
        async move {
            let mut daemon_side = launcher.take_daemon_side(&handshake_id).await;
            daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
        }
    });

    let created = the_pool
        .create(
            new_id.clone(),
            AgentName::new("b"),
            PathBuf::from("/agents/b"),
            std::env::temp_dir(),
            None,
            serde_json::json!({}),
            &hook,
        )
        .await
        .expect("create");
    handshake.await.expect("handshake task");

    assert_eq!(created.sandbox_id, new_id);
    assert_eq!(hook.evicted.lock().as_slice(), [cold_id.clone()]);
    assert!(store.get_sandbox(&cold_id).await.expect("get").is_none());
}

#[tokio::test]
async fn launch_failure_deletes_the_row_and_propagates_the_error() {
    let launcher = Arc::new(FakeLauncher::new());
    launcher.fail_next_launch();
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher, store.clone(), 4);

    let sandbox_id = SandboxId::new();
    let err = the_pool
        .create(
            sandbox_id.clone(),
            AgentName::new("a"),
            PathBuf::from("/agents/a"),
            std::env::temp_dir(),
            None,
            serde_json::json!({}),
            &NoopHook,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BridgeProtocolError(_)));
    assert!(store.get_sandbox(&sandbox_id).await.expect("get").is_none());
    assert_eq!(the_pool.metrics().warming, 0);
}

#[tokio::test]
async fn query_streaming_marks_running_then_waiting_and_forwards_events() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 4);

    let sandbox_id = SandboxId::new();
    create_and_handshake(the_pool.clone(), launcher.clone(), sandbox_id.clone(), Some(SessionId::new()))
        .await
        .expect("create");
    let mut daemon_side = { daemon_sides().lock().remove(&sandbox_id).expect("daemon side") };

    let (sink_tx, mut sink_rx) = tokio::sync::mpsc::channel(8);
    let query = tokio::spawn({
        let the_pool = the_pool.clone();
        async move {
            the_pool.query_streaming(&sandbox_id, "hi".into(), None, serde_json::json!({}), sink_tx).await
        }
    });

    let mut buf = vec![0u8; 256];
    let n = daemon_side.read(&mut buf).await.expect("read command");
    let line = String::from_utf8_lossy(&buf[..n]);
    let cmd: Command = serde_json::from_str(line.trim_end()).expect("parse command");
    assert!(matches!(cmd, Command::Query { .. }));

    daemon_side.write_all(b"{\"event\":\"message\",\"data\":{\"text\":\"hello\"}}\n").await.expect("write");
    daemon_side.write_all(b"{\"event\":\"done\"}\n").await.expect("write");

    let first = sink_rx.recv().await.expect("first event");
    assert!(matches!(first, Event::Message { .. }));
    let second = sink_rx.recv().await.expect("second event");
    assert!(matches!(second, Event::Done { .. }));

    query.await.expect("query task").expect("query result");
}

#[tokio::test]
async fn idle_sweep_destroys_waiting_session_bound_sandboxes_past_the_cutoff() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 4);

    let idle_id = SandboxId::new();
    let mut idle = Sandbox::new(idle_id.clone(), AgentName::new("a"), PathBuf::from("/tmp/a"), 0);
    idle.state = SandboxState::Waiting;
    idle.session_id = Some(SessionId::new());
    idle.last_used_at_ms = 0;
    store.insert_sandbox(&idle).await.expect("insert");

    let protected_id = SandboxId::new();
    let mut protected = Sandbox::new(protected_id.clone(), AgentName::new("a"), PathBuf::from("/tmp/a"), 0);
    protected.state = SandboxState::Running;
    protected.session_id = Some(SessionId::new());
    protected.last_used_at_ms = 0;
    store.insert_sandbox(&protected).await.expect("insert");

    let hook = RecordingHook::new();
    let swept = the_pool.idle_sweep(Duration::from_millis(1), &hook).await.expect("sweep");
    assert_eq!(swept, 1);
    assert_eq!(hook.evicted.lock().as_slice(), [idle_id.clone()]);
    assert!(store.get_sandbox(&idle_id).await.expect("get").is_none());
    assert!(store.get_sandbox(&protected_id).await.expect("get").is_some());
}

#[tokio::test]
async fn destroy_all_tears_down_every_live_sandbox() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let the_pool = pool(launcher.clone(), store.clone(), 4);

    let sandbox_id = SandboxId::new();
    create_and_handshake(the_pool.clone(), launcher, sandbox_id.clone(), None).await.expect("create");

    the_pool.destroy_all().await;
    assert!(store.get_sandbox(&sandbox_id).await.expect("get").is_none());

    let err = the_pool
        .create(
            SandboxId::new(),
            AgentName::new("a"),
            PathBuf::from("/agents/a"),
            std::env::temp_dir(),
            None,
            serde_json::json!({}),
            &NoopHook,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ShuttingDown));
}
