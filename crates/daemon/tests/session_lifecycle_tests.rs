// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage of the gateway driving a real `SessionManager` and
//! `SandboxPool` over HTTP, with a fake sandbox standing in for the bridge
//! on the other end of the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orc_core::{FakeClock, TenantId};
use orc_daemon::{router, AppState, RunnerCoordinator};
use orc_engine::{LocalRunnerBackend, SandboxPool, SessionManager};
use orc_sandbox::FakeLauncher;
use orc_store::{MemStore, Store};
use orc_wire::SseDecoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct Harness {
    base_url: String,
    client: reqwest::Client,
    store: Arc<MemStore>,
    launcher: Arc<FakeLauncher>,
    agent_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let workspace_root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let agent_dir = tempfile::tempdir().expect("tempdir");

    let pool = Arc::new(SandboxPool::new(launcher.clone(), store.clone(), FakeClock::new(), 2, Duration::from_secs(1)));
    let local: Arc<dyn orc_engine::RunnerBackend> =
        Arc::new(LocalRunnerBackend::new(pool, workspace_root.path().to_path_buf(), data_dir.path().to_path_buf(), FakeClock::new()));
    let coordinator = Arc::new(RunnerCoordinator::new(store.clone(), Some(local.clone()), "secret".into(), FakeClock::new()));
    let sessions = Arc::new(SessionManager::new(store.clone(), coordinator.clone(), data_dir.path().to_path_buf(), FakeClock::new()));

    let state = Arc::new(AppState {
        sessions,
        coordinator,
        store: store.clone() as Arc<dyn Store>,
        local_backend: Some(local),
        internal_secret: "secret".into(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.ok();
    });

    Harness { base_url: format!("http://{addr}"), client: reqwest::Client::new(), store, launcher, agent_dir }
}

async fn create_agent(h: &Harness, tenant: &TenantId, name: &str) {
    let resp = h
        .client
        .post(format!("{}/api/agents", h.base_url))
        .header("x-tenant-id", tenant.to_string())
        .json(&serde_json::json!({ "name": name, "path": h.agent_dir.path() }))
        .send()
        .await
        .expect("post agent");
    assert!(resp.status().is_success());
}

async fn create_session(h: &Harness, tenant: &TenantId, agent: &str) -> orc_core::Session {
    let launcher = h.launcher.clone();
    let handshake = tokio::spawn(async move {
        let (_id, mut daemon_side) = launcher.take_any_daemon_side().await;
        daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
    });

    let resp = h
        .client
        .post(format!("{}/api/sessions", h.base_url))
        .header("x-tenant-id", tenant.to_string())
        .json(&serde_json::json!({ "agent": agent }))
        .send()
        .await
        .expect("post session");
    assert!(resp.status().is_success(), "create_session status: {}", resp.status());
    let session: orc_core::Session = resp.json().await.expect("session json");
    handshake.await.expect("handshake task");
    session
}

#[tokio::test]
async fn happy_path_streams_bridge_events_back_as_sse() {
    let h = harness().await;
    let tenant = TenantId::new();
    create_agent(&h, &tenant, "support").await;
    let session = create_session(&h, &tenant, "support").await;
    assert_eq!(session.status, orc_core::SessionStatus::Active);

    let sandbox_id = session.sandbox_id.clone().expect("sandbox bound on create");
    let mut daemon_side = h.launcher.take_daemon_side(&sandbox_id).await;

    let client = h.client.clone();
    let base_url = h.base_url.clone();
    let session_id = session.id.clone();
    let request = tokio::spawn(async move {
        let resp = client
            .post(format!("{base_url}/api/sessions/{session_id}/messages"))
            .json(&serde_json::json!({ "content": "hello there" }))
            .send()
            .await
            .expect("post message");
        resp.bytes().await.expect("read body")
    });

    // The sandbox receives the forwarded command, then streams two events back.
    let mut buf = vec![0u8; 256];
    let n = daemon_side.read(&mut buf).await.expect("read command");
    let _: orc_wire::Command = serde_json::from_str(String::from_utf8_lossy(&buf[..n]).trim_end()).expect("parse command");
    daemon_side.write_all(b"{\"event\":\"message\",\"data\":{\"text\":\"hi\"}}\n").await.expect("write");
    daemon_side.write_all(b"{\"event\":\"done\"}\n").await.expect("write");

    let body = request.await.expect("join");
    let mut decoder = SseDecoder::new();
    let frames = decoder.push(std::str::from_utf8(&body).expect("utf8"));
    let kinds: Vec<&str> = frames.iter().map(|(kind, _)| kind.as_str()).collect();
    assert_eq!(kinds, ["message", "done"]);

    let logged = h.store.list_session_events(&session.id).await.expect("list_session_events");
    assert!(!logged.is_empty(), "messages should be logged to the session event store");
}

#[tokio::test]
async fn pause_resume_fork_and_stop_all_round_trip_over_http() {
    let h = harness().await;
    let tenant = TenantId::new();
    create_agent(&h, &tenant, "support").await;
    let session = create_session(&h, &tenant, "support").await;

    let resp = h.client.post(format!("{}/api/sessions/{}/pause", h.base_url, session.id)).send().await.expect("pause");
    assert!(resp.status().is_success());
    let paused = h.store.get_session(&session.id).await.expect("get").expect("some");
    assert_eq!(paused.status, orc_core::SessionStatus::Paused);

    let launcher = h.launcher.clone();
    let handshake = tokio::spawn(async move {
        let (_id, mut daemon_side) = launcher.take_any_daemon_side().await;
        daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
    });
    let resp = h.client.post(format!("{}/api/sessions/{}/resume", h.base_url, session.id)).send().await.expect("resume");
    assert!(resp.status().is_success());
    handshake.await.expect("handshake task");
    let resumed = h.store.get_session(&session.id).await.expect("get").expect("some");
    assert_eq!(resumed.status, orc_core::SessionStatus::Active);

    let resp = h.client.post(format!("{}/api/sessions/{}/fork", h.base_url, session.id)).send().await.expect("fork");
    assert!(resp.status().is_success());
    let child: orc_core::Session = resp.json().await.expect("child json");
    assert_ne!(child.id, session.id);

    let resp = h.client.post(format!("{}/api/sessions/{}/stop", h.base_url, session.id)).send().await.expect("stop");
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn evicts_the_coldest_sandbox_once_capacity_is_exhausted() {
    let h = harness().await;
    let tenant = TenantId::new();
    create_agent(&h, &tenant, "support").await;

    // Pool capacity is 2 in this harness; a third session forces an eviction
    // rather than a capacity error.
    let _first = create_session(&h, &tenant, "support").await;
    let _second = create_session(&h, &tenant, "support").await;
    let third = create_session(&h, &tenant, "support").await;

    assert!(third.sandbox_id.is_some());
    assert_eq!(h.store.count_sandboxes().await.expect("count_sandboxes"), 2);
}
