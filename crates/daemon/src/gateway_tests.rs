// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::{FakeClock, RunnerId};
use orc_engine::LocalRunnerBackend;
use orc_sandbox::FakeLauncher;
use orc_store::MemStore;
use std::net::SocketAddr;
use std::time::Duration;

struct Harness {
    base_url: String,
    client: reqwest::Client,
    store: Arc<MemStore>,
    agent_dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let workspace_root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let agent_dir = tempfile::tempdir().expect("tempdir");

    let pool = Arc::new(orc_engine::SandboxPool::new(launcher, store.clone(), FakeClock::new(), 4, Duration::from_secs(1)));
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

    Harness { base_url: format!("http://{addr}"), client: reqwest::Client::new(), store, agent_dir }
}

#[tokio::test]
async fn agent_crud_round_trips_over_http() {
    let h = harness().await;

    let resp = h
        .client
        .post(format!("{}/api/agents", h.base_url))
        .json(&serde_json::json!({ "name": "support", "path": h.agent_dir.path() }))
        .send()
        .await
        .expect("post");
    assert!(resp.status().is_success());

    let resp = h.client.get(format!("{}/api/agents", h.base_url)).send().await.expect("get");
    let agents: Vec<orc_core::Agent> = resp.json().await.expect("json");
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name.as_str(), "support");
}

#[tokio::test]
async fn create_session_returns_422_when_the_agent_directory_is_missing() {
    let h = harness().await;
    let tenant = orc_core::TenantId::new();
    let agent = orc_core::Agent::new(orc_core::AgentName::new("ghost"), tenant.clone(), std::path::PathBuf::from("/nonexistent"));
    h.store.upsert_agent(&agent).await.expect("upsert_agent");

    let resp = h
        .client
        .post(format!("{}/api/sessions", h.base_url))
        .header("x-tenant-id", tenant.to_string())
        .json(&serde_json::json!({ "agent": "ghost" }))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn internal_endpoints_reject_requests_without_the_bearer_secret() {
    let h = harness().await;
    let resp = h
        .client
        .post(format!("{}/api/internal/runners/register", h.base_url))
        .json(&orc_wire::internal::RegisterRequest { runner_id: RunnerId::new(), host: "10.0.0.9".into(), port: 9300, max_sandboxes: 4 })
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_runner_upserts_the_store_row() {
    let h = harness().await;
    let runner_id = RunnerId::new();
    let resp = h
        .client
        .post(format!("{}/api/internal/runners/register", h.base_url))
        .bearer_auth("secret")
        .json(&orc_wire::internal::RegisterRequest { runner_id: runner_id.clone(), host: "10.0.0.9".into(), port: 9300, max_sandboxes: 4 })
        .send()
        .await
        .expect("post");
    assert!(resp.status().is_success());
    assert!(h.store.get_runner(&runner_id).await.expect("get_runner").is_some());
}
