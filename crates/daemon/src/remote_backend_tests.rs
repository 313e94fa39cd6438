// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use axum::extract::Path as AxPath;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use orc_core::{AgentName, TenantId};
use orc_wire::internal::{CreateSandboxRequest, CreateSandboxResponse, GetSandboxResponse};
use std::net::SocketAddr;

/// Spins up a tiny axum server standing in for a runner, on an ephemeral
/// port, and returns the backend pointed at it.
async fn fake_runner(router: Router) -> (RemoteRunnerBackend, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    let backend = RemoteRunnerBackend::new(reqwest::Client::new(), format!("http://{addr}"), "secret".into());
    (backend, handle)
}

#[tokio::test]
async fn create_sandbox_posts_and_parses_the_response() {
    let router = Router::new().route(
        "/runner/sandboxes",
        post(|Json(req): Json<CreateSandboxRequest>| async move {
            Json(CreateSandboxResponse { sandbox_id: SandboxId::new(), workspace_dir: format!("/ws/{}", req.session_id) })
        }),
    );
    let (backend, _task) = fake_runner(router).await;

    let created = backend
        .create_sandbox(&SessionId::new(), &AgentName::new("support"), PathBuf::from("/agents/support"), serde_json::json!({}), None, &orc_engine::NoopHook)
        .await
        .expect("create_sandbox");
    assert!(created.workspace_dir.to_string_lossy().starts_with("/ws/sess_"));
}

#[tokio::test]
async fn destroy_sandbox_maps_non_success_status_to_runner_unreachable() {
    let router = Router::new().route(
        "/runner/sandboxes/:id",
        delete(|AxPath(_id): AxPath<String>| async move { axum::http::StatusCode::NOT_FOUND }),
    );
    let (backend, _task) = fake_runner(router).await;

    let err = backend.destroy_sandbox(&SandboxId::new()).await.unwrap_err();
    assert!(matches!(err, EngineError::RunnerUnreachable(_)));
}

#[tokio::test]
async fn is_alive_reflects_the_runner_response() {
    let router = Router::new().route(
        "/runner/sandboxes/:id",
        get(|| async move { Json(GetSandboxResponse { alive: true }) }),
    );
    let (backend, _task) = fake_runner(router).await;

    assert!(backend.is_alive(&SandboxId::new()).await);
}

#[tokio::test]
async fn is_alive_is_false_when_the_runner_is_unreachable() {
    let backend = RemoteRunnerBackend::new(reqwest::Client::new(), "http://127.0.0.1:1".into(), "secret".into());
    assert!(!backend.is_alive(&SandboxId::new()).await);
}

#[tokio::test]
async fn query_streaming_forwards_sse_events_until_the_terminal_frame() {
    let router = Router::new().route(
        "/runner/sandboxes/:id/cmd",
        post(|| async move {
            let body = format!(
                "{}{}",
                orc_wire::encode_frame("message", &serde_json::json!({"event": "message", "data": {"text": "hi"}})),
                orc_wire::encode_frame("done", &serde_json::json!({"event": "done"})),
            );
            ([("content-type", "text/event-stream")], body).into_response()
        }),
    );
    let (backend, _task) = fake_runner(router).await;

    let (tx, mut rx) = mpsc::channel(8);
    backend
        .query_streaming(&SandboxId::new(), "hello".into(), None, serde_json::json!({}), tx)
        .await
        .expect("query_streaming");

    let first = rx.recv().await.expect("first");
    assert!(matches!(first, Event::Message { .. }));
    let second = rx.recv().await.expect("second");
    assert!(matches!(second, Event::Done { .. }));
    assert!(rx.recv().await.is_none());
}

#[allow(dead_code)]
fn unused_tenant_for_import_stability() -> TenantId {
    TenantId::new()
}
