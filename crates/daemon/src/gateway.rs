// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The public + internal `axum` HTTP and SSE surface: session lifecycle,
//! agent CRUD, and the coordinator/runner internal endpoints, all behind one
//! router so a single node can serve any combination of those roles. Each
//! streaming response pairs a bounded `tokio::sync::mpsc` channel with a
//! write-timeout, so a slow client backs up the forwarding task instead of
//! the bridge itself.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::{Stream, StreamExt};
use orc_core::{AgentName, Clock, SandboxId, SessionId, TenantId};
use orc_engine::{EngineError, SessionManager};
use orc_store::Store;
use orc_wire::internal::{
    CreateSandboxRequest, CreateSandboxResponse, DeregisterRequest, GetSandboxResponse, HeartbeatRequest, HeartbeatResponse,
    PersistSandboxRequest, RegisterRequest, RegisterResponse, SandboxCommandRequest,
};
use orc_wire::Event;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::coordinator::RunnerCoordinator;

const SSE_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_CHANNEL_CAPACITY: usize = 64;

/// Everything an `axum` handler needs. `local_backend` is `Some` only on
/// nodes that also run a `SandboxPool` (embedded or runner processes) — it
/// backs the `/runner/sandboxes/*` handlers that `RemoteRunnerBackend` calls
/// into on other nodes.
pub struct AppState<C: Clock> {
    pub sessions: Arc<SessionManager<C>>,
    pub coordinator: Arc<RunnerCoordinator<C>>,
    pub store: Arc<dyn Store>,
    pub local_backend: Option<Arc<dyn orc_engine::RunnerBackend>>,
    pub internal_secret: String,
}

pub fn router<C: Clock>(state: Arc<AppState<C>>) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session::<C>))
        .route("/api/sessions/:id/messages", post(send_message::<C>).get(list_messages::<C>))
        .route("/api/sessions/:id/pause", post(pause_session::<C>))
        .route("/api/sessions/:id/resume", post(resume_session::<C>))
        .route("/api/sessions/:id/stop", post(stop_session::<C>))
        .route("/api/sessions/:id/fork", post(fork_session::<C>))
        .route("/api/sessions/:id", delete(end_session::<C>))
        .route("/api/sessions/:id/exec", post(exec_session::<C>))
        .route("/api/sessions/:id/usage", get(session_usage::<C>))
        .route("/api/agents", post(upsert_agent::<C>).get(list_agents::<C>))
        .route("/api/agents/:name", delete(delete_agent::<C>))
        .route("/api/internal/runners/register", post(register_runner::<C>))
        .route("/api/internal/runners/heartbeat", post(heartbeat_runner::<C>))
        .route("/api/internal/runners/deregister", post(deregister_runner::<C>))
        .route("/runner/sandboxes", post(runner_create_sandbox::<C>))
        .route("/runner/sandboxes/:id", delete(runner_destroy_sandbox::<C>).get(runner_get_sandbox::<C>))
        .route("/runner/sandboxes/:id/cmd", post(runner_cmd::<C>))
        .route("/runner/sandboxes/:id/interrupt", post(runner_interrupt::<C>))
        .route("/runner/sandboxes/:id/persist", post(runner_persist::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error-to-status mapping (the table).
struct GatewayError(EngineError);

impl From<EngineError> for GatewayError {
    fn from(e: EngineError) -> Self {
        GatewayError(e)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::AgentDirectoryMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::CapacityExhausted | EngineError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::SessionNotActive(_) => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::BridgeHandshakeTimeout(_) | EngineError::BridgeProtocolError(_) | EngineError::Workspace(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::RunnerUnreachable(_) => StatusCode::BAD_GATEWAY,
            EngineError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn tenant_from_headers(headers: &HeaderMap) -> TenantId {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .map(TenantId::from)
        .unwrap_or_else(TenantId::new)
}

fn check_internal_secret<C: Clock>(state: &AppState<C>, headers: &HeaderMap) -> Result<(), StatusCode> {
    let got = headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(|v| v.strip_prefix("Bearer "));
    if got == Some(state.internal_secret.as_str()) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct CreateSessionBody {
    agent: String,
    #[serde(default)]
    config: orc_core::SessionConfig,
}

async fn create_session<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<orc_core::Session>, GatewayError> {
    let tenant = tenant_from_headers(&headers);
    let session = state.sessions.create_session(tenant, AgentName::new(body.agent), body.config).await?;
    Ok(Json(session))
}

#[derive(Deserialize)]
struct SendMessageBody {
    content: String,
    #[serde(default)]
    options: serde_json::Value,
}

/// Hot path: one SSE frame per bridge event, drained through a
/// bounded channel so a slow client backs the bridge-forwarding task up to
/// `SSE_WRITE_TIMEOUT` before the stream gives up.
async fn send_message<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<SessionId>,
    Json(body): Json<SendMessageBody>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>>, GatewayError> {
    let (bridge_tx, mut bridge_rx) = mpsc::channel::<Event>(SSE_CHANNEL_CAPACITY);
    let (sse_tx, sse_rx) = mpsc::channel::<SseEvent>(SSE_CHANNEL_CAPACITY);

    let sessions = state.sessions.clone();
    let session_id = id.clone();
    tokio::spawn(async move {
        let send = sessions.send_message(&session_id, body.content, body.options, bridge_tx);
        tokio::pin!(send);

        loop {
            tokio::select! {
                biased;
                event = bridge_rx.recv() => {
                    let Some(event) = event else { break };
                    let (kind, data) = frame_for(&event);
                    let frame = SseEvent::default().event(kind).data(data.to_string());
                    match tokio::time::timeout(SSE_WRITE_TIMEOUT, sse_tx.send(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) => break,
                        Err(_) => {
                            tracing::warn!(session_id = %session_id, "SSE write timed out, interrupting");
                            let _ = sessions.interrupt(&session_id).await;
                            let err = SseEvent::default().event("error").data(
                                serde_json::json!({ "kind": "ClientWriteTimeout" }).to_string(),
                            );
                            let _ = sse_tx.send(err).await;
                            break;
                        }
                    }
                }
                result = &mut send, if !bridge_rx.is_closed() => {
                    if let Err(e) = result {
                        tracing::warn!(session_id = %session_id, error = %e, "send_message failed");
                    }
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(sse_rx).map(Ok)).keep_alive(KeepAlive::default()))
}

fn frame_for(event: &Event) -> (&'static str, serde_json::Value) {
    let kind = match event {
        Event::Ready { .. } => "ready",
        Event::Message { .. } => "message",
        Event::Error { .. } => "error",
        Event::Done { .. } => "done",
        Event::ExecResult { .. } => "exec_result",
    };
    (kind, serde_json::to_value(event).unwrap_or(serde_json::Value::Null))
}

async fn list_messages<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<SessionId>,
) -> Result<Json<Vec<orc_store::SessionEventRow>>, GatewayError> {
    let rows = state.store.list_session_events(&id).await.map_err(EngineError::from)?;
    Ok(Json(rows))
}

async fn pause_session<C: Clock>(State(state): State<Arc<AppState<C>>>, Path(id): Path<SessionId>) -> Result<StatusCode, GatewayError> {
    state.sessions.pause(&id).await?;
    Ok(StatusCode::OK)
}

async fn resume_session<C: Clock>(State(state): State<Arc<AppState<C>>>, Path(id): Path<SessionId>) -> Result<StatusCode, GatewayError> {
    state.sessions.resume(&id).await?;
    Ok(StatusCode::OK)
}

/// Stop: same as client disconnect plus an explicit status flip.
async fn stop_session<C: Clock>(State(state): State<Arc<AppState<C>>>, Path(id): Path<SessionId>) -> Result<StatusCode, GatewayError> {
    state.sessions.interrupt(&id).await?;
    Ok(StatusCode::OK)
}

async fn fork_session<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<SessionId>,
) -> Result<Json<orc_core::Session>, GatewayError> {
    let child = state.sessions.fork(&id).await?;
    Ok(Json(child))
}

async fn end_session<C: Clock>(State(state): State<Arc<AppState<C>>>, Path(id): Path<SessionId>) -> Result<StatusCode, GatewayError> {
    state.sessions.end(&id).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct ExecBody {
    command: String,
    #[serde(default = "default_exec_timeout_ms")]
    timeout_ms: u64,
}

fn default_exec_timeout_ms() -> u64 {
    30_000
}

async fn exec_session<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<SessionId>,
    Json(body): Json<ExecBody>,
) -> Result<Json<Event>, GatewayError> {
    let event = state.sessions.exec(&id, body.command, body.timeout_ms).await?;
    Ok(Json(event))
}

/// Thin glue over `session_events` (Non-goals: usage tracking
/// beyond this is out of scope) — counts turns by role rather than token
/// accounting, since `Store` carries no dedicated usage ledger.
#[derive(Serialize)]
struct SessionUsage {
    total_events: u64,
    user_turns: u64,
}

async fn session_usage<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionUsage>, GatewayError> {
    let rows = state.store.list_session_events(&id).await.map_err(EngineError::from)?;
    let user_turns = rows.iter().filter(|r| r.role == "user").count() as u64;
    Ok(Json(SessionUsage { total_events: rows.len() as u64, user_turns }))
}

#[derive(Deserialize)]
struct UpsertAgentBody {
    name: String,
    path: std::path::PathBuf,
}

async fn upsert_agent<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<UpsertAgentBody>,
) -> Result<Json<orc_core::Agent>, GatewayError> {
    let tenant = tenant_from_headers(&headers);
    let existing = state.store.get_agent(&tenant, &AgentName::new(body.name.clone())).await.map_err(EngineError::from)?;
    let agent = match existing {
        Some(mut agent) => {
            agent.redeploy(body.path);
            agent
        }
        None => orc_core::Agent::new(AgentName::new(body.name), tenant, body.path),
    };
    state.store.upsert_agent(&agent).await.map_err(EngineError::from)?;
    Ok(Json(agent))
}

async fn list_agents<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
) -> Result<Json<Vec<orc_core::Agent>>, GatewayError> {
    let tenant = tenant_from_headers(&headers);
    let agents = state.store.list_agents(&tenant).await.map_err(EngineError::from)?;
    Ok(Json(agents))
}

async fn delete_agent<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<StatusCode, GatewayError> {
    let tenant = tenant_from_headers(&headers);
    state.store.delete_agent(&tenant, &AgentName::new(name)).await.map_err(EngineError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register_runner<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, StatusCode> {
    check_internal_secret(&state, &headers)?;
    state
        .coordinator
        .register(&body.runner_id, &body.host, body.port, body.max_sandboxes)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(RegisterResponse { runner_id: body.runner_id }))
}

async fn heartbeat_runner<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, StatusCode> {
    check_internal_secret(&state, &headers)?;
    state
        .coordinator
        .heartbeat(&body.runner_id, body.active_count, body.warming_count)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(HeartbeatResponse { acknowledged: true }))
}

async fn deregister_runner<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<DeregisterRequest>,
) -> Result<StatusCode, StatusCode> {
    check_internal_secret(&state, &headers)?;
    state.coordinator.deregister(&body.runner_id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::OK)
}

fn local_backend<C: Clock>(state: &AppState<C>) -> Result<&Arc<dyn orc_engine::RunnerBackend>, StatusCode> {
    state.local_backend.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn runner_create_sandbox<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Json(body): Json<CreateSandboxRequest>,
) -> Result<Json<CreateSandboxResponse>, StatusCode> {
    check_internal_secret(&state, &headers)?;
    let backend = local_backend(&state)?;
    let created = backend
        .create_sandbox(
            &body.session_id,
            &AgentName::new("unknown"),
            std::path::PathBuf::from(body.agent_dir),
            body.config,
            None,
            &orc_engine::NoopHook,
        )
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(CreateSandboxResponse { sandbox_id: created.sandbox_id, workspace_dir: created.workspace_dir.display().to_string() }))
}

async fn runner_destroy_sandbox<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(id): Path<SandboxId>,
) -> Result<StatusCode, StatusCode> {
    check_internal_secret(&state, &headers)?;
    local_backend(&state)?.destroy_sandbox(&id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::OK)
}

async fn runner_get_sandbox<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(id): Path<SandboxId>,
) -> Result<Json<GetSandboxResponse>, StatusCode> {
    check_internal_secret(&state, &headers)?;
    let alive = local_backend(&state)?.is_alive(&id).await;
    Ok(Json(GetSandboxResponse { alive }))
}

async fn runner_cmd<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(id): Path<SandboxId>,
    Json(body): Json<SandboxCommandRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, std::convert::Infallible>>>, StatusCode> {
    check_internal_secret(&state, &headers)?;
    let backend = local_backend(&state)?.clone();
    let (tx, mut rx) = mpsc::channel::<Event>(SSE_CHANNEL_CAPACITY);
    let (sse_tx, sse_rx) = mpsc::channel::<SseEvent>(SSE_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let run = async move {
            match body.command {
                orc_wire::Command::Query { prompt, session_resume_id, options } => {
                    backend.query_streaming(&id, prompt, session_resume_id, options, tx.clone()).await
                }
                orc_wire::Command::Exec { command, timeout_ms } => match backend.exec(&id, command, timeout_ms).await {
                    Ok(event) => {
                        let _ = tx.send(event).await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                },
                orc_wire::Command::Interrupt {} => backend.interrupt(&id).await,
                orc_wire::Command::Resume { .. } | orc_wire::Command::Shutdown {} => Ok(()),
            }
        };
        tokio::pin!(run);

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let (kind, data) = frame_for(&event);
                    let frame = SseEvent::default().event(kind).data(data.to_string());
                    if sse_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                result = &mut run, if !rx.is_closed() => {
                    if let Err(e) = result {
                        tracing::warn!(sandbox_id = %id, error = %e, "runner_cmd failed");
                    }
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(sse_rx).map(Ok)).keep_alive(KeepAlive::default()))
}

async fn runner_interrupt<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(id): Path<SandboxId>,
) -> Result<StatusCode, StatusCode> {
    check_internal_secret(&state, &headers)?;
    local_backend(&state)?.interrupt(&id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::OK)
}

async fn runner_persist<C: Clock>(
    State(state): State<Arc<AppState<C>>>,
    headers: HeaderMap,
    Path(id): Path<SandboxId>,
    Json(body): Json<PersistSandboxRequest>,
) -> Result<StatusCode, StatusCode> {
    check_internal_secret(&state, &headers)?;
    local_backend(&state)?
        .persist_state(&id, &body.session_id, &AgentName::new(body.agent_name))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
