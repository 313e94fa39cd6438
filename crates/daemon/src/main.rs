// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orcd`: the coordinator/runner binary. Every process runs the same
//! gateway and, when `ORC_MAX_SANDBOXES` permits, a local `SandboxPool` —
//! a node becomes a pure coordinator simply by setting it to zero. When
//! `ORC_COORDINATOR_URL` is set this node also registers itself as a
//! runner against that coordinator, so a single binary covers embedded,
//! coordinator-only, and runner deployments through configuration alone.

use std::sync::Arc;
use std::time::Duration;

use orc_core::{RunnerId, SystemClock};
use orc_daemon::coordinator::RunnerCoordinator;
use orc_daemon::gateway::{router, AppState};
use orc_daemon::env;
use orc_engine::{LocalRunnerBackend, RunnerBackend, SandboxPool, SessionManager};
use orc_sandbox::ProcessLauncher;
use orc_store::{MemStore, PgStore, Store};
use orc_wire::internal::{HeartbeatRequest, RegisterRequest};
use tracing::{error, info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let store = build_store().await?;

    let reaped = store.mark_all_sandboxes_cold().await?;
    if reaped > 0 {
        info!(reaped, "marked sandboxes cold from a previous crash/restart");
    }

    let pool = build_pool(store.clone());
    let local_backend: Option<Arc<dyn RunnerBackend>> = match &pool {
        Some(pool) => Some(build_local_backend(pool.clone())?),
        None => None,
    };

    let coordinator =
        Arc::new(RunnerCoordinator::new(store.clone(), local_backend.clone(), env::internal_secret()?, SystemClock));
    coordinator.spawn_liveness_sweep();

    let data_dir = env::state_dir()?.join("sessions");
    std::fs::create_dir_all(&data_dir)?;
    let sessions = Arc::new(SessionManager::new(store.clone(), coordinator.clone(), data_dir, SystemClock));

    let state = Arc::new(AppState {
        sessions,
        coordinator: coordinator.clone(),
        store: store.clone(),
        local_backend: local_backend.clone(),
        internal_secret: env::internal_secret()?,
    });

    let runner_id = RunnerId::new();
    if let Some(coordinator_url) = env::coordinator_url() {
        tokio::spawn(run_as_remote_runner(coordinator_url, runner_id, pool.clone()));
    }

    let bind_addr = env::bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(%bind_addr, "orcd listening");

    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await?;

    if let Some(pool) = pool {
        info!("draining local sandboxes before exit");
        pool.destroy_all().await;
    }

    Ok(())
}

async fn build_store() -> Result<Arc<dyn Store>, BoxError> {
    match env::database_url() {
        Some(url) => {
            let store = PgStore::connect(&url).await?;
            store.migrate().await?;
            info!("connected to postgres store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("ORC_DATABASE_URL not set, running on an in-process MemStore (single-node only)");
            Ok(Arc::new(MemStore::new()))
        }
    }
}

fn build_pool(store: Arc<dyn Store>) -> Option<Arc<SandboxPool<SystemClock>>> {
    let capacity = env::max_sandboxes();
    if capacity == 0 {
        return None;
    }
    let launcher = Arc::new(ProcessLauncher::new(env::bridge_bin()));
    Some(Arc::new(SandboxPool::new(launcher, store, SystemClock, capacity, env::bridge_handshake_timeout())))
}

fn build_local_backend(pool: Arc<SandboxPool<SystemClock>>) -> Result<Arc<dyn RunnerBackend>, BoxError> {
    let workspace_root = env::state_dir()?.join("workspaces");
    let data_dir = env::state_dir()?.join("sandboxes");
    std::fs::create_dir_all(&workspace_root)?;
    std::fs::create_dir_all(&data_dir)?;
    Ok(Arc::new(LocalRunnerBackend::new(pool, workspace_root, data_dir, SystemClock)))
}

/// Registers with a remote coordinator and heartbeats for as long as the
/// process runs. Registration retries with exponential backoff (at
/// most 5 attempts, 1-16s) before giving up and leaving this node
/// unregistered for the remainder of the process — it still serves its own
/// gateway, it just never receives placement from that coordinator.
async fn run_as_remote_runner(coordinator_url: String, runner_id: RunnerId, pool: Option<Arc<SandboxPool<SystemClock>>>) {
    let client = reqwest::Client::new();
    let secret = match env::internal_secret() {
        Ok(secret) => secret,
        Err(e) => {
            error!(error = %e, "cannot register with coordinator without an internal secret");
            return;
        }
    };

    let register = RegisterRequest { runner_id: runner_id.clone(), host: env::advertise_host(), port: env::advertise_port(), max_sandboxes: env::max_sandboxes() };

    let mut attempt = 0u32;
    loop {
        let result = client
            .post(format!("{coordinator_url}/api/internal/runners/register"))
            .bearer_auth(&secret)
            .json(&register)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => break,
            Err(_) if attempt >= 4 => {
                error!(attempt, "giving up registering with coordinator");
                return;
            }
            Err(e) => {
                let backoff = Duration::from_secs(1u64 << attempt).min(Duration::from_secs(16));
                warn!(error = %e, attempt, ?backoff, "runner registration failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
    info!(%runner_id, %coordinator_url, "registered with coordinator");

    let mut ticker = tokio::time::interval(RunnerCoordinator::<SystemClock>::heartbeat_interval());
    loop {
        ticker.tick().await;
        let (active_count, warming_count) = match &pool {
            Some(pool) => {
                let snapshot = pool.metrics();
                (snapshot.running as u32, snapshot.warming as u32)
            }
            None => (0, 0),
        };
        let beat = HeartbeatRequest { runner_id: runner_id.clone(), active_count, warming_count };
        let sent = client.post(format!("{coordinator_url}/api/internal/runners/heartbeat")).bearer_auth(&secret).json(&beat).send().await;
        if let Err(e) = sent {
            warn!(error = %e, "heartbeat to coordinator failed");
        }
    }
}

async fn shutdown_signal() {
    // Allow expect here: failure to install a signal handler means the OS/runtime is
    // broken, and there's no graceful-shutdown path left to fall back to.
    #[allow(clippy::expect_used)]
    let ctrl_c = async { tokio::signal::ctrl_c().await.expect("install Ctrl+C handler") };

    #[cfg(unix)]
    #[allow(clippy::expect_used)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler").recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
