// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::NoopHook;
use orc_core::FakeClock;
use orc_sandbox::FakeLauncher;
use orc_store::{MemStore, Store};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

fn backend(launcher: Arc<FakeLauncher>, store: Arc<MemStore>, workspace_root: PathBuf, data_dir: PathBuf) -> LocalRunnerBackend<FakeClock> {
    let pool = Arc::new(SandboxPool::new(launcher, store, FakeClock::new(), 4, Duration::from_secs(1)));
    LocalRunnerBackend::new(pool, workspace_root, data_dir, FakeClock::new())
}

async fn create_with_handshake(
    backend: &LocalRunnerBackend<FakeClock>,
    launcher: Arc<FakeLauncher>,
    session_id: &SessionId,
) -> CreatedSandbox {
    let handshake = tokio::spawn(async move {
        let (id, mut daemon_side) = launcher.take_any_daemon_side().await;
        daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
        id
    });
    let created = backend
        .create_sandbox(session_id, &AgentName::new("support"), PathBuf::from("/agents/support"), serde_json::json!({}), None, &NoopHook)
        .await
        .expect("create_sandbox");
    handshake.await.expect("handshake task");
    created
}

#[tokio::test]
async fn create_sandbox_makes_a_workspace_directory_and_admits_it() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let backend = backend(launcher.clone(), store.clone(), root.path().to_path_buf(), data_dir.path().to_path_buf());

    let session_id = SessionId::new();
    let created = create_with_handshake(&backend, launcher, &session_id).await;

    assert!(tokio::fs::metadata(&created.workspace_dir).await.is_ok());
    assert!(backend.is_alive(&created.sandbox_id).await);
}

#[tokio::test]
async fn create_sandbox_seeds_the_workspace_when_given_a_seed_path() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let backend = backend(launcher.clone(), store.clone(), root.path().to_path_buf(), data_dir.path().to_path_buf());

    let seed = tempfile::tempdir().expect("tempdir");
    tokio::fs::write(seed.path().join("seeded.txt"), b"carried over").await.expect("write");

    let session_id = SessionId::new();
    let handshake = tokio::spawn({
        let launcher = launcher.clone();
        async move {
            let (id, mut daemon_side) = launcher.take_any_daemon_side().await;
            daemon_side.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
            id
        }
    });
    let created = backend
        .create_sandbox(
            &session_id,
            &AgentName::new("support"),
            PathBuf::from("/agents/support"),
            serde_json::json!({}),
            Some(seed.path().to_path_buf()),
            &NoopHook,
        )
        .await
        .expect("create_sandbox");
    handshake.await.expect("handshake task");

    let contents = tokio::fs::read_to_string(created.workspace_dir.join("seeded.txt")).await.expect("read seeded file");
    assert_eq!(contents, "carried over");
}

#[tokio::test]
async fn is_alive_is_false_for_an_unknown_sandbox() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let backend = backend(launcher, store, root.path().to_path_buf(), data_dir.path().to_path_buf());
    assert!(!backend.is_alive(&SandboxId::new()).await);
}

#[tokio::test]
async fn destroy_sandbox_removes_it_from_the_store() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let backend = backend(launcher.clone(), store.clone(), root.path().to_path_buf(), data_dir.path().to_path_buf());

    let session_id = SessionId::new();
    let created = create_with_handshake(&backend, launcher, &session_id).await;

    backend.destroy_sandbox(&created.sandbox_id).await.expect("destroy");
    assert!(store.get_sandbox(&created.sandbox_id).await.expect("get").is_none());
}

#[tokio::test]
async fn persist_state_writes_a_snapshot_under_the_data_dir() {
    let launcher = Arc::new(FakeLauncher::new());
    let store = Arc::new(MemStore::new());
    let root = tempfile::tempdir().expect("tempdir");
    let data_dir = tempfile::tempdir().expect("tempdir");
    let backend = backend(launcher.clone(), store.clone(), root.path().to_path_buf(), data_dir.path().to_path_buf());

    let session_id = SessionId::new();
    let created = create_with_handshake(&backend, launcher, &session_id).await;
    tokio::fs::write(created.workspace_dir.join("out.txt"), b"turn output").await.expect("write");

    backend.persist_state(&created.sandbox_id, &session_id, &AgentName::new("support")).await.expect("persist");

    let snapshot = workspace::snapshot_dir(data_dir.path(), &session_id);
    let contents = tokio::fs::read_to_string(snapshot.join("out.txt")).await.expect("read snapshot");
    assert_eq!(contents, "turn output");
}
