// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace persistence: copying a sandbox's working directory
//! to a stable, session-keyed location and back. Best-effort — callers
//! decide how a failure here affects the session's status.

use std::path::{Path, PathBuf};

use orc_core::{AgentName, SessionId};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SnapshotMetadata<'a> {
    session_id: &'a SessionId,
    agent_name: &'a str,
    snapshotted_at_ms: u64,
}

/// Stable on-disk location for a session's persisted workspace snapshot
/// (`dataDir/sessions/<sessionId>/workspace`).
pub fn snapshot_dir(data_dir: &Path, session_id: &SessionId) -> PathBuf {
    data_dir.join("sessions").join(session_id.as_str()).join("workspace")
}

fn metadata_path(data_dir: &Path, session_id: &SessionId) -> PathBuf {
    data_dir.join("sessions").join(session_id.as_str()).join("metadata.json")
}

/// Copies `workspace_dir` into the session's stable snapshot location plus a
/// small metadata file recording which agent produced it.
pub async fn persist_session_state(
    data_dir: &Path,
    session_id: &SessionId,
    workspace_dir: &Path,
    agent_name: &AgentName,
    now_ms: u64,
) -> std::io::Result<()> {
    let dest = snapshot_dir(data_dir, session_id);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::metadata(&dest).await.is_ok() {
        tokio::fs::remove_dir_all(&dest).await?;
    }
    copy_dir_recursive(workspace_dir, &dest).await?;

    let metadata = SnapshotMetadata { session_id, agent_name: agent_name.as_str(), snapshotted_at_ms: now_ms };
    let json = serde_json::to_vec_pretty(&metadata).unwrap_or_default();
    tokio::fs::write(metadata_path(data_dir, session_id), json).await
}

/// Whether a snapshot exists for this session (cold resume / fork seeding).
pub async fn has_snapshot(data_dir: &Path, session_id: &SessionId) -> bool {
    tokio::fs::metadata(snapshot_dir(data_dir, session_id)).await.is_ok()
}

/// Seeds a freshly created (empty) workspace directory from a prior
/// snapshot. No-op if no snapshot exists for `session_id`.
pub async fn seed_from_snapshot(data_dir: &Path, session_id: &SessionId, workspace_dir: &Path) -> std::io::Result<()> {
    let src = snapshot_dir(data_dir, session_id);
    if tokio::fs::metadata(&src).await.is_err() {
        return Ok(());
    }
    copy_dir_recursive(&src, workspace_dir).await
}

/// Copies an arbitrary snapshot directory into a newly created workspace.
/// Used when the caller has already resolved the seed path (cold resume,
/// fork) rather than deriving it from `snapshot_dir`.
pub async fn copy_seed(seed: &Path, workspace_dir: &Path) -> std::io::Result<()> {
    copy_dir_recursive(seed, workspace_dir).await
}

fn copy_dir_recursive<'a>(src: &'a Path, dest: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dest).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let dest_path = dest.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&entry.path(), &dest_path).await?;
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &dest_path).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
