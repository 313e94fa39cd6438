// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`SandboxLauncher`] contract: start a sandbox, get back a
//! raw duplex byte stream the bridge protocol runs over. Implementations
//! (`ProcessLauncher`, `DockerLauncher`) differ only in how that stream and
//! its teardown are obtained.

use async_trait::async_trait;
use orc_core::SandboxId;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::SandboxError;

/// Launch parameters for a single sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub sandbox_id: SandboxId,
    pub agent_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub config: serde_json::Value,
}

/// Cleanup handle for a launched sandbox, opaque to everything but the
/// launcher that created it.
#[async_trait]
pub trait SandboxProcess: Send + Sync {
    /// Request a graceful stop, escalating to a hard kill after `grace`.
    async fn kill(&mut self, grace: std::time::Duration) -> Result<(), SandboxError>;
}

/// A running sandbox: its bridge duplex stream plus a handle to tear it down.
pub struct LaunchedSandbox {
    pub sandbox_id: SandboxId,
    pub workspace_dir: PathBuf,
    pub stdin: Box<dyn AsyncWrite + Unpin + Send>,
    pub stdout: Box<dyn AsyncRead + Unpin + Send>,
    pub process: Box<dyn SandboxProcess>,
}

#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    async fn launch(&self, spec: SandboxSpec) -> Result<LaunchedSandbox, SandboxError>;
}
