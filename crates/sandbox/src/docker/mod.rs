// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`DockerLauncher`]: spawns the bridge inside a container via the Docker
//! Engine HTTP API over its Unix socket. Lifecycle is
//! create → start → attach → stop → remove.

mod demux;
mod http;

use async_trait::async_trait;

use crate::error::SandboxError;
use crate::launcher::{LaunchedSandbox, SandboxLauncher, SandboxProcess, SandboxSpec};
use demux::DemuxReader;

pub struct DockerLauncher {
    socket_path: std::path::PathBuf,
    image: String,
    memory_bytes: u64,
}

impl DockerLauncher {
    pub fn new(socket_path: std::path::PathBuf, image: String) -> Self {
        Self { socket_path, image, memory_bytes: 2 * 1024 * 1024 * 1024 }
    }

    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    async fn create_container(&self, spec: &SandboxSpec) -> Result<String, SandboxError> {
        let body = serde_json::json!({
            "Image": self.image,
            "Env": [
                format!("ORC_AGENT_DIR={}", spec.agent_dir.display()),
                format!("ORC_SANDBOX_CONFIG={}", spec.config),
            ],
            "OpenStdin": true,
            "AttachStdin": true,
            "AttachStdout": true,
            "AttachStderr": true,
            "Tty": false,
            "HostConfig": {
                "Memory": self.memory_bytes,
                "Binds": [format!("{}:/workspace", spec.workspace_dir.display())],
            },
            "WorkingDir": "/workspace",
        })
        .to_string();

        let (status, resp) =
            http::call(&self.socket_path, "POST", "/containers/create", Some(&body)).await?;
        if status >= 300 {
            return Err(SandboxError::LaunchFailed(format!("container create failed: {resp}")));
        }
        let json: serde_json::Value = serde_json::from_str(&resp)
            .map_err(|e| SandboxError::LaunchFailed(format!("invalid create response: {e}")))?;
        json.get("Id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SandboxError::LaunchFailed("create response missing Id".into()))
    }

    async fn start_container(&self, id: &str) -> Result<(), SandboxError> {
        let (status, resp) =
            http::call(&self.socket_path, "POST", &format!("/containers/{id}/start"), None).await?;
        if status >= 300 {
            return Err(SandboxError::LaunchFailed(format!("container start failed: {resp}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxLauncher for DockerLauncher {
    async fn launch(&self, spec: SandboxSpec) -> Result<LaunchedSandbox, SandboxError> {
        let container_id = self.create_container(&spec).await?;
        self.start_container(&container_id).await?;

        let (stream, leftover) = http::attach(&self.socket_path, &container_id).await?;
        let (read_half, write_half) = stream.into_split();
        let stdout = DemuxReader::new(read_half, leftover);

        tracing::info!(sandbox_id = %spec.sandbox_id, container_id, "spawned docker sandbox");

        Ok(LaunchedSandbox {
            sandbox_id: spec.sandbox_id,
            workspace_dir: spec.workspace_dir,
            stdin: Box::new(write_half),
            stdout: Box::new(stdout),
            process: Box::new(DockerProcess {
                socket_path: self.socket_path.clone(),
                container_id,
            }),
        })
    }
}

struct DockerProcess {
    socket_path: std::path::PathBuf,
    container_id: String,
}

#[async_trait]
impl SandboxProcess for DockerProcess {
    async fn kill(&mut self, grace: std::time::Duration) -> Result<(), SandboxError> {
        let t_secs = grace.as_secs().max(1);
        let (status, resp) = http::call(
            &self.socket_path,
            "POST",
            &format!("/containers/{}/stop?t={t_secs}", self.container_id),
            None,
        )
        .await?;
        if status >= 300 && status != 304 {
            tracing::warn!(container_id = %self.container_id, %resp, "container stop returned an error, removing anyway");
        }
        let (status, resp) = http::call(
            &self.socket_path,
            "DELETE",
            &format!("/containers/{}?force=1", self.container_id),
            None,
        )
        .await?;
        if status >= 300 && status != 404 {
            return Err(SandboxError::LaunchFailed(format!("container remove failed: {resp}")));
        }
        Ok(())
    }
}

