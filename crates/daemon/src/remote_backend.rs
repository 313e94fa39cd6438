// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RemoteRunnerBackend`: maps every [`RunnerBackend`] call to a REST
//! request against another node, pairing the gateway's axum-style HTTP
//! surface with a plain `reqwest` client for the peer-to-peer side.

use std::path::PathBuf;

use async_trait::async_trait;
use orc_core::{AgentName, SandboxId, SessionId};
use orc_engine::{CreatedSandbox, EngineError, EvictionHook, RunnerBackend};
use orc_wire::internal::{CreateSandboxRequest, CreateSandboxResponse, GetSandboxResponse, PersistSandboxRequest, SandboxCommandRequest};
use orc_wire::{Command, Event, SseDecoder};
use tokio::sync::mpsc;

/// One runner's REST + SSE surface, reached over `reqwest`. `hook`/`seed_from`
/// on `create_sandbox` are accepted for trait-shape parity with
/// `LocalRunnerBackend` but not forwarded: cross-process workspace seeding
/// would mean shipping a directory tree over the wire, which is out of scope
/// for this MVP (see DESIGN.md) — a session resumed onto a different runner
/// than the one holding its snapshot falls back to an empty workspace.
pub struct RemoteRunnerBackend {
    http: reqwest::Client,
    base_url: String,
    internal_secret: String,
}

impl RemoteRunnerBackend {
    pub fn new(http: reqwest::Client, base_url: String, internal_secret: String) -> Self {
        Self { http, base_url, internal_secret }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(e: impl std::fmt::Display) -> EngineError {
        EngineError::RunnerUnreachable(e.to_string())
    }

    async fn send_command(&self, sandbox_id: &SandboxId, command: Command, sink: mpsc::Sender<Event>) -> Result<(), EngineError> {
        let body = SandboxCommandRequest { command };
        let mut resp = self
            .http
            .post(self.url(&format!("/runner/sandboxes/{sandbox_id}/cmd")))
            .bearer_auth(&self.internal_secret)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(EngineError::RunnerUnreachable(format!("status {}", resp.status())));
        }

        let mut decoder = SseDecoder::new();
        loop {
            let chunk = match resp.chunk().await.map_err(Self::unreachable)? {
                Some(c) => c,
                None => break,
            };
            let text = String::from_utf8_lossy(&chunk);
            for (kind, data) in decoder.push(&text) {
                let event: Event = serde_json::from_str(&data)
                    .map_err(|e| EngineError::BridgeProtocolError(format!("{kind}: {e}")))?;
                let terminal = event.is_terminal();
                if sink.send(event).await.is_err() {
                    return Ok(());
                }
                if terminal {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RunnerBackend for RemoteRunnerBackend {
    async fn create_sandbox(
        &self,
        session_id: &SessionId,
        _agent_name: &AgentName,
        agent_dir: PathBuf,
        config: serde_json::Value,
        _seed_from: Option<PathBuf>,
        _hook: &dyn EvictionHook,
    ) -> Result<CreatedSandbox, EngineError> {
        let body = CreateSandboxRequest { session_id: session_id.clone(), agent_dir: agent_dir.display().to_string(), config };
        let resp = self
            .http
            .post(self.url("/runner/sandboxes"))
            .bearer_auth(&self.internal_secret)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(EngineError::RunnerUnreachable(format!("status {}", resp.status())));
        }
        let parsed: CreateSandboxResponse = resp.json().await.map_err(Self::unreachable)?;
        Ok(CreatedSandbox { sandbox_id: parsed.sandbox_id, workspace_dir: PathBuf::from(parsed.workspace_dir) })
    }

    async fn destroy_sandbox(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        let resp = self
            .http
            .delete(self.url(&format!("/runner/sandboxes/{sandbox_id}")))
            .bearer_auth(&self.internal_secret)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(EngineError::RunnerUnreachable(format!("status {}", resp.status())));
        }
        Ok(())
    }

    async fn query_streaming(
        &self,
        sandbox_id: &SandboxId,
        prompt: String,
        session_resume_id: Option<String>,
        options: serde_json::Value,
        sink: mpsc::Sender<Event>,
    ) -> Result<(), EngineError> {
        self.send_command(sandbox_id, Command::Query { prompt, session_resume_id, options }, sink).await
    }

    async fn exec(&self, sandbox_id: &SandboxId, command: String, timeout_ms: u64) -> Result<Event, EngineError> {
        let (tx, mut rx) = mpsc::channel(8);
        self.send_command(sandbox_id, Command::Exec { command, timeout_ms }, tx).await?;
        rx.recv().await.ok_or_else(|| EngineError::BridgeProtocolError("runner closed the stream with no result".into()))
    }

    async fn interrupt(&self, sandbox_id: &SandboxId) -> Result<(), EngineError> {
        let resp = self
            .http
            .post(self.url(&format!("/runner/sandboxes/{sandbox_id}/interrupt")))
            .bearer_auth(&self.internal_secret)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(EngineError::RunnerUnreachable(format!("status {}", resp.status())));
        }
        Ok(())
    }

    async fn is_alive(&self, sandbox_id: &SandboxId) -> bool {
        let Ok(resp) = self
            .http
            .get(self.url(&format!("/runner/sandboxes/{sandbox_id}")))
            .bearer_auth(&self.internal_secret)
            .send()
            .await
        else {
            return false;
        };
        if !resp.status().is_success() {
            return false;
        }
        resp.json::<GetSandboxResponse>().await.map(|r| r.alive).unwrap_or(false)
    }

    async fn persist_state(&self, sandbox_id: &SandboxId, session_id: &SessionId, agent_name: &AgentName) -> Result<(), EngineError> {
        let body = PersistSandboxRequest { session_id: session_id.clone(), agent_name: agent_name.to_string() };
        let resp = self
            .http
            .post(self.url(&format!("/runner/sandboxes/{sandbox_id}/persist")))
            .bearer_auth(&self.internal_secret)
            .json(&body)
            .send()
            .await
            .map_err(Self::unreachable)?;
        if !resp.status().is_success() {
            return Err(EngineError::RunnerUnreachable(format!("status {}", resp.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "remote_backend_tests.rs"]
mod tests;
