// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Internal HTTP DTOs shared by the coordinator and runner sides of the
//! control plane. These cross a process boundary over plain JSON bodies,
//! never the bridge's line-framed protocol.

use orc_core::{RunnerId, SandboxId, SessionId};
use serde::{Deserialize, Serialize};

/// `POST /api/internal/runners/register` — runner → coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub runner_id: RunnerId,
    pub host: String,
    pub port: u16,
    pub max_sandboxes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub runner_id: RunnerId,
}

/// `POST /api/internal/runners/heartbeat` — runner → coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub runner_id: RunnerId,
    pub active_count: u32,
    pub warming_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
}

/// `POST /api/internal/runners/deregister` — graceful runner shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterRequest {
    pub runner_id: RunnerId,
}

/// `POST /runner/sandboxes` — coordinator → runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSandboxRequest {
    pub session_id: SessionId,
    pub agent_dir: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSandboxResponse {
    pub sandbox_id: SandboxId,
    pub workspace_dir: String,
}

/// `POST /runner/sandboxes/:id/cmd` — coordinator → runner, forwarded to the
/// sandbox's bridge. The response stream is SSE, not a single JSON body; see
/// [`crate::bridge::Event`] for the frame payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxCommandRequest {
    #[serde(flatten)]
    pub command: crate::bridge::Command,
}

/// `POST /runner/sandboxes/:id/persist` — coordinator → runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistSandboxRequest {
    pub session_id: SessionId,
    pub agent_name: String,
}

/// `GET /runner/sandboxes/:id` — coordinator → runner, warm-resume liveness
/// check. Not a hot-path endpoint; thin CRUD-style glue like the rest of the
/// internal surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GetSandboxResponse {
    pub alive: bool,
}

#[cfg(test)]
#[path = "internal_tests.rs"]
mod tests;
