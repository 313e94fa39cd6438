// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session entity: a conversation bound, at any point in time, to at most
//! one sandbox.

use crate::{AgentName, RunnerId, SandboxId, SessionId, TenantId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Active,
    Paused,
    Ended,
    Error,
    Stopped,
}

impl SessionStatus {
    /// Resume (warm or cold) is valid from `paused`, `error`, and `stopped`.
    pub fn resumable(self) -> bool {
        matches!(self, SessionStatus::Paused | SessionStatus::Error | SessionStatus::Stopped)
    }

    /// Only `active` sessions accept a new message (spec `SessionNotActive`).
    pub fn accepts_messages(self) -> bool {
        matches!(self, SessionStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended)
    }
}

/// Per-session SDK configuration: model, system-prompt override, tool
/// allow/deny lists, permission mode, MCP servers, budgets. Opaque to the
/// orchestrator beyond being forwarded to the bridge's `query` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub denied_tools: Vec<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub mcp_servers: serde_json::Value,
    #[serde(default)]
    pub max_turns: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub tenant_id: TenantId,
    pub agent_name: AgentName,
    pub sandbox_id: Option<SandboxId>,
    pub runner_id: Option<RunnerId>,
    pub status: SessionStatus,
    pub config: SessionConfig,
    /// Upstream LLM SDK's own session-resume token. Owned and interpreted
    /// only by the upstream side; this orchestrator just carries it forward
    /// through pause/resume/fork.
    pub sdk_session_resume_id: Option<String>,
    pub created_at_ms: u64,
    pub last_active_at_ms: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        tenant_id: TenantId,
        agent_name: AgentName,
        config: SessionConfig,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            tenant_id,
            agent_name,
            sandbox_id: None,
            runner_id: None,
            status: SessionStatus::Starting,
            config,
            sdk_session_resume_id: None,
            created_at_ms: now_ms,
            last_active_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
