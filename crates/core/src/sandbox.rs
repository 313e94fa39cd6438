// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox entity and state machine.
//!
//! A sandbox is a running (or dormant) child process pair — the launcher and
//! its bridge — hosting at most one session at a time. `running` sandboxes
//! are never evicted (invariant I3); everything else is fair game for
//! eviction or idle sweep, oldest `last_used_at` first.

use crate::{AgentName, SandboxId, SessionId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    /// Launcher spawned, bridge handshake not yet complete.
    Warming,
    /// Handshake complete, not yet bound to a session (transient).
    Warm,
    /// Bound to a session, no query in flight.
    Waiting,
    /// A query or exec command is in flight; protected from eviction.
    Running,
    /// Host process exited without a graceful shutdown.
    Cold,
}

impl SandboxState {
    /// `running` and `warming` sandboxes are never chosen for eviction or
    /// idle sweep (invariant I3).
    pub fn is_evictable(self) -> bool {
        matches!(self, SandboxState::Cold | SandboxState::Warm | SandboxState::Waiting)
    }

    /// Eviction priority: lower sorts first. `cold < warm < waiting`.
    pub fn eviction_rank(self) -> u8 {
        match self {
            SandboxState::Cold => 0,
            SandboxState::Warm => 1,
            SandboxState::Waiting => 2,
            SandboxState::Running | SandboxState::Warming => u8::MAX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: SandboxId,
    pub session_id: Option<SessionId>,
    pub agent_name: AgentName,
    pub workspace_dir: PathBuf,
    pub state: SandboxState,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
}

impl Sandbox {
    pub fn new(id: SandboxId, agent_name: AgentName, workspace_dir: PathBuf, now_ms: u64) -> Self {
        Self {
            id,
            session_id: None,
            agent_name,
            workspace_dir,
            state: SandboxState::Warming,
            created_at_ms: now_ms,
            last_used_at_ms: now_ms,
        }
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
