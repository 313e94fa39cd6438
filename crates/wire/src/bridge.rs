// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge wire protocol: newline-delimited JSON, one object per line, no
//! length prefix. One `Command` may be in flight per sandbox at a time
//! except `Interrupt`/`Shutdown`, which are out-of-band.

use serde::{Deserialize, Serialize};

/// Outbound commands, daemon → bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Run one turn. At most one `Query`/`Exec` may be in flight per sandbox.
    Query {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_resume_id: Option<String>,
        #[serde(default)]
        options: serde_json::Value,
    },
    /// Attach to a prior SDK session id without prompting.
    Resume { session_resume_id: String },
    /// Cancel an in-flight `Query`. Out-of-band: may be sent at any time.
    Interrupt {},
    /// Run a shell command inside the sandbox, independent of `Query`.
    Exec { command: String, timeout_ms: u64 },
    /// Graceful stop. Out-of-band: may be sent at any time.
    Shutdown {},
}

/// Inbound events, bridge → daemon. One JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Handshake complete. Guaranteed to arrive before any other event.
    Ready {},
    /// Opaque SDK message, passed through verbatim to the client-facing SSE
    /// stream. The orchestrator never parses or translates `data`.
    Message { data: serde_json::Value },
    /// Terminal error for the current command.
    Error { error: String },
    /// Terminal success for the current command.
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Terminal result for an `Exec` command.
    ExecResult { exit_code: i32, stdout: String, stderr: String },
}

impl Event {
    /// Whether this event terminates the current command's event stream.
    /// Every drained stream ends with exactly one terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Error { .. } | Event::Done { .. } | Event::ExecResult { .. })
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
