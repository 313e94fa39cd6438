// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Error taxonomy for sandbox launch and bridge communication.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("agent directory missing: {0}")]
    AgentDirectoryMissing(String),
    #[error("bridge did not send ready within {0:?}")]
    BridgeHandshakeTimeout(std::time::Duration),
    #[error("bridge protocol error: {0}")]
    BridgeProtocolError(String),
    #[error("sandbox launch failed: {0}")]
    LaunchFailed(String),
    #[error("sandbox not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
