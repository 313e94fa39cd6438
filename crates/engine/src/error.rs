// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error taxonomy. Kinds, not wrapper noise: each variant
//! names the trigger directly so `orc-daemon`'s HTTP layer can map it to a
//! status code without inspecting strings.

use orc_sandbox::SandboxError;
use orc_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("agent directory missing: {0}")]
    AgentDirectoryMissing(String),

    #[error("capacity exhausted")]
    CapacityExhausted,

    #[error("bridge handshake timed out after {0:?}")]
    BridgeHandshakeTimeout(std::time::Duration),

    #[error("bridge protocol error: {0}")]
    BridgeProtocolError(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("session {0} is not active")]
    SessionNotActive(orc_core::SessionId),

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no healthy runners and no local backend configured")]
    NoCapacity,

    #[error("runner unreachable: {0}")]
    RunnerUnreachable(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<SandboxError> for EngineError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::AgentDirectoryMissing(dir) => EngineError::AgentDirectoryMissing(dir),
            SandboxError::BridgeHandshakeTimeout(d) => EngineError::BridgeHandshakeTimeout(d),
            SandboxError::BridgeProtocolError(msg) => EngineError::BridgeProtocolError(msg),
            SandboxError::NotFound(what) => EngineError::NotFound(what),
            SandboxError::LaunchFailed(msg) => EngineError::BridgeProtocolError(msg),
            SandboxError::Io(e) => EngineError::BridgeProtocolError(e.to_string()),
        }
    }
}
