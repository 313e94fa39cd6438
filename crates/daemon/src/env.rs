// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("could not resolve a state directory: set ORC_STATE_DIR or HOME")]
    NoStateDir,
    #[error("ORC_INTERNAL_SECRET must be set for the internal runner/coordinator surface")]
    MissingInternalSecret,
}

/// Resolve state directory: `ORC_STATE_DIR` > `XDG_STATE_HOME`/orc > `~/.local/state/orc`.
pub fn state_dir() -> Result<PathBuf, EnvError> {
    if let Ok(dir) = std::env::var("ORC_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("orc"));
    }
    let home = std::env::var("HOME").map_err(|_| EnvError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/orc"))
}

/// `ORC_DATABASE_URL` — when set, the daemon persists through `PgStore`;
/// otherwise it falls back to an in-process `MemStore` (single-node,
/// embedded deployments only, since it carries no cross-coordinator state).
pub fn database_url() -> Option<String> {
    std::env::var("ORC_DATABASE_URL").ok().filter(|s| !s.is_empty())
}

/// Shared secret for the internal runner/coordinator HTTP surface
/// ("internal endpoints authenticate via a shared bearer secret").
pub fn internal_secret() -> Result<String, EnvError> {
    std::env::var("ORC_INTERNAL_SECRET").ok().filter(|s| !s.is_empty()).ok_or(EnvError::MissingInternalSecret)
}

/// `host:port` the gateway's HTTP listener binds.
pub fn bind_addr() -> String {
    std::env::var("ORC_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

/// This node's externally reachable `host:port`, advertised to the
/// coordinator at registration time. Defaults to the bind address, which
/// only works when the coordinator and runner share a network namespace;
/// production multi-host deployments must set this explicitly.
pub fn advertise_host() -> String {
    std::env::var("ORC_ADVERTISE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub fn advertise_port() -> u16 {
    std::env::var("ORC_ADVERTISE_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8080)
}

/// Coordinator this node registers with, when running in runner mode.
/// Absent in embedded/coordinator-only deployments.
pub fn coordinator_url() -> Option<String> {
    std::env::var("ORC_COORDINATOR_URL").ok().filter(|s| !s.is_empty())
}

/// Max sandboxes this node's pool will host concurrently.
pub fn max_sandboxes() -> u32 {
    std::env::var("ORC_MAX_SANDBOXES").ok().and_then(|s| s.parse().ok()).unwrap_or(8)
}

/// Path to the bridge binary `ProcessLauncher` execs per sandbox. Defaults
/// to a sibling of the current executable, matching how the bridge ships
/// alongside the daemon in a release tarball.
pub fn bridge_bin() -> PathBuf {
    if let Ok(path) = std::env::var("ORC_BRIDGE_BIN") {
        return PathBuf::from(path);
    }
    std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("orc-bridge"))).unwrap_or_else(|| PathBuf::from("orc-bridge"))
}

/// How long `create` waits for a freshly launched sandbox's bridge
/// handshake before giving up (default 5s).
pub fn bridge_handshake_timeout() -> Duration {
    duration_ms_env("ORC_BRIDGE_HANDSHAKE_TIMEOUT_MS", 5_000)
}

/// How long a `waiting` sandbox with no bound session sits before the idle
/// sweep reclaims it (default 30 min).
pub fn idle_timeout() -> Duration {
    duration_ms_env("ORC_IDLE_TIMEOUT_MS", 30 * 60 * 1_000)
}

/// Grace period given to a sandbox to exit cleanly before the pool kills it
/// outright (default 5s).
pub fn shutdown_grace() -> Duration {
    duration_ms_env("ORC_SHUTDOWN_GRACE_MS", 5_000)
}

fn duration_ms_env(key: &str, default_ms: u64) -> Duration {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis).unwrap_or(Duration::from_millis(default_ms))
}
