// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default single-node [`SandboxLauncher`]: spawns the bridge as a child
//! process with piped stdio, a scrubbed environment, and `ulimit`-enforced
//! resource ceilings.
//!
//! `setrlimit` in the child would normally go through
//! `CommandExt::pre_exec`, but that requires an `unsafe` closure and this
//! workspace forbids `unsafe_code`. Ceilings are applied instead by wrapping
//! the bridge invocation in a `sh -c 'ulimit ...; exec "$0" "$@"'` shell,
//! which gets the same effect through the shell's builtin.

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use tokio::process::{Child, Command};

use crate::error::SandboxError;
use crate::launcher::{LaunchedSandbox, SandboxLauncher, SandboxProcess, SandboxSpec};

/// Resource ceilings applied to every spawned bridge process via `ulimit`.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Virtual memory ceiling, in KB (`ulimit -v`).
    pub max_memory_kb: u64,
    /// Max file size, in 512-byte blocks (`ulimit -f`).
    pub max_file_size_blocks: u64,
    /// Max number of processes/threads owned by the user (`ulimit -u`).
    pub max_processes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { max_memory_kb: 2 * 1024 * 1024, max_file_size_blocks: 2 * 1024 * 1024, max_processes: 256 }
    }
}

/// Environment variables passed through from the launcher's own process,
/// merged with a fixed allowlist the bridge always needs.
const FIXED_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "LANG"];

pub struct ProcessLauncher {
    bridge_bin: std::path::PathBuf,
    limits: ResourceLimits,
    env_allowlist: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(bridge_bin: std::path::PathBuf) -> Self {
        Self { bridge_bin, limits: ResourceLimits::default(), env_allowlist: Vec::new() }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_env_allowlist(mut self, vars: Vec<String>) -> Self {
        self.env_allowlist = vars;
        self
    }

    fn scrubbed_env(&self) -> Vec<(String, String)> {
        FIXED_ENV_ALLOWLIST
            .iter()
            .map(|s| s.to_string())
            .chain(self.env_allowlist.iter().cloned())
            .filter_map(|key| std::env::var(&key).ok().map(|val| (key, val)))
            .collect()
    }

    fn ulimit_prefix(&self) -> String {
        format!(
            "ulimit -v {} -f {} -u {};",
            self.limits.max_memory_kb, self.limits.max_file_size_blocks, self.limits.max_processes
        )
    }
}

#[async_trait]
impl SandboxLauncher for ProcessLauncher {
    async fn launch(&self, spec: SandboxSpec) -> Result<LaunchedSandbox, SandboxError> {
        tokio::fs::create_dir_all(&spec.workspace_dir).await?;

        let shell_cmd = format!("{} exec \"$0\" \"$@\"", self.ulimit_prefix());
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&shell_cmd)
            .arg(&self.bridge_bin)
            .current_dir(&spec.workspace_dir)
            .env_clear()
            .envs(self.scrubbed_env())
            .env("ORC_AGENT_DIR", &spec.agent_dir)
            .env("ORC_SANDBOX_CONFIG", spec.config.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::LaunchFailed(format!("spawn failed: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::LaunchFailed("child has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::LaunchFailed("child has no stdout".into()))?;

        tracing::info!(sandbox_id = %spec.sandbox_id, pid = ?child.id(), "spawned process sandbox");

        Ok(LaunchedSandbox {
            sandbox_id: spec.sandbox_id,
            workspace_dir: spec.workspace_dir,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            process: Box::new(ChildProcess { child }),
        })
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl SandboxProcess for ChildProcess {
    async fn kill(&mut self, grace: std::time::Duration) -> Result<(), SandboxError> {
        if let Some(raw_pid) = self.child.id() {
            let pid = Pid::from_raw(raw_pid as i32);
            // Best-effort: the process may have already exited.
            let _ = signal::kill(pid, Signal::SIGTERM);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                tracing::warn!(pid = ?self.child.id(), "sandbox did not exit within grace period, sending SIGKILL");
                self.child.start_kill().map_err(SandboxError::Io)?;
                self.child.wait().await.map_err(SandboxError::Io)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
