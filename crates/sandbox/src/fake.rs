// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test-only launcher: wires a [`SandboxLauncher`] to an in-memory duplex
//! instead of a real process, so callers can drive the bridge protocol by
//! hand. Exposed behind the `test-support` feature so fakes for this
//! crate's own traits live next to the traits they implement.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use orc_core::SandboxId;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::Notify;

use crate::error::SandboxError;
use crate::launcher::{LaunchedSandbox, SandboxLauncher, SandboxProcess, SandboxSpec};

pub struct FakeProcess;

#[async_trait]
impl SandboxProcess for FakeProcess {
    async fn kill(&mut self, _grace: Duration) -> Result<(), SandboxError> {
        Ok(())
    }
}

/// Hands back the daemon-side duplex half for every sandbox it launches, so
/// a test can write `ready`/events and read commands off it directly.
#[derive(Default)]
pub struct FakeLauncher {
    daemon_sides: Mutex<HashMap<SandboxId, DuplexStream>>,
    fail_next: Mutex<bool>,
    launched: Notify,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `launch()` call fails with `LaunchFailed` instead of
    /// succeeding.
    pub fn fail_next_launch(&self) {
        *self.fail_next.lock() = true;
    }

    /// Takes ownership of the daemon-side duplex for a previously launched
    /// sandbox, waiting for `launch()` to have run if it hasn't yet. Test-only.
    pub async fn take_daemon_side(&self, sandbox_id: &SandboxId) -> DuplexStream {
        loop {
            let notified = self.launched.notified();
            if let Some(side) = self.daemon_sides.lock().remove(sandbox_id) {
                return side;
            }
            notified.await;
        }
    }

    /// Like [`Self::take_daemon_side`] but for callers that don't know the
    /// sandbox id ahead of time (it's generated inside the code under test).
    /// Takes whichever one shows up first.
    pub async fn take_any_daemon_side(&self) -> (SandboxId, DuplexStream) {
        loop {
            let notified = self.launched.notified();
            {
                let mut sides = self.daemon_sides.lock();
                if let Some(id) = sides.keys().next().cloned() {
                    let side = sides.remove(&id).expect("id just observed present");
                    return (id, side);
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl SandboxLauncher for FakeLauncher {
    async fn launch(&self, spec: SandboxSpec) -> Result<LaunchedSandbox, SandboxError> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(SandboxError::LaunchFailed("fake launch failure".into()));
        }

        let (daemon_side, sandbox_side) = tokio::io::duplex(64 * 1024);
        self.daemon_sides.lock().insert(spec.sandbox_id.clone(), daemon_side);
        self.launched.notify_waiters();

        let (read_half, write_half) = tokio::io::split(sandbox_side);
        Ok(LaunchedSandbox {
            sandbox_id: spec.sandbox_id,
            workspace_dir: spec.workspace_dir,
            stdin: Box::new(write_half),
            stdout: Box::new(read_half),
            process: Box::new(FakeProcess),
        })
    }
}
