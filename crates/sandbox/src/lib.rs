// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-sandbox: launches and speaks the bridge protocol to per-session
//! sandboxes. A [`SandboxLauncher`] starts a sandbox and hands back a raw
//! duplex byte stream; [`bridge::BridgeClient`] wraps that stream with the
//! line-framed command/event protocol from `orc-wire`.

pub mod bridge;
pub mod docker;
pub mod error;
#[cfg(feature = "test-support")]
pub mod fake;
pub mod launcher;
pub mod process;

pub use bridge::BridgeClient;
#[cfg(feature = "test-support")]
pub use fake::{FakeLauncher, FakeProcess};
pub use docker::DockerLauncher;
pub use error::SandboxError;
pub use launcher::{LaunchedSandbox, SandboxLauncher, SandboxSpec};
pub use process::ProcessLauncher;
