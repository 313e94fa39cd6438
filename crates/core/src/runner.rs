// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner entity: a node hosting sandboxes, registered with the coordinator
//! and kept alive by periodic heartbeats.

use crate::RunnerId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    pub id: RunnerId,
    pub host: String,
    pub port: u16,
    pub max_sandboxes: u32,
    pub active_count: u32,
    pub warming_count: u32,
    pub registered_at_ms: u64,
    pub last_heartbeat_at_ms: u64,
}

impl Runner {
    pub fn new(id: RunnerId, host: String, port: u16, max_sandboxes: u32, now_ms: u64) -> Self {
        Self {
            id,
            host,
            port,
            max_sandboxes,
            active_count: 0,
            warming_count: 0,
            registered_at_ms: now_ms,
            last_heartbeat_at_ms: now_ms,
        }
    }

    /// Spare capacity used to rank runners during placement: the runner with
    /// the largest `(max - active)` wins, ties broken by most recent
    /// heartbeat (handled by the caller, which already orders by heartbeat).
    pub fn available_capacity(&self) -> i64 {
        self.max_sandboxes as i64 - self.active_count as i64
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
