// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peripheral row types that are CRUD-only — not part of the core's atomic
//! query contract, but needed for the runnable HTTP surface and persisted
//! Message/SessionEvent entities.

use orc_core::SessionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventRow {
    pub session_id: SessionId,
    pub seq: i64,
    pub role: String,
    pub payload: serde_json::Value,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    Claimed,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub payload: serde_json::Value,
    pub status: QueueItemStatus,
    pub created_at_ms: u64,
}
