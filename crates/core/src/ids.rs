// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Locally generated identifiers for the core entities.
//!
//! `AgentName` is deliberately not one of these: it is a human-chosen,
//! tenant-unique folder name read off disk, not something this process
//! mints.

use crate::define_id;

define_id! {
    /// Identifies a tenant (multi-tenant isolation boundary for agents/sessions).
    pub struct TenantId("tenant_");
}

define_id! {
    /// Identifies a conversation. Stable for the lifetime of the conversation;
    /// the session row is never deleted, only transitioned to `ended`.
    pub struct SessionId("sess_");
}

define_id! {
    /// Identifies a live or dormant execution context hosting at most one
    /// session at a time.
    pub struct SandboxId("sbox_");
}

define_id! {
    /// Identifies a node hosting sandboxes.
    pub struct RunnerId("runr_");
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
