// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn running_and_warming_are_never_evictable() {
    assert!(!SandboxState::Running.is_evictable());
    assert!(!SandboxState::Warming.is_evictable());
}

#[test]
fn waiting_warm_and_cold_are_evictable() {
    assert!(SandboxState::Waiting.is_evictable());
    assert!(SandboxState::Warm.is_evictable());
    assert!(SandboxState::Cold.is_evictable());
}

#[test]
fn eviction_rank_orders_cold_before_warm_before_waiting() {
    assert!(SandboxState::Cold.eviction_rank() < SandboxState::Warm.eviction_rank());
    assert!(SandboxState::Warm.eviction_rank() < SandboxState::Waiting.eviction_rank());
}

#[test]
fn new_sandbox_starts_warming_and_unbound() {
    let sandbox = Sandbox::new(SandboxId::new(), AgentName::new("qa"), PathBuf::from("/ws"), 100);
    assert_eq!(sandbox.state, SandboxState::Warming);
    assert_eq!(sandbox.session_id, None);
    assert_eq!(sandbox.created_at_ms, 100);
}
