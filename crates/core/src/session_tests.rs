// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_session_starts_in_starting_with_no_binding() {
    let session = Session::new(
        SessionId::new(),
        TenantId::new(),
        AgentName::new("qa"),
        SessionConfig::default(),
        10,
    );
    assert_eq!(session.status, SessionStatus::Starting);
    assert!(session.sandbox_id.is_none());
    assert!(session.runner_id.is_none());
}

#[test]
fn only_active_accepts_messages() {
    assert!(SessionStatus::Active.accepts_messages());
    for s in [SessionStatus::Starting, SessionStatus::Paused, SessionStatus::Ended, SessionStatus::Error, SessionStatus::Stopped] {
        assert!(!s.accepts_messages(), "{s:?} should not accept messages");
    }
}

#[test]
fn resume_allowed_from_paused_error_and_stopped_only() {
    assert!(SessionStatus::Paused.resumable());
    assert!(SessionStatus::Error.resumable());
    assert!(SessionStatus::Stopped.resumable());
    assert!(!SessionStatus::Active.resumable());
    assert!(!SessionStatus::Starting.resumable());
    assert!(!SessionStatus::Ended.resumable());
}

#[test]
fn ended_is_the_only_terminal_status() {
    assert!(SessionStatus::Ended.is_terminal());
    assert!(!SessionStatus::Stopped.is_terminal());
}
