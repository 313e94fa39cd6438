// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn register_request_round_trips() {
    let req = RegisterRequest {
        runner_id: RunnerId::new(),
        host: "10.0.0.4".into(),
        port: 7700,
        max_sandboxes: 16,
    };
    let json = serde_json::to_string(&req).expect("serialize");
    let back: RegisterRequest = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.runner_id, req.runner_id);
    assert_eq!(back.port, 7700);
}

#[test]
fn sandbox_command_request_flattens_the_tagged_command() {
    let req = SandboxCommandRequest {
        command: crate::bridge::Command::Interrupt {},
    };
    let json = serde_json::to_string(&req).expect("serialize");
    assert_eq!(json, r#"{"cmd":"interrupt"}"#);
}

#[test]
fn get_sandbox_response_round_trips() {
    let json = serde_json::to_string(&GetSandboxResponse { alive: true }).expect("serialize");
    let back: GetSandboxResponse = serde_json::from_str(&json).expect("deserialize");
    assert!(back.alive);
}
