// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use async_trait::async_trait;
use orc_core::SandboxId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct NoopProcess;

#[async_trait]
impl SandboxProcess for NoopProcess {
    async fn kill(&mut self, _grace: Duration) -> Result<(), SandboxError> {
        Ok(())
    }
}

fn launched(stdin: tokio::io::DuplexStream, stdout: tokio::io::DuplexStream) -> LaunchedSandbox {
    LaunchedSandbox {
        sandbox_id: SandboxId::new(),
        workspace_dir: std::path::PathBuf::from("/tmp"),
        stdin: Box::new(stdin),
        stdout: Box::new(stdout),
        process: Box::new(NoopProcess),
    }
}

#[tokio::test]
async fn attach_fails_on_handshake_timeout_when_nothing_is_sent() {
    let (_daemon_stdin, sandbox_stdin) = tokio::io::duplex(1024);
    let (_daemon_stdout, sandbox_stdout) = tokio::io::duplex(1024);
    let sandbox = launched(sandbox_stdin, sandbox_stdout);
    let (tx, _rx) = mpsc::channel(8);

    let err = BridgeClient::attach(sandbox, tx, Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, SandboxError::BridgeHandshakeTimeout(_)));
}

#[tokio::test]
async fn attach_succeeds_after_a_ready_event_and_forwards_later_events() {
    let (mut daemon_stdin, sandbox_stdin) = tokio::io::duplex(4096);
    let (mut daemon_stdout, sandbox_stdout) = tokio::io::duplex(4096);
    let sandbox = launched(sandbox_stdin, sandbox_stdout);
    let (tx, mut rx) = mpsc::channel(8);

    daemon_stdout.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");

    let client = BridgeClient::attach(sandbox, tx, Duration::from_secs(1)).await.expect("attach");

    client.query("hi".into(), None, serde_json::json!({})).await.expect("query");
    let mut line = vec![0u8; 64];
    let n = daemon_stdin.read(&mut line).await.expect("read query");
    let sent = String::from_utf8_lossy(&line[..n]);
    assert!(sent.contains("\"cmd\":\"query\""));

    daemon_stdout
        .write_all(b"{\"event\":\"done\"}\n")
        .await
        .expect("write done");
    let event = rx.recv().await.expect("event");
    assert_eq!(event, Event::Done { session_id: None });
}

#[tokio::test]
async fn second_query_waits_for_the_first_terminal_event() {
    let (mut daemon_stdin, sandbox_stdin) = tokio::io::duplex(4096);
    let (mut daemon_stdout, sandbox_stdout) = tokio::io::duplex(4096);
    let sandbox = launched(sandbox_stdin, sandbox_stdout);
    let (tx, _rx) = mpsc::channel(8);

    daemon_stdout.write_all(b"{\"event\":\"ready\"}\n").await.expect("write ready");
    let client =
        std::sync::Arc::new(BridgeClient::attach(sandbox, tx, Duration::from_secs(1)).await.expect("attach"));

    client.query("first".into(), None, serde_json::json!({})).await.expect("first query");
    let mut buf = vec![0u8; 128];
    daemon_stdin.read(&mut buf).await.expect("drain first query");

    let client2 = client.clone();
    let second = tokio::spawn(async move {
        client2.query("second".into(), None, serde_json::json!({})).await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!second.is_finished());

    daemon_stdout.write_all(b"{\"event\":\"done\"}\n").await.expect("write done");
    second.await.expect("join").expect("second query");
}
