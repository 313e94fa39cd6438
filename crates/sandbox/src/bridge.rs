// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`BridgeClient`]: speaks the newline-delimited JSON protocol to a single
//! launched sandbox. A background task bridges the sandbox's raw byte
//! stream into the orchestrator's typed events and falls back to a terminal
//! event on disconnect; an explicit single-slot in-flight guard makes
//! `query`/`exec` serialize while `interrupt` and `shutdown` can still cut
//! the line.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use orc_wire::{Command, Event};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

use crate::error::SandboxError;
use crate::launcher::{LaunchedSandbox, SandboxProcess};

pub struct BridgeClient {
    stdin: Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>>,
    in_flight: Arc<AtomicBool>,
    notify: Arc<Notify>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    process: Box<dyn SandboxProcess>,
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient").finish_non_exhaustive()
    }
}

impl BridgeClient {
    /// Perform the handshake (wait for `ready` within `handshake_timeout`),
    /// then spawn the background task that forwards every subsequent event
    /// onto `event_tx`.
    pub async fn attach(
        sandbox: LaunchedSandbox,
        event_tx: mpsc::Sender<Event>,
        handshake_timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let mut reader = BufReader::new(sandbox.stdout);

        let first_line = tokio::time::timeout(handshake_timeout, orc_wire::read_line(&mut reader))
            .await
            .map_err(|_| SandboxError::BridgeHandshakeTimeout(handshake_timeout))?
            .map_err(|e| SandboxError::BridgeProtocolError(e.to_string()))?
            .ok_or_else(|| SandboxError::BridgeProtocolError("stream closed before ready".into()))?;

        let event: Event = serde_json::from_str(&first_line)
            .map_err(|e| SandboxError::BridgeProtocolError(format!("malformed handshake: {e}")))?;
        if !matches!(event, Event::Ready {}) {
            return Err(SandboxError::BridgeProtocolError(format!(
                "expected ready event, got {event:?}"
            )));
        }

        let in_flight = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(read_loop(reader, event_tx, in_flight.clone(), notify.clone(), shutdown_rx));

        Ok(Self {
            stdin: Arc::new(Mutex::new(sandbox.stdin)),
            in_flight,
            notify,
            shutdown_tx: Some(shutdown_tx),
            process: sandbox.process,
        })
    }

    /// Run one turn. Waits for any prior `query`/`resume`/`exec` to reach a
    /// terminal event before writing.
    pub async fn query(
        &self,
        prompt: String,
        session_resume_id: Option<String>,
        options: serde_json::Value,
    ) -> Result<(), SandboxError> {
        self.begin_call().await;
        self.write_command(&Command::Query { prompt, session_resume_id, options }).await
    }

    /// Attach to a prior SDK session id without prompting.
    pub async fn resume(&self, session_resume_id: String) -> Result<(), SandboxError> {
        self.begin_call().await;
        self.write_command(&Command::Resume { session_resume_id }).await
    }

    /// Run a shell command, independent of `query`'s in-flight slot rules.
    pub async fn exec(&self, command: String, timeout_ms: u64) -> Result<(), SandboxError> {
        self.begin_call().await;
        self.write_command(&Command::Exec { command, timeout_ms }).await
    }

    /// Cancel the in-flight call. Out-of-band: does not wait for the slot.
    pub async fn interrupt(&self) -> Result<(), SandboxError> {
        self.write_command(&Command::Interrupt {}).await
    }

    /// Graceful stop: sends `shutdown`, then kills the underlying process if
    /// it hasn't exited within `grace`.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<(), SandboxError> {
        let _ = self.write_command(&Command::Shutdown {}).await;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.process.kill(grace).await
    }

    async fn begin_call(&self) {
        loop {
            let notified = self.notify.notified();
            if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
            {
                return;
            }
            notified.await;
        }
    }

    async fn write_command(&self, cmd: &Command) -> Result<(), SandboxError> {
        let json = serde_json::to_string(cmd)
            .map_err(|e| SandboxError::BridgeProtocolError(e.to_string()))?;
        let mut stdin = self.stdin.lock().await;
        orc_wire::write_line(&mut *stdin, &json)
            .await
            .map_err(|e| SandboxError::BridgeProtocolError(e.to_string()))
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: BufReader<R>,
    event_tx: mpsc::Sender<Event>,
    in_flight: Arc<AtomicBool>,
    notify: Arc<Notify>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            line = orc_wire::read_line(&mut reader) => {
                let (event, stream_ended) = match line {
                    Ok(Some(text)) => match serde_json::from_str::<Event>(&text) {
                        Ok(event) => (event, false),
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed bridge event line");
                            (Event::Error { error: format!("malformed event: {e}") }, true)
                        }
                    },
                    Ok(None) => {
                        tracing::info!("bridge stream closed");
                        (Event::Error { error: "bridge disconnected".into() }, true)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "bridge read error");
                        (Event::Error { error: format!("bridge read error: {e}") }, true)
                    }
                };

                let terminal = event.is_terminal();
                let _ = event_tx.send(event).await;

                if terminal {
                    in_flight.store(false, Ordering::Release);
                    notify.notify_waiters();
                }
                if stream_ended {
                    break;
                }
            }
            _ = &mut shutdown_rx => {
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
