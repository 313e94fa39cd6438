// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-rolled HTTP/1.1 client for the Docker Engine API over its Unix
//! socket, in the same style as the bridge's own Unix-socket HTTP client:
//! no framework, `Content-Length` framing, a short overall timeout.

use crate::error::SandboxError;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// A plain request/response call against the Docker socket (create, start,
/// stop, remove, inspect). Not used for `attach`, which hijacks the
/// connection after the response headers.
pub async fn call(
    socket_path: &Path,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<(u16, String), SandboxError> {
    tokio::time::timeout(Duration::from_secs(10), call_inner(socket_path, method, path, body))
        .await
        .map_err(|_| SandboxError::LaunchFailed("docker API call timed out".into()))?
}

async fn call_inner(
    socket_path: &Path,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<(u16, String), SandboxError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| SandboxError::LaunchFailed(format!("docker socket connect failed: {e}")))?;

    let request = match body {
        Some(b) => format!(
            "{method} {path} HTTP/1.1\r\nHost: docker\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{b}",
            b.len()
        ),
        None => format!("{method} {path} HTTP/1.1\r\nHost: docker\r\nConnection: close\r\n\r\n"),
    };

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SandboxError::LaunchFailed(format!("docker socket write failed: {e}")))?;

    let mut reader = BufReader::new(stream);
    read_response(&mut reader).await
}

async fn read_response<R: tokio::io::AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> Result<(u16, String), SandboxError> {
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| SandboxError::LaunchFailed(format!("read status failed: {e}")))?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| SandboxError::LaunchFailed(format!("read header failed: {e}")))?;
        if line == "\r\n" || line.is_empty() {
            break;
        }
        if let Some(val) = line.to_ascii_lowercase().strip_prefix("content-length:") {
            content_length = val.trim().parse().unwrap_or(0);
        }
    }

    let body = if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| SandboxError::LaunchFailed(format!("read body failed: {e}")))?;
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        String::new()
    };

    Ok((status, body))
}

/// Open the container's attach stream and hijack the connection. Returns the
/// raw socket plus any frame bytes the server had already written after the
/// upgrade response before we finished reading headers.
pub async fn attach(
    socket_path: &Path,
    container_id: &str,
) -> Result<(UnixStream, Vec<u8>), SandboxError> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| SandboxError::LaunchFailed(format!("docker socket connect failed: {e}")))?;

    let path = format!(
        "/containers/{container_id}/attach?stream=1&stdin=1&stdout=1&stderr=1"
    );
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: docker\r\nUpgrade: tcp\r\nConnection: Upgrade\r\n\r\n"
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| SandboxError::LaunchFailed(format!("docker attach write failed: {e}")))?;

    // Read byte-by-byte up to the blank line terminating the headers so we
    // never buffer past into the hijacked stream's first payload bytes.
    let mut header_buf = Vec::new();
    let mut one = [0u8; 1];
    loop {
        let n = stream
            .read(&mut one)
            .await
            .map_err(|e| SandboxError::LaunchFailed(format!("docker attach read failed: {e}")))?;
        if n == 0 {
            return Err(SandboxError::LaunchFailed("docker attach closed before headers".into()));
        }
        header_buf.push(one[0]);
        if header_buf.ends_with(b"\r\n\r\n") {
            break;
        }
    }

    let status_line = header_buf
        .split(|&b| b == b'\n')
        .next()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .unwrap_or_default();
    if !status_line.contains("101") && !status_line.contains("200") {
        return Err(SandboxError::LaunchFailed(format!(
            "docker attach refused: {}",
            status_line.trim()
        )));
    }

    Ok((stream, Vec::new()))
}
