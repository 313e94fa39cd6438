// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line framing for the bridge protocol: UTF-8, newline-delimited JSON, one
//! object per line, no length prefix. Oversized lines are fatal
//! — the caller should treat that the same as a malformed line.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum single-line size before a read is rejected as malformed.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("line exceeded {0} bytes")]
    LineTooLong(usize),
    #[error("line was not valid UTF-8")]
    InvalidUtf8,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one line (without its trailing `\n`) from a buffered reader,
/// enforcing [`MAX_LINE_BYTES`]. Returns `Ok(None)` on clean EOF with no
/// partial data (the normal "bridge closed" case).
pub async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, FramingError> {
    let mut buf = Vec::new();
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if total == 0 {
                return Ok(None);
            }
            return Err(FramingError::ConnectionClosed);
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            buf.extend_from_slice(&available[..pos]);
            reader.consume(pos + 1);
            break;
        }
        total += available.len();
        if total > MAX_LINE_BYTES {
            // Drain what's buffered so the connection can still be closed
            // cleanly by the caller; the line itself is unrecoverable.
            let len = available.len();
            reader.consume(len);
            return Err(FramingError::LineTooLong(MAX_LINE_BYTES));
        }
        buf.extend_from_slice(available);
        let len = available.len();
        reader.consume(len);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Err(FramingError::LineTooLong(MAX_LINE_BYTES));
    }
    // Bridge lines may be `\r\n`-terminated depending on the child's stdio
    // mode; trim a trailing CR defensively.
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map(Some).map_err(|_| FramingError::InvalidUtf8)
}

/// Write one JSON-encoded line, terminated by `\n`, flushing immediately so
/// the write is visible to the child's stdin reader.
pub async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    json: &str,
) -> Result<(), FramingError> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
