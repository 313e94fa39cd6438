// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demultiplexes Docker's attach stream frame format. When a container is
//! started without a TTY, stdout/stderr share one connection: each frame is
//! an 8-byte header (`[stream_type, 0, 0, 0, size_be_u32_high_byte_first...]`)
//! followed by that many payload bytes. Stdin has no framing at all — bytes
//! written to the attach socket go straight to the container's stdin.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

enum State {
    ReadingHeader { have: [u8; 8], filled: usize },
    ReadingPayload { remaining: usize },
}

/// Wraps a raw reader (the Docker attach socket's read half) and yields only
/// the payload bytes of stdout/stderr frames, stripping the 8-byte headers.
pub struct DemuxReader<R> {
    inner: R,
    state: State,
    pending: VecDeque<u8>,
}

impl<R: AsyncRead + Unpin> DemuxReader<R> {
    pub fn new(inner: R, leftover: Vec<u8>) -> Self {
        Self {
            inner,
            state: State::ReadingHeader { have: [0u8; 8], filled: 0 },
            pending: VecDeque::from(leftover),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DemuxReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.pending.is_empty() {
                match &mut this.state {
                    State::ReadingPayload { remaining } if *remaining > 0 => {
                        let n = (*remaining).min(out.remaining()).min(this.pending.len());
                        for _ in 0..n {
                            // Safe to unwrap: n bounded by pending.len() above.
                            out.put_slice(&[this.pending.pop_front().unwrap()]);
                        }
                        *remaining -= n;
                        if n > 0 {
                            if *remaining == 0 {
                                this.state = State::ReadingHeader { have: [0u8; 8], filled: 0 };
                            }
                            return Poll::Ready(Ok(()));
                        }
                    }
                    State::ReadingHeader { have, filled } => {
                        while *filled < 8 {
                            match this.pending.pop_front() {
                                Some(b) => {
                                    have[*filled] = b;
                                    *filled += 1;
                                }
                                None => break,
                            }
                        }
                        if *filled == 8 {
                            let size = u32::from_be_bytes([have[4], have[5], have[6], have[7]]) as usize;
                            this.state = State::ReadingPayload { remaining: size };
                            continue;
                        }
                        break;
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        let mut scratch = [0u8; 4096];
        let mut buf = ReadBuf::new(&mut scratch);
        match ready!(Pin::new(&mut this.inner).poll_read(cx, &mut buf)) {
            Ok(()) => {
                this.pending.extend(buf.filled().iter().copied());
                if buf.filled().is_empty() {
                    return Poll::Ready(Ok(()));
                }
                // Re-drive the state machine now that more bytes are queued.
                Pin::new(this).poll_read(cx, out)
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

#[cfg(test)]
#[path = "demux_tests.rs"]
mod tests;
