// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared SSE frame format: `event: <kind>\ndata: <json>\n\n`.
//! Used both to emit the client-facing stream and to decode the runner ->
//! coordinator stream in `RemoteRunnerBackend` — one format, one parser,
//! for both directions.

/// Renders one frame. `data` is serialized compactly; frames never contain
/// embedded newlines since every event payload is one JSON value.
pub fn encode_frame(kind: &str, data: &serde_json::Value) -> String {
    format!("event: {kind}\ndata: {data}\n\n")
}

/// Incremental decoder for a byte/text stream of frames. Buffers partial
/// frames across chunk boundaries; `push` returns every complete frame
/// found in the buffer so far.
#[derive(Default)]
pub struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more raw text into the decoder, returning any frames
    /// (`kind`, `data`) completed by this push.
    pub fn push(&mut self, chunk: &str) -> Vec<(String, String)> {
        self.buf.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(end) = self.buf.find("\n\n") {
            let frame = self.buf[..end].to_string();
            self.buf.drain(..end + 2);

            let mut kind = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    kind = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.to_string());
                }
            }
            if let (Some(kind), Some(data)) = (kind, data) {
                frames.push((kind, data));
            }
        }

        frames
    }
}

#[cfg(test)]
#[path = "sse_tests.rs"]
mod tests;
