// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orc-wire: the bridge's line-framed JSON command/event types and the
//! internal HTTP DTOs shared between the coordinator and runners.

pub mod bridge;
pub mod framing;
pub mod internal;
pub mod sse;

pub use bridge::{Command, Event};
pub use framing::{read_line, write_line, FramingError, MAX_LINE_BYTES};
pub use sse::{encode_frame, SseDecoder};
