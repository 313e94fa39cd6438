// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Cursor;
use tokio::io::AsyncReadExt;

fn frame(stream_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![stream_type, 0, 0, 0];
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

#[tokio::test]
async fn strips_a_single_frame_header() {
    let data = frame(1, b"hello");
    let mut reader = DemuxReader::new(Cursor::new(data), Vec::new());
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.expect("read");
    assert_eq!(out, b"hello");
}

#[tokio::test]
async fn strips_headers_across_multiple_frames() {
    let mut data = frame(1, b"one");
    data.extend(frame(2, b"two"));
    let mut reader = DemuxReader::new(Cursor::new(data), Vec::new());
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.expect("read");
    assert_eq!(out, b"onetwo");
}

#[tokio::test]
async fn empty_input_yields_no_bytes() {
    let mut reader = DemuxReader::new(Cursor::new(Vec::new()), Vec::new());
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.expect("read");
    assert!(out.is_empty());
}

#[tokio::test]
async fn leftover_bytes_from_header_read_are_consumed_first() {
    let data = frame(1, b"rest");
    let mut reader = DemuxReader::new(Cursor::new(Vec::new()), data);
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.expect("read");
    assert_eq!(out, b"rest");
}
