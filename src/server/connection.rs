// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! RESP framing over a split TCP stream.
//!
//! The read half accumulates bytes into a buffer the incremental parser
//! consumes frame by frame, so a pipelined burst decodes without extra
//! socket reads. The write half runs in its own task fed by an unbounded
//! frame channel: command replies and pubsub pushes enter the same queue,
//! which is what keeps per-connection reply order equal to request order.

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
};
use tracing::debug;

use crate::resp::{self, Frame, ProtocolError};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Peer closed mid-frame.
    #[error("connection reset by peer")]
    Reset,
}

pub struct FrameReader {
    stream: OwnedReadHalf,
    buf: BytesMut,
}

impl FrameReader {
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Next request frame; `None` on clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        loop {
            if let Some((frame, consumed)) = resp::parse(&self.buf)? {
                self.buf.advance(consumed);
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buf).await? {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(ConnectionError::Reset)
                };
            }
        }
    }
}

pub struct FrameWriter {
    stream: BufWriter<OwnedWriteHalf>,
    scratch: BytesMut,
}

impl FrameWriter {
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self {
            stream: BufWriter::new(stream),
            scratch: BytesMut::with_capacity(4 * 1024),
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.scratch.clear();
        resp::encode(frame, &mut self.scratch);
        self.stream.write_all(&self.scratch).await
    }

    /// Drains the outgoing frame queue until every sender is gone, flushing
    /// at queue boundaries so pipelined replies coalesce into one write.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Frame>) {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = self.write_frame(&frame).await {
                debug!("write failed: {e}");
                return;
            }
            if rx.is_empty()
                && let Err(e) = self.stream.flush().await
            {
                debug!("flush failed: {e}");
                return;
            }
        }
        let _ = self.stream.flush().await;
        let _ = self.stream.get_mut().shutdown().await;
    }
}
