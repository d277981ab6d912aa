use std::{io, mem};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    error::{DecodeError, StreamError},
    frames::{Connection, DecoderConfig, Frame, FrameDecoder, FrameState},
    role::Role,
};

type Result<T> = std::result::Result<T, StreamError>;

const READ_CHUNK: usize = 32 * 1024;

// Collects what the decoder wants sent so it can be written after each step
#[derive(Debug, Default)]
struct Outbox {
    frames: Vec<Frame>,
    close: bool,
}

impl Connection for Outbox {
    fn write(&mut self, frame: Frame) {
        if !self.close {
            self.frames.push(frame);
        }
    }

    fn close(&mut self) { self.close = true; }
}

/// Drives a [`FrameDecoder`] over an async transport.
///
/// Pong replies and close acknowledgements produced by the decoder are written
/// back before the next frame is returned, and the write half is shut down as
/// soon as the decoder closes the connection.
pub struct FrameStream<S> {
    io: S,
    decoder: FrameDecoder,
    outbox: Outbox,
    buf: Vec<u8>,
    shut_down: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameStream<S> {
    pub fn new(io: S, config: DecoderConfig) -> Self {
        Self {
            io,
            decoder: FrameDecoder::new(config),
            outbox: Outbox::default(),
            buf: vec![0; READ_CHUNK],
            shut_down: false,
        }
    }

    /// Wait for the next frame or reassembled message.
    ///
    /// Returns `Ok(None)` once the stream has ended, either because the peer
    /// went away on a frame boundary or because the close handshake finished.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let step = self.decoder.next_frame(&mut self.outbox);
            let state = self.settle(step).await?;
            match state {
                FrameState::Complete(frame) => return Ok(Some(frame)),
                FrameState::Closed => return Ok(None),
                FrameState::Incomplete => {}
            }

            let n = self.io.read(&mut self.buf).await?;
            if n == 0 {
                tracing::info!("peer closed the stream");
                let step = self.decoder.finish(&mut self.outbox);
                self.settle(step).await?;
                return Ok(None);
            }
            tracing::trace!(bytes = n, "read socket");
            self.decoder.push_bytes(&self.buf[..n]);
        }
    }

    /// Write a frame to the peer, masked when acting as a client.
    pub async fn send(&mut self, frame: &Frame) -> io::Result<()> {
        if self.shut_down {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        let bytes = encode(self.decoder.config().role, frame);
        self.io.write_all(&bytes).await?;
        self.io.flush().await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.decoder.is_closed() }

    pub fn get_ref(&self) -> &S { &self.io }

    pub fn into_inner(self) -> S { self.io }

    // Flush auto-responses, then surface the decoder's verdict. A decode error
    // wins over a failure to deliver the responses.
    async fn settle<T>(&mut self, step: std::result::Result<T, DecodeError>) -> Result<T> {
        match step {
            Ok(value) => {
                self.flush_outbox().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(io_err) = self.flush_outbox().await {
                    tracing::debug!(error = %io_err, "failed to flush after decode error");
                }
                Err(e.into())
            }
        }
    }

    async fn flush_outbox(&mut self) -> io::Result<()> {
        let role = self.decoder.config().role;
        let frames = mem::take(&mut self.outbox.frames);
        for frame in &frames {
            tracing::debug!(opcode = ?frame.opcode(), len = frame.payload().len(), "sending CTRL");
            self.io.write_all(&encode(role, frame)).await?;
        }
        if !frames.is_empty() {
            self.io.flush().await?;
        }

        if self.outbox.close && !self.shut_down {
            self.shut_down = true;
            tracing::info!("shutting down connection");
            self.io.shutdown().await?;
        }
        Ok(())
    }
}

// Clients must SEND masked
fn encode(role: Role, frame: &Frame) -> Bytes {
    if role.is_client() {
        let mut mask_key = [0; 4];
        rand::fill(&mut mask_key);
        frame.encode_masked(mask_key)
    } else {
        frame.encode()
    }
}
