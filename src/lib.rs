#![cfg_attr(all(test, feature = "bench"), feature(test))]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::missing_safety_doc
)]

//! Resumable decoder for RFC 6455 ("HyBi-10") WebSocket frames.
//!
//! [`FrameDecoder`] consumes bytes as they arrive and yields complete [`Frame`]s,
//! answering pings and close requests through a [`Connection`] on its own.
//! [`FrameStream`] drives a decoder over any tokio `AsyncRead + AsyncWrite`.

mod error;
mod frames;
mod protocol;
mod role;
mod stream;

pub use error::{DecodeError, StreamError};
pub use frames::{Connection, DecoderConfig, Frame, FrameDecoder, FrameState, Opcode};
pub use protocol::mask;
pub use role::Role;
pub use stream::FrameStream;

/// Largest single frame payload the decoder will buffer by default.
pub const MAX_FRAME_PAYLOAD: usize = 0x7FFF_FFFF;
/// Largest fragmented message the decoder will reassemble by default.
pub const MAX_MESSAGE_SIZE: usize = MAX_FRAME_PAYLOAD;
