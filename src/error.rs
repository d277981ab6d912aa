use std::{error::Error, fmt, io};

/// Fatal decode failures. By the time one of these is returned the connection
/// has already been closed and the decoder will not produce further frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The peer broke the framing rules of
    /// [RFC 6455](https://www.rfc-editor.org/rfc/rfc6455.html#section-5).
    ProtocolViolation(String),
    /// A frame (or a reassembled message) exceeded the configured size limit.
    /// Carries the offending length.
    FrameTooLarge(u64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation(reason) => write!(f, "protocol violation: {reason}"),
            Self::FrameTooLarge(len) => write!(f, "frame too large: {len} bytes"),
        }
    }
}

impl Error for DecodeError {}

/// Errors surfaced by [`FrameStream`](crate::FrameStream).
#[derive(Debug)]
pub enum StreamError {
    /// The decoder rejected the inbound byte stream.
    Decode(DecodeError),
    /// Reading from or writing to the underlying transport failed.
    Io(io::Error),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => e.fmt(f),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<DecodeError> for StreamError {
    fn from(e: DecodeError) -> Self { Self::Decode(e) }
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}
