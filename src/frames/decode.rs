use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, Bytes, BytesMut};

use super::{Frame, Opcode};
use crate::{error::DecodeError, role::Role, MAX_FRAME_PAYLOAD, MAX_MESSAGE_SIZE};

// helper type since decoder errors are always DecodeError
type Result<T> = std::result::Result<T, DecodeError>;

/// The outbound half of a connection, used by the decoder to answer pings and
/// to acknowledge or enforce a close.
pub trait Connection {
    /// Queue a frame for the peer. Called synchronously from the decoder, so
    /// frames are written in the order the decoder produces them.
    fn write(&mut self, frame: Frame);

    /// Close the underlying connection. Irreversible.
    fn close(&mut self);
}

/// Per-connection decoding policy, fixed when the decoder is built.
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    pub role: Role,
    /// Reject unmasked inbound frames when acting as a server.
    pub require_masked_client_frames: bool,
    /// Frames announcing a longer payload are rejected before it is buffered.
    pub max_frame_size: usize,
    /// Ceiling on the running total of a fragmented data message.
    pub max_message_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            role: Role::Server,
            require_masked_client_frames: true,
            max_frame_size: MAX_FRAME_PAYLOAD,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Outcome of a call to [`FrameDecoder::next_frame`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameState {
    /// A frame (or a whole reassembled message) is ready.
    Complete(Frame),
    /// More bytes are needed. Everything decoded so far is kept.
    Incomplete,
    /// The connection has been closed; nothing more will be decoded.
    Closed,
}

/// Resumable RFC 6455 frame decoder.
///
/// Push bytes with [`push_bytes`](Self::push_bytes) as they arrive and call
/// [`next_frame`](Self::next_frame) until it reports
/// [`FrameState::Incomplete`]. Pings are answered and close requests
/// acknowledged through the supplied [`Connection`] without surfacing them.
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    ctx: DecodeContext,
    fragments: Fragments,
    config: DecoderConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    FrameStart,
    ExtendedLen,
    MaskingKey,
    Payload,
    Closed,
}

#[derive(Debug)]
struct DecodeContext {
    fin: bool,
    rsv: u8,
    opcode: Opcode,
    masked: bool,
    // raw 7-bit length field, selects the extended length width
    len_field: u8,
    payload_len: usize,
    mask_key: Option<[u8; 4]>,
}

// Payloads of a fragmented message received so far
#[derive(Debug, Default)]
struct Fragments {
    opcode: Option<Opcode>,
    parts: Vec<Bytes>,
    len: usize,
}

impl Fragments {
    fn in_progress(&self) -> bool { self.opcode.is_some() }

    fn start(&mut self, opcode: Opcode, payload: Bytes) {
        self.opcode = Some(opcode);
        self.push(payload);
    }

    fn push(&mut self, payload: Bytes) {
        self.len += payload.len();
        self.parts.push(payload);
    }

    fn take(&mut self) -> Option<(Opcode, Bytes)> {
        let opcode = self.opcode.take()?;
        let payload = if self.parts.len() == 1 {
            self.parts.pop().unwrap_or_default()
        } else {
            let mut joined = BytesMut::with_capacity(self.len);
            for part in self.parts.drain(..) {
                joined.extend_from_slice(&part);
            }
            joined.freeze()
        };
        self.len = 0;
        Some((opcode, payload))
    }

    fn clear(&mut self) {
        self.opcode = None;
        self.parts.clear();
        self.len = 0;
    }
}

fn violation(reason: impl Into<String>) -> DecodeError {
    DecodeError::ProtocolViolation(reason.into())
}

impl FrameDecoder {
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            state: DecodeState::FrameStart,
            ctx: DecodeContext {
                fin: false,
                rsv: 0,
                opcode: Opcode::Cont,
                masked: false,
                len_field: 0,
                payload_len: 0,
                mask_key: None,
            },
            fragments: Fragments::default(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DecoderConfig { &self.config }

    /// Append bytes received from the peer. Ignored once closed.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if self.state != DecodeState::Closed {
            self.buf.extend_from_slice(bytes);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.state == DecodeState::Closed }

    /// True when sitting on a frame boundary with no buffered bytes and no
    /// partially reassembled message, i.e. the stream may end cleanly here.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::FrameStart
            && self.buf.is_empty()
            && !self.fragments.in_progress()
    }

    /// Decode as far as the buffered bytes allow.
    ///
    /// On error the connection has already been closed through `conn` and
    /// every later call returns [`FrameState::Closed`].
    pub fn next_frame<C: Connection>(&mut self, conn: &mut C) -> Result<FrameState> {
        match self.decode(conn) {
            Ok(state) => Ok(state),
            Err(e) => Err(self.protocol_violation(conn, e)),
        }
    }

    /// Abort decoding because the byte source ended. A clean end on a frame
    /// boundary is not an error.
    pub fn finish<C: Connection>(&mut self, conn: &mut C) -> Result<()> {
        if self.is_closed() || self.is_idle() {
            return Ok(());
        }
        Err(self.protocol_violation(conn, violation("connection ended mid-frame")))
    }

    // Closes the connection and parks the decoder for good
    fn protocol_violation<C: Connection>(&mut self, conn: &mut C, err: DecodeError) -> DecodeError {
        tracing::warn!(error = %err, state = ?self.state, "closing connection");
        conn.close();
        self.state = DecodeState::Closed;
        self.buf.clear();
        self.fragments.clear();
        err
    }

    fn decode<C: Connection>(&mut self, conn: &mut C) -> Result<FrameState> {
        tracing::trace!(state = ?self.state, buf_len = self.buf.len(), "decoder");
        loop {
            let next_state = match self.state {
                DecodeState::Closed => return Ok(FrameState::Closed),
                DecodeState::FrameStart => {
                    let Some([b0, b1]) = self.pop_n::<2>() else {
                        return Ok(FrameState::Incomplete);
                    };
                    self.parse_header(b0, b1)?
                }
                DecodeState::ExtendedLen => match self.parse_extended_len()? {
                    Some(state) => state,
                    None => return Ok(FrameState::Incomplete),
                },
                DecodeState::MaskingKey => {
                    if self.ctx.masked {
                        let Some(key) = self.pop_n::<4>() else {
                            return Ok(FrameState::Incomplete);
                        };
                        self.ctx.mask_key = Some(key);
                    }
                    DecodeState::Payload
                }
                DecodeState::Payload => {
                    let Some(payload) = self.take_payload() else {
                        return Ok(FrameState::Incomplete);
                    };
                    self.state = DecodeState::FrameStart;
                    match self.dispatch(payload, conn) {
                        Some(done) => return Ok(done),
                        None => continue,
                    }
                }
            };
            tracing::trace!(from = ?self.state, to = ?next_state, "state transition");
            self.state = next_state;
        }
    }

    fn parse_header(&mut self, b0: u8, b1: u8) -> Result<DecodeState> {
        // 0   | 1 2 3 | 4 5 6 7
        // Fin | Rsv   | Opcode
        let fin = b0 & 0b1000_0000 != 0;
        let rsv = (b0 & 0b0111_0000) >> 4;
        let raw_opcode = b0 & 0b0000_1111;

        // 0    | 1 2 3 4 5 6 7
        // Mask | Payload len
        let masked = b1 & 0b1000_0000 != 0;
        let len_field = b1 & 0b0111_1111;

        if rsv != 0 {
            return Err(violation("RSV != 0 and no extension negotiated"));
        }

        if self.config.role.is_server() && self.config.require_masked_client_frames && !masked {
            return Err(violation("unmasked client to server frame"));
        }

        let opcode = if raw_opcode & 0x8 != 0 {
            if !fin {
                return Err(violation("fragmented control frame"));
            }
            if len_field > 125 {
                return Err(violation("control frame with payload length > 125 octets"));
            }
            let opcode = Opcode::try_from(raw_opcode)
                .map_err(|op| violation(format!("control frame using reserved opcode {op}")))?;
            // a close body, if any, starts with a 2-byte status code
            if opcode == Opcode::Close && len_field == 1 {
                return Err(violation("received close control frame with payload len 1"));
            }
            opcode
        } else {
            let opcode = Opcode::try_from(raw_opcode)
                .map_err(|op| violation(format!("data frame using reserved opcode {op}")))?;
            match (opcode, self.fragments.in_progress()) {
                (Opcode::Cont, false) => {
                    return Err(violation(
                        "received continuation data frame outside fragmented message",
                    ));
                }
                (Opcode::Text | Opcode::Bin, true) => {
                    return Err(violation(
                        "received non-continuation data frame while inside fragmented message",
                    ));
                }
                _ => {}
            }
            opcode
        };

        self.ctx = DecodeContext {
            fin,
            rsv,
            opcode,
            masked,
            len_field,
            payload_len: 0,
            mask_key: None,
        };

        if len_field > 125 {
            return Ok(DecodeState::ExtendedLen);
        }
        self.set_payload_len(u64::from(len_field))?;
        Ok(DecodeState::MaskingKey)
    }

    fn parse_extended_len(&mut self) -> Result<Option<DecodeState>> {
        let len = if self.ctx.len_field == 126 {
            // 126 => 2 bytes extended (u16)
            let Some(bytes) = self.pop_n::<2>() else {
                return Ok(None);
            };
            let len = BigEndian::read_u16(&bytes);
            if len < 126 {
                return Err(violation(
                    "invalid data frame length (not using minimal length encoding)",
                ));
            }
            u64::from(len)
        } else {
            // 127 => 8 bytes extended (u64)
            let Some(bytes) = self.pop_n::<8>() else {
                return Ok(None);
            };
            let len = BigEndian::read_u64(&bytes);
            if len < 65536 {
                return Err(violation(
                    "invalid data frame length (not using minimal length encoding)",
                ));
            }
            len
        };

        self.set_payload_len(len)?;
        Ok(Some(DecodeState::MaskingKey))
    }

    fn set_payload_len(&mut self, len: u64) -> Result<()> {
        let payload_len = usize::try_from(len)
            .ok()
            .filter(|&n| n <= self.config.max_frame_size)
            .ok_or(DecodeError::FrameTooLarge(len))?;

        // only fragmented messages accumulate, so only they are held to the
        // message ceiling
        let fragmented = match self.ctx.opcode {
            Opcode::Cont => true,
            Opcode::Text | Opcode::Bin => !self.ctx.fin,
            _ => false,
        };
        if fragmented {
            let total = self.fragments.len.saturating_add(payload_len);
            if total > self.config.max_message_size {
                return Err(DecodeError::FrameTooLarge(
                    u64::try_from(total).unwrap_or(u64::MAX),
                ));
            }
        }

        self.ctx.payload_len = payload_len;
        Ok(())
    }

    fn take_payload(&mut self) -> Option<Bytes> {
        if self.buf.len() < self.ctx.payload_len {
            return None;
        }
        let mut payload = self.buf.split_to(self.ctx.payload_len);
        if let Some(key) = self.ctx.mask_key {
            crate::protocol::mask(&mut payload, key);
        }
        tracing::trace!(
            opcode = ?self.ctx.opcode,
            fin = self.ctx.fin,
            payload_len = payload.len(),
            masked = self.ctx.masked,
            "frame decoded"
        );
        Some(payload.freeze())
    }

    // None means the frame was consumed internally and decoding continues
    fn dispatch<C: Connection>(&mut self, payload: Bytes, conn: &mut C) -> Option<FrameState> {
        let DecodeContext { fin, rsv, opcode, .. } = self.ctx;
        match opcode {
            Opcode::Text | Opcode::Bin if !fin => {
                self.fragments.start(opcode, payload);
                None
            }
            Opcode::Text | Opcode::Bin | Opcode::Pong => {
                Some(FrameState::Complete(Frame::new(opcode, fin, rsv, payload)))
            }
            Opcode::Cont => {
                self.fragments.push(payload);
                if !fin {
                    tracing::trace!(buffered = self.fragments.len, "message fragment appended");
                    return None;
                }
                let (opcode, message) = self.fragments.take()?;
                tracing::debug!(?opcode, total_len = message.len(), "message assembly complete");
                Some(FrameState::Complete(Frame::new(opcode, true, 0, message)))
            }
            Opcode::Ping => {
                tracing::debug!(len = payload.len(), "received PING, replying with PONG");
                conn.write(Frame::pong(payload));
                None
            }
            Opcode::Close => {
                tracing::debug!(len = payload.len(), "received CLOSE, acknowledging");
                conn.write(Frame::close());
                conn.close();
                self.state = DecodeState::Closed;
                self.buf.clear();
                self.fragments.clear();
                Some(FrameState::Closed)
            }
        }
    }

    fn pop_n<const N: usize>(&mut self) -> Option<[u8; N]> {
        if N > self.buf.len() {
            return None;
        }
        let mut out = [0; N];
        self.buf.copy_to_slice(&mut out);
        Some(out)
    }
}
