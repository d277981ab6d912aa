use bytes::{BufMut, Bytes, BytesMut};

use super::Opcode;

/// A decoded (or to-be-encoded) WebSocket frame.
///
/// Frames produced by [`FrameDecoder`](crate::FrameDecoder) are already
/// unmasked, and reassembled messages are returned as a single frame with the
/// opcode of their first fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: Opcode,
    fin: bool,
    rsv: u8,
    payload: Bytes,
}

impl Frame {
    /// Builds a frame. Only the low three bits of `rsv` are kept.
    ///
    /// Control frames must be final and carry at most 125 bytes of payload;
    /// the caller upholds this, and debug builds assert it.
    pub fn new(opcode: Opcode, fin: bool, rsv: u8, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        debug_assert!(
            !opcode.is_control() || (fin && payload.len() <= 125),
            "control frame must be final with payload <= 125 bytes"
        );
        Self {
            opcode,
            fin,
            rsv: rsv & 0b111,
            payload,
        }
    }

    pub fn text(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Text, true, 0, payload) }

    pub fn binary(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Bin, true, 0, payload) }

    pub fn ping(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Ping, true, 0, payload) }

    pub fn pong(payload: impl Into<Bytes>) -> Self { Self::new(Opcode::Pong, true, 0, payload) }

    /// An empty close frame, as sent to acknowledge a peer's close.
    #[must_use]
    pub fn close() -> Self { Self::new(Opcode::Close, true, 0, Bytes::new()) }

    #[must_use]
    pub fn opcode(&self) -> Opcode { self.opcode }

    #[must_use]
    pub fn is_fin(&self) -> bool { self.fin }

    #[must_use]
    pub fn rsv(&self) -> u8 { self.rsv }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Encodes the frame unmasked, as a server sends it.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = self.encode_header(None);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Encodes the frame masked with `mask_key`, as a client sends it.
    #[must_use]
    pub fn encode_masked(&self, mask_key: [u8; 4]) -> Bytes {
        let mut buf = self.encode_header(Some(mask_key));
        let start = buf.len();
        buf.extend_from_slice(&self.payload);
        crate::protocol::mask(&mut buf[start..], mask_key);
        buf.freeze()
    }

    // FIN, RSV, OPCODE, MASK and the shortest length encoding that fits
    fn encode_header(&self, mask_key: Option<[u8; 4]>) -> BytesMut {
        let len = self.payload.len();
        let mut buf = BytesMut::with_capacity(len + 14);

        let fin = if self.fin { 0x80 } else { 0 };
        buf.put_u8(fin | (self.rsv << 4) | self.opcode as u8);

        let mask_bit = if mask_key.is_some() { 0x80 } else { 0 };
        #[allow(clippy::cast_possible_truncation)]
        match len {
            0..=125 => buf.put_u8(mask_bit | len as u8),
            126..=0xFFFF => {
                buf.put_u8(mask_bit | 126);
                buf.put_u16(len as u16);
            }
            _ => {
                buf.put_u8(mask_bit | 127);
                buf.put_u64(len as u64);
            }
        }

        if let Some(key) = mask_key {
            buf.extend_from_slice(&key);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_short_unmasked() {
        let bytes = Frame::text("Hello").encode();
        assert_eq!(&bytes[..], &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn encodes_masked_rfc_sample() {
        let bytes = Frame::text("Hello").encode_masked([0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(
            &bytes[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn picks_minimal_length_encoding() {
        let mid = Frame::binary(vec![0u8; 256]).encode();
        assert_eq!(&mid[..4], &[0x82, 126, 0x01, 0x00]);
        assert_eq!(mid.len(), 4 + 256);

        let big = Frame::binary(vec![0u8; 65536]).encode();
        assert_eq!(&big[..2], &[0x82, 127]);
        assert_eq!(&big[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn empty_close_is_two_bytes() {
        assert_eq!(&Frame::close().encode()[..], &[0x88, 0x00]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "control frame")]
    fn oversized_ping_rejected() {
        let _ = Frame::ping(vec![0u8; 126]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "control frame")]
    fn fragmented_control_frame_rejected() {
        let _ = Frame::new(Opcode::Pong, false, 0, Bytes::new());
    }

    #[test]
    fn largest_control_payload_allowed() {
        let bytes = Frame::pong(vec![1u8; 125]).encode();
        assert_eq!(&bytes[..2], &[0x8A, 125]);
    }

    #[test]
    fn rsv_is_truncated_to_three_bits() {
        let frame = Frame::new(Opcode::Text, false, 0xFF, Bytes::new());
        assert_eq!(frame.rsv(), 0b111);
        assert_eq!(frame.encode()[0], 0x71);
    }
}
