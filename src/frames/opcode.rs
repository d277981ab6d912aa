/// Frame opcodes defined by RFC 6455. Reserved values have no variant.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Cont = 0x0,
    Text = 0x1,
    Bin = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    /// Control frames carry the high bit of the opcode nibble.
    #[must_use]
    pub fn is_control(self) -> bool { self as u8 & 0x8 != 0 }

    #[must_use]
    pub fn is_data(self) -> bool { !self.is_control() }
}

/// Fails with the raw value when it is reserved or wider than a nibble.
impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0 => Self::Cont,
            0x1 => Self::Text,
            0x2 => Self::Bin,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            _ => return Err(value),
        })
    }
}
