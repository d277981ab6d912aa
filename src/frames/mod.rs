mod decode;
mod frame;
mod opcode;

pub use decode::{Connection, DecoderConfig, FrameDecoder, FrameState};
pub use frame::Frame;
pub use opcode::Opcode;
