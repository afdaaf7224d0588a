//! Wire protocol: framing, envelopes and the CBOR codec.

pub mod codec;
pub mod framing;
pub mod message;

pub use framing::{FRAME_HEADER_SIZE, Frame, FrameCodec, FrameType, MAX_FRAME_SIZE};
pub use message::{ErrorInfo, MessageEnvelope, ResponseEnvelope};
