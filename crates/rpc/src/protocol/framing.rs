//! Length-prefixed, checksummed frames over a byte stream.
//!
//! Each frame is a 9 byte header followed by the payload:
//! `[payload length: u32 BE][frame type: u8][crc32 of payload: u32 BE]`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError, Result};

/// Maximum payload size (10 MiB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Frame header size (4 bytes length + 1 byte type + 4 bytes checksum).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Type of frame being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Request frame.
    Request = 0x01,
    /// Response frame.
    Response = 0x02,
    /// Error frame.
    Error = 0x04,
    /// Close frame.
    Close = 0x06,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Request),
            0x02 => Ok(Self::Response),
            0x04 => Ok(Self::Error),
            0x06 => Ok(Self::Close),
            _ => Err(ProtocolError::InvalidFrame(format!(
                "Unknown frame type: {value:#x}"
            ))),
        }
    }
}

/// A frame in the wire protocol.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Type of this frame.
    pub frame_type: FrameType,
    /// Frame payload.
    pub payload: Bytes,
    /// CRC32 of the payload.
    pub checksum: u32,
}

impl Frame {
    /// Create a new frame, computing its checksum.
    #[must_use]
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        let checksum = crc32fast::hash(&payload);
        Self {
            frame_type,
            payload,
            checksum,
        }
    }

    /// A close frame with an empty payload.
    #[must_use]
    pub fn close() -> Self {
        Self::new(FrameType::Close, Bytes::new())
    }

    /// Verify the checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the checksum is invalid.
    pub fn verify_checksum(&self) -> Result<()> {
        let actual = crc32fast::hash(&self.payload);
        if self.checksum != actual {
            return Err(ProtocolError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            }
            .into());
        }
        Ok(())
    }
}

/// Fixed-size prefix of every frame.
#[derive(Debug, Clone, Copy)]
struct Header {
    payload_len: usize,
    frame_type: u8,
    checksum: u32,
}

impl Header {
    /// Read a header from the front of `buf` without consuming it.
    fn peek(buf: &[u8]) -> Option<Self> {
        let mut header = buf.get(..FRAME_HEADER_SIZE)?;
        Some(Self {
            payload_len: header.get_u32() as usize,
            frame_type: header.get_u8(),
            checksum: header.get_u32(),
        })
    }
}

/// Splits a byte stream into [`Frame`]s and back.
///
/// Failures are reported as [`ProtocolError`]s; the stream cannot be resumed
/// after one.
#[derive(Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// A codec accepting payloads up to [`MAX_FRAME_SIZE`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Lower or raise the payload limit.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    const fn check_size(&self, size: usize) -> std::result::Result<(), ProtocolError> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(header) = Header::peek(&buf[..]) else {
            return Ok(None);
        };
        self.check_size(header.payload_len)?;

        let needed = FRAME_HEADER_SIZE + header.payload_len;
        if buf.len() < needed {
            buf.reserve(needed - buf.len());
            return Ok(None);
        }

        let frame_type = FrameType::try_from(header.frame_type)?;
        buf.advance(FRAME_HEADER_SIZE);

        let frame = Frame {
            frame_type,
            payload: buf.split_to(header.payload_len).freeze(),
            checksum: header.checksum,
        };
        frame.verify_checksum()?;

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, buf: &mut BytesMut) -> Result<()> {
        self.check_size(frame.payload.len())?;
        let payload_len = u32::try_from(frame.payload.len()).map_err(|_| {
            ProtocolError::FrameTooLarge {
                size: frame.payload.len(),
                max: self.max_frame_size,
            }
        })?;

        buf.reserve(FRAME_HEADER_SIZE + frame.payload.len());
        buf.put_u32(payload_len);
        buf.put_u8(frame.frame_type as u8);
        buf.put_u32(frame.checksum);
        buf.extend_from_slice(&frame.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let frame = Frame::new(FrameType::Request, Bytes::from("register team-a"));
        codec.encode(frame.clone(), &mut buf).unwrap();

        assert_eq!(buf.len(), FRAME_HEADER_SIZE + frame.payload.len());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.frame_type, frame.frame_type);
        assert_eq!(decoded.payload, frame.payload);
        assert_eq!(decoded.checksum, frame.checksum);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(100);
        buf.put_u8(FrameType::Request as u8);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_u32(0);
        buf.put_slice(&[0; 50]);

        // Header complete, payload still short.
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_checksum_verification() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let payload = b"Hello, World!";
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload.len() as u32);
        buf.put_u8(FrameType::Request as u8);
        buf.put_u32(12345);
        buf.put_slice(payload);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::ChecksumMismatch {
                expected: 12345,
                ..
            }))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::new().with_max_frame_size(8);
        let mut buf = BytesMut::new();

        let frame = Frame::new(FrameType::Response, Bytes::from_static(&[0; 9]));
        assert!(matches!(
            codec.encode(frame, &mut buf),
            Err(Error::Protocol(ProtocolError::FrameTooLarge { size: 9, max: 8 }))
        ));
        assert!(buf.is_empty());

        buf.put_u32(9);
        buf.put_u8(FrameType::Response as u8);
        buf.put_u32(0);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::FrameTooLarge { size: 9, max: 8 }))
        ));
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(0);
        buf.put_u8(0x03);
        buf.put_u32(crc32fast::hash(&[]));

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::InvalidFrame(_)))
        ));
    }
}
