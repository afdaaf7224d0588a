//! Failures of the framed TCP transport and of remote handlers.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Result of an RPC call or server operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure seen by [`crate::RpcClient`] or [`crate::RpcServer`].
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting, binding or keeping a connection open failed.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The byte stream did not hold valid frames.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An envelope or body could not be converted to or from CBOR.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The handler refused the request, locally or on the server.
    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Connecting or the whole exchange took longer than allowed.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the peer could not be reached or the exchange broke down.
    ///
    /// Handler failures are answers. Codec failures mean a message could not
    /// be encoded or a well-framed one could not be decoded; the connection
    /// itself is still sound.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        !matches!(self, Self::Handler(_) | Self::Codec(_))
    }
}

/// Why a connection could not be used.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server did not accept the connection.
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// The address we tried to connect to.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Failed to bind the listener.
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        /// The address we tried to bind.
        addr: SocketAddr,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The peer hung up or sent a Close frame before answering.
    #[error("Connection closed unexpectedly")]
    Closed,
}

/// Ways a frame can be malformed.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Unknown frame type, or a frame that makes no sense in this direction.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Payload length above the codec's limit.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The payload does not match the CRC32 in its header.
    #[error("Checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },
}

/// CBOR conversion failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Failed to serialize: {0}")]
    SerializationFailed(String),

    /// Deserialization failed.
    #[error("Failed to deserialize: {0}")]
    DeserializationFailed(String),
}

/// Failures reported by an [`crate::RpcHandler`].
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler understands the message.
    #[error("No handler registered for message: {0}")]
    NotFound(String),

    /// Handler returned an error.
    #[error("Handler error: {0}")]
    Internal(String),

    /// The server reported a failure.
    #[error("{code}: {message}")]
    Remote {
        /// Error code for categorization.
        code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl From<ciborium::de::Error<io::Error>> for CodecError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        Self::DeserializationFailed(err.to_string())
    }
}

impl From<ciborium::ser::Error<io::Error>> for CodecError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}
