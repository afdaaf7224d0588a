//! Request/response RPC over TCP.
//!
//! Frames are length-prefixed and checksummed (see [`protocol::framing`]);
//! each request carries a fresh id that its response echoes. Payloads are
//! opaque bytes, usually CBOR produced by the caller's own message types.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{ClientConfig, RpcClient};
pub use error::{CodecError, ConnectionError, Error, HandlerError, ProtocolError, Result};
pub use protocol::codec;
pub use server::{RpcHandler, RpcServer, ServerConfig};

// Re-export dependencies that are part of our public API
pub use bytes::Bytes;
pub use tokio_util::sync::CancellationToken;
