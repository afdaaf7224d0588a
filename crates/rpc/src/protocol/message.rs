//! Envelopes carried inside frames.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request envelope for wire format.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique request ID for correlation.
    pub id: Uuid,
    /// Message type identifier, used for routing and logging.
    pub message_id: String,
    /// Serialized message payload.
    pub payload: Bytes,
}

/// Response envelope for wire format.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response is for.
    pub request_id: Uuid,
    /// Serialized response payload. Empty when `error` is set.
    pub payload: Bytes,
    /// Set if the request failed.
    pub error: Option<ErrorInfo>,
}

/// Error information for failed requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code for categorization.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}
