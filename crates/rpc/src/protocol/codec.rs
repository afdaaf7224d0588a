//! CBOR bodies for envelopes.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{CodecError, Result};

/// Serialize `msg` to CBOR.
///
/// # Errors
///
/// Returns [`CodecError::SerializationFailed`] if `msg` cannot be represented.
pub fn encode<T: Serialize>(msg: &T) -> Result<Bytes> {
    let mut writer = BytesMut::new().writer();
    ciborium::ser::into_writer(msg, &mut writer).map_err(CodecError::from)?;
    Ok(writer.into_inner().freeze())
}

/// Deserialize a CBOR body.
///
/// # Errors
///
/// Returns [`CodecError::DeserializationFailed`] if `data` is not valid CBOR
/// for `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(ciborium::de::from_reader(data).map_err(CodecError::from)?)
}
