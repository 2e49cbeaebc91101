//! Codec seam between typed events and raw frames.
//!
//! The gateway is generic over [`Codec`] so the wire format can change
//! (compact binary, compressed JSON) without touching dispatch or domain
//! code. [`JsonCodec`] is the default.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes typed values to bytes and back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a value from bytes.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// UTF-8 JSON codec. Human-readable, interoperable with browser clients.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
