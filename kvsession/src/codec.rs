//! Serialization of session values.
//!
//! A [`SessionCodec`] turns the in-memory map of a session into the payload
//! stored in the cache and back. The codec is handed to the manager at
//! construction time, so different managers in the same process can use
//! different encodings.
//!
//! Codecs never see empty maps: an empty session is always stored as an empty
//! payload, and an empty payload always loads as an empty map.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{CodecError, Error, Result};

/// The values held by a session.
pub type SessionValues = HashMap<String, Value>;

/// Encodes and decodes session values.
pub trait SessionCodec: Send + Sync + 'static {
    /// Serialize a non-empty map of session values.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in this encoding.
    fn encode(&self, values: &SessionValues) -> std::result::Result<Vec<u8>, CodecError>;

    /// Deserialize a non-empty payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed.
    fn decode(&self, payload: &[u8]) -> std::result::Result<SessionValues, CodecError>;
}

/// A [`SessionCodec`] storing values as a flat JSON object.
///
/// # Examples
///
/// ```
/// use kvsession::codec::{JsonCodec, SessionCodec, SessionValues};
/// use serde_json::json;
///
/// let mut values = SessionValues::new();
/// values.insert("user_id".to_string(), json!(42));
///
/// let payload = JsonCodec.encode(&values).unwrap();
/// assert_eq!(payload, br#"{"user_id":42}"#);
/// assert_eq!(JsonCodec.decode(&payload).unwrap(), values);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JsonCodec;

impl SessionCodec for JsonCodec {
    fn encode(&self, values: &SessionValues) -> std::result::Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(values)?)
    }

    fn decode(&self, payload: &[u8]) -> std::result::Result<SessionValues, CodecError> {
        // a literal `null` is what some writers store for a session without values
        let values: Option<SessionValues> = serde_json::from_slice(payload)?;
        Ok(values.unwrap_or_default())
    }
}

pub(crate) fn encode_values<D: SessionCodec>(codec: &D, values: &SessionValues) -> Result<Vec<u8>> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    codec.encode(values).map_err(Error::Encode)
}

pub(crate) fn decode_values<D: SessionCodec>(codec: &D, payload: &[u8]) -> Result<SessionValues> {
    if payload.is_empty() {
        return Ok(SessionValues::new());
    }
    codec.decode(payload).map_err(Error::Decode)
}
