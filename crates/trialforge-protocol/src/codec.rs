//! Codec trait and implementations for serializing records.
//!
//! The store and file-snapshot layers don't care HOW a record becomes
//! bytes, only that something implements [`Codec`]. [`JsonCodec`] is the
//! default: session files and player item blobs stay human-readable, which
//! makes manual reconciliation after a crash much easier.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because codecs live inside long-lived,
/// shared components (the registry, the snapshot store).
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;

    /// Encodes a value as UTF-8 text, for TEXT columns.
    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Decodes a value from text produced by [`Codec::encode_text`].
    fn decode_text<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        self.decode(text.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use trialforge_protocol::{Codec, JsonCodec, PlayerId};
///
/// let codec = JsonCodec;
/// let player = PlayerId::random();
///
/// let bytes = codec.encode(&player).unwrap();
/// let decoded: PlayerId = codec.decode(&bytes).unwrap();
/// assert_eq!(player, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn encode_text<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }
}
