//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or parsing shared types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: a truncated file, a hand-edited snapshot, or a
    /// record written by an incompatible version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A textual identifier could not be parsed.
    #[error("invalid {kind} id {value:?}")]
    InvalidId {
        /// Which identifier was being parsed ("player", "session").
        kind: &'static str,
        /// The offending input.
        value: String,
    },

    /// A textual enum value was not recognized.
    #[error("unknown {kind} {value:?}")]
    UnknownVariant {
        /// Which enum was being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}
