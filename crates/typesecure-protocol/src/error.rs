//! Error types for the protocol layer.
//!
//! Each TypeSecure crate defines its own error enum. A `ProtocolError`
//! always means the problem is in encoding or decoding, not in the
//! network or the identity provider.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or a truncated body.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The value decoded but violates a rule of the contract,
    /// e.g. a detection confidence that is not a finite number.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
