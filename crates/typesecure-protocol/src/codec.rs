//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Adapters that talk to remote services don't care HOW values are
//! serialized. They hold something that implements [`Codec`] and swap
//! implementations without touching request logic.
//!
//! Currently we provide [`JsonCodec`], which is what the detection
//! service and the identity provider both speak.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → safe to share between the tasks that issue
///   requests concurrently.
/// - `'static` → the codec owns everything it needs, so it can live
///   inside long-lived adapters.
///
/// ## Why the methods are generic
///
/// `encode<T: Serialize>` and `decode<T: DeserializeOwned>` let one
/// codec value handle a request body, a response body, or any other
/// serde type. The price is that `Codec` is not object safe: you can't
/// hold a `Box<dyn Codec>`, only a concrete codec or a type parameter.
///
/// `DeserializeOwned` rather than `Deserialize<'de>` means the decoded
/// value owns its strings instead of borrowing from `data`, so the
/// response buffer can be dropped right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use typesecure_protocol::{Codec, DetectionResponse, JsonCodec};
///
/// let codec = JsonCodec;
///
/// let body = br#"{
///     "is_sensitive": true,
///     "confidence": 0.93,
///     "detected_types": ["email"],
///     "processed_text": "contact me at [EMAIL]"
/// }"#;
///
/// let response: DetectionResponse = codec.decode(body).unwrap();
/// assert!(response.is_sensitive);
/// assert_eq!(response.detected_types, vec!["email".to_string()]);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
