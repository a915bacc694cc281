//! Wire and domain types shared by every TypeSecure crate.
//!
//! This crate defines the data that crosses the two external boundaries
//! of the application:
//!
//! - **Identity** ([`UserId`], [`Identity`], [`ProviderSession`],
//!   [`AuthEvent`]): what the identity provider hands back when a user
//!   signs in, restores a session, or when the provider pushes a change.
//! - **Account data** ([`Profile`]): the profile row kept next to each
//!   account by the hosted backend.
//! - **Detection** ([`DetectionRequest`], [`DetectionResponse`]): the
//!   contract of the remote `POST /api/detect` classifier.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values are
//!   turned into bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Detect adapter (bytes) → Protocol (typed values) → Session / App
//! ```
//!
//! Nothing here performs I/O. The crate only knows shapes and encodings.

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

// Each `mod` below is a single file under `src/`. The modules stay
// private: callers never name `typesecure_protocol::types::Identity`,
// because everything public is lifted to the crate root below.

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

// A `pub use` re-export is the crate's real public surface. Moving an
// item between private modules later is then not a breaking change.
// `JsonCodec` only exists with the `json` feature, so its re-export
// carries the same `#[cfg]` as its definition.

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuthEvent, DetectPayload, DetectionRequest, DetectionResponse, FileMeta,
    Identity, Profile, ProviderSession, UserId,
};
