//! Core types for TypeSecure's two external contracts.
//!
//! Identity types mirror what the identity provider returns (its JSON
//! field names are kept, so `serde` can decode provider payloads
//! directly). Detection types mirror the `POST /api/detect` contract.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque unique identifier of an authenticated principal.
///
/// The provider hands these out as strings (usually UUIDs). We never
/// parse them, we only compare and store them, so a newtype over
/// `String` keeps them from being mixed up with email addresses or
/// tokens in function signatures.
///
/// `#[serde(transparent)]` makes a `UserId("abc")` serialize as just
/// `"abc"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The authenticated principal.
///
/// Supplied by the identity provider. The only place that mints these
/// locally is the in-memory provider used for tests and the demo.
///
/// ## Wire shape
///
/// The provider nests the user-editable fields under `user_metadata`:
///
/// ```json
/// { "id": "8c1e", "email": "ada@example.com",
///   "email_confirmed_at": "2024-05-01T10:00:00Z",
///   "user_metadata": { "full_name": "Ada", "avatar_url": null } }
/// ```
///
/// The struct stays flat for callers. `#[serde(from, into)]` routes
/// both directions through the private `IdentityWire` mirror, so the
/// nesting lives in exactly one place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IdentityWire", into = "IdentityWire")]
pub struct Identity {
    /// Provider-assigned identifier.
    pub id: UserId,

    /// Contact address the account was registered with.
    pub email: String,

    /// Display name (`user_metadata.full_name`).
    pub name: Option<String>,

    /// Optional avatar reference (`user_metadata.avatar_url`).
    pub avatar_url: Option<String>,

    /// When the address was verified, as the provider's RFC 3339 string.
    /// `None` means the verification link was never followed.
    pub email_confirmed_at: Option<String>,
}

/// `Identity` as the provider serializes it.
#[derive(Serialize, Deserialize)]
struct IdentityWire {
    id: UserId,
    email: String,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    // `null` and a missing key both mean "no metadata".
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Default, Serialize, Deserialize)]
struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
}

impl From<IdentityWire> for Identity {
    fn from(wire: IdentityWire) -> Self {
        let metadata = wire.user_metadata.unwrap_or_default();
        Self {
            id: wire.id,
            email: wire.email,
            name: metadata.full_name,
            avatar_url: metadata.avatar_url,
            email_confirmed_at: wire.email_confirmed_at,
        }
    }
}

impl From<Identity> for IdentityWire {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            email_confirmed_at: identity.email_confirmed_at,
            user_metadata: Some(UserMetadata {
                full_name: identity.name,
                avatar_url: identity.avatar_url,
            }),
        }
    }
}

impl Identity {
    /// `true` once the provider has recorded an email verification.
    pub fn is_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Name to show in the UI: the display name, or the address when
    /// the user never set one.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

/// A session as issued by the identity provider.
///
/// Tokens are opaque to us. `Debug` is implemented by hand so tokens
/// never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    /// Bearer token for API calls.
    pub access_token: String,

    /// Token used by the provider to refresh `access_token`.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Expiry of `access_token` in seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<u64>,

    /// The principal this session authenticates.
    pub user: Identity,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Kind of a provider-pushed session change.
///
/// Serialized in the provider's SCREAMING_SNAKE_CASE
/// (`"SIGNED_IN"`, `"TOKEN_REFRESHED"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    /// Emitted once right after subscribing, with whatever session exists.
    InitialSession,
    /// A session was established (sign-in, or a verification link followed).
    SignedIn,
    /// The session ended (sign-out here, elsewhere, or expiry).
    SignedOut,
    /// The access token was rotated.
    TokenRefreshed,
    /// The principal's attributes changed (e.g. verification, name).
    UserUpdated,
    /// The user arrived from a password-recovery link.
    PasswordRecovery,
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Account data
// ---------------------------------------------------------------------------

/// A row of the backend's `profiles` table, one per account.
///
/// Written after a successful registration and again on every
/// `SIGNED_IN`, so accounts created before the table existed get one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same id as the account's [`Identity`].
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl Profile {
    /// The profile of `identity`, stamped `updated_at`.
    pub fn for_identity(identity: &Identity, updated_at: u64) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            full_name: identity.name.clone(),
            updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Detection types
// ---------------------------------------------------------------------------

/// What the user submitted for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionRequest {
    /// Free text typed or pasted into the scanner.
    Text(String),

    /// An uploaded file. Its contents are sent to the service as text.
    File {
        /// Original file name, echoed back in the result.
        name: String,
        /// Raw file bytes.
        contents: Vec<u8>,
    },
}

impl DetectionRequest {
    /// File metadata, if this request is a file upload.
    pub fn file_meta(&self) -> Option<FileMeta> {
        match self {
            Self::Text(_) => None,
            Self::File { name, contents } => Some(FileMeta {
                name: name.clone(),
                size: contents.len() as u64,
            }),
        }
    }

    /// The text that will be classified. File contents are decoded as
    /// UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::File { contents, .. } => {
                String::from_utf8_lossy(contents).into_owned()
            }
        }
    }
}

/// Name and size of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
}

/// Request body of `POST /api/detect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectPayload {
    pub text: String,
}

/// Response body of `POST /api/detect`.
///
/// `PartialEq` only (no `Eq`) because `confidence` is a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    /// Whether any sensitive data was found.
    pub is_sensitive: bool,

    /// Classifier confidence in `0.0..=1.0`.
    pub confidence: f64,

    /// Labels of the categories found (`"email"`, `"credit_card"`, ...).
    #[serde(default)]
    pub detected_types: Vec<String>,

    /// The input with sensitive spans masked, or a file label.
    #[serde(default)]
    pub processed_text: String,
}

impl DetectionResponse {
    /// Checks the response against the contract and normalizes it.
    ///
    /// A confidence that is not a finite number is rejected. A finite
    /// confidence outside `0.0..=1.0` is clamped into range; the
    /// returned flag is `true` when clamping happened so the caller can
    /// log it.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] for NaN or infinite
    /// confidence.
    pub fn normalized(mut self) -> Result<(Self, bool), ProtocolError> {
        if !self.confidence.is_finite() {
            return Err(ProtocolError::InvalidMessage(format!(
                "confidence must be finite, got {}",
                self.confidence
            )));
        }
        let clamped = self.confidence.clamp(0.0, 1.0);
        let changed = clamped != self.confidence;
        self.confidence = clamped;
        Ok((self, changed))
    }
}

// =========================================================================
// Tests
// =========================================================================
