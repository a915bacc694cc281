//! Unified error type for TypeSecure.

use typesecure_detect::{DetectError, StoreError};
use typesecure_protocol::ProtocolError;
use typesecure_session::AuthError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `typesecure` crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TypeSecureError {
    /// An authentication error (login, registration, provider).
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A detection error (size limit, service rejection, outage).
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// A storage error (scan history or settings).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The configuration document couldn't be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),

    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotAuthenticated,
}

impl TypeSecureError {
    /// User-safe text for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(err) => err.user_message(),
            Self::Detect(DetectError::TooLarge { limit, .. }) => {
                format!("File is too large. The limit is {}.", human_size(*limit))
            }
            Self::Detect(DetectError::Rejected { body, .. }) => {
                format!("Detection failed: {body}")
            }
            Self::Detect(DetectError::Unavailable(_)) => {
                "Unable to reach the detection service. Please try again.".into()
            }
            Self::Detect(DetectError::Protocol(_)) | Self::Protocol(_) => {
                "Detection failed - please try again".into()
            }
            Self::Store(_) => "Could not load or save your data. Please try again.".into(),
            Self::Config(_) => "The application is misconfigured.".into(),
            Self::NotAuthenticated => "Please sign in to continue.".into(),
        }
    }
}

/// `bytes` in whole MB when exact, otherwise whole KB rounded down.
fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}
