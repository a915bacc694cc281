//! Identity provider seam.
//!
//! TypeSecure doesn't store accounts or passwords. That's the identity
//! provider's job (a hosted auth service). The session layer only
//! needs the handful of capabilities captured by [`IdentityProvider`].
//!
//! Swapping the implementation is how the same [`SessionManager`]
//! runs against the hosted service in production and against
//! [`MemoryProvider`](crate::memory::MemoryProvider) in tests and the
//! demo.
//!
//! [`SessionManager`]: crate::SessionManager

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use typesecure_protocol::{AuthEvent, Identity, Profile, ProviderSession};

/// Failure reported by an identity provider call.
///
/// Deliberately raw: the provider's own message text. The session
/// manager classifies it into an [`AuthError`](crate::AuthError).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider answered and said no.
    #[error("provider rejected request (status {status:?}): {message}")]
    Rejected {
        /// HTTP status, when the provider speaks HTTP.
        status: Option<u16>,
        /// Provider's message, not assumed to be user-safe.
        message: String,
        /// Wait hint sent along with rate-limit rejections.
        retry_after_secs: Option<u64>,
    },

    /// The provider couldn't be reached at all.
    #[error("provider unreachable: {0}")]
    Transport(String),
}

impl ProviderError {
    /// Shorthand for a rejection with a status and message.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status: Some(status),
            message: message.into(),
            retry_after_secs: None,
        }
    }
}

/// Metadata attached to a new account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUpMetadata {
    /// Display name shown in the UI.
    pub full_name: String,
}

/// Everything the provider needs to create an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub metadata: SignUpMetadata,
    /// Where the verification link should send the user back to.
    pub redirect_to: Option<String>,
}

/// Result of a sign-up call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpResponse {
    /// The created principal. Providers return `None` only on a
    /// malformed response.
    pub identity: Option<Identity>,
    /// Present only when the provider doesn't require verification.
    pub session: Option<ProviderSession>,
}

/// One provider-pushed session change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: AuthEvent,
    /// The session after the change; `None` when signed out.
    pub session: Option<ProviderSession>,
}

/// A live subscription to provider-pushed session changes.
///
/// Dropping it unsubscribes: the provider sees the channel close and
/// stops delivering.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::UnboundedReceiver<SessionChange>,
}

impl Subscription {
    /// Wraps the receiving half of a provider's event channel.
    pub fn new(events: mpsc::UnboundedReceiver<SessionChange>) -> Self {
        Self { events }
    }

    /// Creates a connected sender/subscription pair.
    pub fn channel() -> (mpsc::UnboundedSender<SessionChange>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Waits for the next change. `None` once the provider hangs up.
    pub async fn next(&mut self) -> Option<SessionChange> {
        self.events.recv().await
    }
}

/// The capabilities the session manager consumes from an identity
/// provider.
///
/// # Trait bounds
///
/// - `Send + Sync` → the provider is shared by the manager and
///   whatever tasks drive it.
/// - `'static` → it lives as long as the application.
///
/// Every async method resolves once the provider round-trip finishes.
/// The manager wraps each call in its own timeout, so implementations
/// don't need one.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Looks up an existing valid session (e.g. persisted from a
    /// previous run). `Ok(None)` when there is none.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<ProviderSession>, ProviderError>> + Send;

    /// Subscribes to pushed session changes (sign-in elsewhere, token
    /// refresh, expiry, verification).
    fn subscribe(&self) -> Subscription;

    /// Password sign-in. `Ok(None)` means the provider accepted the
    /// call but issued no session.
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Option<ProviderSession>, ProviderError>> + Send;

    /// Creates an account and sends a verification link to
    /// `request.redirect_to`.
    fn sign_up(
        &self,
        request: SignUpRequest,
    ) -> impl Future<Output = Result<SignUpResponse, ProviderError>> + Send;

    /// Ends the provider-side session.
    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Sends a password-reset link.
    fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Inserts or replaces the account's profile row.
    ///
    /// The hosted backend keeps profiles next to its accounts and
    /// reaches them through the same client, which is why this lives
    /// on the provider rather than on a separate store.
    fn upsert_profile(
        &self,
        profile: Profile,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}
