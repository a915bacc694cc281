//! Session types: the data structures that describe who is logged in.
//!
//! A "session" here is the client's view of authentication. It tracks:
//! - WHO is signed in (an [`Identity`], or nobody)
//! - WHETHER a check or transition is in flight (`is_loading`)
//! - WHERE it is in its lifecycle ([`SessionState`])

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use typesecure_protocol::Identity;
use typesecure_ratelimit::RateLimitConfig;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Whether login requires a verified email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    /// A principal without `email_confirmed_at` is refused, even if the
    /// provider accepted the credentials.
    Strict,
    /// Whatever the provider authenticates is accepted.
    #[default]
    Permissive,
}

/// Who shares a login attempt budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterScope {
    /// One budget for every login made through this manager.
    #[default]
    Global,
    /// One budget per (case-folded) email address.
    PerAddress,
}

/// Configuration for session behavior.
///
/// Sensible defaults are provided; override just the fields you care
/// about with struct update syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Email verification requirement for login.
    pub verification: VerificationPolicy,

    /// Minimum password length for registration, in characters.
    pub min_password_len: usize,

    /// Callback location for verification and reset links.
    pub email_redirect_to: Option<String>,

    /// Upper bound on each identity provider call, in milliseconds.
    /// Expiry surfaces as `ProviderUnavailable`.
    pub provider_timeout_ms: u64,

    /// Login attempt budget.
    pub login_rate_limit: RateLimitConfig,

    /// Who shares the login budget.
    pub limiter_scope: LimiterScope,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verification: VerificationPolicy::default(),
            min_password_len: 6,
            email_redirect_to: None,
            provider_timeout_ms: 15_000,
            login_rate_limit: RateLimitConfig::default(),
            limiter_scope: LimiterScope::default(),
        }
    }
}

impl SessionConfig {
    /// Provider call timeout as a `Duration`.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    /// Whether `identity` may be treated as signed in under this config.
    pub(crate) fn admits(&self, identity: &Identity) -> bool {
        match self.verification {
            VerificationPolicy::Strict => identity.is_verified(),
            VerificationPolicy::Permissive => true,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the session.
///
/// ```text
///   Initializing ──(restore / first push)──→ Unauthenticated ⇄ Authenticated
///                                    └─────→ Authenticated
/// ```
///
/// - **Initializing**: entered exactly once, at startup, before the
///   restoration check resolves. Never re-entered.
/// - **Unauthenticated**: nobody is signed in.
/// - **Authenticated**: an identity is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Unauthenticated,
    Authenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Unauthenticated => write!(f, "Unauthenticated"),
            Self::Authenticated => write!(f, "Authenticated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Snapshot of the authentication state.
///
/// Fields are private: only the session manager writes them. Everyone
/// else reads through accessors, and `is_authenticated` is computed
/// from `identity` so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
    initializing: bool,
    /// Provider round-trips currently in flight.
    pending: usize,
    /// Bumped on every identity write; lets a slow restore detect that
    /// it has been superseded.
    generation: u64,
}

impl Session {
    /// The startup state: nobody signed in, loading, initializing.
    pub(crate) fn initial() -> Self {
        Self {
            identity: None,
            initializing: true,
            pending: 0,
            generation: 0,
        }
    }

    /// The signed-in principal, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Exactly `identity().is_some()`.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// `true` while initializing or while any provider call is in flight.
    pub fn is_loading(&self) -> bool {
        self.initializing || self.pending > 0
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.initializing {
            SessionState::Initializing
        } else if self.identity.is_some() {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the identity, leaves `Initializing`, bumps the generation.
    ///
    /// Returns `true` if anything observable changed.
    pub(crate) fn set_identity(&mut self, identity: Option<Identity>) -> bool {
        self.generation += 1;
        let changed = self.initializing || self.identity != identity;
        self.identity = identity;
        self.initializing = false;
        changed
    }

    pub(crate) fn begin_call(&mut self) {
        self.pending += 1;
    }

    pub(crate) fn end_call(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

// ---------------------------------------------------------------------------
// SessionView
// ---------------------------------------------------------------------------

/// Read-only handle on the session, for views that render from it.
///
/// Cheap to clone. Holds no way to mutate the session.
#[derive(Debug, Clone)]
pub struct SessionView {
    rx: watch::Receiver<Session>,
}

impl SessionView {
    pub(crate) fn new(rx: watch::Receiver<Session>) -> Self {
        Self { rx }
    }

    /// Current snapshot.
    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    /// Waits for the next change and returns the new snapshot.
    /// `None` once the manager is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds and returns that snapshot.
    /// `None` if the manager is dropped first.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&Session) -> bool,
    ) -> Option<Session> {
        let session = self.rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typesecure_protocol::UserId;

    fn ada(verified: bool) -> Identity {
        Identity {
            id: UserId("u-ada".into()),
            email: "ada@example.com".into(),
            name: None,
            avatar_url: None,
            email_confirmed_at: verified.then(|| "2024-01-01T00:00:00Z".into()),
        }
    }

    #[test]
    fn test_initial_session_is_loading_and_initializing() {
        let session = Session::initial();
        assert!(session.is_loading());
        assert!(!session.is_authenticated());
        assert_eq!(session.state(), SessionState::Initializing);
    }

    #[test]
    fn test_set_identity_leaves_initializing_and_authenticates() {
        let mut session = Session::initial();

        assert!(session.set_identity(Some(ada(true))));

        assert_eq!(session.state(), SessionState::Authenticated);
        assert!(session.is_authenticated());
        assert!(!session.is_loading());
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn test_set_same_identity_reports_unchanged_but_bumps_generation() {
        let mut session = Session::initial();
        session.set_identity(None);

        assert!(!session.set_identity(None));
        assert_eq!(session.generation(), 2);
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_pending_calls_drive_loading() {
        let mut session = Session::initial();
        session.set_identity(None);

        session.begin_call();
        session.begin_call();
        session.end_call();
        assert!(session.is_loading());
        session.end_call();
        assert!(!session.is_loading());
        // Never underflows.
        session.end_call();
        assert!(!session.is_loading());
    }

    #[test]
    fn test_strict_policy_admits_only_verified() {
        let config = SessionConfig {
            verification: VerificationPolicy::Strict,
            ..SessionConfig::default()
        };
        assert!(config.admits(&ada(true)));
        assert!(!config.admits(&ada(false)));
    }

    #[test]
    fn test_permissive_policy_admits_unverified() {
        let config = SessionConfig::default();
        assert!(config.admits(&ada(false)));
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.verification, VerificationPolicy::Permissive);
        assert_eq!(config.min_password_len, 6);
        assert_eq!(config.provider_timeout(), Duration::from_secs(15));
        assert_eq!(config.limiter_scope, LimiterScope::Global);
    }

    #[test]
    fn test_session_config_partial_json_keeps_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"verification": "strict", "limiter_scope": "per_address"}"#,
        )
        .unwrap();
        assert_eq!(config.verification, VerificationPolicy::Strict);
        assert_eq!(config.limiter_scope, LimiterScope::PerAddress);
        assert_eq!(config.min_password_len, 6);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Initializing.to_string(), "Initializing");
        assert_eq!(SessionState::Authenticated.to_string(), "Authenticated");
    }
}
