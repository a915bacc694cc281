//! In-process identity provider and notifier, for tests and the demo.
//!
//! [`MemoryProvider`] keeps accounts in a map and behaves like a hosted
//! provider from the outside: it issues sessions, pushes session
//! changes to subscribers, and can be told to fail, stall, or confirm
//! an email on demand. It is the only place where identities are
//! minted locally.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::mpsc;
use typesecure_protocol::{AuthEvent, Identity, Profile, ProviderSession, UserId};

use crate::{
    IdentityProvider, Notice, NoticeLevel, Notifier, ProviderError, SessionChange,
    SignUpRequest, SignUpResponse, Subscription,
};

/// How long issued access tokens claim to live.
const TOKEN_TTL_SECS: u64 = 3600;

/// Provider operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    CurrentSession,
    SignIn,
    SignUp,
    SignOut,
    ResetPassword,
    UpsertProfile,
}

/// Behavior switches for [`MemoryProvider`].
#[derive(Debug, Clone, Default)]
pub struct MemoryProviderOptions {
    /// New accounts must follow a verification link before they get a
    /// session. Sign-up then returns no session.
    pub require_confirmation: bool,
    /// Issue sessions to unverified accounts on password sign-in
    /// instead of rejecting with "Email not confirmed".
    pub allow_unconfirmed_sign_in: bool,
    /// Artificial round-trip time added to every async call.
    pub latency: Duration,
}

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct Inner {
    options: MemoryProviderOptions,
    /// Keyed by case-folded email.
    accounts: HashMap<String, Account>,
    current: Option<ProviderSession>,
    subscribers: Vec<mpsc::UnboundedSender<SessionChange>>,
    failures: HashMap<ProviderOp, VecDeque<ProviderError>>,
    calls: HashMap<ProviderOp, usize>,
    last_redirect: Option<String>,
    reset_requests: Vec<String>,
    profiles: HashMap<UserId, Profile>,
}

impl Inner {
    /// Counts the call and pops an injected failure, if any.
    fn enter(&mut self, op: ProviderOp) -> Result<(), ProviderError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn emit(&mut self, event: AuthEvent) {
        let change = SessionChange {
            event,
            session: self.current.clone(),
        };
        // Closed receivers are unsubscribed callers; forget them.
        self.subscribers
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn issue_session(&mut self, identity: Identity) -> ProviderSession {
        let session = ProviderSession {
            access_token: generate_token(),
            refresh_token: Some(generate_token()),
            expires_at: Some(unix_now() + TOKEN_TTL_SECS),
            user: identity,
        };
        self.current = Some(session.clone());
        session
    }
}

/// An identity provider that lives in memory.
///
/// Cheap to clone; clones share state, so a test can keep one handle
/// while the session manager owns another.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryProvider {
    /// Creates an empty provider with `options`.
    pub fn new(options: MemoryProviderOptions) -> Self {
        let inner = Inner {
            options,
            ..Inner::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Builder-style [`add_account`](Self::add_account).
    pub fn with_account(
        self,
        name: &str,
        email: &str,
        password: &str,
        verified: bool,
    ) -> Self {
        self.add_account(name, email, password, verified);
        self
    }

    /// Registers an account directly, bypassing sign-up.
    pub fn add_account(
        &self,
        name: &str,
        email: &str,
        password: &str,
        verified: bool,
    ) -> Identity {
        let identity = Identity {
            id: UserId(generate_token()),
            email: email.to_string(),
            name: Some(name.to_string()),
            avatar_url: None,
            email_confirmed_at: verified.then(confirmation_stamp),
        };
        self.lock().accounts.insert(
            email.to_lowercase(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
            },
        );
        identity
    }

    /// Makes `email` the persisted session, as if signed in during a
    /// previous run. Nothing is pushed.
    pub fn restore_session_for(&self, email: &str) -> Option<ProviderSession> {
        let mut inner = self.lock();
        let identity = inner.accounts.get(&email.to_lowercase())?.identity.clone();
        Some(inner.issue_session(identity))
    }

    /// Simulates the user following the verification link: marks the
    /// address verified, signs them in, and pushes `SignedIn`.
    pub fn confirm_email(&self, email: &str) -> Option<Identity> {
        let mut inner = self.lock();
        let account = inner.accounts.get_mut(&email.to_lowercase())?;
        account.identity.email_confirmed_at = Some(confirmation_stamp());
        let identity = account.identity.clone();
        inner.issue_session(identity.clone());
        inner.emit(AuthEvent::SignedIn);
        Some(identity)
    }

    /// Ends the current session provider-side and pushes `SignedOut`.
    pub fn expire_session(&self) {
        let mut inner = self.lock();
        inner.current = None;
        inner.emit(AuthEvent::SignedOut);
    }

    /// Rotates the current session's tokens and pushes `TokenRefreshed`.
    /// No-op without a session.
    pub fn refresh_session(&self) {
        let mut inner = self.lock();
        let Some(session) = inner.current.as_mut() else {
            return;
        };
        session.access_token = generate_token();
        session.expires_at = Some(unix_now() + TOKEN_TTL_SECS);
        inner.emit(AuthEvent::TokenRefreshed);
    }

    /// Pushes an arbitrary change to subscribers and makes `session`
    /// current.
    pub fn push(&self, event: AuthEvent, session: Option<ProviderSession>) {
        let mut inner = self.lock();
        inner.current = session;
        inner.emit(event);
    }

    /// Makes the next call of `op` fail with `error`. Queues up.
    pub fn fail_next(&self, op: ProviderOp, error: ProviderError) {
        self.lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Changes the artificial latency.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().options.latency = latency;
    }

    /// How many times `op` was called.
    pub fn calls(&self, op: ProviderOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Subscriptions still open.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    /// The stored profile row of `id`.
    pub fn profile(&self, id: &UserId) -> Option<Profile> {
        self.lock().profiles.get(id).cloned()
    }

    /// The session the provider currently holds.
    pub fn current(&self) -> Option<ProviderSession> {
        self.lock().current.clone()
    }

    /// Redirect target sent with the last sign-up or reset request.
    pub fn last_redirect(&self) -> Option<String> {
        self.lock().last_redirect.clone()
    }

    /// Addresses password resets were requested for, in order.
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().reset_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn latency(&self) -> Duration {
        self.lock().options.latency
    }

    async fn round_trip(&self) {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl IdentityProvider for MemoryProvider {
    async fn current_session(
        &self,
    ) -> Result<Option<ProviderSession>, ProviderError> {
        // Snapshot now, deliver after the round trip: a slow answer
        // describes the state at the time it was produced.
        let snapshot = {
            let mut inner = self.lock();
            inner.enter(ProviderOp::CurrentSession)?;
            inner.current.clone()
        };
        self.round_trip().await;
        Ok(snapshot)
    }

    fn subscribe(&self) -> Subscription {
        let (tx, subscription) = Subscription::channel();
        let mut inner = self.lock();
        let initial = SessionChange {
            event: AuthEvent::InitialSession,
            session: inner.current.clone(),
        };
        if tx.send(initial).is_ok() {
            inner.subscribers.push(tx);
        }
        subscription
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<ProviderSession>, ProviderError> {
        let outcome = {
            let mut inner = self.lock();
            inner.enter(ProviderOp::SignIn)?;
            let allow_unconfirmed = inner.options.allow_unconfirmed_sign_in;
            match inner.accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => {
                    if !account.identity.is_verified() && !allow_unconfirmed {
                        Err(ProviderError::rejected(400, "Email not confirmed"))
                    } else {
                        let identity = account.identity.clone();
                        let session = inner.issue_session(identity);
                        inner.emit(AuthEvent::SignedIn);
                        Ok(Some(session))
                    }
                }
                _ => Err(ProviderError::rejected(400, "Invalid login credentials")),
            }
        };
        self.round_trip().await;
        outcome
    }

    async fn sign_up(
        &self,
        request: SignUpRequest,
    ) -> Result<SignUpResponse, ProviderError> {
        let outcome = {
            let mut inner = self.lock();
            inner.enter(ProviderOp::SignUp)?;
            inner.last_redirect = request.redirect_to.clone();
            let key = request.email.to_lowercase();
            if !is_plausible_email(&request.email) {
                Err(ProviderError::rejected(
                    400,
                    "Unable to validate email address: invalid format",
                ))
            } else if inner.accounts.contains_key(&key) {
                Err(ProviderError::rejected(422, "User already registered"))
            } else {
                let verified = !inner.options.require_confirmation;
                let identity = Identity {
                    id: UserId(generate_token()),
                    email: request.email.clone(),
                    name: Some(request.metadata.full_name.clone()),
                    avatar_url: None,
                    email_confirmed_at: verified.then(confirmation_stamp),
                };
                inner.accounts.insert(
                    key,
                    Account {
                        identity: identity.clone(),
                        password: request.password,
                    },
                );
                let session = if verified {
                    let session = inner.issue_session(identity.clone());
                    inner.emit(AuthEvent::SignedIn);
                    Some(session)
                } else {
                    None
                };
                Ok(SignUpResponse {
                    identity: Some(identity),
                    session,
                })
            }
        };
        self.round_trip().await;
        outcome
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        {
            let mut inner = self.lock();
            inner.enter(ProviderOp::SignOut)?;
            inner.current = None;
            inner.emit(AuthEvent::SignedOut);
        }
        self.round_trip().await;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), ProviderError> {
        {
            let mut inner = self.lock();
            inner.enter(ProviderOp::ResetPassword)?;
            if !is_plausible_email(email) {
                return Err(ProviderError::rejected(
                    400,
                    "Unable to validate email address: invalid format",
                ));
            }
            inner.last_redirect = redirect_to.map(str::to_string);
            // Unknown addresses succeed too, so the endpoint can't be
            // used to find out which accounts exist.
            inner.reset_requests.push(email.to_string());
        }
        self.round_trip().await;
        Ok(())
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<(), ProviderError> {
        {
            let mut inner = self.lock();
            inner.enter(ProviderOp::UpsertProfile)?;
            inner.profiles.insert(profile.id.clone(), profile);
        }
        self.round_trip().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// A [`Notifier`] that keeps every notice for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices so far, oldest first.
    pub fn notices(&self) -> Vec<Notice> {
        self.lock().clone()
    }

    /// Only the error notices.
    pub fn errors(&self) -> Vec<Notice> {
        self.lock()
            .iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .cloned()
            .collect()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notice>> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.lock().push(notice);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Random 32-character hex string (128 bits), used for ids and tokens.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Verification timestamp. Opaque to consumers; only presence matters.
fn confirmation_stamp() -> String {
    format!("unix:{}", unix_now())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_is_plausible_email() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada.example.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_session_first() {
        let provider = MemoryProvider::default()
            .with_account("Ada", "ada@example.com", "hunter22", true);
        provider.restore_session_for("ada@example.com");

        let mut sub = provider.subscribe();
        let first = sub.next().await.unwrap();

        assert_eq!(first.event, AuthEvent::InitialSession);
        assert_eq!(first.session.unwrap().user.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_forgotten() {
        let provider = MemoryProvider::default();
        let sub = provider.subscribe();
        assert_eq!(provider.subscriber_count(), 1);

        drop(sub);

        assert_eq!(provider.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_used_once() {
        let provider = MemoryProvider::default();
        provider.fail_next(
            ProviderOp::SignOut,
            ProviderError::Transport("offline".into()),
        );

        assert!(provider.sign_out().await.is_err());
        assert!(provider.sign_out().await.is_ok());
        assert_eq!(provider.calls(ProviderOp::SignOut), 2);
    }

    #[tokio::test]
    async fn test_sign_in_unconfirmed_rejected_by_default() {
        let provider = MemoryProvider::default()
            .with_account("Ada", "ada@example.com", "hunter22", false);

        let err = provider
            .sign_in_with_password("ada@example.com", "hunter22")
            .await
            .unwrap_err();

        assert_eq!(err, ProviderError::rejected(400, "Email not confirmed"));
    }

    #[tokio::test]
    async fn test_upsert_profile_replaces_row() {
        let provider = MemoryProvider::default();
        let ada = provider.add_account("Ada", "ada@example.com", "hunter22", true);
        let mut profile = Profile::for_identity(&ada, 1);

        provider.upsert_profile(profile.clone()).await.unwrap();
        profile.full_name = Some("Ada Lovelace".into());
        profile.updated_at = 2;
        provider.upsert_profile(profile.clone()).await.unwrap();

        assert_eq!(provider.profile(&ada.id), Some(profile));
        assert_eq!(provider.calls(ProviderOp::UpsertProfile), 2);
    }

    #[test]
    fn test_recording_notifier_take_drains() {
        let notifier = RecordingNotifier::new();
        notifier.notify(Notice::success("a", "b"));

        assert_eq!(notifier.take().len(), 1);
        assert!(notifier.notices().is_empty());
    }
}
