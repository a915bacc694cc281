//! The session manager: the single source of truth for who is logged in.
//!
//! It is responsible for:
//! - Restoring a persisted session at startup
//! - Listening to provider-pushed session changes for its lifetime
//! - Mediating login, registration, logout and password reset
//! - Gating login attempts through a rate limiter
//! - Keeping the account's profile row written on sign-up and sign-in
//! - Turning every failure into exactly one user notice
//!
//! # Concurrency note
//!
//! The session value lives in a `tokio::sync::watch` channel. Every
//! write goes through `send_modify`/`send_if_modified`, whose closures
//! run under the channel's lock, so writes from the listener task and
//! from manager methods are serialized. Readers get a [`SessionView`]
//! and can't write at all.
//!
//! A slow startup restore must not clobber a newer pushed state. Each
//! identity write bumps a generation counter stored in the session;
//! the restore result is applied only if the counter hasn't moved
//! since the restore started.
//!
//! # Ownership
//!
//! The listener task is spawned with `tokio::spawn`, which requires a
//! `'static` future: it can't borrow from the manager. So everything
//! the task touches is behind an `Arc` (the shared session state and
//! the provider) and the task holds its own clones. The manager keeps
//! the task's `JoinHandle` and aborts it on shutdown or drop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use typesecure_protocol::{AuthEvent, Identity, Profile};
use typesecure_ratelimit::{KeyedRateLimiter, RateLimiter};

use crate::error::{classify, Operation};
use crate::{
    AuthError, IdentityProvider, LimiterScope, Notice, Notifier, ProviderError,
    Session, SessionChange, SessionConfig, SessionState, SessionView, SignUpMetadata,
    SignUpRequest, Subscription, TracingNotifier,
};

/// Ceiling on addresses tracked by a per-address login gate.
const MAX_TRACKED_ADDRESSES: usize = 1024;

/// Outcome of a successful [`SessionManager::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// The account the provider created.
    pub identity: Identity,
    /// `true` when the user must follow a verification link before a
    /// session is issued.
    pub confirmation_required: bool,
}

// ---------------------------------------------------------------------------
// Login gate
// ---------------------------------------------------------------------------

/// The login rate limiter, scoped per [`LimiterScope`].
enum LoginGate {
    Global(RateLimiter),
    PerAddress(KeyedRateLimiter<String>),
}

impl LoginGate {
    fn new(config: &SessionConfig) -> Self {
        match config.limiter_scope {
            LimiterScope::Global => {
                Self::Global(RateLimiter::new(config.login_rate_limit))
            }
            LimiterScope::PerAddress => Self::PerAddress(
                KeyedRateLimiter::new(config.login_rate_limit)
                    .with_max_keys(MAX_TRACKED_ADDRESSES),
            ),
        }
    }

    /// `Err(wait_secs)` when the attempt is denied.
    fn try_acquire(&mut self, email: &str) -> Result<(), u64> {
        match self {
            Self::Global(limiter) => {
                if limiter.try_acquire() {
                    Ok(())
                } else {
                    Err(limiter.remaining_cooldown_secs())
                }
            }
            Self::PerAddress(limiters) => {
                let key = email.trim().to_lowercase();
                if limiters.try_acquire(&key) {
                    Ok(())
                } else {
                    Err(limiters.remaining_cooldown_secs(&key))
                }
            }
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Global(limiter) => limiter.reset(),
            Self::PerAddress(limiters) => limiters.reset_all(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the manager and its listener task.
struct Shared {
    tx: watch::Sender<Session>,
    config: SessionConfig,
    /// Set on teardown; nothing is applied afterwards.
    closed: AtomicBool,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_identity(&self, identity: Option<Identity>) {
        self.tx.send_if_modified(|s| s.set_identity(identity));
    }

    /// Applies a provider push, filtered through the verification policy.
    /// Returns the identity that was applied.
    fn apply_change(&self, change: SessionChange) -> Option<Identity> {
        if self.is_closed() {
            return None;
        }
        let event = change.event;
        let identity = match change.session.map(|s| s.user) {
            Some(user) if !self.config.admits(&user) => {
                tracing::debug!(
                    user_id = %user.id,
                    %event,
                    "ignoring unverified principal from provider push"
                );
                None
            }
            other => other,
        };
        let authenticated = identity.is_some();
        self.set_identity(identity.clone());
        tracing::info!(%event, authenticated, "applied provider session change");
        identity
    }

    /// Applies a restore result unless something newer already landed.
    /// Returns whether it was applied.
    fn apply_restore(&self, started_at: u64, identity: Option<Identity>) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut applied = false;
        self.tx.send_if_modified(|s| {
            if s.generation() != started_at {
                return false;
            }
            applied = true;
            s.set_identity(identity)
        });
        applied
    }
}

/// Marks a provider call in flight for as long as it lives, so
/// `is_loading` clears on every exit path, including a dropped future.
struct LoadingGuard<'a> {
    tx: &'a watch::Sender<Session>,
}

impl<'a> LoadingGuard<'a> {
    fn new(tx: &'a watch::Sender<Session>) -> Self {
        tx.send_modify(Session::begin_call);
        Self { tx }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_modify(Session::end_call);
    }
}

/// Clears the local identity when dropped. Logout holds one so the
/// session ends up signed out however the provider call ends.
struct SignOutGuard<'a> {
    shared: &'a Shared,
}

impl Drop for SignOutGuard<'_> {
    fn drop(&mut self) {
        self.shared.set_identity(None);
    }
}

/// Forwards provider pushes into the shared session until the provider
/// hangs up or the manager is torn down.
///
/// Every `SignedIn` also refreshes the profile row. That write runs on
/// its own task so a slow backend never holds up the next push.
async fn listen<P: IdentityProvider>(
    mut subscription: Subscription,
    shared: Arc<Shared>,
    provider: Arc<P>,
) {
    while let Some(change) = subscription.next().await {
        if shared.is_closed() {
            break;
        }
        let event = change.event;
        let applied = shared.apply_change(change);
        if let (AuthEvent::SignedIn, Some(identity)) = (event, applied) {
            let profile = Profile::for_identity(&identity, unix_millis());
            let provider = Arc::clone(&provider);
            let timeout = shared.config.provider_timeout();
            tokio::spawn(async move { store_profile(&*provider, profile, timeout).await });
        }
    }
    tracing::debug!("provider subscription closed");
}

/// Writes `profile`, logging instead of failing: a missing profile row
/// never blocks signing in.
async fn store_profile<P: IdentityProvider>(provider: &P, profile: Profile, timeout: Duration) {
    let user_id = profile.id.clone();
    match tokio::time::timeout(timeout, provider.upsert_profile(profile)).await {
        Ok(Ok(())) => tracing::debug!(%user_id, "profile stored"),
        Ok(Err(err)) => tracing::warn!(%user_id, error = %err, "could not store profile"),
        Err(_) => tracing::warn!(%user_id, "profile write timed out"),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the authentication lifecycle.
///
/// Construct one at the application's composition root and pass it
/// (or [`SessionView`]s from it) to whatever needs it.
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ initialize() ──→ login() / register() / logout() ... ──→ shutdown()
///   │            │                                                     │
///   ▼            ▼                                                     ▼
/// [Initializing] restore + subscribe                       subscription released
/// ```
pub struct SessionManager<P: IdentityProvider, N: Notifier = TracingNotifier> {
    provider: Arc<P>,
    notifier: N,
    shared: Arc<Shared>,
    gate: Mutex<LoginGate>,
    started: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<P: IdentityProvider> SessionManager<P> {
    /// Creates a manager that logs notices through `tracing`.
    pub fn new(provider: P, config: SessionConfig) -> Self {
        Self::with_notifier(provider, config, TracingNotifier)
    }
}

impl<P: IdentityProvider, N: Notifier> SessionManager<P, N> {
    /// Creates a manager that shows notices through `notifier`.
    ///
    /// The session starts in `Initializing`; call
    /// [`initialize`](Self::initialize) to resolve it.
    pub fn with_notifier(provider: P, config: SessionConfig, notifier: N) -> Self {
        let gate = LoginGate::new(&config);
        let (tx, _rx) = watch::channel(Session::initial());
        Self {
            provider: Arc::new(provider),
            notifier,
            shared: Arc::new(Shared {
                tx,
                config,
                closed: AtomicBool::new(false),
            }),
            gate: Mutex::new(gate),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Restores any existing session and starts listening for
    /// provider-pushed changes.
    ///
    /// Only the first call does anything; `Initializing` is entered
    /// exactly once. If a push lands while the restore is in flight,
    /// the push wins and the restore result is dropped.
    ///
    /// After [`shutdown`](Self::shutdown) the provider isn't contacted:
    /// a session still `Initializing` resolves as signed out.
    ///
    /// # Errors
    /// Provider failure or timeout during the restore. The session is
    /// then resolved as signed out (unless a push decided otherwise),
    /// and the subscription stays active.
    pub async fn initialize(&self) -> Result<(), AuthError> {
        if self.shared.is_closed() {
            tracing::debug!("initialize after shutdown, resolving signed out");
            self.resolve_if_initializing();
            return Ok(());
        }
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("session manager already initialized");
            return Ok(());
        }

        let subscription = self.provider.subscribe();
        let started_at = self.shared.tx.borrow().generation();
        let handle = tokio::spawn(listen(
            subscription,
            Arc::clone(&self.shared),
            Arc::clone(&self.provider),
        ));
        *self.lock_listener() = Some(handle);
        // A shutdown that ran since the check above took no handle.
        if self.shared.is_closed() {
            self.shutdown();
        }

        let restored = self
            .call(Operation::Restore, self.provider.current_session())
            .await;
        let (identity, outcome) = match restored {
            Ok(session) => (session.map(|s| s.user), Ok(())),
            Err(err) => (None, Err(err)),
        };
        let identity = identity.filter(|user| self.shared.config.admits(user));
        let authenticated = identity.is_some();

        if self.shared.apply_restore(started_at, identity) {
            tracing::info!(authenticated, "session restored");
        } else if self.shared.is_closed() {
            self.resolve_if_initializing();
        } else {
            tracing::debug!("restore result superseded by a provider push");
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(err) => self.fail(Operation::Restore, err),
        }
    }

    /// Signs in with email and password.
    ///
    /// Empty fields and a closed rate-limit gate fail before the
    /// provider is contacted. Under
    /// [`VerificationPolicy::Strict`](crate::VerificationPolicy::Strict)
    /// an unverified principal is refused even though the provider
    /// accepted the credentials.
    ///
    /// # Errors
    /// `MissingField`, `RateLimited`, `UnverifiedAccount`, or the
    /// classified provider failure. The session is untouched on error.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let op = Operation::Login;
        if email.trim().is_empty() {
            return self.fail(op, AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return self.fail(op, AuthError::MissingField("password"));
        }

        let gate = self.lock_gate().try_acquire(email);
        if let Err(retry_after_secs) = gate {
            tracing::info!(retry_after_secs, "login attempt rate limited");
            return self.fail(op, AuthError::RateLimited { retry_after_secs });
        }

        let session = match self
            .call(op, self.provider.sign_in_with_password(email.trim(), password))
            .await
        {
            Ok(Some(session)) => session,
            Ok(None) => {
                return self.fail(
                    op,
                    AuthError::Unknown("provider issued no session".into()),
                );
            }
            Err(err) => return self.fail(op, err),
        };

        if !self.shared.config.admits(&session.user) {
            tracing::warn!(
                user_id = %session.user.id,
                "login refused: email not verified"
            );
            // Don't leave a provider session behind that we refuse to honor.
            if let Err(err) = self
                .call(Operation::Logout, self.provider.sign_out())
                .await
            {
                tracing::debug!(error = %err, "could not discard unverified provider session");
            }
            return self.fail(op, AuthError::UnverifiedAccount);
        }

        let identity = session.user;
        self.shared.set_identity(Some(identity.clone()));
        tracing::info!(user_id = %identity.id, "login succeeded");
        self.notifier.notify(Notice::success(
            "Welcome back",
            format!("Signed in as {}.", identity.display_name()),
        ));
        Ok(identity)
    }

    /// Creates an account.
    ///
    /// Anyone signed in is signed out first (best effort), so the new
    /// account never inherits a previous user's session. The new
    /// session itself, when the provider issues one right away, reaches
    /// us through the push subscription like any other sign-in.
    ///
    /// After the provider creates the account its profile row is
    /// written. A failed profile write is logged and doesn't fail the
    /// registration.
    ///
    /// # Errors
    /// `MissingField` and `WeakSecret` before any call; otherwise
    /// `DuplicateAccount`, `RateLimited`, `MalformedAddress`,
    /// `ProviderUnavailable`, or `Unknown`.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Registration, AuthError> {
        let op = Operation::Register;
        let (name, email) = (name.trim(), email.trim());
        if name.is_empty() {
            return self.fail(op, AuthError::MissingField("name"));
        }
        if email.is_empty() {
            return self.fail(op, AuthError::MissingField("email"));
        }
        if password.is_empty() {
            return self.fail(op, AuthError::MissingField("password"));
        }
        let min_len = self.shared.config.min_password_len;
        if password.chars().count() < min_len {
            return self.fail(op, AuthError::WeakSecret { min_len });
        }

        if self.shared.tx.borrow().is_authenticated() {
            tracing::info!("signing out the current user before registering");
            let _clear = SignOutGuard {
                shared: &self.shared,
            };
            if let Err(err) = self
                .call(Operation::Logout, self.provider.sign_out())
                .await
            {
                tracing::debug!(error = %err, "sign-out before registration failed");
            }
        }

        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            metadata: SignUpMetadata {
                full_name: name.to_string(),
            },
            redirect_to: self.shared.config.email_redirect_to.clone(),
        };
        let response = match self.call(op, self.provider.sign_up(request)).await {
            Ok(response) => response,
            Err(err) => return self.fail(op, err),
        };
        let Some(identity) = response.identity else {
            return self.fail(
                op,
                AuthError::Unknown("sign-up response carried no user".into()),
            );
        };

        let profile = Profile {
            full_name: Some(name.to_string()),
            ..Profile::for_identity(&identity, unix_millis())
        };
        {
            let _loading = LoadingGuard::new(&self.shared.tx);
            store_profile(&*self.provider, profile, self.shared.config.provider_timeout())
                .await;
        }

        let confirmation_required = response.session.is_none();
        tracing::info!(
            user_id = %identity.id,
            confirmation_required,
            "account registered"
        );
        let message = if confirmation_required {
            "Check your email for a verification link."
        } else {
            "Your account is ready."
        };
        self.notifier
            .notify(Notice::success("Account created", message));
        Ok(Registration {
            identity,
            confirmation_required,
        })
    }

    /// Signs out.
    ///
    /// The local session is cleared whatever the provider says: a stale
    /// "signed in" after the user asked to leave is the worse failure.
    ///
    /// # Errors
    /// The classified provider failure, reported after clearing.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let op = Operation::Logout;
        let clear = SignOutGuard {
            shared: &self.shared,
        };
        let result = self.call(op, self.provider.sign_out()).await;
        drop(clear);

        match result {
            Ok(()) => {
                tracing::info!("logged out");
                self.notifier
                    .notify(Notice::success("Signed out", "You have been signed out."));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "provider sign-out failed, local session cleared anyway");
                self.fail(op, err)
            }
        }
    }

    /// Asks the provider to send a password-reset link.
    ///
    /// # Errors
    /// `MissingField`, `MalformedAddress`, or another classified
    /// provider failure.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let op = Operation::PasswordReset;
        let email = email.trim();
        if email.is_empty() {
            return self.fail(op, AuthError::MissingField("email"));
        }
        let redirect_to = self.shared.config.email_redirect_to.as_deref();
        if let Err(err) = self
            .call(op, self.provider.reset_password_for_email(email, redirect_to))
            .await
        {
            return self.fail(op, err);
        }
        tracing::info!("password reset requested");
        self.notifier.notify(Notice::success(
            "Reset link sent",
            "Check your email for a password reset link.",
        ));
        Ok(())
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.shared.tx.borrow().clone()
    }

    /// A read-only view that can wait for changes.
    pub fn subscribe(&self) -> SessionView {
        SessionView::new(self.shared.tx.subscribe())
    }

    /// Forgets all login attempts. Administrative; the login path never
    /// calls this itself.
    pub fn reset_rate_limit(&self) {
        self.lock_gate().reset();
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// The underlying identity provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Releases the provider subscription. Afterwards no push and no
    /// in-flight restore result is applied, and
    /// [`initialize`](Self::initialize) no longer contacts the provider.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("session manager shutting down");
        }
        if let Some(handle) = self.lock_listener().take() {
            handle.abort();
        }
    }

    // -- helpers ----------------------------------------------------------

    /// Leaves `Initializing` as signed out; any other state is kept.
    fn resolve_if_initializing(&self) {
        self.shared.tx.send_if_modified(|s| {
            s.state() == SessionState::Initializing && s.set_identity(None)
        });
    }

    /// Runs one provider call with the loading flag held and the
    /// configured timeout applied, classifying any failure.
    async fn call<T>(
        &self,
        op: Operation,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, AuthError> {
        let _loading = LoadingGuard::new(&self.shared.tx);
        let timeout = self.shared.config.provider_timeout();
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::debug!(%op, error = %err, "provider call failed");
                Err(classify(err, op, self.fallback_retry_secs()))
            }
            Err(_) => {
                tracing::warn!(
                    %op,
                    timeout_ms = self.shared.config.provider_timeout_ms,
                    "provider call timed out"
                );
                Err(AuthError::ProviderUnavailable(format!(
                    "{op} timed out after {} ms",
                    self.shared.config.provider_timeout_ms
                )))
            }
        }
    }

    /// Reports `err` to the user once and returns it.
    fn fail<T>(&self, op: Operation, err: AuthError) -> Result<T, AuthError> {
        tracing::warn!(%op, kind = ?err.kind(), error = %err, "session operation failed");
        self.notifier.notify(Notice::error(
            err.kind(),
            op.failure_title(),
            err.user_message(),
        ));
        Err(err)
    }

    /// Wait to suggest when the provider rate-limits without a hint.
    fn fallback_retry_secs(&self) -> u64 {
        let window = self.shared.config.login_rate_limit.window();
        window.as_secs() + u64::from(window.subsec_nanos() > 0)
    }

    fn lock_gate(&self) -> MutexGuard<'_, LoginGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: IdentityProvider, N: Notifier> Drop for SessionManager<P, N> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        if let Some(handle) = self.lock_listener().take() {
            handle.abort();
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
