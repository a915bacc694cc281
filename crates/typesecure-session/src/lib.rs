//! Authentication session management for TypeSecure.
//!
//! This crate owns the answer to "who is signed in?":
//!
//! 1. **Identity provider seam** ([`IdentityProvider`] trait): the hosted
//!    auth service, or [`memory::MemoryProvider`] in tests
//! 2. **Session tracking** ([`SessionManager`]): restore at startup,
//!    provider pushes, login / register / logout / password reset, and
//!    the profile row written on sign-up and sign-in
//! 3. **Login gating**: attempts pass through a rate limiter before the
//!    provider ever sees them
//! 4. **User notices** ([`Notifier`]): one per failed operation
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← gates scans on session.is_authenticated()
//!     ↕
//! Session Layer (this crate)  ← manages identity and auth transitions
//!     ↕
//! Protocol + RateLimit (below)  ← Identity/AuthEvent types, RateLimiter
//! ```

#![allow(async_fn_in_trait)]

// Every module is private except `memory`. The in-memory provider and
// the recording notifier are test doubles other crates use in their
// own tests, and keeping them under `session::memory::` rather than at
// the root makes it obvious at the call site that they aren't the
// production path. The rest is re-exported below.

mod error;
mod manager;
pub mod memory;
mod notify;
mod provider;
mod session;

pub use error::{AuthError, ErrorKind};
pub use manager::{Registration, SessionManager};
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use provider::{
    IdentityProvider, ProviderError, SessionChange, SignUpMetadata, SignUpRequest,
    SignUpResponse, Subscription,
};
pub use session::{
    LimiterScope, Session, SessionConfig, SessionState, SessionView, VerificationPolicy,
};
