//! # TypeSecure
//!
//! Client core for a sensitive-data scanner.
//!
//! A user signs in through a hosted identity provider, submits text or
//! a file, and a remote classifier reports whether it contains
//! sensitive data (emails, card numbers, keys, ...). Results are kept
//! per user for the history and dashboard views.
//!
//! The crates underneath, bottom to top:
//!
//! ```text
//! typesecure-protocol   shapes on the wire (Identity, DetectionResponse, Codec)
//! typesecure-ratelimit  fixed-window attempt limiter
//! typesecure-session    SessionManager: who is signed in
//! typesecure-detect     Detector, RecordStore, SettingsStore seams; HttpDetector
//! typesecure            TypeSecure: composition root (this crate)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use typesecure::prelude::*;
//! use typesecure::session::memory::MemoryProvider;
//!
//! # async fn run() -> Result<(), TypeSecureError> {
//! typesecure::init_tracing();
//!
//! let app = TypeSecureBuilder::new()
//!     .build_http(MemoryProvider::default(), MemoryRecordStore::new())?;
//! app.start().await?;
//! app.sessions().login("ada@example.com", "correct-horse").await?;
//! let record = app.scan(DetectionRequest::Text("call me at 555-0100".into())).await?;
//! println!("sensitive: {}", record.is_sensitive);
//! # Ok(())
//! # }
//! ```

mod app;
mod config;
mod error;

pub use app::{TypeSecure, TypeSecureBuilder};
pub use config::AppConfig;
pub use error::TypeSecureError;

pub use typesecure_detect as detect;
pub use typesecure_protocol as protocol;
pub use typesecure_ratelimit as ratelimit;
pub use typesecure_session as session;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` (e.g. `RUST_LOG=typesecure_session=debug`)
/// and defaults to `info`. Calling it again is a no-op.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything an application embedding TypeSecure usually needs.
pub mod prelude {
    pub use crate::{AppConfig, TypeSecure, TypeSecureBuilder, TypeSecureError};

    pub use typesecure_detect::{
        DashboardStats, DetectError, DetectionRecord, DetectionSettings, Detector,
        DetectorConfig, MemoryRecordStore, RecordStore, SettingsStore, SettingsUpdate,
        StoreError,
    };
    #[cfg(feature = "http")]
    pub use typesecure_detect::HttpDetector;
    pub use typesecure_protocol::{
        DetectionRequest, DetectionResponse, Identity, Profile, UserId,
    };
    pub use typesecure_ratelimit::RateLimitConfig;
    pub use typesecure_session::{
        AuthError, ErrorKind, IdentityProvider, LimiterScope, Notice, NoticeLevel,
        Notifier, Registration, Session, SessionConfig, SessionManager, SessionState,
        SessionView, TracingNotifier, VerificationPolicy,
    };
}
