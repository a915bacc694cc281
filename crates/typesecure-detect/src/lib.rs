//! Detection service client and scan record storage for TypeSecure.
//!
//! Provides the [`Detector`] and [`RecordStore`] traits that abstract
//! over the two remote dependencies of a scan: the classifier that
//! decides whether text is sensitive, and the table scan results are
//! written to. [`SettingsStore`] sits next to them for the per-user
//! scanner preferences.
//!
//! # Async traits without boxing
//!
//! The trait methods are declared as
//! `fn ...(&self, ..) -> impl Future<Output = ..> + Send` rather than
//! `async fn`. Implementors still write plain `async fn` bodies; the
//! explicit signature only adds the `Send` promise, which callers need
//! to hold these futures across `.await` inside `tokio::spawn`ed tasks.
//! The `allow(async_fn_in_trait)` below silences the lint that suggests
//! exactly this spelling.
//!
//! # Feature Flags
//!
//! - `http` (default): [`HttpDetector`], a `reqwest` client for the
//!   hosted `POST /api/detect` endpoint

#![allow(async_fn_in_trait)]

mod config;
mod error;
#[cfg(feature = "http")]
mod http;
mod settings;
mod stats;
mod store;

pub use config::DetectorConfig;
pub use error::{DetectError, StoreError};
#[cfg(feature = "http")]
pub use http::HttpDetector;
pub use settings::{DetectionSettings, SettingsUpdate};
pub use stats::DashboardStats;
pub use store::{DetectionRecord, MemoryRecordStore};

use std::future::Future;

use typesecure_protocol::{DetectionRequest, DetectionResponse, UserId};

/// Classifies text as sensitive or not.
pub trait Detector: Send + Sync + 'static {
    /// Sends one scan to the classifier and returns its verdict.
    ///
    /// File requests are classified by their (UTF-8 decoded) contents.
    fn detect(
        &self,
        request: &DetectionRequest,
    ) -> impl Future<Output = Result<DetectionResponse, DetectError>> + Send;
}

/// Append-only storage of scan results, keyed by user.
pub trait RecordStore: Send + Sync + 'static {
    /// Appends a record.
    fn insert(
        &self,
        record: DetectionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Up to `limit` records of `user_id`, newest first.
    fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<DetectionRecord>, StoreError>> + Send;
}

/// Per-user [`DetectionSettings`], one row per user.
pub trait SettingsStore: Send + Sync + 'static {
    /// The saved settings of `user_id`; `None` if they never saved any.
    fn load_settings(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<DetectionSettings>, StoreError>> + Send;

    /// Inserts or replaces the settings of `user_id`.
    fn save_settings(
        &self,
        user_id: &UserId,
        settings: &DetectionSettings,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
