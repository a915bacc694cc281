//! `TypeSecure` builder and application root.
//!
//! This is the entry point for embedding TypeSecure. It ties together
//! all the layers: identity provider → session → detection → history,
//! plus the signed-in user's scanner settings.
//!
//! One `TypeSecure` owns exactly one [`SessionManager`]. Everything that
//! needs to know who is signed in asks it (or a [`SessionView`] from
//! it); there is no global session.
//!
//! [`SessionView`]: typesecure_session::SessionView

use std::sync::Arc;

use typesecure_detect::{
    DashboardStats, DetectionRecord, DetectionSettings, Detector, DetectorConfig,
    RecordStore, SettingsStore, SettingsUpdate,
};
use typesecure_protocol::{DetectionRequest, Identity};
use typesecure_session::{
    IdentityProvider, Notice, NoticeLevel, Notifier, SessionConfig, SessionManager,
    TracingNotifier,
};

use crate::{AppConfig, TypeSecureError};

/// Builder for configuring a TypeSecure application.
///
/// # Example
///
/// ```rust,ignore
/// use typesecure::prelude::*;
///
/// let app = TypeSecureBuilder::new()
///     .config(AppConfig::from_json(&config_json)?)
///     .build(provider, detector, MemoryRecordStore::new());
/// app.start().await?;
/// ```
pub struct TypeSecureBuilder<N = TracingNotifier> {
    config: AppConfig,
    notifier: N,
}

impl TypeSecureBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            notifier: TracingNotifier,
        }
    }
}

impl Default for TypeSecureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Notifier> TypeSecureBuilder<N> {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets the detection service configuration.
    pub fn detector_config(mut self, config: DetectorConfig) -> Self {
        self.config.detector = config;
        self
    }

    /// Routes user notices to `notifier` instead of the log.
    pub fn notifier<M: Notifier>(self, notifier: M) -> TypeSecureBuilder<M> {
        TypeSecureBuilder {
            config: self.config,
            notifier,
        }
    }

    /// Assembles the application. Nothing is contacted until
    /// [`TypeSecure::start`].
    pub fn build<P, D, S>(self, provider: P, detector: D, store: S) -> TypeSecure<P, D, S, N>
    where
        P: IdentityProvider,
        D: Detector,
        S: RecordStore + SettingsStore,
    {
        let notifier = Arc::new(self.notifier);
        let sessions = SessionManager::with_notifier(
            provider,
            self.config.session.clone(),
            Arc::clone(&notifier),
        );
        TypeSecure {
            sessions,
            detector,
            store,
            notifier,
            history_limit: self.config.history_limit,
        }
    }

    /// Like [`build`](Self::build), with an [`HttpDetector`] built from
    /// the detector configuration.
    ///
    /// # Errors
    /// Returns `TypeSecureError::Detect` if the HTTP client can't be built.
    ///
    /// [`HttpDetector`]: typesecure_detect::HttpDetector
    #[cfg(feature = "http")]
    pub fn build_http<P, S>(
        self,
        provider: P,
        store: S,
    ) -> Result<TypeSecure<P, typesecure_detect::HttpDetector, S, N>, TypeSecureError>
    where
        P: IdentityProvider,
        S: RecordStore + SettingsStore,
    {
        let detector = typesecure_detect::HttpDetector::new(&self.config.detector)?;
        Ok(self.build(provider, detector, store))
    }
}

/// A TypeSecure application: one session, one detector, one history.
pub struct TypeSecure<P, D, S, N = TracingNotifier>
where
    P: IdentityProvider,
    D: Detector,
    S: RecordStore + SettingsStore,
    N: Notifier,
{
    sessions: SessionManager<P, Arc<N>>,
    detector: D,
    store: S,
    notifier: Arc<N>,
    history_limit: usize,
}

impl<P, D, S, N> TypeSecure<P, D, S, N>
where
    P: IdentityProvider,
    D: Detector,
    S: RecordStore + SettingsStore,
    N: Notifier,
{
    /// Restores any existing session and starts following provider
    /// pushes.
    ///
    /// # Errors
    /// The session restore failed; the app still runs, signed out.
    pub async fn start(&self) -> Result<(), TypeSecureError> {
        tracing::info!("TypeSecure starting");
        self.sessions.initialize().await?;
        Ok(())
    }

    /// The session manager, for login, registration and logout.
    pub fn sessions(&self) -> &SessionManager<P, Arc<N>> {
        &self.sessions
    }

    /// Classifies `request` for the signed-in user and records the
    /// result in their history.
    ///
    /// # Errors
    /// `NotAuthenticated` without a signed-in user (the detector is not
    /// called), or the detection or storage failure. Each failure is
    /// reported to the user once.
    pub async fn scan(
        &self,
        request: DetectionRequest,
    ) -> Result<DetectionRecord, TypeSecureError> {
        const TITLE: &str = "Detection Error";
        let identity = self.require_identity(TITLE)?;

        let response = match self.detector.detect(&request).await {
            Ok(response) => response,
            Err(err) => return Err(self.report(TITLE, err.into())),
        };

        let record = DetectionRecord::new(identity.id.clone(), &request, response);
        if let Err(err) = self.store.insert(record.clone()).await {
            return Err(self.report("Could not save scan", err.into()));
        }

        tracing::info!(
            user_id = %identity.id,
            is_sensitive = record.is_sensitive,
            file = record.file.as_ref().map(|f| f.name.as_str()),
            "scan recorded"
        );
        Ok(record)
    }

    /// The signed-in user's most recent scans, newest first. `None`
    /// uses the configured history limit.
    ///
    /// # Errors
    /// `NotAuthenticated`, or the store failure.
    pub async fn history(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<DetectionRecord>, TypeSecureError> {
        const TITLE: &str = "Could not load history";
        let identity = self.require_identity(TITLE)?;
        let limit = limit.unwrap_or(self.history_limit);
        self.store
            .recent_for_user(&identity.id, limit)
            .await
            .map_err(|err| self.report(TITLE, err.into()))
    }

    /// Dashboard summary over all of the signed-in user's scans.
    ///
    /// # Errors
    /// `NotAuthenticated`, or the store failure.
    pub async fn dashboard(&self) -> Result<DashboardStats, TypeSecureError> {
        const TITLE: &str = "Could not load dashboard";
        let identity = self.require_identity(TITLE)?;
        let records = self
            .store
            .recent_for_user(&identity.id, usize::MAX)
            .await
            .map_err(|err| self.report(TITLE, err.into()))?;
        Ok(DashboardStats::from_records(&records))
    }

    /// The signed-in user's scanner settings, or the defaults if they
    /// never saved any.
    ///
    /// # Errors
    /// `NotAuthenticated`, or the store failure.
    pub async fn settings(&self) -> Result<DetectionSettings, TypeSecureError> {
        const TITLE: &str = "Could not load settings";
        let identity = self.require_identity(TITLE)?;
        let saved = self
            .store
            .load_settings(&identity.id)
            .await
            .map_err(|err| self.report(TITLE, err.into()))?;
        Ok(saved.unwrap_or_default())
    }

    /// Applies `update` on top of the current settings, saves the result
    /// and returns it.
    ///
    /// # Errors
    /// `NotAuthenticated`, or the store failure. Nothing is saved then.
    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<DetectionSettings, TypeSecureError> {
        const TITLE: &str = "Could not save settings";
        let identity = self.require_identity(TITLE)?;
        let current = self
            .store
            .load_settings(&identity.id)
            .await
            .map_err(|err| self.report(TITLE, err.into()))?
            .unwrap_or_default();
        let updated = current.merged(update);
        self.store
            .save_settings(&identity.id, &updated)
            .await
            .map_err(|err| self.report(TITLE, err.into()))?;
        tracing::info!(user_id = %identity.id, "settings updated");
        Ok(updated)
    }

    /// Releases the provider subscription. Idempotent.
    pub fn shutdown(&self) {
        self.sessions.shutdown();
        tracing::info!("TypeSecure stopped");
    }

    // -- helpers ----------------------------------------------------------

    fn require_identity(&self, title: &str) -> Result<Identity, TypeSecureError> {
        match self.sessions.session().identity() {
            Some(identity) => Ok(identity.clone()),
            None => Err(self.report(title, TypeSecureError::NotAuthenticated)),
        }
    }

    /// Shows `err` to the user once and hands it back.
    fn report(&self, title: &str, err: TypeSecureError) -> TypeSecureError {
        tracing::warn!(error = %err, "{title}");
        self.notifier.notify(Notice {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: err.user_message(),
            kind: match &err {
                TypeSecureError::Auth(auth) => Some(auth.kind()),
                _ => None,
            },
        });
        err
    }
}
