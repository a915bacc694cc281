//! Integration tests for the TypeSecure application root: sessions,
//! scanning, history and dashboard wired together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use typesecure::prelude::*;
use typesecure::session::memory::{MemoryProvider, RecordingNotifier};

// =========================================================================
// Mock detector
// =========================================================================

/// Flags any text containing `@` as an email; counts calls.
#[derive(Clone, Default)]
struct KeywordDetector {
    calls: Arc<AtomicUsize>,
    down: bool,
}

impl KeywordDetector {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for KeywordDetector {
    async fn detect(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectionResponse, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down {
            return Err(DetectError::Unavailable("connection refused".into()));
        }
        let text = request.text();
        let sensitive = text.contains('@');
        Ok(DetectionResponse {
            is_sensitive: sensitive,
            confidence: if sensitive { 0.9 } else { 0.1 },
            detected_types: if sensitive { vec!["email".into()] } else { vec![] },
            processed_text: text.replace('@', "[at]"),
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

const ADA: &str = "ada@example.com";
const PASSWORD: &str = "correct-horse";

type App = TypeSecure<MemoryProvider, KeywordDetector, MemoryRecordStore, RecordingNotifier>;

struct Harness {
    app: App,
    provider: MemoryProvider,
    detector: KeywordDetector,
    store: MemoryRecordStore,
    notices: RecordingNotifier,
}

async fn harness_with(detector: KeywordDetector) -> Harness {
    let provider = MemoryProvider::default()
        .with_account("Ada", ADA, PASSWORD, true)
        .with_account("Bob", "bob@example.com", "bobpass", true);
    let store = MemoryRecordStore::new();
    let notices = RecordingNotifier::new();
    let app = TypeSecureBuilder::new()
        .notifier(notices.clone())
        .build(provider.clone(), detector.clone(), store.clone());
    app.start().await.unwrap();
    Harness {
        app,
        provider,
        detector,
        store,
        notices,
    }
}

async fn signed_in() -> Harness {
    let h = harness_with(KeywordDetector::default()).await;
    h.app.sessions().login(ADA, PASSWORD).await.unwrap();
    h.notices.take();
    h
}

fn text(s: &str) -> DetectionRequest {
    DetectionRequest::Text(s.into())
}

// =========================================================================
// scan()
// =========================================================================

#[tokio::test]
async fn test_scan_unauthenticated_fails_without_detector_call() {
    let h = harness_with(KeywordDetector::default()).await;

    let err = h.app.scan(text("mail me at x@y.z")).await.unwrap_err();

    assert!(matches!(err, TypeSecureError::NotAuthenticated));
    assert_eq!(h.detector.calls(), 0);
    assert!(h.store.is_empty());
    assert_eq!(h.notices.errors().len(), 1);
}

#[tokio::test]
async fn test_scan_authenticated_stores_record_for_user() {
    let h = signed_in().await;

    let record = h.app.scan(text("mail me at x@y.z")).await.unwrap();

    assert!(record.is_sensitive);
    assert_eq!(record.detected_types, vec!["email".to_string()]);
    assert_eq!(record.input_text, "mail me at x@y.z");
    assert_eq!(
        Some(&record.user_id),
        h.app.sessions().session().identity().map(|i| &i.id)
    );
    assert_eq!(h.store.len(), 1);
    assert!(h.notices.notices().is_empty());
}

#[tokio::test]
async fn test_scan_file_records_file_meta() {
    let h = signed_in().await;

    let record = h
        .app
        .scan(DetectionRequest::File {
            name: "contacts.csv".into(),
            contents: b"ada@example.com".to_vec(),
        })
        .await
        .unwrap();

    let file = record.file.unwrap();
    assert_eq!(file.name, "contacts.csv");
    assert_eq!(file.size, 15);
}

#[tokio::test]
async fn test_scan_detector_down_notifies_once_and_stores_nothing() {
    let h = harness_with(KeywordDetector {
        down: true,
        ..KeywordDetector::default()
    })
    .await;
    h.app.sessions().login(ADA, PASSWORD).await.unwrap();
    h.notices.take();

    let err = h.app.scan(text("hello")).await.unwrap_err();

    assert!(matches!(err, TypeSecureError::Detect(DetectError::Unavailable(_))));
    assert!(h.store.is_empty());
    let errors = h.notices.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Detection Error");
}

#[tokio::test]
async fn test_scan_store_offline_is_store_error() {
    let h = signed_in().await;
    h.store.set_offline(true);

    let err = h.app.scan(text("hello")).await.unwrap_err();

    assert!(matches!(err, TypeSecureError::Store(_)));
    assert_eq!(h.detector.calls(), 1);
    assert_eq!(h.notices.errors().len(), 1);
}

#[tokio::test]
async fn test_scan_after_logout_is_not_authenticated() {
    let h = signed_in().await;
    h.app.sessions().logout().await.unwrap();

    let err = h.app.scan(text("hello")).await.unwrap_err();

    assert!(matches!(err, TypeSecureError::NotAuthenticated));
}

// =========================================================================
// history() and dashboard()
// =========================================================================

#[tokio::test]
async fn test_history_is_per_user_and_newest_first() {
    let h = signed_in().await;
    h.app.scan(text("first")).await.unwrap();
    h.app.scan(text("second")).await.unwrap();

    h.app.sessions().logout().await.unwrap();
    h.app.sessions().login("bob@example.com", "bobpass").await.unwrap();
    h.app.scan(text("bob's")).await.unwrap();
    let bob = h.app.history(None).await.unwrap();

    h.app.sessions().logout().await.unwrap();
    h.app.sessions().login(ADA, PASSWORD).await.unwrap();
    let ada = h.app.history(Some(10)).await.unwrap();

    let ada_texts: Vec<_> = ada.iter().map(|r| r.input_text.as_str()).collect();
    assert_eq!(ada_texts, vec!["second", "first"]);
    assert_eq!(bob.len(), 1);
}

#[tokio::test]
async fn test_history_limit_is_respected() {
    let h = signed_in().await;
    for n in 0..4 {
        h.app.scan(text(&format!("scan {n}"))).await.unwrap();
    }

    let history = h.app.history(Some(2)).await.unwrap();

    assert_eq!(history.len(), 2);
    assert_eq!(history[0].input_text, "scan 3");
}

#[tokio::test]
async fn test_dashboard_summarizes_user_scans() {
    let h = signed_in().await;
    for input in ["a@b.c", "plain", "x@y.z", "nothing", "q@r.s", "last@one.io"] {
        h.app.scan(text(input)).await.unwrap();
    }

    let stats = h.app.dashboard().await.unwrap();

    assert_eq!(stats.total_scans, 6);
    assert_eq!(stats.sensitive_detected, 4);
    assert_eq!(stats.detection_types_count["email"], 4);
    assert_eq!(stats.recent_detections.len(), 5);
    assert_eq!(stats.recent_detections[0].input_text, "last@one.io");
}

#[tokio::test]
async fn test_dashboard_unauthenticated_fails() {
    let h = harness_with(KeywordDetector::default()).await;

    let err = h.app.dashboard().await.unwrap_err();

    assert!(matches!(err, TypeSecureError::NotAuthenticated));
}

// =========================================================================
// settings() and update_settings()
// =========================================================================

#[tokio::test]
async fn test_settings_default_until_saved() {
    let h = signed_in().await;

    let settings = h.app.settings().await.unwrap();

    assert_eq!(settings, DetectionSettings::default());
}

#[tokio::test]
async fn test_update_settings_merges_and_persists_per_user() {
    let h = signed_in().await;

    let updated = h
        .app
        .update_settings(SettingsUpdate {
            sensitivity: Some(0.8),
            enabled_types: Some(vec!["email".into()]),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap();
    let reloaded = h.app.settings().await.unwrap();

    assert_eq!(updated, reloaded);
    assert_eq!(reloaded.sensitivity, 0.8);
    assert_eq!(reloaded.enabled_types, vec!["email".to_string()]);
    assert!(!reloaded.auto_encrypt);

    h.app.sessions().logout().await.unwrap();
    h.app.sessions().login("bob@example.com", "bobpass").await.unwrap();
    assert_eq!(h.app.settings().await.unwrap(), DetectionSettings::default());
}

#[tokio::test]
async fn test_update_settings_unauthenticated_fails() {
    let h = harness_with(KeywordDetector::default()).await;

    let err = h
        .app
        .update_settings(SettingsUpdate {
            auto_encrypt: Some(true),
            ..SettingsUpdate::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, TypeSecureError::NotAuthenticated));
    assert_eq!(h.notices.errors()[0].title, "Could not save settings");
}

#[tokio::test]
async fn test_update_settings_store_offline_notifies_once() {
    let h = signed_in().await;
    h.store.set_offline(true);

    let err = h.app.update_settings(SettingsUpdate::default()).await.unwrap_err();

    assert!(matches!(err, TypeSecureError::Store(_)));
    assert_eq!(h.notices.errors().len(), 1);
}

// =========================================================================
// Profiles
// =========================================================================

#[tokio::test]
async fn test_register_through_app_stores_profile() {
    let h = harness_with(KeywordDetector::default()).await;

    let registration = h
        .app
        .sessions()
        .register("Cleo", "cleo@example.com", "pa55word")
        .await
        .unwrap();

    let profile = h.provider.profile(&registration.identity.id).unwrap();
    assert_eq!(profile.full_name.as_deref(), Some("Cleo"));
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_start_restores_provider_session() {
    let provider = MemoryProvider::default().with_account("Ada", ADA, PASSWORD, true);
    provider.restore_session_for(ADA);
    let app = TypeSecureBuilder::new().build(
        provider,
        KeywordDetector::default(),
        MemoryRecordStore::new(),
    );

    app.start().await.unwrap();
    let mut view = app.sessions().subscribe();
    let session = view.wait_for(|s| s.is_authenticated()).await.unwrap();

    assert_eq!(session.identity().unwrap().email, ADA);
}

#[tokio::test]
async fn test_shutdown_releases_provider_subscription() {
    let h = signed_in().await;
    assert_eq!(h.provider.subscriber_count(), 1);

    h.app.shutdown();
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.provider.subscriber_count(), 0);
}

#[tokio::test]
async fn test_builder_applies_session_config() {
    let config = AppConfig::from_json(r#"{"session": {"min_password_len": 10}}"#).unwrap();
    let app = TypeSecureBuilder::new().config(config).build(
        MemoryProvider::default(),
        KeywordDetector::default(),
        MemoryRecordStore::new(),
    );

    let err = app
        .sessions()
        .register("Ada", ADA, "short-pw")
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::WeakSecret { min_len: 10 });
}
