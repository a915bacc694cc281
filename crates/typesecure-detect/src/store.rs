//! Scan records and the in-memory store behind them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use typesecure_protocol::{DetectionRequest, DetectionResponse, FileMeta, UserId};

use crate::{DetectionSettings, RecordStore, SettingsStore, StoreError};

/// One stored scan result.
///
/// `PartialEq` only (no `Eq`) because `confidence` is a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub user_id: UserId,
    /// The text that was classified.
    pub input_text: String,
    pub is_sensitive: bool,
    pub confidence: f64,
    pub detected_types: Vec<String>,
    pub processed_text: String,
    /// Set when the scan was a file upload.
    #[serde(default)]
    pub file: Option<FileMeta>,
    /// Milliseconds since the Unix epoch.
    pub processed_at: u64,
}

impl DetectionRecord {
    /// Builds the record for `user_id` scanning `request`, stamped now.
    pub fn new(
        user_id: UserId,
        request: &DetectionRequest,
        response: DetectionResponse,
    ) -> Self {
        Self {
            user_id,
            input_text: request.text(),
            is_sensitive: response.is_sensitive,
            confidence: response.confidence,
            detected_types: response.detected_types,
            processed_text: response.processed_text,
            file: request.file_meta(),
            processed_at: unix_millis(),
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

/// A [`RecordStore`] and [`SettingsStore`] that keeps everything in
/// process memory.
///
/// Cheap to clone; clones share the same data. Insertion order is
/// recency order.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<Vec<DetectionRecord>>>,
    settings: Arc<Mutex<HashMap<UserId, DetectionSettings>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: while offline every call fails with
    /// [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Total records across all users.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DetectionRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_settings(&self) -> MutexGuard<'_, HashMap<UserId, DetectionSettings>> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemoryRecordStore {
    async fn load_settings(
        &self,
        user_id: &UserId,
    ) -> Result<Option<DetectionSettings>, StoreError> {
        self.check_online()?;
        Ok(self.lock_settings().get(user_id).cloned())
    }

    async fn save_settings(
        &self,
        user_id: &UserId,
        settings: &DetectionSettings,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        tracing::debug!(%user_id, "storing detection settings");
        self.lock_settings().insert(user_id.clone(), settings.clone());
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: DetectionRecord) -> Result<(), StoreError> {
        self.check_online()?;
        tracing::debug!(user_id = %record.user_id, "storing detection record");
        self.lock().push(record);
        Ok(())
    }

    async fn recent_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        self.check_online()?;
        let records = self
            .lock()
            .iter()
            .rev()
            .filter(|r| &r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect();
        Ok(records)
    }
}
