use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the detection service lives and how much it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Service origin; `/api/detect` is appended.
    pub base_url: String,

    /// Upper bound on one request, connect to last body byte.
    pub timeout_ms: u64,

    /// Largest file accepted for scanning, in bytes.
    pub max_file_bytes: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.type-secure.online".into(),
            timeout_ms: 30_000,
            max_file_bytes: 16 * 1024 * 1024,
        }
    }
}

impl DetectorConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The full detection endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/detect", self.base_url.trim_end_matches('/'))
    }
}
