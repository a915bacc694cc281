//! Per-user detection settings.
//!
//! Each user tunes how the scanner should treat their input: how
//! sensitive it is, which categories it looks for, and whether hits are
//! encrypted automatically. The backend keeps one row per user; a user
//! who never saved anything gets [`DetectionSettings::default`].

use serde::{Deserialize, Serialize};

/// One user's scanner preferences.
///
/// Field names follow the backend row (`enabledTypes`, `autoEncrypt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSettings {
    /// Detection threshold in `0.0..=1.0`.
    pub sensitivity: f64,
    /// Category labels the user cares about.
    pub enabled_types: Vec<String>,
    /// Encrypt detected spans without asking.
    pub auto_encrypt: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            enabled_types: ["email", "phone", "credit_card", "ssn"]
                .map(String::from)
                .to_vec(),
            auto_encrypt: false,
        }
    }
}

impl DetectionSettings {
    /// Returns these settings with every field `update` sets replaced.
    ///
    /// A finite sensitivity is clamped into `0.0..=1.0`; a NaN or
    /// infinite one is ignored and the current value kept.
    pub fn merged(mut self, update: SettingsUpdate) -> Self {
        if let Some(sensitivity) = update.sensitivity.filter(|s| s.is_finite()) {
            self.sensitivity = sensitivity.clamp(0.0, 1.0);
        }
        if let Some(enabled_types) = update.enabled_types {
            self.enabled_types = enabled_types;
        }
        if let Some(auto_encrypt) = update.auto_encrypt {
            self.auto_encrypt = auto_encrypt;
        }
        self
    }
}

/// A partial change to [`DetectionSettings`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub sensitivity: Option<f64>,
    pub enabled_types: Option<Vec<String>>,
    pub auto_encrypt: Option<bool>,
}
