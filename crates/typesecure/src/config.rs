use serde::{Deserialize, Serialize};
use typesecure_detect::DetectorConfig;
use typesecure_session::SessionConfig;

use crate::TypeSecureError;

/// Everything configurable about a [`TypeSecure`](crate::TypeSecure)
/// instance.
///
/// Every field has a default, so a config document only needs the
/// values it changes:
///
/// ```rust
/// use typesecure::AppConfig;
///
/// let config = AppConfig::from_json(r#"{
///     "session": { "verification": "strict" },
///     "detector": { "base_url": "http://localhost:5000" }
/// }"#).unwrap();
/// assert_eq!(config.history_limit, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub detector: DetectorConfig,
    /// Default page size for scan history.
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            detector: DetectorConfig::default(),
            history_limit: 50,
        }
    }
}

impl AppConfig {
    /// Parses a JSON config document.
    ///
    /// # Errors
    /// Returns `TypeSecureError::Config` when the document is malformed
    /// or a value has the wrong type.
    pub fn from_json(json: &str) -> Result<Self, TypeSecureError> {
        serde_json::from_str(json).map_err(TypeSecureError::Config)
    }
}
