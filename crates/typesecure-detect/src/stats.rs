use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::DetectionRecord;

/// How many records the dashboard lists as "recent".
pub const RECENT_LIMIT: usize = 5;

/// Summary of one user's scans, as shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_scans: u64,
    pub sensitive_detected: u64,
    /// Type label → number of times it was detected, over all records.
    pub detection_types_count: BTreeMap<String, u64>,
    /// Newest first, at most [`RECENT_LIMIT`].
    pub recent_detections: Vec<DetectionRecord>,
}

impl DashboardStats {
    /// Summarizes `records`, which must be ordered newest first.
    pub fn from_records(records: &[DetectionRecord]) -> Self {
        let mut detection_types_count = BTreeMap::new();
        for label in records.iter().flat_map(|r| &r.detected_types) {
            *detection_types_count.entry(label.clone()).or_insert(0) += 1;
        }

        Self {
            total_scans: records.len() as u64,
            sensitive_detected: records.iter().filter(|r| r.is_sensitive).count() as u64,
            detection_types_count,
            recent_detections: records.iter().take(RECENT_LIMIT).cloned().collect(),
        }
    }
}
