/// Mounted storage volumes and their capacity.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one volume's capacity and usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    /// Label or mount-point name, e.g. "C:" or "Macintosh HD".
    pub name: String,
    /// Mount point in path-key form, e.g. "C:/" or "/home".
    pub path: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    /// Set on hard-coded fallback records whose numbers are guesses.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approximate: bool,
}

impl VolumeInfo {
    /// Usage percentage (0.0–100.0).
    pub fn usage_percent(&self) -> f32 {
        if self.total_bytes > 0 {
            (self.used_bytes as f64 / self.total_bytes as f64 * 100.0) as f32
        } else {
            0.0
        }
    }
}

/// Result of `list_volumes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeListing {
    pub volumes: Vec<VolumeInfo>,
    /// When the list was last enumerated successfully; `None` for fallbacks.
    pub last_updated: Option<DateTime<Utc>>,
    /// `true` if enumeration failed and stale or hard-coded data was returned.
    pub degraded: bool,
}
