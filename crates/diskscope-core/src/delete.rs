/// Deletion of files and directory trees, reconciled with the scan cache.
///
/// Volume roots and reserved system locations are refused up front. Any
/// attempt that reached the filesystem invalidates the target's subtree and
/// every ancestor entry in the cache, whether it succeeded or not: a
/// recursive removal may fail half-way and the cached aggregates can no
/// longer be trusted either way.
use crate::cache::ScanCache;
use crate::classify;
use crate::error::{EngineError, ErrorCategory};
use crate::path;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Result of one deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
    /// `None` on success.
    pub category: Option<ErrorCategory>,
}

impl DeleteOutcome {
    fn deleted(key: &str) -> Self {
        Self {
            success: true,
            message: format!("Deleted {key}"),
            category: None,
        }
    }

    fn failed(category: ErrorCategory, message: String) -> Self {
        Self {
            success: false,
            message,
            category: Some(category),
        }
    }

    /// Failure outcome for a request that never reached the filesystem.
    pub fn from_error(err: &EngineError) -> Self {
        Self::failed(err.category(), err.to_string())
    }
}

/// Why a path may not be deleted at all, if it may not.
pub fn refusal(key: &str) -> Option<String> {
    if path::is_volume_root(key) {
        return Some(format!("Refusing to delete volume root {key}"));
    }
    if classify::is_reserved(key) {
        return Some(format!("Refusing to delete reserved system path {key}"));
    }
    None
}

/// Delete `key` (a normalised path key) and reconcile `cache`.
pub async fn delete_path(cache: &ScanCache, key: &str) -> DeleteOutcome {
    if let Some(message) = refusal(key) {
        warn!("{message}");
        return DeleteOutcome::failed(ErrorCategory::Other, message);
    }

    let target = path::to_native(key);
    let result = remove(&target).await;
    let invalidated = cache.invalidate_lineage(key);

    match result {
        Ok(()) => {
            info!("Deleted {key} ({invalidated} cache entries invalidated)");
            DeleteOutcome::deleted(key)
        }
        Err(source) => {
            let err = EngineError::from_io(&target, source);
            warn!("Failed to delete {key}: {err}");
            DeleteOutcome::failed(err.category(), failure_message(key, &err))
        }
    }
}

/// Remove a directory tree or a single entry. Symlinks are removed
/// themselves, never followed.
async fn remove(target: &Path) -> io::Result<()> {
    let meta = tokio::fs::symlink_metadata(target).await?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(target).await
    } else {
        tokio::fs::remove_file(target).await
    }
}

fn failure_message(key: &str, err: &EngineError) -> String {
    match err {
        EngineError::PermissionDenied { .. } => {
            format!("Permission denied while deleting {key}")
        }
        EngineError::ResourceBusy { .. } => {
            format!("{key} is in use by another process")
        }
        EngineError::NotFound { .. } => format!("{key} no longer exists"),
        other => format!("Could not delete {key}: {other}"),
    }
}
