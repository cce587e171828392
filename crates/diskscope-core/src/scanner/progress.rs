/// Scan statistics, gathered concurrently by the walk and reported once the
/// scan finishes.
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters shared by every rayon worker taking part in one scan.
#[derive(Debug, Default)]
pub(crate) struct ScanCounters {
    files: AtomicU64,
    dirs: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    estimated: AtomicU64,
}

impl ScanCounters {
    #[inline]
    pub fn file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dir(&self) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn estimated(&self) {
        self.estimated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, duration: Duration) -> ScanStats {
        ScanStats {
            files: self.files.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            estimated: self.estimated.load(Ordering::Relaxed),
            duration,
        }
    }
}

/// Totals for one completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub files: u64,
    pub dirs: u64,
    /// Entries left out by the classifier.
    pub skipped: u64,
    /// Entries that could not be stat-ed or listed.
    pub errors: u64,
    /// Directories measured by the estimator instead of a full walk.
    pub estimated: u64,
    pub duration: Duration,
}
