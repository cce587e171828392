/// Engine tuning knobs.
///
/// These bound the cost of a scan. There is no wall-clock timeout anywhere
/// in the engine; depth limits and the estimator budget are what keep a
/// scan of a huge tree finite.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory levels measured exactly below the scan root.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Depth cap used for each top-level entry when the root is a whole volume.
    #[serde(default = "default_root_depth_cap")]
    pub root_depth_cap: usize,
    /// Levels the estimator descends into an unscanned directory.
    #[serde(default = "default_estimate_depth")]
    pub estimate_depth: usize,
    /// Entries the estimator visits before giving up on a directory.
    #[serde(default = "default_estimate_entry_budget")]
    pub estimate_entry_budget: usize,
    /// Follow symbolic links during measurement (cycle-guarded).
    #[serde(default)]
    pub follow_links: bool,
    /// Threads in the scanner's rayon pool.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Where the scan cache is persisted. `None` means
    /// [`EngineConfig::default_cache_path`].
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

fn default_max_depth() -> usize {
    8
}

fn default_root_depth_cap() -> usize {
    2
}

fn default_estimate_depth() -> usize {
    3
}

fn default_estimate_entry_budget() -> usize {
    20_000
}

fn default_worker_threads() -> usize {
    num_cpus::get().max(1)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            root_depth_cap: default_root_depth_cap(),
            estimate_depth: default_estimate_depth(),
            estimate_entry_budget: default_estimate_entry_budget(),
            follow_links: false,
            worker_threads: default_worker_threads(),
            cache_path: None,
        }
    }
}

impl EngineConfig {
    /// Default location of the persisted cache file.
    pub fn default_cache_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("diskscope")
            .join("scan-cache.json")
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }
}
