/// Scanner module — measures a filesystem subtree into a [`SizedNode`] tree.
///
/// Two strategies share one recursion:
/// - **Subtree scan:** depth-limited exact walk below the root, with the
///   bounded [`estimate::Estimator`] taking over where the depth budget
///   runs out.
/// - **Volume-root scan:** only top-level entries with a small depth cap,
///   see [`volume_root`].
///
/// Scans are synchronous and run on a dedicated rayon pool; the engine
/// calls them from tokio's blocking pool. A scan is not preemptible once
/// started.
pub mod estimate;
pub mod progress;
pub(crate) mod volume_root;
pub(crate) mod walk;

use crate::classify::{AncestorChain, PathClassifier};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::SizedNode;
use crate::path;
use compact_str::CompactString;
use estimate::Estimator;
use progress::{ScanCounters, ScanStats};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;
use tracing::{debug, info};
use walk::WalkContext;

/// Per-scan options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Directory levels below the root measured exactly.
    pub max_depth: usize,
    /// Apply the reserved/excluded/hidden rules. The symlink cycle guard
    /// applies regardless.
    pub respect_classifier: bool,
    pub follow_links: bool,
    /// Walk a volume root like any other directory instead of using the
    /// shallow volume-root strategy.
    pub full_volume: bool,
}

impl ScanOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            respect_classifier: true,
            follow_links: config.follow_links,
            full_volume: false,
        }
    }
}

/// A finished scan.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub tree: SizedNode,
    pub stats: ScanStats,
}

/// Owns the worker pool and the tuning shared by every scan.
pub struct Scanner {
    pool: rayon::ThreadPool,
    estimator: Estimator,
    root_depth_cap: usize,
}

impl Scanner {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads.max(1))
            .thread_name(|i| format!("diskscope-scan-{i}"))
            .build()
            .map_err(|err| EngineError::TaskFailed {
                details: format!("cannot build scanner pool: {err}"),
            })?;
        Ok(Self {
            pool,
            estimator: Estimator::new(config.estimate_depth, config.estimate_entry_budget),
            root_depth_cap: config.root_depth_cap,
        })
    }

    /// Measure the subtree at `root_key` (a normalised path key).
    ///
    /// Per-entry failures are folded into the tree as placeholders. Only a
    /// root that cannot be stat-ed or listed fails the scan, with
    /// [`EngineError::RootUnreadable`].
    pub fn scan(
        &self,
        root_key: &str,
        options: &ScanOptions,
        classifier: &PathClassifier,
    ) -> Result<ScanReport> {
        let start = Instant::now();
        let root = path::to_native(root_key);
        let name = CompactString::new(path::display_name(root_key));
        info!("Starting scan of {}", root.display());

        let counters = ScanCounters::default();
        let ctx = WalkContext {
            classifier,
            options,
            estimator: &self.estimator,
            counters: &counters,
        };

        // The root itself is always followed, even when it is a link.
        let meta = fs::metadata(&root).map_err(|source| EngineError::RootUnreadable {
            path: root.clone(),
            source,
        })?;

        let tree = if meta.is_dir() {
            let entries = walk::list_children(&root, &counters).map_err(|source| {
                EngineError::RootUnreadable {
                    path: root.clone(),
                    source,
                }
            })?;

            self.pool.install(|| {
                if path::is_volume_root(root_key) && !options.full_volume {
                    debug!("using shallow volume-root strategy for {root_key}");
                    volume_root::scan_volume_root(
                        &ctx,
                        &root,
                        name,
                        entries,
                        self.root_depth_cap,
                        &volume_root::user_data_dirs(),
                    )
                } else {
                    let identity = walk::chain_identity(&root, options);
                    let chain = AncestorChain::root(&identity);
                    walk::measure_children(&ctx, name, entries, &chain, options.max_depth)
                }
            })
        } else {
            counters.file();
            SizedNode::file(name, meta.len())
        };

        let stats = counters.snapshot(start.elapsed());
        info!(
            "Scan of {} complete: {} files, {} dirs, {} skipped, {} errors, {} estimated in {:?}",
            root.display(),
            stats.files,
            stats.dirs,
            stats.skipped,
            stats.errors,
            stats.estimated,
            stats.duration
        );
        Ok(ScanReport { tree, stats })
    }
}
