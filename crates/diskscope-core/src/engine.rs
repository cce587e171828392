/// The engine — the API a transport shell drives.
///
/// `analyze` answers from the cache when it can and otherwise runs at most
/// one scan per path key at a time: concurrent callers for the same key
/// join the scan already in flight. The cache lookup and the in-flight
/// registration happen under one lock, and a finished scan is stored in the
/// cache before its in-flight marker is removed, so a caller always finds
/// one or the other.
///
/// Scans run as detached tasks on tokio's blocking pool. A caller that goes
/// away does not cancel the scan; its result still lands in the cache,
/// unless a deletion overlapping the scanned subtree finished while it ran.
use crate::cache::{CacheEntry, JsonFileStore, ScanCache};
use crate::classify::PathClassifier;
use crate::config::EngineConfig;
use crate::delete::{self, DeleteOutcome};
use crate::error::{EngineError, ErrorCategory, Failure, Result};
use crate::events::{EngineEvent, EventBus};
use crate::model::{SizedNode, VolumeInfo, VolumeListing};
use crate::path;
use crate::platform::{self, SystemVolumeSource, VolumeSource};
use crate::scanner::{ScanOptions, Scanner};
use crate::settings::{Settings, SettingsProvider};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

type ScanOutcome = std::result::Result<CacheEntry, Failure>;

/// Answer to an `analyze` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub path_key: String,
    pub tree: Arc<SizedNode>,
    /// When the tree was computed.
    pub last_updated: DateTime<Utc>,
    /// `true` if served from the cache without a scan.
    pub from_cache: bool,
}

impl Analysis {
    fn from_entry(entry: CacheEntry, from_cache: bool) -> Self {
        Self {
            path_key: entry.path_key,
            tree: entry.node,
            last_updated: entry.computed_at,
            from_cache,
        }
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Filesystem walks actually started.
    pub walks_started: u64,
    /// `analyze` calls answered from the cache.
    pub cache_hits: u64,
    /// `analyze` calls that joined a scan already in flight.
    pub coalesced: u64,
}

#[derive(Default)]
struct Counters {
    walks_started: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
}

struct Inner {
    config: EngineConfig,
    scanner: Scanner,
    cache: ScanCache,
    settings: Arc<dyn SettingsProvider>,
    volume_source: Arc<dyn VolumeSource>,
    in_flight: Mutex<HashMap<String, broadcast::Sender<ScanOutcome>>>,
    events: EventBus,
    counters: Counters,
}

/// Cheap to clone; clones share the same cache and in-flight table.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        settings: Arc<dyn SettingsProvider>,
        volume_source: Arc<dyn VolumeSource>,
        cache: ScanCache,
    ) -> Result<Self> {
        let scanner = Scanner::new(&config)?;
        info!(
            "Engine ready: {} worker threads, max depth {}, {} cached entries",
            config.worker_threads,
            config.max_depth,
            cache.len()
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                scanner,
                cache,
                settings,
                volume_source,
                in_flight: Mutex::new(HashMap::new()),
                events: EventBus::default(),
                counters: Counters::default(),
            }),
        })
    }

    /// Engine backed by the JSON cache file from `config` (or the default
    /// location) and the real platform volume command.
    pub fn open(config: EngineConfig, settings: Arc<dyn SettingsProvider>) -> Result<Self> {
        let cache_path = config
            .cache_path
            .clone()
            .unwrap_or_else(EngineConfig::default_cache_path);
        debug!("Using scan cache at {}", cache_path.display());
        let cache = ScanCache::load(Box::new(JsonFileStore::new(cache_path)));
        Self::new(config, settings, Arc::new(SystemVolumeSource), cache)
    }

    /// Mounted volumes with capacity and usage.
    ///
    /// Served from the cache unless `force_refresh` or nothing is cached.
    /// Never fails: if enumeration fails the stale list (or a single
    /// approximate primary-root record) comes back marked `degraded`.
    pub async fn list_volumes(&self, force_refresh: bool) -> VolumeListing {
        if !force_refresh {
            let (volumes, updated) = self.inner.cache.volumes();
            if !volumes.is_empty() {
                return VolumeListing {
                    volumes,
                    last_updated: updated,
                    degraded: false,
                };
            }
        }

        let inner = Arc::clone(&self.inner);
        let refreshed = tokio::task::spawn_blocking(move || refresh_volumes(&inner))
            .await
            .map_err(|err| EngineError::TaskFailed {
                details: err.to_string(),
            })
            .and_then(|result| result);

        let listing = match refreshed {
            Ok((volumes, now)) => {
                info!("Enumerated {} volumes", volumes.len());
                VolumeListing {
                    volumes,
                    last_updated: Some(now),
                    degraded: false,
                }
            }
            Err(err) => {
                let (stale, updated) = self.inner.cache.volumes();
                if stale.is_empty() {
                    warn!("Volume enumeration failed, using fallback volume: {err}");
                    VolumeListing {
                        volumes: platform::fallback_volumes(),
                        last_updated: None,
                        degraded: true,
                    }
                } else {
                    warn!("Volume enumeration failed, serving stale list: {err}");
                    VolumeListing {
                        volumes: stale,
                        last_updated: updated,
                        degraded: true,
                    }
                }
            }
        };

        self.inner.events.publish(EngineEvent::VolumesRefreshed {
            count: listing.volumes.len(),
            degraded: listing.degraded,
        });
        listing
    }

    /// Size tree for `user_path`. Relative paths are taken from the
    /// current directory.
    ///
    /// A fresh cache entry is returned directly unless `force_refresh`;
    /// otherwise the caller joins the in-flight scan for the key or starts
    /// one. A failed scan removes any cached entry for the key.
    pub async fn analyze(
        &self,
        user_path: &str,
        force_refresh: bool,
    ) -> std::result::Result<Analysis, Failure> {
        let key = path::absolute_key(user_path)
            .map_err(|err| EngineError::from_io(user_path, err).to_failure())?;
        let settings = self.inner.settings.settings();

        let mut rx = {
            let mut in_flight = self.inner.in_flight.lock();

            if !force_refresh {
                let max_age = settings.max_cache_age();
                if let Some(entry) = self
                    .inner
                    .cache
                    .get(&key)
                    .filter(|e| e.is_fresh(max_age, Utc::now()))
                {
                    self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!("cache hit for {key}");
                    return Ok(Analysis::from_entry(entry, true));
                }
            }

            match in_flight.get(&key) {
                Some(tx) => {
                    self.inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!("joining in-flight scan of {key}");
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    in_flight.insert(key.clone(), tx);
                    self.spawn_scan(key.clone(), settings);
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(outcome) => outcome.map(|entry| Analysis::from_entry(entry, false)),
            Err(err) => Err(Failure {
                category: ErrorCategory::Other,
                message: format!("scan of {key} ended without a result: {err}"),
            }),
        }
    }

    /// Start the detached scan task for `key`. The caller has already
    /// registered the in-flight sender.
    fn spawn_scan(&self, key: String, settings: Settings) {
        let inner = Arc::clone(&self.inner);
        inner.counters.walks_started.fetch_add(1, Ordering::Relaxed);
        inner.events.publish(EngineEvent::ScanStarted {
            path_key: key.clone(),
        });

        tokio::spawn(async move {
            let worker = Arc::clone(&inner);
            let scan_key = key.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let classifier = PathClassifier::new(&settings);
                let options = ScanOptions::from_config(&worker.config);
                let ticket = worker.cache.begin_scan();
                match worker.scanner.scan(&scan_key, &options, &classifier) {
                    Ok(report) => {
                        let (entry, stored) = worker.cache.put_scanned(
                            &scan_key,
                            Arc::new(report.tree),
                            Utc::now(),
                            &ticket,
                        );
                        if !stored {
                            info!("Scan of {scan_key} overlapped a deletion; result not cached");
                        }
                        Ok((entry, report.stats.duration))
                    }
                    Err(err) => {
                        worker.cache.invalidate(&scan_key);
                        Err(err.to_failure())
                    }
                }
            })
            .await;

            let outcome = match joined {
                Ok(Ok((entry, duration))) => {
                    inner.events.publish(EngineEvent::ScanCompleted {
                        path_key: key.clone(),
                        size_bytes: entry.node.size_bytes,
                        duration,
                    });
                    Ok(entry)
                }
                Ok(Err(failure)) => {
                    warn!("Scan of {key} failed: {failure}");
                    inner.events.publish(EngineEvent::ScanFailed {
                        path_key: key.clone(),
                        failure: failure.clone(),
                    });
                    Err(failure)
                }
                Err(err) => {
                    let failure = EngineError::TaskFailed {
                        details: err.to_string(),
                    }
                    .to_failure();
                    warn!("Scan task for {key} died: {failure}");
                    inner.cache.invalidate(&key);
                    inner.events.publish(EngineEvent::ScanFailed {
                        path_key: key.clone(),
                        failure: failure.clone(),
                    });
                    Err(failure)
                }
            };

            let tx = inner.in_flight.lock().remove(&key);
            if let Some(tx) = tx {
                // No receivers left just means every caller went away.
                let _ = tx.send(outcome);
            }
        });
    }

    /// Delete the file or tree at `user_path` and reconcile the cache.
    pub async fn delete(&self, user_path: &str) -> DeleteOutcome {
        let key = match path::absolute_key(user_path) {
            Ok(key) => key,
            Err(err) => return DeleteOutcome::from_error(&EngineError::from_io(user_path, err)),
        };
        let outcome = delete::delete_path(&self.inner.cache, &key).await;
        self.inner.events.publish(EngineEvent::Deleted {
            path_key: key,
            success: outcome.success,
        });
        outcome
    }

    /// New event receiver. See [`crate::events`].
    pub fn subscribe(&self) -> crossbeam_channel::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            walks_started: c.walks_started.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
        }
    }

    pub fn cache(&self) -> &ScanCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Flush the cache to its store. Mutations already persist; this is
    /// for an orderly shutdown.
    pub fn persist(&self) -> Result<()> {
        self.inner.cache.persist()
    }
}

/// Run the volume source and store a non-empty result in the cache.
/// Fallbacks are never stored, so failures leave the cache untouched.
fn refresh_volumes(inner: &Inner) -> Result<(Vec<VolumeInfo>, DateTime<Utc>)> {
    let mut volumes = inner.volume_source.list()?;
    volumes.retain(|v| v.total_bytes > 0);
    if volumes.is_empty() {
        return Err(EngineError::PlatformCommandFailed {
            command: "volume listing".into(),
            details: "no volumes reported".into(),
        });
    }
    let now = Utc::now();
    inner.cache.set_volumes(volumes.clone(), now);
    Ok((volumes, now))
}
