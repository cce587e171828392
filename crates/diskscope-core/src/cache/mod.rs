/// Scan cache — the single owner of computed results and the volume list.
///
/// Entries are keyed by normalised path key. Reads share a lock, mutations
/// take it exclusively, and every mutation is followed by a persist through
/// the injected [`CacheStore`]. Persist failures are logged and swallowed:
/// the in-memory cache stays authoritative for the running process.
///
/// Per-key scan coalescing lives in the engine, which checks this cache
/// and its in-flight table inside one critical section.
///
/// Scans that were running while an overlapping key was invalidated must
/// not store their result: they may have counted bytes that are gone. Each
/// scan holds a [`ScanTicket`] stamped with the invalidation generation it
/// started at, and [`ScanCache::put_scanned`] refuses to store when a later
/// invalidation touched the scanned key, one of its descendants or one of
/// its ancestors.
pub mod store;

use crate::model::{SizedNode, VolumeInfo};
use crate::path;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
pub use store::{CacheStore, JsonFileStore, MemoryStore};

/// Bumped when the snapshot layout changes; older snapshots load as cold.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub path_key: String,
    pub node: Arc<SizedNode>,
    pub computed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// `true` if the entry is younger than `max_age` (or entries never expire).
    pub fn is_fresh(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> bool {
        match max_age {
            None => true,
            Some(max_age) => match chrono::Duration::from_std(max_age) {
                Ok(max_age) => now.signed_duration_since(self.computed_at) < max_age,
                Err(_) => true,
            },
        }
    }
}

/// Everything the cache persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheState {
    version: u32,
    entries: BTreeMap<String, CacheEntry>,
    volumes: Vec<VolumeInfo>,
    volumes_updated: Option<DateTime<Utc>>,
    last_updated: Option<DateTime<Utc>>,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            ..Self::default()
        }
    }
}

/// Invalidations seen while scans are running. Locked after `state` when
/// both are needed.
#[derive(Debug, Default)]
struct Fences {
    generation: u64,
    open_scans: usize,
    /// Invalidated key -> generation of its latest invalidation. Cleared
    /// once no scan is running.
    touched: HashMap<String, u64>,
}

impl Fences {
    fn record(&mut self, key: &str) {
        if self.open_scans == 0 {
            return;
        }
        self.generation += 1;
        self.touched.insert(key.to_string(), self.generation);
    }

    fn overlaps_since(&self, key: &str, generation: u64) -> bool {
        self.touched.iter().any(|(touched, &at)| {
            at > generation
                && (path::is_same_or_descendant(touched, key)
                    || path::is_descendant(key, touched))
        })
    }
}

/// Held by a running scan; see [`ScanCache::begin_scan`].
#[must_use]
pub struct ScanTicket<'a> {
    cache: &'a ScanCache,
    generation: u64,
}

impl Drop for ScanTicket<'_> {
    fn drop(&mut self) {
        let mut fences = self.cache.fences.lock();
        fences.open_scans = fences.open_scans.saturating_sub(1);
        if fences.open_scans == 0 {
            fences.touched.clear();
        }
    }
}

pub struct ScanCache {
    state: RwLock<CacheState>,
    store: Box<dyn CacheStore>,
    fences: Mutex<Fences>,
    /// Serialises snapshot-then-save so the newest state is written last.
    persist_lock: Mutex<()>,
}

impl ScanCache {
    /// Restore the last persisted state, or start cold if there is none or
    /// it cannot be decoded. Never fails.
    pub fn load(store: Box<dyn CacheStore>) -> Self {
        let state = match Self::read_snapshot(store.as_ref()) {
            Ok(Some(state)) => {
                info!(
                    "Loaded scan cache: {} entries, {} volumes",
                    state.entries.len(),
                    state.volumes.len()
                );
                state
            }
            Ok(None) => {
                debug!("No persisted scan cache; starting cold");
                CacheState::empty()
            }
            Err(err) => {
                warn!("Discarding persisted scan cache: {err}");
                CacheState::empty()
            }
        };
        Self {
            state: RwLock::new(state),
            store,
            fences: Mutex::new(Fences::default()),
            persist_lock: Mutex::new(()),
        }
    }

    /// A cache that is never written anywhere durable.
    pub fn in_memory() -> Self {
        Self::load(Box::new(MemoryStore::new()))
    }

    fn read_snapshot(store: &dyn CacheStore) -> Result<Option<CacheState>> {
        let Some(bytes) = store.load()? else {
            return Ok(None);
        };
        let state: CacheState =
            serde_json::from_slice(&bytes).map_err(|err| EngineError::CacheCorrupt {
                details: err.to_string(),
            })?;
        if state.version != SNAPSHOT_VERSION {
            return Err(EngineError::CacheCorrupt {
                details: format!("unsupported snapshot version {}", state.version),
            });
        }
        // Keys written by an older normaliser would never be hit again.
        if let Some(bad) = state.entries.keys().find(|k| path::normalize(k) != **k) {
            return Err(EngineError::CacheCorrupt {
                details: format!("non-canonical key {bad:?}"),
            });
        }
        Ok(Some(state))
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.state.read().entries.get(key).cloned()
    }

    /// Store a freshly computed result, replacing any previous entry.
    pub fn put(&self, key: &str, node: Arc<SizedNode>, computed_at: DateTime<Utc>) -> CacheEntry {
        let entry = CacheEntry {
            path_key: key.to_string(),
            node,
            computed_at,
        };
        {
            let mut state = self.state.write();
            state.entries.insert(key.to_string(), entry.clone());
            state.last_updated = Some(computed_at);
        }
        self.commit();
        entry
    }

    /// Register a scan that is about to read the filesystem. Must be taken
    /// before the scan starts and kept until its result is stored.
    pub fn begin_scan(&self) -> ScanTicket<'_> {
        let mut fences = self.fences.lock();
        fences.open_scans += 1;
        ScanTicket {
            cache: self,
            generation: fences.generation,
        }
    }

    /// Store a scan result unless an overlapping key was invalidated after
    /// `ticket` was taken. Returns the entry and whether it was stored.
    pub fn put_scanned(
        &self,
        key: &str,
        node: Arc<SizedNode>,
        computed_at: DateTime<Utc>,
        ticket: &ScanTicket<'_>,
    ) -> (CacheEntry, bool) {
        let entry = CacheEntry {
            path_key: key.to_string(),
            node,
            computed_at,
        };
        {
            let mut state = self.state.write();
            if self.fences.lock().overlaps_since(key, ticket.generation) {
                debug!("not caching scan of {key}: invalidated while it ran");
                return (entry, false);
            }
            state.entries.insert(key.to_string(), entry.clone());
            state.last_updated = Some(computed_at);
        }
        self.commit();
        (entry, true)
    }

    /// Drop the entry for exactly `key`. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            self.fences.lock().record(key);
            let removed = state.entries.remove(key).is_some();
            if removed {
                state.last_updated = Some(Utc::now());
            }
            removed
        };
        if removed {
            self.commit();
        }
        removed
    }

    /// Drop `key` and every entry below it. Returns the number removed.
    pub fn invalidate_subtree(&self, key: &str) -> usize {
        let removed = self.remove_where(key, |k| path::is_same_or_descendant(k, key));
        if removed > 0 {
            self.commit();
        }
        removed
    }

    /// Drop `key`, everything below it and every ancestor up to the volume
    /// root, as one mutation. Used after deletions: each ancestor's
    /// aggregate still counts the removed bytes.
    pub fn invalidate_lineage(&self, key: &str) -> usize {
        let ancestors = path::ancestors(key);
        let removed = self.remove_where(key, |k| {
            path::is_same_or_descendant(k, key) || ancestors.iter().any(|a| a == k)
        });
        if removed > 0 {
            debug!("invalidated {removed} cache entries around {key}");
            self.commit();
        }
        removed
    }

    /// Remove matching entries and fence running scans that overlap `key`.
    fn remove_where(&self, key: &str, mut doomed: impl FnMut(&str) -> bool) -> usize {
        let mut state = self.state.write();
        self.fences.lock().record(key);
        let before = state.entries.len();
        state.entries.retain(|k, _| !doomed(k));
        let removed = before - state.entries.len();
        if removed > 0 {
            state.last_updated = Some(Utc::now());
        }
        removed
    }

    /// Cached volume list and when it was enumerated.
    pub fn volumes(&self) -> (Vec<VolumeInfo>, Option<DateTime<Utc>>) {
        let state = self.state.read();
        (state.volumes.clone(), state.volumes_updated)
    }

    /// Replace the volume list wholesale.
    pub fn set_volumes(&self, volumes: Vec<VolumeInfo>, updated: DateTime<Utc>) {
        {
            let mut state = self.state.write();
            state.volumes = volumes;
            state.volumes_updated = Some(updated);
            state.last_updated = Some(updated);
        }
        self.commit();
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_updated
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Cached keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Write the current state through the store.
    pub fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock();
        let bytes = {
            let state = self.state.read();
            serde_json::to_vec(&*state)?
        };
        self.store.save(&bytes)
    }

    fn commit(&self) {
        if let Err(err) = self.persist() {
            warn!("Failed to persist scan cache: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, size: u64) -> Arc<SizedNode> {
        Arc::new(SizedNode::file(name, size))
    }

    #[test]
    fn put_get_and_persist_on_every_mutation() {
        let store = Arc::new(MemoryStore::new());
        let cache = ScanCache::load(Box::new(store.clone()));

        cache.put("/a", node("a", 1), Utc::now());
        assert_eq!(cache.get("/a").unwrap().node.size_bytes, 1);
        assert_eq!(store.save_count(), 1);

        assert!(cache.invalidate("/a"));
        assert_eq!(store.save_count(), 2);
        assert!(!cache.invalidate("/a"));
        assert_eq!(store.save_count(), 2, "no-op invalidation must not persist");
    }

    #[test]
    fn subtree_invalidation_spares_siblings() {
        let cache = ScanCache::in_memory();
        for key in ["/a", "/a/b", "/a/b/c", "/ab", "/z"] {
            cache.put(key, node(key, 1), Utc::now());
        }
        assert_eq!(cache.invalidate_subtree("/a/b"), 2);
        assert_eq!(cache.keys(), vec!["/a", "/ab", "/z"]);
    }

    #[test]
    fn lineage_invalidation_removes_ancestors() {
        let cache = ScanCache::in_memory();
        for key in ["/", "/data", "/data/sub", "/data/sub/x", "/data/other"] {
            cache.put(key, node(key, 1), Utc::now());
        }
        assert_eq!(cache.invalidate_lineage("/data/sub"), 4);
        assert_eq!(cache.keys(), vec!["/data/other"]);
    }

    #[test]
    fn scan_overlapping_an_invalidation_is_not_stored() {
        let cache = ScanCache::in_memory();

        let ticket = cache.begin_scan();
        cache.invalidate_lineage("/data/sub/victim.bin");
        let (entry, stored) = cache.put_scanned("/data", node("data", 9), Utc::now(), &ticket);
        assert!(!stored);
        assert_eq!(entry.node.size_bytes, 9);
        assert!(cache.get("/data").is_none());
        drop(ticket);

        // A scan of a sibling is unaffected, as is one started afterwards.
        let sibling = cache.begin_scan();
        let later = cache.begin_scan();
        cache.invalidate_subtree("/data/other");
        assert!(cache.put_scanned("/data/sub", node("sub", 1), Utc::now(), &sibling).1);
        assert!(!cache.put_scanned("/data", node("data", 1), Utc::now(), &later).1);
        drop((sibling, later));

        let fresh = cache.begin_scan();
        assert!(cache.put_scanned("/data", node("data", 1), Utc::now(), &fresh).1);
    }

    #[test]
    fn deleting_an_ancestor_fences_the_scan() {
        let cache = ScanCache::in_memory();
        let ticket = cache.begin_scan();
        cache.invalidate_lineage("/data");
        assert!(!cache.put_scanned("/data/sub", node("sub", 1), Utc::now(), &ticket).1);
    }

    #[test]
    fn survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let cache = ScanCache::load(Box::new(store.clone()));
        cache.put("/data", node("data", 42), Utc::now());
        cache.set_volumes(
            vec![VolumeInfo {
                name: "root".into(),
                path: "/".into(),
                total_bytes: 10,
                used_bytes: 4,
                available_bytes: 6,
                approximate: false,
            }],
            Utc::now(),
        );

        let reloaded = ScanCache::load(Box::new(store));
        assert_eq!(reloaded.get("/data").unwrap().node.size_bytes, 42);
        assert_eq!(reloaded.volumes().0.len(), 1);
        assert!(reloaded.volumes().1.is_some());
    }

    #[test]
    fn corrupt_snapshot_starts_cold() {
        let cache = ScanCache::load(Box::new(MemoryStore::with_contents("{not json")));
        assert!(cache.is_empty());
        assert!(cache.volumes().0.is_empty());

        let wrong_version = r#"{"version":99,"entries":{},"volumes":[],"volumesUpdated":null,"lastUpdated":null}"#;
        let cache = ScanCache::load(Box::new(MemoryStore::with_contents(wrong_version)));
        assert!(cache.is_empty());
    }

    #[test]
    fn freshness_respects_max_age() {
        let entry = CacheEntry {
            path_key: "/a".into(),
            node: node("a", 1),
            computed_at: Utc::now() - chrono::Duration::seconds(120),
        };
        let now = Utc::now();
        assert!(entry.is_fresh(None, now));
        assert!(entry.is_fresh(Some(Duration::from_secs(600)), now));
        assert!(!entry.is_fresh(Some(Duration::from_secs(60)), now));
    }
}
