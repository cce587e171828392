/// End-to-end engine tests.
///
/// These exercise the public `Engine` API on a real tokio runtime against
/// real temporary directories: cache hits, per-key scan coalescing,
/// deletion with cache reconciliation, volume listing with fallbacks,
/// events and persistence across engine restarts.
use diskscope_core::cache::{JsonFileStore, ScanCache};
use diskscope_core::path;
use diskscope_core::platform::VolumeSource;
use diskscope_core::{
    Engine, EngineConfig, EngineError, EngineEvent, ErrorCategory, Result, Settings,
    SharedSettings, StaticSettings, VolumeInfo,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Volume source that counts calls and can be switched into failure.
#[derive(Default)]
struct FakeVolumes {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl FakeVolumes {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VolumeSource for FakeVolumes {
    fn list(&self) -> Result<Vec<VolumeInfo>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::PlatformCommandFailed {
                command: "fake".into(),
                details: "switched off".into(),
            });
        }
        Ok(vec![
            volume("/", 1_000, 400),
            volume("/mnt/empty", 0, 0),
            volume("/home", 2_000, 500),
        ])
    }
}

fn volume(mount: &str, total: u64, used: u64) -> VolumeInfo {
    VolumeInfo {
        name: path::display_name(mount),
        path: mount.to_string(),
        total_bytes: total,
        used_bytes: used,
        available_bytes: total - used,
        approximate: false,
    }
}

fn build_data_tree(root: &Path) -> PathBuf {
    let data = root.join("data");
    fs::create_dir_all(data.join("sub")).unwrap();
    fs::write(data.join("a.txt"), vec![0u8; 100]).unwrap();
    fs::write(data.join("b.txt"), vec![0u8; 50]).unwrap();
    fs::write(data.join("sub/c.txt"), vec![0u8; 25]).unwrap();
    data
}

fn engine_with(settings: Settings, volumes: Arc<FakeVolumes>) -> Engine {
    let config = EngineConfig {
        worker_threads: 4,
        ..EngineConfig::default()
    };
    Engine::new(
        config,
        Arc::new(StaticSettings(settings)),
        volumes,
        ScanCache::in_memory(),
    )
    .unwrap()
}

fn engine() -> Engine {
    engine_with(Settings::default(), Arc::new(FakeVolumes::default()))
}

fn key(path: &Path) -> String {
    path::normalize(&path.to_string_lossy())
}

// ── analyze ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_then_cache_hit() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();

    let first = engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.path_key, key(&data));
    assert_eq!(first.tree.size_bytes, 175);

    let second = engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.tree, first.tree);
    assert_eq!(second.last_updated, first.last_updated);

    let stats = engine.stats();
    assert_eq!(stats.walks_started, 1);
    assert_eq!(stats.cache_hits, 1);
}

/// Differently spelled paths share one cache key.
#[tokio::test]
async fn equivalent_spellings_share_a_key() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();

    engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    let messy = format!("{}/./sub/..//", data.to_string_lossy());
    let again = engine.analyze(&messy, false).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(engine.stats().walks_started, 1);
}

#[tokio::test]
async fn force_refresh_rescans() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();
    let path = data.to_string_lossy().into_owned();

    engine.analyze(&path, false).await.unwrap();
    fs::write(data.join("new.bin"), vec![0u8; 1_000]).unwrap();

    let stale = engine.analyze(&path, false).await.unwrap();
    assert_eq!(stale.tree.size_bytes, 175);

    let fresh = engine.analyze(&path, true).await.unwrap();
    assert!(!fresh.from_cache);
    assert_eq!(fresh.tree.size_bytes, 1_175);
    assert_eq!(fresh.tree.children[0].name, "new.bin");
    assert_eq!(engine.stats().walks_started, 2);
}

/// With auto-refresh on, an entry older than the interval is a miss.
#[tokio::test]
async fn auto_refresh_expires_entries() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let settings = Settings {
        auto_refresh: true,
        refresh_interval_secs: 0,
        ..Settings::default()
    };
    let engine = engine_with(settings, Arc::new(FakeVolumes::default()));
    let path = data.to_string_lossy().into_owned();

    engine.analyze(&path, false).await.unwrap();
    let again = engine.analyze(&path, false).await.unwrap();
    assert!(!again.from_cache);
    assert_eq!(engine.stats().walks_started, 2);
}

/// Settings changed by the shell apply to the next scan.
#[tokio::test]
async fn shared_settings_reach_the_next_scan() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    fs::write(data.join(".hidden"), vec![0u8; 10]).unwrap();

    let shared = SharedSettings::default();
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(shared.clone()),
        Arc::new(FakeVolumes::default()),
        ScanCache::in_memory(),
    )
    .unwrap();
    let path = data.to_string_lossy().into_owned();

    assert_eq!(engine.analyze(&path, false).await.unwrap().tree.size_bytes, 175);
    shared.update(Settings {
        show_hidden: true,
        ..Settings::default()
    });
    assert_eq!(engine.analyze(&path, true).await.unwrap().tree.size_bytes, 185);
}

/// Many concurrent requests for one key run exactly one walk and all see
/// the same tree.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_analyze_is_coalesced() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    for i in 0..200 {
        fs::write(data.join(format!("f{i:03}.bin")), vec![0u8; 10]).unwrap();
    }
    let engine = engine();
    let path = data.to_string_lossy().into_owned();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let path = path.clone();
            tokio::spawn(async move { engine.analyze(&path, false).await })
        })
        .collect();

    let mut trees = Vec::new();
    for handle in handles {
        trees.push(handle.await.unwrap().unwrap().tree);
    }
    assert!(trees.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(trees[0].size_bytes, 2_175);

    let stats = engine.stats();
    assert_eq!(stats.walks_started, 1);
    assert_eq!(stats.coalesced + stats.cache_hits, 7);
}

/// A caller that gives up does not cancel the scan: its result still
/// lands in the cache.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_caller_still_populates_cache() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();
    let path = data.to_string_lossy().into_owned();

    // Poll the request once so it registers its scan, then drop it.
    tokio::select! {
        biased;
        _ = engine.analyze(&path, false) => panic!("cold cache cannot answer on first poll"),
        _ = std::future::ready(()) => {}
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    while engine.cache().get(&key(&data)).is_none() {
        assert!(
            std::time::Instant::now() < deadline,
            "scan never reached the cache"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let analysis = engine.analyze(&path, false).await.unwrap();
    assert!(analysis.from_cache);
    assert_eq!(engine.stats().walks_started, 1);
    assert_eq!(analysis.tree.size_bytes, 175);
}

/// A failed scan surfaces a structured failure and drops the cached entry.
#[tokio::test]
async fn failed_analyze_invalidates_entry() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();
    let path = data.to_string_lossy().into_owned();

    engine.analyze(&path, false).await.unwrap();
    fs::remove_dir_all(&data).unwrap();

    let failure = engine.analyze(&path, true).await.unwrap_err();
    assert_eq!(failure.category, ErrorCategory::RootUnreadable);
    assert!(engine.cache().get(&key(&data)).is_none());
}

// ── delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_invalidates_ancestors_and_subtree() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();
    let sub = data.join("sub");

    engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    engine.analyze(&sub.to_string_lossy(), false).await.unwrap();
    engine.analyze(&tmp.path().to_string_lossy(), false).await.unwrap();
    let sibling = tmp.path().join("other");
    fs::create_dir_all(&sibling).unwrap();
    engine.analyze(&sibling.to_string_lossy(), false).await.unwrap();

    let outcome = engine.delete(&sub.to_string_lossy()).await;
    assert!(outcome.success, "{}", outcome.message);
    assert!(!sub.exists());

    let cache = engine.cache();
    assert!(cache.get(&key(&sub)).is_none());
    assert!(cache.get(&key(&data)).is_none());
    assert!(cache.get(&key(tmp.path())).is_none());
    assert!(
        cache.get(&key(&sibling)).is_some(),
        "unrelated entries must survive"
    );

    let after = engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    assert!(!after.from_cache);
    assert_eq!(after.tree.size_bytes, 150);
}

/// A delete that lands while an ancestor is being scanned must not leave
/// that scan's tree, which may still count the deleted bytes, in the cache.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delete_during_ancestor_scan_leaves_no_stale_entry() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("root");
    for d in 0..20 {
        let dir = root.join(format!("d{d:02}"));
        fs::create_dir_all(&dir).unwrap();
        for f in 0..200 {
            fs::write(dir.join(format!("f{f:03}")), b"x").unwrap();
        }
    }
    let victim = root.join("victim.bin");
    fs::write(&victim, vec![0u8; 100_000]).unwrap();

    let engine = engine();
    let path = root.to_string_lossy().into_owned();
    let scan = {
        let engine = engine.clone();
        let path = path.clone();
        tokio::spawn(async move { engine.analyze(&path, false).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;

    let outcome = engine.delete(&victim.to_string_lossy()).await;
    assert!(outcome.success, "{}", outcome.message);
    scan.await.unwrap().unwrap();

    let after = engine.analyze(&path, false).await.unwrap();
    assert!(after.tree.child("victim.bin").is_none());
    assert_eq!(after.tree.size_bytes, 4_000);
    assert_eq!(
        engine.cache().get(&key(&root)).unwrap().node.size_bytes,
        4_000
    );
}

/// Relative and absolute spellings of a directory share one key, so a
/// delete through the absolute path reaches the entry cached through the
/// relative one.
#[cfg(unix)]
#[tokio::test]
async fn relative_paths_are_anchored_at_the_current_dir() {
    let tmp = TempDir::new().unwrap();
    let base = tmp.path().canonicalize().unwrap();
    let data = build_data_tree(&base);
    let engine = engine();
    std::env::set_current_dir(&base).unwrap();

    let relative = engine.analyze("data", false).await.unwrap();
    assert_eq!(relative.path_key, key(&data));
    assert_eq!(relative.tree.size_bytes, 175);

    let outcome = engine.delete(&data.join("a.txt").to_string_lossy()).await;
    assert!(outcome.success, "{}", outcome.message);

    let after = engine.analyze("./data", false).await.unwrap();
    assert!(!after.from_cache);
    assert_eq!(after.tree.size_bytes, 75);
}

#[tokio::test]
async fn delete_single_file() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();

    let outcome = engine.delete(&data.join("a.txt").to_string_lossy()).await;
    assert!(outcome.success);
    assert_eq!(outcome.category, None);
    assert!(!data.join("a.txt").exists());
    assert!(data.join("b.txt").exists());
}

#[tokio::test]
async fn delete_refuses_volume_root() {
    let engine = engine();
    let outcome = engine.delete("root").await;
    assert!(!outcome.success);
    assert_eq!(outcome.category, Some(ErrorCategory::Other));
}

#[tokio::test]
async fn delete_missing_path_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let engine = engine();
    let outcome = engine
        .delete(&tmp.path().join("ghost").to_string_lossy())
        .await;
    assert!(!outcome.success);
    assert_eq!(outcome.category, Some(ErrorCategory::NotFound));
}

// ── volumes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_volumes_runs_command_once() {
    let source = Arc::new(FakeVolumes::default());
    let engine = engine_with(Settings::default(), source.clone());

    let first = engine.list_volumes(false).await;
    assert!(!first.degraded);
    assert!(first.last_updated.is_some());
    let paths: Vec<&str> = first.volumes.iter().map(|v| v.path.as_str()).collect();
    assert_eq!(paths, vec!["/", "/home"], "zero-size volumes are discarded");

    let second = engine.list_volumes(false).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(second.volumes, first.volumes);
    assert_eq!(second.last_updated, first.last_updated);

    engine.list_volumes(true).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn failed_enumeration_serves_stale_list() {
    let source = Arc::new(FakeVolumes::default());
    let engine = engine_with(Settings::default(), source.clone());

    let good = engine.list_volumes(false).await;
    source.fail.store(true, Ordering::SeqCst);

    let stale = engine.list_volumes(true).await;
    assert!(stale.degraded);
    assert_eq!(stale.volumes, good.volumes);
    assert_eq!(stale.last_updated, good.last_updated);
}

#[tokio::test]
async fn failed_enumeration_without_cache_uses_fallback() {
    let source = Arc::new(FakeVolumes::default());
    source.fail.store(true, Ordering::SeqCst);
    let engine = engine_with(Settings::default(), source.clone());

    let listing = engine.list_volumes(false).await;
    assert!(listing.degraded);
    assert_eq!(listing.volumes.len(), 1);
    assert!(listing.volumes[0].approximate);
    assert_eq!(listing.volumes[0].path, path::primary_root());

    // The fallback is never cached, so the next call tries again.
    let (cached, _) = engine.cache().volumes();
    assert!(cached.is_empty());
    engine.list_volumes(false).await;
    assert_eq!(source.calls(), 2);
}

// ── events & persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn events_follow_scan_and_delete() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let engine = engine();
    let events = engine.subscribe();
    let data_key = key(&data);

    engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    engine.delete(&data.join("b.txt").to_string_lossy()).await;

    let received: Vec<EngineEvent> = events.try_iter().collect();
    assert_eq!(
        received[0],
        EngineEvent::ScanStarted {
            path_key: data_key.clone()
        }
    );
    assert!(matches!(
        &received[1],
        EngineEvent::ScanCompleted { path_key, size_bytes: 175, .. } if *path_key == data_key
    ));
    assert!(matches!(
        &received[2],
        EngineEvent::Deleted { success: true, .. }
    ));
}

#[tokio::test]
async fn cache_survives_engine_restart() {
    let tmp = TempDir::new().unwrap();
    let data = build_data_tree(tmp.path());
    let cache_file = tmp.path().join("state/cache.json");
    let config = EngineConfig::default().with_cache_path(&cache_file);
    let path = data.to_string_lossy().into_owned();

    {
        let engine =
            Engine::open(config.clone(), Arc::new(StaticSettings::default())).unwrap();
        engine.analyze(&path, false).await.unwrap();
        engine.persist().unwrap();
    }
    assert!(cache_file.exists());

    let engine = Engine::open(config, Arc::new(StaticSettings::default())).unwrap();
    let restored = engine.analyze(&path, false).await.unwrap();
    assert!(restored.from_cache);
    assert_eq!(restored.tree.size_bytes, 175);
    assert_eq!(engine.stats().walks_started, 0);
}

#[tokio::test]
async fn corrupt_cache_file_starts_cold() {
    let tmp = TempDir::new().unwrap();
    let cache_file = tmp.path().join("cache.json");
    fs::write(&cache_file, b"\x00\x01 definitely not json").unwrap();

    let cache = ScanCache::load(Box::new(JsonFileStore::new(&cache_file)));
    assert!(cache.is_empty());

    let data = build_data_tree(tmp.path());
    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(StaticSettings::default()),
        Arc::new(FakeVolumes::default()),
        cache,
    )
    .unwrap();
    let analysis = engine.analyze(&data.to_string_lossy(), false).await.unwrap();
    assert!(!analysis.from_cache);

    // The next persist overwrites the corrupt file with a valid snapshot.
    let reloaded = ScanCache::load(Box::new(JsonFileStore::new(&cache_file)));
    assert_eq!(reloaded.len(), 1);
}
