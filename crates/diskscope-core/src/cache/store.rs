/// Durable storage behind the scan cache.
///
/// The cache serialises itself; a store only moves opaque bytes, so tests
/// can swap the JSON file for memory without touching cache logic.
use crate::error::{EngineError, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub trait CacheStore: Send + Sync {
    /// Last saved snapshot, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored snapshot.
    fn save(&self, bytes: &[u8]) -> Result<()>;
}

impl<T: CacheStore + ?Sized> CacheStore for Arc<T> {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        (**self).load()
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        (**self).save(bytes)
    }
}

/// Snapshot stored as a JSON file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(EngineError::io(&self.path, err)),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| EngineError::io(parent, err))?;
        }
        let tmp = self.temp_path();
        fs::write(&tmp, bytes).map_err(|err| EngineError::io(&tmp, err))?;
        fs::rename(&tmp, &self.path).map_err(|err| EngineError::io(&self.path, err))
    }
}

/// In-memory store. Counts saves so tests can check persistence happens.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bytes: Mutex<Option<Vec<u8>>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing (possibly corrupt) contents.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.into())),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.lock().clone())
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.lock() = Some(bytes.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
