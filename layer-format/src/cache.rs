use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tempfile::TempDir;

use crate::error::{Error, Result};

pub const DEFAULT_CACHE_PREFIX: &str = "layer-cache-";

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Directory the scratch directory is created in. Defaults to the system
    /// temporary directory.
    pub root: Option<PathBuf>,

    /// Name prefix of the scratch directory; a random suffix keeps it unique
    /// per process.
    pub prefix: String,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            root: None,
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    dir: Option<TempDir>,
    layers: HashMap<String, PathBuf>,
    next_file: usize,
}

/// A cached file that could not be removed during [`LayerCache::cleanup`].
#[derive(Debug)]
pub struct CleanupFailure {
    pub path: PathBuf,
    pub source: std::io::Error,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    #[inline(always)]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Maps layer content identifiers to extracted archives on local storage.
///
/// Constructed once by the application and shared by reference. Files live in
/// a single scratch directory created on first use and removed by
/// [`cleanup`](LayerCache::cleanup).
#[derive(Debug, Default)]
pub struct LayerCache {
    options: CacheOptions,
    state: RwLock<CacheState>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LayerCache {
    pub fn new() -> LayerCache {
        LayerCache::default()
    }

    pub fn with_options(options: CacheOptions) -> LayerCache {
        LayerCache {
            options,
            ..LayerCache::default()
        }
    }

    pub fn lookup(&self, diff_id: &str) -> Option<PathBuf> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.layers.get(diff_id).cloned()
    }

    pub fn insert<S: Into<String>>(&self, diff_id: S, path: PathBuf) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.layers.insert(diff_id.into(), path);
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.layers.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scratch directory, if it has been created.
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.dir.as_ref().map(|dir| dir.path().to_path_buf())
    }

    /// Returns a fresh file path inside the scratch directory, creating the
    /// directory on first use. Names are `layer-<n>.tar` with `n` counting up
    /// per allocation, so two callers never receive the same path.
    pub fn scratch_file_path(&self) -> Result<PathBuf> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let dir = match state.dir.take() {
            Some(dir) => dir,
            None => {
                let dir = self.create_dir()?;
                tracing::debug!(path = %dir.path().display(), "created cache directory");
                dir
            }
        };

        let path = dir.path().join(format!("layer-{}.tar", state.next_file));
        state.next_file += 1;
        state.dir = Some(dir);

        Ok(path)
    }

    fn create_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.options.prefix);

        let root = self
            .options
            .root
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        builder
            .tempdir_in(&root)
            .map_err(|source| Error::CacheDirInit { path: root, source })
    }

    /// Removes every cached file and the scratch directory.
    ///
    /// Removal failures are logged and collected; they never stop the
    /// remaining removals. Calling this again, or before anything was cached,
    /// does nothing.
    pub fn cleanup(&self) -> CleanupReport {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut report = CleanupReport::default();

        for (diff_id, path) in state.layers.drain() {
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed += 1,
                Err(source) => {
                    tracing::warn!(%diff_id, path = %path.display(), error = %source, "failed to remove cached layer");
                    report.failures.push(CleanupFailure { path, source });
                }
            }
        }

        if let Some(dir) = state.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(source) = dir.close() {
                tracing::warn!(path = %path.display(), error = %source, "failed to remove cache directory");
                report.failures.push(CleanupFailure { path, source });
            }
        }

        report
    }

    /// Lock that serializes extraction of one content identifier.
    pub(crate) fn extraction_guard(&self, diff_id: &str) -> ExtractionGuard<'_> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(in_flight.entry(diff_id.to_string()).or_default());

        ExtractionGuard {
            cache: self,
            diff_id: diff_id.to_string(),
            lock,
        }
    }
}

/// Shared claim on one identifier's extraction lock. The last claim to drop
/// removes the lock from the cache.
pub(crate) struct ExtractionGuard<'a> {
    cache: &'a LayerCache,
    diff_id: String,
    lock: Arc<Mutex<()>>,
}

impl ExtractionGuard<'_> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ExtractionGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Claims are only handed out under this lock, so the count is stable:
        // one for the map, one for us.
        if Arc::strong_count(&self.lock) == 2 {
            in_flight.remove(&self.diff_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn cache_in(root: &Path) -> LayerCache {
        LayerCache::with_options(CacheOptions {
            root: Some(root.to_path_buf()),
            prefix: "test-cache-".into(),
        })
    }

    #[test]
    fn lookup_and_insert() {
        let cache = LayerCache::new();
        assert!(cache.lookup("sha256:a").is_none());

        cache.insert("sha256:a", PathBuf::from("/tmp/layer-0.tar"));
        assert_eq!(cache.lookup("sha256:a"), Some(PathBuf::from("/tmp/layer-0.tar")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn scratch_dir_is_lazy_and_shared() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache_in(root.path());
        assert!(cache.scratch_dir().is_none());

        let a = cache.scratch_file_path().unwrap();
        let b = cache.scratch_file_path().unwrap();
        let dir = cache.scratch_dir().unwrap();

        assert!(dir.is_dir());
        assert!(dir.starts_with(root.path()));
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("test-cache-"));
        assert_eq!(a.parent().unwrap(), dir);
        assert_eq!(b.parent().unwrap(), dir);
        assert_ne!(a, b);
        assert_eq!(a.file_name().unwrap(), "layer-0.tar");
        assert_eq!(b.file_name().unwrap(), "layer-1.tar");
    }

    #[test]
    fn concurrent_first_use_creates_one_dir() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache_in(root.path());

        let paths: Vec<PathBuf> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.scratch_file_path().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let dir = cache.scratch_dir().unwrap();
        assert!(paths.iter().all(|p| p.parent().unwrap() == dir));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);

        let mut unique = paths.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), paths.len());
    }

    #[test]
    fn cleanup_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache_in(root.path());

        for id in ["sha256:a", "sha256:b"] {
            let path = cache.scratch_file_path().unwrap();
            std::fs::write(&path, b"layer").unwrap();
            cache.insert(id, path);
        }
        let dir = cache.scratch_dir().unwrap();

        let report = cache.cleanup();
        assert!(report.is_clean(), "{:?}", report);
        assert_eq!(report.removed, 2);
        assert!(!dir.exists());
        assert!(cache.is_empty());
        assert!(cache.scratch_dir().is_none());

        let again = cache.cleanup();
        assert!(again.is_clean());
        assert_eq!(again.removed, 0);
    }

    #[test]
    fn cleanup_without_use_is_noop() {
        let cache = LayerCache::new();
        let report = cache.cleanup();
        assert!(report.is_clean());
        assert_eq!(report.removed, 0);
    }

    #[test]
    fn cleanup_continues_past_failures() {
        let root = tempfile::tempdir().unwrap();
        let cache = cache_in(root.path());

        let kept = cache.scratch_file_path().unwrap();
        std::fs::write(&kept, b"layer").unwrap();
        cache.insert("sha256:kept", kept);
        cache.insert("sha256:gone", root.path().join("does-not-exist.tar"));
        let dir = cache.scratch_dir().unwrap();

        let report = cache.cleanup();
        assert_eq!(report.removed, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("does-not-exist.tar"));
        assert!(!dir.exists());
    }

    #[test]
    fn unusable_root_fails_dir_init() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let cache = cache_in(&file);
        let err = cache.scratch_file_path().unwrap_err();
        assert!(matches!(err, Error::CacheDirInit { .. }), "{:?}", err);
    }

    #[test]
    fn extraction_guard_is_per_identifier() {
        let cache = LayerCache::new();
        let a1 = cache.extraction_guard("a");
        let a2 = cache.extraction_guard("a");
        let b = cache.extraction_guard("b");
        assert!(Arc::ptr_eq(&a1.lock, &a2.lock));
        assert!(!Arc::ptr_eq(&a1.lock, &b.lock));
    }

    fn in_flight_len(cache: &LayerCache) -> usize {
        cache.in_flight.lock().unwrap().len()
    }

    #[test]
    fn extraction_guards_are_released() {
        let cache = LayerCache::new();

        {
            let guard = cache.extraction_guard("sha256:a");
            let _held = guard.lock();
            assert_eq!(in_flight_len(&cache), 1);
        }
        assert_eq!(in_flight_len(&cache), 0);

        let first = cache.extraction_guard("sha256:a");
        let second = cache.extraction_guard("sha256:a");
        let _other = cache.extraction_guard("sha256:b");
        assert_eq!(in_flight_len(&cache), 2);

        drop(first);
        assert_eq!(in_flight_len(&cache), 2);
        drop(second);
        assert_eq!(in_flight_len(&cache), 1);
    }
}
