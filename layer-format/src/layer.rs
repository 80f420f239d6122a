use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, prelude::*, BufWriter, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::LayerCache;
use crate::error::{Error, Result};
use crate::file::TarFs;
use crate::progress::{Progress, ProgressReader, DEFAULT_PROGRESS_INTERVAL};
use crate::record::FileInfo;

/// Progress reported once the cache file exists and content is requested.
const PROGRESS_COPY_START: f64 = 0.2;
/// Progress reported once the content is on disk and indexing begins.
const PROGRESS_COPY_END: f64 = 0.8;
/// Progress reported when a cached archive was found and is being indexed.
const PROGRESS_CACHE_HIT: f64 = 0.5;

/// Where a layer's bytes come from.
pub trait BlobSource: Send + Sync {
    /// Stable content identifier, used as the cache key.
    fn diff_id(&self) -> &str;

    /// Declared uncompressed size. Only used for progress ratios.
    fn size(&self) -> u64;

    /// A fresh decompressed tar stream. Called again when a previous
    /// extraction failed.
    fn uncompressed(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// An uncompressed layer tarball on local disk.
#[derive(Debug, Clone)]
pub struct FileBlob {
    diff_id: String,
    path: PathBuf,
    size: u64,
}

impl FileBlob {
    /// Identified by its canonical path unless overridden with
    /// [`with_diff_id`](FileBlob::with_diff_id).
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<FileBlob> {
        let path = path.as_ref().canonicalize()?;
        let size = path.metadata()?.len();

        Ok(FileBlob {
            diff_id: path.display().to_string(),
            path,
            size,
        })
    }

    pub fn with_diff_id<S: Into<String>>(mut self, diff_id: S) -> FileBlob {
        self.diff_id = diff_id.into();
        self
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlobSource for FileBlob {
    fn diff_id(&self) -> &str {
        &self.diff_id
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn uncompressed(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// One image layer and, once initialized, its filesystem.
pub struct Layer {
    diff_id: String,
    size: u64,
    source: Arc<dyn BlobSource>,
    progress_interval: Duration,
    fs: Option<TarFs<File>>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("diff_id", &self.diff_id)
            .field("size", &self.size)
            .field("initialized", &self.fs.is_some())
            .finish()
    }
}

impl Layer {
    pub fn new(source: Arc<dyn BlobSource>) -> Layer {
        Layer {
            diff_id: source.diff_id().to_string(),
            size: source.size(),
            source,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            fs: None,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Layer {
        self.progress_interval = interval;
        self
    }

    #[inline(always)]
    pub fn diff_id(&self) -> &str {
        &self.diff_id
    }

    #[inline(always)]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.fs.is_some()
    }

    #[inline(always)]
    pub fn fs(&self) -> Option<&TarFs<File>> {
        self.fs.as_ref()
    }

    /// Makes the layer's filesystem available, reusing a cached extraction
    /// when `cache` has one.
    ///
    /// `progress` receives non-decreasing values in `[0, 1]`, ending with
    /// exactly `1.0` on success. On failure the layer stays uninitialized and
    /// may be initialized again.
    pub fn initialize<F: FnMut(f64)>(&mut self, cache: &LayerCache, progress: F) -> Result<()> {
        let mut progress = Progress::new(progress);

        if self.fs.is_some() {
            tracing::debug!(diff_id = %self.diff_id, "layer already initialized");
            progress.report(1.0);
            return Ok(());
        }

        progress.report(0.0);
        if self.initialize_from_cache(cache, &mut progress) {
            return Ok(());
        }

        // Another layer with the same identifier may be extracting right now;
        // wait for it and look again before extracting ourselves.
        let guard = cache.extraction_guard(&self.diff_id);
        let _lock = guard.lock();

        if self.initialize_from_cache(cache, &mut progress) {
            return Ok(());
        }

        self.create_new_layer(cache, &mut progress)
    }

    fn initialize_from_cache<F: FnMut(f64)>(
        &mut self,
        cache: &LayerCache,
        progress: &mut Progress<F>,
    ) -> bool {
        let path = match cache.lookup(&self.diff_id) {
            Some(path) => path,
            None => return false,
        };
        tracing::debug!(diff_id = %self.diff_id, path = %path.display(), "found cached layer");

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(diff_id = %self.diff_id, path = %path.display(), %error, "cannot open cached layer, extracting again");
                return false;
            }
        };

        progress.report(PROGRESS_CACHE_HIT);
        match TarFs::new(file) {
            Ok(fs) => {
                self.fs = Some(fs);
                progress.report(1.0);
                true
            }
            Err(error) => {
                tracing::warn!(diff_id = %self.diff_id, path = %path.display(), %error, "cannot index cached layer, extracting again");
                false
            }
        }
    }

    fn create_new_layer<F: FnMut(f64)>(
        &mut self,
        cache: &LayerCache,
        progress: &mut Progress<F>,
    ) -> Result<()> {
        let path = cache.scratch_file_path()?;
        tracing::debug!(diff_id = %self.diff_id, path = %path.display(), "extracting layer");

        match self.extract(&path, progress) {
            Ok(fs) => {
                cache.insert(self.diff_id.clone(), path);
                self.fs = Some(fs);
                progress.report(1.0);
                tracing::debug!(diff_id = %self.diff_id, "layer initialized");
                Ok(())
            }
            Err(e) => {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "cannot remove partial cache file")
                    }
                }
                Err(e)
            }
        }
    }

    fn extract<F: FnMut(f64)>(
        &self,
        path: &Path,
        progress: &mut Progress<F>,
    ) -> Result<TarFs<File>> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| Error::CreateCacheFile {
                path: path.to_path_buf(),
                source,
            })?;

        progress.report(PROGRESS_COPY_START);

        let blob = self
            .source
            .uncompressed()
            .map_err(|source| Error::OpenBlob {
                diff_id: self.diff_id.clone(),
                source,
            })?;

        {
            let mut reader = ProgressReader::new(blob, self.size, self.progress_interval, |f| {
                progress.report_within(PROGRESS_COPY_START, PROGRESS_COPY_END, f)
            });
            let mut writer = BufWriter::new(&mut file);
            io::copy(&mut reader, &mut writer)
                .and_then(|_| writer.flush())
                .map_err(|source| Error::CopyLayer {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        tracing::debug!(diff_id = %self.diff_id, "layer content copied");

        progress.report(PROGRESS_COPY_END);

        file.seek(SeekFrom::Start(0))
            .map_err(|source| Error::SeekCacheFile {
                path: path.to_path_buf(),
                source,
            })?;

        TarFs::new(file).map_err(|source| Error::IndexLayer {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    fn require_fs(&self) -> Result<&TarFs<File>> {
        self.fs.as_ref().ok_or_else(|| Error::NotInitialized {
            diff_id: self.diff_id.clone(),
        })
    }

    /// Lists the direct children of the directory at `path`.
    pub fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.require_fs()?.list_directory(path)
    }

    /// Reads the whole content of the file at `path`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.require_fs()?.read_file(path)
    }
}
