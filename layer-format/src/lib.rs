//! Random-access views over container image layers.
//!
//! A layer blob is an append-only tar stream. [`TarFs`] indexes such a stream
//! once and then serves path-based reads and directory listings from it, while
//! [`Layer`] and [`LayerCache`] make sure each distinct layer is only ever
//! decompressed to local storage once per process.

mod cache;
mod error;
mod file;
mod index;
mod layer;
pub mod path;
mod progress;
mod record;

#[cfg(test)]
mod test_util;

pub use cache::{CacheOptions, CleanupFailure, CleanupReport, LayerCache, DEFAULT_CACHE_PREFIX};
pub use error::{Error, Result};
pub use file::reader::{DirHandle, FileHandle, Handle};
pub use file::TarFs;
pub use index::Index;
pub use layer::{BlobSource, FileBlob, Layer};
pub use progress::DEFAULT_PROGRESS_INTERVAL;
pub use record::{Entry, EntryId, EntryKind, FileInfo, Header};
