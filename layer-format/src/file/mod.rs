use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::index::Index;
use crate::path;
use crate::record::{EntryKind, FileInfo, Header};

pub mod reader;

use self::reader::{DirHandle, FileHandle, Handle, SharedStream};

#[derive(Debug)]
pub(crate) struct Inner<R> {
    pub(crate) stream: SharedStream<R>,
    pub(crate) index: Index,
}

/// A read-only filesystem over a single tar stream.
///
/// Built once by scanning the whole stream, immutable afterwards. Cloning is
/// cheap and clones share the stream and index. Reads from all handles are
/// serialized on the stream; separate `TarFs` values are independent.
#[derive(Debug)]
pub struct TarFs<R = File> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for TarFs<R> {
    fn clone(&self) -> Self {
        TarFs {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Read + Seek> TarFs<R> {
    /// Indexes `reader` from its current position to the end of the archive.
    pub fn new(mut reader: R) -> Result<TarFs<R>> {
        let base = reader.stream_position()?;
        let index = Index::build(BufReader::new(&mut reader), base)?;

        Ok(TarFs {
            inner: Arc::new(Inner {
                stream: SharedStream::new(reader),
                index,
            }),
        })
    }
}

impl<R> TarFs<R> {
    #[inline(always)]
    pub fn index(&self) -> &Index {
        &self.inner.index
    }

    /// Metadata for `path` without opening it. Hard links are not resolved.
    pub fn metadata(&self, path: &str) -> Result<&Header> {
        let normalized = path::normalize(path);
        self.index()
            .get(&normalized)
            .map(|id| self.index().entry(id).header())
            .ok_or_else(|| Error::NotExist {
                path: path.to_string(),
            })
    }

    /// Opens a member by path, following one hard link.
    pub fn open(&self, path: &str) -> Result<Handle<R>> {
        let index = self.index();
        let normalized = path::normalize(path);

        let mut id = index.get(&normalized).ok_or_else(|| Error::NotExist {
            path: path.to_string(),
        })?;

        let header = index.entry(id).header();
        if header.kind() == EntryKind::HardLink {
            let target = header.link_name().unwrap_or_default();
            id = index.get(target).ok_or_else(|| Error::LinkTargetMissing {
                path: normalized.clone(),
                target: target.to_string(),
            })?;
        }

        let fs = Arc::clone(&self.inner);
        Ok(match index.entry(id).header().kind() {
            EntryKind::Directory => Handle::Directory(DirHandle::new(fs, id)),
            _ => Handle::File(FileHandle::new(fs, id)),
        })
    }

    /// Lists the direct children of a directory.
    pub fn list_directory(&self, path: &str) -> Result<Vec<FileInfo>> {
        let mut dir = self.open(path)?.into_dir()?;
        let dir_path = dir.metadata().path().to_string();

        Ok(dir
            .read_children(-1)?
            .iter()
            .map(|header| FileInfo::new(&dir_path, header))
            .collect())
    }
}

impl<R: Read + Seek> TarFs<R> {
    /// Reads the whole content of a member.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut file = self.open(path)?.into_file()?;
        let mut buf = Vec::with_capacity(file.len() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}
