use std::fs::File;
use std::io::{self, prelude::*, SeekFrom};
use std::sync::{Arc, Mutex, PoisonError};

use super::Inner;
use crate::error::{Error, Result};
use crate::record::{EntryId, Header};

/// A stream shared by every handle of one filesystem.
///
/// Each positioned read saves the cursor, seeks, reads and restores the
/// cursor as one unit under the lock.
#[derive(Debug)]
pub(crate) struct SharedStream<R> {
    inner: Mutex<R>,
}

impl<R: Read + Seek> SharedStream<R> {
    pub(crate) fn new(reader: R) -> SharedStream<R> {
        SharedStream {
            inner: Mutex::new(reader),
        }
    }

    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let saved = stream.stream_position()?;
        stream.seek(SeekFrom::Start(offset))?;
        let result = read_full(&mut *stream, buf);
        let restored = stream.seek(SeekFrom::Start(saved));

        let n = result?;
        restored?;
        Ok(n)
    }
}

fn read_full<R: Read>(reader: &mut R, mut buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                buf = &mut buf[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Result of [`TarFs::open`](crate::TarFs::open).
#[derive(Debug)]
pub enum Handle<R = File> {
    File(FileHandle<R>),
    Directory(DirHandle<R>),
}

impl<R> Handle<R> {
    #[inline(always)]
    pub fn metadata(&self) -> &Header {
        match self {
            Handle::File(file) => file.metadata(),
            Handle::Directory(dir) => dir.metadata(),
        }
    }

    #[inline(always)]
    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }

    /// See [`DirHandle::read_children`]. Fails with `NotADirectory` on files.
    pub fn read_children(&mut self, n: isize) -> Result<Vec<Header>> {
        match self {
            Handle::Directory(dir) => dir.read_children(n),
            Handle::File(file) => Err(Error::NotADirectory {
                path: file.metadata().path().to_string(),
            }),
        }
    }

    pub fn into_file(self) -> Result<FileHandle<R>> {
        match self {
            Handle::File(file) => Ok(file),
            Handle::Directory(dir) => Err(Error::IsADirectory {
                path: dir.metadata().path().to_string(),
            }),
        }
    }

    pub fn into_dir(self) -> Result<DirHandle<R>> {
        match self {
            Handle::Directory(dir) => Ok(dir),
            Handle::File(file) => Err(Error::NotADirectory {
                path: file.metadata().path().to_string(),
            }),
        }
    }
}

/// A bounded view over `[offset, offset + size)` of the shared stream.
///
/// Seek positions are relative to the start of the member's content.
#[derive(Debug)]
pub struct FileHandle<R = File> {
    fs: Arc<Inner<R>>,
    id: EntryId,
    pos: u64,
}

impl<R> FileHandle<R> {
    pub(crate) fn new(fs: Arc<Inner<R>>, id: EntryId) -> FileHandle<R> {
        FileHandle { fs, id, pos: 0 }
    }

    #[inline(always)]
    pub fn metadata(&self) -> &Header {
        self.fs.index.entry(self.id).header()
    }

    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.metadata().size()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Read + Seek> Read for FileHandle<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let entry = self.fs.index.entry(self.id);
        let remaining = entry.header().size().saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let len = remaining.min(buf.len() as u64) as usize;
        let n = self
            .fs
            .stream
            .read_at(entry.offset() + self.pos, &mut buf[..len])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R> Seek for FileHandle<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::End(delta) => (self.len(), delta),
            SeekFrom::Current(delta) => (self.pos, delta),
        };

        match base.checked_add_signed(delta) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

/// A paginated cursor over a directory's children.
#[derive(Debug)]
pub struct DirHandle<R = File> {
    fs: Arc<Inner<R>>,
    id: EntryId,
    cursor: usize,
}

impl<R> DirHandle<R> {
    pub(crate) fn new(fs: Arc<Inner<R>>, id: EntryId) -> DirHandle<R> {
        DirHandle { fs, id, cursor: 0 }
    }

    #[inline(always)]
    pub fn metadata(&self) -> &Header {
        self.fs.index.entry(self.id).header()
    }

    /// Reads children in archive encounter order, advancing the cursor.
    ///
    /// With `n <= 0` every remaining child is returned, which is empty once the
    /// cursor is exhausted. With `n > 0` up to `n` children are returned and an
    /// exhausted cursor fails with `EndOfListing`.
    pub fn read_children(&mut self, n: isize) -> Result<Vec<Header>> {
        let index = &self.fs.index;
        let children = index.entry(self.id).children();
        let remaining = &children[self.cursor.min(children.len())..];

        let take = if n <= 0 {
            remaining.len()
        } else if remaining.is_empty() {
            return Err(Error::EndOfListing);
        } else {
            remaining.len().min(n as usize)
        };

        let out = remaining[..take]
            .iter()
            .map(|&id| index.entry(id).header().clone())
            .collect();
        self.cursor += take;
        Ok(out)
    }
}
