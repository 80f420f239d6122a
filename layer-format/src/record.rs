use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::path;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    HardLink,
    CharDevice,
    BlockDevice,
    Fifo,
    Other,
}

impl From<tar::EntryType> for EntryKind {
    fn from(ty: tar::EntryType) -> Self {
        use tar::EntryType;

        match ty {
            EntryType::Regular => EntryKind::File,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::Link => EntryKind::HardLink,
            EntryType::Char => EntryKind::CharDevice,
            EntryType::Block => EntryKind::BlockDevice,
            EntryType::Fifo => EntryKind::Fifo,
            _ => EntryKind::Other,
        }
    }
}

impl EntryKind {
    #[inline(always)]
    fn type_char(self) -> char {
        match self {
            EntryKind::File | EntryKind::HardLink => '-',
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::CharDevice => 'c',
            EntryKind::BlockDevice => 'b',
            EntryKind::Fifo => 'p',
            EntryKind::Other => '?',
        }
    }
}

/// Position of an [`Entry`] inside an [`Index`](crate::Index).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    pub(crate) const ROOT: EntryId = EntryId(0);

    pub fn get(self) -> usize {
        self.0
    }
}

/// Metadata of one archive member.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Header {
    pub(crate) path: String,
    pub(crate) kind: EntryKind,
    pub(crate) size: u64,
    pub(crate) mode: u32,
    pub(crate) mtime: u64,
    pub(crate) link_name: Option<String>,
}

impl Header {
    pub(crate) fn root() -> Header {
        Header {
            path: path::ROOT.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            mode: 0o777,
            mtime: 0,
            link_name: None,
        }
    }

    /// Normalized path of the member, relative to the archive root.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    #[inline(always)]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    #[inline(always)]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    #[inline(always)]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Permission bits as stored in the archive.
    #[inline(always)]
    pub fn mode(&self) -> u32 {
        self.mode
    }

    #[inline(always)]
    pub fn mod_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.mtime)
    }

    /// Target of a symbolic or hard link.
    #[inline(always)]
    pub fn link_name(&self) -> Option<&str> {
        self.link_name.as_deref()
    }

    /// `ls`-style rendering of the type and permission bits, e.g. `drwxr-xr-x`.
    pub fn mode_string(&self) -> String {
        mode_string(self.kind, self.mode)
    }

    /// Modification time rendered as `YYYY-MM-DD HH:MM:SS` in UTC.
    pub fn mod_time_string(&self) -> String {
        i64::try_from(self.mtime)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into())
    }
}

/// One indexed archive member: its header, where its content starts in the
/// stream and, for directories, its direct children in encounter order.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) header: Header,
    pub(crate) offset: u64,
    pub(crate) children: Vec<EntryId>,
}

impl Entry {
    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Byte offset of the member's content within the archive stream.
    #[inline(always)]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline(always)]
    pub fn children(&self) -> &[EntryId] {
        &self.children
    }
}

/// A flattened directory listing row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub is_dir: bool,
    pub path: String,
    pub size: u64,
    pub mode: String,
    pub mod_time: String,
}

impl FileInfo {
    pub(crate) fn new(dir: &str, header: &Header) -> FileInfo {
        FileInfo {
            name: header.name().to_string(),
            is_dir: header.is_dir(),
            path: path::join(dir, header.name()),
            size: header.size(),
            mode: header.mode_string(),
            mod_time: header.mod_time_string(),
        }
    }
}

macro_rules! add {
    ($ident:expr, $value:tt => $s:ident) => {
        if $ident {
            $s.push($value);
        } else {
            $s.push('-');
        }
    };
}

fn mode_string(kind: EntryKind, mode: u32) -> String {
    let mut s = String::with_capacity(10);
    s.push(kind.type_char());
    add!(mode & 0o400 != 0, 'r' => s);
    add!(mode & 0o200 != 0, 'w' => s);
    add!(mode & 0o100 != 0, 'x' => s);
    add!(mode & 0o040 != 0, 'r' => s);
    add!(mode & 0o020 != 0, 'w' => s);
    add!(mode & 0o010 != 0, 'x' => s);
    add!(mode & 0o004 != 0, 'r' => s);
    add!(mode & 0o002 != 0, 'w' => s);
    add!(mode & 0o001 != 0, 'x' => s);
    s
}
