use std::io;

use tar::{EntryType, Header};

pub(crate) const MTIME: u64 = 1_704_067_200;

pub(crate) struct TarBuilder(tar::Builder<Vec<u8>>);

impl TarBuilder {
    pub(crate) fn new() -> TarBuilder {
        TarBuilder(tar::Builder::new(Vec::new()))
    }

    fn header(ty: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(ty);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(MTIME);
        header
    }

    pub(crate) fn dir(self, path: &str) -> TarBuilder {
        self.dir_with_mode(path, 0o755)
    }

    pub(crate) fn dir_with_mode(mut self, path: &str, mode: u32) -> TarBuilder {
        let mut header = Self::header(EntryType::Directory, mode, 0);
        self.0.append_data(&mut header, path, io::empty()).unwrap();
        self
    }

    pub(crate) fn file(mut self, path: &str, content: &[u8]) -> TarBuilder {
        let mut header = Self::header(EntryType::Regular, 0o644, content.len() as u64);
        self.0.append_data(&mut header, path, content).unwrap();
        self
    }

    /// Writes the name field verbatim, bypassing the builder's path cleanup.
    pub(crate) fn raw_file(mut self, name: &str, content: &[u8]) -> TarBuilder {
        let mut header = Self::header(EntryType::Regular, 0o644, content.len() as u64);
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();
        self.0.append(&header, content).unwrap();
        self
    }

    /// Size and mtime live only in a preceding PAX record; the header says 0.
    pub(crate) fn pax_file(mut self, path: &str, content: &[u8], mtime: &str) -> TarBuilder {
        let size = content.len().to_string();
        self.0
            .append_pax_extensions([("size", size.as_bytes()), ("mtime", mtime.as_bytes())])
            .unwrap();

        let mut header = Self::header(EntryType::Regular, 0o644, 0);
        header.set_mtime(0);
        header.set_path(path).unwrap();
        header.set_cksum();
        self.0.append(&header, content).unwrap();
        self
    }

    pub(crate) fn hard_link(mut self, path: &str, target: &str) -> TarBuilder {
        let mut header = Self::header(EntryType::Link, 0o644, 0);
        header.set_link_name(target).unwrap();
        self.0.append_data(&mut header, path, io::empty()).unwrap();
        self
    }

    pub(crate) fn symlink(mut self, path: &str, target: &str) -> TarBuilder {
        let mut header = Self::header(EntryType::Symlink, 0o777, 0);
        header.set_link_name(target).unwrap();
        self.0.append_data(&mut header, path, io::empty()).unwrap();
        self
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.0.into_inner().unwrap()
    }
}

/// `dir1/`, `dir1/dir2/`, `file1.txt`, `dir1/file2.txt`, `dir1/dir2/file3.txt`.
pub(crate) fn sample_tar() -> Vec<u8> {
    TarBuilder::new()
        .dir("dir1/")
        .dir("dir1/dir2/")
        .file("file1.txt", b"Hello, World!")
        .file("dir1/file2.txt", b"Hello from dir1!")
        .file("dir1/dir2/file3.txt", b"Hello from dir2!")
        .finish()
}
