use std::collections::HashMap;
use std::io::Read;

use crate::error::{Error, Result};
use crate::path;
use crate::record::{Entry, EntryId, EntryKind, Header};

const PAX_MTIME: &str = "mtime";

/// Path-keyed metadata of every member of one archive.
///
/// Entries live in a flat arena addressed by [`EntryId`]; the synthetic root
/// always occupies the first slot. Only metadata is retained, never content.
#[derive(Debug)]
pub struct Index {
    entries: Vec<Entry>,
    paths: HashMap<String, EntryId>,
}

impl Default for Index {
    fn default() -> Self {
        let mut paths = HashMap::new();
        paths.insert(path::ROOT.to_string(), EntryId::ROOT);

        Index {
            entries: vec![Entry {
                header: Header::root(),
                offset: 0,
                children: vec![],
            }],
            paths,
        }
    }
}

impl Index {
    /// Scans a tar stream once, from its current position to its logical end.
    ///
    /// `base` is the absolute stream position the scan starts from, so that
    /// recorded content offsets are absolute. Fails on the first corrupt header
    /// and never returns a partial index.
    pub fn build<R: Read>(reader: R, base: u64) -> Result<Index> {
        let mut archive = tar::Archive::new(reader);
        let mut index = Index::default();

        for entry in archive.entries().map_err(Error::format)? {
            let mut entry = entry.map_err(Error::format)?;
            let pax_mtime = pax_mtime(&mut entry)?;
            let header = entry.header();

            let kind = EntryKind::from(header.entry_type());
            let mode = header.mode().map_err(Error::format)?;
            let mtime = match pax_mtime {
                Some(mtime) => mtime,
                None => header.mtime().map_err(Error::format)?,
            };
            // Includes a PAX `size` override; the raw header may hold 0.
            let size = entry.size();
            let path = path::normalize(&String::from_utf8_lossy(&entry.path_bytes()));

            // Hard links name another member and are looked up in the index;
            // symlink targets are kept verbatim.
            let link_name = entry.link_name_bytes().map(|name| {
                let name = String::from_utf8_lossy(&name);
                match kind {
                    EntryKind::HardLink => path::normalize(&name),
                    _ => name.into_owned(),
                }
            });

            index.insert(Entry {
                header: Header {
                    path,
                    kind,
                    size,
                    mode,
                    mtime,
                    link_name,
                },
                offset: base + entry.raw_file_position(),
                children: vec![],
            });
        }

        tracing::debug!(entries = index.len(), "indexed archive");
        Ok(index)
    }

    #[inline(always)]
    pub fn get(&self, path: &str) -> Option<EntryId> {
        self.paths.get(path).copied()
    }

    #[inline(always)]
    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.0]
    }

    #[inline(always)]
    pub fn root(&self) -> &Entry {
        self.entry(EntryId::ROOT)
    }

    /// Number of entries, including the synthetic root.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    fn insert(&mut self, entry: Entry) -> EntryId {
        if entry.header.path == path::ROOT {
            let root = &mut self.entries[EntryId::ROOT.0].header;
            root.mode = entry.header.mode;
            root.mtime = entry.header.mtime;
            return EntryId::ROOT;
        }

        // A repeated path replaces the earlier member where it stands.
        if let Some(id) = self.get(&entry.header.path) {
            let existing = &mut self.entries[id.0];
            let children = std::mem::take(&mut existing.children);
            *existing = entry;
            if existing.header.is_dir() {
                existing.children = children;
            }
            return id;
        }

        let id = EntryId(self.entries.len());
        let parent = path::parent(&entry.header.path).and_then(|p| self.get(p));

        self.paths.insert(entry.header.path.clone(), id);
        self.entries.push(entry);

        if let Some(parent) = parent {
            self.entries[parent.0].children.push(id);
        }

        id
    }
}

/// Whole seconds of the PAX `mtime` record preceding `entry`, if any.
fn pax_mtime<R: Read>(entry: &mut tar::Entry<'_, R>) -> Result<Option<u64>> {
    let extensions = match entry.pax_extensions().map_err(Error::format)? {
        Some(extensions) => extensions,
        None => return Ok(None),
    };

    let mtime = extensions
        .flatten()
        .find(|ext| ext.key() == Ok(PAX_MTIME))
        .and_then(|ext| ext.value().ok())
        .and_then(|value| value.split('.').next())
        .and_then(|secs| secs.parse().ok());

    Ok(mtime)
}
