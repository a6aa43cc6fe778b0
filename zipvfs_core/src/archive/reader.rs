use super::{check_method, from_zip_time, load_bytes, map_zip_error};
use crate::location::ArchiveLocation;
use crate::path;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::time::SystemTime;
use tracing::debug;
use zip::ZipArchive;
use zipvfs_common::{CancelToken, FileInfo, VfsError};

/// Upper bound on the buffer reserved from a declared entry size
const MAX_PREALLOCATION: u64 = 1 << 20;

/// One record of an archive's central directory, with its name normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub index: usize,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl Entry {
    pub fn info(&self) -> FileInfo {
        let name = path::simple_name(&self.path);
        if self.is_dir {
            FileInfo::directory(name, self.modified)
        } else {
            FileInfo::file(name, self.size, self.modified)
        }
    }
}

/// Read-only view of one archive generation
///
/// Nothing is cached across readers; every store operation opens a fresh one
/// so that writes made through another store are always observed.
pub struct ArchiveReader {
    location: ArchiveLocation,
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ArchiveReader {
    /// `Ok(None)` when the archive does not exist
    pub fn open(location: &ArchiveLocation) -> Result<Option<Self>, VfsError> {
        match load_bytes(location)? {
            Some(bytes) => Self::from_bytes(location.clone(), bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_bytes(location: ArchiveLocation, bytes: Vec<u8>) -> Result<Self, VfsError> {
        let archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| map_zip_error(&location, e))?;
        debug!("Opened archive {} with {} entries", location, archive.len());
        Ok(Self { location, archive })
    }

    pub fn location(&self) -> &ArchiveLocation {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Enumerates every entry
    ///
    /// Fails as a whole if any entry uses an encoding that cannot be decoded.
    pub fn entries(&mut self, cancel: &CancelToken) -> Result<Vec<Entry>, VfsError> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            cancel.check()?;
            let file = self
                .archive
                .by_index_raw(index)
                .map_err(|e| map_zip_error(&self.location, e))?;
            check_method(&self.location, file.name(), file.compression())?;

            let entry_path = path::normalize(file.name());
            if entry_path.is_empty() {
                continue;
            }
            entries.push(Entry {
                index,
                path: entry_path,
                is_dir: file.is_dir(),
                size: file.size(),
                modified: from_zip_time(file.last_modified()),
            });
        }
        Ok(entries)
    }

    /// Immediate children of `dir`, explicit entries merged with synthesized
    /// directories and deduplicated by path
    pub fn children(&mut self, dir: &str, cancel: &CancelToken) -> Result<Vec<FileInfo>, VfsError> {
        let mut children: BTreeMap<String, FileInfo> = BTreeMap::new();
        for entry in self.entries(cancel)? {
            let Some(child) = path::child_segment(dir, &entry.path) else {
                continue;
            };
            if child == entry.path {
                children.insert(entry.path.clone(), entry.info());
            } else {
                children
                    .entry(child.to_string())
                    .or_insert_with(|| FileInfo::directory(path::simple_name(child), None));
            }
        }
        Ok(children.into_values().collect())
    }

    /// Finds `target`: the explicit entry if there is one, otherwise a
    /// synthesized directory if some entry lies below it.
    pub fn lookup(&mut self, target: &str, cancel: &CancelToken) -> Result<Option<Entry>, VfsError> {
        let entries = self.entries(cancel)?;
        if let Some(entry) = entries.iter().find(|entry| entry.path == target) {
            return Ok(Some(entry.clone()));
        }
        if target.is_empty() || entries.iter().any(|entry| path::is_ancestor(target, &entry.path)) {
            return Ok(Some(Entry {
                index: usize::MAX,
                path: target.to_string(),
                is_dir: true,
                size: 0,
                modified: None,
            }));
        }
        Ok(None)
    }

    /// Decompresses the whole content of the file at `target`
    pub fn read(&mut self, target: &str) -> Result<Vec<u8>, VfsError> {
        let entry = self
            .lookup(target, &CancelToken::new())?
            .ok_or_else(|| VfsError::NotFound(target.to_string()))?;
        if entry.is_dir {
            return Err(VfsError::IsDirectory(target.to_string()));
        }

        let mut file = self
            .archive
            .by_index(entry.index)
            .map_err(|e| map_zip_error(&self.location, e))?;
        let mut content = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }
}
