use super::{check_method, compression_for, load_bytes, map_zip_error, to_zip_time, ArchiveContext, HandleLease};
use crate::location::ArchiveLocation;
use crate::path;
use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;
use tempfile::{NamedTempFile, SpooledTempFile};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};
use zipvfs_common::VfsError;

/// Content of an entry written through a handle
pub enum EntryContent {
    Bytes(Vec<u8>),
    /// Large payloads spilled to a temporary file by an output stream
    Spooled(SpooledTempFile),
}

impl EntryContent {
    fn copy_into<W: Write>(self, writer: &mut W) -> io::Result<()> {
        match self {
            EntryContent::Bytes(bytes) => writer.write_all(&bytes),
            EntryContent::Spooled(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                io::copy(&mut file, writer).map(|_| ())
            }
        }
    }
}

impl std::fmt::Debug for EntryContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryContent::Bytes(bytes) => write!(f, "Bytes({})", bytes.len()),
            EntryContent::Spooled(_) => write!(f, "Spooled"),
        }
    }
}

#[derive(Debug)]
enum Planned {
    /// An entry of the loaded generation, copied raw (possibly renamed)
    Copy { index: usize, path: String, is_dir: bool },
    Insert {
        path: String,
        content: EntryContent,
        len: u64,
        is_dir: bool,
        modified: SystemTime,
    },
}

impl Planned {
    fn path(&self) -> &str {
        match self {
            Planned::Copy { path, .. } | Planned::Insert { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut String {
        match self {
            Planned::Copy { path, .. } | Planned::Insert { path, .. } => path,
        }
    }

    fn is_dir(&self) -> bool {
        match self {
            Planned::Copy { is_dir, .. } | Planned::Insert { is_dir, .. } => *is_dir,
        }
    }

    fn marker(path: &str, modified: SystemTime) -> Self {
        Planned::Insert {
            path: path.to_string(),
            content: EntryContent::Bytes(Vec::new()),
            len: 0,
            is_dir: true,
            modified,
        }
    }
}

/// Random-access editing session over one archive
///
/// The handle holds the registry lease for its location from `open` until it
/// is committed or dropped. Edits are planned against the loaded generation
/// and only become visible when [`commit`](Self::commit) rebuilds the archive.
/// Dropping an uncommitted handle discards every planned edit.
pub struct ArchiveHandle<'a> {
    context: &'a ArchiveContext,
    location: ArchiveLocation,
    source: Option<ZipArchive<Cursor<Vec<u8>>>>,
    plan: Vec<Planned>,
    _lease: HandleLease<'a>,
}

impl<'a> ArchiveHandle<'a> {
    /// Acquires the location and loads the current generation. A missing
    /// archive opens as empty and is created on commit.
    pub fn open(context: &'a ArchiveContext, location: &ArchiveLocation) -> Result<Self, VfsError> {
        let lease = context.registry.acquire(location, context.config.contention)?;

        let mut source = match load_bytes(location)? {
            Some(bytes) => Some(
                ZipArchive::new(Cursor::new(bytes)).map_err(|e| map_zip_error(location, e))?,
            ),
            None => None,
        };

        let mut plan = Vec::new();
        if let Some(archive) = source.as_mut() {
            for index in 0..archive.len() {
                let file = archive
                    .by_index_raw(index)
                    .map_err(|e| map_zip_error(location, e))?;
                // Rewriting would carry entries this build cannot decode
                check_method(location, file.name(), file.compression())?;
                let entry_path = path::normalize(file.name());
                if !entry_path.is_empty() {
                    plan.push(Planned::Copy {
                        index,
                        path: entry_path,
                        is_dir: file.is_dir(),
                    });
                }
            }
        }

        debug!("Opened handle on {} ({} entries)", location, plan.len());
        Ok(Self {
            context,
            location: location.clone(),
            source,
            plan,
            _lease: lease,
        })
    }

    pub fn location(&self) -> &ArchiveLocation {
        &self.location
    }

    /// True if `target` is an entry or a synthesized directory
    pub fn exists(&self, target: &str) -> bool {
        target.is_empty()
            || self
                .plan
                .iter()
                .any(|item| item.path() == target || path::is_ancestor(target, item.path()))
    }

    pub fn is_dir(&self, target: &str) -> bool {
        if target.is_empty() {
            return true;
        }
        self.plan.iter().any(|item| {
            (item.path() == target && item.is_dir()) || path::is_ancestor(target, item.path())
        })
    }

    fn position(&self, target: &str) -> Option<usize> {
        self.plan.iter().position(|item| item.path() == target)
    }

    /// Adds explicit markers for `dir` and each missing ancestor
    pub fn ensure_dirs(&mut self, dir: &str) -> Result<(), VfsError> {
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            current = path::join(&current, segment);
            if self.is_dir(&current) {
                continue;
            }
            if self.exists(&current) {
                return Err(VfsError::NotADirectory(current));
            }
            self.plan.push(Planned::marker(&current, SystemTime::now()));
        }
        Ok(())
    }

    /// Creates or replaces the file at `target`
    pub fn write_file(&mut self, target: &str, content: EntryContent, len: u64) -> Result<(), VfsError> {
        if self.is_dir(target) {
            return Err(VfsError::IsDirectory(target.to_string()));
        }
        if let Some(parent) = path::parent(target) {
            self.ensure_dirs(parent)?;
        }

        let item = Planned::Insert {
            path: target.to_string(),
            content,
            len,
            is_dir: false,
            modified: SystemTime::now(),
        };
        match self.position(target) {
            Some(index) => self.plan[index] = item,
            None => self.plan.push(item),
        }
        Ok(())
    }

    /// Creates the directory and its parents; an existing directory is kept as is
    pub fn mkdir(&mut self, target: &str) -> Result<(), VfsError> {
        if self.is_dir(target) {
            return Ok(());
        }
        if self.exists(target) {
            return Err(VfsError::NotADirectory(target.to_string()));
        }
        self.ensure_dirs(target)
    }

    /// Removes `target` and everything below it. Returns whether anything was removed.
    pub fn remove(&mut self, target: &str) -> bool {
        let before = self.plan.len();
        self.plan
            .retain(|item| item.path() != target && !path::is_ancestor(target, item.path()));
        before != self.plan.len()
    }

    /// Renames `from` (and its subtree) to `to`, replacing a file at `to`.
    /// An existing directory at `to` is never replaced. Entries keep their
    /// compressed bytes.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), VfsError> {
        if from == to {
            return Ok(());
        }
        if from.is_empty()
            || to.is_empty()
            || path::is_ancestor(from, to)
            || path::is_ancestor(to, from)
        {
            return Err(VfsError::Unsupported(format!(
                "Cannot move {} to {}",
                display_path(from),
                display_path(to)
            )));
        }
        if !self.exists(from) {
            return Err(VfsError::NotFound(from.to_string()));
        }
        if self.is_dir(to) {
            return Err(VfsError::AlreadyExists(to.to_string()));
        }

        self.remove(to);
        if let Some(parent) = path::parent(to) {
            self.ensure_dirs(parent)?;
        }
        for item in self.plan.iter_mut() {
            if let Some(renamed) = path::rebase(item.path(), from, to) {
                *item.path_mut() = renamed;
            }
        }
        Ok(())
    }

    /// Sets the DOS timestamp of `target`. A synthesized directory gets an
    /// explicit marker so the timestamp has somewhere to live.
    pub fn set_modified(&mut self, target: &str, modified: SystemTime) -> Result<(), VfsError> {
        let Some(index) = self.position(target) else {
            if !target.is_empty() && self.is_dir(target) {
                self.plan.push(Planned::marker(target, modified));
                return Ok(());
            }
            return Err(VfsError::NotFound(display_path(target).to_string()));
        };

        let (source_index, is_dir, item_path) = match &mut self.plan[index] {
            Planned::Insert { modified: slot, .. } => {
                *slot = modified;
                return Ok(());
            }
            Planned::Copy { index, path, is_dir } => (*index, *is_dir, path.clone()),
        };

        let replacement = if is_dir {
            Planned::marker(&item_path, modified)
        } else {
            let content = self.read_source(source_index)?;
            Planned::Insert {
                path: item_path,
                len: content.len() as u64,
                content: EntryContent::Bytes(content),
                is_dir: false,
                modified,
            }
        };
        self.plan[index] = replacement;
        Ok(())
    }

    fn read_source(&mut self, index: usize) -> Result<Vec<u8>, VfsError> {
        let location = &self.location;
        let archive = self
            .source
            .as_mut()
            .ok_or_else(|| VfsError::NotFound(location.to_string()))?;
        let mut file = archive.by_index(index).map_err(|e| map_zip_error(location, e))?;
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Paths of every planned entry, in archive order
    pub fn paths(&self) -> Vec<&str> {
        self.plan.iter().map(Planned::path).collect()
    }

    /// Rebuilds the archive from the plan and replaces the container bytes.
    /// The lease is held until the new bytes are stored.
    pub fn commit(mut self) -> Result<(), VfsError> {
        let location = self.location.clone();
        let method = compression_for(&self.context.config);
        let plan = std::mem::take(&mut self.plan);
        let entry_count = plan.len();

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for item in plan {
            match item {
                Planned::Copy { index, path, is_dir } => {
                    let archive = self
                        .source
                        .as_mut()
                        .ok_or_else(|| VfsError::NotFound(location.to_string()))?;
                    let file = archive
                        .by_index_raw(index)
                        .map_err(|e| map_zip_error(&location, e))?;
                    let name = entry_name(&path, is_dir);
                    let result = if file.name() == name {
                        writer.raw_copy_file(file)
                    } else {
                        writer.raw_copy_file_rename(file, name)
                    };
                    result.map_err(|e| map_zip_error(&location, e))?;
                }
                Planned::Insert { path, content, len, is_dir, modified } => {
                    let options = FileOptions::default().last_modified_time(to_zip_time(modified));
                    if is_dir {
                        writer
                            .add_directory(entry_name(&path, true), options)
                            .map_err(|e| map_zip_error(&location, e))?;
                    } else {
                        let options = options
                            .compression_method(method)
                            .large_file(len >= u64::from(u32::MAX));
                        writer
                            .start_file(path, options)
                            .map_err(|e| map_zip_error(&location, e))?;
                        content.copy_into(&mut writer)?;
                    }
                }
            }
        }

        let bytes = writer
            .finish()
            .map_err(|e| map_zip_error(&location, e))?
            .into_inner();
        store_bytes(self.context, &location, bytes)?;
        info!("Committed {} entries to {}", entry_count, location);
        Ok(())
    }
}

fn entry_name(path: &str, is_dir: bool) -> String {
    if is_dir {
        format!("{}/", path)
    } else {
        path.to_string()
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Replaces the bytes of an archive
///
/// Disk archives are written to a sibling temp file and renamed over the
/// original. Nested archives are written back into their enclosing archive,
/// which takes the enclosing location's lease after this one (inner before
/// outer, never the reverse).
pub(crate) fn store_bytes(
    context: &ArchiveContext,
    location: &ArchiveLocation,
    bytes: Vec<u8>,
) -> Result<(), VfsError> {
    match location {
        ArchiveLocation::Disk(url) => {
            let target = url
                .to_file_path()
                .map_err(|_| VfsError::InvalidUri(url.to_string()))?;
            let dir = match target.parent() {
                Some(dir) => dir.to_path_buf(),
                None => return Err(VfsError::InvalidUri(url.to_string())),
            };
            fs::create_dir_all(&dir)?;

            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&bytes)?;
            temp.as_file().sync_all()?;
            temp.persist(&target).map_err(|e| VfsError::Io(e.error))?;
            debug!("Wrote {} bytes to {}", bytes.len(), target.display());
            Ok(())
        }
        ArchiveLocation::Nested(id) => {
            let mut outer = ArchiveHandle::open(context, &id.location)?;
            let len = bytes.len() as u64;
            outer.write_file(&id.path, EntryContent::Bytes(bytes), len)?;
            outer.commit()
        }
    }
}
