use super::LocalFileStore;
use crate::archive::{ArchiveContext, ArchiveHandle, ArchiveReader, EntryContent};
use crate::location::{ArchiveLocation, ZipStoreId};
use crate::{path, transfer};
use std::any::Any;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;
use tempfile::SpooledTempFile;
use tracing::debug;
use url::Url;
use zipvfs_common::{
    CancelToken, FileInfo, FileStore, PutInfoOptions, StoreCapabilities, StoreWriter, VfsError,
};

/// File store over one entry (or the root) of a ZIP archive
///
/// The store is only an identity. Every operation opens the archive afresh,
/// so there is no entry cache to go stale when another store rewrites the
/// same bytes.
#[derive(Clone)]
pub struct ZipStore {
    id: ZipStoreId,
    context: Arc<ArchiveContext>,
}

impl fmt::Debug for ZipStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipStore").field("id", &self.id).finish()
    }
}

impl PartialEq for ZipStore {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ZipStore {
    pub(crate) fn new(id: ZipStoreId, context: Arc<ArchiveContext>) -> Self {
        Self { id, context }
    }

    pub fn id(&self) -> &ZipStoreId {
        &self.id
    }

    pub fn location(&self) -> &ArchiveLocation {
        &self.id.location
    }

    pub fn inner_path(&self) -> &str {
        &self.id.path
    }

    pub fn is_root(&self) -> bool {
        self.id.is_root()
    }

    /// Store holding the archive's own bytes: a disk file, or the entry of
    /// the enclosing archive
    pub fn archive_store(&self) -> Box<dyn FileStore> {
        match &self.id.location {
            ArchiveLocation::Disk(url) => match LocalFileStore::from_url(url) {
                Some(store) => Box::new(store),
                None => Box::new(super::NullStore::new(url.clone())),
            },
            ArchiveLocation::Nested(outer) => {
                Box::new(ZipStore::new((**outer).clone(), Arc::clone(&self.context)))
            }
        }
    }

    /// Waits for outstanding handles on this archive and archives nested in it
    pub fn close(&self) -> Result<(), VfsError> {
        self.context
            .registry
            .close(&self.id.location, self.context.config.contention)
    }

    fn reader(&self) -> Result<Option<ArchiveReader>, VfsError> {
        ArchiveReader::open(&self.id.location)
    }

    fn handle(&self) -> Result<ArchiveHandle<'_>, VfsError> {
        ArchiveHandle::open(&self.context, &self.id.location)
    }

    fn display_path(&self) -> String {
        self.id.to_string()
    }
}

impl FileStore for ZipStore {
    fn name(&self) -> String {
        if self.is_root() {
            self.id.location.name()
        } else {
            path::simple_name(&self.id.path).to_string()
        }
    }

    fn to_uri(&self) -> Url {
        self.id.to_uri()
    }

    fn child(&self, name: &str) -> Box<dyn FileStore> {
        Box::new(ZipStore::new(self.id.child(name), Arc::clone(&self.context)))
    }

    fn parent(&self) -> Option<Box<dyn FileStore>> {
        self.id
            .parent()
            .map(|id| Box::new(ZipStore::new(id, Arc::clone(&self.context))) as Box<dyn FileStore>)
    }

    fn child_infos(&self, cancel: &CancelToken) -> Result<Vec<FileInfo>, VfsError> {
        match self.reader()? {
            Some(mut reader) => reader.children(&self.id.path, cancel),
            None => Ok(Vec::new()),
        }
    }

    fn fetch_info(&self) -> Result<FileInfo, VfsError> {
        let name = self.name();
        let Some(mut reader) = self.reader()? else {
            return Ok(FileInfo::missing(name));
        };
        Ok(match reader.lookup(&self.id.path, &CancelToken::new())? {
            Some(entry) if entry.is_dir => FileInfo::directory(name, entry.modified),
            Some(entry) => FileInfo::file(name, entry.size, entry.modified),
            None => FileInfo::missing(name),
        })
    }

    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>, VfsError> {
        let mut reader = self
            .reader()?
            .ok_or_else(|| VfsError::NotFound(self.display_path()))?;
        let content = reader.read(&self.id.path).map_err(|e| match e {
            VfsError::NotFound(_) => VfsError::NotFound(self.display_path()),
            VfsError::IsDirectory(_) => VfsError::IsDirectory(self.display_path()),
            other => other,
        })?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn open_output_stream(&self) -> Result<Box<dyn StoreWriter>, VfsError> {
        if self.is_root() {
            return Err(VfsError::IsDirectory(self.display_path()));
        }
        Ok(Box::new(ZipEntryWriter {
            store: self.clone(),
            buffer: SpooledTempFile::new(self.context.config.spill_threshold),
            len: 0,
        }))
    }

    fn mkdir(&self) -> Result<(), VfsError> {
        let info = self.fetch_info()?;
        if info.exists {
            return if info.is_dir {
                Ok(())
            } else {
                Err(VfsError::NotADirectory(self.display_path()))
            };
        }

        let mut handle = self.handle()?;
        handle.mkdir(&self.id.path)?;
        handle.commit()
    }

    fn delete(&self) -> Result<(), VfsError> {
        if self.is_root() {
            self.close()?;
            debug!("Deleting archive {}", self.id.location);
            return self.archive_store().delete();
        }

        let mut handle = self.handle()?;
        if handle.remove(&self.id.path) {
            handle.commit()
        } else {
            debug!("Nothing to delete at {}", self.display_path());
            Ok(())
        }
    }

    fn move_to(&self, destination: &dyn FileStore) -> Result<(), VfsError> {
        let dest = destination.as_any().downcast_ref::<ZipStore>();

        if let Some(dest) = dest {
            if self.id.encloses(&dest.id.location) {
                return Err(VfsError::Unsupported(format!(
                    "Cannot move {} into an archive inside itself: {}",
                    self.display_path(),
                    dest.to_uri()
                )));
            }
            if dest.id.location == self.id.location {
                let mut handle = self.handle()?;
                handle.rename(&self.id.path, &dest.id.path)?;
                return handle.commit();
            }
        }

        if self.is_root() {
            // Moving the archive itself: its bytes move, its entries are untouched
            self.close()?;
            let source = self.archive_store();
            return match dest {
                Some(dest) if dest.is_root() => source.move_to(dest.archive_store().as_ref()),
                _ => source.move_to(destination),
            };
        }

        transfer::move_tree(self, destination)
    }

    fn put_info(&self, info: &FileInfo, options: PutInfoOptions) -> Result<(), VfsError> {
        if options.set_attributes {
            return Err(VfsError::Unsupported(format!(
                "Attributes cannot be stored in archive entries: {}",
                self.display_path()
            )));
        }
        let Some(modified) = info.modified.filter(|_| options.set_last_modified) else {
            return Ok(());
        };

        if self.is_root() {
            return self
                .archive_store()
                .put_info(info, PutInfoOptions::last_modified());
        }
        let mut handle = self.handle()?;
        handle.set_modified(&self.id.path, modified)?;
        handle.commit()
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            set_attributes: false,
            ..StoreCapabilities::full()
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Buffers an entry's content and writes it into the archive on commit
struct ZipEntryWriter {
    store: ZipStore,
    buffer: SpooledTempFile,
    len: u64,
}

impl Write for ZipEntryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.buffer.write(buf)?;
        self.len += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl StoreWriter for ZipEntryWriter {
    fn commit(self: Box<Self>) -> Result<(), VfsError> {
        let ZipEntryWriter { store, buffer, len } = *self;
        let content = if buffer.is_rolled() {
            EntryContent::Spooled(buffer)
        } else {
            let mut buffer = buffer;
            let mut bytes = Vec::with_capacity(len as usize);
            io::Seek::rewind(&mut buffer)?;
            buffer.read_to_end(&mut bytes)?;
            EntryContent::Bytes(bytes)
        };

        let mut handle = store.handle()?;
        handle.write_file(&store.id.path, content, len)?;
        handle.commit()?;
        debug!("Wrote {} bytes to {}", len, store.display_path());
        Ok(())
    }
}
