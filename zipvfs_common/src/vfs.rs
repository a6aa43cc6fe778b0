use crate::{CancelToken, FileInfo, PutInfoOptions, VfsError};
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use url::Url;

/// A sink returned by [`FileStore::open_output_stream`]
///
/// Nothing written becomes visible until [`commit`](StoreWriter::commit)
/// succeeds. Dropping a writer without committing discards its content.
pub trait StoreWriter: Write + Send {
    fn commit(self: Box<Self>) -> Result<(), VfsError>;
}

/// File store contract shared by disk, archive and null stores
///
/// A store is an *identity*: one location that may or may not exist yet.
/// `child` and `parent` only compute new identities and never touch storage.
pub trait FileStore: Send + Sync + fmt::Debug {
    /// Last segment of this store's location
    fn name(&self) -> String;

    /// URI that resolves back to an equal store
    fn to_uri(&self) -> Url;

    fn child(&self, name: &str) -> Box<dyn FileStore>;

    /// `None` for the root of the store's namespace
    fn parent(&self) -> Option<Box<dyn FileStore>>;

    /// Describes the immediate children; an absent or non-directory store has none
    fn child_infos(&self, cancel: &CancelToken) -> Result<Vec<FileInfo>, VfsError>;

    fn child_names(&self, cancel: &CancelToken) -> Result<Vec<String>, VfsError> {
        Ok(self
            .child_infos(cancel)?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }

    /// Never fails for a missing resource; reports `exists == false` instead
    fn fetch_info(&self) -> Result<FileInfo, VfsError>;

    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>, VfsError>;

    fn open_output_stream(&self) -> Result<Box<dyn StoreWriter>, VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Creates this directory and any missing parents; succeeds if it already exists
    fn mkdir(&self) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Removes this resource and everything below it; missing resources are a no-op
    fn delete(&self) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    /// Moves this resource so that it ends up at `destination`
    fn move_to(&self, destination: &dyn FileStore) -> Result<(), VfsError>;

    fn put_info(&self, _info: &FileInfo, _options: PutInfoOptions) -> Result<(), VfsError> {
        Err(VfsError::Unsupported("Write operations not supported".to_string()))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::read_only()
    }

    fn is_writable(&self) -> bool {
        self.capabilities().write
    }

    /// Used to recognise a destination of the same concrete type
    fn as_any(&self) -> &dyn Any;

    /// Reads the whole content of a file
    fn read_bytes(&self) -> Result<Vec<u8>, VfsError> {
        let mut reader = self.open_input_stream()?;
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Replaces the content of a file, creating it if needed
    fn write_bytes(&self, content: &[u8]) -> Result<(), VfsError> {
        let mut writer = self.open_output_stream()?;
        writer.write_all(content)?;
        writer.commit()
    }

    fn exists(&self) -> Result<bool, VfsError> {
        Ok(self.fetch_info()?.exists)
    }
}

/// Capabilities flags for store implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub rename: bool,
    pub create_dir: bool,
    pub set_mtime: bool,
    pub set_attributes: bool,
}

impl StoreCapabilities {
    /// Full read-write capabilities (local filesystem)
    pub fn full() -> Self {
        Self {
            read: true,
            write: true,
            delete: true,
            rename: true,
            create_dir: true,
            set_mtime: true,
            set_attributes: true,
        }
    }

    /// Read-only capabilities
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// Nothing at all (unresolvable locations)
    pub fn none() -> Self {
        Self::default()
    }
}
