use super::{LocalFileStore, NullStore, ZipStore};
use crate::archive::{ArchiveContext, HandleRegistry};
use crate::location::{ArchiveLocation, ZipStoreId, ZIP_SCHEME};
use std::sync::Arc;
use url::Url;
use zipvfs_common::{FileStore, StoreConfig, VfsError};

/// Resolver from URIs to file stores
///
/// Stores created by one file system share its handle registry, so writers
/// on the same archive are serialized no matter which store they came from.
/// Separate file system instances share nothing.
#[derive(Debug, Clone, Default)]
pub struct ZipFileSystem {
    context: Arc<ArchiveContext>,
}

impl ZipFileSystem {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            context: Arc::new(ArchiveContext::new(config)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.context.config
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.context.registry
    }

    pub fn store(&self, id: ZipStoreId) -> ZipStore {
        ZipStore::new(id, Arc::clone(&self.context))
    }

    /// Root store of the archive whose bytes live at `archive`
    pub fn archive_root(&self, archive: &Url) -> Option<ZipStore> {
        ArchiveLocation::from_url(archive).map(|location| self.store(ZipStoreId::root(location)))
    }

    /// Resolves a `zip:` URI. Anything else, including malformed `zip:` URIs,
    /// resolves to a [`NullStore`].
    pub fn resolve(&self, uri: &Url) -> Box<dyn FileStore> {
        match ZipStoreId::from_url(uri) {
            Some(id) => Box::new(self.store(id)),
            None => Box::new(NullStore::new(uri.clone())),
        }
    }

    pub fn resolve_str(&self, uri: &str) -> Box<dyn FileStore> {
        match Url::parse(uri) {
            Ok(url) => self.resolve(&url),
            Err(_) => Box::new(NullStore::unresolved()),
        }
    }

    /// Store for any supported URI: `zip:` entries and `file:` paths
    pub fn store_for(&self, uri: &Url) -> Box<dyn FileStore> {
        if uri.scheme() == ZIP_SCHEME {
            return self.resolve(uri);
        }
        match LocalFileStore::from_url(uri) {
            Some(store) => Box::new(store),
            None => Box::new(NullStore::new(uri.clone())),
        }
    }

    pub fn is_zip_uri(uri: &Url) -> bool {
        ZipStoreId::from_url(uri).is_some()
    }

    /// Waits for every handle on `location`, or on archives nested inside it,
    /// to be released
    pub fn close(&self, location: &ArchiveLocation) -> Result<(), VfsError> {
        self.context
            .registry
            .close(location, self.context.config.contention)
    }
}
