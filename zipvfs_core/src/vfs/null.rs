use std::any::Any;
use std::io::Read;
use url::Url;
use zipvfs_common::{CancelToken, FileInfo, FileStore, StoreCapabilities, VfsError};

/// Store for URIs that do not name anything this crate can serve
///
/// Every read reports absence and every mutation is unsupported, so callers
/// can probe an arbitrary URI without special-casing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullStore {
    uri: Url,
}

impl NullStore {
    pub fn new(uri: Url) -> Self {
        Self { uri }
    }

    pub(crate) fn unresolved() -> Self {
        Self::new(Url::parse("null:/").expect("constant null URL is valid"))
    }
}

impl FileStore for NullStore {
    fn name(&self) -> String {
        self.uri
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string()
    }

    fn to_uri(&self) -> Url {
        self.uri.clone()
    }

    fn child(&self, name: &str) -> Box<dyn FileStore> {
        let mut uri = self.uri.clone();
        if let Ok(mut segments) = uri.path_segments_mut() {
            segments.pop_if_empty().push(name);
        }
        Box::new(Self { uri })
    }

    fn parent(&self) -> Option<Box<dyn FileStore>> {
        None
    }

    fn child_infos(&self, _cancel: &CancelToken) -> Result<Vec<FileInfo>, VfsError> {
        Ok(Vec::new())
    }

    fn fetch_info(&self) -> Result<FileInfo, VfsError> {
        Ok(FileInfo::missing(self.name()))
    }

    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>, VfsError> {
        Err(VfsError::NotFound(self.uri.to_string()))
    }

    fn move_to(&self, _destination: &dyn FileStore) -> Result<(), VfsError> {
        Err(VfsError::Unsupported(format!("Cannot move {}", self.uri)))
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
