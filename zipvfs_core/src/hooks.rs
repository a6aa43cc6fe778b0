use crate::location::{ArchiveLocation, ZipStoreId};
use crate::vfs::ZipFileSystem;
use crate::workspace::{LifecycleEvent, LifecycleListener};
use tracing::debug;
use url::Url;
use zipvfs_common::VfsError;

/// Releases archive handles before the resource tree moves or deletes an
/// archive, so no handle outlives the bytes it was opened on
#[derive(Debug, Clone)]
pub struct MovePreparationListener {
    fs: ZipFileSystem,
}

impl MovePreparationListener {
    pub fn new(fs: ZipFileSystem) -> Self {
        Self { fs }
    }
}

impl LifecycleListener for MovePreparationListener {
    fn handle_event(&self, event: &LifecycleEvent) -> Result<(), VfsError> {
        let resource = event.resource();
        let Some(location) = archive_location(&resource.location) else {
            return Ok(());
        };
        debug!("Closing handles on {} before {:?}", location, resource.path);
        self.fs.close(&location)
    }
}

/// The archive a resource location could hold: the archive itself for an
/// expanded root, the entry's own bytes for anything inside an archive, the
/// file for a disk path
fn archive_location(uri: &Url) -> Option<ArchiveLocation> {
    match ZipStoreId::from_url(uri) {
        Some(id) if id.is_root() => Some(id.location),
        Some(id) => Some(id.as_location()),
        None if uri.scheme() == "file" => Some(ArchiveLocation::Disk(uri.clone())),
        None => None,
    }
}
