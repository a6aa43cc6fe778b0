//! Copying and moving between arbitrary stores

use std::io;
use tracing::{debug, warn};
use zipvfs_common::{CancelToken, FileStore, PutInfoOptions, VfsError};

/// Recursively copies `source` to `destination`, preserving file timestamps
/// where the destination can store them.
pub fn copy_tree(
    source: &dyn FileStore,
    destination: &dyn FileStore,
    cancel: &CancelToken,
) -> Result<(), VfsError> {
    cancel.check()?;
    let info = source.fetch_info()?;
    if !info.exists {
        return Err(VfsError::NotFound(source.to_uri().to_string()));
    }

    if info.is_dir {
        destination.mkdir()?;
        for child in source.child_infos(cancel)? {
            copy_tree(
                source.child(&child.name).as_ref(),
                destination.child(&child.name).as_ref(),
                cancel,
            )?;
        }
        return Ok(());
    }

    let mut reader = source.open_input_stream()?;
    let mut writer = destination.open_output_stream()?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.commit()?;
    debug!("Copied {} bytes from {} to {}", copied, source.to_uri(), destination.to_uri());

    if info.modified.is_some() {
        match destination.put_info(&info, PutInfoOptions::last_modified()) {
            Ok(()) | Err(VfsError::Unsupported(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Copy-then-delete move between stores that cannot rename into each other
///
/// If the copy fails, whatever it created at the destination is removed and
/// the source is left untouched.
pub fn move_tree(source: &dyn FileStore, destination: &dyn FileStore) -> Result<(), VfsError> {
    let destination_existed = destination.exists()?;

    if let Err(e) = copy_tree(source, destination, &CancelToken::new()) {
        if !destination_existed {
            if let Err(cleanup) = destination.delete() {
                warn!("Failed to clean up {} after failed copy: {}", destination.to_uri(), cleanup);
            }
        }
        return Err(e);
    }

    source.delete()
}
