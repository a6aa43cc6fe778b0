//! Expanding an archive file into a linked folder and collapsing it back
//!
//! Both transitions replace one representation with the other at the same
//! resource path; neither ever touches the archive's bytes.

use crate::location::{ArchiveLocation, ZipStoreId};
use crate::path;
use crate::workspace::{is_archive_root, Workspace};
use tracing::{info, warn};
use zipvfs_common::VfsError;

/// Outcome of a lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Expanded,
    Collapsed,
    /// The archive was already expanded; nothing changed
    AlreadyExpanded,
    /// The archive was already collapsed; nothing changed
    AlreadyCollapsed,
}

impl Transition {
    /// False for the no-op outcomes
    pub fn changed(self) -> bool {
        matches!(self, Transition::Expanded | Transition::Collapsed)
    }
}

/// Replaces the archive file at `resource_path` with a folder linked to the
/// archive's root
///
/// An archive that turns out to have no readable children is collapsed again
/// before the error is returned, so a failed expand leaves the workspace as it
/// was.
pub fn expand(workspace: &mut Workspace, resource_path: &str) -> Result<Transition, VfsError> {
    let resource_path = path::normalize(resource_path);
    if let Some(target) = workspace.link_target(&resource_path) {
        if is_archive_root(target) {
            return Ok(Transition::AlreadyExpanded);
        }
        return Err(VfsError::Unsupported(format!(
            "{} is a linked resource and cannot be expanded",
            resource_path
        )));
    }

    let store = workspace.store(&resource_path)?;
    let info = store.fetch_info()?;
    if !info.exists {
        return Err(VfsError::NotFound(resource_path));
    }
    if info.is_dir {
        return Err(VfsError::IsDirectory(resource_path));
    }

    let archive = store.to_uri();
    let location = ArchiveLocation::from_url(&archive)
        .ok_or_else(|| VfsError::InvalidUri(archive.to_string()))?;
    let link = ZipStoreId::root(location).to_uri();
    workspace.create_link(&resource_path, &link, true)?;

    let failure = match workspace.members(&resource_path) {
        Ok(members) if !members.is_empty() => {
            info!("Expanded {} ({} members)", resource_path, members.len());
            return Ok(Transition::Expanded);
        }
        Ok(_) => VfsError::EmptyOrUnreadableArchive(resource_path.clone()),
        Err(e) => e,
    };

    warn!("Expanding {} failed ({}), rolling back", resource_path, failure);
    if let Err(rollback) = collapse(workspace, &resource_path) {
        warn!("Collapse during rollback of {} failed: {}", resource_path, rollback);
        workspace.delete(&resource_path)?;
    }
    Err(failure)
}

/// Replaces the expanded folder at `resource_path` with the archive file again
///
/// The link must still point at the archive that sits at this resource path
/// in the parent folder; otherwise nothing is deleted and `LinkMismatch` is
/// returned.
pub fn collapse(workspace: &mut Workspace, resource_path: &str) -> Result<Transition, VfsError> {
    let resource_path = path::normalize(resource_path);
    let Some(target) = workspace.link_target(&resource_path).cloned() else {
        return if workspace.is_file(&resource_path)? {
            Ok(Transition::AlreadyCollapsed)
        } else if workspace.exists(&resource_path)? {
            Err(VfsError::Unsupported(format!(
                "{} is not an expanded archive",
                resource_path
            )))
        } else {
            Err(VfsError::NotFound(resource_path))
        };
    };

    let id = ZipStoreId::from_url(&target)
        .filter(|id| id.is_root())
        .ok_or_else(|| VfsError::Unsupported(format!("{} is not an expanded archive", resource_path)))?;

    let parent = path::parent(&resource_path).unwrap_or_default();
    let expected = workspace
        .store(parent)?
        .child(path::simple_name(&resource_path))
        .to_uri();
    let actual = id.location.to_uri();
    if expected != actual {
        return Err(VfsError::LinkMismatch {
            path: resource_path,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    workspace.delete(&resource_path)?;
    let project = resource_path.split('/').next().unwrap_or_default();
    workspace.refresh_local(project)?;
    info!("Collapsed {}", resource_path);
    Ok(Transition::Collapsed)
}
