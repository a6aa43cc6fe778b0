//! In-process resource tree
//!
//! Projects map names to disk folders. Logical paths look like
//! `project/dir/file` and are resolved live against the stores, with a link
//! table overriding where a path (and everything below it) is served from.
//! Expanded archives are folder links whose target is a `zip:` URI.

use crate::location::{ArchiveLocation, ZipStoreId};
use crate::path;
use crate::sniff;
use crate::vfs::{LocalFileStore, ZipFileSystem};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use zipvfs_common::{CancelToken, FileStore, VfsError};

/// A resource as seen by lifecycle listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: String,
    /// Location URI the resource is currently served from
    pub location: Url,
    pub linked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    PreDelete(Resource),
    PreMove { resource: Resource, destination: String },
    PreLinkMove { resource: Resource, destination: String },
}

impl LifecycleEvent {
    pub fn resource(&self) -> &Resource {
        match self {
            LifecycleEvent::PreDelete(resource)
            | LifecycleEvent::PreMove { resource, .. }
            | LifecycleEvent::PreLinkMove { resource, .. } => resource,
        }
    }
}

/// Observer notified before a resource is deleted or moved. An error aborts
/// the mutation.
pub trait LifecycleListener: Send + Sync {
    fn handle_event(&self, event: &LifecycleEvent) -> Result<(), VfsError>;
}

pub struct Workspace {
    fs: ZipFileSystem,
    projects: BTreeMap<String, LocalFileStore>,
    links: BTreeMap<String, Url>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
}

impl Workspace {
    pub fn new(fs: ZipFileSystem) -> Self {
        Self {
            fs,
            projects: BTreeMap::new(),
            links: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }

    pub fn file_system(&self) -> &ZipFileSystem {
        &self.fs
    }

    pub fn add_listener(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Registers a project backed by `dir`, creating the directory if needed
    pub fn create_project(&mut self, name: &str, dir: &Path) -> Result<(), VfsError> {
        if name.is_empty() || name.contains('/') {
            return Err(VfsError::InvalidUri(name.to_string()));
        }
        if self.projects.contains_key(name) {
            return Err(VfsError::AlreadyExists(name.to_string()));
        }
        let store = LocalFileStore::from_path(dir)?;
        store.mkdir()?;
        self.projects.insert(name.to_string(), store);
        info!("Created project {} at {}", name, dir.display());
        Ok(())
    }

    pub fn projects(&self) -> Vec<&str> {
        self.projects.keys().map(String::as_str).collect()
    }

    /// Store currently serving `resource_path`
    pub fn store(&self, resource_path: &str) -> Result<Box<dyn FileStore>, VfsError> {
        let resource_path = path::normalize(resource_path);
        let (project, _) = split_project(&resource_path);
        let project_store = self
            .projects
            .get(project)
            .ok_or_else(|| VfsError::NotFound(resource_path.clone()))?;

        let (base, base_path): (Box<dyn FileStore>, &str) = match self.link_above(&resource_path) {
            Some((link_path, target)) => (self.fs.store_for(target), link_path),
            None => (Box::new(project_store.clone()), project),
        };
        Ok(match path::rebase(&resource_path, base_path, "") {
            Some(rest) if !rest.is_empty() => base.child(&rest),
            _ => base,
        })
    }

    pub fn exists(&self, resource_path: &str) -> Result<bool, VfsError> {
        Ok(self.store(resource_path)?.fetch_info()?.exists)
    }

    pub fn is_folder(&self, resource_path: &str) -> Result<bool, VfsError> {
        let info = self.store(resource_path)?.fetch_info()?;
        Ok(info.exists && info.is_dir)
    }

    pub fn is_file(&self, resource_path: &str) -> Result<bool, VfsError> {
        let info = self.store(resource_path)?.fetch_info()?;
        Ok(info.exists && !info.is_dir)
    }

    pub fn is_linked(&self, resource_path: &str) -> bool {
        self.links.contains_key(&path::normalize(resource_path))
    }

    pub fn link_target(&self, resource_path: &str) -> Option<&Url> {
        self.links.get(&path::normalize(resource_path))
    }

    pub fn location_uri(&self, resource_path: &str) -> Result<Url, VfsError> {
        Ok(self.store(resource_path)?.to_uri())
    }

    pub fn resource(&self, resource_path: &str) -> Result<Resource, VfsError> {
        let resource_path = path::normalize(resource_path);
        Ok(Resource {
            location: self.location_uri(&resource_path)?,
            linked: self.links.contains_key(&resource_path),
            path: resource_path,
        })
    }

    /// Names of the children of a folder, links included
    pub fn members(&self, resource_path: &str) -> Result<Vec<String>, VfsError> {
        let resource_path = path::normalize(resource_path);
        let store = self.store(&resource_path)?;
        let info = store.fetch_info()?;
        if !info.exists {
            return Err(VfsError::NotFound(resource_path));
        }
        if !info.is_dir {
            return Err(VfsError::NotADirectory(resource_path));
        }

        let mut names: BTreeSet<String> = store.child_names(&CancelToken::new())?.into_iter().collect();
        for link in self.links.keys() {
            if path::is_immediate_parent(&resource_path, link) {
                names.insert(path::simple_name(link).to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Makes `resource_path` a folder served from `uri`. Links below it are dropped.
    pub fn create_link(&mut self, resource_path: &str, uri: &Url, replace: bool) -> Result<(), VfsError> {
        let resource_path = path::normalize(resource_path);
        let parent = self.checked_parent(&resource_path)?;
        if !self.is_folder(parent)? {
            return Err(VfsError::NotADirectory(parent.to_string()));
        }
        if !replace && (self.links.contains_key(&resource_path) || self.exists(&resource_path)?) {
            return Err(VfsError::AlreadyExists(resource_path));
        }

        self.links.retain(|link, _| !path::is_ancestor(&resource_path, link));
        info!("Linked {} to {}", resource_path, uri);
        self.links.insert(resource_path, uri.clone());
        Ok(())
    }

    /// Deletes a resource. Deleting a link removes only the link; the bytes
    /// it points at are left alone.
    pub fn delete(&mut self, resource_path: &str) -> Result<(), VfsError> {
        self.remove(resource_path, false)
    }

    /// Deletes a resource together with whatever a link points at
    pub fn delete_target(&mut self, resource_path: &str) -> Result<(), VfsError> {
        self.remove(resource_path, true)
    }

    fn remove(&mut self, resource_path: &str, with_target: bool) -> Result<(), VfsError> {
        let resource_path = path::normalize(resource_path);
        self.checked_parent(&resource_path)?;
        let resource = self.resource(&resource_path)?;
        if !resource.linked && !self.exists(&resource_path)? {
            debug!("Nothing to delete at {}", resource_path);
            return Ok(());
        }

        for linked in self.links_below(&resource_path) {
            let event = LifecycleEvent::PreDelete(self.resource(&linked)?);
            self.fire(&event)?;
        }
        if !resource.linked {
            self.fire(&LifecycleEvent::PreDelete(resource.clone()))?;
        }

        if !resource.linked || with_target {
            self.store(&resource_path)?.delete()?;
        }
        self.drop_links(&resource_path);
        info!("Deleted {}", resource_path);
        Ok(())
    }

    /// Drops links whose target vanished or whose parent is no longer a folder.
    /// Returns how many links were pruned.
    pub fn refresh_local(&mut self, resource_path: &str) -> Result<usize, VfsError> {
        let resource_path = path::normalize(resource_path);
        let candidates: Vec<String> = self
            .links
            .keys()
            .filter(|link| **link == resource_path || path::is_ancestor(&resource_path, link))
            .cloned()
            .collect();

        let mut pruned = 0;
        for link in candidates {
            if !self.links.contains_key(&link) {
                continue;
            }
            if self.link_is_live(&link) {
                continue;
            }
            warn!("Dropping stale link {}", link);
            pruned += self.drop_links(&link);
        }
        Ok(pruned)
    }

    fn link_is_live(&self, link: &str) -> bool {
        let parent_is_folder = path::parent(link)
            .map(|parent| self.is_folder(parent).unwrap_or(false))
            .unwrap_or(false);
        if !parent_is_folder {
            return false;
        }
        let Some(target) = self.links.get(link) else {
            return false;
        };
        match self.fs.store_for(target).fetch_info() {
            Ok(info) => info.exists,
            Err(e) => {
                debug!("Link target {} unreadable: {}", target, e);
                false
            }
        }
    }

    /// Moves a resource. Expanded archives keep their expanded state: the
    /// archive file moves and the link is re-created at the destination.
    pub fn move_resource(&mut self, source: &str, destination: &str) -> Result<(), VfsError> {
        let source = path::normalize(source);
        let destination = path::normalize(destination);
        self.checked_parent(&source)?;
        let destination_parent = self.checked_parent(&destination)?.to_string();
        if source == destination {
            return Ok(());
        }
        if path::is_ancestor(&source, &destination) {
            return Err(VfsError::Unsupported(format!(
                "Cannot move {} into itself",
                source
            )));
        }
        if !self.links.contains_key(&source) && !self.exists(&source)? {
            return Err(VfsError::NotFound(source));
        }
        if self.links.contains_key(&destination) || self.exists(&destination)? {
            return Err(VfsError::AlreadyExists(destination));
        }
        if !self.is_folder(&destination_parent)? {
            return Err(VfsError::NotFound(destination_parent));
        }

        let resource = self.resource(&source)?;
        let moved_links: Vec<(String, Url)> = self
            .links
            .iter()
            .filter(|(link, _)| **link == source || path::is_ancestor(&source, link))
            .map(|(link, target)| (link.clone(), target.clone()))
            .collect();

        for (link, _) in moved_links.iter().rev() {
            let event = LifecycleEvent::PreLinkMove {
                resource: self.resource(link)?,
                destination: path::rebase(link, &source, &destination).unwrap_or_default(),
            };
            self.fire(&event)?;
        }
        if !resource.linked {
            self.fire(&LifecycleEvent::PreMove {
                resource: resource.clone(),
                destination: destination.clone(),
            })?;
        }

        let physical = !resource.linked || is_archive_root(&self.links[&source]);
        if physical {
            let source_store = self.store(&source)?;
            let destination_store = self.store(&destination)?;
            source_store.move_to(destination_store.as_ref())?;
        }

        self.drop_links(&source);
        for (link, target) in moved_links {
            let Some(new_link) = path::rebase(&link, &source, &destination) else {
                continue;
            };
            let new_target = if is_archive_root(&target) {
                let archive = self.store(&new_link)?.to_uri();
                let location = ArchiveLocation::from_url(&archive)
                    .ok_or_else(|| VfsError::InvalidUri(archive.to_string()))?;
                ZipStoreId::root(location).to_uri()
            } else {
                target
            };
            debug!("Re-linked {} to {}", new_link, new_target);
            self.links.insert(new_link, new_target);
        }

        info!("Moved {} to {}", source, destination);
        Ok(())
    }

    /// True for a file that could be offered for expansion
    pub fn can_expand(&self, resource_path: &str) -> Result<bool, VfsError> {
        if self.is_linked(resource_path) {
            return Ok(false);
        }
        let store = self.store(resource_path)?;
        let info = store.fetch_info()?;
        if !info.exists || info.is_dir {
            return Ok(false);
        }
        Ok(sniff::has_archive_extension(&info.name) || sniff::sniff_store(store.as_ref())?)
    }

    pub fn create_file(&self, resource_path: &str, content: &[u8]) -> Result<(), VfsError> {
        self.store(resource_path)?.write_bytes(content)
    }

    pub fn create_folder(&self, resource_path: &str) -> Result<(), VfsError> {
        self.store(resource_path)?.mkdir()
    }

    pub fn read_file(&self, resource_path: &str) -> Result<Vec<u8>, VfsError> {
        self.store(resource_path)?.read_bytes()
    }

    fn fire(&self, event: &LifecycleEvent) -> Result<(), VfsError> {
        for listener in &self.listeners {
            listener.handle_event(event)?;
        }
        Ok(())
    }

    /// Deepest link at or above `resource_path`
    fn link_above(&self, resource_path: &str) -> Option<(&str, &Url)> {
        self.links
            .iter()
            .filter(|(link, _)| *link == resource_path || path::is_ancestor(link, resource_path))
            .max_by_key(|(link, _)| link.len())
            .map(|(link, target)| (link.as_str(), target))
    }

    fn links_below(&self, resource_path: &str) -> Vec<String> {
        self.links
            .keys()
            .filter(|link| *link == resource_path || path::is_ancestor(resource_path, link))
            .cloned()
            .collect()
    }

    fn drop_links(&mut self, resource_path: &str) -> usize {
        let before = self.links.len();
        self.links
            .retain(|link, _| link != resource_path && !path::is_ancestor(resource_path, link));
        before - self.links.len()
    }

    /// Parent of a resource below project level; projects themselves cannot
    /// be linked, moved or deleted through these operations.
    fn checked_parent<'p>(&self, resource_path: &'p str) -> Result<&'p str, VfsError> {
        match path::parent(resource_path) {
            Some(parent) if !parent.is_empty() => Ok(parent),
            _ => Err(VfsError::Unsupported(format!(
                "{} is not a resource inside a project",
                if resource_path.is_empty() { "/" } else { resource_path }
            ))),
        }
    }
}

fn split_project(resource_path: &str) -> (&str, &str) {
    resource_path.split_once('/').unwrap_or((resource_path, ""))
}

pub(crate) fn is_archive_root(uri: &Url) -> bool {
    ZipStoreId::from_url(uri).map_or(false, |id| id.is_root())
}
