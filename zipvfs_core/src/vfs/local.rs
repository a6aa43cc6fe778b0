use super::ZipStore;
use crate::transfer;
use percent_encoding::percent_decode_str;
use std::any::Any;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use url::Url;
use zipvfs_common::{
    CancelToken, FileInfo, FileStore, PutInfoOptions, StoreCapabilities, StoreWriter, VfsError,
};

/// File store over an ordinary disk path, addressed by a `file:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileStore {
    url: Url,
}

impl LocalFileStore {
    /// `None` unless `url` is a `file:` URL
    pub fn from_url(url: &Url) -> Option<Self> {
        (url.scheme() == "file").then(|| Self { url: url.clone() })
    }

    pub fn from_path(path: &Path) -> Result<Self, VfsError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let url = Url::from_file_path(&absolute)
            .map_err(|_| VfsError::InvalidUri(absolute.display().to_string()))?;
        Ok(Self { url })
    }

    pub fn path(&self) -> Result<PathBuf, VfsError> {
        self.url
            .to_file_path()
            .map_err(|_| VfsError::InvalidUri(self.url.to_string()))
    }

    fn metadata(&self) -> Result<Option<fs::Metadata>, VfsError> {
        match fs::metadata(self.path()?) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VfsError::Io(e)),
        }
    }

    fn info_from(&self, name: String, meta: &fs::Metadata) -> FileInfo {
        let modified = meta.modified().ok();
        let mut info = if meta.is_dir() {
            FileInfo::directory(name, modified)
        } else {
            FileInfo::file(name, meta.len(), modified)
        };
        info.read_only = meta.permissions().readonly();
        info
    }
}

impl FileStore for LocalFileStore {
    fn name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
            .unwrap_or_default()
    }

    fn to_uri(&self) -> Url {
        self.url.clone()
    }

    fn child(&self, name: &str) -> Box<dyn FileStore> {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(name.split('/').filter(|s| !s.is_empty() && *s != "."));
        }
        Box::new(Self { url })
    }

    fn parent(&self) -> Option<Box<dyn FileStore>> {
        if self.url.path() == "/" {
            return None;
        }
        let mut url = self.url.clone();
        url.path_segments_mut().ok()?.pop_if_empty().pop();
        Some(Box::new(Self { url }))
    }

    fn child_infos(&self, cancel: &CancelToken) -> Result<Vec<FileInfo>, VfsError> {
        match self.metadata()? {
            Some(meta) if meta.is_dir() => {}
            _ => return Ok(Vec::new()),
        }

        let mut infos = Vec::new();
        for entry in fs::read_dir(self.path()?)? {
            cancel.check()?;
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            infos.push(self.info_from(name, &meta));
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn fetch_info(&self) -> Result<FileInfo, VfsError> {
        Ok(match self.metadata()? {
            Some(meta) => self.info_from(self.name(), &meta),
            None => FileInfo::missing(self.name()),
        })
    }

    fn open_input_stream(&self) -> Result<Box<dyn Read + Send>, VfsError> {
        let path = self.path()?;
        match self.metadata()? {
            None => Err(VfsError::NotFound(path.display().to_string())),
            Some(meta) if meta.is_dir() => Err(VfsError::IsDirectory(path.display().to_string())),
            Some(_) => Ok(Box::new(fs::File::open(&path)?)),
        }
    }

    fn open_output_stream(&self) -> Result<Box<dyn StoreWriter>, VfsError> {
        let target = self.path()?;
        if target.is_dir() {
            return Err(VfsError::IsDirectory(target.display().to_string()));
        }
        let dir = target
            .parent()
            .ok_or_else(|| VfsError::InvalidUri(self.url.to_string()))?;
        fs::create_dir_all(dir)?;

        let temp = NamedTempFile::new_in(dir)?;
        Ok(Box::new(LocalWriter { temp, target }))
    }

    fn mkdir(&self) -> Result<(), VfsError> {
        let path = self.path()?;
        if path.is_file() {
            return Err(VfsError::NotADirectory(path.display().to_string()));
        }
        fs::create_dir_all(&path)?;
        Ok(())
    }

    fn delete(&self) -> Result<(), VfsError> {
        let path = self.path()?;
        match self.metadata()? {
            None => Ok(()),
            Some(meta) if meta.is_dir() => {
                debug!("Removing directory {}", path.display());
                fs::remove_dir_all(&path).map_err(VfsError::from)
            }
            Some(_) => {
                debug!("Removing file {}", path.display());
                fs::remove_file(&path).map_err(VfsError::from)
            }
        }
    }

    fn move_to(&self, destination: &dyn FileStore) -> Result<(), VfsError> {
        if let Some(dest) = destination.as_any().downcast_ref::<ZipStore>() {
            let from = self.path()?;
            let held_below = dest
                .id()
                .location
                .disk_url()
                .to_file_path()
                .is_ok_and(|archive| archive.starts_with(&from));
            if held_below {
                return Err(VfsError::Unsupported(format!(
                    "Cannot move {} into an archive inside itself: {}",
                    from.display(),
                    dest.to_uri()
                )));
            }
        }
        if let Some(dest) = destination.as_any().downcast_ref::<LocalFileStore>() {
            let from = self.path()?;
            let to = dest.path()?;
            if self.metadata()?.is_none() {
                return Err(VfsError::NotFound(from.display().to_string()));
            }
            if let Some(dir) = to.parent() {
                fs::create_dir_all(dir)?;
            }
            match fs::rename(&from, &to) {
                Ok(()) => {
                    debug!("Renamed {} to {}", from.display(), to.display());
                    return Ok(());
                }
                // Cross-device renames fall back to copying
                Err(e) => debug!("Rename of {} failed ({}), copying instead", from.display(), e),
            }
        }
        transfer::move_tree(self, destination)
    }

    fn put_info(&self, info: &FileInfo, options: PutInfoOptions) -> Result<(), VfsError> {
        let path = self.path()?;
        if options.set_attributes {
            let mut permissions = fs::metadata(&path)?.permissions();
            permissions.set_readonly(info.read_only);
            fs::set_permissions(&path, permissions)?;
        }
        if options.set_last_modified {
            if let Some(modified) = info.modified {
                filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(modified))?;
            }
        }
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::full()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Writes to a sibling temp file and renames it over the target on commit
struct LocalWriter {
    temp: NamedTempFile,
    target: PathBuf,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl StoreWriter for LocalWriter {
    fn commit(self: Box<Self>) -> Result<(), VfsError> {
        let LocalWriter { temp, target } = *self;
        temp.persist(&target).map_err(|e| VfsError::Io(e.error))?;
        Ok(())
    }
}
