use crate::VfsError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Information about a file or directory in a store
///
/// A missing resource is still described (`exists == false`) rather than
/// reported as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub exists: bool,
    pub is_dir: bool,
    pub size: u64,
    /// `None` for synthesized directories and stores that cannot report it
    pub modified: Option<SystemTime>,
    #[serde(default)]
    pub read_only: bool,
}

impl FileInfo {
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            is_dir: false,
            size: 0,
            modified: None,
            read_only: false,
        }
    }

    pub fn directory(name: impl Into<String>, modified: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            is_dir: true,
            size: 0,
            modified,
            read_only: false,
        }
    }

    pub fn file(name: impl Into<String>, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            is_dir: false,
            size,
            modified,
            read_only: false,
        }
    }
}

/// Which parts of a [`FileInfo`] `put_info` should apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutInfoOptions {
    pub set_last_modified: bool,
    pub set_attributes: bool,
}

impl PutInfoOptions {
    pub fn last_modified() -> Self {
        Self {
            set_last_modified: true,
            set_attributes: false,
        }
    }

    pub fn attributes() -> Self {
        Self {
            set_last_modified: false,
            set_attributes: true,
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a long enumeration
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(VfsError::Cancelled)` once [`cancel`](Self::cancel) was called
    pub fn check(&self) -> Result<(), VfsError> {
        if self.is_cancelled() {
            Err(VfsError::Cancelled)
        } else {
            Ok(())
        }
    }
}
