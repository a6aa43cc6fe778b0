use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipVfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VFS error: {0}")]
    Vfs(#[from] VfsError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ZipVfsError>;

/// Flat category of a [`VfsError`], for callers that only branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    NotFound,
    IsDirectory,
    NotADirectory,
    AlreadyExists,
    ArchiveRead,
    UnsupportedCompressionMethod,
    HandleBusy,
    EmptyOrUnreadableArchive,
    LinkMismatch,
    InvalidUri,
    Cancelled,
    Unsupported,
}

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Cannot read archive {location}: {reason}")]
    ArchiveRead { location: String, reason: String },

    #[error("Unsupported compression method in {location}: {method}")]
    UnsupportedCompressionMethod { location: String, method: String },

    #[error("Archive is busy: {0}")]
    HandleBusy(String),

    #[error("Archive could not be expanded or has no children: {0}")]
    EmptyOrUnreadableArchive(String),

    #[error("Link of {path} points to {actual}, expected {expected}")]
    LinkMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl VfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VfsError::Io(_) => ErrorKind::Io,
            VfsError::NotFound(_) => ErrorKind::NotFound,
            VfsError::IsDirectory(_) => ErrorKind::IsDirectory,
            VfsError::NotADirectory(_) => ErrorKind::NotADirectory,
            VfsError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            VfsError::ArchiveRead { .. } => ErrorKind::ArchiveRead,
            VfsError::UnsupportedCompressionMethod { .. } => ErrorKind::UnsupportedCompressionMethod,
            VfsError::HandleBusy(_) => ErrorKind::HandleBusy,
            VfsError::EmptyOrUnreadableArchive(_) => ErrorKind::EmptyOrUnreadableArchive,
            VfsError::LinkMismatch { .. } => ErrorKind::LinkMismatch,
            VfsError::InvalidUri(_) => ErrorKind::InvalidUri,
            VfsError::Cancelled => ErrorKind::Cancelled,
            VfsError::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
