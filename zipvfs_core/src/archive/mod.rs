//! Archive reading and editing on top of the `zip` crate

pub mod handle;
pub mod reader;
pub mod registry;

pub use handle::{ArchiveHandle, EntryContent};
pub use reader::{ArchiveReader, Entry};
pub use registry::{HandleLease, HandleRegistry};

use crate::location::ArchiveLocation;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use std::fs;
use std::io;
use std::time::SystemTime;
use zip::result::ZipError;
use zip::CompressionMethod;
use zipvfs_common::{StoreConfig, VfsError};

/// State shared by every store created from one file system instance
#[derive(Debug, Default)]
pub struct ArchiveContext {
    pub registry: HandleRegistry,
    pub config: StoreConfig,
}

impl ArchiveContext {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            registry: HandleRegistry::new(),
            config,
        }
    }
}

/// Loads the raw bytes of an archive. `None` when the archive does not exist.
///
/// Nested locations are read through each enclosing archive in turn.
pub fn load_bytes(location: &ArchiveLocation) -> Result<Option<Vec<u8>>, VfsError> {
    match location {
        ArchiveLocation::Disk(url) => {
            let path = url
                .to_file_path()
                .map_err(|_| VfsError::InvalidUri(url.to_string()))?;
            match fs::read(&path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(VfsError::Io(e)),
            }
        }
        ArchiveLocation::Nested(id) => {
            let mut outer = match ArchiveReader::open(&id.location)? {
                Some(reader) => reader,
                None => return Ok(None),
            };
            match outer.read(&id.path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(VfsError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        }
    }
}

/// Archives are always decoded from memory, so an I/O error out of the codec
/// means truncated or corrupt bytes.
pub(crate) fn map_zip_error(location: &ArchiveLocation, err: ZipError) -> VfsError {
    match err {
        ZipError::UnsupportedArchive(reason) if reason.contains("Compression method") => {
            VfsError::UnsupportedCompressionMethod {
                location: location.to_string(),
                method: reason.to_string(),
            }
        }
        ZipError::FileNotFound => VfsError::NotFound(location.to_string()),
        other => VfsError::ArchiveRead {
            location: location.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Entry encodings this build can decode
pub(crate) fn is_supported_method(method: CompressionMethod) -> bool {
    matches!(
        method,
        CompressionMethod::Stored
            | CompressionMethod::Deflated
            | CompressionMethod::Bzip2
            | CompressionMethod::Zstd
    )
}

pub(crate) fn check_method(
    location: &ArchiveLocation,
    name: &str,
    method: CompressionMethod,
) -> Result<(), VfsError> {
    if is_supported_method(method) {
        Ok(())
    } else {
        Err(VfsError::UnsupportedCompressionMethod {
            location: location.to_string(),
            method: format!("{:?} ({})", method, name),
        })
    }
}

pub(crate) fn compression_for(config: &StoreConfig) -> CompressionMethod {
    match config.compression {
        zipvfs_common::EntryCompression::Deflated => CompressionMethod::Deflated,
        zipvfs_common::EntryCompression::Stored => CompressionMethod::Stored,
    }
}

/// DOS timestamps carry no zone; they are read and written as UTC.
pub(crate) fn from_zip_time(time: zip::DateTime) -> Option<SystemTime> {
    let date = Utc
        .with_ymd_and_hms(
            i32::from(time.year()),
            u32::from(time.month()),
            u32::from(time.day()),
            u32::from(time.hour()),
            u32::from(time.minute()),
            u32::from(time.second()),
        )
        .single()?;
    Some(SystemTime::from(date))
}

/// Times outside the DOS range (before 1980) fall back to the DOS epoch.
pub(crate) fn to_zip_time(time: SystemTime) -> zip::DateTime {
    let date: chrono::DateTime<Utc> = time.into();
    u16::try_from(date.year())
        .ok()
        .and_then(|year| {
            zip::DateTime::from_date_and_time(
                year,
                date.month() as u8,
                date.day() as u8,
                date.hour() as u8,
                date.minute() as u8,
                date.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}
