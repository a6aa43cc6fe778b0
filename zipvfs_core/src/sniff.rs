//! Cheap checks used to offer "open as archive"

use std::io::Read;
use zipvfs_common::{FileStore, VfsError};

/// Local file header, empty archive, and spanned archive signatures
pub const ZIP_SIGNATURES: [[u8; 4]; 3] = [
    [b'P', b'K', 0x03, 0x04],
    [b'P', b'K', 0x05, 0x06],
    [b'P', b'K', 0x07, 0x08],
];

pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "jar", "epub", "odt", "ods", "odp", "apk", "war", "ear"];

pub fn is_zip_signature(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && ZIP_SIGNATURES.iter().any(|signature| bytes[..4] == signature[..])
}

/// Extension check, case-insensitive
pub fn has_archive_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, extension)| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
        .unwrap_or(false)
}

/// Reads the first four bytes of a file store and checks them
pub fn sniff_store(store: &dyn FileStore) -> Result<bool, VfsError> {
    let mut reader = store.open_input_stream()?;
    let mut header = Vec::with_capacity(4);
    reader.by_ref().take(4).read_to_end(&mut header)?;
    Ok(is_zip_signature(&header))
}
