//! Archive locations and the `zip:` URI scheme
//!
//! Two renderings are accepted on input:
//!
//! - path-style `zip:/<inner path>?<outer location URI>` (the one emitted)
//! - bang-style `zip:<outer location URI>!/<inner path>`
//!
//! The outer location is either a `file:` URI or another `zip:` URI, which is
//! how archives nested inside archives are addressed.

use crate::path;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fmt;
use url::Url;
use zipvfs_common::VfsError;

pub const ZIP_SCHEME: &str = "zip";

const INNER_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Where the bytes of an archive live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArchiveLocation {
    /// A `file:` URL of an archive on disk
    Disk(Url),
    /// An entry inside another archive
    Nested(Box<ZipStoreId>),
}

impl ArchiveLocation {
    /// Maps a URI naming archive bytes to a location. Only `file:` and `zip:`
    /// URIs can hold an archive.
    pub fn from_url(url: &Url) -> Option<Self> {
        match url.scheme() {
            "file" => Some(ArchiveLocation::Disk(url.clone())),
            ZIP_SCHEME => ZipStoreId::from_url(url).map(|id| ArchiveLocation::Nested(Box::new(id))),
            _ => None,
        }
    }

    pub fn to_uri(&self) -> Url {
        match self {
            ArchiveLocation::Disk(url) => url.clone(),
            ArchiveLocation::Nested(id) => id.to_uri(),
        }
    }

    /// File name of the archive itself
    pub fn name(&self) -> String {
        match self {
            ArchiveLocation::Disk(url) => url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
                .unwrap_or_default(),
            ArchiveLocation::Nested(id) => path::simple_name(&id.path).to_string(),
        }
    }

    /// True if this location is `other` or an archive nested (at any depth) inside it.
    pub fn is_within(&self, other: &ArchiveLocation) -> bool {
        if self == other {
            return true;
        }
        match self {
            ArchiveLocation::Disk(_) => false,
            ArchiveLocation::Nested(id) => id.location.is_within(other),
        }
    }

    /// URL of the disk file that ultimately holds these bytes
    pub fn disk_url(&self) -> &Url {
        match self {
            ArchiveLocation::Disk(url) => url,
            ArchiveLocation::Nested(id) => id.location.disk_url(),
        }
    }

    /// Nesting depth; a disk archive is depth 0
    pub fn depth(&self) -> usize {
        match self {
            ArchiveLocation::Disk(_) => 0,
            ArchiveLocation::Nested(id) => id.location.depth() + 1,
        }
    }
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Identity of a virtual file store: archive location plus inner path
///
/// Equality never depends on whether the entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZipStoreId {
    pub location: ArchiveLocation,
    pub path: String,
}

impl ZipStoreId {
    pub fn new(location: ArchiveLocation, inner_path: &str) -> Self {
        Self {
            location,
            path: path::normalize(inner_path),
        }
    }

    pub fn root(location: ArchiveLocation) -> Self {
        Self {
            location,
            path: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn child(&self, name: &str) -> Self {
        Self {
            location: self.location.clone(),
            path: path::join(&self.path, name),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        path::parent(&self.path).map(|parent| Self {
            location: self.location.clone(),
            path: parent.to_string(),
        })
    }

    /// Location of the archive stored at this entry, for nesting
    pub fn as_location(&self) -> ArchiveLocation {
        ArchiveLocation::Nested(Box::new(self.clone()))
    }

    /// True if `location` is an archive stored at this entry or anywhere
    /// below it, at any nesting depth.
    pub fn encloses(&self, location: &ArchiveLocation) -> bool {
        match location {
            ArchiveLocation::Disk(_) => false,
            ArchiveLocation::Nested(id) => {
                let stored_here = id.location == self.location
                    && (id.path == self.path || path::is_ancestor(&self.path, &id.path));
                stored_here || self.encloses(&id.location)
            }
        }
    }

    pub fn to_uri(&self) -> Url {
        let mut url = Url::parse("zip:/").expect("constant zip URL is valid");
        url.set_path(&format!("/{}", utf8_percent_encode(&self.path, INNER_PATH)));
        url.set_query(Some(self.location.to_uri().as_str()));
        url
    }

    pub fn parse(uri: &str) -> Result<Self, VfsError> {
        let url = Url::parse(uri).map_err(|e| VfsError::InvalidUri(format!("{}: {}", uri, e)))?;
        Self::from_url(&url).ok_or_else(|| VfsError::InvalidUri(uri.to_string()))
    }

    /// Parses either `zip:` rendering; `None` for foreign or malformed URIs.
    pub fn from_url(url: &Url) -> Option<Self> {
        if url.scheme() != ZIP_SCHEME {
            return None;
        }

        let (outer, inner) = if url.cannot_be_a_base() {
            let body = &url.as_str()[ZIP_SCHEME.len() + 1..];
            let (outer, inner) = body.rsplit_once('!')?;
            (outer.to_string(), inner.to_string())
        } else {
            (url.query()?.to_string(), url.path().to_string())
        };

        let outer = Url::parse(&outer).ok()?;
        let location = ArchiveLocation::from_url(&outer)?;
        let inner = percent_decode_str(&inner).decode_utf8().ok()?;
        Some(Self::new(location, &inner))
    }
}

impl fmt::Display for ZipStoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Path-style zip URI for an entry of the archive at `archive`
pub fn zip_uri(archive: &Url, inner_path: &str) -> Option<Url> {
    ArchiveLocation::from_url(archive).map(|location| ZipStoreId::new(location, inner_path).to_uri())
}
