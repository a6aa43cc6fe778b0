pub mod archive;
pub mod hooks;
pub mod location;
pub mod path;
pub mod sniff;
pub mod transfer;
pub mod transformer;
pub mod vfs;
pub mod workspace;

pub use archive::{ArchiveHandle, ArchiveReader, HandleRegistry};
pub use hooks::MovePreparationListener;
pub use location::{ArchiveLocation, ZipStoreId};
pub use transformer::{collapse, expand, Transition};
pub use vfs::{LocalFileStore, NullStore, ZipFileSystem, ZipStore};
pub use workspace::{LifecycleEvent, LifecycleListener, Resource, Workspace};
