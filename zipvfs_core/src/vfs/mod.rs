pub mod filesystem;
pub mod local;
pub mod null;
pub mod zip_store;

#[cfg(test)]
mod tests_local;


#[cfg(test)]
mod tests_zip;

pub use filesystem::ZipFileSystem;
pub use local::LocalFileStore;
pub use null::NullStore;
pub use zip_store::ZipStore;
