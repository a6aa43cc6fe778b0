use crate::ZipVfsError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "zipvfs.toml";
const CONFIG_ENV_VAR: &str = "ZIPVFS_CONFIG";
const DEFAULT_SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

/// Compression used for entries written through a store
///
/// Entries that are only copied or renamed keep their original encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCompression {
    #[default]
    Deflated,
    Stored,
}

/// What a writer does when another writer holds the same archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentionPolicy {
    /// Block until the other writer releases the archive
    #[default]
    Wait,
    /// Fail immediately with `HandleBusy`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub compression: EntryCompression,

    #[serde(default)]
    pub contention: ContentionPolicy,

    /// Bytes an output stream keeps in memory before spilling to a temp file
    #[serde(default = "default_spill_threshold")]
    pub spill_threshold: usize,
}

fn default_spill_threshold() -> usize {
    DEFAULT_SPILL_THRESHOLD
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            compression: EntryCompression::default(),
            contention: ContentionPolicy::default(),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: StoreConfig,
    pub path: PathBuf,
    pub exists: bool,
}

/// Loads the configuration from `path_override`, `$ZIPVFS_CONFIG`, or the
/// platform config directory, in that order. A missing file yields defaults.
pub fn load_config(path_override: Option<&Path>) -> Result<LoadedConfig, ZipVfsError> {
    let path = resolve_config_path(path_override)?;
    let exists = path.exists();

    let config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| ZipVfsError::Serialization(e.to_string()))?
    } else {
        StoreConfig::default()
    };

    Ok(LoadedConfig {
        config,
        path,
        exists,
    })
}

pub fn ensure_config(path_override: Option<&Path>) -> Result<LoadedConfig, ZipVfsError> {
    let loaded = load_config(path_override)?;
    if !loaded.exists {
        save_config(&loaded.path, &loaded.config)?;
    }
    Ok(loaded)
}

pub fn save_config(path: &Path, config: &StoreConfig) -> Result<(), ZipVfsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| ZipVfsError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

fn resolve_config_path(path_override: Option<&Path>) -> Result<PathBuf, ZipVfsError> {
    if let Some(path) = path_override {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }

    let dirs = ProjectDirs::from("", "aecs4u", "zipvfs")
        .ok_or_else(|| ZipVfsError::Config("Unable to determine config directory".to_string()))?;
    Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
}
