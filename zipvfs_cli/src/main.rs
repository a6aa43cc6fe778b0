use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use url::Url;
use zipvfs_common::{
    ensure_config, load_config, CancelToken, FileInfo, FileStore, PutInfoOptions,
};
use zipvfs_core::location::zip_uri;
use zipvfs_core::{transfer, LocalFileStore, NullStore, ZipFileSystem};

#[derive(Parser)]
#[command(name = "zipvfs")]
#[command(author = "ZipVfs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Browse and edit ZIP archives as ordinary folders", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $ZIPVFS_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Targets are `zip:` or `file:` URIs, or plain paths. A plain path combined
/// with `--entry` addresses that entry of the archive at the path.
#[derive(Subcommand)]
enum Commands {
    /// List the children of a folder or archive
    Ls {
        target: String,

        /// Entry inside the archive at TARGET
        #[arg(short, long)]
        entry: Option<String>,

        /// Show kind, size and modification time
        #[arg(short, long)]
        long: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the whole tree below a folder or archive
    Tree {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Write the content of a file to stdout
    Cat {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Store a local file at the target, replacing any existing content
    Put {
        target: String,

        /// Local file to read
        source: PathBuf,

        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Create a folder and any missing parents
    Mkdir {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Delete a file or folder recursively
    Rm {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,
    },

    /// Move a file or folder between any two locations
    Mv { source: String, destination: String },

    /// Copy a file or folder between any two locations
    Cp { source: String, destination: String },

    /// Show what is known about a single resource
    Info {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Set the modification time of a resource
    Touch {
        target: String,

        #[arg(short, long)]
        entry: Option<String>,

        /// Seconds since the Unix epoch (defaults to now)
        #[arg(long)]
        time: Option<u64>,
    },

    /// Print the `zip:` URI of an archive or one of its entries
    Uri {
        archive: PathBuf,

        entry: Option<String>,
    },

    /// Show the configuration in use
    Config {
        /// Write the default configuration if no file exists yet
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    // Initialize tracing to stderr (so listings and file content go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    let loaded = load_config(config_path)?;
    debug!(
        "Using configuration {} (present: {})",
        loaded.path.display(),
        loaded.exists
    );
    let fs = ZipFileSystem::new(loaded.config);

    match cli.command {
        Commands::Ls {
            target,
            entry,
            long,
            json,
        } => run_ls(&fs, &target, entry.as_deref(), long, json),
        Commands::Tree { target, entry } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            ensure_exists(store.as_ref())?;
            println!("{}", store.name());
            print_tree(store.as_ref(), "")
        }
        Commands::Cat { target, entry } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            let mut reader = store.open_input_stream()?;
            let mut stdout = io::stdout().lock();
            io::copy(&mut reader, &mut stdout)?;
            stdout.flush()?;
            Ok(())
        }
        Commands::Put {
            target,
            source,
            entry,
        } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            let mut input = File::open(&source)
                .with_context(|| format!("Cannot open {}", source.display()))?;
            let mut writer = store.open_output_stream()?;
            let written = io::copy(&mut input, &mut writer)?;
            writer.commit()?;
            info!("Stored {} bytes at {}", written, store.to_uri());
            Ok(())
        }
        Commands::Mkdir { target, entry } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            store.mkdir()?;
            info!("Created {}", store.to_uri());
            Ok(())
        }
        Commands::Rm { target, entry } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            ensure_exists(store.as_ref())?;
            store.delete()?;
            info!("Deleted {}", store.to_uri());
            Ok(())
        }
        Commands::Mv {
            source,
            destination,
        } => {
            let (source, destination) = resolve_pair(&fs, &source, &destination)?;
            source.move_to(destination.as_ref())?;
            info!("Moved {} to {}", source.to_uri(), destination.to_uri());
            Ok(())
        }
        Commands::Cp {
            source,
            destination,
        } => {
            let (source, destination) = resolve_pair(&fs, &source, &destination)?;
            transfer::copy_tree(source.as_ref(), destination.as_ref(), &CancelToken::new())?;
            info!("Copied {} to {}", source.to_uri(), destination.to_uri());
            Ok(())
        }
        Commands::Info {
            target,
            entry,
            json,
        } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            let info = store.fetch_info()?;
            if json {
                let report = JsonInfo::new(&info, store.to_uri().to_string());
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_info(&info, &store.to_uri());
            }
            Ok(())
        }
        Commands::Touch {
            target,
            entry,
            time,
        } => {
            let store = resolve_target(&fs, &target, entry.as_deref())?;
            let mut info = ensure_exists(store.as_ref())?;
            let modified = match time {
                Some(secs) => UNIX_EPOCH + Duration::from_secs(secs),
                None => SystemTime::now(),
            };
            info.modified = Some(modified);
            store.put_info(&info, PutInfoOptions::last_modified())?;
            info!("Touched {}", store.to_uri());
            Ok(())
        }
        Commands::Uri { archive, entry } => {
            let url = file_url(&archive)?;
            let uri = zip_uri(&url, entry.as_deref().unwrap_or(""))
                .with_context(|| format!("Not an archive location: {}", url))?;
            println!("{}", uri);
            Ok(())
        }
        Commands::Config { init } => run_config(config_path, init),
    }
}

fn run_config(config_path: Option<&Path>, init: bool) -> anyhow::Result<()> {
    let loaded = if init {
        ensure_config(config_path)?
    } else {
        load_config(config_path)?
    };
    if init && !loaded.exists {
        info!("Wrote default configuration to {}", loaded.path.display());
    }

    let report = JsonConfig {
        path: loaded.path.display().to_string(),
        exists: loaded.exists || init,
        config: loaded.config,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_ls(
    fs: &ZipFileSystem,
    target: &str,
    entry: Option<&str>,
    long: bool,
    json: bool,
) -> anyhow::Result<()> {
    let store = resolve_target(fs, target, entry)?;
    let info = ensure_exists(store.as_ref())?;
    if !info.is_dir {
        bail!("Not a folder: {}", store.to_uri());
    }
    let children = store.child_infos(&CancelToken::new())?;

    if json {
        let entries: Vec<JsonInfo> = children
            .iter()
            .map(|child| JsonInfo::new(child, store.child(&child.name).to_uri().to_string()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for child in &children {
        if long {
            println!(
                "{} {:>12} {:>12} {}",
                if child.is_dir { "d" } else { "-" },
                child.size,
                format_mtime(child.modified),
                child.name
            );
        } else if child.is_dir {
            println!("{}/", child.name);
        } else {
            println!("{}", child.name);
        }
    }
    Ok(())
}

fn print_tree(store: &dyn FileStore, indent: &str) -> anyhow::Result<()> {
    let children = store.child_infos(&CancelToken::new())?;
    let count = children.len();
    for (i, child) in children.into_iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        if child.is_dir {
            println!("{}{}{}/", indent, branch, child.name);
            let nested = format!("{}{}", indent, if last { "    " } else { "│   " });
            print_tree(store.child(&child.name).as_ref(), &nested)?;
        } else {
            println!("{}{}{}", indent, branch, child.name);
        }
    }
    Ok(())
}

fn print_info(info: &FileInfo, uri: &Url) {
    println!("URI:       {}", uri);
    println!("Name:      {}", info.name);
    println!("Exists:    {}", info.exists);
    if !info.exists {
        return;
    }
    println!("Kind:      {}", if info.is_dir { "folder" } else { "file" });
    println!("Size:      {}", info.size);
    println!("Modified:  {}", format_mtime(info.modified));
    println!("Read-only: {}", info.read_only);
}

fn format_mtime(modified: Option<SystemTime>) -> String {
    unix_secs(modified)
        .map(|secs| secs.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn unix_secs(modified: Option<SystemTime>) -> Option<u64> {
    modified
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
}

fn ensure_exists(store: &dyn FileStore) -> anyhow::Result<FileInfo> {
    let info = store.fetch_info()?;
    if !info.exists {
        bail!("Path not found: {}", store.to_uri());
    }
    Ok(info)
}

/// Maps a command-line target to a store
fn resolve_target(
    fs: &ZipFileSystem,
    target: &str,
    entry: Option<&str>,
) -> anyhow::Result<Box<dyn FileStore>> {
    if let Some(entry) = entry {
        let url = file_url(Path::new(target))?;
        let root = fs
            .archive_root(&url)
            .with_context(|| format!("Not an archive location: {}", url))?;
        return Ok(if entry.trim_matches('/').is_empty() {
            Box::new(root) as Box<dyn FileStore>
        } else {
            root.child(entry)
        });
    }

    match parse_uri(target) {
        Some(url) => {
            let store = fs.store_for(&url);
            if store.as_any().downcast_ref::<NullStore>().is_some() {
                bail!("Unsupported or malformed URI: {}", target);
            }
            Ok(store)
        }
        None => Ok(Box::new(LocalFileStore::from_path(Path::new(target))?)),
    }
}

fn resolve_pair(
    fs: &ZipFileSystem,
    source: &str,
    destination: &str,
) -> anyhow::Result<(Box<dyn FileStore>, Box<dyn FileStore>)> {
    let source = resolve_target(fs, source, None)?;
    let destination = resolve_target(fs, destination, None)?;
    ensure_exists(source.as_ref())?;
    if destination.fetch_info()?.exists {
        bail!("Destination already exists: {}", destination.to_uri());
    }
    Ok((source, destination))
}

/// `Some` for `zip:` and `file:` URIs; anything else is treated as a path
fn parse_uri(target: &str) -> Option<Url> {
    let url = Url::parse(target).ok()?;
    matches!(url.scheme(), "zip" | "file").then_some(url)
}

fn file_url(path: &Path) -> anyhow::Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| anyhow::anyhow!("Invalid path: {}", absolute.display()))
}

#[derive(Serialize)]
struct JsonInfo {
    name: String,
    uri: String,
    exists: bool,
    is_dir: bool,
    size: u64,
    modified: Option<u64>,
    read_only: bool,
}

impl JsonInfo {
    fn new(info: &FileInfo, uri: String) -> Self {
        JsonInfo {
            name: info.name.clone(),
            uri,
            exists: info.exists,
            is_dir: info.is_dir,
            size: info.size,
            modified: unix_secs(info.modified),
            read_only: info.read_only,
        }
    }
}

#[derive(Serialize)]
struct JsonConfig {
    path: String,
    exists: bool,
    config: zipvfs_common::StoreConfig,
}
