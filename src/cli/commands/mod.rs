//! CLI command definitions and dispatch.
//!
//! Each group of subcommands is implemented in its own submodule:
//! - `scan`: scanning, watching and truncating the library
//! - `query`: search, browse and lookups against the index

mod query;
mod scan;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::{self, LibraryConfig};
use crate::library::Library;
use crate::metadata::LoftyTagReader;

pub use query::{cmd_album, cmd_albums, cmd_artists, cmd_guess, cmd_path, cmd_search};
pub use scan::{cmd_scan, cmd_truncate, cmd_watch};

/// Music Indexer CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database file, overriding the config file
    #[arg(long, global = true, env = "MUSIC_INDEXER_DB")]
    pub db: Option<PathBuf>,

    /// Config file to load instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Walk directories without pausing between batches of files
    #[arg(long, global = true)]
    pub fast_library_scan: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Index the configured library paths plus any given here
    Scan {
        /// Extra directories to scan
        paths: Vec<PathBuf>,
    },
    /// Scan, then keep the index in step with the filesystem until Ctrl+C
    Watch {
        /// Extra directories to scan and watch
        paths: Vec<PathBuf>,
    },
    /// Search titles, albums and artists
    Search {
        /// Substring to look for; empty lists everything
        #[arg(default_value = "")]
        term: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List artists, one page at a time
    Artists {
        /// Zero-based page
        #[arg(long, default_value = "0")]
        page: u32,
        #[arg(long, default_value = "50")]
        per_page: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List albums, one page at a time
    Albums {
        /// Zero-based page
        #[arg(long, default_value = "0")]
        page: u32,
        #[arg(long, default_value = "50")]
        per_page: u32,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the tracks of one album
    Album {
        /// Album ID
        id: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the file behind a track ID
    Path {
        /// Track ID
        id: i64,
    },
    /// Guess track numbers from file names
    Guess {
        /// File names or paths
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete the index database
    Truncate,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    if let Commands::Guess { names } = &cli.command {
        cmd_guess(names);
        return Ok(());
    }

    let rt = Runtime::new()?;
    let config = library_config(cli)?;

    match &cli.command {
        Commands::Scan { paths } => cmd_scan(&rt, config, paths),
        Commands::Watch { paths } => cmd_watch(&rt, config, paths),
        Commands::Search { term, json } => cmd_search(&rt, config, term, *json),
        Commands::Artists {
            page,
            per_page,
            json,
        } => cmd_artists(&rt, config, *page, *per_page, *json),
        Commands::Albums {
            page,
            per_page,
            json,
        } => cmd_albums(&rt, config, *page, *per_page, *json),
        Commands::Album { id, json } => cmd_album(&rt, config, *id, *json),
        Commands::Path { id } => cmd_path(&rt, config, *id),
        Commands::Truncate => cmd_truncate(&rt, config),
        Commands::Guess { .. } => Ok(()),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Library settings from the config file with command-line overrides applied.
pub(crate) fn library_config(cli: &Cli) -> anyhow::Result<LibraryConfig> {
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    }
    .library;

    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    if cli.fast_library_scan {
        config.scan.fast = true;
    }
    Ok(config)
}

/// Open and initialize a library with the lofty tag reader.
pub(crate) async fn open_library(config: LibraryConfig) -> anyhow::Result<Library> {
    let mut library = Library::open(config, Arc::new(LoftyTagReader)).await?;
    if let Err(e) = library.initialize().await {
        library.close().await;
        return Err(e.into());
    }
    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_flow_into_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "[library]\npaths = [\"/music\"]\n").unwrap();

        let cli = Cli::try_parse_from([
            "music-indexer",
            "search",
            "maiden",
            "--json",
            "--db",
            "/tmp/other.db",
            "--config",
            config_file.to_str().unwrap(),
            "--fast-library-scan",
        ])
        .unwrap();

        assert!(matches!(&cli.command, Commands::Search { term, json: true } if term == "maiden"));

        let config = library_config(&cli).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.paths, vec![PathBuf::from("/music")]);
        assert!(config.scan.fast);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "music-indexer",
            "truncate",
            "--config",
            "/definitely/not/here.toml",
        ])
        .unwrap();
        assert!(library_config(&cli).is_err());
    }

    #[test]
    fn test_guess_requires_names() {
        assert!(Cli::try_parse_from(["music-indexer", "guess"]).is_err());
        assert!(Cli::try_parse_from(["music-indexer", "artists", "--page", "2"]).is_ok());
    }
}
