//! Command-line interface for music-indexer.
//!
//! Scans and watches library roots, and answers search, browse and lookup
//! queries against the index.

mod commands;

pub use commands::{Cli, Commands, run_command};
