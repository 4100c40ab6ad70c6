//! Music Indexer - keeps a searchable index of an audio library.
//!
//! Library roots are walked and watched; supported audio files are read for
//! artist, album, title and track number and stored in SQLite, where they can
//! be searched, browsed and resolved back to files.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;

pub use error::{Error, Result};
pub use library::Library;
