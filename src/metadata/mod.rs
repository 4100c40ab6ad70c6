//! Audio tag reading.
//!
//! Ingestion reads artist, album, title and track number through the
//! [`TagReader`] trait. [`LoftyTagReader`] is the production implementation,
//! using the lofty crate for format-independent tag access (MP3, FLAC, OGG,
//! M4A, WAV).
//!
//! Missing tags come back as empty strings and a track number of 0; the store
//! decides how to normalize them.

pub mod track_number;

pub use track_number::guess_track_number;

use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::Accessor;
use std::path::Path;

use crate::error::{Error, Result};

/// Tags extracted from one media file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    /// 0 when the tag is absent
    pub track_number: u32,
}

/// Reads tags from a media file.
///
/// Implementations fail with [`Error::Metadata`] when the file cannot be
/// parsed. Any file handle opened for reading is released before returning.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TrackTags>;
}

/// [`TagReader`] backed by lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<TrackTags> {
        let tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| Error::metadata(path, e.to_string()))?;

        // Prefer the primary tag, fall back to the first available one
        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(TrackTags::default());
        };

        Ok(TrackTags {
            artist: tag.artist().map(|s| s.trim().to_string()).unwrap_or_default(),
            album: tag.album().map(|s| s.trim().to_string()).unwrap_or_default(),
            title: tag.title().map(|s| s.trim().to_string()).unwrap_or_default(),
            track_number: tag.track().unwrap_or(0),
        })
    }
}
