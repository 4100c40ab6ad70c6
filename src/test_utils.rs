//! Test utilities and fixtures for music-indexer tests.
//!
//! Real audio fixtures are not needed: [`FakeTagReader`] parses a plain text
//! "tag block" written by [`write_fake_track`], and anything else counts as an
//! unparseable file.
//!
//! # Example
//!
//! ```ignore
//! use music_indexer::test_utils::{temp_db, write_fake_track};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, dir) = temp_db().await;
//!     write_fake_track(&dir.path().join("a.mp3"), "Artist", "Album", "Title", 1);
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::{LibraryConfig, ScanConfig};
use crate::error::{Error, Result};
use crate::library::Library;
use crate::metadata::{TagReader, TrackTags};
use crate::model::SearchResult;

/// Creates a bootstrapped temporary database.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let pool = crate::db::open(&dir.path().join("test.db"))
        .await
        .expect("Failed to open test database");
    crate::db::bootstrap(&pool, crate::db::SCHEMA)
        .await
        .expect("Failed to bootstrap test database");

    (pool, dir)
}

/// Inserts artist, album and track rows directly, returning the track ID.
pub async fn insert_track_row(
    pool: &SqlitePool,
    artist: &str,
    album: &str,
    title: &str,
    number: i64,
    path: &str,
) -> i64 {
    let artist_id = crate::db::get_or_create_artist(pool, artist)
        .await
        .expect("Failed to create artist");
    let album_id = crate::db::get_or_create_album(pool, album, artist_id)
        .await
        .expect("Failed to create album");
    crate::db::get_or_create_track(pool, title, path, number, artist_id, album_id)
        .await
        .expect("Failed to insert track")
}

/// Tag reader over the text format written by [`write_fake_track`]:
/// artist, album, title and track number on four lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeTagReader;

impl TagReader for FakeTagReader {
    fn read(&self, path: &Path) -> Result<TrackTags> {
        let contents = std::fs::read_to_string(path)?;
        let lines: Vec<&str> = contents.split('\n').collect();

        let [artist, album, title, number] = lines.as_slice() else {
            return Err(Error::metadata(path, "not a fake track"));
        };
        let track_number = number
            .trim()
            .parse()
            .map_err(|_| Error::metadata(path, "bad track number"))?;

        Ok(TrackTags {
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            track_number,
        })
    }
}

/// Writes a file [`FakeTagReader`] can parse.
pub fn write_fake_track(path: &Path, artist: &str, album: &str, title: &str, number: u32) {
    std::fs::write(path, format!("{artist}\n{album}\n{title}\n{number}"))
        .expect("Failed to write fake track");
}

/// Writes a fake track next to `path` and renames it into place, so watchers
/// only ever see the complete file appear.
pub fn place_fake_track(path: &Path, artist: &str, album: &str, title: &str, number: u32) {
    let staging = path.with_extension("staging");
    write_fake_track(&staging, artist, album, title, number);
    std::fs::rename(&staging, path).expect("Failed to move fake track into place");
}

/// Opens an initialized library over `roots` with a fake tag reader and
/// unthrottled scanning. The database lives in its own temp directory.
pub async fn temp_library(roots: &[PathBuf]) -> (Library, TempDir) {
    let db_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config = LibraryConfig {
        paths: roots.to_vec(),
        database: db_dir.path().join("library.db"),
        scan: ScanConfig::fast(),
        ..LibraryConfig::default()
    };

    let library = Library::open(config, std::sync::Arc::new(FakeTagReader))
        .await
        .expect("Failed to open library");
    library.initialize().await.expect("Failed to initialize library");

    (library, db_dir)
}

/// Settles the library and searches until `expected` results show up.
///
/// The idle signal is advisory and watcher events arrive asynchronously, so
/// this retries for up to ten seconds before returning whatever it last saw.
pub async fn search_until(library: &Library, term: &str, expected: usize) -> Vec<SearchResult> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        library.wait_scan().await;
        let found = library.search(term).await;
        if found.len() == expected || tokio::time::Instant::now() >= deadline {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        assert_eq!(crate::db::count_tracks(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_track_row() {
        let (pool, _dir) = temp_db().await;

        let id = insert_track_row(&pool, "A", "B", "C", 4, "/test/song.mp3").await;
        assert!(id > 0);
        assert!(crate::db::track_exists(&pool, "/test/song.mp3").await.unwrap());
    }

    #[test]
    fn test_fake_reader_roundtrip_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");

        place_fake_track(&path, "Artist", "Album", "Title", 9);
        let tags = FakeTagReader.read(&path).unwrap();
        assert_eq!(tags.artist, "Artist");
        assert_eq!(tags.track_number, 9);
        assert!(!path.with_extension("staging").exists());

        std::fs::write(&path, "").unwrap();
        assert!(matches!(FakeTagReader.read(&path), Err(Error::Metadata { .. })));
    }
}
