//! Core data models for the music index.
//!
//! Defines the persisted entities ([`Artist`], [`Album`], [`Track`]) and the
//! read-only [`SearchResult`] projection returned by search and browse calls.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `artists` - Artist records with unique names
//! - `albums` - Albums, unique per (name, artist)
//! - `tracks` - Individual audio files, unique per filesystem path

use serde::Serialize;
use sqlx::FromRow;

/// Label used for every missing artist, album or title tag. All untagged
/// files collapse onto the same artist and album rows.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// An artist in the music index.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Artist {
    /// Database ID (auto-generated)
    #[serde(rename = "artist_id")]
    pub id: i64,
    /// Artist name (unique)
    #[serde(rename = "artist")]
    pub name: String,
}

/// An album together with the name of its owning artist.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Album {
    /// Database ID (auto-generated)
    #[serde(rename = "album_id")]
    pub id: i64,
    /// Album name
    #[serde(rename = "album")]
    pub name: String,
    /// Owning artist's name
    pub artist: String,
}

/// A track (audio file) in the music index.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Track {
    pub id: i64,
    /// Title from tags, or the file's base name
    pub name: String,
    pub album_id: i64,
    pub artist_id: i64,
    /// Absolute filesystem path (natural key)
    pub fs_path: String,
    /// Track number, 0 when unknown
    pub number: i64,
}

/// One row of a search, album listing or browse result.
///
/// Identifies a track without revealing where its file lives; the path is
/// resolved separately through the track ID.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SearchResult {
    pub id: i64,
    pub artist: String,
    pub album_id: i64,
    pub album: String,
    pub title: String,
    #[serde(rename = "track")]
    pub track_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_json_shape() {
        let result = SearchResult {
            id: 3,
            artist: "Buggy Bugoff".to_string(),
            album_id: 7,
            album: "Return Of The Bugs".to_string(),
            title: "Payback".to_string(),
            track_number: 1,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["album_id"], 7);
        assert_eq!(json["track"], 1);
        assert_eq!(json["title"], "Payback");
    }

    #[test]
    fn test_browse_rows_json_shape() {
        let artist = Artist {
            id: 1,
            name: "Artist Testoff".to_string(),
        };
        let json = serde_json::to_value(&artist).unwrap();
        assert_eq!(json["artist_id"], 1);
        assert_eq!(json["artist"], "Artist Testoff");

        let album = Album {
            id: 2,
            name: "Album Of Tests".to_string(),
            artist: "Artist Testoff".to_string(),
        };
        let json = serde_json::to_value(&album).unwrap();
        assert_eq!(json["album_id"], 2);
        assert_eq!(json["album"], "Album Of Tests");
    }
}
