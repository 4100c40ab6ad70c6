//! Index store: schema bootstrap and every statement run against it.
//!
//! Uses SQLx with SQLite. Each operation is a free async function taking the
//! pool, one statement (or one lookup plus one insert) per call. Every user
//! supplied value is bound as a parameter.
//!
//! Only the serialized writer calls the mutating functions
//! ([`get_or_create_artist`], [`get_or_create_album`], [`get_or_create_track`],
//! [`remove_by_path`], [`remove_by_path_prefix`]); readers may run at any time.
//!
//! # Example
//!
//! ```ignore
//! use music_indexer::db;
//!
//! let pool = db::open(Path::new("library.db")).await?;
//! db::bootstrap(&pool, db::SCHEMA).await?;
//! let artist_id = db::get_or_create_artist(&pool, "Iron Maiden").await?;
//! ```

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::model::{Album, Artist, SearchResult, Track, UNKNOWN_LABEL};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_indexer.db";

/// Schema script compiled into the binary.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Tables the schema script must create.
const SCHEMA_TABLES: [&str; 3] = ["artists", "albums", "tracks"];

/// Open (creating if missing) the SQLite file at `path`.
///
/// The pool allows a handful of connections so searches can run while the
/// writer is busy. No schema is created here, see [`bootstrap`].
pub async fn open(path: &Path) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Whether all index tables already exist.
pub async fn schema_present(pool: &SqlitePool) -> sqlx::Result<bool> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?, ?)",
    )
    .bind(SCHEMA_TABLES[0])
    .bind(SCHEMA_TABLES[1])
    .bind(SCHEMA_TABLES[2])
    .fetch_one(pool)
    .await?;

    Ok(count as usize == SCHEMA_TABLES.len())
}

/// Run a schema script statement by statement.
///
/// The script is split on `;`; blank statements are skipped. A script with no
/// statements at all is a configuration error.
pub async fn bootstrap(pool: &SqlitePool, script: &str) -> Result<()> {
    let statements: Vec<&str> = script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if statements.is_empty() {
        return Err(Error::config("SQL schema was empty"));
    }

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::debug!(target: "db", "Schema bootstrapped");
    Ok(())
}

/// Look up an artist by exact name.
pub async fn get_artist_id(pool: &SqlitePool, name: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM artists WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    row.map(|(id,)| id)
        .ok_or_else(|| Error::row_not_found("artist", name))
}

/// Get or create an artist by name.
///
/// An empty name is stored as [`UNKNOWN_LABEL`].
pub async fn get_or_create_artist(pool: &SqlitePool, name: &str) -> Result<i64> {
    let name = if name.is_empty() { UNKNOWN_LABEL } else { name };

    match get_artist_id(pool, name).await {
        Err(e) if e.is_not_found() => {}
        other => return other,
    }

    let result = sqlx::query("INSERT INTO artists (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Look up an album by name, scoped to its owning artist.
pub async fn get_album_id(pool: &SqlitePool, name: &str, artist_id: i64) -> Result<i64> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM albums WHERE name = ? AND artist_id = ?")
            .bind(name)
            .bind(artist_id)
            .fetch_optional(pool)
            .await?;

    row.map(|(id,)| id)
        .ok_or_else(|| Error::row_not_found("album", format!("{name} (artist {artist_id})")))
}

/// Get or create an album by name and artist.
///
/// Albums with the same name by different artists get separate rows. An empty
/// name is stored as [`UNKNOWN_LABEL`].
pub async fn get_or_create_album(pool: &SqlitePool, name: &str, artist_id: i64) -> Result<i64> {
    let name = if name.is_empty() { UNKNOWN_LABEL } else { name };

    match get_album_id(pool, name, artist_id).await {
        Err(e) if e.is_not_found() => {}
        other => return other,
    }

    let result = sqlx::query("INSERT INTO albums (name, artist_id) VALUES (?, ?)")
        .bind(name)
        .bind(artist_id)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Look up a track by title within an artist's album.
///
/// Several files may carry the same tags; the oldest row wins.
pub async fn get_track_id(
    pool: &SqlitePool,
    title: &str,
    artist_id: i64,
    album_id: i64,
) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM tracks WHERE name = ? AND artist_id = ? AND album_id = ? ORDER BY id LIMIT 1",
    )
    .bind(title)
    .bind(artist_id)
    .bind(album_id)
    .fetch_optional(pool)
    .await?;

    row.map(|(id,)| id)
        .ok_or_else(|| Error::row_not_found("track", title))
}

/// The title stored for a track: its tag, or the file's base name when the
/// tag is empty.
pub fn track_title(title: &str, path: &str) -> String {
    if !title.is_empty() {
        return title.to_string();
    }
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// ID of the track indexed at `path`, if any.
pub async fn get_track_id_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM tracks WHERE fs_path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

/// Every `(id, fs_path)` carrying this title within an artist's album.
pub async fn tracks_with_identity(
    pool: &SqlitePool,
    title: &str,
    artist_id: i64,
    album_id: i64,
) -> sqlx::Result<Vec<(i64, String)>> {
    sqlx::query_as(
        "SELECT id, fs_path FROM tracks WHERE name = ? AND artist_id = ? AND album_id = ? ORDER BY id",
    )
    .bind(title)
    .bind(artist_id)
    .bind(album_id)
    .fetch_all(pool)
    .await
}

/// Point an existing track at a new file, keeping its ID.
pub async fn relink_track(pool: &SqlitePool, track_id: i64, path: &str, number: i64) -> Result<()> {
    let result = sqlx::query("UPDATE tracks SET fs_path = ?, number = ? WHERE id = ?")
        .bind(path)
        .bind(number)
        .bind(track_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::row_not_found("track", track_id));
    }
    Ok(())
}

/// Get or create the track stored at `path`.
///
/// A file is one track: two files with identical tags get two rows. The
/// title falls back to the file's base name when empty, see [`track_title`].
pub async fn get_or_create_track(
    pool: &SqlitePool,
    title: &str,
    path: &str,
    number: i64,
    artist_id: i64,
    album_id: i64,
) -> Result<i64> {
    if let Some(id) = get_track_id_by_path(pool, path).await? {
        return Ok(id);
    }

    let result = sqlx::query(
        "INSERT INTO tracks (name, album_id, artist_id, fs_path, number) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(track_title(title, path))
    .bind(album_id)
    .bind(artist_id)
    .bind(path)
    .bind(number)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Whether a track with this exact filesystem path is indexed.
pub async fn track_exists(pool: &SqlitePool, path: &str) -> sqlx::Result<bool> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(id) FROM tracks WHERE fs_path = ?")
        .bind(path)
        .fetch_one(pool)
        .await?;
    Ok(count >= 1)
}

/// Number of indexed tracks.
pub async fn count_tracks(pool: &SqlitePool) -> sqlx::Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(id) FROM tracks")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Get a track by its database ID.
pub async fn get_track_by_id(pool: &SqlitePool, track_id: i64) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(
        "SELECT id, name, album_id, artist_id, fs_path, number FROM tracks WHERE id = ?",
    )
    .bind(track_id)
    .fetch_optional(pool)
    .await
}

/// Build a `LIKE` pattern matching `term` as a literal substring.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Search titles, album names and artist names for a substring.
///
/// Matching is case-insensitive (SQLite `LIKE`), the three columns are OR-ed
/// and results are ordered by album name then track number. An empty term
/// matches every track.
pub async fn search(pool: &SqlitePool, term: &str) -> sqlx::Result<Vec<SearchResult>> {
    let pattern = like_pattern(term);

    sqlx::query_as::<_, SearchResult>(
        r#"
        SELECT
            t.id AS id,
            at.name AS artist,
            t.album_id AS album_id,
            al.name AS album,
            t.name AS title,
            t.number AS track_number
        FROM tracks AS t
            JOIN albums AS al ON al.id = t.album_id
            JOIN artists AS at ON at.id = t.artist_id
        WHERE
            t.name LIKE ? ESCAPE '\' OR
            al.name LIKE ? ESCAPE '\' OR
            at.name LIKE ? ESCAPE '\'
        ORDER BY al.name, t.number
        "#,
    )
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(pool)
    .await
}

/// All tracks of one album, ordered by track number.
pub async fn album_files(pool: &SqlitePool, album_id: i64) -> sqlx::Result<Vec<SearchResult>> {
    sqlx::query_as::<_, SearchResult>(
        r#"
        SELECT
            t.id AS id,
            at.name AS artist,
            t.album_id AS album_id,
            al.name AS album,
            t.name AS title,
            t.number AS track_number
        FROM tracks AS t
            JOIN albums AS al ON al.id = t.album_id
            JOIN artists AS at ON at.id = t.artist_id
        WHERE t.album_id = ?
        ORDER BY al.name, t.number
        "#,
    )
    .bind(album_id)
    .fetch_all(pool)
    .await
}

/// One zero-based page of artists ordered by name, plus the total artist count.
pub async fn browse_artists(
    pool: &SqlitePool,
    page: u32,
    per_page: u32,
) -> sqlx::Result<(Vec<Artist>, i64)> {
    let artists = sqlx::query_as::<_, Artist>(
        "SELECT id, name FROM artists ORDER BY name, id LIMIT ? OFFSET ?",
    )
    .bind(i64::from(per_page))
    .bind(i64::from(page) * i64::from(per_page))
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT count(id) FROM artists")
        .fetch_one(pool)
        .await?;

    Ok((artists, total))
}

/// One zero-based page of albums ordered by name, plus the total album count.
pub async fn browse_albums(
    pool: &SqlitePool,
    page: u32,
    per_page: u32,
) -> sqlx::Result<(Vec<Album>, i64)> {
    let albums = sqlx::query_as::<_, Album>(
        r#"
        SELECT al.id AS id, al.name AS name, at.name AS artist
        FROM albums AS al
            JOIN artists AS at ON at.id = al.artist_id
        ORDER BY al.name, al.id
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(i64::from(per_page))
    .bind(i64::from(page) * i64::from(per_page))
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT count(id) FROM albums")
        .fetch_one(pool)
        .await?;

    Ok((albums, total))
}

/// Filesystem path of a track.
pub async fn file_path(pool: &SqlitePool, track_id: i64) -> Result<PathBuf> {
    let row: Option<(String,)> = sqlx::query_as("SELECT fs_path FROM tracks WHERE id = ?")
        .bind(track_id)
        .fetch_optional(pool)
        .await?;

    row.map(|(path,)| PathBuf::from(path))
        .ok_or_else(|| Error::row_not_found("track", track_id))
}

/// Delete the track stored under exactly this path. Returns rows removed.
pub async fn remove_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM tracks WHERE fs_path = ?")
        .bind(path)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every track located under `dir`. Returns rows removed.
///
/// The comparison is an exact, case-sensitive prefix match on `dir` plus a
/// trailing separator, so `/music/a` never touches `/music/ab`.
pub async fn remove_by_path_prefix(pool: &SqlitePool, dir: &str) -> sqlx::Result<u64> {
    let mut prefix = dir
        .trim_end_matches(std::path::MAIN_SEPARATOR)
        .to_string();
    prefix.push(std::path::MAIN_SEPARATOR);

    let result = sqlx::query("DELETE FROM tracks WHERE substr(fs_path, 1, ?) = ?")
        .bind(prefix.chars().count() as i64)
        .bind(&prefix)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
