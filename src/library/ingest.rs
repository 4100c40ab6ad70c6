//! Turning one filesystem path into artist, album and track rows.

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::db;
use crate::error::{Error, Result};
use crate::metadata::{TagReader, TrackTags};

/// Index a media file.
///
/// Already indexed paths are a no-op. Fails with [`Error::NotFound`] when the
/// file is gone and [`Error::Metadata`] when its tags cannot be parsed. The
/// tag's track number is trusted as is; no guessing from the file name
/// happens here.
///
/// Every file gets its own track. A row with the same tags whose file no
/// longer exists is taken to be this file after a move and is pointed at the
/// new path, so a rename keeps its track ID whichever of its add and remove
/// reaches the writer first.
pub async fn add_media(pool: &SqlitePool, reader: &Arc<dyn TagReader>, path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy();

    if db::track_exists(pool, &path_str).await? {
        return Ok(());
    }

    let tags = read_tags(Arc::clone(reader), path.to_path_buf()).await?;

    let artist_id = db::get_or_create_artist(pool, &tags.artist).await?;
    let album_id = db::get_or_create_album(pool, &tags.album, artist_id).await?;
    let title = db::track_title(&tags.title, &path_str);
    let number = i64::from(tags.track_number);

    if let Some(track_id) = find_moved(pool, &title, artist_id, album_id).await? {
        db::relink_track(pool, track_id, &path_str, number).await?;
        debug!(target: "library::ingest", path = %path.display(), track_id, "Moved track relinked");
        return Ok(());
    }

    let track_id =
        db::get_or_create_track(pool, &title, &path_str, number, artist_id, album_id).await?;

    debug!(target: "library::ingest", path = %path.display(), track_id, "Track indexed");
    Ok(())
}

/// First track with these tags whose file is gone from disk.
async fn find_moved(
    pool: &SqlitePool,
    title: &str,
    artist_id: i64,
    album_id: i64,
) -> Result<Option<i64>> {
    let candidates = db::tracks_with_identity(pool, title, artist_id, album_id).await?;
    if candidates.is_empty() {
        return Ok(None);
    }

    let moved = tokio::task::spawn_blocking(move || {
        candidates
            .into_iter()
            .find(|(_, fs_path)| !Path::new(fs_path).exists())
            .map(|(id, _)| id)
    })
    .await
    .map_err(std::io::Error::other)?;
    Ok(moved)
}

/// Stat the file and read its tags off the async runtime.
async fn read_tags(reader: Arc<dyn TagReader>, path: PathBuf) -> Result<TrackTags> {
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || {
        match std::fs::metadata(&task_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(&task_path));
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        reader.read(&task_path)
    })
    .await
    .map_err(|e| Error::metadata(path, format!("tag reader task failed: {e}")))?
}
