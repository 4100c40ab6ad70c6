//! Search, browse and lookup commands.

use serde::Serialize;
use tokio::runtime::Runtime;

use super::open_library;
use crate::config::LibraryConfig;
use crate::library::Library;
use crate::metadata::guess_track_number;
use crate::model::SearchResult;

/// Search the index for a substring
pub fn cmd_search(rt: &Runtime, config: LibraryConfig, term: &str, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let mut library = open_for_query(config).await?;
        let results = library.search(term).await;
        library.close().await;
        print_tracks(&results, json)
    })
}

/// List the tracks of one album
pub fn cmd_album(rt: &Runtime, config: LibraryConfig, album_id: i64, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let mut library = open_for_query(config).await?;
        let results = library.album_files(album_id).await;
        library.close().await;

        if results.is_empty() && !json {
            println!("No tracks for album {album_id}");
            return Ok(());
        }
        print_tracks(&results, json)
    })
}

/// List one page of artists
pub fn cmd_artists(
    rt: &Runtime,
    config: LibraryConfig,
    page: u32,
    per_page: u32,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let mut library = open_for_query(config).await?;
        let (artists, total) = library.browse_artists(page, per_page).await;
        library.close().await;

        if json {
            return print_json(&Page { items: &artists, total });
        }
        for artist in &artists {
            println!("{:>6}  {}", artist.id, artist.name);
        }
        print_footer(page, artists.len(), total);
        Ok(())
    })
}

/// List one page of albums
pub fn cmd_albums(
    rt: &Runtime,
    config: LibraryConfig,
    page: u32,
    per_page: u32,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let mut library = open_for_query(config).await?;
        let (albums, total) = library.browse_albums(page, per_page).await;
        library.close().await;

        if json {
            return print_json(&Page { items: &albums, total });
        }
        for album in &albums {
            println!("{:>6}  {} - {}", album.id, album.artist, album.name);
        }
        print_footer(page, albums.len(), total);
        Ok(())
    })
}

/// Print the file path behind a track ID
pub fn cmd_path(rt: &Runtime, config: LibraryConfig, track_id: i64) -> anyhow::Result<()> {
    rt.block_on(async {
        let mut library = open_for_query(config).await?;
        let path = library.file_path(track_id).await;
        library.close().await;

        let Some(path) = path else {
            anyhow::bail!("No track with ID {track_id}");
        };
        println!("{}", path.display());
        Ok(())
    })
}

/// Print the guessed track number for each name
pub fn cmd_guess(names: &[String]) {
    for name in names {
        println!("{:>3}  {}", guess_track_number(name), name);
    }
}

#[derive(Serialize)]
struct Page<'a, T> {
    items: &'a [T],
    total: i64,
}

/// Queries never need the watcher.
async fn open_for_query(mut config: LibraryConfig) -> anyhow::Result<Library> {
    config.watch_for_changes = false;
    open_library(config).await
}

fn print_tracks(results: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(results);
    }
    for r in results {
        println!(
            "{:>6}  {:>2}. {} - {} - {}",
            r.id, r.track_number, r.artist, r.album, r.title
        );
    }
    println!("{} tracks", results.len());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_footer(page: u32, shown: usize, total: i64) {
    println!("Page {page}: {shown} of {total}");
}
