//! Playlist checking example demonstrating the change-tracking loop.
//!
//! This example shows how to:
//! - Create a SpotifyClient from environment credentials
//! - Open the SQLite snapshot store
//! - Check a playlist for newly added tracks
//! - Run the one-time "track all playlists" onboarding prompt

use playlistwatch::{
    Authz, PlaylistService, PlaylistWatcher, SpotifyClient, SqliteStore, extract_playlist_id,
};
use std::io::Write;

fn prompt(question: &str) -> std::io::Result<String> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_lowercase())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    // In a real application you would run an OAuth flow once and persist
    // the tokens; here they come from the environment
    let client_id = std::env::var("SPOTIFY_CLIENT_ID")?;
    let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET")?;
    let access_token = std::env::var("SPOTIFY_ACCESS_TOKEN")?;
    let refresh_token = std::env::var("SPOTIFY_REFRESH_TOKEN")?;

    let spotify = SpotifyClient::new(client_id, client_secret)
        .with_authz(Authz::new(access_token, refresh_token))
        .with_authz_refresh_callback(|new_authz| {
            println!("Tokens refreshed; persist the new refresh token!");
            let _ = new_authz;
        });

    let store = SqliteStore::open("playlist_memory.db")?;
    let watcher = PlaylistWatcher::new(spotify, store);

    // One-time onboarding: offer to snapshot everything the user owns
    let user_id = watcher.service().current_user_id().await?;
    if !watcher.store().was_prompted(&user_id)? {
        if prompt("Would you like to track all your playlists? (y/n): ")? == "y" {
            let count = watcher.track_all().await?;
            println!("Now tracking {count} playlists.");
        }
        watcher.store().set_prompted(&user_id)?;
    }

    loop {
        let input = prompt("Enter Spotify playlist link or 'q' to exit session: ")?;
        if input == "q" {
            break;
        }

        let playlist_id = extract_playlist_id(&input);

        let new_songs = match watcher.check(&playlist_id).await {
            Ok(new_songs) => new_songs,
            Err(e) => {
                println!("Unable to find playlist based on given URL: {e}\n");
                continue;
            }
        };

        if new_songs.is_empty() {
            println!("No new songs added.");
        } else {
            println!("New songs found:");
            for (uri, track) in &new_songs {
                println!("- {} by {} (URI: {})", track.name, track.artists, uri);
            }
        }

        if prompt("Would you like to view your playlists being tracked? (y/n): ")? == "y" {
            for id in watcher.store().tracked_playlists()? {
                println!("  - {id}");
            }
        }
    }

    Ok(())
}
