//! Bot fetching example demonstrating the full check-then-download flow.
//!
//! This example shows how to:
//! - Diff a playlist against its stored snapshot
//! - Offer the all/new/n choice after new tracks are found
//! - Build a temporary "newly added songs" playlist for the `new` branch
//! - Drive the download bot through a session and clean up afterwards
//!
//! The chat transport is left as a stub: implement `ChatTransport` over
//! your messaging client and swap it in where `StubTransport` is built.

use async_trait::async_trait;
use playlistwatch::{
    Authz, BotDownloader, ChatTransport, Error, FetchScope, Message, PlaylistService,
    PlaylistWatcher, SpotifyClient, SqliteStore, extract_playlist_id,
};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Placeholder transport so the example compiles stand-alone. Every wait
/// against it times out; replace it with a transport over your messaging
/// client to actually reach the bot.
struct StubTransport;

#[async_trait]
impl ChatTransport for StubTransport {
    async fn send_message(&self, text: &str) -> Result<(), Error> {
        println!("(stub) would send to bot: {text}");
        Ok(())
    }

    async fn recent_history(&self, _limit: usize) -> Result<Vec<Message>, Error> {
        Ok(Vec::new())
    }

    async fn invoke_callback(&self, _message_id: i64, _callback_data: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn download_attachment(&self, _file_id: &str, _dest: &Path) -> Result<(), Error> {
        Ok(())
    }
}

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

    let client_id = std::env::var("SPOTIFY_CLIENT_ID")?;
    let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET")?;
    let access_token = std::env::var("SPOTIFY_ACCESS_TOKEN")?;
    let refresh_token = std::env::var("SPOTIFY_REFRESH_TOKEN")?;

    let spotify = SpotifyClient::new(client_id, client_secret)
        .with_authz(Authz::new(access_token, refresh_token));
    let store = SqliteStore::open("playlist_memory.db")?;
    let watcher = PlaylistWatcher::new(spotify, store);

    let downloader = BotDownloader::new(StubTransport);

    let playlist_url = prompt("Enter Spotify playlist link: ")?;
    let playlist_id = extract_playlist_id(&playlist_url);

    let new_songs = watcher.check(&playlist_id).await?;
    let original_name = watcher.service().playlist_name(&playlist_id).await?;

    if new_songs.is_empty() {
        if prompt("No new songs. Download the original playlist anyway? (y/n): ")? == "y" {
            let session = downloader
                .fetch_playlist(&playlist_url, Some(&original_name))
                .await?;
            println!("Fetched {} files.", session.downloaded_songs.len());
        }
        return Ok(());
    }

    println!("New songs found:");
    for (uri, track) in &new_songs {
        println!("- {} by {} (URI: {})", track.name, track.artists, uri);
    }

    let answer = prompt(
        "Would you like to download the whole playlist (all), \
         just the new songs (new), or none (n)? (all/new/n): ",
    )?;
    let scope = FetchScope::from_str(&answer).unwrap_or(FetchScope::None);

    match scope {
        FetchScope::All => {
            println!("Downloading the whole playlist...");
            // The bot gets the original playlist link here, not a derived one
            let session = downloader
                .fetch_playlist(&playlist_url, Some(&original_name))
                .await?;
            println!("Fetched {} files.", session.downloaded_songs.len());
        }
        FetchScope::New => {
            println!("Downloading the new songs...");
            let temp_name = format!("{original_name} - Newly Added Songs (Temp)");
            let uris: Vec<String> = new_songs.keys().cloned().collect();

            let temp_link = watcher
                .service()
                .create_private_playlist(&temp_name, &uris)
                .await?;
            println!("Created new temp playlist: {temp_link}");

            let result = downloader
                .fetch_playlist(&temp_link, Some(&original_name))
                .await;

            // The temp playlist is scaffolding either way
            let temp_id = extract_playlist_id(&temp_link);
            watcher.service().unfollow_playlist(&temp_id).await?;

            let session = result?;
            println!("Fetched {} files.", session.downloaded_songs.len());
        }
        FetchScope::None => {
            println!("Skipping download.");
        }
    }

    Ok(())
}
