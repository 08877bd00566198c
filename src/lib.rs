#![doc = include_str!("../README.md")]

mod bot;
mod session;
mod snapshot;
mod spotify;
mod track;
mod watcher;

pub use bot::*;
pub use session::*;
pub use snapshot::*;
pub use spotify::*;
pub use track::*;
pub use watcher::*;

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum_macros::{AsRefStr, EnumString};

pub(crate) static SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";
pub(crate) static SPOTIFY_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com/api";

/// Error response body returned by the Spotify Web API.
///
/// Spotify wraps errors in `{"error": {"status": ..., "message": ...}}`;
/// this is the inner object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpotifyApiError {
    /// HTTP status code
    pub status: u16,
    /// Human-readable error message
    #[serde(default)]
    pub message: String,
}

impl Display for SpotifyApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Spotify API error: {} {}", self.status, self.message)
    }
}

/// Errors that can occur when using the playlistwatch library.
///
/// This enum covers all possible error conditions including network issues,
/// API errors, persistence failures, and terminal bot-session outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed (network issues, timeouts, etc.)
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Spotify API returned an error response
    #[error("Spotify API error: {0}")]
    SpotifyApiError(SpotifyApiError),
    /// JSON serialization/deserialization failed
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Snapshot database operation failed
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    /// Filesystem operation failed while preparing a download
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// No refresh token available to refresh client authorization
    #[error("No authz available to refresh client authorization")]
    NoAuthz,
    /// No access token available - client needs authentication
    #[error("No access token available - have you authorized the client?")]
    NoAccessTokenAvailable,
    /// The playlist id could not be resolved upstream.
    /// Recoverable: the caller may reprompt for a different link.
    #[error("Playlist {0} not found")]
    PlaylistNotFound(String),
    /// The bot never exposed the expected button within the wait bound
    #[error("No response with GET ALL button within {0:?}")]
    ButtonTimeout(std::time::Duration),
    /// The bot never sent the finish message within the wait bound
    #[error("Download never finished within {0:?}")]
    FinishTimeout(std::time::Duration),
    /// The finish signal arrived but fewer attachments than expected were found
    #[error("Incomplete download: {downloaded}/{total} tracks fetched")]
    IncompleteDownload { downloaded: usize, total: usize },
}

/// What to hand to the bot after a playlist check has found new tracks.
///
/// Parsed from the user's `all`/`new`/`n` answer at the prompt.
#[derive(Debug, Serialize, Deserialize, EnumString, AsRefStr, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchScope {
    /// Fetch the whole playlist
    All,
    /// Fetch only the newly added tracks (via a temporary playlist)
    New,
    /// Fetch nothing
    #[strum(serialize = "n", serialize = "none")]
    None,
}
