use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// A single track as observed in a playlist.
///
/// Immutable once fetched; the URI is the unique identity used for
/// snapshot comparison.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Track {
    /// Unique track URI (e.g. `spotify:track:...`)
    pub uri: String,
    /// Track title
    pub name: String,
    /// All contributing artists, joined with ", "
    pub artists: String,
}

impl Track {
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        artists: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            artists: artists.into(),
        }
    }
}

/// The observed contents of one playlist, keyed by track URI.
///
/// Order is irrelevant; the keys are the population of interest.
pub type TrackSet = HashMap<String, Track>;

/// Compute the tracks present in `current` but absent from `previous`.
///
/// Values come from `current`, so the returned set carries the freshest
/// metadata for each surviving key.
///
/// A playlist that has never been seen before (`previous` is empty) yields
/// an empty result rather than reporting every existing track as new. This
/// keeps a first-time check from flooding the user with the playlist's
/// entire history.
///
/// # Example
///
/// ```
/// use playlistwatch::{new_tracks, Track, TrackSet};
///
/// let mut previous = TrackSet::new();
/// previous.insert("uri:a".into(), Track::new("uri:a", "Alpha", "Ann"));
///
/// let mut current = previous.clone();
/// current.insert("uri:b".into(), Track::new("uri:b", "Beta", "Bob"));
///
/// let added = new_tracks(&current, &previous);
/// assert_eq!(added.len(), 1);
/// assert!(added.contains_key("uri:b"));
/// ```
pub fn new_tracks(current: &TrackSet, previous: &TrackSet) -> TrackSet {
    if previous.is_empty() {
        return TrackSet::new();
    }

    current
        .iter()
        .filter(|(uri, _)| !previous.contains_key(*uri))
        .map(|(uri, track)| (uri.clone(), track.clone()))
        .collect()
}

/// Extract a playlist id from a Spotify playlist link.
///
/// Handles the usual share-link shape
/// `https://open.spotify.com/playlist/<ID>?si=...` (the query string is
/// ignored). Anything that is not a URL with a `/playlist/<ID>` path is
/// returned trimmed and unchanged, so a bare playlist id passes through.
///
/// # Example
///
/// ```
/// use playlistwatch::extract_playlist_id;
///
/// let id = extract_playlist_id("https://open.spotify.com/playlist/4qpwf?si=abc");
/// assert_eq!(id, "4qpwf");
/// assert_eq!(extract_playlist_id("4qpwf"), "4qpwf");
/// ```
pub fn extract_playlist_id(playlist_url: &str) -> String {
    let trimmed = playlist_url.trim();

    if let Ok(url) = Url::parse(trimmed) {
        if let Some(segments) = url.path_segments() {
            let mut segments = segments.skip_while(|segment| *segment != "playlist");
            if segments.next().is_some() {
                if let Some(id) = segments.next().filter(|id| !id.is_empty()) {
                    return id.to_string();
                }
            }
        }
    }

    trimmed.to_string()
}
