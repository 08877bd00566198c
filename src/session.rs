use std::collections::HashMap;
use std::path::PathBuf;

/// A file the bot has handed over during one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedSong {
    /// Performer, "Unknown Artist" when the bot omitted it
    pub artist: String,
    /// Title, "Unknown Title" when the bot omitted it
    pub title: String,
    /// Where the file was written
    pub path: PathBuf,
}

/// Mutable progress record for one bot-driven download attempt.
///
/// Created at the start of an attempt, mutated as bot responses arrive,
/// and handed back to the caller as the attempt's report. Never persisted;
/// a failed attempt is abandoned, not resumed.
#[derive(Debug, Clone)]
pub struct DownloadSession {
    /// The playlist link that was sent to the bot
    pub playlist_url: String,
    /// Display name of the playlist, resolved during the button wait
    pub playlist_name: String,
    /// Expected number of tracks, parsed from the bot's reply.
    /// `None` until the bot has answered.
    pub total_tracks: Option<usize>,
    /// Files fetched so far, keyed by sanitized file name
    pub downloaded_songs: HashMap<String, DownloadedSong>,
    /// Whether the GET ALL button has been clicked
    pub get_all_clicked: bool,
}

impl DownloadSession {
    pub fn new(playlist_url: impl Into<String>) -> Self {
        Self {
            playlist_url: playlist_url.into(),
            playlist_name: String::new(),
            total_tracks: None,
            downloaded_songs: HashMap::new(),
            get_all_clicked: false,
        }
    }

    /// Record one fetched file.
    pub fn add_downloaded_song(&mut self, file_name: impl Into<String>, song: DownloadedSong) {
        self.downloaded_songs.insert(file_name.into(), song);
    }

    /// True once the expected track count is known and at least that many
    /// files have been recorded. Always false while `total_tracks` is
    /// unset.
    pub fn all_songs_downloaded(&self) -> bool {
        match self.total_tracks {
            Some(total) => self.downloaded_songs.len() >= total,
            None => false,
        }
    }
}
