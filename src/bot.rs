use crate::Error;
use crate::session::{DownloadSession, DownloadedSong};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{Instant, sleep};

/// Label of the inline button the bot exposes for whole-playlist fetches.
pub static GET_ALL_BUTTON_LABEL: &str = "GET ALL ⬇️";

/// Substring of the bot's plain-text message marking the end of uploads.
pub static FINISH_SENTINEL: &str = "Finished";

static TOTAL_TRACKS_RE: OnceLock<Regex> = OnceLock::new();

/// An inline button attached to a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Visible label
    pub text: String,
    /// Opaque payload handed back to the bot on click
    pub callback_data: String,
}

/// An audio attachment on a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    /// Transport-level file reference used for downloading
    pub file_id: String,
    /// Track title, if the bot tagged the file
    pub title: Option<String>,
    /// Performer, if the bot tagged the file
    pub performer: Option<String>,
}

/// One message from the bot conversation's history.
///
/// History is global to the conversation, not scoped per session; only the
/// timestamp distinguishes this session's messages from stale ones.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Transport-level message id
    pub id: i64,
    /// Unix timestamp (seconds) when the message was sent
    pub date: i64,
    /// Plain text body, if any
    pub text: Option<String>,
    /// Inline button rows, empty when the message carries none
    pub buttons: Vec<Vec<Button>>,
    /// Audio attachment, if any
    pub audio: Option<AudioFile>,
    /// Title of a linked page preview, if any. The bot's playlist reply
    /// carries the playlist name here.
    pub link_title: Option<String>,
}

/// Abstract contract over the external chat messaging API.
///
/// One transport value is bound to one bot conversation; sends and
/// downloads within that conversation should stay serialized so session
/// boundaries in the shared history remain unambiguous.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a plain text message to the bot.
    async fn send_message(&self, text: &str) -> Result<(), Error>;

    /// Fetch up to `limit` most recent messages, newest first.
    async fn recent_history(&self, limit: usize) -> Result<Vec<Message>, Error>;

    /// Simulate a click on an inline button.
    async fn invoke_callback(&self, message_id: i64, callback_data: &str) -> Result<(), Error>;

    /// Download an attachment to the given path.
    async fn download_attachment(&self, file_id: &str, dest: &Path) -> Result<(), Error>;
}

/// Replace every character that is not alphanumeric, space, underscore,
/// hyphen, parenthesis, or period with an underscore.
///
/// Deterministic and pure; used for both file and directory names derived
/// from bot-supplied metadata.
///
/// # Example
///
/// ```
/// use playlistwatch::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("AC/DC: Live?.mp3"), "AC_DC_ Live_.mp3");
/// ```
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '(' | ')' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Pull the expected track count out of the bot's playlist reply.
pub fn parse_total_tracks(text: &str) -> Option<usize> {
    let re = TOTAL_TRACKS_RE
        .get_or_init(|| Regex::new(r"Total tracks:\s*(\d+)").expect("invalid total tracks regex"));
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

/// Drives the remote chat bot through one playlist download.
///
/// The bot is a black box reachable only through the chat transport; there
/// is no callback API, so progress is observed by polling the conversation
/// history with the session start timestamp as a high-water mark.
///
/// Each wait step has a hard timeout and is never retried internally; a
/// timeout is terminal for the invocation and the caller may start a fresh
/// session instead.
///
/// # Example
///
/// ```no_run
/// use playlistwatch::BotDownloader;
/// use std::time::Duration;
///
/// # async fn example(transport: impl playlistwatch::ChatTransport) -> Result<(), playlistwatch::Error> {
/// let downloader = BotDownloader::new(transport)
///     .with_download_dir("music")
///     .with_button_timeout(Duration::from_secs(30));
///
/// let session = downloader
///     .fetch_playlist("https://open.spotify.com/playlist/abc", None)
///     .await?;
/// println!("Fetched {} files", session.downloaded_songs.len());
/// # Ok(())
/// # }
/// ```
pub struct BotDownloader<T: ChatTransport> {
    transport: T,
    poll_interval: Duration,
    button_timeout: Duration,
    finish_timeout: Duration,
    post_click_delay: Duration,
    history_limit: usize,
    download_dir: PathBuf,
}

impl<T: ChatTransport> BotDownloader<T> {
    /// Create a downloader over the given transport with default timing.
    ///
    /// Defaults: 500 ms poll interval, 15 s button wait, 60 s finish wait,
    /// 2 s post-click delay, 10-message history window, `downloads`
    /// output directory.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            poll_interval: Duration::from_millis(500),
            button_timeout: Duration::from_secs(15),
            finish_timeout: Duration::from_secs(60),
            post_click_delay: Duration::from_secs(2),
            history_limit: 10,
            download_dir: PathBuf::from("downloads"),
        }
    }

    /// Set the polling interval using the builder pattern.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the bound on the GET ALL button wait using the builder pattern.
    pub fn with_button_timeout(mut self, timeout: Duration) -> Self {
        self.button_timeout = timeout;
        self
    }

    /// Set the bound on the finish-message wait using the builder pattern.
    pub fn with_finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout = timeout;
        self
    }

    /// Set the pause between the button click and the finish wait using
    /// the builder pattern.
    pub fn with_post_click_delay(mut self, delay: Duration) -> Self {
        self.post_click_delay = delay;
        self
    }

    /// Set how many history messages each poll fetches using the builder
    /// pattern.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the directory downloads are written under using the builder
    /// pattern. Each playlist gets a sanitized subdirectory of its own.
    pub fn with_download_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one full download session against the bot.
    ///
    /// Sends the playlist link, waits for the GET ALL button, clicks it,
    /// waits for the finish message, then downloads every audio attachment
    /// the bot uploaded during this session.
    ///
    /// `name_override` takes precedence over the playlist name the bot
    /// reports; pass it when fetching through a temporary playlist so the
    /// files still land under the original playlist's directory.
    ///
    /// Returns the completed [`DownloadSession`] as the attempt's report.
    pub async fn fetch_playlist(
        &self,
        playlist_url: &str,
        name_override: Option<&str>,
    ) -> Result<DownloadSession, Error> {
        let session_start = unix_now();
        let mut session = DownloadSession::new(playlist_url);

        self.transport.send_message(playlist_url).await?;
        log::info!("Sent playlist link to bot: {}", playlist_url);

        let (reply, button) = self.wait_for_button(session_start).await?;

        session.total_tracks = reply.text.as_deref().and_then(parse_total_tracks);
        session.playlist_name = name_override
            .map(str::to_string)
            .or_else(|| reply.link_title.clone())
            .unwrap_or_else(|| "playlist".to_string());

        log::debug!(
            "Bot replied for '{}', total tracks: {:?}",
            session.playlist_name,
            session.total_tracks
        );

        self.transport
            .invoke_callback(reply.id, &button.callback_data)
            .await?;
        session.get_all_clicked = true;
        log::debug!("Clicked button on message {}", reply.id);

        // Give the bot a moment to queue uploads before watching for the
        // finish message
        sleep(self.post_click_delay).await;

        self.wait_for_finish(session_start).await?;

        self.collect_files(session_start, &mut session).await?;

        if session.all_songs_downloaded() {
            log::info!(
                "All {} files downloaded for '{}'",
                session.downloaded_songs.len(),
                session.playlist_name
            );
            Ok(session)
        } else {
            Err(Error::IncompleteDownload {
                downloaded: session.downloaded_songs.len(),
                total: session.total_tracks.unwrap_or(0),
            })
        }
    }

    /// Poll the history until a message at or after `session_start`
    /// carries the GET ALL button.
    async fn wait_for_button(&self, session_start: i64) -> Result<(Message, Button), Error> {
        let deadline = Instant::now() + self.button_timeout;

        loop {
            let history = self.transport.recent_history(self.history_limit).await?;

            for msg in history {
                if msg.date < session_start {
                    // Retrieval is newest-first; everything past this
                    // point belongs to an earlier session
                    break;
                }

                let found = msg
                    .buttons
                    .iter()
                    .flatten()
                    .find(|button| button.text == GET_ALL_BUTTON_LABEL)
                    .cloned();

                if let Some(button) = found {
                    log::debug!("Found button: {}", button.text);
                    return Ok((msg, button));
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::ButtonTimeout(self.button_timeout));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Poll the history until a message at or after `session_start`
    /// contains the finish sentinel in its text.
    async fn wait_for_finish(&self, session_start: i64) -> Result<Message, Error> {
        let deadline = Instant::now() + self.finish_timeout;

        loop {
            let history = self.transport.recent_history(self.history_limit).await?;

            for msg in history {
                if msg.date < session_start {
                    break;
                }

                if msg
                    .text
                    .as_deref()
                    .is_some_and(|text| text.contains(FINISH_SENTINEL))
                {
                    return Ok(msg);
                }
            }

            if Instant::now() >= deadline {
                return Err(Error::FinishTimeout(self.finish_timeout));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Download every audio attachment the bot uploaded during this
    /// session, stopping once the session is complete.
    async fn collect_files(
        &self,
        session_start: i64,
        session: &mut DownloadSession,
    ) -> Result<(), Error> {
        // A few extra slots so the bot's status messages don't push
        // uploads out of the window
        let limit = session
            .total_tracks
            .map(|total| total + 5)
            .unwrap_or(self.history_limit);

        let history = self.transport.recent_history(limit).await?;

        // Created lazily so a session that yields no files leaves no
        // empty directory behind
        let dir = self
            .download_dir
            .join(sanitize_file_name(&session.playlist_name));
        let mut dir_ready = false;

        for msg in history {
            if session.all_songs_downloaded() {
                break;
            }
            if msg.date < session_start {
                break;
            }
            let Some(audio) = msg.audio else {
                continue;
            };

            let artist = audio
                .performer
                .unwrap_or_else(|| "Unknown Artist".to_string());
            let title = audio.title.unwrap_or_else(|| "Unknown Title".to_string());
            let file_name = sanitize_file_name(&format!("{artist} - {title}.mp3"));
            let dest = dir.join(&file_name);

            if !dir_ready {
                std::fs::create_dir_all(&dir)?;
                dir_ready = true;
            }

            self.transport
                .download_attachment(&audio.file_id, &dest)
                .await?;
            log::info!("Downloaded file: {}", dest.display());

            session.add_downloaded_song(
                file_name,
                DownloadedSong {
                    artist,
                    title,
                    path: dest,
                },
            );
        }

        Ok(())
    }
}
