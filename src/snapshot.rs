use crate::Error;
use crate::track::{Track, TrackSet};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Persistence contract for the last-known track set of each playlist.
///
/// One snapshot per playlist, replaced wholesale on every check. No
/// history is retained beyond "previous" vs "current".
pub trait SnapshotStore: Send + Sync {
    /// Load the stored snapshot for a playlist.
    ///
    /// A playlist that has never been saved yields an empty set, never an
    /// error.
    fn load(&self, playlist_id: &str) -> Result<TrackSet, Error>;

    /// Replace the stored snapshot for a playlist with `tracks`.
    ///
    /// Idempotent upsert; the previous contents are discarded atomically.
    fn save(&self, playlist_id: &str, tracks: &TrackSet) -> Result<(), Error>;
}

/// SQLite-backed snapshot store.
///
/// Tracks are stored as normalized per-track rows rather than one JSON
/// blob per playlist, so a snapshot replace is a delete-and-insert inside
/// a single transaction.
///
/// # Example
///
/// ```no_run
/// use playlistwatch::SqliteStore;
///
/// let store = SqliteStore::open("playlist_memory.db")?;
/// # Ok::<(), playlistwatch::Error>(())
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Nothing survives the process; intended for
    /// tests and dry runs.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS playlist_tracks (
                playlist_id TEXT NOT NULL,
                uri         TEXT NOT NULL,
                name        TEXT NOT NULL,
                artists     TEXT NOT NULL,
                PRIMARY KEY (playlist_id, uri)
            );
            CREATE TABLE IF NOT EXISTS user_prompts (
                user_id TEXT PRIMARY KEY
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Ids of every playlist with a stored snapshot.
    pub fn tracked_playlists(&self) -> Result<Vec<String>, Error> {
        let conn = self.conn.lock().expect("snapshot store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT DISTINCT playlist_id FROM playlist_tracks ORDER BY playlist_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Whether the one-time onboarding question was already asked for this
    /// user.
    pub fn was_prompted(&self, user_id: &str) -> Result<bool, Error> {
        let conn = self.conn.lock().expect("snapshot store mutex poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM user_prompts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Record that the one-time onboarding question was asked.
    pub fn set_prompted(&self, user_id: &str) -> Result<(), Error> {
        let conn = self.conn.lock().expect("snapshot store mutex poisoned");
        conn.execute(
            "INSERT OR IGNORE INTO user_prompts (user_id) VALUES (?1)",
            params![user_id],
        )?;
        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    fn load(&self, playlist_id: &str) -> Result<TrackSet, Error> {
        let conn = self.conn.lock().expect("snapshot store mutex poisoned");
        let mut stmt =
            conn.prepare("SELECT uri, name, artists FROM playlist_tracks WHERE playlist_id = ?1")?;

        let rows = stmt.query_map(params![playlist_id], |row| {
            Ok(Track {
                uri: row.get(0)?,
                name: row.get(1)?,
                artists: row.get(2)?,
            })
        })?;

        let mut tracks = TrackSet::new();
        for row in rows {
            let track = row?;
            tracks.insert(track.uri.clone(), track);
        }

        Ok(tracks)
    }

    fn save(&self, playlist_id: &str, tracks: &TrackSet) -> Result<(), Error> {
        let mut conn = self.conn.lock().expect("snapshot store mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM playlist_tracks WHERE playlist_id = ?1",
            params![playlist_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO playlist_tracks (playlist_id, uri, name, artists)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for track in tracks.values() {
                stmt.execute(params![playlist_id, track.uri, track.name, track.artists])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
