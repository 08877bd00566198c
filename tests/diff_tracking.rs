//! Tests for the playlist diff engine and the SQLite snapshot store.
//!
//! These run the watcher against an in-memory playlist service and an
//! in-memory SQLite store, exercising the first-seen suppression rule and
//! the unconditional snapshot advance.

use async_trait::async_trait;
use playlistwatch::{
    Error, PlaylistRef, PlaylistService, PlaylistWatcher, SnapshotStore, SqliteStore, Track,
    TrackSet, new_tracks,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory playlist service double. Playlist contents can be mutated
/// between checks to simulate tracks being added remotely.
struct FakePlaylistService {
    playlists: Mutex<HashMap<String, (String, TrackSet)>>,
}

impl FakePlaylistService {
    fn new() -> Self {
        Self {
            playlists: Mutex::new(HashMap::new()),
        }
    }

    fn set_playlist(&self, id: &str, name: &str, tracks: TrackSet) {
        self.playlists
            .lock()
            .unwrap()
            .insert(id.to_string(), (name.to_string(), tracks));
    }
}

#[async_trait]
impl PlaylistService for FakePlaylistService {
    async fn playlist_name(&self, playlist_id: &str) -> Result<String, Error> {
        self.playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| Error::PlaylistNotFound(playlist_id.to_string()))
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<TrackSet, Error> {
        self.playlists
            .lock()
            .unwrap()
            .get(playlist_id)
            .map(|(_, tracks)| tracks.clone())
            .ok_or_else(|| Error::PlaylistNotFound(playlist_id.to_string()))
    }

    async fn create_private_playlist(
        &self,
        _name: &str,
        _track_uris: &[String],
    ) -> Result<String, Error> {
        Ok("https://open.spotify.com/playlist/temp123".to_string())
    }

    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), Error> {
        self.playlists.lock().unwrap().remove(playlist_id);
        Ok(())
    }

    async fn current_user_id(&self) -> Result<String, Error> {
        Ok("user1".to_string())
    }

    async fn user_playlists(&self) -> Result<Vec<PlaylistRef>, Error> {
        let playlists = self.playlists.lock().unwrap();
        Ok(playlists
            .iter()
            .map(|(id, (name, _))| PlaylistRef {
                id: id.clone(),
                name: name.clone(),
                owner_id: "user1".to_string(),
            })
            .collect())
    }
}

fn track_set(tracks: &[(&str, &str, &str)]) -> TrackSet {
    tracks
        .iter()
        .map(|(uri, name, artists)| (uri.to_string(), Track::new(*uri, *name, *artists)))
        .collect()
}

#[test]
fn diff_returns_added_tracks_with_current_data() {
    let previous = track_set(&[("uri:a", "Alpha", "Ann"), ("uri:b", "Beta", "Bob")]);
    // uri:b's metadata changed upstream; the diff should carry current data
    let current = track_set(&[
        ("uri:a", "Alpha", "Ann"),
        ("uri:b", "Beta (Remaster)", "Bob"),
        ("uri:c", "Gamma", "Cal"),
    ]);

    let added = new_tracks(&current, &previous);

    assert_eq!(added.len(), 1);
    assert_eq!(added["uri:c"], Track::new("uri:c", "Gamma", "Cal"));
}

#[test]
fn diff_ignores_removed_tracks() {
    let previous = track_set(&[("uri:a", "Alpha", "Ann"), ("uri:b", "Beta", "Bob")]);
    let current = track_set(&[("uri:b", "Beta", "Bob")]);

    assert!(new_tracks(&current, &previous).is_empty());
}

#[test]
fn first_seen_playlist_reports_nothing_new() {
    let current = track_set(&[("uri:a", "Alpha", "Ann"), ("uri:b", "Beta", "Bob")]);

    assert!(new_tracks(&current, &TrackSet::new()).is_empty());
}

#[tokio::test]
async fn check_reports_addition_and_advances_snapshot() {
    let service = FakePlaylistService::new();
    let store = SqliteStore::open_in_memory().unwrap();

    service.set_playlist("p1", "My Mix", track_set(&[("uri:a", "Alpha", "Ann")]));

    let watcher = PlaylistWatcher::new(service, store);

    // First check: snapshot established, nothing reported
    let added = watcher.check("p1").await.unwrap();
    assert!(added.is_empty());
    assert_eq!(watcher.store().load("p1").unwrap().len(), 1);

    // A track appears remotely
    watcher.service().set_playlist(
        "p1",
        "My Mix",
        track_set(&[("uri:a", "Alpha", "Ann"), ("uri:b", "Beta", "Bob")]),
    );

    let added = watcher.check("p1").await.unwrap();
    assert_eq!(added.len(), 1);
    assert!(added.contains_key("uri:b"));

    // The snapshot now holds both tracks
    let stored = watcher.store().load("p1").unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.contains_key("uri:a"));
    assert!(stored.contains_key("uri:b"));
}

#[tokio::test]
async fn rechecking_unchanged_playlist_is_quiet() {
    let service = FakePlaylistService::new();
    let store = SqliteStore::open_in_memory().unwrap();
    service.set_playlist("p1", "My Mix", track_set(&[("uri:a", "Alpha", "Ann")]));

    let watcher = PlaylistWatcher::new(service, store);

    watcher.check("p1").await.unwrap();
    let added = watcher.check("p1").await.unwrap();

    assert!(added.is_empty());
}

#[tokio::test]
async fn snapshot_advances_even_when_nothing_is_new() {
    let service = FakePlaylistService::new();
    let store = SqliteStore::open_in_memory().unwrap();
    service.set_playlist("p1", "My Mix", track_set(&[("uri:a", "Alpha", "Ann")]));

    let watcher = PlaylistWatcher::new(service, store);
    watcher.check("p1").await.unwrap();

    // Tracks removed remotely; diff is empty but the snapshot must shrink
    watcher
        .service()
        .set_playlist("p1", "My Mix", TrackSet::new());
    let added = watcher.check("p1").await.unwrap();

    assert!(added.is_empty());
    assert!(watcher.store().load("p1").unwrap().is_empty());
}

#[tokio::test]
async fn missing_playlist_surfaces_not_found_and_leaves_store_alone() {
    let service = FakePlaylistService::new();
    let store = SqliteStore::open_in_memory().unwrap();
    let watcher = PlaylistWatcher::new(service, store);

    let err = watcher.check("nope").await.unwrap_err();
    assert!(matches!(err, Error::PlaylistNotFound(ref id) if id == "nope"));
    assert!(watcher.store().tracked_playlists().unwrap().is_empty());
}

#[tokio::test]
async fn track_all_snapshots_every_user_playlist() {
    let service = FakePlaylistService::new();
    let store = SqliteStore::open_in_memory().unwrap();
    service.set_playlist("p1", "Mix One", track_set(&[("uri:a", "Alpha", "Ann")]));
    service.set_playlist("p2", "Mix Two", track_set(&[("uri:b", "Beta", "Bob")]));

    let watcher = PlaylistWatcher::new(service, store);

    let count = watcher.track_all().await.unwrap();
    assert_eq!(count, 2);
    assert_eq!(
        watcher.store().tracked_playlists().unwrap(),
        vec!["p1".to_string(), "p2".to_string()]
    );
}

#[test]
fn load_of_unknown_playlist_is_empty_not_an_error() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert!(store.load("never-seen").unwrap().is_empty());
}

#[test]
fn save_replaces_wholesale_not_merge() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
        .save(
            "p1",
            &track_set(&[("uri:a", "Alpha", "Ann"), ("uri:b", "Beta", "Bob")]),
        )
        .unwrap();
    store
        .save("p1", &track_set(&[("uri:c", "Gamma", "Cal")]))
        .unwrap();

    let stored = store.load("p1").unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored.contains_key("uri:c"));
}

#[test]
fn prompt_flag_is_per_user_and_sticky() {
    let store = SqliteStore::open_in_memory().unwrap();

    assert!(!store.was_prompted("user1").unwrap());
    store.set_prompted("user1").unwrap();
    store.set_prompted("user1").unwrap(); // idempotent
    assert!(store.was_prompted("user1").unwrap());
    assert!(!store.was_prompted("user2").unwrap());
}
