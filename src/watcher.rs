use crate::Error;
use crate::snapshot::SnapshotStore;
use crate::spotify::PlaylistService;
use crate::track::{TrackSet, new_tracks};

/// Tracks playlist changes between checks.
///
/// Combines a [`PlaylistService`] (where the playlist lives) with a
/// [`SnapshotStore`] (what it looked like last time). Both are explicit
/// constructor arguments so tests can substitute doubles for either side.
pub struct PlaylistWatcher<P: PlaylistService, S: SnapshotStore> {
    service: P,
    store: S,
}

impl<P: PlaylistService, S: SnapshotStore> PlaylistWatcher<P, S> {
    pub fn new(service: P, store: S) -> Self {
        Self { service, store }
    }

    /// Borrow the underlying playlist service.
    pub fn service(&self) -> &P {
        &self.service
    }

    /// Borrow the underlying snapshot store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check a playlist for additions since the last check.
    ///
    /// Fetches the current track set, diffs it against the stored
    /// snapshot, and returns the tracks that are new. The stored snapshot
    /// advances to the current set on every call, whether or not anything
    /// changed and regardless of what the caller does with the result — a
    /// later bot failure never rolls it back.
    ///
    /// The first check of a never-seen playlist returns an empty set.
    pub async fn check(&self, playlist_id: &str) -> Result<TrackSet, Error> {
        let current = self.service.playlist_tracks(playlist_id).await?;
        let previous = self.store.load(playlist_id)?;

        self.store.save(playlist_id, &current)?;

        let added = new_tracks(&current, &previous);
        log::debug!(
            "Checked playlist {}: {} tracks, {} new",
            playlist_id,
            current.len(),
            added.len()
        );

        Ok(added)
    }

    /// Snapshot every playlist the user owns or collaborates on, so later
    /// checks report additions against today's state.
    ///
    /// Returns the number of playlists snapshotted.
    pub async fn track_all(&self) -> Result<usize, Error> {
        let playlists = self.service.user_playlists().await?;
        let count = playlists.len();

        for playlist in playlists {
            let tracks = self.service.playlist_tracks(&playlist.id).await?;
            self.store.save(&playlist.id, &tracks)?;
            log::info!("Now tracking '{}' ({} tracks)", playlist.name, tracks.len());
        }

        Ok(count)
    }
}
