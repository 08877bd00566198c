use crate::Error;
use crate::SPOTIFY_ACCOUNTS_BASE_URL;
use crate::SPOTIFY_API_BASE_URL;
use crate::SpotifyApiError;
use crate::track::{Track, TrackSet};
use arc_swap::ArcSwapOption;
use async_recursion::async_recursion;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Abstract contract over the external playlist service.
///
/// The watcher and the orchestrator only ever talk to this trait, so tests
/// can substitute an in-memory double and the concrete [`SpotifyClient`]
/// stays swappable.
#[async_trait]
pub trait PlaylistService: Send + Sync {
    /// Resolve the display name of a playlist.
    async fn playlist_name(&self, playlist_id: &str) -> Result<String, Error>;

    /// Fetch the full track population of a playlist, pagination flattened.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<TrackSet, Error>;

    /// Create a private playlist holding the given track URIs and return
    /// its shareable external URL.
    async fn create_private_playlist(
        &self,
        name: &str,
        track_uris: &[String],
    ) -> Result<String, Error>;

    /// Unfollow (effectively delete, for owned playlists) a playlist.
    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), Error>;

    /// The authenticated user's id.
    async fn current_user_id(&self) -> Result<String, Error>;

    /// All playlists the user owns or collaborates on.
    async fn user_playlists(&self) -> Result<Vec<PlaylistRef>, Error>;
}

/// A lightweight reference to a playlist from a listing endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaylistRef {
    /// Playlist id
    pub id: String,
    /// Playlist display name
    pub name: String,
    /// Id of the owning user
    pub owner_id: String,
}

/// Authorization tokens for Spotify Web API access.
///
/// Serializable so callers can persist it between runs and avoid repeating
/// the OAuth dance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Authz {
    /// Access token for API authentication
    pub access_token: String,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,
}

impl Authz {
    pub fn new(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
        }
    }
}

/// Callback invoked whenever the client refreshes its access token.
///
/// Use this to persist updated tokens to storage.
pub type AuthzCallback = Arc<dyn Fn(Authz) + Send + Sync>;

/// Response from the accounts service token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Outer error envelope returned by the Spotify Web API.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: SpotifyApiError,
}

/// A page of results from a paginated Spotify endpoint.
#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    /// Local or unavailable tracks come back as null; skip them.
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    uri: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: String,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SimplePlaylist {
    id: String,
    name: String,
    owner: PlaylistOwner,
    #[serde(default)]
    collaborative: bool,
}

#[derive(Debug, Deserialize)]
struct PlaylistOwner {
    id: String,
}

/// Client for the Spotify Web API.
///
/// Handles bearer authentication, automatic token refresh, and provides
/// the [`PlaylistService`] operations the watcher needs.
///
/// # Example
///
/// ```no_run
/// use playlistwatch::{Authz, SpotifyClient};
///
/// let authz = Authz::new("access".to_string(), "refresh".to_string());
/// let client = SpotifyClient::new("client_id".to_string(), "client_secret".to_string())
///     .with_authz(authz);
/// ```
///
/// # Thread Safety
///
/// All methods are async and the client uses internal synchronization for
/// token management, so it can be shared across tasks.
pub struct SpotifyClient {
    pub client: reqwest::Client,
    client_id: String,
    client_secret: String,
    api_base_url: String,
    accounts_base_url: String,
    authz: ArcSwapOption<Authz>,
    authz_update_semaphore: Semaphore,
    on_authz_refresh_callback: Option<AuthzCallback>,
}

impl SpotifyClient {
    /// Create a new client with the given application credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            api_base_url: SPOTIFY_API_BASE_URL.to_string(),
            accounts_base_url: SPOTIFY_ACCOUNTS_BASE_URL.to_string(),
            authz: ArcSwapOption::from(None),
            authz_update_semaphore: Semaphore::new(1),
            on_authz_refresh_callback: None,
        }
    }

    /// Point the client at a different Web API host using the builder
    /// pattern. Intended for tests that run against a local stand-in.
    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into();
        self
    }

    /// Point the client at a different accounts (token) host using the
    /// builder pattern. Intended for tests that run against a local
    /// stand-in.
    pub fn with_accounts_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.accounts_base_url = base_url.into();
        self
    }

    /// Set a custom HTTP client using the builder pattern.
    ///
    /// Useful for configuring timeouts or proxies.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set existing authentication tokens using the builder pattern.
    ///
    /// The client uses these for API requests and refreshes them when they
    /// expire.
    pub fn with_authz(mut self, authz: Authz) -> Self {
        self.authz = ArcSwapOption::from_pointee(authz);
        self
    }

    /// Set a callback invoked on every automatic token refresh, using the
    /// builder pattern. Use this to persist rotated tokens.
    pub fn with_authz_refresh_callback<F>(mut self, authz_refresh_callback: F) -> Self
    where
        F: Fn(Authz) + Send + Sync + 'static,
    {
        self.on_authz_refresh_callback = Some(Arc::new(authz_refresh_callback));
        self
    }

    /// Get the current authorization tokens.
    ///
    /// Returns `None` if the client is not authenticated. Useful for
    /// persisting tokens when shutting down.
    pub fn get_authz(&self) -> Option<Arc<Authz>> {
        self.authz.load_full()
    }

    #[async_recursion]
    async fn refresh_authz(&self) -> Result<(), Error> {
        // Try to become the single refresher
        let permit: Option<SemaphorePermit> = match self.authz_update_semaphore.try_acquire() {
            Ok(p) => Some(p),
            Err(_) => None,
        };

        match permit {
            // We're the single refresher, fetch the new token and update the client
            Some(permit) => {
                let url = format!("{}/token", self.accounts_base_url);

                let authz = self.get_authz().ok_or(Error::NoAuthz)?;

                // The accounts service wants Basic auth over the app
                // credentials, not the bearer token
                let basic = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", self.client_id, self.client_secret));

                let params = [
                    ("grant_type", "refresh_token"),
                    ("refresh_token", authz.refresh_token.as_str()),
                ];

                let resp = self
                    .client
                    .post(&url)
                    .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
                    .form(&params)
                    .send()
                    .await?;

                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let message = resp.text().await.unwrap_or_default();
                    return Err(Error::SpotifyApiError(SpotifyApiError { status, message }));
                }

                let token: TokenResponse = resp.json().await?;

                let new_authz = Authz {
                    access_token: token.access_token,
                    // Spotify only rotates the refresh token occasionally
                    refresh_token: token
                        .refresh_token
                        .unwrap_or_else(|| authz.refresh_token.clone()),
                };

                // Single, quick swap visible to all readers
                self.authz.store(Some(Arc::new(new_authz.clone())));

                drop(permit);

                // invoke callback if set
                if let Some(cb) = &self.on_authz_refresh_callback {
                    cb(new_authz);
                }

                Ok(())
            }
            None => {
                // Someone else is refreshing; await completion cooperatively
                let _ = self.authz_update_semaphore.acquire().await;
                Ok(())
            }
        }
    }

    // Do a GET, POST or DELETE request against the Web API.
    pub(crate) async fn do_request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        params: Option<serde_json::Value>,
    ) -> Result<T, Error> {
        self.do_request_inner(method, url, params, false).await
    }

    #[async_recursion]
    async fn do_request_inner<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        params: Option<serde_json::Value>,
        retried: bool,
    ) -> Result<T, Error> {
        let mut req = match method {
            Method::GET => self.client.get(url),
            Method::DELETE => self.client.delete(url),
            Method::POST => self.client.post(url),
            _ => panic!("Invalid method: {}", method),
        };

        let authz = self.get_authz().ok_or(Error::NoAccessTokenAvailable)?;
        req = req.header(
            reqwest::header::AUTHORIZATION,
            &format!("Bearer {}", authz.access_token),
        );

        if let Some(params) = params.as_ref() {
            match method {
                // The Web API takes JSON bodies on writes and query
                // parameters on reads
                Method::POST => req = req.json(params),
                Method::GET => req = req.query(params),
                Method::DELETE => req = req.json(params),
                _ => panic!("Invalid method for params: {}", method),
            }
        }

        let resp = req.send().await?;
        let status_code = resp.status().as_u16();

        if resp.status().is_success() {
            let body = resp.bytes().await?;

            // Some write endpoints answer with an empty body
            let value: serde_json::Value = if body.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&body)?
            };

            if log::log_enabled!(log::Level::Trace) {
                let pretty_value = serde_json::to_string_pretty(&value).unwrap();
                log::trace!("Requested URL: {}", url);
                log::trace!("Response {}", pretty_value);
            }

            let resp: T = match serde_json::from_value(value) {
                Ok(t) => t,
                Err(e) => {
                    if log::log_enabled!(log::Level::Debug) {
                        log::debug!("Requested URL: {}", url);
                        log::debug!("JSON deserialization error: {}", e);
                    }
                    return Err(Error::SerdeJson(e));
                }
            };

            Ok(resp)
        } else {
            // A first 401 usually means the access token expired; refresh
            // and retry once. A 401 on the retried request means the new
            // token is no better (wrong app or account), so surface it
            // rather than cycling refreshes forever.
            if status_code == 401 && !retried {
                self.refresh_authz().await?;
                return self.do_request_inner(method, url, params, true).await;
            }

            let err = match resp.json::<ApiErrorEnvelope>().await {
                Ok(envelope) => envelope.error,
                Err(_) => SpotifyApiError {
                    status: status_code,
                    message: String::new(),
                },
            };

            if log::log_enabled!(log::Level::Debug) {
                log::debug!("Requested URL: {}", url);
                log::debug!("Spotify API Error: {}", err);
            }

            Err(Error::SpotifyApiError(err))
        }
    }

    fn map_not_found(err: Error, playlist_id: &str) -> Error {
        match err {
            Error::SpotifyApiError(api) if api.status == 404 || api.status == 400 => {
                Error::PlaylistNotFound(playlist_id.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl PlaylistService for SpotifyClient {
    /// Get the display name of a playlist by id.
    ///
    /// An unknown or malformed id surfaces as [`Error::PlaylistNotFound`].
    async fn playlist_name(&self, playlist_id: &str) -> Result<String, Error> {
        let url = format!("{}/playlists/{playlist_id}", self.api_base_url);
        let params = serde_json::json!({ "fields": "name" });

        let resp: PlaylistMeta = self
            .do_request(Method::GET, &url, Some(params))
            .await
            .map_err(|e| Self::map_not_found(e, playlist_id))?;

        Ok(resp.name)
    }

    /// Fetch every track in a playlist.
    ///
    /// Pages through the tracks endpoint 100 items at a time and flattens
    /// the result into a [`TrackSet`]. Local or unavailable tracks (which
    /// the API reports as null) are skipped.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<TrackSet, Error> {
        let url = format!("{}/playlists/{playlist_id}/tracks", self.api_base_url);
        let mut tracks = TrackSet::new();
        let mut offset: usize = 0;

        loop {
            let params = serde_json::json!({
                "offset": offset,
                "limit": 100,
                "fields": "items(track(uri,name,artists(name))),next",
            });

            let page: Paging<PlaylistItem> = self
                .do_request(Method::GET, &url, Some(params))
                .await
                .map_err(|e| Self::map_not_found(e, playlist_id))?;

            offset += page.items.len();

            for item in page.items {
                let Some(track) = item.track else {
                    continue;
                };

                let artists = track
                    .artists
                    .iter()
                    .map(|artist| artist.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");

                tracks.insert(
                    track.uri.clone(),
                    Track {
                        uri: track.uri,
                        name: track.name,
                        artists,
                    },
                );
            }

            if page.next.is_none() {
                break;
            }
        }

        Ok(tracks)
    }

    /// Create a private playlist with the given tracks and return its
    /// shareable URL.
    async fn create_private_playlist(
        &self,
        name: &str,
        track_uris: &[String],
    ) -> Result<String, Error> {
        let user_id = self.current_user_id().await?;

        let url = format!("{}/users/{user_id}/playlists", self.api_base_url);
        let params = serde_json::json!({
            "name": name,
            "public": false,
        });

        let created: CreatedPlaylist = self.do_request(Method::POST, &url, Some(params)).await?;

        if !track_uris.is_empty() {
            let url = format!("{}/playlists/{}/tracks", self.api_base_url, created.id);
            let params = serde_json::json!({ "uris": track_uris });
            let _: serde_json::Value = self.do_request(Method::POST, &url, Some(params)).await?;
        }

        let link = created.external_urls.spotify.unwrap_or_else(|| {
            format!("https://open.spotify.com/playlist/{}", created.id)
        });

        Ok(link)
    }

    /// Unfollow a playlist. For playlists the user owns this is Spotify's
    /// notion of deletion.
    async fn unfollow_playlist(&self, playlist_id: &str) -> Result<(), Error> {
        let url = format!("{}/playlists/{playlist_id}/followers", self.api_base_url);

        let _: serde_json::Value = self
            .do_request(Method::DELETE, &url, None)
            .await
            .map_err(|e| Self::map_not_found(e, playlist_id))?;

        Ok(())
    }

    /// Get the authenticated user's id.
    async fn current_user_id(&self) -> Result<String, Error> {
        let url = format!("{}/me", self.api_base_url);
        let user: CurrentUser = self.do_request(Method::GET, &url, None).await?;
        Ok(user.id)
    }

    /// List the playlists the user owns or collaborates on.
    ///
    /// Pages through the listing endpoint and filters out followed
    /// playlists belonging to other users.
    async fn user_playlists(&self) -> Result<Vec<PlaylistRef>, Error> {
        let user_id = self.current_user_id().await?;

        let url = format!("{}/me/playlists", self.api_base_url);
        let mut refs = Vec::new();
        let mut offset: usize = 0;

        loop {
            let params = serde_json::json!({ "offset": offset, "limit": 50 });

            let page: Paging<SimplePlaylist> =
                self.do_request(Method::GET, &url, Some(params)).await?;

            offset += page.items.len();

            for playlist in page.items {
                if playlist.owner.id == user_id || playlist.collaborative {
                    refs.push(PlaylistRef {
                        id: playlist.id,
                        name: playlist.name,
                        owner_id: playlist.owner.id,
                    });
                }
            }

            if page.next.is_none() {
                break;
            }
        }

        Ok(refs)
    }
}
