//! `ProviderPort` — the uniform interface the `Matcher` and `TaskRuntime`
//! consume. One implementation per vendor; each wraps a vendor SDK/REST API
//! and translates its payloads into the `Track`/`Playlist` domain through a
//! `Mapper`.

pub mod deezer;
pub mod spotify;
pub mod subsonic;
pub mod youtube_music;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderCredentials;
use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::services::cache::CacheLayer;
use crate::services::credential_store::CredentialStore;

/// Translates vendor JSON payloads into the domain model. Implementations
/// must reject null/malformed payloads with `CoreError::InvalidArgument` and
/// must be total over the documented vendor schema.
pub trait Mapper: Send + Sync {
    fn map_track(&self, raw: &serde_json::Value) -> Result<Track>;
    fn map_playlist(&self, raw: &serde_json::Value) -> Result<Playlist>;
}

/// One vendor integration (Spotify, YouTube Music, any Subsonic-compatible
/// server, Deezer). Every operation is async and may fail with the error
/// kinds in `crate::error::CoreError`.
#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Discriminator used as `Track::service_name` / `Playlist::service_name`.
    fn service_name(&self) -> &str;

    /// Whether `get_track_by_isrc` is backed by a real vendor lookup.
    fn supports_direct_isrc_querying(&self) -> bool;

    /// Whether a MusicBrainz id is a usable search term for this provider.
    fn supports_musicbrainz_id_querying(&self) -> bool;

    /// `limit == 0` means "all reasonable".
    async fn get_user_playlists(&self, limit: usize) -> Result<Vec<Playlist>>;

    async fn get_playlist(&self, id: &str) -> Result<Playlist>;

    /// `limit == 0` means "all"; providers without native support for that
    /// must paginate internally until exhausted.
    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>>;

    async fn create_playlist(&self, name: &str) -> Result<Playlist>;

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()>;

    async fn get_track(&self, id: &str) -> Result<Track>;

    /// Ordered candidates, best-first per vendor ranking.
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track>;

    async fn get_saved_tracks(&self, limit: usize) -> Result<Vec<Track>>;

    async fn get_random_track(&self) -> Result<Option<Track>>;
}

/// Resolves a `service_name` + `user_id` pair into a live, cache-wrapped
/// `ProviderPort`. The sole place `PlaylistTransferHandler` touches
/// provider construction, mirroring the teacher's driver-factory pattern in
/// `services/catalog_sync/mod.rs`.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn build(&self, service_name: &str, user_id: &str) -> Result<Box<dyn ProviderPort>>;
}

/// Builds the four vendor families from `ProviderCredentials`, wrapping
/// each in a `CacheLayer`. Subsonic additionally needs a server URL and
/// username, which are not "credentials" in the OAuth2 sense and so live in
/// `ProviderCredentials` as plain config rather than behind the credential
/// store.
pub struct DefaultProviderFactory {
    credentials: Arc<dyn CredentialStore>,
    settings: ProviderCredentials,
    redis_url: String,
}

impl DefaultProviderFactory {
    pub fn new(credentials: Arc<dyn CredentialStore>, settings: ProviderCredentials, redis_url: impl Into<String>) -> Self {
        Self {
            credentials,
            settings,
            redis_url: redis_url.into(),
        }
    }
}

#[async_trait]
impl ProviderFactory for DefaultProviderFactory {
    async fn build(&self, service_name: &str, user_id: &str) -> Result<Box<dyn ProviderPort>> {
        match service_name {
            "spotify" => {
                let inner = spotify::SpotifyProvider::new(user_id, self.credentials.clone());
                Ok(Box::new(CacheLayer::new(inner, &self.redis_url)?))
            }
            "youtube_music" => {
                let inner = youtube_music::YoutubeMusicProvider::new(user_id, self.credentials.clone());
                Ok(Box::new(CacheLayer::new(inner, &self.redis_url)?))
            }
            "deezer" => {
                let inner = deezer::DeezerProvider::new(user_id, self.credentials.clone());
                Ok(Box::new(CacheLayer::new(inner, &self.redis_url)?))
            }
            "subsonic" => {
                let subsonic = self
                    .settings
                    .subsonic
                    .as_ref()
                    .ok_or_else(|| CoreError::UnsupportedFeature("subsonic is not configured".into()))?;
                let inner = subsonic::SubsonicProvider::new(
                    subsonic.server_url.clone(),
                    subsonic.username.clone(),
                    user_id,
                    self.credentials.clone(),
                );
                Ok(Box::new(CacheLayer::new(inner, &self.redis_url)?))
            }
            other => Err(CoreError::UnsupportedFeature(format!("unknown provider: {}", other))),
        }
    }
}
