//! `CacheLayer` — wraps a `ProviderPort` with a two-tier read-through cache:
//! a hot, TTL-bound tier for playlists/searches, and a persistent tier for
//! track identity lookups. Negative results are never cached (§4.4) —
//! resist the urge to "fix" that, it is load-bearing for rate-limit
//! behavior. Backed by `deadpool-redis`, in the same pooled-connection style
//! as `TaskStore`.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::providers::ProviderPort;

const TTL_PLAYLIST_SECS: u64 = 5 * 60;
const TTL_SEARCH_SECS: u64 = 60 * 60;

pub struct CacheLayer<P: ProviderPort> {
    inner: P,
    pool: Pool,
}

impl<P: ProviderPort> CacheLayer<P> {
    pub fn new(inner: P, redis_url: &str) -> Result<Self> {
        let config = Config::from_url(redis_url);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CoreError::CacheError(e.to_string()))?;
        Ok(Self { inner, pool })
    }

    fn provider(&self) -> &str {
        self.inner.service_name()
    }

    /// Lowercase, collapse whitespace to `_`, strip anything non-word.
    fn normalize_query_key(query: &str) -> String {
        let collapsed: String = query
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        collapsed.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::CacheError(e.to_string()))?;
        Ok(conn.get(key).await?)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| CoreError::CacheError(e.to_string()))?;
        match ttl_secs {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

}

/// Cached operations follow §4.4's policy table; everything else passes
/// straight through to the wrapped driver.
#[async_trait]
impl<P: ProviderPort> ProviderPort for CacheLayer<P> {
    fn service_name(&self) -> &str {
        self.inner.service_name()
    }

    fn supports_direct_isrc_querying(&self) -> bool {
        self.inner.supports_direct_isrc_querying()
    }

    fn supports_musicbrainz_id_querying(&self) -> bool {
        self.inner.supports_musicbrainz_id_querying()
    }

    async fn get_user_playlists(&self, limit: usize) -> Result<Vec<Playlist>> {
        self.inner.get_user_playlists(limit).await
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let key = format!("provider_cache:{}:playlists:playlist_id#{}", self.provider(), id);
        if let Some(raw) = self.get_raw(&key).await? {
            crate::metrics::cache_request("playlist", true);
            let mut playlist: Playlist = serde_json::from_str(&raw)?;
            playlist.service_id = id.to_string();
            return Ok(playlist);
        }
        crate::metrics::cache_request("playlist", false);
        let playlist = self.inner.get_playlist(id).await?;
        self.set_raw(&key, &serde_json::to_string(&playlist)?, Some(TTL_PLAYLIST_SECS)).await?;
        Ok(playlist)
    }

    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>> {
        self.inner.get_playlist_tracks(id, limit).await
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        self.inner.create_playlist(name).await
    }

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        self.inner.add_tracks_to_playlist(playlist_id, track_ids).await
    }

    /// Reconstructs a `Track` whose `service_id` equals the cached
    /// provider-track id, so downstream callers see correct identity even on
    /// a cache hit.
    async fn get_track(&self, id: &str) -> Result<Track> {
        let key = format!("provider_cache:{}:tracks:id#{}", self.provider(), id);
        if let Some(raw) = self.get_raw(&key).await? {
            crate::metrics::cache_request("track", true);
            let mut track: Track = serde_json::from_str(&raw)?;
            track.service_id = id.to_string();
            return Ok(track);
        }
        crate::metrics::cache_request("track", false);
        let track = self.inner.get_track(id).await?;
        self.set_raw(&key, &serde_json::to_string(&track)?, None).await?;
        Ok(track)
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let key = format!(
            "provider_cache:{}:search_results:query#{}:limit#{}",
            self.provider(),
            Self::normalize_query_key(query),
            limit
        );
        if let Some(raw) = self.get_raw(&key).await? {
            crate::metrics::cache_request("search", true);
            return Ok(serde_json::from_str(&raw)?);
        }
        crate::metrics::cache_request("search", false);
        let tracks = self.inner.search_tracks(query, limit).await?;
        if !tracks.is_empty() {
            self.set_raw(&key, &serde_json::to_string(&tracks)?, Some(TTL_SEARCH_SECS)).await?;
        }
        Ok(tracks)
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
        let key = format!("provider_cache:{}:tracks:isrc#{}", self.provider(), isrc);
        if let Some(raw) = self.get_raw(&key).await? {
            crate::metrics::cache_request("isrc", true);
            return Ok(serde_json::from_str(&raw)?);
        }
        crate::metrics::cache_request("isrc", false);
        let track = self.inner.get_track_by_isrc(isrc).await?;
        self.set_raw(&key, &serde_json::to_string(&track)?, None).await?;
        Ok(track)
    }

    async fn get_saved_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        self.inner.get_saved_tracks(limit).await
    }

    async fn get_random_track(&self) -> Result<Option<Track>> {
        self.inner.get_random_track().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_query_key_collapses_and_strips() {
        assert_eq!(CacheLayer::<crate::providers::spotify::SpotifyProvider>::normalize_query_key("Hello, World!"), "hello_world");
        assert_eq!(
            CacheLayer::<crate::providers::spotify::SpotifyProvider>::normalize_query_key("  multi   space  "),
            "multi_space"
        );
    }
}
