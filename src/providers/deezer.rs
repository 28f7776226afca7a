//! Deezer `ProviderPort`. Deezer's public REST API is unauthenticated for
//! catalog reads (search, track lookup) but account-scoped endpoints
//! (playlists) are gated behind the `arl` session cookie, mirrored here as
//! a query-string credential rather than a bearer header. Request shape
//! grounded in the catalog-sync Deezer worker's plain `api_request` helper.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::providers::{Mapper, ProviderPort};
use crate::services::credential_store::CredentialStore;

const API_BASE: &str = "https://api.deezer.com";

pub struct DeezerMapper;

impl Mapper for DeezerMapper {
    fn map_track(&self, raw: &serde_json::Value) -> Result<Track> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null deezer track payload".into()));
        }
        let id = raw["id"]
            .as_u64()
            .ok_or_else(|| CoreError::InvalidArgument("deezer track missing id".into()))?;
        let title = raw["title"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("deezer track missing title".into()))?;

        let mut track = Track::new(id.to_string(), "deezer");
        track.title = title.to_string();
        track.primary_artist = raw["artist"]["name"].as_str().map(str::to_string);
        track.album_name = raw["album"]["title"].as_str().map(str::to_string);
        track.duration_seconds = raw["duration"].as_u64().map(|s| s as u32);
        track.track_number = raw["track_position"].as_u64().map(|n| n as u32);
        track.release_year = raw["release_date"]
            .as_str()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse().ok());
        track.isrc = raw["isrc"].as_str().map(str::to_string);
        track.service_data = raw.clone();
        Ok(track)
    }

    fn map_playlist(&self, raw: &serde_json::Value) -> Result<Playlist> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null deezer playlist payload".into()));
        }
        let id = raw["id"]
            .as_u64()
            .ok_or_else(|| CoreError::InvalidArgument("deezer playlist missing id".into()))?;
        let title = raw["title"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("deezer playlist missing title".into()))?;
        Ok(Playlist {
            service_id: id.to_string(),
            service_name: "deezer".to_string(),
            name: title.to_string(),
            description: raw["description"].as_str().map(str::to_string),
            tracks: Vec::new(),
        })
    }
}

pub struct DeezerProvider {
    client: Client,
    mapper: DeezerMapper,
    user_id: String,
    credentials: Arc<dyn CredentialStore>,
}

impl DeezerProvider {
    pub fn new(user_id: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: Client::new(),
            mapper: DeezerMapper,
            user_id: user_id.into(),
            credentials,
        }
    }

    async fn arl(&self) -> Result<String> {
        self.credentials.get_access_token(&self.user_id, "deezer").await
    }

    async fn request(&self, path: &str, needs_auth: bool) -> Result<serde_json::Value> {
        crate::metrics::provider_call("deezer", "request");
        let mut url = format!("{}{}", API_BASE, path);
        if needs_auth {
            let arl = self.arl().await?;
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{}{}arl={}", url, sep, arl);
        }
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            crate::metrics::provider_error("deezer", "http_error");
            return Err(CoreError::ProviderError {
                provider: "deezer".to_string(),
                message: response.status().to_string(),
            });
        }
        let body: serde_json::Value = response.json().await?;
        if let Some(code) = body["error"]["code"].as_i64() {
            // Deezer answers an invalid/missing id with HTTP 200 and a
            // `DataException` error body rather than a 404; treat that case
            // as a not-found, everything else as a generic provider error.
            if body["error"]["type"].as_str() == Some("DataException") {
                crate::metrics::provider_error("deezer", "not_found");
                return Err(CoreError::TrackNotFound(format!("deezer error {}: {}", code, body["error"]["message"])));
            }
            crate::metrics::provider_error("deezer", "api_error");
            return Err(CoreError::ProviderError {
                provider: "deezer".to_string(),
                message: format!("deezer error {}: {}", code, body["error"]["message"]),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ProviderPort for DeezerProvider {
    fn service_name(&self) -> &str {
        "deezer"
    }

    fn supports_direct_isrc_querying(&self) -> bool {
        true
    }

    fn supports_musicbrainz_id_querying(&self) -> bool {
        false
    }

    async fn get_user_playlists(&self, limit: usize) -> Result<Vec<Playlist>> {
        let body = self.request("/user/me/playlists", true).await?;
        let mut items = body["data"].as_array().cloned().unwrap_or_default();
        if limit != 0 {
            items.truncate(limit);
        }
        items.iter().map(|p| self.mapper.map_playlist(p)).collect()
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let body = self
            .request(&format!("/playlist/{}", id), false)
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                other => other,
            })?;
        self.mapper.map_playlist(&body)
    }

    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut index = 0usize;
        loop {
            let body = self
                .request(&format!("/playlist/{}/tracks?index={}&limit=100", id, index), false)
                .await
                .map_err(|e| match e {
                    CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                    other => other,
                })?;
            let items = body["data"].as_array().cloned().unwrap_or_default();
            if items.is_empty() {
                break;
            }
            for raw in &items {
                tracks.push(self.mapper.map_track(raw)?);
                if limit != 0 && tracks.len() >= limit {
                    return Ok(tracks);
                }
            }
            index += items.len();
            if body["next"].is_null() {
                break;
            }
        }
        Ok(tracks)
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let body = self
            .request(&format!("/user/me/playlists?title={}", urlencoding::encode(name)), true)
            .await?;
        let id = body["id"]
            .as_u64()
            .ok_or_else(|| CoreError::ProviderError {
                provider: "deezer".to_string(),
                message: "playlist creation did not return an id".to_string(),
            })?;
        self.get_playlist(&id.to_string()).await
    }

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let songs = track_ids.join(",");
        self.request(
            &format!("/playlist/{}/tracks?songs={}", playlist_id, songs),
            true,
        )
        .await
        .map_err(|e| match e {
            CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(playlist_id.to_string()),
            other => other,
        })?;
        Ok(())
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        let body = self.request(&format!("/track/{}", id), false).await?;
        self.mapper.map_track(&body)
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let encoded = urlencoding::encode(query);
        let capped = if limit == 0 { 20 } else { limit };
        let body = self
            .request(&format!("/search?q={}&limit={}", encoded, capped), false)
            .await?;
        body["data"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|t| self.mapper.map_track(t))
            .collect()
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
        let body = self.request(&format!("/track/isrc:{}", isrc), false).await?;
        self.mapper.map_track(&body)
    }

    async fn get_saved_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        let body = self.request("/user/me/tracks", true).await?;
        let mut items = body["data"].as_array().cloned().unwrap_or_default();
        if limit != 0 {
            items.truncate(limit);
        }
        items.iter().map(|t| self.mapper.map_track(t)).collect()
    }

    async fn get_random_track(&self) -> Result<Option<Track>> {
        Err(CoreError::UnsupportedFeature("deezer has no random-track endpoint".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_track_with_isrc() {
        let mapper = DeezerMapper;
        let raw = serde_json::json!({
            "id": 3135556, "title": "Song", "isrc": "FR6V81912347",
            "artist": {"name": "Artist"}, "album": {"title": "Album"},
            "duration": 180, "track_position": 2, "release_date": "2012-05-01"
        });
        let track = mapper.map_track(&raw).unwrap();
        assert_eq!(track.service_id, "3135556");
        assert_eq!(track.isrc.as_deref(), Some("FR6V81912347"));
        assert_eq!(track.release_year, Some(2012));
    }
}
