//! Spotify `ProviderPort`. Grounded in the bearer-auth `api_request` /
//! token-refresh-on-401 pattern used by the catalog-sync Spotify worker,
//! retargeted at the Web API's playlist/track/search endpoints instead of
//! the artist-catalog endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::providers::{Mapper, ProviderPort};
use crate::services::credential_store::CredentialStore;
use crate::services::retry::{retry_provider_call, RetryConfig};

const API_BASE: &str = "https://api.spotify.com/v1";

pub struct SpotifyMapper;

impl Mapper for SpotifyMapper {
    fn map_track(&self, raw: &serde_json::Value) -> Result<Track> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null spotify track payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("spotify track missing id".into()))?;
        let title = raw["name"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("spotify track missing name".into()))?;

        let mut artists = raw["artists"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a["name"].as_str().map(str::to_string));
        let primary_artist = artists.next();
        let additional_artists: Vec<String> = artists.collect();

        let mut track = Track::new(id, "spotify");
        track.title = title.to_string();
        track.primary_artist = primary_artist;
        track.additional_artists = additional_artists;
        track.album_name = raw["album"]["name"].as_str().map(str::to_string);
        track.duration_seconds = raw["duration_ms"].as_u64().map(|ms| (ms / 1000) as u32);
        track.track_number = raw["track_number"].as_u64().map(|n| n as u32);
        track.release_year = raw["album"]["release_date"]
            .as_str()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse().ok());
        track.isrc = raw["external_ids"]["isrc"].as_str().map(str::to_string);
        track.service_data = raw.clone();
        Ok(track)
    }

    fn map_playlist(&self, raw: &serde_json::Value) -> Result<Playlist> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null spotify playlist payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("spotify playlist missing id".into()))?;
        let name = raw["name"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("spotify playlist missing name".into()))?;
        Ok(Playlist {
            service_id: id.to_string(),
            service_name: "spotify".to_string(),
            name: name.to_string(),
            description: raw["description"].as_str().map(str::to_string),
            tracks: Vec::new(),
        })
    }
}

pub struct SpotifyProvider {
    client: Client,
    mapper: SpotifyMapper,
    user_id: String,
    credentials: Arc<dyn CredentialStore>,
    access_token: RwLock<Option<String>>,
}

impl SpotifyProvider {
    pub fn new(user_id: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: Client::new(),
            mapper: SpotifyMapper,
            user_id: user_id.into(),
            credentials,
            access_token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String> {
        if let Some(t) = self.access_token.read().await.clone() {
            return Ok(t);
        }
        let token = self.credentials.get_access_token(&self.user_id, "spotify").await?;
        *self.access_token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn refresh_token(&self) -> Result<String> {
        *self.access_token.write().await = None;
        match self.credentials.get_access_token(&self.user_id, "spotify").await {
            Ok(token) => {
                *self.access_token.write().await = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                let _ = self.credentials.invalidate(&self.user_id, "spotify").await;
                Err(e)
            }
        }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        crate::metrics::provider_call("spotify", "request");
        let token = self.token().await?;
        let url = format!("{}{}", API_BASE, path);
        let response = retry_provider_call(
            || {
                let mut req = self.client.request(method.clone(), &url).bearer_auth(&token);
                if let Some(b) = body {
                    req = req.json(b);
                }
                async move { Ok(req.send().await?) }
            },
            &RetryConfig::default(),
            "spotify_request",
        )
        .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            let mut req = self.client.request(method, &url).bearer_auth(&token);
            if let Some(b) = body {
                req = req.json(b);
            }
            return self.finish(req.send().await?).await;
        }
        self.finish(response).await
    }

    async fn finish<T: for<'de> Deserialize<'de>>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            crate::metrics::provider_error("spotify", "not_found");
            return Err(CoreError::TrackNotFound("spotify 404".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            crate::metrics::provider_error("spotify", "http_error");
            return Err(CoreError::ProviderError {
                provider: "spotify".to_string(),
                message: format!("{}: {}", status, body),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProviderPort for SpotifyProvider {
    fn service_name(&self) -> &str {
        "spotify"
    }

    fn supports_direct_isrc_querying(&self) -> bool {
        false
    }

    fn supports_musicbrainz_id_querying(&self) -> bool {
        false
    }

    async fn get_user_playlists(&self, limit: usize) -> Result<Vec<Playlist>> {
        let capped = if limit == 0 { 50 } else { limit.min(50) };
        let body: serde_json::Value = self
            .request(reqwest::Method::GET, &format!("/me/playlists?limit={}", capped), None)
            .await?;
        body["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|p| self.mapper.map_playlist(p))
            .collect()
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let body: serde_json::Value = self
            .request(reqwest::Method::GET, &format!("/playlists/{}", id), None)
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                other => other,
            })?;
        self.mapper.map_playlist(&body)
    }

    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut offset = 0usize;
        let page_size = 100usize;
        loop {
            let body: serde_json::Value = self
                .request(
                    reqwest::Method::GET,
                    &format!("/playlists/{}/tracks?limit={}&offset={}", id, page_size, offset),
                    None,
                )
                .await
                .map_err(|e| match e {
                    CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                    other => other,
                })?;
            let items = body["items"].as_array().cloned().unwrap_or_default();
            if items.is_empty() {
                break;
            }
            for item in &items {
                tracks.push(self.mapper.map_track(&item["track"])?);
                if limit != 0 && tracks.len() >= limit {
                    return Ok(tracks);
                }
            }
            offset += items.len();
            if items.len() < page_size {
                break;
            }
        }
        Ok(tracks)
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let body: serde_json::Value = self
            .request(
                reqwest::Method::POST,
                "/me/playlists",
                Some(&serde_json::json!({ "name": name, "public": false })),
            )
            .await?;
        self.mapper.map_playlist(&body)
    }

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let uris: Vec<String> = track_ids.iter().map(|id| format!("spotify:track:{}", id)).collect();
        let _: serde_json::Value = self
            .request(
                reqwest::Method::POST,
                &format!("/playlists/{}/tracks", playlist_id),
                Some(&serde_json::json!({ "uris": uris })),
            )
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(playlist_id.to_string()),
                other => other,
            })?;
        Ok(())
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        let body: serde_json::Value = self.request(reqwest::Method::GET, &format!("/tracks/{}", id), None).await?;
        self.mapper.map_track(&body)
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let encoded = urlencoding::encode(query);
        let capped = if limit == 0 { 20 } else { limit.min(50) };
        let body: serde_json::Value = self
            .request(
                reqwest::Method::GET,
                &format!("/search?q={}&type=track&limit={}", encoded, capped),
                None,
            )
            .await?;
        body["tracks"]["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|t| self.mapper.map_track(t))
            .collect()
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
        Err(CoreError::UnsupportedFeature(format!(
            "spotify does not support direct isrc lookup ({})",
            isrc
        )))
    }

    async fn get_saved_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        let capped = if limit == 0 { 50 } else { limit.min(50) };
        let body: serde_json::Value = self
            .request(reqwest::Method::GET, &format!("/me/tracks?limit={}", capped), None)
            .await?;
        body["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|item| self.mapper.map_track(&item["track"]))
            .collect()
    }

    async fn get_random_track(&self) -> Result<Option<Track>> {
        Err(CoreError::UnsupportedFeature("spotify has no random-track endpoint".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_track_with_isrc_and_album() {
        let mapper = SpotifyMapper;
        let raw = serde_json::json!({
            "id": "abc123",
            "name": "Song Title",
            "duration_ms": 210000,
            "track_number": 3,
            "artists": [{"name": "Primary"}, {"name": "Feature"}],
            "album": {"name": "Album Name", "release_date": "2015-06-01"},
            "external_ids": {"isrc": "USRC17607839"}
        });
        let track = mapper.map_track(&raw).unwrap();
        assert_eq!(track.title, "Song Title");
        assert_eq!(track.primary_artist.as_deref(), Some("Primary"));
        assert_eq!(track.additional_artists, vec!["Feature".to_string()]);
        assert_eq!(track.duration_seconds, Some(210));
        assert_eq!(track.release_year, Some(2015));
        assert_eq!(track.isrc.as_deref(), Some("USRC17607839"));
    }

    #[test]
    fn rejects_null_payload() {
        let mapper = SpotifyMapper;
        assert!(mapper.map_track(&serde_json::Value::Null).is_err());
        assert!(mapper.map_playlist(&serde_json::Value::Null).is_err());
    }
}
