//! YouTube Music `ProviderPort`, backed by the YouTube Data API v3 (the
//! closest public REST surface; YouTube Music itself has no public API).
//! Playlists map to `playlists`/`playlistItems`, tracks to `videos`.
//! Grounded in the same bearer-auth request pattern as the Spotify driver.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::providers::{Mapper, ProviderPort};
use crate::services::credential_store::CredentialStore;

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

pub struct YoutubeMusicMapper;

impl Mapper for YoutubeMusicMapper {
    fn map_track(&self, raw: &serde_json::Value) -> Result<Track> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null youtube video payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("youtube video missing id".into()))?;
        let snippet = &raw["snippet"];
        let title = snippet["title"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("youtube video missing title".into()))?;

        let mut track = Track::new(id, "youtube_music");
        track.title = title.to_string();
        track.primary_artist = snippet["channelTitle"].as_str().map(str::to_string);
        track.release_year = snippet["publishedAt"]
            .as_str()
            .and_then(|d| d.get(0..4))
            .and_then(|y| y.parse().ok());
        track.duration_seconds = raw["contentDetails"]["duration"]
            .as_str()
            .and_then(parse_iso8601_duration_secs);
        track.service_data = raw.clone();
        Ok(track)
    }

    fn map_playlist(&self, raw: &serde_json::Value) -> Result<Playlist> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null youtube playlist payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("youtube playlist missing id".into()))?;
        let snippet = &raw["snippet"];
        let name = snippet["title"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("youtube playlist missing title".into()))?;
        Ok(Playlist {
            service_id: id.to_string(),
            service_name: "youtube_music".to_string(),
            name: name.to_string(),
            description: snippet["description"].as_str().map(str::to_string),
            tracks: Vec::new(),
        })
    }
}

/// Parses a minimal `PT#H#M#S` ISO-8601 duration into whole seconds.
fn parse_iso8601_duration_secs(s: &str) -> Option<u32> {
    let rest = s.strip_prefix("PT")?;
    let mut total = 0u32;
    let mut num = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' => num.push(c),
            'H' => {
                total += num.parse::<u32>().ok()? * 3600;
                num.clear();
            }
            'M' => {
                total += num.parse::<u32>().ok()? * 60;
                num.clear();
            }
            'S' => {
                total += num.parse::<u32>().ok()?;
                num.clear();
            }
            _ => return None,
        }
    }
    Some(total)
}

pub struct YoutubeMusicProvider {
    client: Client,
    mapper: YoutubeMusicMapper,
    user_id: String,
    credentials: Arc<dyn CredentialStore>,
    access_token: RwLock<Option<String>>,
}

impl YoutubeMusicProvider {
    pub fn new(user_id: impl Into<String>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: Client::new(),
            mapper: YoutubeMusicMapper,
            user_id: user_id.into(),
            credentials,
            access_token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String> {
        if let Some(t) = self.access_token.read().await.clone() {
            return Ok(t);
        }
        let token = self
            .credentials
            .get_access_token(&self.user_id, "youtube_music")
            .await?;
        *self.access_token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        crate::metrics::provider_call("youtube_music", "request");
        let token = self.token().await?;
        let url = format!("{}{}", API_BASE, path);
        let mut req = self.client.request(method, &url).bearer_auth(&token);
        if let Some(b) = body {
            req = req.json(b);
        }
        let response = req.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            crate::metrics::provider_error("youtube_music", "not_found");
            return Err(CoreError::TrackNotFound("youtube 404".into()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let _ = self.credentials.invalidate(&self.user_id, "youtube_music").await;
            crate::metrics::provider_error("youtube_music", "auth_error");
            return Err(CoreError::AuthError {
                provider: "youtube_music".to_string(),
                message: "access token rejected".to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            crate::metrics::provider_error("youtube_music", "http_error");
            return Err(CoreError::ProviderError {
                provider: "youtube_music".to_string(),
                message: format!("{}: {}", status, text),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProviderPort for YoutubeMusicProvider {
    fn service_name(&self) -> &str {
        "youtube_music"
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
            .request(
                reqwest::Method::GET,
                &format!("/playlists?part=snippet&mine=true&maxResults={}", capped),
                None,
            )
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
            .request(reqwest::Method::GET, &format!("/playlists?part=snippet&id={}", id), None)
            .await?;
        let item = body["items"]
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| CoreError::PlaylistNotFound(id.to_string()))?;
        self.mapper.map_playlist(item)
    }

    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page_param = page_token.as_deref().map(|t| format!("&pageToken={}", t)).unwrap_or_default();
            let body: serde_json::Value = self
                .request(
                    reqwest::Method::GET,
                    &format!(
                        "/playlistItems?part=snippet,contentDetails&playlistId={}&maxResults=50{}",
                        id, page_param
                    ),
                    None,
                )
                .await
                .map_err(|e| match e {
                    CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                    other => other,
                })?;
            for item in body["items"].as_array().cloned().unwrap_or_default() {
                let video_id = item["contentDetails"]["videoId"].as_str().unwrap_or_default().to_string();
                let mut track = self.mapper.map_track(&item)?;
                if !video_id.is_empty() {
                    track.service_id = video_id;
                }
                tracks.push(track);
                if limit != 0 && tracks.len() >= limit {
                    return Ok(tracks);
                }
            }
            page_token = body["nextPageToken"].as_str().map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(tracks)
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let body: serde_json::Value = self
            .request(
                reqwest::Method::POST,
                "/playlists?part=snippet,status",
                Some(&serde_json::json!({
                    "snippet": {"title": name},
                    "status": {"privacyStatus": "private"}
                })),
            )
            .await?;
        self.mapper.map_playlist(&body)
    }

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        for video_id in track_ids {
            let _: serde_json::Value = self
                .request(
                    reqwest::Method::POST,
                    "/playlistItems?part=snippet",
                    Some(&serde_json::json!({
                        "snippet": {
                            "playlistId": playlist_id,
                            "resourceId": {"kind": "youtube#video", "videoId": video_id}
                        }
                    })),
                )
                .await
                .map_err(|e| match e {
                    CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(playlist_id.to_string()),
                    other => other,
                })?;
        }
        Ok(())
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        let body: serde_json::Value = self
            .request(reqwest::Method::GET, &format!("/videos?part=snippet,contentDetails&id={}", id), None)
            .await?;
        let item = body["items"]
            .as_array()
            .and_then(|a| a.first())
            .ok_or_else(|| CoreError::TrackNotFound(id.to_string()))?;
        self.mapper.map_track(item)
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let encoded = urlencoding::encode(query);
        let capped = if limit == 0 { 20 } else { limit.min(50) };
        let body: serde_json::Value = self
            .request(
                reqwest::Method::GET,
                &format!("/search?part=snippet&type=video&videoCategoryId=10&q={}&maxResults={}", encoded, capped),
                None,
            )
            .await?;
        let ids: Vec<String> = body["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .filter_map(|i| i["id"]["videoId"].as_str().map(str::to_string))
            .collect();
        let mut tracks = Vec::new();
        for id in ids {
            if let Ok(t) = self.get_track(&id).await {
                tracks.push(t);
            }
        }
        Ok(tracks)
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
        Err(CoreError::UnsupportedFeature(format!(
            "youtube music does not support direct isrc lookup ({})",
            isrc
        )))
    }

    async fn get_saved_tracks(&self, _limit: usize) -> Result<Vec<Track>> {
        Err(CoreError::UnsupportedFeature("youtube music has no saved-tracks library endpoint".into()))
    }

    async fn get_random_track(&self) -> Result<Option<Track>> {
        Err(CoreError::UnsupportedFeature("youtube music has no random-track endpoint".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso8601_duration() {
        assert_eq!(parse_iso8601_duration_secs("PT3M45S"), Some(225));
        assert_eq!(parse_iso8601_duration_secs("PT1H2M3S"), Some(3723));
    }

    #[test]
    fn maps_video_track() {
        let mapper = YoutubeMusicMapper;
        let raw = serde_json::json!({
            "id": "vid123",
            "snippet": {"title": "Song Title", "channelTitle": "Artist VEVO", "publishedAt": "2018-01-01T00:00:00Z"},
            "contentDetails": {"duration": "PT3M30S"}
        });
        let track = mapper.map_track(&raw).unwrap();
        assert_eq!(track.title, "Song Title");
        assert_eq!(track.duration_seconds, Some(210));
        assert_eq!(track.release_year, Some(2018));
    }
}
