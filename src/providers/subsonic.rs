//! Subsonic-family `ProviderPort` (Navidrome, Airsonic, Gonic, ...). Grounded
//! in the token-auth construction (`t = md5(password + salt)`, random hex
//! salt) and `/rest/{endpoint}?params` URL shape used by comparable Subsonic
//! client drivers; simplified to the single token-auth mode this spec
//! requires (no legacy plaintext-password fallback).

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;

use crate::error::{CoreError, Result};
use crate::models::{Playlist, Track};
use crate::providers::{Mapper, ProviderPort};
use crate::services::credential_store::CredentialStore;

const CLIENT_ID: &str = "playlist-transfer-core";
const API_VERSION: &str = "1.8.0";

pub struct SubsonicMapper;

impl Mapper for SubsonicMapper {
    fn map_track(&self, raw: &serde_json::Value) -> Result<Track> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null subsonic song payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("subsonic song missing id".into()))?;
        let title = raw["title"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("subsonic song missing title".into()))?;

        let mut track = Track::new(id, "subsonic");
        track.title = title.to_string();
        track.primary_artist = raw["artist"].as_str().map(str::to_string);
        track.album_name = raw["album"].as_str().map(str::to_string);
        track.duration_seconds = raw["duration"].as_u64().map(|s| s as u32);
        track.track_number = raw["track"].as_u64().map(|n| n as u32);
        track.release_year = raw["year"].as_i64().map(|y| y as i32);
        track.service_data = raw.clone();
        Ok(track)
    }

    fn map_playlist(&self, raw: &serde_json::Value) -> Result<Playlist> {
        if raw.is_null() {
            return Err(CoreError::InvalidArgument("null subsonic playlist payload".into()));
        }
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("subsonic playlist missing id".into()))?;
        let name = raw["name"]
            .as_str()
            .ok_or_else(|| CoreError::InvalidArgument("subsonic playlist missing name".into()))?;
        Ok(Playlist {
            service_id: id.to_string(),
            service_name: "subsonic".to_string(),
            name: name.to_string(),
            description: None,
            tracks: Vec::new(),
        })
    }
}

pub struct SubsonicProvider {
    client: Client,
    mapper: SubsonicMapper,
    server_url: String,
    username: String,
    user_id: String,
    credentials: Arc<dyn CredentialStore>,
}

impl SubsonicProvider {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        user_id: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client: Client::new(),
            mapper: SubsonicMapper,
            server_url: server_url.into(),
            username: username.into(),
            user_id: user_id.into(),
            credentials,
        }
    }

    fn generate_salt() -> String {
        let mut rng = rand::thread_rng();
        (0..16).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
    }

    async fn auth_query(&self) -> Result<String> {
        let password = self.credentials.get_access_token(&self.user_id, "subsonic").await?;
        let salt = Self::generate_salt();
        let token = format!("{:x}", md5::compute(format!("{}{}", password, salt)));
        Ok(format!(
            "u={}&t={}&s={}&v={}&c={}&f=json",
            urlencoding::encode(&self.username),
            token,
            salt,
            API_VERSION,
            CLIENT_ID
        ))
    }

    /// Builds the Subsonic cover-art URL embedding a freshly generated salt
    /// and token, per §6: `s`, `t=md5(password+salt)`, `u`, `v=1.8.0`, `c`,
    /// `f=json`, `id`.
    pub async fn cover_art_url(&self, cover_art_id: &str) -> Result<String> {
        let auth = self.auth_query().await?;
        Ok(format!(
            "{}/rest/getCoverArt.view?id={}&{}",
            self.server_url.trim_end_matches('/'),
            cover_art_id,
            auth
        ))
    }

    async fn get(&self, endpoint: &str, extra: &str) -> Result<serde_json::Value> {
        crate::metrics::provider_call("subsonic", "request");
        let auth = self.auth_query().await?;
        let sep = if extra.is_empty() { "" } else { "&" };
        let url = format!(
            "{}/rest/{}.view?{}{}{}",
            self.server_url.trim_end_matches('/'),
            endpoint,
            auth,
            sep,
            extra
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            crate::metrics::provider_error("subsonic", "http_error");
            return Err(CoreError::ProviderError {
                provider: "subsonic".to_string(),
                message: response.status().to_string(),
            });
        }
        let body: serde_json::Value = response.json().await?;
        let root = &body["subsonic-response"];
        if root["status"].as_str() != Some("ok") {
            let message = root["error"]["message"].as_str().unwrap_or("unknown subsonic error").to_string();
            // Subsonic API error code 70 is "the requested data was not
            // found" (missing playlist/song id); every other code is a
            // generic provider failure (auth, rate limit, server error).
            if root["error"]["code"].as_i64() == Some(70) {
                crate::metrics::provider_error("subsonic", "not_found");
                return Err(CoreError::TrackNotFound(message));
            }
            crate::metrics::provider_error("subsonic", "api_error");
            return Err(CoreError::ProviderError {
                provider: "subsonic".to_string(),
                message,
            });
        }
        Ok(root.clone())
    }
}

#[async_trait]
impl ProviderPort for SubsonicProvider {
    fn service_name(&self) -> &str {
        "subsonic"
    }

    fn supports_direct_isrc_querying(&self) -> bool {
        false
    }

    fn supports_musicbrainz_id_querying(&self) -> bool {
        false
    }

    async fn get_user_playlists(&self, _limit: usize) -> Result<Vec<Playlist>> {
        let body = self.get("getPlaylists", "").await?;
        body["playlists"]["playlist"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|p| self.mapper.map_playlist(p))
            .collect()
    }

    async fn get_playlist(&self, id: &str) -> Result<Playlist> {
        let body = self
            .get("getPlaylist", &format!("id={}", urlencoding::encode(id)))
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                other => other,
            })?;
        self.mapper.map_playlist(&body["playlist"])
    }

    async fn get_playlist_tracks(&self, id: &str, limit: usize) -> Result<Vec<Track>> {
        let body = self
            .get("getPlaylist", &format!("id={}", urlencoding::encode(id)))
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(id.to_string()),
                other => other,
            })?;
        let entries = body["playlist"]["entry"].as_array().cloned().unwrap_or_default();
        let mut tracks = Vec::new();
        for raw in entries {
            tracks.push(self.mapper.map_track(&raw)?);
            if limit != 0 && tracks.len() >= limit {
                break;
            }
        }
        Ok(tracks)
    }

    async fn create_playlist(&self, name: &str) -> Result<Playlist> {
        let body = self
            .get("createPlaylist", &format!("name={}", urlencoding::encode(name)))
            .await?;
        self.mapper.map_playlist(&body["playlist"])
    }

    async fn add_tracks_to_playlist(&self, playlist_id: &str, track_ids: &[String]) -> Result<()> {
        let song_ids: String = track_ids
            .iter()
            .map(|id| format!("songIdToAdd={}", urlencoding::encode(id)))
            .collect::<Vec<_>>()
            .join("&");
        self.get("updatePlaylist", &format!("playlistId={}&{}", urlencoding::encode(playlist_id), song_ids))
            .await
            .map_err(|e| match e {
                CoreError::TrackNotFound(_) => CoreError::PlaylistNotFound(playlist_id.to_string()),
                other => other,
            })?;
        Ok(())
    }

    async fn get_track(&self, id: &str) -> Result<Track> {
        let body = self.get("getSong", &format!("id={}", urlencoding::encode(id))).await?;
        self.mapper.map_track(&body["song"])
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let capped = if limit == 0 { 20 } else { limit };
        let body = self
            .get(
                "search3",
                &format!("query={}&songCount={}", urlencoding::encode(query), capped),
            )
            .await?;
        body["searchResult3"]["song"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|t| self.mapper.map_track(t))
            .collect()
    }

    async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
        Err(CoreError::UnsupportedFeature(format!(
            "subsonic does not support direct isrc lookup ({})",
            isrc
        )))
    }

    async fn get_saved_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        let body = self.get("getStarred2", "").await?;
        let entries = body["starred2"]["song"].as_array().cloned().unwrap_or_default();
        let mut tracks = Vec::new();
        for raw in entries {
            tracks.push(self.mapper.map_track(&raw)?);
            if limit != 0 && tracks.len() >= limit {
                break;
            }
        }
        Ok(tracks)
    }

    async fn get_random_track(&self) -> Result<Option<Track>> {
        let body = self.get("getRandomSongs", "size=1").await?;
        match body["randomSongs"]["song"].as_array().and_then(|a| a.first()) {
            Some(raw) => Ok(Some(self.mapper.map_track(raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_song_payload() {
        let mapper = SubsonicMapper;
        let raw = serde_json::json!({
            "id": "42", "title": "Song", "artist": "Artist", "album": "Album",
            "duration": 200, "track": 4, "year": 2009
        });
        let track = mapper.map_track(&raw).unwrap();
        assert_eq!(track.title, "Song");
        assert_eq!(track.track_number, Some(4));
        assert_eq!(track.release_year, Some(2009));
    }

    #[test]
    fn salt_is_sixteen_hex_chars() {
        let salt = SubsonicProvider::generate_salt();
        assert_eq!(salt.len(), 16);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
