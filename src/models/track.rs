//! `Track`, the provider-agnostic record every matching and transfer
//! operation works with.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// A single track as seen by one streaming provider, or as a match
/// candidate produced by the `Matcher`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub title: String,
    pub album_name: Option<String>,
    pub primary_artist: Option<String>,
    pub additional_artists: Vec<String>,
    pub duration_seconds: Option<u32>,
    pub track_number: Option<u32>,
    pub release_year: Option<i32>,
    pub isrc: Option<String>,
    pub musicbrainz_id: Option<String>,
    pub service_id: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Opaque provider-specific payload (e.g. Subsonic cover art id, Spotify
    /// URI). Stored as JSON and base64-framed on the wire, see `serialize`.
    #[serde(default)]
    pub service_data: serde_json::Value,
}

fn default_service_name() -> String {
    "unknown".to_string()
}

impl Track {
    pub fn new(service_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Identity is (service_id, service_name) — two `Track`s from different
    /// providers are never equal even if every other field matches.
    pub fn same_identity(&self, other: &Track) -> bool {
        self.service_id == other.service_id && self.service_name == other.service_name
    }

    /// Base64-frame `service_data` for transport, leaving the rest of the
    /// struct as plain JSON.
    pub fn serialize(&self) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(ref mut map) = value {
            let encoded = STANDARD.encode(self.service_data.to_string());
            map.insert("service_data".to_string(), serde_json::Value::String(encoded));
        }
        serde_json::to_string(&value)
    }

    pub fn deserialize(raw: &str) -> serde_json::Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let serde_json::Value::Object(ref mut map) = value {
            if let Some(serde_json::Value::String(encoded)) = map.get("service_data").cloned() {
                let decoded = STANDARD
                    .decode(encoded)
                    .map_err(serde::de::Error::custom)?;
                let decoded_str = String::from_utf8(decoded).map_err(serde::de::Error::custom)?;
                let parsed: serde_json::Value =
                    serde_json::from_str(&decoded_str).unwrap_or(serde_json::Value::Null);
                map.insert("service_data".to_string(), parsed);
            }
        }
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_identity_requires_both_service_id_and_name() {
        let a = Track::new("123", "spotify");
        let b = Track::new("123", "youtube_music");
        let c = Track::new("123", "spotify");
        assert!(!a.same_identity(&b));
        assert!(a.same_identity(&c));
    }

    #[test]
    fn serialize_round_trips_service_data() {
        let mut t = Track::new("abc", "spotify");
        t.title = "Song".to_string();
        t.service_data = serde_json::json!({"uri": "spotify:track:abc"});

        let encoded = t.serialize().unwrap();
        let decoded = Track::deserialize(&encoded).unwrap();

        assert_eq!(decoded.title, "Song");
        assert_eq!(decoded.service_data["uri"], "spotify:track:abc");
    }
}
