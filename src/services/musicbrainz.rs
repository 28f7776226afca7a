//! MusicBrainz lookup, the external collaborator consumed by `Matcher`
//! strategy 4. Rate-limited to 1 request/second per the API's etiquette
//! policy, grounded in the last-request-timestamp throttle used by the
//! catalog-sync MusicBrainz importer.

use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

const API_BASE: &str = "https://musicbrainz.org/ws/2";
const USER_AGENT: &str = "playlist-transfer-core/0.1 (+https://example.invalid/contact)";
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    id: String,
}

pub struct MusicBrainzClient {
    client: Client,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl Default for MusicBrainzClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicBrainzClient {
    pub fn new() -> Self {
        Self {
            client: Client::builder().user_agent(USER_AGENT).build().expect("reqwest client"),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn search(&self, query: &str) -> Option<String> {
        self.throttle().await;
        let url = format!("{}/recording?query={}&fmt=json&limit=1", API_BASE, urlencoding::encode(query));
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: RecordingSearchResponse = response.json().await.ok()?;
        body.recordings.into_iter().next().map(|r| r.id)
    }

    /// `id_from_isrc(isrc) -> mbid?`. Failures are swallowed to `None`.
    pub async fn id_from_isrc(&self, isrc: &str) -> Option<String> {
        self.search(&format!("isrc:{}", isrc)).await
    }

    /// `id_from_query(artist, title, year?, isrc?) -> mbid?`. Failures are
    /// swallowed to `None`.
    pub async fn id_from_query(
        &self,
        artist: &str,
        title: &str,
        year: Option<i32>,
        isrc: Option<&str>,
    ) -> Option<String> {
        if let Some(isrc) = isrc {
            if let Some(mbid) = self.id_from_isrc(isrc).await {
                return Some(mbid);
            }
        }
        let mut query = format!("artist:{} AND recording:{}", artist, title);
        if let Some(y) = year {
            query.push_str(&format!(" AND date:{}", y));
        }
        self.search(&query).await
    }
}
