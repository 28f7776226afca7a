//! `Matcher` — best-effort cross-provider track matching.
//!
//! Four strategies are attempted in order against a single target
//! `ProviderPort`; the first one whose candidate clears
//! [`Similarity::MATCH_THRESHOLD`] wins. This is a direct port of the
//! strategy ordering and query-construction/batching rules used by the
//! original async track matcher this crate's task runtime is modeled on,
//! adapted from its strictly-sequential per-query loop to concurrent
//! per-batch dispatch (`futures::future::join_all`) since nothing here
//! requires sequential ordering within a batch of five.

use futures::future::join_all;

use crate::error::{CoreError, Result};
use crate::models::Track;
use crate::providers::ProviderPort;
use crate::services::musicbrainz::MusicBrainzClient;
use crate::similarity::Similarity;

const SEARCH_BATCH_SIZE: usize = 5;
const SEARCH_RESULT_LIMIT: usize = 5;

pub struct Matcher<'a> {
    target: &'a dyn ProviderPort,
    musicbrainz: &'a MusicBrainzClient,
}

impl<'a> Matcher<'a> {
    pub fn new(target: &'a dyn ProviderPort, musicbrainz: &'a MusicBrainzClient) -> Self {
        Self { target, musicbrainz }
    }

    /// Tries to find `reference` on the target service. Best-effort: no
    /// guarantee of a match, and no guarantee the match is correct.
    /// `is_cancelled` is polled between search batches so a caller can abort
    /// a long text-search strategy cooperatively.
    pub async fn find_match(
        &self,
        reference: &Track,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Option<Track>> {
        crate::metrics::matcher_attempt("origin_service");
        if let Some(track) = self.search_on_origin_service(reference).await? {
            return Ok(Some(track));
        }
        crate::metrics::matcher_attempt("isrc");
        if let Some(track) = self.search_by_isrc_only(reference).await? {
            return Ok(Some(track));
        }
        crate::metrics::matcher_attempt("text");
        if let Some(track) = self.search_with_text(reference, is_cancelled).await? {
            return Ok(Some(track));
        }
        crate::metrics::matcher_attempt("musicbrainz_id");
        if let Some(track) = self.search_with_musicbrainz_id(reference).await? {
            return Ok(Some(track));
        }
        Ok(None)
    }

    async fn search_on_origin_service(&self, reference: &Track) -> Result<Option<Track>> {
        if reference.service_name.is_empty()
            || reference.service_id.is_empty()
            || reference.service_name != self.target.service_name()
        {
            return Ok(None);
        }
        match self.target.get_track(&reference.service_id).await {
            Ok(candidate) => {
                let score = Similarity::track_sim(reference, &candidate);
                crate::metrics::matcher_score(score);
                if Similarity::matches(reference, &candidate) {
                    Ok(Some(candidate))
                } else {
                    Ok(None)
                }
            }
            Err(CoreError::TrackNotFound(_)) | Err(CoreError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn search_by_isrc_only(&self, reference: &Track) -> Result<Option<Track>> {
        let isrc = match (&reference.isrc, self.target.supports_direct_isrc_querying()) {
            (Some(isrc), true) if !isrc.is_empty() => isrc,
            _ => return Ok(None),
        };
        match self.target.get_track_by_isrc(isrc).await {
            Ok(candidate) => {
                let score = Similarity::track_sim(reference, &candidate);
                crate::metrics::matcher_score(score);
                if Similarity::matches(reference, &candidate) {
                    Ok(Some(candidate))
                } else {
                    Ok(None)
                }
            }
            Err(CoreError::TrackNotFound(_)) | Err(CoreError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Builds the deterministic query list (normalized and raw title/artist
    /// combinations, plus the bare album name), runs it in batches of five
    /// with a concurrent search per batch, and returns the single best
    /// candidate across all batches.
    async fn search_with_text(
        &self,
        reference: &Track,
        is_cancelled: &(dyn Fn() -> bool + Sync),
    ) -> Result<Option<Track>> {
        let queries = build_query_list(reference);
        if queries.is_empty() {
            return Ok(None);
        }

        let mut best_per_batch: Vec<Track> = Vec::new();

        for batch in queries.chunks(SEARCH_BATCH_SIZE) {
            if is_cancelled() {
                break;
            }

            let searches = batch
                .iter()
                .map(|query| self.target.search_tracks(query, SEARCH_RESULT_LIMIT));
            let batch_results = join_all(searches).await;

            let mut batch_best: Vec<Track> = Vec::new();
            for result in batch_results {
                let candidates = match result {
                    Ok(candidates) => candidates,
                    Err(CoreError::TrackNotFound(_)) | Err(CoreError::Timeout(_)) => continue,
                    Err(e) => return Err(e),
                };
                if let Some(best) = best_candidate(&candidates, reference) {
                    batch_best.push(best.clone());
                }
            }

            if let Some(best) = best_candidate(&batch_best, reference) {
                best_per_batch.push(best.clone());
            }
        }

        match best_candidate(&best_per_batch, reference) {
            Some(candidate) => {
                let score = Similarity::track_sim(reference, candidate);
                crate::metrics::matcher_score(score);
                if Similarity::matches(reference, candidate) {
                    Ok(Some(candidate.clone()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn search_with_musicbrainz_id(&self, reference: &Track) -> Result<Option<Track>> {
        let mbid = match &reference.musicbrainz_id {
            Some(mbid) if !mbid.is_empty() => Some(mbid.clone()),
            _ => {
                self.musicbrainz
                    .id_from_query(
                        reference.primary_artist.as_deref().unwrap_or(""),
                        &reference.title,
                        reference.release_year,
                        reference.isrc.as_deref(),
                    )
                    .await
            }
        };
        let Some(mbid) = mbid else {
            return Ok(None);
        };
        if !self.target.supports_musicbrainz_id_querying() {
            return Ok(None);
        }

        let results = self.target.search_tracks(&mbid, 1).await?;
        match results.into_iter().next() {
            Some(candidate) if Similarity::matches(reference, &candidate) => Ok(Some(candidate)),
            _ => Ok(None),
        }
    }
}

fn best_candidate<'t>(candidates: &'t [Track], reference: &Track) -> Option<&'t Track> {
    candidates
        .iter()
        .max_by(|a, b| {
            Similarity::track_sim(reference, a)
                .partial_cmp(&Similarity::track_sim(reference, b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

fn build_query_list(reference: &Track) -> Vec<String> {
    use crate::text::TextNormalizer;

    let mut queries = Vec::new();
    let title = &reference.title;
    let artist = reference.primary_artist.as_deref();

    if !title.is_empty() {
        queries.push(TextNormalizer::normalize(title));
        queries.push(title.clone());
    }
    if let Some(artist) = artist {
        if !artist.is_empty() {
            queries.push(TextNormalizer::normalize(artist));
            queries.push(artist.to_string());
        }
    }
    if let Some(artist) = artist {
        if !artist.is_empty() && !title.is_empty() {
            let clean_artist = TextNormalizer::normalize(artist);
            let clean_title = TextNormalizer::normalize(title);
            queries.push(format!("{} {}", clean_artist, clean_title));
            queries.push(format!("{} {}", clean_title, clean_artist));
            queries.push(format!("{} - {}", clean_artist, clean_title));
            queries.push(format!("{} - {}", clean_title, clean_artist));
            queries.push(format!("{} {}", artist, title));
            queries.push(format!("{} {}", title, artist));
            queries.push(format!("{} - {}", artist, title));
        }
    }
    if let Some(album) = &reference.album_name {
        if !album.is_empty() {
            queries.push(album.clone());
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    use crate::error::CoreError;
    use crate::models::Playlist;

    #[derive(Default)]
    struct StubProvider {
        name: &'static str,
        supports_isrc: bool,
        supports_mbid: bool,
        get_track_result: Mutex<Option<Track>>,
        isrc_result: Mutex<Option<Track>>,
        search_results: Mutex<Vec<Track>>,
        search_call_count: AtomicUsize,
    }

    #[async_trait]
    impl ProviderPort for StubProvider {
        fn service_name(&self) -> &str {
            self.name
        }
        fn supports_direct_isrc_querying(&self) -> bool {
            self.supports_isrc
        }
        fn supports_musicbrainz_id_querying(&self) -> bool {
            self.supports_mbid
        }
        async fn get_user_playlists(&self, _limit: usize) -> Result<Vec<Playlist>> {
            Ok(vec![])
        }
        async fn get_playlist(&self, id: &str) -> Result<Playlist> {
            Err(CoreError::PlaylistNotFound(id.to_string()))
        }
        async fn get_playlist_tracks(&self, _id: &str, _limit: usize) -> Result<Vec<Track>> {
            Ok(vec![])
        }
        async fn create_playlist(&self, name: &str) -> Result<Playlist> {
            Ok(Playlist {
                service_id: "new".into(),
                service_name: self.name.into(),
                name: name.into(),
                description: None,
                tracks: vec![],
            })
        }
        async fn add_tracks_to_playlist(&self, _playlist_id: &str, _track_ids: &[String]) -> Result<()> {
            Ok(())
        }
        async fn get_track(&self, id: &str) -> Result<Track> {
            self.get_track_result
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CoreError::TrackNotFound(id.to_string()))
        }
        async fn search_tracks(&self, _query: &str, _limit: usize) -> Result<Vec<Track>> {
            self.search_call_count.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.search_results.lock().unwrap().clone())
        }
        async fn get_track_by_isrc(&self, isrc: &str) -> Result<Track> {
            self.isrc_result
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| CoreError::TrackNotFound(isrc.to_string()))
        }
        async fn get_saved_tracks(&self, _limit: usize) -> Result<Vec<Track>> {
            Ok(vec![])
        }
        async fn get_random_track(&self) -> Result<Option<Track>> {
            Ok(None)
        }
    }

    fn reference() -> Track {
        let mut t = Track::new("1", "spotify");
        t.title = "My Song".to_string();
        t.primary_artist = Some("My Artist".to_string());
        t
    }

    fn never_cancelled() -> bool {
        false
    }

    #[tokio::test]
    async fn origin_service_shortcut_wins_when_identity_matches() {
        let reference = reference();
        let mut candidate = reference.clone();
        candidate.service_id = "1".to_string();

        let target = StubProvider {
            name: "spotify",
            get_track_result: Mutex::new(Some(candidate.clone())),
            ..Default::default()
        };
        let mb = MusicBrainzClient::new();
        let matcher = Matcher::new(&target, &mb);

        let result = matcher.find_match(&reference, &never_cancelled).await.unwrap();
        assert_eq!(result.unwrap().service_id, "1");
        assert_eq!(target.search_call_count.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn direct_isrc_used_when_origin_service_differs() {
        let mut reference = reference();
        reference.isrc = Some("USXXX1234567".to_string());

        let mut candidate = reference.clone();
        candidate.service_id = "99".to_string();
        candidate.service_name = "youtube_music".to_string();

        let target = StubProvider {
            name: "youtube_music",
            supports_isrc: true,
            isrc_result: Mutex::new(Some(candidate.clone())),
            ..Default::default()
        };
        let mb = MusicBrainzClient::new();
        let matcher = Matcher::new(&target, &mb);

        let result = matcher.find_match(&reference, &never_cancelled).await.unwrap();
        assert_eq!(result.unwrap().service_id, "99");
    }

    #[tokio::test]
    async fn falls_back_to_text_search_when_earlier_strategies_fail() {
        let reference = reference();
        let mut candidate = reference.clone();
        candidate.service_id = "77".to_string();
        candidate.service_name = "youtube_music".to_string();

        let target = StubProvider {
            name: "youtube_music",
            search_results: Mutex::new(vec![candidate.clone()]),
            ..Default::default()
        };
        let mb = MusicBrainzClient::new();
        let matcher = Matcher::new(&target, &mb);

        let result = matcher.find_match(&reference, &never_cancelled).await.unwrap();
        assert_eq!(result.unwrap().service_id, "77");
        assert!(target.search_call_count.load(AtomicOrdering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn no_strategy_finds_anything_returns_none() {
        let reference = reference();
        let target = StubProvider {
            name: "youtube_music",
            ..Default::default()
        };
        let mb = MusicBrainzClient::new();
        let matcher = Matcher::new(&target, &mb);

        let result = matcher.find_match(&reference, &never_cancelled).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn text_search_respects_cancellation_between_batches() {
        let reference = reference();
        let target = StubProvider {
            name: "youtube_music",
            ..Default::default()
        };
        let mb = MusicBrainzClient::new();
        let matcher = Matcher::new(&target, &mb);

        let cancelled = || true;
        let result = matcher.search_with_text(&reference, &cancelled).await.unwrap();
        assert!(result.is_none());
        assert_eq!(target.search_call_count.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn query_list_includes_normalized_and_raw_combinations() {
        let reference = reference();
        let queries = build_query_list(&reference);
        assert!(queries.contains(&"my song".to_string()));
        assert!(queries.contains(&"My Song".to_string()));
        assert!(queries.contains(&"my artist my song".to_string()));
        assert!(queries.contains(&"My Artist My Song".to_string()));
        assert!(queries.contains(&"My Artist - My Song".to_string()));
    }
}
