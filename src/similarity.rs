//! Track similarity scoring.
//!
//! `track_sim` mirrors the weighted scheme used to decide whether two
//! catalog entries from different providers describe the same recording.
//! The weight gating quirk — `release_year` is only scored when both tracks
//! *also* carry a `track_number` — is preserved exactly as observed upstream;
//! it is almost certainly an authoring mistake in the source, but changing it
//! would silently shift which matches clear the threshold, so it stays.

use crate::models::Track;
use crate::text::TextNormalizer;

/// Minimum `track_sim` score to treat two tracks as the same recording.
pub const MATCH_THRESHOLD: f64 = 0.75;

pub struct Similarity;

impl Similarity {
    /// Longest-common-subsequence ratio over normalized text: `2 * lcs_len /
    /// (len(a) + len(b))`. By convention `str_sim("", "") == 0.0`, not 1.0 —
    /// two blank fields are not evidence of a match.
    pub fn str_sim(a: &str, b: &str) -> f64 {
        let na = TextNormalizer::normalize(a);
        let nb = TextNormalizer::normalize(b);

        let a_chars: Vec<char> = na.chars().collect();
        let b_chars: Vec<char> = nb.chars().collect();

        if a_chars.is_empty() || b_chars.is_empty() {
            return 0.0;
        }

        let lcs_len = Self::lcs_length(&a_chars, &b_chars);
        (2 * lcs_len) as f64 / (a_chars.len() + b_chars.len()) as f64
    }

    fn lcs_length(a: &[char], b: &[char]) -> usize {
        let mut prev = vec![0usize; b.len() + 1];
        let mut cur = vec![0usize; b.len() + 1];

        for ai in a {
            for (j, bj) in b.iter().enumerate() {
                cur[j + 1] = if ai == bj {
                    prev[j] + 1
                } else {
                    prev[j + 1].max(cur[j])
                };
            }
            std::mem::swap(&mut prev, &mut cur);
        }
        prev[b.len()]
    }

    /// `1.0` if `a == b`; else `1 - |a-b|/max(a,b)` rounded to one decimal;
    /// `0.0` if either value is `None` or zero.
    pub fn int_close(a: Option<i64>, b: Option<i64>) -> f64 {
        match (a, b) {
            (Some(a), Some(b)) if a != 0 && b != 0 => {
                if a == b {
                    1.0
                } else {
                    let denom = a.max(b) as f64;
                    let raw = 1.0 - (a - b).unsigned_abs() as f64 / denom;
                    (raw * 10.0).round() / 10.0
                }
            }
            _ => 0.0,
        }
    }

    /// Weighted similarity between two tracks, rounded to two decimals.
    /// Returns 1.0 immediately if both carry a matching ISRC or MusicBrainz ID.
    pub fn track_sim(a: &Track, b: &Track) -> f64 {
        if let (Some(isrc_a), Some(isrc_b)) = (&a.isrc, &b.isrc) {
            if !isrc_a.is_empty() && isrc_a == isrc_b {
                return 1.0;
            }
        }
        if let (Some(mbid_a), Some(mbid_b)) = (&a.musicbrainz_id, &b.musicbrainz_id) {
            if !mbid_a.is_empty() && mbid_a == mbid_b {
                return 1.0;
            }
        }

        let title_sim = Self::str_sim(&a.title, &b.title);
        let artist_sim = Self::str_sim(
            a.primary_artist.as_deref().unwrap_or(""),
            b.primary_artist.as_deref().unwrap_or(""),
        );

        let both_have_album = a.album_name.is_some() && b.album_name.is_some();
        let album_sim = Self::str_sim(
            a.album_name.as_deref().unwrap_or(""),
            b.album_name.as_deref().unwrap_or(""),
        );
        let album_weight = if both_have_album { 1.25 } else { 0.75 };

        let duration_closeness = Self::int_close(
            a.duration_seconds.map(|v| v as i64),
            b.duration_seconds.map(|v| v as i64),
        );

        let both_have_track_number = a.track_number.is_some() && b.track_number.is_some();
        let track_number_closeness = Self::int_close(
            a.track_number.map(|v| v as i64),
            b.track_number.map(|v| v as i64),
        );
        let track_number_weight = if both_have_track_number { 0.5 } else { 0.0 };

        // Quirk: release-year closeness is gated on track_number presence,
        // not on release_year presence, matching upstream.
        let release_year_closeness =
            Self::int_close(a.release_year.map(|v| v as i64), b.release_year.map(|v| v as i64));
        let release_year_weight = if both_have_track_number { 0.5 } else { 0.0 };

        let weighted_sum = title_sim * 4.0
            + artist_sim * 3.0
            + album_sim * album_weight
            + duration_closeness * 0.75
            + track_number_closeness * track_number_weight
            + release_year_closeness * release_year_weight;

        let weight_total =
            4.0 + 3.0 + album_weight + 0.75 + track_number_weight + release_year_weight;

        let score = weighted_sum / weight_total;
        (score * 100.0).round() / 100.0
    }

    pub fn matches(a: &Track, b: &Track) -> bool {
        Self::track_sim(a, b) >= MATCH_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str) -> Track {
        let mut t = Track::new("id", "test");
        t.title = title.to_string();
        t.primary_artist = Some(artist.to_string());
        t
    }

    #[test]
    fn str_sim_identical_is_one() {
        assert_eq!(Similarity::str_sim("Hello World", "Hello World"), 1.0);
    }

    #[test]
    fn str_sim_empty_strings_is_zero_by_convention() {
        assert_eq!(Similarity::str_sim("", ""), 0.0);
    }

    #[test]
    fn str_sim_one_empty_is_zero() {
        assert_eq!(Similarity::str_sim("abc", ""), 0.0);
    }

    #[test]
    fn str_sim_ignores_cosmetic_differences() {
        let sim = Similarity::str_sim("Song (Remastered 2011)", "song");
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn int_close_exact_match_is_one() {
        assert_eq!(Similarity::int_close(Some(180), Some(180)), 1.0);
    }

    #[test]
    fn int_close_rounds_to_one_decimal() {
        // 1 - 1/180 = 0.9944... -> rounds to 1.0
        assert_eq!(Similarity::int_close(Some(180), Some(179)), 1.0);
        // 1 - 20/180 = 0.8888... -> rounds to 0.9
        assert_eq!(Similarity::int_close(Some(180), Some(160)), 0.9);
    }

    #[test]
    fn int_close_null_or_zero_is_zero() {
        assert_eq!(Similarity::int_close(None, Some(10)), 0.0);
        assert_eq!(Similarity::int_close(Some(0), Some(10)), 0.0);
    }

    #[test]
    fn track_sim_matching_isrc_shortcuts_to_one() {
        let mut a = track("Title A", "Artist A");
        let mut b = track("Completely Different", "Someone Else");
        a.isrc = Some("USXXX1234567".to_string());
        b.isrc = Some("USXXX1234567".to_string());
        assert_eq!(Similarity::track_sim(&a, &b), 1.0);
    }

    #[test]
    fn track_sim_identical_tracks_match() {
        let a = track("My Song", "My Artist");
        let b = track("My Song", "My Artist");
        assert!(Similarity::matches(&a, &b));
    }

    #[test]
    fn track_sim_is_symmetric() {
        let a = track("Bohemian Rhapsody", "Queen");
        let b = track("Shape of You", "Ed Sheeran");
        assert_eq!(Similarity::track_sim(&a, &b), Similarity::track_sim(&b, &a));
    }

    #[test]
    fn track_sim_unrelated_tracks_do_not_match() {
        let a = track("Bohemian Rhapsody", "Queen");
        let b = track("Shape of You", "Ed Sheeran");
        assert!(!Similarity::matches(&a, &b));
    }

    #[test]
    fn track_sim_is_rounded_to_two_decimals() {
        let a = track("Song Title", "Artist Name");
        let b = track("Song Titlex", "Artist Namex");
        let sim = Similarity::track_sim(&a, &b);
        assert_eq!((sim * 100.0).round() / 100.0, sim);
    }
}
