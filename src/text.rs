//! `TextNormalizer` — the 7-step cleanup pipeline query construction and
//! similarity both rely on to ignore cosmetic differences between provider
//! catalogs (`(Remastered 2011)`, `feat.` vs `ft.`, curly quotes, ...).

use regex::Regex;
use std::sync::OnceLock;

fn version_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[\(\{\[][^()\[\]{}]*[\)\}\]]\s*").unwrap())
}

const ARTIST_FEATURE_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("featuring", " "),
    ("with", ""),
    ("feat.", ""),
    ("feat", ""),
    ("ft.", ""),
    ("ft", ""),
    ("prod. ", ""),
    ("prod ", ""),
    ("w/", ""),
];

const CONJUNCTIONS: &[(&str, &str)] = &[("&", "and"), ("+", "and")];

const STRAY_BRACKETS: &[char] = &['[', ']', '{', '}', '(', ')'];

pub struct TextNormalizer;

impl TextNormalizer {
    /// Lowercase, strip parenthetical/bracketed version tags, fold artist
    /// "featuring" variants and `&`/`+`, drop stray punctuation, and collapse
    /// whitespace. Order matters: version tags must go before punctuation
    /// stripping or `(feat. X)` would leave a dangling `feat. x`.
    pub fn normalize(input: &str) -> String {
        let mut s = input.to_lowercase();
        s = Self::remove_version_tags(&s);

        for (pattern, replacement) in ARTIST_FEATURE_SUBSTITUTIONS {
            s = s.replace(pattern, replacement);
        }
        for (pattern, replacement) in CONJUNCTIONS {
            s = s.replace(pattern, replacement);
        }

        s.retain(|c| !STRAY_BRACKETS.contains(&c));

        s = s
            .chars()
            .map(|c| match c {
                '\'' | '"' | '!' | '?' | ',' | ';' | ':' => '\0',
                '/' | '\\' | '_' | '-' | '.' => ' ',
                other => other,
            })
            .filter(|c| *c != '\0')
            .collect();

        Self::normalize_whitespace(&s)
    }

    fn remove_version_tags(s: &str) -> String {
        version_tag_re().replace_all(s, " ").to_string()
    }

    fn normalize_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_version_tags() {
        assert_eq!(
            TextNormalizer::normalize("Song Title (Remastered 2011)"),
            "song title"
        );
    }

    #[test]
    fn folds_featuring_variants() {
        assert_eq!(
            TextNormalizer::normalize("Artist feat. Other Artist"),
            "artist other artist"
        );
        assert_eq!(
            TextNormalizer::normalize("Artist ft Other"),
            "artist other"
        );
    }

    #[test]
    fn folds_ampersand_to_and() {
        assert_eq!(TextNormalizer::normalize("Simon & Garfunkel"), "simon and garfunkel");
    }

    #[test]
    fn strips_punctuation_and_collapses_whitespace() {
        assert_eq!(TextNormalizer::normalize("Don't Stop  Believin'"), "dont stop believin");
        assert_eq!(TextNormalizer::normalize("A-B_C.D"), "a b c d");
    }

    #[test]
    fn idempotent_on_already_normalized_input() {
        let once = TextNormalizer::normalize("already normal title");
        assert_eq!(TextNormalizer::normalize(&once), once);
    }
}
