//! # Track Matching
//!
//! Service-neutral scoring used by every provider adapter:
//!
//! - **Exact-code disambiguation**: a single ISRC (or UPC) often resolves to
//!   several catalog entries (original album, single, compilation, deluxe
//!   re-release). [`pick_code_candidate`] ranks them deterministically and
//!   keeps the best one if it clears `min_isrc_score`.
//! - **Metadata fallback**: [`pick_metadata_candidate`] scores text-search
//!   results against the source title, artists and duration and accepts the
//!   best one only above `metadata_threshold`.
//!
//! Adapters convert their catalog payloads into [`CatalogCandidate`] and let
//! this module decide. All weights come from [`MatchingConfig`].

use crate::provider::{MatchResult, MetadataQuery};
use core_runtime::config::MatchingConfig;
use std::cmp::Ordering;
use std::collections::HashSet;

// "with" is left out: it only marks a credit inside brackets or after " - ",
// both of which are already dropped.
const FEATURE_MARKERS: &[&str] = &[" feat. ", " feat ", " ft. ", " ft ", " featuring "];

const VARIANT_TERMS: &[&str] = &[
    "remix",
    "live",
    "cover",
    "acoustic",
    "karaoke",
    "instrumental",
    "demo",
    "unplugged",
    "reprise",
    "slowed",
    "sped",
    "nightcore",
];

const VARIOUS_ARTISTS: &str = "various artists";

/// A destination catalog entry in service-neutral form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogCandidate {
    /// Id accepted by the adapter's `add_tracks`
    pub track_id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album_name: Option<String>,
    pub album_artists: Vec<String>,
    /// `album`, `single` or `compilation` where the service reports it
    pub album_type: Option<String>,
    pub is_compilation: bool,
    /// `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub release_date: Option<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub duration_ms: Option<u64>,
    /// Set by adapters that can compare artist ids; overrides the name check
    pub same_artist_album: Option<bool>,
}

impl CatalogCandidate {
    pub fn to_match_result(&self) -> MatchResult {
        MatchResult {
            provider_track_id: self.track_id.clone(),
            isrc: self.isrc.clone(),
            upc: self.upc.clone(),
            name: Some(self.name.clone()).filter(|name| !name.is_empty()),
            artists: self.artists.clone(),
        }
    }

    fn is_compilation_release(&self) -> bool {
        self.is_compilation
            || self
                .album_type
                .as_deref()
                .is_some_and(|kind| kind.eq_ignore_ascii_case("compilation"))
    }

    fn has_same_artist_album(&self) -> bool {
        if let Some(same) = self.same_artist_album {
            return same;
        }
        if self.album_artists.is_empty() || self.artists.is_empty() {
            return false;
        }
        let track_artists: HashSet<String> =
            self.artists.iter().map(|a| normalize_name(a)).collect();
        self.album_artists.iter().any(|album_artist| {
            let album_artist = normalize_name(album_artist);
            track_artists
                .iter()
                .any(|artist| artist == &album_artist || album_artist.contains(artist.as_str()))
        })
    }

    fn is_various_artists(&self) -> bool {
        self.album_artists
            .iter()
            .any(|artist| normalize_name(artist) == VARIOUS_ARTISTS)
    }
}

/// Lowercased, whitespace-collapsed name.
fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercases and splits on anything that is not a letter or digit.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Title reduced to its searchable core.
///
/// Drops bracketed annotations, featured-artist credits and ` - ` suffixes
/// such as "Remastered 2011", then lowercases and collapses punctuation.
pub fn normalize_title(title: &str) -> String {
    let mut unbracketed = String::with_capacity(title.len());
    let mut depth = 0usize;
    for ch in title.chars() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => unbracketed.push(ch),
            _ => {}
        }
    }

    let lowered = format!("{} ", unbracketed.to_lowercase());
    let mut cut = lowered.find(" - ").unwrap_or(lowered.len());
    for marker in FEATURE_MARKERS {
        if let Some(idx) = lowered.find(marker) {
            cut = cut.min(idx);
        }
    }

    let core = tokenize(&lowered[..cut]);
    if core.is_empty() {
        tokenize(&lowered).join(" ")
    } else {
        core.join(" ")
    }
}

/// Whether a title or album name marks an alternate recording.
pub fn is_variant(text: &str) -> bool {
    tokenize(text)
        .iter()
        .any(|token| VARIANT_TERMS.contains(&token.as_str()))
}

/// Sørensen–Dice overlap of two token lists, in `0.0..=1.0`.
pub fn token_overlap(left: &[String], right: &[String]) -> f64 {
    let left: HashSet<&str> = left.iter().map(String::as_str).collect();
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count() as f64;
    2.0 * shared / (left.len() + right.len()) as f64
}

/// Share of the smaller artist token set found in the other one.
///
/// Catalogs often credit only the primary artist, so a candidate listing
/// one of two source artists still counts as a full match.
fn artist_overlap(left: &[String], right: &[String]) -> f64 {
    let left: HashSet<String> = left.iter().flat_map(|a| tokenize(a)).collect();
    let right: HashSet<String> = right.iter().flat_map(|a| tokenize(a)).collect();
    let smaller = left.len().min(right.len());
    if smaller == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / smaller as f64
}

/// `1.0` for identical durations, falling linearly to `0.0` at the tolerance.
fn duration_closeness(source: Option<u64>, candidate: Option<u64>, tolerance_ms: u64) -> f64 {
    match (source, candidate) {
        (Some(source), Some(candidate)) if source > 0 => {
            let diff = source.abs_diff(candidate);
            if tolerance_ms == 0 {
                return if diff == 0 { 1.0 } else { 0.0 };
            }
            1.0 - diff.min(tolerance_ms) as f64 / tolerance_ms as f64
        }
        _ => 0.0,
    }
}

/// Search text for a metadata lookup: cleaned title plus primary artist.
pub fn search_terms(query: &MetadataQuery<'_>) -> String {
    let title = normalize_title(query.name);
    match query.artists.first().map(|a| a.trim()).filter(|a| !a.is_empty()) {
        Some(artist) => format!("{} {}", title, artist),
        None => title,
    }
}

/// Weighted text/duration score of one search result.
pub fn score_metadata_candidate(
    query: &MetadataQuery<'_>,
    candidate: &CatalogCandidate,
    config: &MatchingConfig,
) -> f64 {
    let title = token_overlap(
        &tokenize(&normalize_title(query.name)),
        &tokenize(&normalize_title(&candidate.name)),
    );
    let artists = artist_overlap(query.artists, &candidate.artists);
    let duration = duration_closeness(
        query.duration_ms,
        candidate.duration_ms,
        config.duration_tolerance_ms,
    );

    let mut score = config.title_weight * title
        + config.artist_weight * artists
        + config.duration_weight * duration;

    if is_variant(&candidate.name) && !is_variant(query.name) {
        score -= config.variant_penalty;
    }

    let same_isrc = match (query.isrc, candidate.isrc.as_deref()) {
        (Some(wanted), Some(found)) => wanted.trim().eq_ignore_ascii_case(found.trim()),
        _ => false,
    };
    if same_isrc {
        score += config.isrc_bonus;
    }

    score
}

/// Highest-scoring search result at or above `metadata_threshold`.
///
/// Ties keep the earlier result, i.e. the service's own relevance order.
pub fn pick_metadata_candidate<'c>(
    query: &MetadataQuery<'_>,
    candidates: &'c [CatalogCandidate],
    config: &MatchingConfig,
) -> Option<&'c CatalogCandidate> {
    let mut best: Option<(&CatalogCandidate, f64)> = None;
    for candidate in candidates.iter().filter(|c| !c.track_id.is_empty()) {
        let score = score_metadata_candidate(query, candidate, config);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    best.filter(|(_, score)| *score >= config.metadata_threshold)
        .map(|(candidate, _)| candidate)
}

/// Release-quality score of one entry returned for an exact code.
///
/// `earliest` tells whether the entry carries the earliest release date of
/// its candidate set.
pub fn score_code_candidate(
    candidate: &CatalogCandidate,
    earliest: bool,
    config: &MatchingConfig,
) -> f64 {
    let mut score = 0.0;

    if candidate.has_same_artist_album() {
        score += config.same_artist_album_bonus;
    }
    if candidate.is_compilation_release() {
        score -= config.compilation_penalty;
    }
    if candidate.is_various_artists() {
        score -= config.various_artists_penalty;
    }
    if matches!(candidate.album_type.as_deref(), Some("album") | Some("single")) {
        score += config.album_type_bonus;
    }
    if earliest {
        score += config.earliest_release_bonus;
    }
    let variant_album = candidate.album_name.as_deref().is_some_and(is_variant);
    if is_variant(&candidate.name) || variant_album {
        score -= config.variant_release_penalty;
    }

    score
}

/// Best entry among those returned for one ISRC or UPC.
///
/// Ordering is total: score, then earlier release date, then position in the
/// service response. Returns `None` when the winner scores below
/// `min_isrc_score`.
pub fn pick_code_candidate<'c>(
    candidates: &'c [CatalogCandidate],
    config: &MatchingConfig,
) -> Option<&'c CatalogCandidate> {
    let usable: Vec<&CatalogCandidate> = candidates
        .iter()
        .filter(|c| !c.track_id.is_empty())
        .collect();

    let earliest_date = usable
        .iter()
        .filter_map(|c| c.release_date.as_deref())
        .min();

    let mut best: Option<(&CatalogCandidate, f64)> = None;
    for candidate in usable.iter().copied() {
        let earliest = earliest_date.is_some() && candidate.release_date.as_deref() == earliest_date;
        let score = score_code_candidate(candidate, earliest, config);

        let better = match best {
            None => true,
            Some((current, top)) => match score.partial_cmp(&top) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => {
                    compare_release(candidate.release_date.as_deref(), current.release_date.as_deref())
                        == Ordering::Less
                }
                _ => false,
            },
        };
        if better {
            best = Some((candidate, score));
        }
    }

    best.filter(|(_, score)| *score >= config.min_isrc_score)
        .map(|(candidate, _)| candidate)
}

/// Known dates sort before unknown ones.
fn compare_release(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn candidate(id: &str, name: &str, artists: &[&str]) -> CatalogCandidate {
        CatalogCandidate {
            track_id: id.to_string(),
            name: name.to_string(),
            artists: strings(artists),
            ..CatalogCandidate::default()
        }
    }

    #[test]
    fn test_normalize_title_strips_annotations() {
        assert_eq!(normalize_title("Shape of You"), "shape of you");
        assert_eq!(normalize_title("Stay (feat. Justin Bieber)"), "stay");
        assert_eq!(normalize_title("Stay ft. Justin Bieber"), "stay");
        assert_eq!(normalize_title("Yesterday - Remastered 2009"), "yesterday");
        assert_eq!(normalize_title("Song [Live at Wembley]"), "song");
        assert_eq!(normalize_title("Don't Stop Me Now"), "don t stop me now");
        assert_eq!(normalize_title("(Intro)"), "");
    }

    #[test]
    fn test_normalize_title_keeps_with_in_title() {
        assert_eq!(normalize_title("Stay With Me"), "stay with me");
        assert_eq!(normalize_title("With or Without You"), "with or without you");
        assert_eq!(normalize_title("Stay With Me (with Mary J. Blige)"), "stay with me");
        assert_eq!(normalize_title("Lovers - with Sam Smith"), "lovers");
    }

    #[test]
    fn test_is_variant() {
        assert!(is_variant("Yesterday - Live At The BBC"));
        assert!(is_variant("Blinding Lights (Acoustic)"));
        assert!(is_variant("Hello - Karaoke Version"));
        assert!(!is_variant("Yesterday - Remastered 2009"));
        assert!(!is_variant("Alive"));
    }

    #[test]
    fn test_token_overlap() {
        let a = strings(&["shape", "of", "you"]);
        assert_eq!(token_overlap(&a, &a), 1.0);
        assert_eq!(token_overlap(&a, &[]), 0.0);

        let b = strings(&["shape", "of", "me"]);
        let overlap = token_overlap(&a, &b);
        assert!(overlap > 0.6 && overlap < 0.7);
    }

    #[test]
    fn test_search_terms_uses_primary_artist() {
        let artists = strings(&["Ed Sheeran", "Someone Else"]);
        let query = MetadataQuery {
            name: "Perfect (feat. Beyoncé)",
            artists: &artists,
            duration_ms: None,
            isrc: None,
        };
        assert_eq!(search_terms(&query), "perfect Ed Sheeran");
    }

    #[test]
    fn test_compilation_loses_to_original_album() {
        let config = MatchingConfig::default();
        let compilation = CatalogCandidate {
            album_name: Some("Now That's What I Call Music 42".to_string()),
            album_artists: strings(&["Various Artists"]),
            album_type: Some("compilation".to_string()),
            is_compilation: true,
            release_date: Some("1999-03-01".to_string()),
            ..candidate("comp", "Song", &["Band"])
        };
        let original = CatalogCandidate {
            album_name: Some("Debut".to_string()),
            album_artists: strings(&["Band"]),
            album_type: Some("album".to_string()),
            release_date: Some("2001-05-01".to_string()),
            ..candidate("orig", "Song", &["Band"])
        };

        let candidates = vec![compilation, original];
        let picked = pick_code_candidate(&candidates, &config).unwrap();
        assert_eq!(picked.track_id, "orig");
    }

    #[test]
    fn test_code_tie_prefers_earliest_release() {
        let config = MatchingConfig::default().with_min_isrc_score(f64::MIN);
        let reissue = CatalogCandidate {
            release_date: Some("2015".to_string()),
            ..candidate("reissue", "Song", &["Band"])
        };
        let first = CatalogCandidate {
            release_date: Some("1984-06-01".to_string()),
            ..candidate("first", "Song", &["Band"])
        };

        let candidates = vec![reissue, first];
        assert_eq!(pick_code_candidate(&candidates, &config).unwrap().track_id, "first");
    }

    #[test]
    fn test_code_tie_without_dates_keeps_response_order() {
        let config = MatchingConfig::default();
        let candidates = vec![candidate("a", "Song", &["Band"]), candidate("b", "Song", &["Band"])];
        assert_eq!(pick_code_candidate(&candidates, &config).unwrap().track_id, "a");
    }

    #[test]
    fn test_code_candidate_below_minimum_is_rejected() {
        let config = MatchingConfig::default();
        let compilation = CatalogCandidate {
            album_artists: strings(&["Various Artists"]),
            is_compilation: true,
            ..candidate("comp", "Song (Live)", &["Band"])
        };
        assert!(pick_code_candidate(&[compilation], &config).is_none());
        assert!(pick_code_candidate(&[], &config).is_none());
    }

    #[test]
    fn test_metadata_prefers_close_duration_and_non_variant() {
        let config = MatchingConfig::default();
        let artists = strings(&["Queen"]);
        let query = MetadataQuery {
            name: "Bohemian Rhapsody",
            artists: &artists,
            duration_ms: Some(354_000),
            isrc: None,
        };

        let live = CatalogCandidate {
            duration_ms: Some(354_500),
            ..candidate("live", "Bohemian Rhapsody - Live Aid", &["Queen"])
        };
        let studio = CatalogCandidate {
            duration_ms: Some(355_000),
            ..candidate("studio", "Bohemian Rhapsody - Remastered 2011", &["Queen"])
        };

        let candidates = vec![live, studio];
        let picked = pick_metadata_candidate(&query, &candidates, &config).unwrap();
        assert_eq!(picked.track_id, "studio");
    }

    #[test]
    fn test_metadata_rejects_unrelated_results() {
        let config = MatchingConfig::default();
        let artists = strings(&["Queen"]);
        let query = MetadataQuery {
            name: "Bohemian Rhapsody",
            artists: &artists,
            duration_ms: Some(354_000),
            isrc: None,
        };

        let candidates = vec![candidate("x", "Radio Ga Ga", &["Someone"])];
        assert!(pick_metadata_candidate(&query, &candidates, &config).is_none());
    }

    #[test]
    fn test_metadata_isrc_bonus_breaks_near_ties() {
        let config = MatchingConfig::default();
        let artists = strings(&["Band"]);
        let query = MetadataQuery {
            name: "Song",
            artists: &artists,
            duration_ms: None,
            isrc: Some("GBAYE0000001"),
        };

        let plain = candidate("plain", "Song", &["Band"]);
        let tagged = CatalogCandidate {
            isrc: Some("gbaye0000001".to_string()),
            ..candidate("tagged", "Song", &["Band"])
        };

        let candidates = vec![plain, tagged];
        let picked = pick_metadata_candidate(&query, &candidates, &config).unwrap();
        assert_eq!(picked.track_id, "tagged");
    }

    #[test]
    fn test_duration_closeness_bounds() {
        assert_eq!(duration_closeness(Some(1000), Some(1000), 5000), 1.0);
        assert_eq!(duration_closeness(Some(1000), Some(9000), 5000), 0.0);
        assert_eq!(duration_closeness(None, Some(1000), 5000), 0.0);
        assert_eq!(duration_closeness(Some(0), Some(1000), 5000), 0.0);
    }
}
