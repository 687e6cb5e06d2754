//! # Track Reconciler
//!
//! Maps the tracks of a source playlist onto ids in the destination catalog.
//!
//! 1. Tracks are split into those with an ISRC and those without.
//! 2. The unique ISRCs are resolved in one exact lookup, unless the source
//!    service is known to carry unreliable ISRC data.
//! 3. Every track still unmatched goes through a metadata search. Lookups
//!    fan out with bounded concurrency and are merged back by index.
//! 4. Whatever is left is reported as unmatched.
//!
//! The output keeps source order: it is exactly the matched subset of the
//! source playlist.

use crate::error::ProviderError;
use crate::job::{MatchingStats, TrackSample};
use crate::provider::{MatchResult, MetadataQuery, ProviderResult, TransferProvider, TransferTrack};
use core_runtime::config::MatchingConfig;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Result of reconciling one source playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationOutcome {
    /// Destination ids in source order
    pub track_ids: Vec<String>,
    /// Unique ISRCs sent to the exact lookup
    pub requested: u64,
    pub exact_matches: u64,
    pub fallback_matches: u64,
    pub missing_isrc_count: u64,
    pub unmatched_count: u64,
    /// Capped samples of tracks without an ISRC
    pub missing_isrc: Vec<TrackSample>,
    /// Capped samples of tracks with no destination match
    pub unmatched: Vec<TrackSample>,
}

impl ReconciliationOutcome {
    pub fn matched(&self) -> u64 {
        self.exact_matches + self.fallback_matches
    }

    pub fn stats(&self) -> MatchingStats {
        MatchingStats {
            requested: self.requested,
            matched: self.matched(),
            unmatched: self.unmatched_count,
            missing_isrc: self.missing_isrc_count,
        }
    }
}

pub struct Reconciler<'a> {
    target: &'a dyn TransferProvider,
    config: &'a MatchingConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(target: &'a dyn TransferProvider, config: &'a MatchingConfig) -> Self {
        Self { target, config }
    }

    /// Resolves `tracks` against the target catalog.
    ///
    /// `source_isrc_reliable` is false for services whose ISRC data cannot
    /// be trusted; the exact pass is then skipped entirely.
    ///
    /// # Errors
    ///
    /// Fails when the exact lookup fails with anything but malformed data, or
    /// when a fallback lookup reports an authorization error. Any other
    /// fallback error only marks that one track as unmatched.
    pub async fn reconcile(
        &self,
        tracks: &[TransferTrack],
        source_isrc_reliable: bool,
    ) -> ProviderResult<ReconciliationOutcome> {
        let mut outcome = ReconciliationOutcome::default();
        let mut resolved: Vec<Option<MatchResult>> = vec![None; tracks.len()];

        let mut unique_isrcs = Vec::new();
        let mut seen = HashSet::new();
        for track in tracks {
            match track.normalized_isrc() {
                Some(isrc) => {
                    if seen.insert(isrc) {
                        unique_isrcs.push(isrc.to_string());
                    }
                }
                None => {
                    outcome.missing_isrc_count += 1;
                    self.push_sample(&mut outcome.missing_isrc, track);
                }
            }
        }

        if source_isrc_reliable && !unique_isrcs.is_empty() {
            outcome.requested = unique_isrcs.len() as u64;
            match self.target.match_tracks_by_isrc(&unique_isrcs).await {
                Ok(by_isrc) => {
                    outcome.exact_matches = self.apply_exact(tracks, &by_isrc, &mut resolved);
                    debug!(
                        requested = outcome.requested,
                        matched = outcome.exact_matches,
                        "Exact ISRC pass finished"
                    );
                }
                // Unusable catalog data: every track goes to the metadata search.
                Err(e @ ProviderError::MalformedData { .. }) => {
                    warn!(error = %e, "Exact ISRC pass returned unusable data, falling back to metadata");
                }
                Err(e) => return Err(e),
            }
        } else if !unique_isrcs.is_empty() {
            debug!(
                provider = %self.target.kind(),
                "Source ISRC data is unreliable, skipping exact pass"
            );
        }

        outcome.fallback_matches = self.fallback(tracks, &mut resolved).await?;

        for (track, matched) in tracks.iter().zip(resolved) {
            match matched {
                Some(result) => outcome.track_ids.push(result.provider_track_id),
                None => {
                    outcome.unmatched_count += 1;
                    self.push_sample(&mut outcome.unmatched, track);
                }
            }
        }

        Ok(outcome)
    }

    fn apply_exact(
        &self,
        tracks: &[TransferTrack],
        by_isrc: &HashMap<String, MatchResult>,
        resolved: &mut [Option<MatchResult>],
    ) -> u64 {
        let mut matched = 0;
        for (slot, track) in resolved.iter_mut().zip(tracks) {
            let hit = track
                .normalized_isrc()
                .and_then(|isrc| by_isrc.get(isrc))
                .filter(|result| !result.provider_track_id.is_empty());
            if let Some(result) = hit {
                *slot = Some(result.clone());
                matched += 1;
            }
        }
        matched
    }

    async fn fallback(
        &self,
        tracks: &[TransferTrack],
        resolved: &mut [Option<MatchResult>],
    ) -> ProviderResult<u64> {
        let pending: Vec<(usize, &TransferTrack)> = tracks
            .iter()
            .enumerate()
            .filter(|(idx, track)| resolved[*idx].is_none() && !track.name.trim().is_empty())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        debug!(pending = pending.len(), "Starting metadata fallback");

        let target = self.target;
        let mut lookups = stream::iter(pending)
            .map(|(idx, track)| async move {
                let query = MetadataQuery::from_track(track);
                (idx, target.match_by_metadata(&query).await)
            })
            .buffered(self.config.metadata_concurrency.max(1))
            .boxed();

        let mut matched = 0;
        while let Some((idx, result)) = lookups.next().await {
            match result {
                Ok(Some(hit)) if !hit.provider_track_id.is_empty() => {
                    resolved[idx] = Some(hit);
                    matched += 1;
                }
                Ok(_) => {}
                Err(e @ ProviderError::Authorization { .. }) => return Err(e),
                Err(e) => {
                    warn!(
                        track = %tracks[idx].name,
                        error = %e,
                        "Metadata lookup failed, leaving track unmatched"
                    );
                }
            }
        }

        Ok(matched)
    }

    fn push_sample(&self, samples: &mut Vec<TrackSample>, track: &TransferTrack) {
        if samples.len() < self.config.max_unmatched_samples {
            samples.push(TrackSample {
                name: track.name.clone(),
                artists: track.artists.clone(),
                isrc: track.normalized_isrc().map(str::to_string),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EnsurePlaylistRequest, PlaylistResolution, SourcePlaylist};
    use async_trait::async_trait;
    use core_auth::ProviderKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Catalog keyed by ISRC and by lowercase title.
    #[derive(Default)]
    struct FakeCatalog {
        by_isrc: HashMap<String, String>,
        by_title: HashMap<String, String>,
        failing_titles: HashSet<String>,
        deny_metadata: bool,
        malformed_isrc_lookup: bool,
        isrc_calls: Mutex<Vec<Vec<String>>>,
        metadata_calls: AtomicUsize,
    }

    #[async_trait]
    impl TransferProvider for FakeCatalog {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Spotify
        }

        async fn get_playlist(&self, _playlist_id: &str) -> ProviderResult<SourcePlaylist> {
            unimplemented!("not used by the reconciler")
        }

        async fn match_tracks_by_isrc(
            &self,
            isrcs: &[String],
        ) -> ProviderResult<HashMap<String, MatchResult>> {
            self.isrc_calls.lock().unwrap().push(isrcs.to_vec());
            if self.malformed_isrc_lookup {
                return Err(ProviderError::MalformedData {
                    provider: ProviderKind::Spotify,
                    operation: "isrc lookup".to_string(),
                    reason: "missing field `name`".to_string(),
                });
            }
            Ok(isrcs
                .iter()
                .filter_map(|code| {
                    self.by_isrc.get(code).map(|id| {
                        (
                            code.clone(),
                            MatchResult {
                                provider_track_id: id.clone(),
                                isrc: Some(code.clone()),
                                ..MatchResult::default()
                            },
                        )
                    })
                })
                .collect())
        }

        async fn match_tracks_by_upc(
            &self,
            _upcs: &[String],
        ) -> ProviderResult<HashMap<String, MatchResult>> {
            Ok(HashMap::new())
        }

        async fn match_by_metadata(
            &self,
            query: &MetadataQuery<'_>,
        ) -> ProviderResult<Option<MatchResult>> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            if self.deny_metadata {
                return Err(ProviderError::Authorization {
                    provider: ProviderKind::Spotify,
                    reason: "HTTP 401".to_string(),
                });
            }
            let title = query.name.to_lowercase();
            if self.failing_titles.contains(&title) {
                return Err(ProviderError::Upstream {
                    provider: ProviderKind::Spotify,
                    operation: "search".to_string(),
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            Ok(self.by_title.get(&title).map(|id| MatchResult {
                provider_track_id: id.clone(),
                ..MatchResult::default()
            }))
        }

        async fn ensure_playlist(
            &self,
            _request: &EnsurePlaylistRequest,
        ) -> ProviderResult<PlaylistResolution> {
            unimplemented!("not used by the reconciler")
        }

        async fn add_tracks(&self, _playlist_id: &str, _track_ids: &[String]) -> ProviderResult<usize> {
            unimplemented!("not used by the reconciler")
        }
    }

    fn track(name: &str, isrc: Option<&str>) -> TransferTrack {
        TransferTrack {
            id: format!("src:{}", name),
            name: name.to_string(),
            artists: vec!["Artist".to_string()],
            isrc: isrc.map(str::to_string),
            ..TransferTrack::default()
        }
    }

    fn catalog() -> FakeCatalog {
        let mut catalog = FakeCatalog::default();
        catalog.by_isrc.insert("ISRC-A".to_string(), "dst:a".to_string());
        catalog.by_isrc.insert("ISRC-C".to_string(), "dst:c".to_string());
        catalog.by_title.insert("b".to_string(), "dst:b".to_string());
        catalog.by_title.insert("d".to_string(), "dst:d".to_string());
        catalog
    }

    #[tokio::test]
    async fn test_output_is_matched_subset_in_source_order() {
        let catalog = catalog();
        let config = MatchingConfig::default();
        let tracks = vec![
            track("A", Some("ISRC-A")),
            track("B", None),
            track("X", None),
            track("C", Some(" ISRC-C ")),
            track("D", Some("ISRC-UNKNOWN")),
        ];

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap();

        assert_eq!(outcome.track_ids, vec!["dst:a", "dst:b", "dst:c", "dst:d"]);
        assert_eq!(outcome.requested, 3);
        assert_eq!(outcome.exact_matches, 2);
        assert_eq!(outcome.fallback_matches, 2);
        assert_eq!(outcome.missing_isrc_count, 2);
        assert_eq!(outcome.unmatched_count, 1);
        assert_eq!(outcome.unmatched[0].name, "X");
        assert_eq!(catalog.metadata_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_duplicate_isrcs_are_requested_once() {
        let catalog = catalog();
        let config = MatchingConfig::default();
        let tracks = vec![track("A", Some("ISRC-A")), track("A again", Some("ISRC-A"))];

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap();

        let calls = catalog.isrc_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["ISRC-A".to_string()]);
        assert_eq!(outcome.track_ids, vec!["dst:a", "dst:a"]);
    }

    #[tokio::test]
    async fn test_unreliable_source_skips_exact_pass() {
        let catalog = catalog();
        let config = MatchingConfig::default();
        let tracks = vec![track("A", Some("ISRC-A")), track("B", None)];

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, false)
            .await
            .unwrap();

        assert!(catalog.isrc_calls.lock().unwrap().is_empty());
        assert_eq!(outcome.requested, 0);
        assert_eq!(outcome.exact_matches, 0);
        // "a" is not in the title index, only in the ISRC index
        assert_eq!(outcome.track_ids, vec!["dst:b"]);
        assert_eq!(outcome.unmatched_count, 1);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_per_track() {
        let mut catalog = catalog();
        catalog.failing_titles.insert("b".to_string());
        let config = MatchingConfig::default();
        let tracks = vec![track("B", None), track("D", None)];

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap();

        assert_eq!(outcome.track_ids, vec!["dst:d"]);
        assert_eq!(outcome.unmatched_count, 1);
    }

    #[tokio::test]
    async fn test_fallback_authorization_aborts() {
        let mut catalog = catalog();
        catalog.deny_metadata = true;
        let config = MatchingConfig::default();
        let tracks = vec![track("B", None)];

        let err = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }

    #[tokio::test]
    async fn test_malformed_exact_lookup_falls_back_to_metadata() {
        let mut catalog = catalog();
        catalog.malformed_isrc_lookup = true;
        catalog.by_title.insert("a".to_string(), "dst:a-by-title".to_string());
        let config = MatchingConfig::default();
        let tracks = vec![track("A", Some("ISRC-A")), track("B", None)];

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap();

        assert_eq!(catalog.isrc_calls.lock().unwrap().len(), 1);
        assert_eq!(outcome.exact_matches, 0);
        assert_eq!(outcome.fallback_matches, 2);
        assert_eq!(outcome.track_ids, vec!["dst:a-by-title", "dst:b"]);
    }

    #[tokio::test]
    async fn test_samples_are_capped() {
        let catalog = FakeCatalog::default();
        let config = MatchingConfig::default().with_max_unmatched_samples(2);
        let tracks: Vec<_> = (0..5).map(|i| track(&format!("t{}", i), None)).collect();

        let outcome = Reconciler::new(&catalog, &config)
            .reconcile(&tracks, true)
            .await
            .unwrap();

        assert_eq!(outcome.unmatched_count, 5);
        assert_eq!(outcome.unmatched.len(), 2);
        assert_eq!(outcome.missing_isrc_count, 5);
        assert_eq!(outcome.missing_isrc.len(), 2);
        assert!(outcome.track_ids.is_empty());
    }
}
