//! # Provider Capability
//!
//! The operations every streaming-service adapter offers to the transfer
//! engine, plus the service-neutral types they exchange.
//!
//! Adapters are created per job with the user's credential (see
//! [`ProviderFactory`](crate::registry::ProviderFactory)) and are free to
//! cache per-instance state such as a resolved storefront.

use crate::error::ProviderError;
use async_trait::async_trait;
use core_auth::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Track as read from a source playlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferTrack {
    /// Provider-specific id (Spotify URI, Apple library id, SoundCloud id)
    pub id: String,
    pub name: String,
    /// Ordered, primary artist first
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub duration_ms: Option<u64>,
    /// Untouched upstream payload
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl TransferTrack {
    /// ISRC with surrounding whitespace removed; blank counts as missing.
    pub fn normalized_isrc(&self) -> Option<&str> {
        self.isrc
            .as_deref()
            .map(str::trim)
            .filter(|isrc| !isrc.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourcePlaylist {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,
    /// In playlist order
    pub tracks: Vec<TransferTrack>,
}

/// A destination catalog track chosen for a source track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Id accepted by [`TransferProvider::add_tracks`]
    pub provider_track_id: String,
    pub isrc: Option<String>,
    pub upc: Option<String>,
    pub name: Option<String>,
    pub artists: Vec<String>,
}

/// Inputs of a metadata search.
#[derive(Debug, Clone, Copy)]
pub struct MetadataQuery<'a> {
    pub name: &'a str,
    pub artists: &'a [String],
    pub duration_ms: Option<u64>,
    /// ISRC of the source track, used as a scoring bonus only
    pub isrc: Option<&'a str>,
}

impl<'a> MetadataQuery<'a> {
    pub fn from_track(track: &'a TransferTrack) -> Self {
        Self {
            name: &track.name,
            artists: &track.artists,
            duration_ms: track.duration_ms,
            isrc: track.normalized_isrc(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsurePlaylistRequest {
    /// Existing playlist to verify; `None` creates a new one
    pub playlist_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistResolution {
    pub playlist_id: String,
    pub name: String,
    /// Whether the playlist was created by this call
    pub created: bool,
}

/// Capability set of one streaming service.
///
/// Error contract:
/// - HTTP 401/403 or a missing token → [`ProviderError::Authorization`]
/// - other non-success responses → [`ProviderError::Upstream`]
/// - network failures → [`ProviderError::Transport`]
/// - unparseable items are skipped with a warning; [`ProviderError::MalformedData`]
///   only when nothing usable can be produced
#[async_trait]
pub trait TransferProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Reads a playlist with all of its tracks, following pagination.
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<SourcePlaylist>;

    /// Exact lookup by ISRC. Codes without an acceptable candidate are absent
    /// from the map.
    async fn match_tracks_by_isrc(
        &self,
        isrcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>>;

    /// Exact lookup by UPC, same contract as the ISRC lookup.
    async fn match_tracks_by_upc(
        &self,
        upcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>>;

    /// Best text-search candidate above the acceptance threshold.
    async fn match_by_metadata(
        &self,
        query: &MetadataQuery<'_>,
    ) -> ProviderResult<Option<MatchResult>>;

    /// Verifies the given playlist or creates a new one.
    async fn ensure_playlist(
        &self,
        request: &EnsurePlaylistRequest,
    ) -> ProviderResult<PlaylistResolution>;

    /// Appends tracks in order, skipping ids already in the playlist.
    /// Returns the number of tracks actually appended.
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> ProviderResult<usize>;
}

/// Removes ids already present (or repeated within `track_ids`) while
/// keeping the order of the rest.
pub fn dedupe_against<'a, I>(existing: I, track_ids: &[String]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: std::collections::HashSet<&str> = existing.into_iter().collect();
    track_ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_isrc() {
        let mut track = TransferTrack {
            isrc: Some("  USUM71703861 ".to_string()),
            ..TransferTrack::default()
        };
        assert_eq!(track.normalized_isrc(), Some("USUM71703861"));

        track.isrc = Some("   ".to_string());
        assert_eq!(track.normalized_isrc(), None);

        track.isrc = None;
        assert_eq!(track.normalized_isrc(), None);
    }

    #[test]
    fn test_dedupe_against_keeps_order() {
        let existing = ["b".to_string()];
        let ids: Vec<String> = ["a", "b", "c", "a", "d"].iter().map(|s| s.to_string()).collect();

        let fresh = dedupe_against(existing.iter().map(String::as_str), &ids);
        assert_eq!(fresh, vec!["a", "c", "d"]);
    }
}
