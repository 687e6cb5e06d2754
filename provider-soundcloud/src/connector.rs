//! SoundCloud API connector

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_auth::ProviderKind;
use core_runtime::config::MatchingConfig;
use core_transfer::matching::{pick_code_candidate, pick_metadata_candidate, search_terms};
use core_transfer::provider::dedupe_against;
use core_transfer::{
    CatalogCandidate, EnsurePlaylistRequest, MatchResult, MetadataQuery, PlaylistResolution,
    ProviderResult, SourcePlaylist, TransferProvider, TransferTrack,
};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SoundCloudError};
use crate::types::{
    Collection, PlaylistBody, PlaylistEnvelope, ScPlaylist, ScTrack, TrackListing, TrackUrn,
};

const SOUNDCLOUD_API_BASE: &str = "https://api.soundcloud.com";

/// Page size for playlist track reads
const PAGE_LIMIT: u32 = 200;

/// Results requested per exact-code search
const CODE_SEARCH_LIMIT: u32 = 10;

const ERROR_BODY_LIMIT: usize = 512;

/// SoundCloud API connector
///
/// Authenticates with `Authorization: OAuth {token}`. Track ids are the
/// numeric SoundCloud ids rendered as strings.
pub struct SoundCloudConnector {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    matching: MatchingConfig,
    request_timeout: Option<Duration>,
    retry_policy: RetryPolicy,
}

impl SoundCloudConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
            matching: MatchingConfig::default(),
            request_timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    async fn send(&self, operation: &'static str, request: HttpRequest) -> Result<HttpResponse> {
        let request = request
            .header("Authorization", format!("OAuth {}", self.access_token))
            .header("Accept", "application/json; charset=utf-8")
            .maybe_timeout(self.request_timeout);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let retries_left = attempt < self.retry_policy.max_attempts;

            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.is_unauthorized() => {
                    warn!(status = response.status, operation, "SoundCloud rejected the token");
                    return Err(SoundCloudError::AuthenticationFailed {
                        operation,
                        status_code: response.status,
                    });
                }
                Ok(response) if response.is_retryable() && retries_left => {
                    let delay = response
                        .header("Retry-After")
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .map(|secs| Duration::from_secs(secs).min(self.retry_policy.max_delay))
                        .unwrap_or_else(|| self.retry_policy.delay_for_attempt(attempt));
                    warn!(status = response.status, attempt, "SoundCloud request failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    return Err(SoundCloudError::ApiError {
                        operation,
                        status_code: response.status,
                        message: response.body_snippet(ERROR_BODY_LIMIT),
                    })
                }
                Err(e) if e.is_transient() && retries_left => {
                    warn!(error = %e, attempt, "SoundCloud request did not complete, retrying");
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                }
                Err(e) => {
                    return Err(SoundCloudError::NetworkError {
                        operation,
                        message: e.to_string(),
                    })
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &'static str, url: &str) -> Result<T> {
        let response = self.send(operation, HttpRequest::get(url)).await?;
        parse(operation, &response)
    }

    async fn fetch_playlist(&self, operation: &'static str, id: &str) -> Result<ScPlaylist> {
        let url = format!("{}/playlists/{}", SOUNDCLOUD_API_BASE, urlencoding::encode(id));
        self.get_json(operation, &url).await
    }

    /// All raw track entries of a playlist, following `next_href`.
    async fn playlist_items(
        &self,
        operation: &'static str,
        id: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mut items = Vec::new();
        let mut next = Some(format!(
            "{}/playlists/{}/tracks?linked_partitioning=true&limit={}",
            SOUNDCLOUD_API_BASE,
            urlencoding::encode(id),
            PAGE_LIMIT
        ));

        while let Some(url) = next.take() {
            let page: Collection<serde_json::Value> = self.get_json(operation, &url).await?;
            items.extend(page.collection);
            next = page.next_href.filter(|href| !href.is_empty());
        }
        Ok(items)
    }

    /// `GET /tracks` with the given query parameters (already encoded).
    async fn search(&self, operation: &'static str, params: &str, limit: u32) -> Result<Vec<ScTrack>> {
        let url = format!(
            "{}/tracks?linked_partitioning=1&limit={}&{}",
            SOUNDCLOUD_API_BASE, limit, params
        );
        let listing: TrackListing<serde_json::Value> = self.get_json(operation, &url).await?;
        Ok(listing
            .into_items()
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<ScTrack>(raw).ok())
            .collect())
    }

    fn pick(&self, tracks: &[ScTrack]) -> Option<MatchResult> {
        let candidates: Vec<CatalogCandidate> = tracks.iter().map(to_candidate).collect();
        pick_code_candidate(&candidates, &self.matching).map(CatalogCandidate::to_match_result)
    }
}

#[async_trait]
impl TransferProvider for SoundCloudConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SoundCloud
    }

    #[instrument(skip(self))]
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<SourcePlaylist> {
        let id = playlist_id_from(playlist_id);
        let playlist = self.fetch_playlist("get_playlist", id).await?;
        let items = self.playlist_items("get_playlist", id).await?;

        let total = items.len();
        let tracks: Vec<TransferTrack> = items.into_iter().filter_map(to_transfer_track).collect();
        if tracks.len() < total {
            warn!(playlist_id = id, skipped = total - tracks.len(), "Skipped unusable SoundCloud tracks");
        }
        info!(playlist_id = id, tracks = tracks.len(), "Read SoundCloud playlist");

        Ok(SourcePlaylist {
            id: playlist
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| id.to_string()),
            name: playlist.title,
            description: playlist.description.filter(|d| !d.trim().is_empty()),
            public: playlist.sharing.map(|sharing| sharing == "public"),
            tracks,
        })
    }

    #[instrument(skip(self, isrcs), fields(count = isrcs.len()))]
    async fn match_tracks_by_isrc(
        &self,
        isrcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        let mut matches = HashMap::new();

        for code in unique_codes(isrcs) {
            let encoded = urlencoding::encode(code);
            let mut found: Vec<ScTrack> = self
                .search(
                    "match_tracks_by_isrc",
                    &format!("filter=public&isrc={}", encoded),
                    CODE_SEARCH_LIMIT,
                )
                .await?
                .into_iter()
                .filter(|track| publisher_field(track, |m| m.isrc.as_deref(), code))
                .collect();

            if found.is_empty() {
                found = self
                    .search("match_tracks_by_isrc", &format!("q={}", encoded), CODE_SEARCH_LIMIT)
                    .await?
                    .into_iter()
                    .filter(|track| publisher_field(track, |m| m.isrc.as_deref(), code))
                    .collect();
            }

            if let Some(mut result) = self.pick(&found) {
                result.isrc = Some(code.to_string());
                matches.insert(code.to_string(), result);
            } else {
                debug!(isrc = code, "No SoundCloud track carries this ISRC");
            }
        }

        Ok(matches)
    }

    #[instrument(skip(self, upcs), fields(count = upcs.len()))]
    async fn match_tracks_by_upc(
        &self,
        upcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        let mut matches = HashMap::new();

        for code in unique_codes(upcs) {
            let found: Vec<ScTrack> = self
                .search(
                    "match_tracks_by_upc",
                    &format!("q={}", urlencoding::encode(code)),
                    CODE_SEARCH_LIMIT,
                )
                .await?
                .into_iter()
                .filter(|track| publisher_field(track, |m| m.upc_or_ean.as_deref(), code))
                .collect();

            if let Some(result) = self.pick(&found) {
                matches.insert(code.to_string(), result);
            }
        }

        Ok(matches)
    }

    async fn match_by_metadata(
        &self,
        query: &MetadataQuery<'_>,
    ) -> ProviderResult<Option<MatchResult>> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(None);
        }

        let tracks = self
            .search(
                "match_by_metadata",
                &format!("q={}", urlencoding::encode(&terms)),
                self.matching.search_limit,
            )
            .await?;
        let candidates: Vec<CatalogCandidate> = tracks.iter().map(to_candidate).collect();

        Ok(pick_metadata_candidate(query, &candidates, &self.matching)
            .map(CatalogCandidate::to_match_result))
    }

    #[instrument(skip(self, request), fields(playlist_id = ?request.playlist_id))]
    async fn ensure_playlist(
        &self,
        request: &EnsurePlaylistRequest,
    ) -> ProviderResult<PlaylistResolution> {
        let existing = request
            .playlist_id
            .as_deref()
            .map(playlist_id_from)
            .filter(|id| !id.is_empty());

        if let Some(id) = existing {
            let playlist = self.fetch_playlist("ensure_playlist", id).await?;
            return Ok(PlaylistResolution {
                playlist_id: playlist
                    .id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| id.to_string()),
                name: if playlist.title.is_empty() {
                    request.name.clone()
                } else {
                    playlist.title
                },
                created: false,
            });
        }

        let body = PlaylistEnvelope {
            playlist: PlaylistBody {
                title: &request.name,
                description: request.description.as_deref().filter(|d| !d.trim().is_empty()),
                sharing: if request.public == Some(true) {
                    "public"
                } else {
                    "private"
                },
                tracks: Vec::new(),
            },
        };
        let http = HttpRequest::post(format!("{}/playlists", SOUNDCLOUD_API_BASE))
            .json(&body)
            .map_err(|e| SoundCloudError::ParseError {
                operation: "ensure_playlist",
                message: e.to_string(),
            })?;

        let response = self.send("ensure_playlist", http).await?;
        let created: ScPlaylist = parse("ensure_playlist", &response)?;
        let playlist_id = created
            .id
            .map(|id| id.to_string())
            .ok_or(SoundCloudError::MissingField {
                operation: "ensure_playlist",
                field: "id",
            })?;

        info!(playlist_id = %playlist_id, "Created SoundCloud playlist");
        Ok(PlaylistResolution {
            playlist_id,
            name: if created.title.is_empty() {
                request.name.clone()
            } else {
                created.title
            },
            created: true,
        })
    }

    #[instrument(skip(self, track_ids), fields(requested = track_ids.len()))]
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> ProviderResult<usize> {
        let id = playlist_id_from(playlist_id);
        let playlist = self.fetch_playlist("add_tracks", id).await?;
        let existing: Vec<String> = self
            .playlist_items("add_tracks", id)
            .await?
            .iter()
            .filter_map(|item| item.get("id").and_then(serde_json::Value::as_u64))
            .map(|id| id.to_string())
            .collect();

        let wanted: Vec<String> = track_ids
            .iter()
            .map(|track_id| track_id_from(track_id).to_string())
            .filter(|track_id| !track_id.is_empty())
            .collect();
        let fresh = dedupe_against(existing.iter().map(String::as_str), &wanted);
        if fresh.is_empty() {
            debug!(playlist_id = id, "All tracks already present in SoundCloud playlist");
            return Ok(0);
        }

        let tracks = existing
            .iter()
            .chain(fresh.iter())
            .map(|track_id| TrackUrn {
                urn: format!("soundcloud:tracks:{}", track_id),
            })
            .collect();
        let body = PlaylistEnvelope {
            playlist: PlaylistBody {
                title: &playlist.title,
                description: playlist.description.as_deref(),
                sharing: playlist.sharing.as_deref().unwrap_or("private"),
                tracks,
            },
        };
        let http = HttpRequest::put(format!(
            "{}/playlists/{}",
            SOUNDCLOUD_API_BASE,
            urlencoding::encode(id)
        ))
        .json(&body)
        .map_err(|e| SoundCloudError::ParseError {
            operation: "add_tracks",
            message: e.to_string(),
        })?;
        self.send("add_tracks", http).await?;

        info!(
            playlist_id = id,
            appended = fresh.len(),
            total = existing.len() + fresh.len(),
            "Rewrote SoundCloud playlist track list"
        );
        Ok(fresh.len())
    }
}

fn parse<T: DeserializeOwned>(operation: &'static str, response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| SoundCloudError::ParseError {
        operation,
        message: e.to_string(),
    })
}

/// Accepts numeric ids and `soundcloud:playlists:` URNs.
fn playlist_id_from(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed
        .strip_prefix("soundcloud:playlists:")
        .unwrap_or(trimmed)
}

fn track_id_from(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.strip_prefix("soundcloud:tracks:").unwrap_or(trimmed)
}

fn unique_codes(codes: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty() && seen.insert(code.to_ascii_uppercase()))
        .collect()
}

fn publisher_field(
    track: &ScTrack,
    field: impl Fn(&crate::types::PublisherMetadata) -> Option<&str>,
    code: &str,
) -> bool {
    track
        .publisher_metadata
        .as_ref()
        .and_then(field)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(code))
}

/// Publisher artist first, then the uploader when it differs.
fn artists_of(track: &ScTrack) -> Vec<String> {
    let mut artists: Vec<String> = Vec::new();
    let publisher = track
        .publisher_metadata
        .as_ref()
        .and_then(|m| m.artist.as_deref());
    let uploader = track.user.as_ref().and_then(|u| u.username.as_deref());

    for name in [publisher, uploader].into_iter().flatten() {
        let name = name.trim();
        if !name.is_empty() && !artists.iter().any(|a| a.eq_ignore_ascii_case(name)) {
            artists.push(name.to_string());
        }
    }
    artists
}

fn release_title(track: &ScTrack) -> Option<String> {
    track.publisher_metadata.as_ref().and_then(|m| {
        m.release_title
            .clone()
            .or_else(|| m.album_title.clone())
            .filter(|title| !title.trim().is_empty())
    })
}

fn to_candidate(track: &ScTrack) -> CatalogCandidate {
    let metadata = track.publisher_metadata.clone().unwrap_or_default();
    let release_date = track
        .release_date
        .clone()
        .or_else(|| track.created_at.clone())
        .map(|date| date.chars().take(10).collect::<String>().replace('/', "-"));

    CatalogCandidate {
        track_id: track.id.map(|id| id.to_string()).unwrap_or_default(),
        name: track.title.clone(),
        artists: artists_of(track),
        album_name: release_title(track),
        album_artists: metadata.artist.clone().into_iter().collect(),
        album_type: None,
        is_compilation: false,
        release_date,
        isrc: metadata.isrc,
        upc: metadata.upc_or_ean,
        duration_ms: track.duration,
        same_artist_album: None,
    }
}

fn to_transfer_track(raw: serde_json::Value) -> Option<TransferTrack> {
    let track: ScTrack = match serde_json::from_value(raw.clone()) {
        Ok(track) => track,
        Err(e) => {
            warn!(error = %e, "Skipping unparseable SoundCloud track");
            return None;
        }
    };
    let id = track.id?;
    let metadata = track.publisher_metadata.clone().unwrap_or_default();

    Some(TransferTrack {
        id: id.to_string(),
        artists: artists_of(&track),
        album: release_title(&track),
        name: track.title,
        isrc: metadata.isrc,
        upc: metadata.upc_or_ean,
        duration_ms: track.duration,
        raw,
    })
}
