//! Spotify Web API connector
//!
//! Implements the `TransferProvider` trait against `https://api.spotify.com/v1`.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_auth::ProviderKind;
use core_runtime::config::MatchingConfig;
use core_transfer::matching::{normalize_title, pick_code_candidate, pick_metadata_candidate};
use core_transfer::provider::dedupe_against;
use core_transfer::{
    CatalogCandidate, EnsurePlaylistRequest, MatchResult, MetadataQuery, PlaylistResolution,
    ProviderResult, SourcePlaylist, TransferProvider, TransferTrack,
};
use serde::de::DeserializeOwned;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{
    AddTracksBody, CreatePlaylistBody, Paging, PlaylistItem, SearchResponse, SpotifyArtist,
    SpotifyPlaylist, SpotifyTrack, UriItem,
};

/// Spotify Web API base URL
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for playlist track reads (API maximum)
const PAGE_LIMIT: u32 = 100;

/// Results requested per `isrc:` / `upc:` search
const CODE_SEARCH_LIMIT: u32 = 5;

/// URIs per `POST /playlists/{id}/tracks` (API maximum)
const ADD_CHUNK_SIZE: usize = 100;

/// Bytes of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 512;

/// Spotify API connector
///
/// Implements `TransferProvider` for one user's access token.
///
/// # Features
///
/// - Playlist reads following `next` URLs until exhausted
/// - ISRC/UPC lookups through search filters, disambiguated by release quality
/// - Field-filtered (`track:` / `artist:`) metadata search
/// - Idempotent appends: URIs already in the playlist are skipped; the
///   playlist is read once per connector, not once per batch
/// - Retries on 429 (honouring `Retry-After`) and 5xx
///
/// # Example
///
/// ```ignore
/// use provider_spotify::SpotifyConnector;
/// use core_transfer::TransferProvider;
///
/// let connector = SpotifyConnector::new(http_client, access_token);
/// let playlist = connector.get_playlist("37i9dQZF1DXcBWIGoYBM5M").await?;
/// ```
pub struct SpotifyConnector {
    /// HTTP client for API requests
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token
    access_token: String,

    matching: MatchingConfig,
    request_timeout: Option<Duration>,
    retry_policy: RetryPolicy,

    /// URIs in each destination playlist, read on the first append and
    /// extended as batches are written
    playlist_uris: Mutex<HashMap<String, HashSet<String>>>,
}

impl SpotifyConnector {
    /// Create a new Spotify connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - OAuth 2.0 access token with `playlist-read-private`
    ///   and `playlist-modify-*` scopes
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
            matching: MatchingConfig::default(),
            request_timeout: None,
            retry_policy: RetryPolicy::default(),
            playlist_uris: Mutex::new(HashMap::new()),
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

    /// Execute an authorized request, retrying rate limits and server errors.
    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    async fn send(&self, operation: &'static str, request: HttpRequest) -> Result<HttpResponse> {
        let request = request
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json")
            .maybe_timeout(self.request_timeout);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    debug!(status = response.status, "Spotify request succeeded");
                    return Ok(response);
                }
                Ok(response) if response.is_unauthorized() => {
                    warn!(status = response.status, operation, "Spotify rejected the token");
                    return Err(SpotifyError::AuthenticationFailed {
                        operation,
                        status_code: response.status,
                    });
                }
                Ok(response)
                    if response.is_retryable() && attempt < self.retry_policy.max_attempts =>
                {
                    let delay = retry_after(&response)
                        .map(|wait| wait.min(self.retry_policy.max_delay))
                        .unwrap_or_else(|| self.retry_policy.delay_for_attempt(attempt));
                    warn!(
                        status = response.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Spotify request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    return Err(SpotifyError::ApiError {
                        operation,
                        status_code: response.status,
                        message: response.body_snippet(ERROR_BODY_LIMIT),
                    });
                }
                Err(e) if e.is_transient() && attempt < self.retry_policy.max_attempts => {
                    let delay = self.retry_policy.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, "Spotify request did not complete, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(SpotifyError::NetworkError {
                        operation,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &'static str, url: String) -> Result<T> {
        let response = self.send(operation, HttpRequest::get(url)).await?;
        parse(operation, &response)
    }

    async fn search_tracks(
        &self,
        operation: &'static str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SpotifyTrack>> {
        let url = format!(
            "{}/search?type=track&limit={}&q={}",
            SPOTIFY_API_BASE,
            limit,
            urlencoding::encode(query)
        );
        let response: SearchResponse = self.get_json(operation, url).await?;
        let items = response.tracks.map(|page| page.items).unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<SpotifyTrack>(raw) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!(operation, error = %e, "Skipping unparseable Spotify search result");
                    None
                }
            })
            .collect())
    }

    /// Exact lookups for `field:code` searches (`isrc` or `upc`).
    async fn match_codes(
        &self,
        operation: &'static str,
        field: &str,
        codes: &[String],
    ) -> Result<HashMap<String, MatchResult>> {
        let mut matches = HashMap::new();

        for code in unique_codes(codes) {
            let tracks = self
                .search_tracks(operation, &format!("{}:{}", field, code), CODE_SEARCH_LIMIT)
                .await?;
            let candidates: Vec<CatalogCandidate> = tracks
                .iter()
                .map(to_candidate)
                .filter(|candidate| field != "isrc" || isrc_agrees(candidate, code))
                .collect();

            match pick_code_candidate(&candidates, &self.matching) {
                Some(best) => {
                    let mut result = best.to_match_result();
                    if field == "isrc" {
                        result.isrc.get_or_insert_with(|| code.to_string());
                    } else {
                        result.upc.get_or_insert_with(|| code.to_string());
                    }
                    matches.insert(code.to_string(), result);
                }
                None => debug!(field, code, candidates = candidates.len(), "No acceptable Spotify candidate"),
            }
        }

        Ok(matches)
    }

    /// URIs currently in the playlist, following pagination.
    async fn existing_uris(&self, playlist_id: &str) -> Result<Vec<String>> {
        let mut uris = Vec::new();
        let mut next = Some(format!(
            "{}/playlists/{}/tracks?fields={}&limit={}&offset=0",
            SPOTIFY_API_BASE,
            urlencoding::encode(playlist_id),
            urlencoding::encode("items(track(uri)),next"),
            PAGE_LIMIT
        ));

        while let Some(url) = next.take() {
            let page: Paging<UriItem> = self.get_json("add_tracks", url).await?;
            uris.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|track| track.uri)),
            );
            next = page.next.filter(|url| !url.is_empty());
        }

        Ok(uris)
    }
}

#[async_trait]
impl TransferProvider for SpotifyConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Spotify
    }

    #[instrument(skip(self))]
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<SourcePlaylist> {
        let id = playlist_id_from(playlist_id);
        info!(playlist_id = id, "Reading Spotify playlist");

        let playlist: SpotifyPlaylist = self
            .get_json(
                "get_playlist",
                format!("{}/playlists/{}", SPOTIFY_API_BASE, urlencoding::encode(id)),
            )
            .await?;

        let mut tracks = Vec::new();
        let mut skipped = 0usize;
        let mut next = Some(format!(
            "{}/playlists/{}/tracks?limit={}&offset=0",
            SPOTIFY_API_BASE,
            urlencoding::encode(id),
            PAGE_LIMIT
        ));

        while let Some(url) = next.take() {
            let page: Paging<PlaylistItem> = self.get_json("get_playlist", url).await?;
            for item in page.items {
                match to_transfer_track(item.track) {
                    Some(track) => tracks.push(track),
                    None => skipped += 1,
                }
            }
            next = page.next.filter(|url| !url.is_empty());
        }

        if skipped > 0 {
            warn!(playlist_id = id, skipped, "Skipped unusable Spotify playlist items");
        }
        info!(playlist_id = id, tracks = tracks.len(), "Read Spotify playlist");

        Ok(SourcePlaylist {
            id: playlist.id.unwrap_or_else(|| id.to_string()),
            name: playlist.name,
            description: playlist.description.filter(|d| !d.trim().is_empty()),
            public: playlist.public,
            tracks,
        })
    }

    #[instrument(skip(self, isrcs), fields(count = isrcs.len()))]
    async fn match_tracks_by_isrc(
        &self,
        isrcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        Ok(self.match_codes("match_tracks_by_isrc", "isrc", isrcs).await?)
    }

    #[instrument(skip(self, upcs), fields(count = upcs.len()))]
    async fn match_tracks_by_upc(
        &self,
        upcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        Ok(self.match_codes("match_tracks_by_upc", "upc", upcs).await?)
    }

    async fn match_by_metadata(
        &self,
        query: &MetadataQuery<'_>,
    ) -> ProviderResult<Option<MatchResult>> {
        let title = normalize_title(query.name);
        let artist = query
            .artists
            .first()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty());

        let search = match (title.is_empty(), artist) {
            (true, None) => return Ok(None),
            (true, Some(artist)) => format!("artist:{}", artist),
            (false, None) => format!("track:{}", title),
            (false, Some(artist)) => format!("track:{} artist:{}", title, artist),
        };

        let tracks = self
            .search_tracks("match_by_metadata", &search, self.matching.search_limit)
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
            let playlist: SpotifyPlaylist = self
                .get_json(
                    "ensure_playlist",
                    format!("{}/playlists/{}", SPOTIFY_API_BASE, urlencoding::encode(id)),
                )
                .await?;
            return Ok(PlaylistResolution {
                playlist_id: playlist.id.unwrap_or_else(|| id.to_string()),
                name: if playlist.name.is_empty() {
                    request.name.clone()
                } else {
                    playlist.name
                },
                created: false,
            });
        }

        let body = CreatePlaylistBody {
            name: &request.name,
            public: request.public.unwrap_or(false),
            description: request.description.as_deref().filter(|d| !d.trim().is_empty()),
        };
        let http = HttpRequest::post(format!("{}/me/playlists", SPOTIFY_API_BASE))
            .json(&body)
            .map_err(|e| SpotifyError::ParseError {
                operation: "ensure_playlist",
                message: e.to_string(),
            })?;

        let response = self.send("ensure_playlist", http).await?;
        let created: SpotifyPlaylist = parse("ensure_playlist", &response)?;
        let playlist_id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or(SpotifyError::MissingField {
                operation: "ensure_playlist",
                field: "id",
            })?;

        info!(playlist_id = %playlist_id, "Created Spotify playlist");
        Ok(PlaylistResolution {
            playlist_id,
            name: if created.name.is_empty() {
                request.name.clone()
            } else {
                created.name
            },
            created: true,
        })
    }

    #[instrument(skip(self, track_ids), fields(requested = track_ids.len()))]
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> ProviderResult<usize> {
        let id = playlist_id_from(playlist_id);
        let mut known = self.playlist_uris.lock().await;
        let present = match known.entry(id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let existing = self.existing_uris(id).await?;
                entry.insert(existing.into_iter().collect())
            }
        };
        let fresh = dedupe_against(present.iter().map(String::as_str), track_ids);

        if fresh.is_empty() {
            debug!(playlist_id = id, "All tracks already present in Spotify playlist");
            return Ok(0);
        }

        let url = format!("{}/playlists/{}/tracks", SPOTIFY_API_BASE, urlencoding::encode(id));
        for chunk in fresh.chunks(ADD_CHUNK_SIZE) {
            let http = HttpRequest::post(url.as_str())
                .json(&AddTracksBody { uris: chunk })
                .map_err(|e| SpotifyError::ParseError {
                    operation: "add_tracks",
                    message: e.to_string(),
                })?;
            self.send("add_tracks", http).await?;
            present.extend(chunk.iter().cloned());
        }

        info!(
            playlist_id = id,
            appended = fresh.len(),
            skipped = track_ids.len() - fresh.len(),
            "Appended tracks to Spotify playlist"
        );
        Ok(fresh.len())
    }
}

fn parse<T: DeserializeOwned>(operation: &'static str, response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| SpotifyError::ParseError {
        operation,
        message: e.to_string(),
    })
}

/// `Retry-After` in seconds, as sent with 429 responses.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Accepts bare ids as well as `spotify:playlist:` URIs.
fn playlist_id_from(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.strip_prefix("spotify:playlist:").unwrap_or(trimmed)
}

fn unique_codes(codes: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty() && seen.insert(*code))
        .collect()
}

fn isrc_agrees(candidate: &CatalogCandidate, code: &str) -> bool {
    candidate
        .isrc
        .as_deref()
        .map_or(true, |found| found.trim().eq_ignore_ascii_case(code))
}

fn artist_names(artists: &[SpotifyArtist]) -> Vec<String> {
    artists
        .iter()
        .map(|a| a.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Album artists intersect track artists, by id when ids are known, else by
/// name. `None` when the album carries no artists.
fn same_artist_album(track: &[SpotifyArtist], album: &[SpotifyArtist]) -> Option<bool> {
    if album.is_empty() {
        return None;
    }

    let album_ids: HashSet<&str> = album.iter().filter_map(|a| a.id.as_deref()).collect();
    if track
        .iter()
        .filter_map(|a| a.id.as_deref())
        .any(|id| album_ids.contains(id))
    {
        return Some(true);
    }

    Some(album.iter().any(|album_artist| {
        !album_artist.name.is_empty()
            && track
                .iter()
                .any(|a| a.name.eq_ignore_ascii_case(&album_artist.name))
    }))
}

fn to_candidate(track: &SpotifyTrack) -> CatalogCandidate {
    let album = track.album.clone().unwrap_or_default();
    let album_type = album.album_type.as_deref().map(str::to_ascii_lowercase);
    let external = track.external_ids.clone().unwrap_or_default();

    CatalogCandidate {
        track_id: track.uri.clone().unwrap_or_default(),
        name: track.name.clone(),
        artists: artist_names(&track.artists),
        album_name: album.name.clone(),
        album_artists: artist_names(&album.artists),
        is_compilation: album_type.as_deref() == Some("compilation"),
        album_type,
        release_date: album.release_date.clone(),
        isrc: external.isrc,
        upc: external.upc,
        duration_ms: track.duration_ms,
        same_artist_album: same_artist_album(&track.artists, &album.artists),
    }
}

/// Converts one playlist item; `None` for null, local-only or unparseable
/// entries.
fn to_transfer_track(raw: serde_json::Value) -> Option<TransferTrack> {
    if raw.is_null() {
        return None;
    }

    let track: SpotifyTrack = match serde_json::from_value(raw.clone()) {
        Ok(track) => track,
        Err(e) => {
            warn!(error = %e, "Skipping unparseable Spotify playlist item");
            return None;
        }
    };

    let uri = track.uri.clone().filter(|uri| !uri.is_empty())?;
    let external = track.external_ids.clone().unwrap_or_default();

    Some(TransferTrack {
        id: uri,
        name: track.name.clone(),
        artists: artist_names(&track.artists),
        album: track.album.as_ref().and_then(|album| album.name.clone()),
        isrc: external.isrc,
        upc: external.upc,
        duration_ms: track.duration_ms,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpMethod;
    use bytes::Bytes;
    use mockall::mock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn respond(status: u16, body: serde_json::Value) -> BridgeResult<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn connector(mock: MockHttpClient) -> SpotifyConnector {
        SpotifyConnector::new(Arc::new(mock), "test_token".to_string()).with_retry_policy(
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                use_exponential_backoff: false,
            },
        )
    }

    fn track_json(n: usize) -> serde_json::Value {
        json!({
            "id": format!("t{}", n),
            "uri": format!("spotify:track:t{}", n),
            "name": format!("Song {}", n),
            "artists": [{"id": "artist-1", "name": "The Band"}],
            "album": {"name": "Record", "album_type": "album", "artists": [{"id": "artist-1", "name": "The Band"}]},
            "external_ids": {"isrc": format!("USABC{:07}", n)},
            "duration_ms": 180_000
        })
    }

    fn tracks_page(start: usize, count: usize, next: Option<String>) -> serde_json::Value {
        let items: Vec<_> = (start..start + count)
            .map(|n| json!({ "track": track_json(n) }))
            .collect();
        json!({ "items": items, "next": next, "total": 207 })
    }

    #[tokio::test]
    async fn test_get_playlist_follows_pagination() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(4).returning(|req| {
            assert_eq!(
                req.headers.get("Authorization").map(String::as_str),
                Some("Bearer test_token")
            );
            let url = req.url.as_str();
            if url.ends_with("/playlists/pl1") {
                respond(200, json!({"id": "pl1", "name": "Road Trip", "description": "", "public": true}))
            } else if url.contains("offset=0") {
                respond(200, tracks_page(0, 100, Some(format!("{}/playlists/pl1/tracks?offset=100&limit=100", SPOTIFY_API_BASE))))
            } else if url.contains("offset=100") {
                respond(200, tracks_page(100, 100, Some(format!("{}/playlists/pl1/tracks?offset=200&limit=100", SPOTIFY_API_BASE))))
            } else if url.contains("offset=200") {
                respond(200, tracks_page(200, 7, None))
            } else {
                panic!("unexpected url {}", url);
            }
        });

        let playlist = connector(mock).get_playlist("spotify:playlist:pl1").await.unwrap();

        assert_eq!(playlist.name, "Road Trip");
        assert_eq!(playlist.description, None);
        assert_eq!(playlist.public, Some(true));
        assert_eq!(playlist.tracks.len(), 207);
        for (n, track) in playlist.tracks.iter().enumerate() {
            assert_eq!(track.id, format!("spotify:track:t{}", n));
        }
        assert_eq!(playlist.tracks[206].isrc.as_deref(), Some("USABC0000206"));
        assert_eq!(playlist.tracks[0].artists, vec!["The Band"]);
    }

    #[tokio::test]
    async fn test_get_playlist_skips_null_and_malformed_items() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(2).returning(|req| {
            if req.url.ends_with("/playlists/pl1") {
                respond(200, json!({"id": "pl1", "name": "Mixed"}))
            } else {
                respond(200, json!({
                    "items": [
                        {"track": null},
                        {"track": {"name": 42}},
                        {"track": track_json(1)}
                    ],
                    "next": null
                }))
            }
        });

        let playlist = connector(mock).get_playlist("pl1").await.unwrap();
        assert_eq!(playlist.tracks.len(), 1);
        assert_eq!(playlist.tracks[0].id, "spotify:track:t1");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| respond(401, json!({"error": {"status": 401, "message": "The access token expired"}})));

        let err = connector(mock).get_playlist("pl1").await.unwrap_err();
        assert!(err.is_authorization());
        assert_eq!(err.provider(), ProviderKind::Spotify);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut mock = MockHttpClient::new();
        mock.expect_execute().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            respond(503, json!({"error": "unavailable"}))
        });

        let err = connector(mock)
            .match_by_metadata(&MetadataQuery {
                name: "Song",
                artists: &["The Band".to_string()],
                duration_ms: None,
                isrc: None,
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            core_transfer::ProviderError::Upstream { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_isrc_match_prefers_original_album_over_compilation() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("q=isrc%3AGBAYE0601498"));
            respond(200, json!({
                "tracks": {
                    "items": [
                        {
                            "uri": "spotify:track:compilation",
                            "name": "Hey Jude",
                            "artists": [{"id": "beatles", "name": "The Beatles"}],
                            "album": {
                                "name": "Now That's What I Call Oldies",
                                "album_type": "compilation",
                                "artists": [{"id": "va", "name": "Various Artists"}],
                                "release_date": "2003-01-01"
                            },
                            "external_ids": {"isrc": "GBAYE0601498"}
                        },
                        {
                            "uri": "spotify:track:original",
                            "name": "Hey Jude",
                            "artists": [{"id": "beatles", "name": "The Beatles"}],
                            "album": {
                                "name": "Hey Jude",
                                "album_type": "single",
                                "artists": [{"id": "beatles", "name": "The Beatles"}],
                                "release_date": "1968-08-26"
                            },
                            "external_ids": {"isrc": "GBAYE0601498"}
                        }
                    ],
                    "next": null
                }
            }))
        });

        let matches = connector(mock)
            .match_tracks_by_isrc(&["GBAYE0601498".to_string(), " GBAYE0601498 ".to_string()])
            .await
            .unwrap();

        assert_eq!(matches.len(), 1);
        let best = &matches["GBAYE0601498"];
        assert_eq!(best.provider_track_id, "spotify:track:original");
        assert_eq!(best.isrc.as_deref(), Some("GBAYE0601498"));
    }

    #[tokio::test]
    async fn test_isrc_match_skips_malformed_search_item() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(2).returning(|req| {
            if req.url.contains("USABC0000007") {
                respond(200, json!({
                    "tracks": {
                        "items": [
                            {"uri": "spotify:track:bad", "name": null},
                            track_json(7)
                        ],
                        "next": null
                    }
                }))
            } else {
                respond(200, json!({"tracks": {"items": [track_json(8)], "next": null}}))
            }
        });

        let matches = connector(mock)
            .match_tracks_by_isrc(&["USABC0000007".to_string(), "USABC0000008".to_string()])
            .await
            .unwrap();

        assert_eq!(matches.len(), 2);
        assert_eq!(matches["USABC0000007"].provider_track_id, "spotify:track:t7");
        assert_eq!(matches["USABC0000008"].provider_track_id, "spotify:track:t8");
    }

    #[tokio::test]
    async fn test_metadata_match_uses_field_filters() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains(&format!(
                "q={}",
                urlencoding::encode("track:bohemian rhapsody artist:Queen")
            )));
            respond(200, json!({
                "tracks": {
                    "items": [
                        {
                            "uri": "spotify:track:live",
                            "name": "Bohemian Rhapsody - Live Aid",
                            "artists": [{"name": "Queen"}],
                            "duration_ms": 350_000
                        },
                        {
                            "uri": "spotify:track:studio",
                            "name": "Bohemian Rhapsody - Remastered 2011",
                            "artists": [{"name": "Queen"}],
                            "duration_ms": 354_000
                        }
                    ]
                }
            }))
        });

        let artists = vec!["Queen".to_string()];
        let result = connector(mock)
            .match_by_metadata(&MetadataQuery {
                name: "Bohemian Rhapsody (Remastered)",
                artists: &artists,
                duration_ms: Some(354_000),
                isrc: None,
            })
            .await
            .unwrap();

        assert_eq!(
            result.map(|r| r.provider_track_id).as_deref(),
            Some("spotify:track:studio")
        );
    }

    #[tokio::test]
    async fn test_ensure_playlist_creates_when_no_id_given() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert!(req.url.ends_with("/me/playlists"));
            let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(body, json!({"name": "Copied", "public": false}));
            respond(201, json!({"id": "new-pl", "name": "Copied"}))
        });

        let resolution = connector(mock)
            .ensure_playlist(&EnsurePlaylistRequest {
                playlist_id: None,
                name: "Copied".to_string(),
                description: Some("  ".to_string()),
                public: None,
            })
            .await
            .unwrap();

        assert_eq!(resolution.playlist_id, "new-pl");
        assert!(resolution.created);
    }

    #[tokio::test]
    async fn test_created_playlist_without_id_is_malformed() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| respond(201, json!({"name": "Copied"})));

        let err = connector(mock)
            .ensure_playlist(&EnsurePlaylistRequest {
                name: "Copied".to_string(),
                ..EnsurePlaylistRequest::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, core_transfer::ProviderError::MalformedData { .. }));
    }

    #[tokio::test]
    async fn test_add_tracks_skips_uris_already_present() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Get)
            .times(1)
            .returning(|req| {
                assert!(req.url.contains("/playlists/dest/tracks?fields="));
                respond(200, json!({
                    "items": [
                        {"track": {"uri": "spotify:track:a"}},
                        {"track": {"uri": "spotify:track:b"}}
                    ],
                    "next": null
                }))
            });
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Post)
            .times(1)
            .returning(|req| {
                let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
                assert_eq!(body, json!({"uris": ["spotify:track:c", "spotify:track:d"]}));
                respond(201, json!({"snapshot_id": "snap"}))
            });

        let ids: Vec<String> = ["b", "c", "a", "d", "c"]
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();
        let appended = connector(mock).add_tracks("dest", &ids).await.unwrap();

        assert_eq!(appended, 2);
    }

    #[tokio::test]
    async fn test_add_tracks_reads_destination_once_across_batches() {
        let posted = Arc::new(std::sync::Mutex::new(Vec::<serde_json::Value>::new()));
        let sink = posted.clone();
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Get)
            .times(1)
            .returning(|_| {
                respond(200, json!({"items": [{"track": {"uri": "spotify:track:t3"}}], "next": null}))
            });
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Post)
            .times(2)
            .returning(move |req| {
                let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
                sink.lock().unwrap().push(body);
                respond(201, json!({"snapshot_id": "snap"}))
            });

        let ids: Vec<String> = (0..150).map(|n| format!("spotify:track:t{}", n)).collect();
        let connector = connector(mock);
        let first = connector.add_tracks("dest", &ids[..100]).await.unwrap();
        // Second batch repeats one id written by the first.
        let mut second_batch = ids[100..].to_vec();
        second_batch.push(ids[0].clone());
        let second = connector.add_tracks("dest", &second_batch).await.unwrap();

        assert_eq!(first, 99);
        assert_eq!(second, 50);
        let posted = posted.lock().unwrap();
        assert_eq!(posted[0]["uris"].as_array().unwrap().len(), 99);
        assert_eq!(posted[1]["uris"].as_array().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_add_tracks_is_a_no_op_when_everything_is_present() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| req.method == HttpMethod::Get)
            .times(1)
            .returning(|_| {
                respond(200, json!({"items": [{"track": {"uri": "spotify:track:a"}}], "next": null}))
            });

        let appended = connector(mock)
            .add_tracks("dest", &["spotify:track:a".to_string()])
            .await
            .unwrap();

        assert_eq!(appended, 0);
    }

    #[test]
    fn test_same_artist_album_by_id_then_name() {
        let track = vec![SpotifyArtist {
            id: Some("x".to_string()),
            name: "Artist".to_string(),
        }];
        let by_id = vec![SpotifyArtist {
            id: Some("x".to_string()),
            name: "Renamed".to_string(),
        }];
        let by_name = vec![SpotifyArtist {
            id: None,
            name: "artist".to_string(),
        }];
        let other = vec![SpotifyArtist {
            id: Some("y".to_string()),
            name: "Various Artists".to_string(),
        }];

        assert_eq!(same_artist_album(&track, &by_id), Some(true));
        assert_eq!(same_artist_album(&track, &by_name), Some(true));
        assert_eq!(same_artist_album(&track, &other), Some(false));
        assert_eq!(same_artist_album(&track, &[]), None);
    }
}
