//! Apple Music API connector
//!
//! Implements the `TransferProvider` trait against `https://api.music.apple.com`.

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
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppleMusicError, Result};
use crate::types::{
    Album, AlbumAttributes, CreatePlaylistBody, LibraryPlaylist, NewPlaylistAttributes,
    ResourceList, SearchResponse, Song, Storefront, TrackReference, TrackReferences,
};

/// Apple Music API host; `next` links are relative to it
const APPLE_MUSIC_API_BASE: &str = "https://api.music.apple.com";

/// Storefront used when the account reports none
pub const DEFAULT_STOREFRONT: &str = "us";

/// Ids per catalog lookup, filter query and library append
const CATALOG_CHUNK_SIZE: usize = 25;

/// Catalog search accepts at most 25 results per type
const MAX_SEARCH_LIMIT: u32 = 25;

const ERROR_BODY_LIMIT: usize = 512;

/// Which credentials a request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Public catalog: developer token only
    Catalog,
    /// `/v1/me/...`: developer token plus Music-User-Token
    Library,
}

/// Apple Music API connector
///
/// Library playlists are read and written through `/v1/me/library`;
/// matching runs against the catalog of the user's storefront. Matched ids
/// are catalog song ids, which is what library playlist appends accept.
pub struct AppleMusicConnector {
    http_client: Arc<dyn HttpClient>,
    developer_token: String,
    music_user_token: String,
    default_storefront: String,
    /// Resolved on first catalog call
    storefront: OnceCell<String>,
    matching: MatchingConfig,
    request_timeout: Option<Duration>,
    retry_policy: RetryPolicy,
}

impl AppleMusicConnector {
    /// Create a new Apple Music connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `developer_token` - signed developer JWT shared by all users
    /// * `music_user_token` - the user's Music-User-Token
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        developer_token: String,
        music_user_token: String,
    ) -> Self {
        Self {
            http_client,
            developer_token,
            music_user_token,
            default_storefront: DEFAULT_STOREFRONT.to_string(),
            storefront: OnceCell::new(),
            matching: MatchingConfig::default(),
            request_timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_default_storefront(mut self, storefront: impl Into<String>) -> Self {
        self.default_storefront = storefront.into();
        self
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

    fn authorize(&self, scope: Scope, request: HttpRequest) -> Result<HttpRequest> {
        if self.developer_token.trim().is_empty() {
            return Err(AppleMusicError::MissingToken("developer token"));
        }
        let request = request
            .bearer_token(self.developer_token.as_str())
            .header("Accept", "application/json")
            .maybe_timeout(self.request_timeout);

        match scope {
            Scope::Catalog => Ok(request),
            Scope::Library if self.music_user_token.trim().is_empty() => {
                Err(AppleMusicError::MissingToken("Music-User-Token"))
            }
            Scope::Library => Ok(request.header("Music-User-Token", self.music_user_token.as_str())),
        }
    }

    #[instrument(skip(self, request), fields(method = request.method.as_str(), url = %request.url))]
    async fn send(
        &self,
        operation: &'static str,
        scope: Scope,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        let request = self.authorize(scope, request)?;
        let policy = &self.retry_policy;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = match self.http_client.execute(request.clone()).await {
                Ok(response) => response,
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    warn!(error = %e, attempt, "Apple Music request did not complete, retrying");
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                    continue;
                }
                Err(e) => {
                    return Err(AppleMusicError::NetworkError {
                        operation,
                        message: e.to_string(),
                    })
                }
            };

            if response.is_success() {
                debug!(status = response.status, "Apple Music request succeeded");
                return Ok(response);
            }
            if response.is_unauthorized() {
                warn!(status = response.status, operation, "Apple Music rejected the credentials");
                return Err(AppleMusicError::AuthenticationFailed {
                    operation,
                    status_code: response.status,
                });
            }
            if response.is_retryable() && attempt < policy.max_attempts {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    status = response.status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Apple Music request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(AppleMusicError::ApiError {
                operation,
                status_code: response.status,
                message: response.body_snippet(ERROR_BODY_LIMIT),
            });
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        scope: Scope,
        path: &str,
    ) -> Result<T> {
        let response = self
            .send(operation, scope, HttpRequest::get(api_url(path)))
            .await?;
        parse(operation, &response)
    }

    /// Like [`Self::get_json`] but maps 404 to `None`; Apple answers 404 for
    /// the track list of an empty playlist.
    async fn get_json_optional<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        scope: Scope,
        path: &str,
    ) -> Result<Option<T>> {
        match self.get_json(operation, scope, path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The user's storefront, fetched once per connector.
    async fn storefront(&self) -> Result<&str> {
        let storefront = self
            .storefront
            .get_or_try_init(|| async move {
                let list: ResourceList<Storefront> = self
                    .get_json("storefront", Scope::Library, "/v1/me/storefront")
                    .await?;
                let id = list
                    .data
                    .into_iter()
                    .map(|storefront| storefront.id)
                    .find(|id| !id.is_empty())
                    .unwrap_or_else(|| self.default_storefront.clone());
                debug!(storefront = %id, "Resolved Apple Music storefront");
                Ok::<_, AppleMusicError>(id)
            })
            .await?;
        Ok(storefront.as_str())
    }

    /// Appends the pages behind `next` to `items` until the chain ends.
    async fn collect_pages(
        &self,
        operation: &'static str,
        mut items: Vec<serde_json::Value>,
        mut next: Option<String>,
    ) -> Result<Vec<serde_json::Value>> {
        while let Some(path) = next.take().filter(|path| !path.is_empty()) {
            match self
                .get_json_optional::<ResourceList<serde_json::Value>>(operation, Scope::Library, &path)
                .await?
            {
                Some(page) => {
                    items.extend(page.data);
                    next = page.next;
                }
                None => break,
            }
        }
        Ok(items)
    }

    /// Fills missing ISRCs from the catalog entries behind library songs.
    async fn backfill_isrcs(
        &self,
        tracks: &mut [TransferTrack],
        catalog_ids: &[Option<String>],
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let wanted: Vec<&str> = tracks
            .iter()
            .zip(catalog_ids)
            .filter(|(track, _)| track.normalized_isrc().is_none())
            .filter_map(|(_, id)| id.as_deref())
            .filter(|id| seen.insert(*id))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        let storefront = self.storefront().await?;
        let mut isrc_by_catalog_id: HashMap<String, String> = HashMap::new();

        for chunk in wanted.chunks(CATALOG_CHUNK_SIZE) {
            let path = format!("/v1/catalog/{}/songs?ids={}", storefront, chunk.join(","));
            match self
                .get_json::<ResourceList<serde_json::Value>>("get_playlist", Scope::Catalog, &path)
                .await
            {
                Ok(list) => {
                    for song in catalog_songs("get_playlist", list.data) {
                        if let Some(isrc) = song
                            .attributes
                            .and_then(|a| a.isrc)
                            .filter(|isrc| !isrc.trim().is_empty())
                        {
                            isrc_by_catalog_id.insert(song.id, isrc);
                        }
                    }
                }
                Err(e) if e.is_authentication() => return Err(e),
                Err(e) => warn!(error = %e, "Could not backfill ISRCs from the Apple Music catalog"),
            }
        }

        let mut backfilled = 0usize;
        for (track, catalog_id) in tracks.iter_mut().zip(catalog_ids) {
            if track.normalized_isrc().is_some() {
                continue;
            }
            if let Some(isrc) = catalog_id.as_ref().and_then(|id| isrc_by_catalog_id.get(id)) {
                track.isrc = Some(isrc.clone());
                backfilled += 1;
            }
        }
        debug!(requested = wanted.len(), backfilled, "Backfilled ISRCs from catalog");
        Ok(())
    }

    /// Album attributes for the given songs, inlined or looked up by id.
    async fn album_details<'s, I>(
        &self,
        operation: &'static str,
        storefront: &str,
        songs: I,
    ) -> Result<HashMap<String, AlbumAttributes>>
    where
        I: IntoIterator<Item = &'s Song>,
    {
        let mut details = HashMap::new();
        let mut missing = Vec::new();

        for album in songs
            .into_iter()
            .filter_map(|song| song.relationships.as_ref())
            .filter_map(|relationships| relationships.albums.as_ref())
            .flat_map(|albums| albums.data.iter())
            .filter(|album| !album.id.is_empty())
        {
            match &album.attributes {
                Some(attributes) => {
                    details.insert(album.id.clone(), attributes.clone());
                }
                None => missing.push(album.id.as_str()),
            }
        }

        missing.retain(|id| !details.contains_key(*id));
        missing.sort_unstable();
        missing.dedup();

        for chunk in missing.chunks(CATALOG_CHUNK_SIZE) {
            let path = format!("/v1/catalog/{}/albums?ids={}", storefront, chunk.join(","));
            let list: ResourceList<Album> =
                self.get_json(operation, Scope::Catalog, &path).await?;
            for album in list.data {
                if let Some(attributes) = album.attributes {
                    details.insert(album.id, attributes);
                }
            }
        }

        Ok(details)
    }

    /// Catalog ids already in a library playlist.
    async fn existing_catalog_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let path = format!(
            "/v1/me/library/playlists/{}/tracks",
            urlencoding::encode(playlist_id)
        );
        let first = match self
            .get_json_optional::<ResourceList<serde_json::Value>>("add_tracks", Scope::Library, &path)
            .await?
        {
            Some(page) => page,
            None => return Ok(Vec::new()),
        };

        let items = self.collect_pages("add_tracks", first.data, first.next).await?;
        Ok(items
            .into_iter()
            .filter_map(|raw| serde_json::from_value::<Song>(raw).ok())
            .filter_map(|song| {
                let catalog_id = song
                    .attributes
                    .and_then(|a| a.play_params)
                    .and_then(|p| p.catalog_id)
                    .filter(|id| !id.is_empty());
                catalog_id.or(Some(song.id).filter(|id| !id.is_empty()))
            })
            .collect())
    }
}

#[async_trait]
impl TransferProvider for AppleMusicConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AppleMusic
    }

    #[instrument(skip(self))]
    async fn get_playlist(&self, playlist_id: &str) -> ProviderResult<SourcePlaylist> {
        let id = playlist_id.trim();
        info!(playlist_id = id, "Reading Apple Music library playlist");

        let path = format!(
            "/v1/me/library/playlists/{}?include=tracks",
            urlencoding::encode(id)
        );
        let list: ResourceList<LibraryPlaylist> =
            self.get_json("get_playlist", Scope::Library, &path).await?;
        let playlist = list
            .data
            .into_iter()
            .next()
            .ok_or(AppleMusicError::MissingField {
                operation: "get_playlist",
                field: "data",
            })?;

        let first = playlist
            .relationships
            .and_then(|relationships| relationships.tracks)
            .unwrap_or_default();
        let items = self
            .collect_pages("get_playlist", first.data, first.next)
            .await?;

        let mut tracks = Vec::with_capacity(items.len());
        let mut catalog_ids = Vec::with_capacity(items.len());
        let mut skipped = 0usize;
        for raw in items {
            match library_track(raw) {
                Some((track, catalog_id)) => {
                    tracks.push(track);
                    catalog_ids.push(catalog_id);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(playlist_id = id, skipped, "Skipped unusable Apple Music playlist items");
        }

        self.backfill_isrcs(&mut tracks, &catalog_ids).await?;
        info!(playlist_id = id, tracks = tracks.len(), "Read Apple Music playlist");

        let attributes = playlist.attributes;
        Ok(SourcePlaylist {
            id: if playlist.id.is_empty() {
                id.to_string()
            } else {
                playlist.id
            },
            name: attributes
                .as_ref()
                .and_then(|a| a.name.clone())
                .unwrap_or_default(),
            description: attributes
                .as_ref()
                .and_then(|a| a.description.as_ref())
                .and_then(|d| d.standard.clone())
                .filter(|d| !d.trim().is_empty()),
            public: attributes.as_ref().and_then(|a| a.is_public),
            tracks,
        })
    }

    #[instrument(skip(self, isrcs), fields(count = isrcs.len()))]
    async fn match_tracks_by_isrc(
        &self,
        isrcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        let codes = unique_codes(isrcs);
        if codes.is_empty() {
            return Ok(HashMap::new());
        }

        let storefront = self.storefront().await?;
        let mut by_isrc: HashMap<String, Vec<Song>> = HashMap::new();
        for chunk in codes.chunks(CATALOG_CHUNK_SIZE) {
            let path = format!(
                "/v1/catalog/{}/songs?filter[isrc]={}&include=albums",
                storefront,
                chunk.join(",")
            );
            let list: ResourceList<serde_json::Value> = self
                .get_json("match_tracks_by_isrc", Scope::Catalog, &path)
                .await?;
            for song in catalog_songs("match_tracks_by_isrc", list.data) {
                let key = song
                    .attributes
                    .as_ref()
                    .and_then(|a| a.isrc.as_deref())
                    .map(|isrc| isrc.trim().to_ascii_uppercase());
                if let Some(key) = key {
                    by_isrc.entry(key).or_default().push(song);
                }
            }
        }

        let albums = self
            .album_details("match_tracks_by_isrc", storefront, by_isrc.values().flatten())
            .await?;

        let mut matches = HashMap::new();
        for code in codes.iter().copied() {
            let candidates: Vec<CatalogCandidate> = by_isrc
                .get(&code.to_ascii_uppercase())
                .map(|songs| songs.iter().map(|song| to_candidate(song, &albums)).collect())
                .unwrap_or_default();

            if let Some(best) = pick_code_candidate(&candidates, &self.matching) {
                let mut result = best.to_match_result();
                result.isrc = Some(code.to_string());
                matches.insert(code.to_string(), result);
            }
        }

        debug!(requested = codes.len(), matched = matches.len(), "Apple Music ISRC lookup done");
        Ok(matches)
    }

    #[instrument(skip(self, upcs), fields(count = upcs.len()))]
    async fn match_tracks_by_upc(
        &self,
        upcs: &[String],
    ) -> ProviderResult<HashMap<String, MatchResult>> {
        let codes = unique_codes(upcs);
        if codes.is_empty() {
            return Ok(HashMap::new());
        }

        let storefront = self.storefront().await?;
        let mut matches = HashMap::new();
        for code in codes {
            let path = format!(
                "/v1/catalog/{}/songs?filter[upc]={}&include=albums",
                storefront,
                urlencoding::encode(code)
            );
            let list: ResourceList<serde_json::Value> = self
                .get_json("match_tracks_by_upc", Scope::Catalog, &path)
                .await?;
            let songs = catalog_songs("match_tracks_by_upc", list.data);
            let albums = self
                .album_details("match_tracks_by_upc", storefront, songs.iter())
                .await?;
            let candidates: Vec<CatalogCandidate> = songs
                .iter()
                .map(|song| to_candidate(song, &albums))
                .collect();

            if let Some(best) = pick_code_candidate(&candidates, &self.matching) {
                let mut result = best.to_match_result();
                result.upc.get_or_insert_with(|| code.to_string());
                matches.insert(code.to_string(), result);
            }
        }
        Ok(matches)
    }

    async fn match_by_metadata(
        &self,
        query: &MetadataQuery<'_>,
    ) -> ProviderResult<Option<MatchResult>> {
        let term = search_terms(query);
        if term.is_empty() {
            return Ok(None);
        }

        let storefront = self.storefront().await?;
        let path = format!(
            "/v1/catalog/{}/search?term={}&types=songs&limit={}",
            storefront,
            urlencoding::encode(&term),
            self.matching.search_limit.clamp(1, MAX_SEARCH_LIMIT)
        );
        let response: SearchResponse = self
            .get_json("match_by_metadata", Scope::Catalog, &path)
            .await?;

        let no_albums = HashMap::new();
        let songs = response.results.songs.map(|songs| songs.data).unwrap_or_default();
        let candidates: Vec<CatalogCandidate> = catalog_songs("match_by_metadata", songs)
            .iter()
            .map(|song| to_candidate(song, &no_albums))
            .collect();

        Ok(pick_metadata_candidate(query, &candidates, &self.matching)
            .map(CatalogCandidate::to_match_result))
    }

    #[instrument(skip(self, request), fields(playlist_id = ?request.playlist_id))]
    async fn ensure_playlist(
        &self,
        request: &EnsurePlaylistRequest,
    ) -> ProviderResult<PlaylistResolution> {
        if let Some(id) = request
            .playlist_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            let path = format!("/v1/me/library/playlists/{}", urlencoding::encode(id));
            let list: ResourceList<LibraryPlaylist> =
                self.get_json("ensure_playlist", Scope::Library, &path).await?;
            let playlist = list.data.into_iter().next();
            let name = playlist
                .and_then(|p| p.attributes)
                .and_then(|a| a.name)
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| request.name.clone());

            return Ok(PlaylistResolution {
                playlist_id: id.to_string(),
                name,
                created: false,
            });
        }

        let body = CreatePlaylistBody {
            attributes: NewPlaylistAttributes {
                name: &request.name,
                description: request.description.as_deref().filter(|d| !d.trim().is_empty()),
            },
        };
        let http = HttpRequest::post(api_url("/v1/me/library/playlists"))
            .json(&body)
            .map_err(|e| AppleMusicError::ParseError {
                operation: "ensure_playlist",
                message: e.to_string(),
            })?;

        let response = self.send("ensure_playlist", Scope::Library, http).await?;
        let created: ResourceList<LibraryPlaylist> = parse("ensure_playlist", &response)?;
        let playlist_id = created
            .data
            .into_iter()
            .map(|p| p.id)
            .find(|id| !id.is_empty())
            .ok_or(AppleMusicError::MissingField {
                operation: "ensure_playlist",
                field: "playlist id",
            })?;

        info!(playlist_id = %playlist_id, "Created Apple Music library playlist");
        Ok(PlaylistResolution {
            playlist_id,
            name: request.name.clone(),
            created: true,
        })
    }

    #[instrument(skip(self, track_ids), fields(requested = track_ids.len()))]
    async fn add_tracks(&self, playlist_id: &str, track_ids: &[String]) -> ProviderResult<usize> {
        let id = playlist_id.trim();
        let existing = self.existing_catalog_ids(id).await?;
        let fresh = dedupe_against(existing.iter().map(String::as_str), track_ids);
        if fresh.is_empty() {
            debug!(playlist_id = id, "All tracks already present in Apple Music playlist");
            return Ok(0);
        }

        let url = api_url(&format!(
            "/v1/me/library/playlists/{}/tracks",
            urlencoding::encode(id)
        ));
        for chunk in fresh.chunks(CATALOG_CHUNK_SIZE) {
            let body = TrackReferences {
                data: chunk
                    .iter()
                    .map(|id| TrackReference {
                        id: id.as_str(),
                        kind: "songs",
                    })
                    .collect(),
            };
            let http = HttpRequest::post(url.as_str())
                .json(&body)
                .map_err(|e| AppleMusicError::ParseError {
                    operation: "add_tracks",
                    message: e.to_string(),
                })?;
            self.send("add_tracks", Scope::Library, http).await?;
        }

        info!(playlist_id = id, appended = fresh.len(), "Appended tracks to Apple Music playlist");
        Ok(fresh.len())
    }
}

fn api_url(path: &str) -> String {
    format!("{}{}", APPLE_MUSIC_API_BASE, path)
}

fn parse<T: DeserializeOwned>(operation: &'static str, response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| AppleMusicError::ParseError {
        operation,
        message: e.to_string(),
    })
}

fn unique_codes(codes: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .map(|code| code.trim())
        .filter(|code| !code.is_empty() && seen.insert(code.to_ascii_uppercase()))
        .collect()
}

fn artist_list(artist_name: Option<&str>) -> Vec<String> {
    artist_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| vec![name.to_string()])
        .unwrap_or_default()
}

/// Catalog songs of a response, skipping entries that do not parse.
fn catalog_songs(operation: &'static str, raw: Vec<serde_json::Value>) -> Vec<Song> {
    raw.into_iter()
        .filter_map(|item| match serde_json::from_value::<Song>(item) {
            Ok(song) => Some(song),
            Err(e) => {
                warn!(operation, error = %e, "Skipping unparseable Apple Music catalog song");
                None
            }
        })
        .collect()
}

/// Library song plus its catalog id, or `None` when unusable.
fn library_track(raw: serde_json::Value) -> Option<(TransferTrack, Option<String>)> {
    let song: Song = match serde_json::from_value(raw.clone()) {
        Ok(song) => song,
        Err(e) => {
            warn!(error = %e, "Skipping unparseable Apple Music playlist item");
            return None;
        }
    };
    if song.id.is_empty() {
        return None;
    }
    let attributes = song.attributes?;
    let catalog_id = attributes
        .play_params
        .as_ref()
        .and_then(|p| p.catalog_id.clone())
        .filter(|id| !id.is_empty());

    let track = TransferTrack {
        id: song.id,
        artists: artist_list(attributes.artist_name.as_deref()),
        name: attributes.name,
        album: attributes.album_name,
        isrc: attributes.isrc,
        upc: None,
        duration_ms: attributes.duration_in_millis,
        raw,
    };
    Some((track, catalog_id))
}

fn to_candidate(song: &Song, albums: &HashMap<String, AlbumAttributes>) -> CatalogCandidate {
    let attributes = song.attributes.clone().unwrap_or_default();
    let album = song
        .relationships
        .as_ref()
        .and_then(|r| r.albums.as_ref())
        .and_then(|list| list.data.first())
        .and_then(|album| {
            album
                .attributes
                .clone()
                .or_else(|| albums.get(&album.id).cloned())
        });

    let is_compilation = album
        .as_ref()
        .and_then(|a| a.is_compilation)
        .unwrap_or(false);
    let album_type = album.as_ref().map(|a| {
        let kind = if a.is_single == Some(true) {
            "single"
        } else if is_compilation {
            "compilation"
        } else {
            "album"
        };
        kind.to_string()
    });
    let album = album.unwrap_or_default();

    CatalogCandidate {
        track_id: song.id.clone(),
        name: attributes.name,
        artists: artist_list(attributes.artist_name.as_deref()),
        album_name: album.name.or(attributes.album_name),
        album_artists: artist_list(album.artist_name.as_deref()),
        album_type,
        is_compilation,
        release_date: album.release_date.or(attributes.release_date),
        isrc: attributes.isrc,
        upc: album.upc,
        duration_ms: attributes.duration_in_millis,
        same_artist_album: None,
    }
}
