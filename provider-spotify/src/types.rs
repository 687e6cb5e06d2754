//! Spotify Web API response types
//!
//! Only the fields the adapter reads are modelled; everything else is
//! ignored by serde.

use serde::{Deserialize, Serialize};

/// Offset-paginated list
///
/// See: <https://developer.spotify.com/documentation/web-api/concepts/api-calls#pagination>
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next: Option<String>,
    pub total: Option<u32>,
}

/// Playlist object
///
/// See: <https://developer.spotify.com/documentation/web-api/reference/get-playlist>
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub public: Option<bool>,
}

/// Entry of a playlist's track list
///
/// `track` is kept raw: episodes, local files and removed tracks show up as
/// `null` or with a shape that does not parse as [`SpotifyTrack`].
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyTrack {
    pub id: Option<String>,
    pub uri: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    pub album: Option<SpotifyAlbum>,
    pub external_ids: Option<ExternalIds>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyArtist {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpotifyAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
    /// `album`, `single` or `compilation`
    pub album_type: Option<String>,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
    pub upc: Option<String>,
}

/// `GET /search?type=track`
///
/// Items stay raw so one odd result does not sink the whole lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: Option<Paging<serde_json::Value>>,
}

/// Track list entry when only the URI is requested through `fields`
#[derive(Debug, Clone, Deserialize)]
pub struct UriItem {
    pub track: Option<UriRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UriRef {
    pub uri: Option<String>,
}

/// Body of `POST /me/playlists`
#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistBody<'a> {
    pub name: &'a str,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

/// Body of `POST /playlists/{id}/tracks`
#[derive(Debug, Clone, Serialize)]
pub struct AddTracksBody<'a> {
    pub uris: &'a [String],
}
