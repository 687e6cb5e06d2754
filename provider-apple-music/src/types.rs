//! Apple Music API resource types
//!
//! Responses follow the JSON:API-like envelope `{ data: [...], next }`.
//! See: <https://developer.apple.com/documentation/applemusicapi>

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Path relative to the API host
    pub next: Option<String>,
}

impl<T> Default for ResourceList<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            next: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storefront {
    #[serde(default)]
    pub id: String,
}

/// Library playlist (`p.` ids)
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryPlaylist {
    #[serde(default)]
    pub id: String,
    pub attributes: Option<LibraryPlaylistAttributes>,
    pub relationships: Option<LibraryPlaylistRelationships>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryPlaylistAttributes {
    pub name: Option<String>,
    pub description: Option<Description>,
    pub is_public: Option<bool>,
    pub can_edit: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Description {
    pub standard: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryPlaylistRelationships {
    /// Raw items; unparseable entries are skipped individually
    pub tracks: Option<ResourceList<serde_json::Value>>,
}

/// Library (`i.` ids) or catalog song
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Song {
    #[serde(default)]
    pub id: String,
    pub attributes: Option<SongAttributes>,
    pub relationships: Option<SongRelationships>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongAttributes {
    #[serde(default)]
    pub name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub isrc: Option<String>,
    pub duration_in_millis: Option<u64>,
    pub release_date: Option<String>,
    pub play_params: Option<PlayParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayParams {
    pub id: Option<String>,
    pub kind: Option<String>,
    /// Catalog id of a library song
    pub catalog_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongRelationships {
    pub albums: Option<ResourceList<Album>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub id: String,
    pub attributes: Option<AlbumAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumAttributes {
    pub name: Option<String>,
    pub artist_name: Option<String>,
    pub is_compilation: Option<bool>,
    pub is_single: Option<bool>,
    pub release_date: Option<String>,
    pub upc: Option<String>,
}

/// `GET /v1/catalog/{storefront}/search`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: SearchResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    /// Raw songs; unparseable entries are skipped individually
    pub songs: Option<ResourceList<serde_json::Value>>,
}

/// Body of `POST /v1/me/library/playlists`
#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistBody<'a> {
    pub attributes: NewPlaylistAttributes<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPlaylistAttributes<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
}

/// Body of `POST /v1/me/library/playlists/{id}/tracks`
#[derive(Debug, Clone, Serialize)]
pub struct TrackReferences<'a> {
    pub data: Vec<TrackReference<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReference<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}
