//! SoundCloud API response types
//!
//! See: <https://developers.soundcloud.com/docs/api/explorer/open-api>

use serde::{Deserialize, Serialize};

/// `linked_partitioning` page
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub collection: Vec<T>,
    pub next_href: Option<String>,
}

/// Search endpoints answer with a bare array unless `linked_partitioning`
/// is honoured.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TrackListing<T> {
    Paged(Collection<T>),
    Plain(Vec<T>),
}

impl<T> TrackListing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            TrackListing::Paged(page) => page.collection,
            TrackListing::Plain(items) => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScPlaylist {
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    /// `public` or `private`
    pub sharing: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScTrack {
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    /// Milliseconds
    pub duration: Option<u64>,
    pub user: Option<ScUser>,
    pub publisher_metadata: Option<PublisherMetadata>,
    pub release_date: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScUser {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherMetadata {
    pub artist: Option<String>,
    pub isrc: Option<String>,
    #[serde(alias = "upc")]
    pub upc_or_ean: Option<String>,
    pub release_title: Option<String>,
    pub album_title: Option<String>,
}

/// Track reference inside a playlist write
#[derive(Debug, Clone, Serialize)]
pub struct TrackUrn {
    pub urn: String,
}

/// Body of `POST /playlists` and `PUT /playlists/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEnvelope<'a> {
    pub playlist: PlaylistBody<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistBody<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub sharing: &'a str,
    pub tracks: Vec<TrackUrn>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_accepts_both_shapes() {
        let paged: TrackListing<ScTrack> = serde_json::from_str(
            r#"{"collection": [{"id": 1, "title": "A"}], "next_href": null}"#,
        )
        .unwrap();
        let plain: TrackListing<ScTrack> =
            serde_json::from_str(r#"[{"id": 2, "title": "B"}, {"id": 3, "title": "C"}]"#).unwrap();

        assert_eq!(paged.into_items().len(), 1);
        assert_eq!(plain.into_items().len(), 2);
    }

    #[test]
    fn test_publisher_metadata_upc_alias() {
        let metadata: PublisherMetadata =
            serde_json::from_str(r#"{"artist": "Burial", "upc": "5055869507199"}"#).unwrap();
        assert_eq!(metadata.upc_or_ean.as_deref(), Some("5055869507199"));
    }
}
