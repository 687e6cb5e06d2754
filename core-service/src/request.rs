//! Wire types for the submit and status operations.
//!
//! Field names are camelCase and stable; polling clients depend on them.

use chrono::{DateTime, SecondsFormat, Utc};
use core_auth::{ProviderKind, UserId};
use core_transfer::{
    SourceRef, TargetRef, TransferJob, TransferJobId, TransferPhase, TransferStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// One playlist to move, as submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_playlist_id: String,
    pub source_provider: String,
    pub target_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_playlist_id: Option<String>,
    #[serde(default)]
    pub options: TransferOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    /// Name of the created playlist; the source name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_if_missing: Option<bool>,
    /// Anything else the client sent, stored with the job untouched
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl TransferRequest {
    pub fn new(
        source_provider: impl Into<String>,
        source_playlist_id: impl Into<String>,
        target_provider: impl Into<String>,
    ) -> Self {
        Self {
            source_playlist_id: source_playlist_id.into(),
            source_provider: source_provider.into(),
            target_provider: target_provider.into(),
            target_playlist_id: None,
            options: TransferOptions::default(),
        }
    }

    pub fn with_target_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.target_playlist_id = Some(playlist_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.options.create_if_missing = Some(create);
        self
    }

    /// Checks the request and converts it into a queued job.
    ///
    /// `index` only labels the error message.
    pub(crate) fn into_job(self, index: usize, user_id: &UserId, now: i64) -> Result<TransferJob> {
        let invalid = |reason: String| CoreError::InvalidRequest(format!("item {index}: {reason}"));

        let source_playlist_id = self.source_playlist_id.trim().to_string();
        if source_playlist_id.is_empty() {
            return Err(invalid("sourcePlaylistId is required".to_string()));
        }
        let source_provider = parse_provider(&self.source_provider)
            .ok_or_else(|| invalid(format!("unknown sourceProvider '{}'", self.source_provider)))?;
        let target_provider = parse_provider(&self.target_provider)
            .ok_or_else(|| invalid(format!("unknown targetProvider '{}'", self.target_provider)))?;

        let target_playlist_id = self
            .target_playlist_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if source_provider == target_provider
            && target_playlist_id.as_deref() == Some(source_playlist_id.as_str())
        {
            return Err(invalid(
                "source and target are the same playlist".to_string(),
            ));
        }

        let name = self
            .options
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let target = TargetRef {
            provider: target_provider,
            playlist_id: target_playlist_id,
            create_if_missing: self.options.create_if_missing.unwrap_or(true),
            name,
        };
        target.validate().map_err(|e| invalid(e.to_string()))?;

        let options = serde_json::to_value(&self.options)
            .map_err(|e| invalid(format!("options are not serializable: {e}")))?;

        Ok(TransferJob::new(
            user_id.clone(),
            SourceRef {
                provider: source_provider,
                playlist_id: source_playlist_id,
            },
            target,
            options,
            now,
        ))
    }
}

fn parse_provider(value: &str) -> Option<ProviderKind> {
    ProviderKind::parse(value.trim())
}

/// Progress block of [`TransferStatusView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub transferred_tracks: u64,
    pub total_tracks: Option<u64>,
    pub phase: TransferPhase,
}

/// Status of one job as returned to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStatusView {
    pub id: TransferJobId,
    pub status: TransferStatus,
    pub progress: ProgressView,
    pub last_error: Option<String>,
    /// RFC 3339, millisecond precision, UTC
    pub updated_at: String,
}

impl From<&TransferJob> for TransferStatusView {
    fn from(job: &TransferJob) -> Self {
        let progress = job.progress();
        Self {
            id: job.id,
            status: job.status,
            progress: ProgressView {
                transferred_tracks: progress.transferred_tracks,
                total_tracks: progress.total_tracks,
                phase: progress.phase,
            },
            last_error: job.last_error.clone(),
            updated_at: format_millis(job.updated_at),
        }
    }
}

fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    #[test]
    fn test_request_deserializes_camel_case_with_extras() {
        let request: TransferRequest = serde_json::from_value(json!({
            "sourcePlaylistId": "37i9dQZF1DXcBWIGoYBM5M",
            "sourceProvider": "spotify",
            "targetProvider": "apple_music",
            "options": {
                "name": "Road Trip",
                "createIfMissing": true,
                "notifyEmail": "someone@example.com"
            }
        }))
        .unwrap();

        assert_eq!(request.target_playlist_id, None);
        assert_eq!(request.options.name.as_deref(), Some("Road Trip"));
        assert_eq!(
            request.options.extras.get("notifyEmail"),
            Some(&json!("someone@example.com"))
        );

        let job = request.into_job(0, &user(), 1_000).unwrap();
        assert_eq!(job.source.provider, ProviderKind::Spotify);
        assert_eq!(job.target.provider, ProviderKind::AppleMusic);
        assert_eq!(job.target.name.as_deref(), Some("Road Trip"));
        assert!(job.target.create_if_missing);
        assert_eq!(job.status, TransferStatus::Queued);
        assert_eq!(job.run_at, 1_000);
        assert_eq!(job.options["notifyEmail"], json!("someone@example.com"));
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = TransferRequest::new("tidal", "abc", "spotify")
            .into_job(2, &user(), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(ref m) if m.contains("item 2")));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_rejects_empty_source_playlist() {
        let err = TransferRequest::new("spotify", "  ", "soundcloud")
            .into_job(0, &user(), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_same_playlist_on_same_provider() {
        let err = TransferRequest::new("spotify", "abc", "spotify")
            .with_target_playlist("abc")
            .into_job(0, &user(), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));

        // Copying into another playlist on the same service is allowed.
        TransferRequest::new("spotify", "abc", "spotify")
            .with_target_playlist("def")
            .into_job(0, &user(), 0)
            .unwrap();
    }

    #[test]
    fn test_rejects_missing_target_without_create() {
        let err = TransferRequest::new("spotify", "abc", "soundcloud")
            .with_create_if_missing(false)
            .into_job(0, &user(), 0)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(ref m) if m.contains("createIfMissing")));
    }

    #[test]
    fn test_status_view_shape() {
        let job = TransferRequest::new("spotify", "abc", "soundcloud")
            .into_job(0, &user(), 1_700_000_000_123)
            .unwrap();
        let view = TransferStatusView::from(&job);
        let value = serde_json::to_value(&view).unwrap();

        assert_eq!(value["id"], json!(job.id.to_string()));
        assert_eq!(value["status"], json!("queued"));
        assert_eq!(value["progress"]["transferredTracks"], json!(0));
        assert_eq!(value["progress"]["totalTracks"], Value::Null);
        assert_eq!(value["progress"]["phase"], json!("initializing"));
        assert_eq!(value["lastError"], Value::Null);
        assert_eq!(value["updatedAt"], json!("2023-11-14T22:13:20.123Z"));
    }
}
