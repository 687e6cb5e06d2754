//! # Transfer Job State Machine
//!
//! Lifecycle of a playlist transfer with validated state transitions.
//!
//! ## State Machine
//!
//! ```text
//! queued ──→ processing ──→ succeeded
//!   │  ↑         │
//!   │  └─────────┤ (retry / stale lease)
//!   │            ↓
//!   ├───────→ failed
//!   └───────→ canceled
//! ```
//!
//! Within `processing` the job advances through [`TransferPhase`]s. The
//! phase and every piece of progress detail live in [`TransferMeta`], which is
//! persisted as camelCase JSON so polling clients see stable field names.
//!
//! All timestamps are milliseconds since the Unix epoch.

use crate::{Result, TransferError};
use core_auth::{ProviderKind, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferJobId(Uuid);

impl TransferJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from its string form
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s.trim()).map_err(|e| TransferError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TransferJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TransferJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for TransferJobId {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}

// ============================================================================
// Status & Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Waiting for a worker (fresh, or scheduled for retry)
    Queued,
    /// Leased by a worker
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Succeeded | TransferStatus::Failed | TransferStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Processing => "processing",
            TransferStatus::Succeeded => "succeeded",
            TransferStatus::Failed => "failed",
            TransferStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for TransferStatus {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(TransferStatus::Queued),
            "processing" => Ok(TransferStatus::Processing),
            "succeeded" => Ok(TransferStatus::Succeeded),
            "failed" => Ok(TransferStatus::Failed),
            "canceled" | "cancelled" => Ok(TransferStatus::Canceled),
            _ => Err(TransferError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Step of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferPhase {
    #[default]
    Initializing,
    FetchingSourcePlaylist,
    MatchingTracks,
    PreparingDestination,
    AddingTracks,
    Complete,
    Error,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Initializing => "initializing",
            TransferPhase::FetchingSourcePlaylist => "fetching-source-playlist",
            TransferPhase::MatchingTracks => "matching-tracks",
            TransferPhase::PreparingDestination => "preparing-destination",
            TransferPhase::AddingTracks => "adding-tracks",
            TransferPhase::Complete => "complete",
            TransferPhase::Error => "error",
        }
    }
}

impl std::fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Endpoints
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub provider: ProviderKind,
    pub playlist_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub provider: ProviderKind,
    /// Existing destination playlist; `None` means create one
    pub playlist_id: Option<String>,
    pub create_if_missing: bool,
    /// Name for a created playlist; defaults to the source name
    pub name: Option<String>,
}

impl TargetRef {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            playlist_id: None,
            create_if_missing: true,
            name: None,
        }
    }

    /// A target without a playlist id can only be satisfied by creating one.
    pub fn validate(&self) -> Result<()> {
        let has_id = self
            .playlist_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id && !self.create_if_missing {
            return Err(TransferError::InvalidRequest(
                "target playlist id is required when createIfMissing is false".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Meta
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSample {
    pub name: String,
    pub artists: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaSource {
    pub provider: ProviderKind,
    pub playlist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingStats {
    /// Unique ISRCs sent to the exact pass
    pub requested: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub missing_isrc: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTarget {
    pub provider: ProviderKind,
    pub playlist_id: String,
    pub playlist_name: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub total_tracks: u64,
    pub transferred: u64,
    pub skipped_missing_isrc: u64,
    pub unmatched: u64,
    pub destination_playlist_id: String,
}

/// Progress detail persisted with the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMeta {
    pub phase: TransferPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<MetaSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tracks: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching: Option<MatchingStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_isrc: Vec<TrackSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<TrackSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<MetaTarget>,
    #[serde(default)]
    pub added: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<TransferSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Transfer Job Entity
// ============================================================================

/// Snapshot of progress exposed to status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred_tracks: u64,
    pub total_tracks: Option<u64>,
    pub phase: TransferPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferJob {
    pub id: TransferJobId,
    pub user_id: UserId,
    pub source: SourceRef,
    pub target: TargetRef,
    /// Free-form options from the submit call
    pub options: serde_json::Value,
    pub status: TransferStatus,
    /// Failed execution attempts so far
    pub attempts: u32,
    pub meta: TransferMeta,
    pub transferred_tracks: u64,
    /// Unknown until the source playlist has been fetched
    pub total_tracks: Option<u64>,
    pub last_error: Option<String>,
    /// Earliest time a worker may pick the job up
    pub run_at: i64,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TransferJob {
    /// Creates a queued job, due immediately.
    pub fn new(
        user_id: UserId,
        source: SourceRef,
        target: TargetRef,
        options: serde_json::Value,
        now: i64,
    ) -> Self {
        Self {
            id: TransferJobId::new(),
            user_id,
            source,
            target,
            options,
            status: TransferStatus::Queued,
            attempts: 0,
            meta: TransferMeta::default(),
            transferred_tracks: 0,
            total_tracks: None,
            last_error: None,
            run_at: now,
            lease_owner: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            transferred_tracks: self.transferred_tracks,
            total_tracks: self.total_tracks,
            phase: self.meta.phase,
        }
    }

    /// Claims the job for `owner` and resets progress for a fresh run.
    ///
    /// # Errors
    ///
    /// Returns an error unless the job is `queued`.
    pub fn start(&mut self, owner: &str, lease_expires_at: i64, now: i64) -> Result<()> {
        self.validate_transition(TransferStatus::Processing)?;
        self.status = TransferStatus::Processing;
        self.transferred_tracks = 0;
        self.total_tracks = None;
        self.meta = TransferMeta::default();
        self.lease_owner = Some(owner.to_string());
        self.lease_expires_at = Some(lease_expires_at);
        self.updated_at = now;
        Ok(())
    }

    /// Moves to the next phase.
    pub fn enter_phase(&mut self, phase: TransferPhase, now: i64) -> Result<()> {
        self.ensure_processing("enter_phase")?;
        self.meta.phase = phase;
        self.updated_at = now;
        Ok(())
    }

    /// Records the source playlist size once it is known.
    pub fn set_total_tracks(&mut self, total: u64, now: i64) -> Result<()> {
        self.ensure_processing("set_total_tracks")?;
        self.total_tracks = Some(total);
        self.meta.total_tracks = Some(total);
        self.updated_at = now;
        Ok(())
    }

    /// Records tracks written to the destination so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the count would exceed the known total.
    pub fn record_transferred(&mut self, transferred: u64, now: i64) -> Result<()> {
        self.ensure_processing("record_transferred")?;
        if let Some(total) = self.total_tracks {
            if transferred > total {
                return Err(TransferError::InvalidStateTransition {
                    from: self.status.as_str().to_string(),
                    to: "record_transferred".to_string(),
                    reason: format!("{} transferred exceeds total of {}", transferred, total),
                });
            }
        }
        self.transferred_tracks = transferred;
        self.meta.added = transferred;
        self.updated_at = now;
        Ok(())
    }

    /// Marks the running attempt as broken: phase `error`, message on the
    /// job and in meta. Status is decided separately by the scheduler.
    pub fn record_error(&mut self, message: impl Into<String>, now: i64) {
        let message = message.into();
        self.meta.phase = TransferPhase::Error;
        self.meta.error = Some(message.clone());
        self.last_error = Some(message);
        self.updated_at = now;
    }

    pub fn succeed(&mut self, summary: TransferSummary, now: i64) -> Result<()> {
        self.validate_transition(TransferStatus::Succeeded)?;
        self.status = TransferStatus::Succeeded;
        self.meta.phase = TransferPhase::Complete;
        self.meta.summary = Some(summary);
        self.meta.error = None;
        self.last_error = None;
        self.clear_lease();
        self.updated_at = now;
        Ok(())
    }

    /// Terminal failure. Counts as an attempt.
    pub fn fail(&mut self, message: impl Into<String>, now: i64) -> Result<()> {
        self.validate_transition(TransferStatus::Failed)?;
        let message = message.into();
        if self.meta.error.is_none() {
            self.meta.error = Some(message.clone());
        }
        self.meta.phase = TransferPhase::Error;
        self.status = TransferStatus::Failed;
        self.last_error = Some(message);
        self.attempts += 1;
        self.clear_lease();
        self.updated_at = now;
        Ok(())
    }

    /// Failed attempt that will run again at `run_at`. Counts as an attempt.
    pub fn retry_at(&mut self, message: impl Into<String>, run_at: i64, now: i64) -> Result<()> {
        if self.status != TransferStatus::Processing {
            return Err(TransferError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: TransferStatus::Queued.as_str().to_string(),
                reason: "Only a running job can be scheduled for retry".to_string(),
            });
        }
        self.status = TransferStatus::Queued;
        self.last_error = Some(message.into());
        self.attempts += 1;
        self.run_at = run_at;
        self.clear_lease();
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: i64) -> Result<()> {
        self.validate_transition(TransferStatus::Canceled)?;
        self.status = TransferStatus::Canceled;
        self.updated_at = now;
        Ok(())
    }

    fn clear_lease(&mut self) {
        self.lease_owner = None;
        self.lease_expires_at = None;
    }

    fn ensure_processing(&self, operation: &str) -> Result<()> {
        if self.status != TransferStatus::Processing {
            return Err(TransferError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: operation.to_string(),
                reason: "Job must be processing".to_string(),
            });
        }
        Ok(())
    }

    fn validate_transition(&self, to: TransferStatus) -> Result<()> {
        let valid = match (self.status, to) {
            (TransferStatus::Queued, TransferStatus::Processing) => true,
            (TransferStatus::Queued, TransferStatus::Canceled) => true,
            (TransferStatus::Queued, TransferStatus::Failed) => true,

            (TransferStatus::Processing, TransferStatus::Succeeded) => true,
            (TransferStatus::Processing, TransferStatus::Failed) => true,
            (TransferStatus::Processing, TransferStatus::Queued) => true,

            (TransferStatus::Succeeded, _) => false,
            (TransferStatus::Failed, _) => false,
            (TransferStatus::Canceled, _) => false,

            _ => false,
        };

        if !valid {
            return Err(TransferError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn job() -> TransferJob {
        TransferJob::new(
            UserId::new("user-1"),
            SourceRef {
                provider: ProviderKind::Spotify,
                playlist_id: "src".to_string(),
            },
            TargetRef::new(ProviderKind::AppleMusic),
            serde_json::json!({}),
            NOW,
        )
    }

    fn summary() -> TransferSummary {
        TransferSummary {
            total_tracks: 2,
            transferred: 2,
            skipped_missing_isrc: 1,
            unmatched: 0,
            destination_playlist_id: "p.dest".to_string(),
        }
    }

    #[test]
    fn test_job_id_parsing() {
        let id = TransferJobId::from_string("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.as_str(), "550e8400-e29b-41d4-a716-446655440000");
        assert!(matches!(
            "not-a-uuid".parse::<TransferJobId>(),
            Err(TransferError::InvalidJobId(_))
        ));
    }

    #[test]
    fn test_status_strings() {
        for status in [
            TransferStatus::Queued,
            TransferStatus::Processing,
            TransferStatus::Succeeded,
            TransferStatus::Failed,
            TransferStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<TransferStatus>().unwrap(), status);
        }
        assert!(TransferStatus::Canceled.is_terminal());
        assert!(!TransferStatus::Processing.is_terminal());
        assert!("running".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_start_resets_progress() {
        let mut job = job();
        job.transferred_tracks = 10;
        job.total_tracks = Some(20);
        job.meta.added = 10;

        job.start("worker-a", NOW + 300_000, NOW + 1).unwrap();

        assert_eq!(job.status, TransferStatus::Processing);
        assert_eq!(job.transferred_tracks, 0);
        assert_eq!(job.total_tracks, None);
        assert_eq!(job.meta, TransferMeta::default());
        assert_eq!(job.meta.phase, TransferPhase::Initializing);
        assert_eq!(job.lease_owner.as_deref(), Some("worker-a"));
    }

    #[test]
    fn test_happy_path() {
        let mut job = job();
        job.start("w", NOW + 1, NOW).unwrap();
        job.enter_phase(TransferPhase::FetchingSourcePlaylist, NOW).unwrap();
        job.set_total_tracks(2, NOW).unwrap();
        job.record_transferred(2, NOW).unwrap();
        job.succeed(summary(), NOW + 5).unwrap();

        assert_eq!(job.status, TransferStatus::Succeeded);
        assert_eq!(job.progress().phase, TransferPhase::Complete);
        assert_eq!(job.progress().transferred_tracks, 2);
        assert!(job.lease_owner.is_none());
        assert_eq!(job.updated_at, NOW + 5);
    }

    #[test]
    fn test_transferred_cannot_exceed_total() {
        let mut job = job();
        job.start("w", NOW, NOW).unwrap();
        job.set_total_tracks(3, NOW).unwrap();
        assert!(job.record_transferred(4, NOW).is_err());
        assert!(job.record_transferred(3, NOW).is_ok());
    }

    #[test]
    fn test_retry_returns_to_queue() {
        let mut job = job();
        job.start("w", NOW, NOW).unwrap();
        job.record_error("spotify add_tracks failed with status 503", NOW);
        job.retry_at("spotify add_tracks failed with status 503", NOW + 30_000, NOW)
            .unwrap();

        assert_eq!(job.status, TransferStatus::Queued);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.run_at, NOW + 30_000);
        assert_eq!(job.meta.phase, TransferPhase::Error);
        assert!(job.lease_owner.is_none());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut queued = job();
        assert!(queued.succeed(summary(), NOW).is_err());
        assert!(queued.retry_at("x", NOW, NOW).is_err());
        assert!(queued.enter_phase(TransferPhase::AddingTracks, NOW).is_err());

        let mut done = job();
        done.start("w", NOW, NOW).unwrap();
        done.succeed(summary(), NOW).unwrap();
        assert!(done.fail("late", NOW).is_err());
        assert!(done.start("w", NOW, NOW).is_err());
        assert!(done.cancel(NOW).is_err());
    }

    #[test]
    fn test_fail_keeps_first_error_in_meta() {
        let mut job = job();
        job.start("w", NOW, NOW).unwrap();
        job.record_error("apple_music ensure_playlist failed", NOW);
        job.fail("gave up after 3 attempts", NOW).unwrap();

        assert_eq!(job.status, TransferStatus::Failed);
        assert_eq!(
            job.meta.error.as_deref(),
            Some("apple_music ensure_playlist failed")
        );
        assert_eq!(job.last_error.as_deref(), Some("gave up after 3 attempts"));
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn test_target_validation() {
        let mut target = TargetRef::new(ProviderKind::Spotify);
        assert!(target.validate().is_ok());

        target.create_if_missing = false;
        assert!(matches!(
            target.validate(),
            Err(TransferError::InvalidRequest(_))
        ));

        target.playlist_id = Some("  ".to_string());
        assert!(target.validate().is_err());

        target.playlist_id = Some("37i9dQZF1DX".to_string());
        assert!(target.validate().is_ok());
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let meta = TransferMeta {
            phase: TransferPhase::PreparingDestination,
            source: Some(MetaSource {
                provider: ProviderKind::Spotify,
                playlist_id: "src".to_string(),
                playlist_name: Some("Road Trip".to_string()),
            }),
            total_tracks: Some(2),
            matching: Some(MatchingStats {
                requested: 1,
                matched: 2,
                unmatched: 0,
                missing_isrc: 1,
            }),
            missing_isrc: vec![TrackSample {
                name: "B".to_string(),
                artists: vec!["Artist".to_string()],
                isrc: None,
            }],
            ..TransferMeta::default()
        };

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["phase"], "preparing-destination");
        assert_eq!(json["source"]["playlistName"], "Road Trip");
        assert_eq!(json["totalTracks"], 2);
        assert_eq!(json["matching"]["missingIsrc"], 1);
        assert_eq!(json["missingIsrc"][0]["name"], "B");
        assert!(json.get("summary").is_none());

        let back: TransferMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
