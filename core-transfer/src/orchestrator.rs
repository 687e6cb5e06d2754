//! # Transfer Orchestrator
//!
//! Runs one claimed job through its phases:
//!
//! 1. `fetching-source-playlist`: read the source playlist with all pages
//! 2. `matching-tracks`: reconcile tracks against the target catalog
//! 3. `preparing-destination`: verify or create the target playlist
//! 4. `adding-tracks`: write matched ids in provider-sized batches
//! 5. `complete`: store the summary and release the lease
//!
//! Every phase change and every written batch is checkpointed with a write
//! guarded by the lease owner, so a worker that lost its lease stops at its
//! next checkpoint with [`TransferError::LockConflict`].
//!
//! The orchestrator records failures on the job (`phase = error`, message in
//! `meta.error` and `last_error`) but leaves the retry decision to the
//! scheduler.

use crate::job::{MetaSource, MetaTarget, TransferJob, TransferPhase, TransferStatus, TransferSummary};
use crate::provider::{dedupe_against, EnsurePlaylistRequest, TransferProvider};
use crate::reconciler::Reconciler;
use crate::registry::ProviderFactory;
use crate::repository::TransferJobRepository;
use crate::{Result, TransferError};
use bridge_traits::time::{Clock, SystemClock};
use core_auth::{CredentialStore, ProviderCredential, ProviderKind, UserId};
use core_runtime::config::MatchingConfig;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct TransferOrchestrator {
    repository: Arc<dyn TransferJobRepository>,
    credentials: Arc<dyn CredentialStore>,
    providers: Arc<dyn ProviderFactory>,
    matching: MatchingConfig,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
}

impl TransferOrchestrator {
    pub fn new(
        repository: Arc<dyn TransferJobRepository>,
        credentials: Arc<dyn CredentialStore>,
        providers: Arc<dyn ProviderFactory>,
        matching: MatchingConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repository,
            credentials,
            providers,
            matching,
            event_bus,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn repository(&self) -> &Arc<dyn TransferJobRepository> {
        &self.repository
    }

    /// Executes a job already claimed by `owner`.
    ///
    /// On success the job is `succeeded`, persisted, and its lease released.
    /// On failure the error has been recorded on the job (and persisted when
    /// the lease still allows it); the job is still `processing`.
    #[instrument(
        skip(self, job),
        fields(
            job_id = %job.id,
            source = %job.source.provider,
            target = %job.target.provider
        )
    )]
    pub async fn execute(&self, job: &mut TransferJob, owner: &str) -> Result<TransferSummary> {
        match self.run_phases(job, owner).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                if !e.is_lock_conflict() && job.status == TransferStatus::Processing {
                    job.record_error(e.to_string(), self.now());
                    if let Err(save_error) = self.repository.save_checkpoint(job, owner).await {
                        warn!(error = %save_error, "Failed to record job error");
                    }
                }
                Err(e)
            }
        }
    }

    async fn run_phases(&self, job: &mut TransferJob, owner: &str) -> Result<TransferSummary> {
        job.target.validate()?;

        let source = self.adapter(&job.user_id, job.source.provider).await?;
        let target = self.adapter(&job.user_id, job.target.provider).await?;

        // Phase 1: source playlist
        self.enter_phase(job, owner, TransferPhase::FetchingSourcePlaylist)
            .await?;
        let playlist = source.get_playlist(&job.source.playlist_id).await?;
        let total = playlist.tracks.len() as u64;
        info!(tracks = total, playlist = %playlist.name, "Fetched source playlist");

        job.set_total_tracks(total, self.now())?;
        job.meta.source = Some(MetaSource {
            provider: job.source.provider,
            playlist_id: job.source.playlist_id.clone(),
            playlist_name: Some(playlist.name.clone()),
        });
        self.checkpoint(job, owner).await?;

        // Phase 2: reconciliation
        self.enter_phase(job, owner, TransferPhase::MatchingTracks)
            .await?;
        let outcome = Reconciler::new(target.as_ref(), &self.matching)
            .reconcile(&playlist.tracks, source.kind().has_reliable_isrc())
            .await?;
        info!(
            matched = outcome.matched(),
            unmatched = outcome.unmatched_count,
            missing_isrc = outcome.missing_isrc_count,
            "Reconciled source tracks"
        );

        job.meta.matching = Some(outcome.stats());
        job.meta.missing_isrc = outcome.missing_isrc.clone();
        job.meta.unmatched = outcome.unmatched.clone();
        self.checkpoint(job, owner).await?;

        // Phase 3: destination playlist
        self.enter_phase(job, owner, TransferPhase::PreparingDestination)
            .await?;
        let request = EnsurePlaylistRequest {
            playlist_id: job
                .target
                .playlist_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            name: job
                .target
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(&playlist.name)
                .to_string(),
            description: playlist.description.clone(),
            public: playlist.public,
        };
        let destination = target.ensure_playlist(&request).await?;
        debug!(
            playlist_id = %destination.playlist_id,
            created = destination.created,
            "Destination playlist ready"
        );

        job.meta.target = Some(MetaTarget {
            provider: job.target.provider,
            playlist_id: destination.playlist_id.clone(),
            playlist_name: destination.name.clone(),
            created: destination.created,
        });
        self.checkpoint(job, owner).await?;

        // Phase 4: writes
        self.enter_phase(job, owner, TransferPhase::AddingTracks)
            .await?;
        let track_ids = dedupe_against(std::iter::empty(), &outcome.track_ids);
        let written = self
            .write_batches(job, owner, target.as_ref(), &destination.playlist_id, &track_ids)
            .await?;

        // Phase 5: done
        let summary = TransferSummary {
            total_tracks: total,
            transferred: written,
            skipped_missing_isrc: outcome.missing_isrc_count,
            unmatched: outcome.unmatched_count,
            destination_playlist_id: destination.playlist_id.clone(),
        };
        job.succeed(summary.clone(), self.now())?;
        self.repository.release(job, owner).await?;

        info!(
            transferred = summary.transferred,
            unmatched = summary.unmatched,
            "Transfer completed"
        );
        self.event_bus
            .emit(CoreEvent::Transfer(TransferEvent::Completed {
                job_id: job.id.to_string(),
                transferred: summary.transferred,
                total: summary.total_tracks,
                unmatched: summary.unmatched,
                playlist_id: summary.destination_playlist_id.clone(),
            }))
            .ok();

        Ok(summary)
    }

    async fn write_batches(
        &self,
        job: &mut TransferJob,
        owner: &str,
        target: &dyn TransferProvider,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<u64> {
        let batch_size = target.kind().add_batch_size().max(1);
        let mut written = 0u64;

        for (index, batch) in track_ids.chunks(batch_size).enumerate() {
            let appended = target.add_tracks(playlist_id, batch).await?;
            written += batch.len() as u64;
            debug!(
                batch = index,
                size = batch.len(),
                appended,
                written,
                "Wrote batch"
            );

            job.record_transferred(written, self.now())?;
            self.checkpoint(job, owner).await?;
        }

        Ok(written)
    }

    async fn adapter(
        &self,
        user_id: &UserId,
        kind: ProviderKind,
    ) -> Result<Arc<dyn TransferProvider>> {
        let credential = self
            .credentials
            .credential(user_id, kind)
            .await?
            .filter(ProviderCredential::is_usable)
            .ok_or_else(|| {
                TransferError::Authorization(format!(
                    "No usable {} credential for user {}",
                    kind.display_name(),
                    user_id
                ))
            })?;

        self.providers.create(kind, credential)
    }

    async fn enter_phase(
        &self,
        job: &mut TransferJob,
        owner: &str,
        phase: TransferPhase,
    ) -> Result<()> {
        debug!(phase = %phase, "Entering phase");
        job.enter_phase(phase, self.now())?;
        self.checkpoint(job, owner).await
    }

    async fn checkpoint(&self, job: &TransferJob, owner: &str) -> Result<()> {
        self.repository.save_checkpoint(job, owner).await?;
        self.event_bus
            .emit(CoreEvent::Transfer(TransferEvent::Progress {
                job_id: job.id.to_string(),
                phase: job.meta.phase.as_str().to_string(),
                transferred: job.transferred_tracks,
                total: job.total_tracks,
            }))
            .ok();
        Ok(())
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::job::{SourceRef, TargetRef};
    use crate::repository::SqliteTransferJobRepository;
    use core_auth::InMemoryCredentialStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts calls and never builds an adapter.
    #[derive(Default)]
    struct CountingFactory {
        calls: AtomicUsize,
    }

    impl ProviderFactory for CountingFactory {
        fn create(
            &self,
            kind: ProviderKind,
            _credential: ProviderCredential,
        ) -> Result<Arc<dyn TransferProvider>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::Authorization(format!("{} is not configured", kind)))
        }

        fn supports(&self, _kind: ProviderKind) -> bool {
            true
        }
    }

    async fn claimed_job(
        repository: &SqliteTransferJobRepository,
        target: TargetRef,
    ) -> TransferJob {
        let job = TransferJob::new(
            UserId::new("user-1"),
            SourceRef {
                provider: ProviderKind::Spotify,
                playlist_id: "src".to_string(),
            },
            target,
            serde_json::json!({}),
            0,
        );
        repository.insert(&job).await.unwrap();
        repository
            .acquire_lease(&job.id, "worker-1", Duration::from_secs(60))
            .await
            .unwrap()
    }

    fn orchestrator(
        repository: Arc<SqliteTransferJobRepository>,
        credentials: Arc<InMemoryCredentialStore>,
        factory: Arc<CountingFactory>,
    ) -> TransferOrchestrator {
        TransferOrchestrator::new(
            repository,
            credentials,
            factory,
            MatchingConfig::default(),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn test_missing_target_id_fails_before_provider_calls() {
        let pool = create_test_pool().await.unwrap();
        let repository = Arc::new(SqliteTransferJobRepository::new(pool));
        let factory = Arc::new(CountingFactory::default());
        let orchestrator = orchestrator(
            repository.clone(),
            Arc::new(InMemoryCredentialStore::new()),
            factory.clone(),
        );

        let mut target = TargetRef::new(ProviderKind::AppleMusic);
        target.create_if_missing = false;
        let mut job = claimed_job(&repository, target).await;

        let err = orchestrator.execute(&mut job, "worker-1").await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);

        let stored = repository.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.meta.phase, TransferPhase::Error);
        assert!(stored.last_error.unwrap().contains("createIfMissing"));
        assert_eq!(stored.status, TransferStatus::Processing);
    }

    #[tokio::test]
    async fn test_missing_credential_is_authorization_error() {
        let pool = create_test_pool().await.unwrap();
        let repository = Arc::new(SqliteTransferJobRepository::new(pool));
        let factory = Arc::new(CountingFactory::default());
        let orchestrator = orchestrator(
            repository.clone(),
            Arc::new(InMemoryCredentialStore::new()),
            factory.clone(),
        );

        let mut job = claimed_job(&repository, TargetRef::new(ProviderKind::SoundCloud)).await;

        let err = orchestrator.execute(&mut job, "worker-1").await.unwrap_err();
        assert!(err.is_authorization());
        assert!(!err.is_retryable());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
        assert_eq!(job.meta.error.as_deref(), Some(err.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_error_write_requires_the_lease() {
        let pool = create_test_pool().await.unwrap();
        let repository = Arc::new(SqliteTransferJobRepository::new(pool));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        for kind in [ProviderKind::Spotify, ProviderKind::SoundCloud] {
            credentials
                .insert(
                    UserId::new("user-1"),
                    kind,
                    ProviderCredential::new("token", "account"),
                )
                .await;
        }
        let factory = Arc::new(CountingFactory::default());
        let orchestrator = orchestrator(repository.clone(), credentials, factory);

        let mut job = claimed_job(&repository, TargetRef::new(ProviderKind::SoundCloud)).await;
        job.lease_owner = Some("someone-else".to_string());

        let err = orchestrator.execute(&mut job, "someone-else").await.unwrap_err();
        assert!(err.is_authorization());

        // The stored copy belongs to worker-1 and was not touched.
        let stored = repository.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.lease_owner.as_deref(), Some("worker-1"));
        assert!(stored.last_error.is_none());
    }
}
