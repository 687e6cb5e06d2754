//! # Transfer Job Repository
//!
//! SQLite persistence for transfer jobs.
//!
//! ## Overview
//!
//! Besides plain inserts and lookups the repository implements the execution
//! lease that keeps a job owned by a single worker:
//!
//! - [`acquire_lease`](TransferJobRepository::acquire_lease) claims a due
//!   `queued` job with a conditional `UPDATE`
//! - [`renew_lease`](TransferJobRepository::renew_lease) extends the lease and
//!   refreshes `updated_at`
//! - [`save_checkpoint`](TransferJobRepository::save_checkpoint) and
//!   [`release`](TransferJobRepository::release) write only while the caller
//!   still holds the lease
//!
//! Every guarded write that matches no row yields
//! [`TransferError::LockConflict`].

use crate::{
    Result, SourceRef, TargetRef, TransferError, TransferJob, TransferJobId, TransferMeta,
    TransferStatus,
};
use async_trait::async_trait;
use bridge_traits::{Clock, SystemClock};
use core_auth::{ProviderKind, UserId};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait TransferJobRepository: Send + Sync {
    /// Stores a new job.
    async fn insert(&self, job: &TransferJob) -> Result<()>;

    /// Stores several jobs atomically.
    async fn insert_many(&self, jobs: &[TransferJob]) -> Result<()>;

    async fn find_by_id(&self, id: &TransferJobId) -> Result<Option<TransferJob>>;

    /// Queued jobs whose `run_at` has passed, oldest first.
    async fn find_due(&self, limit: u32) -> Result<Vec<TransferJob>>;

    /// Claims a due queued job for `owner` and moves it to `processing`.
    ///
    /// # Errors
    ///
    /// `LockConflict` if the job is not queued, not yet due, or another
    /// worker claimed it first. `JobNotFound` if it does not exist.
    async fn acquire_lease(
        &self,
        id: &TransferJobId,
        owner: &str,
        lease: Duration,
    ) -> Result<TransferJob>;

    /// Extends the lease held by `owner`. Returns the new expiry.
    async fn renew_lease(&self, id: &TransferJobId, owner: &str, lease: Duration) -> Result<i64>;

    /// Persists progress of a running job while `owner` holds its lease.
    async fn save_checkpoint(&self, job: &TransferJob, owner: &str) -> Result<()>;

    /// Persists the outcome of a run (terminal or requeued) and drops the lease.
    async fn release(&self, job: &TransferJob, owner: &str) -> Result<()>;

    /// Cancels a job that has not started yet.
    async fn cancel(&self, id: &TransferJobId) -> Result<TransferJob>;

    /// Recovers `processing` jobs not updated within `threshold`.
    ///
    /// The lost run counts as an attempt: the job goes back to the queue, or
    /// fails when that attempt was its last of `max_attempts`.
    async fn requeue_stale(&self, threshold: Duration, max_attempts: u32) -> Result<StaleRecovery>;

    /// Deletes terminal jobs last updated more than `retention_days` ago.
    async fn prune(&self, retention_days: u32) -> Result<u64>;
}

/// Outcome of one stale job sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleRecovery {
    pub requeued: u64,
    pub failed: u64,
}

impl StaleRecovery {
    pub fn total(&self) -> u64 {
        self.requeued + self.failed
    }
}

/// Stored on jobs whose worker stopped renewing its lease.
pub const LEASE_EXPIRED_MESSAGE: &str = "worker lease expired before the transfer finished";

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteTransferJobRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTransferJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now(&self) -> i64 {
        self.clock.unix_timestamp_millis()
    }

    async fn write_guarded(&self, job: &TransferJob, owner: &str) -> Result<()> {
        let meta = serde_json::to_string(&job.meta)?;

        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs SET
                status = ?,
                attempts = ?,
                meta = ?,
                transferred_tracks = ?,
                total_tracks = ?,
                last_error = ?,
                run_at = ?,
                lease_owner = ?,
                lease_expires_at = CASE WHEN ? THEN NULL ELSE lease_expires_at END,
                updated_at = ?
            WHERE id = ? AND lease_owner = ? AND status = 'processing'
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.attempts as i64)
        .bind(meta)
        .bind(job.transferred_tracks as i64)
        .bind(job.total_tracks.map(|t| t as i64))
        .bind(&job.last_error)
        .bind(job.run_at)
        .bind(&job.lease_owner)
        // The expiry belongs to renew_lease; a write only clears it on release.
        .bind(job.lease_owner.is_none())
        .bind(job.updated_at)
        .bind(job.id.as_str())
        .bind(owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::LockConflict {
                job_id: job.id.to_string(),
            });
        }

        Ok(())
    }
}

/// Database row representation of a transfer job
#[derive(Debug, FromRow)]
struct TransferJobRow {
    id: String,
    user_id: String,
    source_provider: String,
    source_playlist_id: String,
    target_provider: String,
    target_playlist_id: Option<String>,
    target_name: Option<String>,
    target_create_if_missing: bool,
    options: String,
    status: String,
    attempts: i64,
    meta: String,
    transferred_tracks: i64,
    total_tracks: Option<i64>,
    last_error: Option<String>,
    run_at: i64,
    lease_owner: Option<String>,
    lease_expires_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

fn parse_provider(column: &str, value: &str) -> Result<ProviderKind> {
    ProviderKind::parse(value)
        .ok_or_else(|| TransferError::Database(format!("Invalid {}: {}", column, value)))
}

impl TryFrom<TransferJobRow> for TransferJob {
    type Error = TransferError;

    fn try_from(row: TransferJobRow) -> Result<Self> {
        let meta: TransferMeta = if row.meta.trim().is_empty() {
            TransferMeta::default()
        } else {
            serde_json::from_str(&row.meta)?
        };
        let options: serde_json::Value = if row.options.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&row.options)?
        };

        Ok(TransferJob {
            id: TransferJobId::from_string(&row.id)?,
            user_id: UserId::new(row.user_id),
            source: SourceRef {
                provider: parse_provider("source_provider", &row.source_provider)?,
                playlist_id: row.source_playlist_id,
            },
            target: TargetRef {
                provider: parse_provider("target_provider", &row.target_provider)?,
                playlist_id: row.target_playlist_id,
                create_if_missing: row.target_create_if_missing,
                name: row.target_name,
            },
            options,
            status: row.status.parse()?,
            attempts: row.attempts.max(0) as u32,
            meta,
            transferred_tracks: row.transferred_tracks.max(0) as u64,
            total_tracks: row.total_tracks.map(|t| t.max(0) as u64),
            last_error: row.last_error,
            run_at: row.run_at,
            lease_owner: row.lease_owner,
            lease_expires_at: row.lease_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, source_provider, source_playlist_id,
           target_provider, target_playlist_id, target_name, target_create_if_missing,
           options, status, attempts, meta, transferred_tracks, total_tracks,
           last_error, run_at, lease_owner, lease_expires_at, created_at, updated_at
    FROM transfer_jobs
"#;

const INSERT_JOB: &str = r#"
    INSERT INTO transfer_jobs (
        id, user_id, source_provider, source_playlist_id,
        target_provider, target_playlist_id, target_name, target_create_if_missing,
        options, status, attempts, meta, transferred_tracks, total_tracks,
        last_error, run_at, lease_owner, lease_expires_at, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

async fn insert_job<'e, E>(executor: E, job: &TransferJob) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let options = serde_json::to_string(&job.options)?;
    let meta = serde_json::to_string(&job.meta)?;

    sqlx::query(INSERT_JOB)
        .bind(job.id.as_str())
        .bind(job.user_id.as_str())
        .bind(job.source.provider.as_str())
        .bind(&job.source.playlist_id)
        .bind(job.target.provider.as_str())
        .bind(&job.target.playlist_id)
        .bind(&job.target.name)
        .bind(job.target.create_if_missing)
        .bind(options)
        .bind(job.status.as_str())
        .bind(job.attempts as i64)
        .bind(meta)
        .bind(job.transferred_tracks as i64)
        .bind(job.total_tracks.map(|t| t as i64))
        .bind(&job.last_error)
        .bind(job.run_at)
        .bind(&job.lease_owner)
        .bind(job.lease_expires_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(executor)
        .await?;

    Ok(())
}

#[async_trait]
impl TransferJobRepository for SqliteTransferJobRepository {
    async fn insert(&self, job: &TransferJob) -> Result<()> {
        insert_job(&self.pool, job).await
    }

    async fn insert_many(&self, jobs: &[TransferJob]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            insert_job(&mut *tx, job).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &TransferJobId) -> Result<Option<TransferJob>> {
        let row = sqlx::query_as::<_, TransferJobRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TransferJob::try_from).transpose()
    }

    async fn find_due(&self, limit: u32) -> Result<Vec<TransferJob>> {
        let rows = sqlx::query_as::<_, TransferJobRow>(&format!(
            "{} WHERE status = 'queued' AND run_at <= ? ORDER BY run_at ASC, created_at ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(self.now())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(TransferJob::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn acquire_lease(
        &self,
        id: &TransferJobId,
        owner: &str,
        lease: Duration,
    ) -> Result<TransferJob> {
        let mut job = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| TransferError::JobNotFound {
                job_id: id.to_string(),
            })?;

        let now = self.now();
        if job.status != TransferStatus::Queued || job.run_at > now {
            return Err(TransferError::LockConflict {
                job_id: id.to_string(),
            });
        }

        job.start(owner, now + lease.as_millis() as i64, now)?;
        let meta = serde_json::to_string(&job.meta)?;

        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs SET
                status = 'processing',
                meta = ?,
                transferred_tracks = 0,
                total_tracks = NULL,
                lease_owner = ?,
                lease_expires_at = ?,
                updated_at = ?
            WHERE id = ? AND status = 'queued' AND run_at <= ?
            "#,
        )
        .bind(meta)
        .bind(owner)
        .bind(job.lease_expires_at)
        .bind(now)
        .bind(id.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(job_id = %id, owner, "Lost lease race");
            return Err(TransferError::LockConflict {
                job_id: id.to_string(),
            });
        }

        debug!(job_id = %id, owner, "Lease acquired");
        Ok(job)
    }

    async fn renew_lease(&self, id: &TransferJobId, owner: &str, lease: Duration) -> Result<i64> {
        let now = self.now();
        let expires_at = now + lease.as_millis() as i64;

        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs SET lease_expires_at = ?, updated_at = ?
            WHERE id = ? AND lease_owner = ? AND status = 'processing'
            "#,
        )
        .bind(expires_at)
        .bind(now)
        .bind(id.as_str())
        .bind(owner)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::LockConflict {
                job_id: id.to_string(),
            });
        }

        Ok(expires_at)
    }

    async fn save_checkpoint(&self, job: &TransferJob, owner: &str) -> Result<()> {
        if job.status != TransferStatus::Processing {
            return Err(TransferError::InvalidStateTransition {
                from: job.status.as_str().to_string(),
                to: "checkpoint".to_string(),
                reason: "Only a processing job can be checkpointed".to_string(),
            });
        }
        self.write_guarded(job, owner).await
    }

    async fn release(&self, job: &TransferJob, owner: &str) -> Result<()> {
        if job.status == TransferStatus::Processing || job.lease_owner.is_some() {
            return Err(TransferError::InvalidStateTransition {
                from: job.status.as_str().to_string(),
                to: "release".to_string(),
                reason: "Job must leave processing before its lease is released".to_string(),
            });
        }
        self.write_guarded(job, owner).await
    }

    async fn cancel(&self, id: &TransferJobId) -> Result<TransferJob> {
        let mut job = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| TransferError::JobNotFound {
                job_id: id.to_string(),
            })?;

        job.cancel(self.now())?;

        let result = sqlx::query(
            "UPDATE transfer_jobs SET status = 'canceled', updated_at = ? WHERE id = ? AND status = 'queued'",
        )
        .bind(job.updated_at)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::LockConflict {
                job_id: id.to_string(),
            });
        }

        Ok(job)
    }

    async fn requeue_stale(&self, threshold: Duration, max_attempts: u32) -> Result<StaleRecovery> {
        let now = self.now();
        let cutoff = now - threshold.as_millis() as i64;

        let rows = sqlx::query_as::<_, TransferJobRow>(&format!(
            "{} WHERE status = 'processing' AND updated_at < ? ORDER BY updated_at ASC",
            SELECT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut recovery = StaleRecovery::default();
        for row in rows {
            let mut job = TransferJob::try_from(row)?;
            let seen_at = job.updated_at;

            let exhausted = job.attempts.saturating_add(1) >= max_attempts;
            if exhausted {
                job.fail(LEASE_EXPIRED_MESSAGE, now)?;
            } else {
                job.retry_at(LEASE_EXPIRED_MESSAGE, now, now)?;
            }

            let meta = serde_json::to_string(&job.meta)?;
            let result = sqlx::query(
                r#"
                UPDATE transfer_jobs SET
                    status = ?,
                    attempts = ?,
                    meta = ?,
                    last_error = ?,
                    run_at = ?,
                    lease_owner = NULL,
                    lease_expires_at = NULL,
                    updated_at = ?
                WHERE id = ? AND status = 'processing' AND updated_at = ?
                "#,
            )
            .bind(job.status.as_str())
            .bind(job.attempts as i64)
            .bind(meta)
            .bind(&job.last_error)
            .bind(job.run_at)
            .bind(job.updated_at)
            .bind(job.id.as_str())
            .bind(seen_at)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                debug!(job_id = %job.id, "Stale job changed during sweep, leaving it");
                continue;
            }
            if exhausted {
                recovery.failed += 1;
            } else {
                recovery.requeued += 1;
            }
        }

        if recovery.total() > 0 {
            info!(
                requeued = recovery.requeued,
                failed = recovery.failed,
                "Recovered stale transfer jobs"
            );
        }
        Ok(recovery)
    }

    async fn prune(&self, retention_days: u32) -> Result<u64> {
        let cutoff = self.now() - i64::from(retention_days) * DAY_MS;

        let result = sqlx::query(
            r#"
            DELETE FROM transfer_jobs
            WHERE status IN ('succeeded', 'failed', 'canceled') AND updated_at < ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            info!(count, retention_days, "Pruned old transfer jobs");
        }
        Ok(count)
    }
}
