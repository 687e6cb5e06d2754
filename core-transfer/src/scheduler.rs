//! # Transfer Scheduler
//!
//! Background dispatch of queued transfer jobs.
//!
//! ## Overview
//!
//! Two loops run until shutdown:
//!
//! - **Dispatch**: every `poll_interval` the scheduler looks for due jobs
//!   (`queued` with `run_at <= now`) and starts as many as the worker
//!   semaphore allows. Each job is claimed with a conditional update, its
//!   lease renewed every `lease_duration / 3` while the orchestrator runs.
//! - **Cleanup**: every `cleanup_interval` jobs stuck in `processing` past
//!   `stale_threshold` are recovered and terminal jobs older than
//!   `retention_days` are deleted. A recovered job has lost an attempt; it
//!   is requeued, or failed once `max_attempts` is reached.
//!
//! ## Retry policy
//!
//! A failed attempt whose error is retryable goes back to `queued` with an
//! exponential backoff while `attempts < max_attempts`. Authorization and
//! validation failures are final. Lock conflicts mean another worker owns
//! the job and are skipped without touching it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let scheduler = Arc::new(TransferScheduler::new(orchestrator, config, event_bus));
//! let handle = scheduler.spawn();
//! // ...
//! handle.shutdown().await;
//! ```

use crate::job::{TransferJob, TransferJobId, TransferStatus};
use crate::orchestrator::TransferOrchestrator;
use crate::repository::TransferJobRepository;
use crate::{Result, TransferError};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::SchedulerConfig;
use core_runtime::events::{CoreEvent, EventBus, SchedulerEvent, TransferEvent};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Counts from one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub requeued: u64,
    /// Stale jobs that had used up their attempts
    pub failed: u64,
    pub pruned: u64,
}

pub struct TransferScheduler {
    orchestrator: Arc<TransferOrchestrator>,
    repository: Arc<dyn TransferJobRepository>,
    config: SchedulerConfig,
    event_bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    worker_id: String,
    workers: Arc<Semaphore>,
}

impl TransferScheduler {
    pub fn new(
        orchestrator: Arc<TransferOrchestrator>,
        config: SchedulerConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let repository = Arc::clone(orchestrator.repository());
        let workers = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            orchestrator,
            repository,
            config,
            event_bus,
            clock: Arc::new(SystemClock),
            worker_id: format!("worker-{}", Uuid::new_v4()),
            workers,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Starts the dispatch and cleanup loops on the current runtime.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let shutdown = CancellationToken::new();

        info!(
            worker_id = %self.worker_id,
            concurrency = self.config.concurrency,
            "Starting transfer scheduler"
        );
        self.event_bus
            .emit(CoreEvent::Scheduler(SchedulerEvent::Started {
                concurrency: self.config.concurrency as u32,
            }))
            .ok();

        let dispatch = tokio::spawn(Arc::clone(&self).run_dispatch(shutdown.clone()));
        let cleanup = tokio::spawn(Arc::clone(&self).run_cleanup(shutdown.clone()));

        SchedulerHandle {
            shutdown,
            dispatch,
            cleanup,
            event_bus: Arc::clone(&self.event_bus),
        }
    }

    async fn run_dispatch(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.dispatch_due(&mut workers).await {
                        warn!(error = %e, "Dispatch poll failed");
                    }
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Transfer worker panicked");
                    }
                }
            }
        }

        debug!(in_flight = workers.len(), "Waiting for in-flight transfers");
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Transfer worker panicked");
            }
        }
    }

    async fn run_cleanup(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_once().await {
                        warn!(error = %e, "Cleanup pass failed");
                    }
                }
            }
        }
    }

    /// Claims and spawns as many due jobs as there are free workers.
    ///
    /// Returns the number of jobs handed to workers.
    pub async fn dispatch_due(self: &Arc<Self>, workers: &mut JoinSet<()>) -> Result<usize> {
        let free = self.workers.available_permits();
        if free == 0 {
            return Ok(0);
        }

        let due = self.repository.find_due(free as u32).await?;
        let mut started = 0;
        for job in due {
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                break;
            };
            let scheduler = Arc::clone(self);
            workers.spawn(async move {
                let _permit = permit;
                if let Err(e) = scheduler.run_job(&job.id).await {
                    warn!(job_id = %job.id, error = %e, "Transfer job bookkeeping failed");
                }
            });
            started += 1;
        }

        if started > 0 {
            debug!(started, "Dispatched transfer jobs");
        }
        Ok(started)
    }

    /// Claims one job and runs it to a terminal state or a retry.
    ///
    /// Returns `None` when another worker holds the job.
    #[instrument(skip(self, id), fields(job_id = %id, worker_id = %self.worker_id))]
    pub async fn run_job(&self, id: &TransferJobId) -> Result<Option<TransferJob>> {
        let mut job = match self
            .repository
            .acquire_lease(id, &self.worker_id, self.config.lease_duration)
            .await
        {
            Ok(job) => job,
            Err(e) if e.is_lock_conflict() => {
                debug!("Job already claimed, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        info!(attempt = job.attempts + 1, "Transfer started");
        self.event_bus
            .emit(CoreEvent::Transfer(TransferEvent::Started {
                job_id: job.id.to_string(),
                attempt: job.attempts + 1,
            }))
            .ok();

        let result = tokio::select! {
            result = self.orchestrator.execute(&mut job, &self.worker_id) => result.map(|_| ()),
            lost = self.keep_lease(id) => Err(lost),
        };

        match result {
            Ok(()) => Ok(Some(job)),
            Err(e) if e.is_lock_conflict() => {
                debug!(error = %e, "Lease lost, abandoning run");
                Ok(None)
            }
            Err(e) => self.settle_failure(job, e).await.map(Some),
        }
    }

    /// Renews the lease until renewal is refused; returns that refusal.
    async fn keep_lease(&self, id: &TransferJobId) -> TransferError {
        let mut ticker = interval(self.config.renew_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match self
                .repository
                .renew_lease(id, &self.worker_id, self.config.lease_duration)
                .await
            {
                Ok(expires_at) => debug!(expires_at, "Lease renewed"),
                Err(e) if e.is_lock_conflict() => return e,
                Err(e) => warn!(error = %e, "Lease renewal failed, retrying"),
            }
        }
    }

    /// Applies the retry policy to a failed attempt and releases the lease.
    async fn settle_failure(&self, mut job: TransferJob, error: TransferError) -> Result<TransferJob> {
        if job.status != TransferStatus::Processing {
            warn!(status = %job.status, error = %error, "Job left processing before failing");
            return Ok(job);
        }

        let now = self.clock.unix_timestamp_millis();
        let message = error.to_string();
        let failed_attempts = job.attempts + 1;

        if error.is_retryable() && failed_attempts < self.config.max_attempts {
            let delay = self.config.retry_delay(failed_attempts);
            let run_at = now + delay.as_millis() as i64;
            job.retry_at(message.clone(), run_at, now)?;
            warn!(
                attempts = job.attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %message,
                "Transfer attempt failed, retrying"
            );
            self.event_bus
                .emit(CoreEvent::Transfer(TransferEvent::Requeued {
                    job_id: job.id.to_string(),
                    message,
                    attempts: job.attempts,
                    run_at,
                }))
                .ok();
        } else {
            job.fail(message.clone(), now)?;
            error!(attempts = job.attempts, error = %message, "Transfer failed");
            self.event_bus
                .emit(CoreEvent::Transfer(TransferEvent::Failed {
                    job_id: job.id.to_string(),
                    message,
                    attempts: job.attempts,
                }))
                .ok();
        }

        match self.repository.release(&job, &self.worker_id).await {
            Ok(()) => Ok(job),
            Err(e) if e.is_lock_conflict() => {
                debug!("Lease lost before the failure could be stored");
                Ok(job)
            }
            Err(e) => Err(e),
        }
    }

    /// Requeues stale jobs and prunes expired ones.
    pub async fn cleanup_once(&self) -> Result<CleanupReport> {
        let recovery = self
            .repository
            .requeue_stale(self.config.stale_threshold, self.config.max_attempts)
            .await?;
        if recovery.failed > 0 {
            warn!(count = recovery.failed, "Stale transfer jobs ran out of attempts");
        }
        let requeued = recovery.requeued;
        if requeued > 0 {
            info!(count = requeued, "Requeued stale transfer jobs");
            self.event_bus
                .emit(CoreEvent::Scheduler(SchedulerEvent::StaleJobsRequeued {
                    count: requeued,
                }))
                .ok();
        }

        let pruned = self.repository.prune(self.config.retention_days).await?;
        if pruned > 0 {
            info!(count = pruned, "Pruned finished transfer jobs");
            self.event_bus
                .emit(CoreEvent::Scheduler(SchedulerEvent::JobsPruned { count: pruned }))
                .ok();
        }

        Ok(CleanupReport {
            requeued,
            failed: recovery.failed,
            pruned,
        })
    }
}

/// Running scheduler loops.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    dispatch: JoinHandle<()>,
    cleanup: JoinHandle<()>,
    event_bus: Arc<EventBus>,
}

impl SchedulerHandle {
    /// Stops polling and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.dispatch.await {
            error!(error = %e, "Dispatch loop ended abnormally");
        }
        if let Err(e) = self.cleanup.await {
            error!(error = %e, "Cleanup loop ended abnormally");
        }
        self.event_bus
            .emit(CoreEvent::Scheduler(SchedulerEvent::Stopped))
            .ok();
        info!("Transfer scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}
