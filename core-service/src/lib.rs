//! Core service façade and bootstrap helpers.
//!
//! This crate wires the job store, the credential lookup and the provider
//! adapters into a single [`CoreService`] handle. Hosts either call
//! [`bootstrap`] with a [`CoreConfig`], or assemble [`CoreDependencies`]
//! themselves (tests do this with in-memory stores and fake providers).
//!
//! ```rust,ignore
//! let config = CoreConfig::builder()
//!     .database_path("transfers.db")
//!     .providers(ProviderApiConfig::default().with_apple_music_developer_token(token))
//!     .build()?;
//! let core = bootstrap(config, credentials).await?;
//! core.start().await;
//!
//! let ids = core
//!     .submit(&user, vec![TransferRequest::new("spotify", "37i9dQZF1DX", "apple_music")])
//!     .await?;
//! let status = core.status(&ids[0].to_string()).await?;
//! ```

pub mod error;
pub mod providers;
pub mod request;

pub use error::{CoreError, Result};
pub use providers::DefaultProviderFactory;
pub use request::{ProgressView, TransferOptions, TransferRequest, TransferStatusView};

pub use core_auth::{CredentialStore, InMemoryCredentialStore, ProviderCredential, ProviderKind, UserId};
pub use core_runtime::config::{
    CoreConfig, MatchingConfig, ProviderApiConfig, SchedulerConfig,
};
pub use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
pub use core_transfer::{TransferJob, TransferJobId, TransferPhase, TransferStatus};

use std::sync::Arc;

use bridge_traits::time::{Clock, SystemClock};
use core_transfer::{
    create_pool, DatabaseConfig, ProviderFactory, SchedulerHandle, SqliteTransferJobRepository,
    TransferError, TransferJobRepository, TransferOrchestrator, TransferScheduler,
};
use tokio::sync::{broadcast::Receiver, Mutex};
use tracing::{info, instrument, warn};

/// Aggregated handle to everything the core needs from its host.
pub struct CoreDependencies {
    pub repository: Arc<dyn TransferJobRepository>,
    pub credentials: Arc<dyn CredentialStore>,
    pub providers: Arc<dyn ProviderFactory>,
    pub clock: Arc<dyn Clock>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit handles.
    pub fn new(
        repository: Arc<dyn TransferJobRepository>,
        credentials: Arc<dyn CredentialStore>,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            repository,
            credentials,
            providers,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    deps: Arc<CoreDependencies>,
    orchestrator: Arc<TransferOrchestrator>,
    scheduler_config: SchedulerConfig,
    event_bus: Arc<EventBus>,
    scheduler: Arc<Mutex<Option<SchedulerHandle>>>,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    ///
    /// Nothing runs until [`start`](Self::start) is called; submitted jobs
    /// simply wait in the store.
    pub fn new(
        deps: CoreDependencies,
        scheduler_config: SchedulerConfig,
        matching: MatchingConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let orchestrator = TransferOrchestrator::new(
            Arc::clone(&deps.repository),
            Arc::clone(&deps.credentials),
            Arc::clone(&deps.providers),
            matching,
            Arc::clone(&event_bus),
        )
        .with_clock(Arc::clone(&deps.clock));

        Self {
            deps: Arc::new(deps),
            orchestrator: Arc::new(orchestrator),
            scheduler_config,
            event_bus,
            scheduler: Arc::new(Mutex::new(None)),
        }
    }

    /// Access the dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Subscribe to job and scheduler events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Validates and enqueues a batch of transfers for `user_id`.
    ///
    /// Either every item is stored or none is. Returned ids follow the input
    /// order.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidRequest`] for an empty batch or any invalid item
    /// - [`CoreError::Transfer`] when the job store rejects the write
    #[instrument(skip(self, requests), fields(user_id = %user_id, count = requests.len()))]
    pub async fn submit(
        &self,
        user_id: &UserId,
        requests: Vec<TransferRequest>,
    ) -> Result<Vec<TransferJobId>> {
        if requests.is_empty() {
            return Err(CoreError::InvalidRequest(
                "at least one transfer is required".to_string(),
            ));
        }

        let now = self.deps.clock.unix_timestamp_millis();
        let jobs = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| request.into_job(index, user_id, now))
            .collect::<Result<Vec<_>>>()?;

        self.deps.repository.insert_many(&jobs).await?;

        for job in &jobs {
            self.event_bus
                .emit(CoreEvent::Transfer(TransferEvent::Queued {
                    job_id: job.id.to_string(),
                    user_id: job.user_id.to_string(),
                    source_provider: job.source.provider.as_str().to_string(),
                    target_provider: job.target.provider.as_str().to_string(),
                }))
                .ok();
        }

        info!(jobs = jobs.len(), "Transfers queued");
        Ok(jobs.into_iter().map(|job| job.id).collect())
    }

    /// Current status of a job, shaped for polling clients.
    pub async fn status(&self, job_id: &str) -> Result<TransferStatusView> {
        let job = self.job(job_id).await?;
        Ok(TransferStatusView::from(&job))
    }

    /// Full job record, including the reconciliation meta.
    pub async fn job(&self, job_id: &str) -> Result<TransferJob> {
        let id = TransferJobId::from_string(job_id)?;
        self.deps
            .repository
            .find_by_id(&id)
            .await?
            .ok_or_else(|| {
                TransferError::JobNotFound {
                    job_id: id.to_string(),
                }
                .into()
            })
    }

    /// Cancels a job that has not started yet.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidStateTransition`] (wrapped) when the
    /// job is already running or finished.
    pub async fn cancel(&self, job_id: &str) -> Result<TransferStatusView> {
        let id = TransferJobId::from_string(job_id)?;
        let job = self.deps.repository.cancel(&id).await?;
        info!(job_id = %id, "Transfer canceled");
        Ok(TransferStatusView::from(&job))
    }

    /// Starts the dispatch and cleanup loops. Calling it again while they
    /// run has no effect.
    pub async fn start(&self) {
        let mut slot = self.scheduler.lock().await;
        if slot.as_ref().is_some_and(SchedulerHandle::is_running) {
            warn!("Transfer scheduler already running");
            return;
        }

        let scheduler = TransferScheduler::new(
            Arc::clone(&self.orchestrator),
            self.scheduler_config.clone(),
            Arc::clone(&self.event_bus),
        )
        .with_clock(Arc::clone(&self.deps.clock));

        *slot = Some(Arc::new(scheduler).spawn());
    }

    /// Stops polling and waits for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        let handle = self.scheduler.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }
}

/// Builds a service from configuration: opens the job database and
/// registers the bundled provider adapters.
///
/// # Errors
///
/// Returns [`CoreError::InitializationFailed`] when the database cannot be
/// opened or migrated.
pub async fn bootstrap(
    config: CoreConfig,
    credentials: Arc<dyn CredentialStore>,
) -> Result<CoreService> {
    info!(database = %config.database_path.display(), "Bootstrapping transfer core");

    let pool = create_pool(DatabaseConfig::new(config.database_path.clone()))
        .await
        .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;
    let repository = Arc::new(SqliteTransferJobRepository::new(pool));
    let providers = Arc::new(DefaultProviderFactory::new(
        Arc::clone(&config.http_client),
        config.providers.clone(),
        config.matching.clone(),
    ));

    if !config.providers.has_apple_music() {
        warn!("Apple Music developer token not configured; Apple Music transfers will fail");
    }

    Ok(CoreService::new(
        CoreDependencies::new(repository, credentials, providers),
        config.scheduler,
        config.matching,
    ))
}
