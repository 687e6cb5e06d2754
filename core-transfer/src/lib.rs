//! # Playlist Transfer Engine
//!
//! Moves a playlist from one streaming account to another.
//!
//! ## Overview
//!
//! This module manages the lifecycle of transfer jobs, including:
//! - Reading source playlists through the `TransferProvider` capability
//! - Reconciling tracks across catalogs (exact ISRC pass, metadata fallback)
//! - Preparing the destination playlist and writing tracks in batches
//! - Persisting job state with lease-guarded checkpoints
//! - Dispatching, retrying and cleaning up jobs in the background
//!
//! ## Components
//!
//! - **Job State Machine** (`job`): status transitions, phases and meta
//! - **Provider Capability** (`provider`, `registry`): the adapter contract and its factory
//! - **Matching** (`matching`): candidate scoring shared by adapters
//! - **Reconciler** (`reconciler`): ordered source-to-destination id mapping
//! - **Orchestrator** (`orchestrator`): runs one claimed job through its phases
//! - **Repository** (`repository`, `db`): SQLite job store with leases
//! - **Scheduler** (`scheduler`): polling dispatch, retry policy, cleanup

pub mod db;
pub mod error;
pub mod job;
pub mod matching;
pub mod orchestrator;
pub mod provider;
pub mod reconciler;
pub mod registry;
pub mod repository;
pub mod scheduler;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{ProviderError, Result, TransferError};
pub use job::{
    MatchingStats, MetaSource, MetaTarget, SourceRef, TargetRef, TrackSample, TransferJob,
    TransferJobId, TransferMeta, TransferPhase, TransferProgress, TransferStatus,
    TransferSummary,
};
pub use matching::CatalogCandidate;
pub use orchestrator::TransferOrchestrator;
pub use provider::{
    EnsurePlaylistRequest, MatchResult, MetadataQuery, PlaylistResolution, ProviderResult,
    SourcePlaylist, TransferProvider, TransferTrack,
};
pub use reconciler::{ReconciliationOutcome, Reconciler};
pub use registry::ProviderFactory;
pub use repository::{
    SqliteTransferJobRepository, StaleRecovery, TransferJobRepository, LEASE_EXPIRED_MESSAGE,
};
pub use scheduler::{CleanupReport, SchedulerHandle, TransferScheduler};
