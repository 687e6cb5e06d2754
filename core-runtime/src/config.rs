//! # Core Configuration Module
//!
//! Provides configuration management for the playlist transfer core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected bridges and every tunable of the engine:
//!
//! - [`SchedulerConfig`] - polling, worker concurrency, leases, retry and cleanup
//! - [`MatchingConfig`] - search limits, scoring weights and thresholds
//! - [`ProviderApiConfig`] - per-request timeout and provider secrets
//!
//! Validation is fail-fast: `build()` refuses inconsistent values with an
//! actionable message instead of letting a worker misbehave later.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SchedulerConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/transfer/jobs.db")
//!     .http_client(http_client)
//!     .scheduler(SchedulerConfig::default().with_concurrency(2))
//!     .build()?;
//! ```
//!
//! With the `desktop-shims` feature enabled, a `ReqwestHttpClient` is
//! injected automatically when no HTTP client is provided.

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Core configuration for the transfer engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database holding transfer jobs
    pub database_path: PathBuf,

    /// HTTP client shared by all provider adapters
    pub http_client: Arc<dyn HttpClient>,

    /// Job scheduling settings
    pub scheduler: SchedulerConfig,

    /// Track matching settings
    pub matching: MatchingConfig,

    /// Provider API settings
    pub providers: ProviderApiConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("scheduler", &self.scheduler)
            .field("matching", &self.matching)
            .field("providers", &self.providers)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.scheduler.validate()?;
        self.matching.validate()?;
        self.providers.validate()?;

        Ok(())
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Settings for the transfer job scheduler.
///
/// Defaults: poll every second, 5 concurrent jobs, 5 minute lease renewed
/// every third of its duration, 3 attempts with exponential backoff,
/// stale jobs requeued after 5 minutes without an update, terminal jobs
/// kept for 30 days, cleanup every 5 minutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the dispatcher looks for due jobs
    pub poll_interval: Duration,
    /// Maximum number of jobs executing at once
    pub concurrency: usize,
    /// Lifetime of an execution lease
    pub lease_duration: Duration,
    /// Attempts before a retryable failure becomes terminal
    pub max_attempts: u32,
    /// First retry delay
    pub retry_base_delay: Duration,
    /// Upper bound for retry delays
    pub retry_max_delay: Duration,
    /// `processing` jobs without an update for this long are requeued
    pub stale_threshold: Duration,
    /// Terminal jobs older than this many days are deleted
    pub retention_days: u32,
    /// How often stale recovery and pruning run
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            concurrency: 5,
            lease_duration: Duration::from_secs(5 * 60),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(30),
            retry_max_delay: Duration::from_secs(10 * 60),
            stale_threshold: Duration::from_secs(5 * 60),
            retention_days: 30,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Interval at which a running job renews its lease.
    pub fn renew_interval(&self) -> Duration {
        self.lease_duration / 3
    }

    /// Delay before the next run after `attempts` failed executions.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }

    /// Validates the scheduler settings
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Scheduler poll interval must be greater than zero".to_string(),
            ));
        }

        if self.concurrency == 0 || self.concurrency > 64 {
            return Err(Error::Config(format!(
                "Scheduler concurrency must be between 1 and 64 (got {})",
                self.concurrency
            )));
        }

        if self.lease_duration < Duration::from_secs(3) {
            return Err(Error::Config(
                "Lease duration must be at least 3 seconds".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(Error::Config(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(Error::Config(
                "Retry base delay cannot exceed retry max delay".to_string(),
            ));
        }

        if self.stale_threshold <= self.renew_interval() {
            return Err(Error::Config(format!(
                "Stale threshold ({}s) must exceed the lease renewal interval ({}s), \
                 otherwise healthy jobs would be requeued",
                self.stale_threshold.as_secs(),
                self.renew_interval().as_secs()
            )));
        }

        if self.retention_days == 0 {
            return Err(Error::Config(
                "Retention must be at least 1 day".to_string(),
            ));
        }

        if self.cleanup_interval.is_zero() {
            return Err(Error::Config(
                "Cleanup interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Matching
// ============================================================================

/// Tunables for track reconciliation.
///
/// Metadata scoring is a weighted sum in roughly `0.0..=1.0`:
/// title overlap, artist overlap and duration closeness contribute their
/// weights, a remix/live/cover variant loses `variant_penalty` when the
/// source is not one, and a candidate carrying the source ISRC gains
/// `isrc_bonus`. A candidate is accepted at `metadata_threshold` or above.
///
/// ISRC disambiguation starts every candidate at `0.0` and applies the
/// album bonuses and penalties; the best candidate must reach
/// `min_isrc_score`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Results requested per catalog search
    pub search_limit: u32,
    /// Concurrent metadata lookups per job
    pub metadata_concurrency: usize,
    /// Largest duration difference still considered the same recording
    pub duration_tolerance_ms: u64,
    pub title_weight: f64,
    pub artist_weight: f64,
    pub duration_weight: f64,
    pub variant_penalty: f64,
    pub isrc_bonus: f64,
    pub metadata_threshold: f64,
    pub same_artist_album_bonus: f64,
    pub compilation_penalty: f64,
    pub various_artists_penalty: f64,
    pub earliest_release_bonus: f64,
    pub variant_release_penalty: f64,
    pub album_type_bonus: f64,
    pub min_isrc_score: f64,
    /// Unmatched track samples kept in job meta
    pub max_unmatched_samples: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            search_limit: 5,
            metadata_concurrency: 4,
            duration_tolerance_ms: 5_000,
            title_weight: 0.45,
            artist_weight: 0.35,
            duration_weight: 0.10,
            variant_penalty: 0.30,
            isrc_bonus: 0.25,
            metadata_threshold: 0.60,
            same_artist_album_bonus: 2.0,
            compilation_penalty: 3.0,
            various_artists_penalty: 2.0,
            earliest_release_bonus: 0.5,
            variant_release_penalty: 1.5,
            album_type_bonus: 0.5,
            min_isrc_score: 0.0,
            max_unmatched_samples: 100,
        }
    }
}

impl MatchingConfig {
    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_metadata_concurrency(mut self, concurrency: usize) -> Self {
        self.metadata_concurrency = concurrency;
        self
    }

    pub fn with_duration_tolerance_ms(mut self, tolerance: u64) -> Self {
        self.duration_tolerance_ms = tolerance;
        self
    }

    pub fn with_metadata_threshold(mut self, threshold: f64) -> Self {
        self.metadata_threshold = threshold;
        self
    }

    pub fn with_min_isrc_score(mut self, score: f64) -> Self {
        self.min_isrc_score = score;
        self
    }

    pub fn with_max_unmatched_samples(mut self, max: usize) -> Self {
        self.max_unmatched_samples = max;
        self
    }

    /// Validates the matching settings
    pub fn validate(&self) -> Result<()> {
        if self.search_limit == 0 || self.search_limit > 50 {
            return Err(Error::Config(format!(
                "Search limit must be between 1 and 50 (got {})",
                self.search_limit
            )));
        }

        if self.metadata_concurrency == 0 || self.metadata_concurrency > 16 {
            return Err(Error::Config(format!(
                "Metadata lookup concurrency must be between 1 and 16 (got {})",
                self.metadata_concurrency
            )));
        }

        let weights = [
            ("title_weight", self.title_weight),
            ("artist_weight", self.artist_weight),
            ("duration_weight", self.duration_weight),
            ("variant_penalty", self.variant_penalty),
            ("isrc_bonus", self.isrc_bonus),
            ("same_artist_album_bonus", self.same_artist_album_bonus),
            ("compilation_penalty", self.compilation_penalty),
            ("various_artists_penalty", self.various_artists_penalty),
            ("earliest_release_bonus", self.earliest_release_bonus),
            ("variant_release_penalty", self.variant_release_penalty),
            ("album_type_bonus", self.album_type_bonus),
        ];
        if let Some((name, value)) = weights
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(Error::Config(format!(
                "Matching weight {} must be a non-negative number (got {})",
                name, value
            )));
        }

        if self.title_weight + self.artist_weight + self.duration_weight <= 0.0 {
            return Err(Error::Config(
                "At least one of title, artist or duration weight must be positive".to_string(),
            ));
        }

        if !self.metadata_threshold.is_finite() || self.metadata_threshold <= 0.0 {
            return Err(Error::Config(
                "Metadata threshold must be greater than zero".to_string(),
            ));
        }

        if !self.min_isrc_score.is_finite() {
            return Err(Error::Config(
                "Minimum ISRC score must be a finite number".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Provider APIs
// ============================================================================

/// Settings shared by the provider adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderApiConfig {
    /// Timeout applied to every upstream request
    pub request_timeout: Duration,
    /// Signed MusicKit developer token; Apple Music is unavailable without it
    pub apple_music_developer_token: Option<String>,
    /// Storefront used when the user's storefront cannot be resolved
    pub apple_music_default_storefront: String,
}

impl Default for ProviderApiConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            apple_music_developer_token: None,
            apple_music_default_storefront: "us".to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderApiConfig")
            .field("request_timeout", &self.request_timeout)
            .field(
                "apple_music_developer_token",
                &self.apple_music_developer_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "apple_music_default_storefront",
                &self.apple_music_default_storefront,
            )
            .finish()
    }
}

impl ProviderApiConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_apple_music_developer_token(mut self, token: impl Into<String>) -> Self {
        self.apple_music_developer_token = Some(token.into());
        self
    }

    pub fn with_apple_music_default_storefront(mut self, storefront: impl Into<String>) -> Self {
        self.apple_music_default_storefront = storefront.into();
        self
    }

    /// Validates the provider settings
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout > Duration::from_secs(300) {
            return Err(Error::Config(
                "Request timeout exceeds maximum of 300 seconds".to_string(),
            ));
        }

        if matches!(&self.apple_music_developer_token, Some(token) if token.trim().is_empty()) {
            return Err(Error::Config(
                "Apple Music developer token cannot be empty. Omit it to disable Apple Music."
                    .to_string(),
            ));
        }

        let storefront = &self.apple_music_default_storefront;
        if storefront.len() != 2 || !storefront.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(Error::Config(format!(
                "Apple Music storefront must be a two-letter lowercase country code (got '{}')",
                storefront
            )));
        }

        Ok(())
    }

    pub fn has_apple_music(&self) -> bool {
        self.apple_music_developer_token.is_some()
    }
}

// ============================================================================
// Builder
// ============================================================================

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_providers: &ProviderApiConfig) -> Result<Arc<dyn HttpClient>> {
    Err(Error::capability_missing(
        "HttpClient",
        "An HttpClient implementation is required to reach streaming services. \
         Enable the 'desktop-shims' feature to use the default ReqwestHttpClient, \
         or inject one with .http_client().",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(providers: &ProviderApiConfig) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(providers.request_timeout)
        .map_err(|e| Error::capability_missing("HttpClient", e.to_string()))?;
    Ok(Arc::new(client))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    scheduler: Option<SchedulerConfig>,
    matching: Option<MatchingConfig>,
    providers: Option<ProviderApiConfig>,
}

impl CoreConfigBuilder {
    /// Sets the path to the SQLite job database (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets scheduler settings.
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = Some(config);
        self
    }

    /// Sets matching settings.
    pub fn matching(mut self, config: MatchingConfig) -> Self {
        self.matching = Some(config);
        self
    }

    /// Sets provider API settings.
    pub fn providers(mut self, config: ProviderApiConfig) -> Self {
        self.providers = Some(config);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database path is missing or empty
    /// - No HTTP client was injected and no default is available
    /// - Any sub-configuration fails validation
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let providers = self.providers.unwrap_or_default();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&providers)?,
        };

        let config = CoreConfig {
            database_path,
            http_client,
            scheduler: self.scheduler.unwrap_or_default(),
            matching: self.matching.unwrap_or_default(),
            providers,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::BridgeError;

    mockall::mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BridgeError>;
        }
    }

    fn http() -> Arc<dyn HttpClient> {
        Arc::new(MockHttp::new())
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder().http_client(http()).build();

        assert!(result.is_err());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("Database path is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client_without_shims() {
        let result = CoreConfig::builder().database_path("jobs.db").build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => assert_eq!(capability, "HttpClient"),
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_with_defaults() {
        let config = CoreConfig::builder()
            .database_path("jobs.db")
            .http_client(http())
            .build()
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("jobs.db"));
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.matching, MatchingConfig::default());
        assert_eq!(config.providers.apple_music_default_storefront, "us");
        assert!(!config.providers.has_apple_music());
    }

    #[test]
    fn test_builder_rejects_empty_database_path() {
        let result = CoreConfig::builder()
            .database_path("")
            .http_client(http())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.lease_duration, Duration::from_secs(300));
        assert_eq!(config.renew_interval(), Duration::from_secs(100));
        assert_eq!(config.stale_threshold, Duration::from_secs(300));
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_retry_delay_is_capped() {
        let config = SchedulerConfig::default()
            .with_retry_delays(Duration::from_secs(10), Duration::from_secs(25));

        assert_eq!(config.retry_delay(1), Duration::from_secs(10));
        assert_eq!(config.retry_delay(2), Duration::from_secs(20));
        assert_eq!(config.retry_delay(3), Duration::from_secs(25));
        assert_eq!(config.retry_delay(30), Duration::from_secs(25));
    }

    #[test]
    fn test_scheduler_rejects_zero_concurrency() {
        let config = SchedulerConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_rejects_stale_threshold_below_renewal() {
        let config = SchedulerConfig::default()
            .with_lease_duration(Duration::from_secs(600))
            .with_stale_threshold(Duration::from_secs(120));

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("renewal interval"));
    }

    #[test]
    fn test_scheduler_rejects_inverted_retry_delays() {
        let config = SchedulerConfig::default()
            .with_retry_delays(Duration::from_secs(60), Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_matching_rejects_negative_weight() {
        let mut config = MatchingConfig::default();
        config.compilation_penalty = -1.0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("compilation_penalty"));
    }

    #[test]
    fn test_matching_rejects_out_of_range_limits() {
        assert!(MatchingConfig::default().with_search_limit(0).validate().is_err());
        assert!(MatchingConfig::default().with_search_limit(51).validate().is_err());
        assert!(MatchingConfig::default()
            .with_metadata_concurrency(0)
            .validate()
            .is_err());
        assert!(MatchingConfig::default()
            .with_metadata_threshold(0.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_provider_config_validation() {
        assert!(ProviderApiConfig::default().validate().is_ok());

        let empty_token = ProviderApiConfig::default().with_apple_music_developer_token("  ");
        assert!(empty_token.validate().is_err());

        let bad_storefront = ProviderApiConfig::default().with_apple_music_default_storefront("USA");
        assert!(bad_storefront.validate().is_err());

        let no_timeout = ProviderApiConfig::default().with_request_timeout(Duration::ZERO);
        assert!(no_timeout.validate().is_err());
    }

    #[test]
    fn test_provider_config_debug_redacts_token() {
        let config = ProviderApiConfig::default().with_apple_music_developer_token("eyJhbGciOi");
        let debug = format!("{:?}", config);

        assert!(!debug.contains("eyJhbGciOi"));
        assert!(debug.contains("[REDACTED]"));
        assert!(config.has_apple_music());
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = CoreConfig::builder()
            .database_path("jobs.db")
            .http_client(http())
            .matching(MatchingConfig::default().with_search_limit(10))
            .build()
            .unwrap();

        let cloned = config.clone();
        assert_eq!(cloned.matching.search_limit, 10);
        assert!(format!("{:?}", cloned).contains("HttpClient { ... }"));
    }
}
