//! # Job Database
//!
//! SQLite connection pool for the transfer job store.
//!
//! File databases run in WAL mode so status polling never blocks a worker's
//! checkpoint. The schema lives in `migrations/` and is embedded at compile
//! time with `sqlx::migrate!`.

use crate::{Result, TransferError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:` URL of the database
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    /// How long a writer waits on a locked database before failing
    pub busy_timeout: Duration,
    in_memory: bool,
}

impl DatabaseConfig {
    /// Configuration for a database file, created on first use.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        let path = database_path.into();
        Self {
            database_url: format!("sqlite:{}", path.display()),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            in_memory: false,
        }
    }

    /// In-memory database for tests.
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            in_memory: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        if !self.in_memory {
            self.max_connections = max;
        }
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }
}

/// Create a configured SQLite connection pool
///
/// Configures connection options, opens the pool, applies migrations and
/// runs a health check.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, a migration fails, or
/// the health check query fails.
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Creating job database pool"
    );

    let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(config.busy_timeout);

    if !config.in_memory {
        connect_options = connect_options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let mut pool_options = SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout);

    if config.in_memory {
        pool_options = pool_options.max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create connection pool");
            TransferError::Database(e.to_string())
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    info!("Job database ready");
    Ok(pool)
}

/// In-memory pool with the schema applied.
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Running job database migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        TransferError::Database(format!("migration failed: {}", e))
    })?;

    Ok(())
}

/// Verifies the pool can serve a trivial query.
pub async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    let value: i64 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    if value != 1 {
        return Err(TransferError::Database(
            "health check returned an unexpected value".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_has_schema() {
        let pool = create_test_pool().await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'transfer_jobs'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let indexes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND tbl_name = 'transfer_jobs' AND name LIKE 'idx_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(indexes, 2);
    }

    #[test]
    fn test_in_memory_pool_is_single_connection() {
        let config = DatabaseConfig::in_memory().max_connections(8);
        assert_eq!(config.max_connections, 1);
        assert!(config.is_in_memory());

        let file = DatabaseConfig::new("/tmp/jobs.db").max_connections(8);
        assert_eq!(file.database_url, "sqlite:/tmp/jobs.db");
        assert_eq!(file.max_connections, 8);
    }

    #[tokio::test]
    async fn test_file_pool_runs_migrations_once() {
        let path = std::env::temp_dir().join(format!("transfer-jobs-{}.db", uuid::Uuid::new_v4()));

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        pool.close().await;

        let reopened = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        health_check(&reopened).await.unwrap();
        reopened.close().await;

        let _ = std::fs::remove_file(&path);
    }
}
