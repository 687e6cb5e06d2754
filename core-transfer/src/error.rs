use core_auth::{AuthError, ProviderKind};
use thiserror::Error;

/// Failure reported by a provider adapter.
///
/// Every variant carries the provider and the operation that failed so the
/// message stored on the job is actionable on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} authorization failed: {reason}")]
    Authorization {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} {operation} failed with status {status}: {body}")]
    Upstream {
        provider: ProviderKind,
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{provider} {operation} request failed: {message}")]
    Transport {
        provider: ProviderKind,
        operation: String,
        message: String,
    },

    #[error("{provider} {operation} returned unusable data: {reason}")]
    MalformedData {
        provider: ProviderKind,
        operation: String,
        reason: String,
    },
}

impl ProviderError {
    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::Authorization { provider, .. }
            | ProviderError::Upstream { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::MalformedData { provider, .. } => *provider,
        }
    }

    pub fn is_authorization(&self) -> bool {
        matches!(self, ProviderError::Authorization { .. })
    }

    /// Upstream, transport and malformed responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !self.is_authorization()
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    #[error("Transfer job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid transfer status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Transfer job {job_id} is leased by another worker")]
    LockConflict { job_id: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TransferError {
    /// Whether the scheduler should run the job again.
    ///
    /// Authorization and validation failures are final. Lock conflicts are
    /// not failures of the job at all and are never retried by the worker
    /// that hit them.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Provider(e) => e.is_retryable(),
            TransferError::Database(_) => true,
            TransferError::Authorization(_)
            | TransferError::InvalidRequest(_)
            | TransferError::JobNotFound { .. }
            | TransferError::InvalidJobId(_)
            | TransferError::InvalidStatus(_)
            | TransferError::InvalidStateTransition { .. }
            | TransferError::LockConflict { .. }
            | TransferError::Serialization(_) => false,
        }
    }

    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, TransferError::LockConflict { .. })
    }

    pub fn is_authorization(&self) -> bool {
        match self {
            TransferError::Authorization(_) => true,
            TransferError::Provider(e) => e.is_authorization(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        TransferError::Database(e.to_string())
    }
}

impl From<AuthError> for TransferError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::StoreUnavailable(message) => TransferError::Database(message),
            other => TransferError::Authorization(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(e: serde_json::Error) -> Self {
        TransferError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
