use core_transfer::TransferError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid transfer request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            other => CoreError::InitializationFailed(other.to_string()),
        }
    }
}

impl CoreError {
    /// Whether the caller sent something unusable (bad item, unknown id).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidRequest(_)
                | CoreError::Transfer(
                    TransferError::InvalidRequest(_)
                        | TransferError::InvalidJobId(_)
                        | TransferError::JobNotFound { .. }
                        | TransferError::InvalidStateTransition { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
