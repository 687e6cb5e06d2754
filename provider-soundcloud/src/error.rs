//! Error types for the SoundCloud provider

use core_auth::ProviderKind;
use core_transfer::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoundCloudError {
    #[error("SoundCloud {operation} rejected the access token (status {status_code})")]
    AuthenticationFailed {
        operation: &'static str,
        status_code: u16,
    },

    #[error("SoundCloud API error during {operation} (status {status_code}): {message}")]
    ApiError {
        operation: &'static str,
        status_code: u16,
        message: String,
    },

    #[error("Failed to parse SoundCloud {operation} response: {message}")]
    ParseError {
        operation: &'static str,
        message: String,
    },

    #[error("SoundCloud {operation} response has no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Network error during SoundCloud {operation}: {message}")]
    NetworkError {
        operation: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, SoundCloudError>;

impl From<SoundCloudError> for ProviderError {
    fn from(error: SoundCloudError) -> Self {
        let provider = ProviderKind::SoundCloud;
        match error {
            SoundCloudError::AuthenticationFailed {
                operation,
                status_code,
            } => ProviderError::Authorization {
                provider,
                reason: format!("{} returned HTTP {}", operation, status_code),
            },
            SoundCloudError::ApiError {
                operation,
                status_code,
                message,
            } => ProviderError::Upstream {
                provider,
                operation: operation.to_string(),
                status: status_code,
                body: message,
            },
            SoundCloudError::ParseError { operation, message } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: message,
            },
            SoundCloudError::MissingField { operation, field } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: format!("missing {}", field),
            },
            SoundCloudError::NetworkError { operation, message } => ProviderError::Transport {
                provider,
                operation: operation.to_string(),
                message,
            },
        }
    }
}
