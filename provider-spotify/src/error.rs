//! Error types for the Spotify provider

use core_auth::ProviderKind;
use core_transfer::ProviderError;
use thiserror::Error;

/// Spotify provider errors
///
/// `operation` names the adapter call that failed (`get_playlist`,
/// `add_tracks`, ...).
#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Token rejected (401) or missing scope (403)
    #[error("Spotify {operation} rejected the access token (status {status_code})")]
    AuthenticationFailed {
        operation: &'static str,
        status_code: u16,
    },

    /// API request returned an error
    #[error("Spotify API error during {operation} (status {status_code}): {message}")]
    ApiError {
        operation: &'static str,
        status_code: u16,
        message: String,
    },

    /// Failed to parse API response
    #[error("Failed to parse Spotify {operation} response: {message}")]
    ParseError {
        operation: &'static str,
        message: String,
    },

    /// Response parsed but lacks a required field
    #[error("Spotify {operation} response has no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// Network error
    #[error("Network error during Spotify {operation}: {message}")]
    NetworkError {
        operation: &'static str,
        message: String,
    },
}

/// Result type for Spotify operations
pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for ProviderError {
    fn from(error: SpotifyError) -> Self {
        let provider = ProviderKind::Spotify;
        match error {
            SpotifyError::AuthenticationFailed {
                operation,
                status_code,
            } => ProviderError::Authorization {
                provider,
                reason: format!("{} returned HTTP {}", operation, status_code),
            },
            SpotifyError::ApiError {
                operation,
                status_code,
                message,
            } => ProviderError::Upstream {
                provider,
                operation: operation.to_string(),
                status: status_code,
                body: message,
            },
            SpotifyError::ParseError { operation, message } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: message,
            },
            SpotifyError::MissingField { operation, field } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: format!("missing {}", field),
            },
            SpotifyError::NetworkError { operation, message } => ProviderError::Transport {
                provider,
                operation: operation.to_string(),
                message,
            },
        }
    }
}
