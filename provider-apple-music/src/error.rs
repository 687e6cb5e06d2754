//! Error types for the Apple Music provider

use core_auth::ProviderKind;
use core_transfer::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppleMusicError {
    /// Developer or user token missing before any request was made
    #[error("Apple Music {0} is not configured")]
    MissingToken(&'static str),

    /// Token rejected (401) or subscription/permission missing (403)
    #[error("Apple Music {operation} rejected the credentials (status {status_code})")]
    AuthenticationFailed {
        operation: &'static str,
        status_code: u16,
    },

    #[error("Apple Music API error during {operation} (status {status_code}): {message}")]
    ApiError {
        operation: &'static str,
        status_code: u16,
        message: String,
    },

    #[error("Failed to parse Apple Music {operation} response: {message}")]
    ParseError {
        operation: &'static str,
        message: String,
    },

    #[error("Apple Music {operation} response has no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("Network error during Apple Music {operation}: {message}")]
    NetworkError {
        operation: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, AppleMusicError>;

impl AppleMusicError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppleMusicError::ApiError { status_code: 404, .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            AppleMusicError::MissingToken(_) | AppleMusicError::AuthenticationFailed { .. }
        )
    }
}

impl From<AppleMusicError> for ProviderError {
    fn from(error: AppleMusicError) -> Self {
        let provider = ProviderKind::AppleMusic;
        match error {
            AppleMusicError::MissingToken(token) => ProviderError::Authorization {
                provider,
                reason: format!("{} is not configured", token),
            },
            AppleMusicError::AuthenticationFailed {
                operation,
                status_code,
            } => ProviderError::Authorization {
                provider,
                reason: format!("{} returned HTTP {}", operation, status_code),
            },
            AppleMusicError::ApiError {
                operation,
                status_code,
                message,
            } => ProviderError::Upstream {
                provider,
                operation: operation.to_string(),
                status: status_code,
                body: message,
            },
            AppleMusicError::ParseError { operation, message } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: message,
            },
            AppleMusicError::MissingField { operation, field } => ProviderError::MalformedData {
                provider,
                operation: operation.to_string(),
                reason: format!("missing {}", field),
            },
            AppleMusicError::NetworkError { operation, message } => ProviderError::Transport {
                provider,
                operation: operation.to_string(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_an_authorization_failure() {
        let err: ProviderError = AppleMusicError::MissingToken("developer token").into();
        assert!(err.is_authorization());
        assert_eq!(
            err.to_string(),
            "Apple Music authorization failed: developer token is not configured"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = AppleMusicError::ApiError {
            operation: "add_tracks",
            status_code: 404,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_authentication());
    }
}
