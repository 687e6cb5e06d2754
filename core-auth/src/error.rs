use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No {provider} account linked for user {user_id}")]
    NotLinked { user_id: String, provider: String },

    #[error("Credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
