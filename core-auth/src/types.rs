use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Identifier of a user in the host identity subsystem.
///
/// The transfer core never interprets it; it is only used to scope jobs and
/// to look up linked provider accounts.
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let user = UserId::new("user-42");
/// assert_eq!(user.as_str(), "user-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Supported streaming services.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderKind;
///
/// let provider = ProviderKind::AppleMusic;
/// assert_eq!(provider.display_name(), "Apple Music");
/// assert_eq!(provider.as_str(), "apple_music");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Spotify,
    AppleMusic,
    #[serde(rename = "soundcloud")]
    SoundCloud,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Spotify,
        ProviderKind::AppleMusic,
        ProviderKind::SoundCloud,
    ];

    /// Get the human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "Spotify",
            ProviderKind::AppleMusic => "Apple Music",
            ProviderKind::SoundCloud => "SoundCloud",
        }
    }

    /// Stable identifier used in job records, logs and the public API.
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::SoundCloud.as_str(), "soundcloud");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Spotify => "spotify",
            ProviderKind::AppleMusic => "apple_music",
            ProviderKind::SoundCloud => "soundcloud",
        }
    }

    /// Parse a provider kind from a string identifier
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("apple-music"), Some(ProviderKind::AppleMusic));
    /// assert_eq!(ProviderKind::parse("tidal"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spotify" => Some(ProviderKind::Spotify),
            "apple_music" | "applemusic" | "apple-music" => Some(ProviderKind::AppleMusic),
            "soundcloud" | "sound_cloud" => Some(ProviderKind::SoundCloud),
            _ => None,
        }
    }

    /// Largest number of tracks one add request may carry.
    pub fn add_batch_size(&self) -> usize {
        match self {
            ProviderKind::Spotify => 100,
            ProviderKind::AppleMusic => 25,
            ProviderKind::SoundCloud => 200,
        }
    }

    /// Whether ISRCs read from this service can be trusted for exact lookups.
    ///
    /// SoundCloud ISRCs are uploader-supplied and frequently wrong, so
    /// reconciliation skips the exact pass for playlists coming from it.
    pub fn has_reliable_isrc(&self) -> bool {
        !matches!(self, ProviderKind::SoundCloud)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AuthError::InvalidProvider(s.to_string()))
    }
}

/// Linked account of a user on one provider.
///
/// # Security
///
/// Tokens must never be logged. The `Debug` implementation redacts them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredential {
    /// Token presented to the provider API
    pub access_token: String,
    /// Refresh token, when the identity subsystem keeps one
    pub refresh_token: Option<String>,
    /// Account id on the provider side
    pub provider_account_id: String,
}

impl ProviderCredential {
    pub fn new(access_token: impl Into<String>, provider_account_id: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            provider_account_id: provider_account_id.into(),
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// An empty access token is as good as no credential.
    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

impl fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("provider_account_id", &self.provider_account_id)
            .finish()
    }
}
