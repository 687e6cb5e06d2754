//! Concrete provider registry backed by the adapter crates.

use std::sync::Arc;

use bridge_traits::http::HttpClient;
use core_auth::{ProviderCredential, ProviderKind};
use core_runtime::config::{MatchingConfig, ProviderApiConfig};
use core_transfer::{ProviderFactory, TransferError, TransferProvider};
use provider_apple_music::AppleMusicConnector;
use provider_soundcloud::SoundCloudConnector;
use provider_spotify::SpotifyConnector;
use tracing::debug;

/// Builds Spotify, Apple Music and SoundCloud adapters over one HTTP client.
pub struct DefaultProviderFactory {
    http_client: Arc<dyn HttpClient>,
    providers: ProviderApiConfig,
    matching: MatchingConfig,
}

impl DefaultProviderFactory {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        providers: ProviderApiConfig,
        matching: MatchingConfig,
    ) -> Self {
        Self {
            http_client,
            providers,
            matching,
        }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(
        &self,
        kind: ProviderKind,
        credential: ProviderCredential,
    ) -> core_transfer::Result<Arc<dyn TransferProvider>> {
        debug!(provider = kind.as_str(), "Creating provider adapter");
        let http = Arc::clone(&self.http_client);
        let timeout = self.providers.request_timeout;

        let provider: Arc<dyn TransferProvider> = match kind {
            ProviderKind::Spotify => Arc::new(
                SpotifyConnector::new(http, credential.access_token)
                    .with_matching(self.matching.clone())
                    .with_request_timeout(timeout),
            ),
            ProviderKind::AppleMusic => {
                let developer_token = self
                    .providers
                    .apple_music_developer_token
                    .clone()
                    .filter(|token| !token.trim().is_empty())
                    .ok_or_else(|| {
                        TransferError::Authorization(
                            "Apple Music developer token is not configured".to_string(),
                        )
                    })?;
                Arc::new(
                    AppleMusicConnector::new(http, developer_token, credential.access_token)
                        .with_default_storefront(
                            self.providers.apple_music_default_storefront.clone(),
                        )
                        .with_matching(self.matching.clone())
                        .with_request_timeout(timeout),
                )
            }
            ProviderKind::SoundCloud => Arc::new(
                SoundCloudConnector::new(http, credential.access_token)
                    .with_matching(self.matching.clone())
                    .with_request_timeout(timeout),
            ),
        };

        Ok(provider)
    }

    fn supports(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::AppleMusic => self.providers.has_apple_music(),
            ProviderKind::Spotify | ProviderKind::SoundCloud => true,
        }
    }
}
