//! Credential lookup seam.
//!
//! The identity subsystem owns OAuth flows and token persistence. The transfer
//! core only needs to ask "which token does this user have for this service",
//! which is what [`CredentialStore`] answers.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::types::{ProviderCredential, ProviderKind, UserId};

/// Read access to linked provider accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns the user's credential for `provider`, or `None` when the
    /// account is not linked.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backing store cannot be reached.
    async fn credential(
        &self,
        user_id: &UserId,
        provider: ProviderKind,
    ) -> Result<Option<ProviderCredential>>;
}

/// Process-local store, used by tests and by hosts that push credentials in
/// directly.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<(UserId, ProviderKind), ProviderCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links (or replaces) a provider account for a user.
    pub async fn insert(&self, user_id: UserId, provider: ProviderKind, credential: ProviderCredential) {
        debug!(user_id = %user_id, provider = provider.as_str(), "Linking provider account");
        self.entries
            .write()
            .await
            .insert((user_id, provider), credential);
    }

    /// Unlinks a provider account. Returns whether one was present.
    pub async fn remove(&self, user_id: &UserId, provider: ProviderKind) -> bool {
        self.entries
            .write()
            .await
            .remove(&(user_id.clone(), provider))
            .is_some()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credential(
        &self,
        user_id: &UserId,
        provider: ProviderKind,
    ) -> Result<Option<ProviderCredential>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(user_id.clone(), provider)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_scoped_by_user_and_provider() {
        let store = InMemoryCredentialStore::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        store
            .insert(
                alice.clone(),
                ProviderKind::Spotify,
                ProviderCredential::new("alice-spotify", "alice-sp"),
            )
            .await;

        let found = store
            .credential(&alice, ProviderKind::Spotify)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.access_token, "alice-spotify");

        assert!(store
            .credential(&alice, ProviderKind::AppleMusic)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .credential(&bob, ProviderKind::Spotify)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_remove_unlinks_account() {
        let store = InMemoryCredentialStore::new();
        let user = UserId::new("carol");
        store
            .insert(
                user.clone(),
                ProviderKind::SoundCloud,
                ProviderCredential::new("sc-token", "carol-sc"),
            )
            .await;

        assert!(store.remove(&user, ProviderKind::SoundCloud).await);
        assert!(!store.remove(&user, ProviderKind::SoundCloud).await);
        assert!(store
            .credential(&user, ProviderKind::SoundCloud)
            .await
            .unwrap()
            .is_none());
    }
}
