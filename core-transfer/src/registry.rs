//! Provider lookup by kind.

use crate::provider::TransferProvider;
use crate::Result;
use core_auth::{ProviderCredential, ProviderKind};
use std::sync::Arc;

/// Builds an adapter bound to one user's credential.
///
/// Implementations return [`TransferError::Authorization`](crate::TransferError::Authorization)
/// when a provider cannot be used at all, for example when its
/// service-level configuration is missing.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        kind: ProviderKind,
        credential: ProviderCredential,
    ) -> Result<Arc<dyn TransferProvider>>;

    /// Providers this factory can build.
    fn supports(&self, kind: ProviderKind) -> bool;
}
