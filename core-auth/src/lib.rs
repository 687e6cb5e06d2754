//! # Provider Accounts
//!
//! Identity types shared by the transfer engine and the provider adapters.
//!
//! ## Overview
//!
//! - [`ProviderKind`] names the supported streaming services and their limits
//! - [`UserId`] scopes jobs and credential lookups
//! - [`ProviderCredential`] is the linked account handed to an adapter
//! - [`CredentialStore`] is the lookup implemented by the host identity subsystem
//!
//! OAuth code exchange and token persistence live outside this workspace.

pub mod credentials;
pub mod error;
pub mod types;

pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use error::{AuthError, Result};
pub use types::{ProviderCredential, ProviderKind, UserId};
