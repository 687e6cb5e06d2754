//! # Apple Music Provider
//!
//! Implements `TransferProvider` for the Apple Music API.
//!
//! Requests carry two credentials: the developer token (from configuration)
//! as the bearer token, and the user's Music-User-Token for `/v1/me` library
//! calls. Catalog calls are scoped to the user's storefront, resolved once
//! per connector.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::AppleMusicConnector;
pub use error::{AppleMusicError, Result};
