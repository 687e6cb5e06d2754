//! # Spotify Provider
//!
//! Implements `TransferProvider` for the Spotify Web API.
//!
//! ## Overview
//!
//! This module provides:
//! - Playlist reads with offset pagination (`next` URLs)
//! - Exact catalog lookups through `isrc:` and `upc:` search filters
//! - Field-filtered text search for the metadata fallback
//! - Playlist creation and idempotent appends in chunks of 100 URIs

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SpotifyConnector;
pub use error::{Result, SpotifyError};
