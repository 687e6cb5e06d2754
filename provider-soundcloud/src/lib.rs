//! # SoundCloud Provider
//!
//! Implements `TransferProvider` for the SoundCloud public API.
//!
//! SoundCloud has no dedicated ISRC endpoint and its publisher metadata is
//! sparse, so exact lookups filter search results on `publisher_metadata`
//! and the engine treats SoundCloud as an unreliable ISRC source. Playlists
//! are rewritten as a whole: appends `PUT` the complete track list.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::SoundCloudConnector;
pub use error::{Result, SoundCloudError};
