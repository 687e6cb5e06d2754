//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playlist transfer core:
//! - Logging and tracing infrastructure
//! - Configuration management (scheduler, matching and provider settings)
//! - Event bus for transfer progress notifications
//!
//! ## Overview
//!
//! Every other crate in the workspace depends on this one for its logging
//! conventions and configuration types. Nothing here talks to a streaming
//! service or the job store.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
