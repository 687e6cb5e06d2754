//! Workspace entry crate.
//!
//! Re-exports [`core_service`] so host applications can depend on
//! `playlist-transfer` alone and toggle the `desktop-shims` feature here.

pub use core_service::*;
