//! # Host Bridge Traits
//!
//! Abstractions the transfer core requires from its host process.
//!
//! ## Overview
//!
//! This crate defines the contract between the transfer engine and the
//! environment it runs in. Each trait represents a capability the core needs
//! but does not implement itself:
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by every provider adapter
//! - [`Clock`](time::Clock) - Time source for leases, stale detection and pruning
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to the host
//!
//! The desktop/server implementation of `HttpClient` lives in `bridge-desktop`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert library-specific errors into it and keep the message
//! actionable (URL, status, timeout).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared through `Arc`
//! between scheduler workers.

pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
