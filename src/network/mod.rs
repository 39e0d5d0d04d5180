//! Network side of the pipeline
//!
//! Provides a hyper-based [`Transport`](crate::intercept::Transport) for
//! plain HTTP targets.

mod client;

pub use client::HttpTransport;

/// Default time allowed for one call, connect included
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Idle pooled connections are closed after this long
pub const POOL_IDLE_TIMEOUT_MS: u64 = 90_000;
