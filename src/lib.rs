//! Tapedeck - record/replay cache for outbound HTTP API traffic
//!
//! Calls pass through an [`Engine`](engine::Engine) that either serves a
//! previously recorded response or lets the call reach the network and
//! records what comes back. Recordings are scoped per site, keyed by
//! method, URL and request-body fingerprint, and persisted under a hard
//! byte budget with least-recently-used eviction.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod focus;
pub mod intercept;
pub mod network;
pub mod persist;
pub mod rules;
pub mod store;

pub use engine::{Engine, EngineRegistry};
pub use error::{Result, TapedeckError};
