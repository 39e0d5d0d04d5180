//! Error types for Tapedeck

use std::io;
use thiserror::Error;

/// Result type for Tapedeck operations
pub type Result<T> = std::result::Result<T, TapedeckError>;

/// Errors that can occur in Tapedeck
#[derive(Debug, Error)]
pub enum TapedeckError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persisted document does not have the expected shape
    #[error("Invalid persisted state: {0}")]
    InvalidFormat(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A rule pattern failed to compile
    #[error("Invalid pattern for {field}: {source}")]
    InvalidPattern {
        /// Rule field holding the pattern
        field: &'static str,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// Rule field name is not known
    #[error("Unknown rule field: {0}")]
    UnknownRuleField(String),

    /// Rule value has the wrong JSON type
    #[error("Invalid value for {field}: expected {expected}")]
    InvalidRuleValue {
        /// Rule field being set
        field: &'static str,
        /// Description of the accepted type
        expected: &'static str,
    },

    /// Dot-path syntax is invalid
    #[error("Invalid field path '{0}': expected the form .a.b.c")]
    InvalidFieldPath(String),

    /// No endpoint record for the given key
    #[error("No endpoint {method} {url} under {origin}")]
    EndpointNotFound {
        /// Origin scope
        origin: String,
        /// HTTP method
        method: String,
        /// Endpoint URL
        url: String,
    },

    /// Variant index outside the endpoint's variant list
    #[error("Variant index {index} out of range (endpoint has {len})")]
    VariantNotFound {
        /// Requested index
        index: usize,
        /// Number of variants present
        len: usize,
    },

    /// Storage backend refused a write
    #[error("Storage full: {size} bytes exceeds capacity of {limit} bytes")]
    StorageFull {
        /// Attempted size
        size: usize,
        /// Capacity
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
