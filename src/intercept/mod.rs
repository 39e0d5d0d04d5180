//! Interception pipeline: call descriptors, responses and the transport seam

mod pipeline;

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::fingerprint::resolve_url;

/// Outbound call as seen by the HTTP client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    /// HTTP method, any case
    pub method: String,
    /// Absolute or relative URL
    pub url: String,
    /// Base URL for relative calls
    pub base_url: Option<String>,
    /// JSON request body
    pub data: Option<Value>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl Call {
    /// Create a call without body or headers
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// GET call
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("get", url)
    }

    /// POST call with a JSON body
    pub fn post(url: impl Into<String>, data: Value) -> Self {
        Self::new("post", url).with_data(data)
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the JSON body
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// URL after resolving against the base URL
    pub fn resolved_url(&self) -> String {
        resolve_url(self.base_url.as_deref(), &self.url)
    }
}

/// Response handed back to the caller, recorded verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status
    pub status: u16,
    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body, parsed as JSON when possible
    #[serde(default)]
    pub data: Value,
}

impl Response {
    /// Response without headers
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            data,
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// JSON form stored in a variant
    ///
    /// # Errors
    ///
    /// Returns error if the response cannot be represented as JSON
    pub fn to_recorded(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Rebuild a response from a stored variant
    ///
    /// A stored value that no longer has the response shape (after manual
    /// edits) is served as the body with the variant's status.
    pub fn from_recorded(recorded: &Value, status: u16) -> Self {
        serde_json::from_value(recorded.clone())
            .unwrap_or_else(|_| Self::new(status, recorded.clone()))
    }
}

/// Failed call, optionally carrying the server's response
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CallError {
    /// Description of the failure
    pub message: String,
    /// Response, when the server answered
    pub response: Option<Response>,
}

impl CallError {
    /// Failure without any server response
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Failure caused by an error status
    pub fn status(response: Response) -> Self {
        Self {
            message: format!("Request failed with status code {}", response.status),
            response: Some(response),
        }
    }
}

/// Result of a dispatched call
pub type CallResult = std::result::Result<Response, CallError>;

/// The network side of the pipeline
pub trait Transport {
    /// Perform `call` against the resolved `url`
    fn send(&self, call: &Call, url: &str) -> impl Future<Output = CallResult> + Send;
}
