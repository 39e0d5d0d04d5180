//! Recorded endpoint and variant types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fingerprint::{freshness_token, Method};

/// All recordings for one `(method, url)` pair within a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRecord {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, matched exactly
    pub url: String,
    /// Reserved
    #[serde(default)]
    pub header: String,
    /// Milliseconds since the epoch of the last serve or capture
    #[serde(default)]
    pub last_call_time: u64,
    /// Variants in insertion order
    #[serde(default)]
    pub params: Vec<ParamVariant>,
}

impl EndpointRecord {
    /// Create an empty record
    pub fn new(method: Method, url: impl Into<String>, now: u64) -> Self {
        Self {
            method,
            url: url.into(),
            header: String::new(),
            last_call_time: now,
            params: Vec::new(),
        }
    }

    /// Whether this record is for the given method and URL
    pub fn is(&self, method: Method, url: &str) -> bool {
        self.method == method && self.url == url
    }

    /// Position of the variant recorded under `data`
    pub fn variant_index(&self, data: &str) -> Option<usize> {
        self.params.iter().position(|variant| variant.data == data)
    }
}

/// One recorded request/response pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamVariant {
    /// Request-body fingerprint this variant answers
    pub data: String,
    /// Recorded response, opaque JSON
    pub response: Value,
    /// HTTP status, mirrored in `response.status`
    pub status: u16,
    /// Freshness token, regenerated on every write
    #[serde(default)]
    pub key: String,
}

impl ParamVariant {
    /// Create a variant with a fresh key
    pub fn new(data: impl Into<String>, response: Value, status: u16) -> Self {
        let data = data.into();
        let key = freshness_token(&data);
        Self {
            data,
            response,
            status,
            key,
        }
    }

    /// Copy with a replaced response
    #[must_use]
    pub fn with_response(&self, response: Value) -> Self {
        Self::new(self.data.clone(), response, self.status)
    }

    /// Copy with a replaced status, keeping `response.status` in step
    #[must_use]
    pub fn with_status(&self, status: u16) -> Self {
        let mut response = self.response.clone();
        if let Some(object) = response.as_object_mut() {
            object.insert("status".to_string(), Value::from(status));
        }
        Self::new(self.data.clone(), response, status)
    }
}
