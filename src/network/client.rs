//! HTTP client used when a call is not served from recordings

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tracing::{debug, warn};

use super::{POOL_IDLE_TIMEOUT_MS, REQUEST_TIMEOUT_MS};
use crate::intercept::{Call, CallError, CallResult, Response, Transport};

/// Transport sending calls over plain HTTP
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with the default timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
    }

    /// Create a transport giving up on calls after `timeout`
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_millis(POOL_IDLE_TIMEOUT_MS))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client, timeout }
    }

    async fn perform(&self, request: Request<Full<Bytes>>) -> CallResult {
        let response = self.client.request(request).await.map_err(|e| {
            warn!("Request failed: {e}");
            CallError::network(format!("Request failed: {e}"))
        })?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("<invalid>").to_string(),
                )
            })
            .collect();

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| CallError::network(format!("Failed to read response body: {e}")))?
            .to_bytes();

        into_outcome(Response {
            status,
            headers,
            data: decode_body(&body),
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    async fn send(&self, call: &Call, url: &str) -> CallResult {
        let request = build_request(call, url)?;
        debug!("Sending {} {}", request.method(), request.uri());

        match tokio::time::timeout(self.timeout, self.perform(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CallError::network(format!(
                "timeout of {}ms exceeded",
                self.timeout.as_millis()
            ))),
        }
    }
}

/// Build the hyper request for `call` against the resolved `url`
fn build_request(call: &Call, url: &str) -> Result<Request<Full<Bytes>>, CallError> {
    let method = call
        .method
        .to_ascii_uppercase()
        .parse::<Method>()
        .map_err(|e| CallError::network(format!("Invalid HTTP method '{}': {e}", call.method)))?;
    let uri = url
        .parse::<Uri>()
        .map_err(|e| CallError::network(format!("Invalid URI '{url}': {e}")))?;
    if uri.scheme_str() != Some("http") {
        return Err(CallError::network(format!("Unsupported URL '{url}': only http is available")));
    }

    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in &call.headers {
        builder = builder.header(name, value);
    }

    let body = match &call.data {
        Some(data) => {
            let has_content_type = call
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !has_content_type {
                builder =
                    builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            let bytes = serde_json::to_vec(data)
                .map_err(|e| CallError::network(format!("Failed to encode body: {e}")))?;
            Bytes::from(bytes)
        }
        None => Bytes::new(),
    };

    builder
        .body(Full::new(body))
        .map_err(|e| CallError::network(format!("Failed to build request: {e}")))
}

/// JSON when the body parses, text otherwise
fn decode_body(body: &[u8]) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Error statuses become failures that still carry the response
fn into_outcome(response: Response) -> CallResult {
    if response.is_success() {
        Ok(response)
    } else {
        Err(CallError::status(response))
    }
}
