//! Call key derivation: origin, method, absolute URL and body fingerprint

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::TapedeckError;

/// Fingerprint stored for every variant while parameters are ignored
pub const IGNORE_PARAMS_SENTINEL: &str = "__ignoreParamsSymbol__";

/// Fingerprint used when a body cannot be serialized
const FALLBACK_FINGERPRINT: &str = "{}";

/// HTTP methods that can be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
}

impl Method {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Delete => "delete",
            Method::Options => "options",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for Method {
    type Err = TapedeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "delete" => Ok(Method::Delete),
            "options" => Ok(Method::Options),
            other => Err(TapedeckError::Other(format!(
                "Unsupported HTTP method: {other}"
            ))),
        }
    }
}

/// Lookup key for one call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    /// Site the call was made from
    pub origin: String,
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Request-body fingerprint (or [`IGNORE_PARAMS_SENTINEL`])
    pub param_key: String,
}

/// Derive the lookup key for a call
///
/// `url` must already be resolved with [`resolve_url`].
pub fn derive_key<B>(
    origin: &str,
    method: Method,
    url: &str,
    body: Option<&B>,
    ignore_params: bool,
) -> CallKey
where
    B: Serialize + ?Sized,
{
    let param_key = if ignore_params {
        IGNORE_PARAMS_SENTINEL.to_string()
    } else {
        body_fingerprint(body)
    };

    CallKey {
        origin: origin.to_string(),
        method,
        url: url.to_string(),
        param_key,
    }
}

/// Compact JSON form of a request body; `null` when there is none
pub fn body_fingerprint<B>(body: Option<&B>) -> String
where
    B: Serialize + ?Sized,
{
    serde_json::to_string(&body).unwrap_or_else(|_| FALLBACK_FINGERPRINT.to_string())
}

/// Resolve a call URL against an optional base URL
pub fn resolve_url(base_url: Option<&str>, url: &str) -> String {
    if is_absolute_url(url) {
        url.to_string()
    } else {
        combine_urls(base_url.unwrap_or_default(), url)
    }
}

/// Whether a URL carries a scheme (or is protocol-relative)
pub fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }

    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    valid_scheme && rest.starts_with("//")
}

/// Join base and relative URL with exactly one slash
pub fn combine_urls(base_url: &str, relative_url: &str) -> String {
    if relative_url.is_empty() {
        return base_url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative_url.trim_start_matches('/')
    )
}

/// Fresh token identifying one write of a variant
pub fn freshness_token(seed: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hasher.update(timestamp.to_le_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());

    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
