//! In-memory record store: site -> endpoints -> variants

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::fingerprint::{CallKey, Method, IGNORE_PARAMS_SENTINEL};
use crate::{Result, TapedeckError};

use super::record::{EndpointRecord, ParamVariant};
use super::RecordQuery;

/// Result of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A new variant was appended
    Inserted,
    /// An existing variant was replaced in place
    Replaced,
}

/// Hierarchical store of recorded traffic
///
/// Sites are kept sorted so that serialization is deterministic; endpoint
/// and variant lists keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordStore {
    origins: BTreeMap<String, Vec<EndpointRecord>>,
}

impl RecordStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate sites with their endpoint records
    pub fn origins(&self) -> impl Iterator<Item = (&str, &[EndpointRecord])> {
        self.origins
            .iter()
            .map(|(origin, endpoints)| (origin.as_str(), endpoints.as_slice()))
    }

    /// Endpoint records of one site
    pub fn endpoints(&self, origin: &str) -> &[EndpointRecord] {
        self.origins.get(origin).map_or(&[], Vec::as_slice)
    }

    /// Endpoint record for `(origin, method, url)`
    pub fn endpoint(&self, origin: &str, method: Method, url: &str) -> Option<&EndpointRecord> {
        self.endpoints(origin)
            .iter()
            .find(|endpoint| endpoint.is(method, url))
    }

    /// Variants recorded for `(origin, method, url)`
    pub fn variants(&self, origin: &str, method: Method, url: &str) -> &[ParamVariant] {
        self.endpoint(origin, method, url)
            .map_or(&[], |endpoint| endpoint.params.as_slice())
    }

    /// Every endpoint record paired with its site
    pub fn iter_endpoints(&self) -> impl Iterator<Item = (&str, &EndpointRecord)> {
        self.origins.iter().flat_map(|(origin, endpoints)| {
            endpoints
                .iter()
                .map(move |endpoint| (origin.as_str(), endpoint))
        })
    }

    /// Number of sites
    pub fn origin_count(&self) -> usize {
        self.origins.len()
    }

    /// Number of endpoint records across all sites
    pub fn endpoint_count(&self) -> usize {
        self.origins.values().map(Vec::len).sum()
    }

    /// Number of variants across all endpoints
    pub fn variant_count(&self) -> usize {
        self.iter_endpoints()
            .map(|(_, endpoint)| endpoint.params.len())
            .sum()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.endpoint_count() == 0
    }

    /// Find the variant that answers a call
    ///
    /// With `ignore_params` the variant recorded under the sentinel wins,
    /// falling back to the first variant of the endpoint.
    pub fn lookup(&self, key: &CallKey, ignore_params: bool) -> Option<&ParamVariant> {
        let endpoint = self.endpoint(&key.origin, key.method, &key.url)?;

        if ignore_params {
            endpoint
                .params
                .iter()
                .find(|variant| variant.data == IGNORE_PARAMS_SENTINEL)
                .or_else(|| endpoint.params.first())
        } else {
            endpoint
                .params
                .iter()
                .find(|variant| variant.data == key.param_key)
        }
    }

    /// Record that an endpoint was called at `now`
    pub fn touch(&mut self, origin: &str, method: Method, url: &str, now: u64) -> bool {
        match self.endpoint_mut(origin, method, url) {
            Some(endpoint) => {
                endpoint.last_call_time = now;
                true
            }
            None => false,
        }
    }

    /// Write a captured response under `key`
    ///
    /// Creates the site and endpoint on demand. An existing variant with
    /// the same fingerprint is replaced at its position; otherwise the
    /// variant is appended.
    pub fn capture(
        &mut self,
        key: &CallKey,
        response: Value,
        status: u16,
        now: u64,
    ) -> CaptureOutcome {
        let endpoints = self.origins.entry(key.origin.clone()).or_default();

        let index = match endpoints
            .iter()
            .position(|endpoint| endpoint.is(key.method, &key.url))
        {
            Some(index) => index,
            None => {
                endpoints.push(EndpointRecord::new(key.method, key.url.clone(), now));
                endpoints.len() - 1
            }
        };

        let endpoint = &mut endpoints[index];
        endpoint.last_call_time = now;

        let variant = ParamVariant::new(key.param_key.clone(), response, status);
        let outcome = match endpoint.variant_index(&key.param_key) {
            Some(position) => {
                endpoint.params[position] = variant;
                CaptureOutcome::Replaced
            }
            None => {
                endpoint.params.push(variant);
                CaptureOutcome::Inserted
            }
        };

        debug!(
            "Captured {} {} under {} ({:?}, {} variants)",
            key.method,
            key.url,
            key.origin,
            outcome,
            endpoint.params.len()
        );

        outcome
    }

    /// Remove one endpoint record with all its variants
    pub fn delete_endpoint(&mut self, origin: &str, method: Method, url: &str) -> bool {
        let Some(endpoints) = self.origins.get_mut(origin) else {
            return false;
        };
        let before = endpoints.len();
        endpoints.retain(|endpoint| !endpoint.is(method, url));
        endpoints.len() != before
    }

    /// Remove one endpoint record, dropping its site once nothing is left
    pub fn evict_endpoint(
        &mut self,
        origin: &str,
        method: Method,
        url: &str,
    ) -> Option<EndpointRecord> {
        let endpoints = self.origins.get_mut(origin)?;
        let position = endpoints
            .iter()
            .position(|endpoint| endpoint.is(method, url))?;
        let removed = endpoints.remove(position);
        if endpoints.is_empty() {
            self.origins.remove(origin);
        }
        Some(removed)
    }

    /// Remove a site with everything recorded under it
    pub fn delete_origin(&mut self, origin: &str) -> bool {
        self.origins.remove(origin).is_some()
    }

    /// Replace the response of one variant
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or variant does not exist
    pub fn set_variant_response(
        &mut self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        response: Value,
    ) -> Result<()> {
        self.replace_variant(origin, method, url, index, |variant| {
            variant.with_response(response)
        })
    }

    /// Replace the status of one variant, keeping `response.status` in step
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or variant does not exist
    pub fn set_variant_status(
        &mut self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        status: u16,
    ) -> Result<()> {
        self.replace_variant(origin, method, url, index, |variant| {
            variant.with_status(status)
        })
    }

    /// Variant at `index` under `(origin, method, url)`
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or variant does not exist
    pub fn variant(
        &self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
    ) -> Result<&ParamVariant> {
        let endpoint = self
            .endpoint(origin, method, url)
            .ok_or_else(|| not_found(origin, method, url))?;
        endpoint
            .params
            .get(index)
            .ok_or(TapedeckError::VariantNotFound {
                index,
                len: endpoint.params.len(),
            })
    }

    /// Filtered copy for browsing
    ///
    /// Sites without any matching endpoint are left out.
    pub fn query(&self, query: &RecordQuery) -> RecordStore {
        let mut origins = BTreeMap::new();

        for (origin, endpoints) in &self.origins {
            if !contains(origin, query.site_contains.as_deref()) {
                continue;
            }

            let matching: Vec<EndpointRecord> = endpoints
                .iter()
                .filter(|endpoint| contains(&endpoint.url, query.url_contains.as_deref()))
                .filter_map(|endpoint| {
                    let Some(status) = query.status_contains.as_deref() else {
                        return Some(endpoint.clone());
                    };
                    let params: Vec<ParamVariant> = endpoint
                        .params
                        .iter()
                        .filter(|variant| variant.status.to_string().contains(status))
                        .cloned()
                        .collect();
                    (!params.is_empty()).then(|| EndpointRecord {
                        params,
                        ..endpoint.clone()
                    })
                })
                .collect();

            if !matching.is_empty() {
                origins.insert(origin.clone(), matching);
            }
        }

        RecordStore { origins }
    }

    fn endpoint_mut(
        &mut self,
        origin: &str,
        method: Method,
        url: &str,
    ) -> Option<&mut EndpointRecord> {
        self.origins
            .get_mut(origin)?
            .iter_mut()
            .find(|endpoint| endpoint.is(method, url))
    }

    fn replace_variant<F>(
        &mut self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        update: F,
    ) -> Result<()>
    where
        F: FnOnce(&ParamVariant) -> ParamVariant,
    {
        let endpoint = self
            .endpoint_mut(origin, method, url)
            .ok_or_else(|| not_found(origin, method, url))?;
        let len = endpoint.params.len();
        let current = endpoint
            .params
            .get(index)
            .ok_or(TapedeckError::VariantNotFound { index, len })?;

        let replacement = update(current);
        endpoint.params[index] = replacement;
        Ok(())
    }
}

fn contains(haystack: &str, needle: Option<&str>) -> bool {
    needle.map_or(true, |needle| haystack.contains(needle))
}

fn not_found(origin: &str, method: Method, url: &str) -> TapedeckError {
    TapedeckError::EndpointNotFound {
        origin: origin.to_string(),
        method: method.to_string(),
        url: url.to_string(),
    }
}
