//! Least-recently-used eviction of endpoint records

use tracing::debug;

use super::{EvictedEndpoint, Snapshot};
use crate::rules::RuleSet;
use crate::store::{EndpointRecord, RecordStore};
use crate::Result;

/// Remove endpoints, oldest `lastCallTime` first, until the document
/// serialized from `rules` and `store` is smaller than `target` bytes
///
/// Whole endpoint records are removed with all their variants; ties keep
/// store order. Runs out of candidates without error when the rules alone
/// exceed `target`.
///
/// # Errors
///
/// Returns error if the document cannot be serialized
pub fn evict(
    store: &mut RecordStore,
    rules: &RuleSet,
    target: usize,
) -> Result<Vec<EvictedEndpoint>> {
    let mut size = Snapshot::new(rules, store).document_len()?;
    if size < target {
        return Ok(Vec::new());
    }

    let mut candidates: Vec<EvictedEndpoint> = store
        .iter_endpoints()
        .map(|(origin, endpoint)| EvictedEndpoint {
            origin: origin.to_string(),
            method: endpoint.method,
            url: endpoint.url.clone(),
            last_call_time: endpoint.last_call_time,
        })
        .collect();
    candidates.sort_by_key(|candidate| candidate.last_call_time);

    let mut evicted = Vec::new();
    for candidate in candidates {
        if size < target {
            // Confirm against a real serialization before stopping
            size = Snapshot::new(rules, store).document_len()?;
            if size < target {
                break;
            }
        }

        let siblings = store.endpoints(&candidate.origin).len();
        let origins = store.origin_count();
        let Some(removed) =
            store.evict_endpoint(&candidate.origin, candidate.method, &candidate.url)
        else {
            continue;
        };

        let freed = removed_len(&candidate.origin, &removed, siblings, origins)?;
        size = size.saturating_sub(freed);
        debug!(
            "Evicted {} {} from {} (lastCallTime {}), {} bytes left",
            candidate.method, candidate.url, candidate.origin, candidate.last_call_time, size
        );
        evicted.push(candidate);
    }

    Ok(evicted)
}

/// Bytes the document loses when `removed` leaves its site
///
/// `siblings` and `origins` are the counts before removal. A site left
/// empty is dropped together with its key.
fn removed_len(
    origin: &str,
    removed: &EndpointRecord,
    siblings: usize,
    origins: usize,
) -> Result<usize> {
    let record = serde_json::to_string(removed)?.len();
    if siblings > 1 {
        // `record,`
        return Ok(record + 1);
    }

    // `"origin":[record]` plus the separating comma, if any
    let key = serde_json::to_string(origin)?.len();
    let separator = usize::from(origins > 1);
    Ok(key + 1 + 2 + record + separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{derive_key, Method};
    use serde_json::json;

    fn store_with(entries: &[(&str, &str, u64)]) -> RecordStore {
        let mut store = RecordStore::new();
        for (origin, url, time) in entries {
            let key = derive_key(origin, Method::Get, url, None::<&()>, false);
            store.capture(&key, json!({"data": "x".repeat(100)}), 200, *time);
        }
        store
    }

    fn size(store: &RecordStore, rules: &RuleSet) -> usize {
        Snapshot::new(rules, store).document_len().unwrap()
    }

    #[test]
    fn test_no_eviction_under_target() {
        let mut store = store_with(&[("https://a.test", "/1", 1)]);
        let rules = RuleSet::default();
        let target = size(&store, &rules) + 1;

        assert!(evict(&mut store, &rules, target).unwrap().is_empty());
        assert_eq!(store.endpoint_count(), 1);
    }

    #[test]
    fn test_evicts_oldest_first_across_sites() {
        let mut store = store_with(&[
            ("https://a.test", "/new", 30),
            ("https://b.test", "/old", 10),
            ("https://a.test", "/mid", 20),
        ]);
        let rules = RuleSet::default();

        let mut keep_one = store.clone();
        keep_one.evict_endpoint("https://b.test", Method::Get, "/old");
        keep_one.evict_endpoint("https://a.test", Method::Get, "/mid");
        let target = size(&keep_one, &rules) + 1;

        let evicted = evict(&mut store, &rules, target).unwrap();

        let urls: Vec<&str> = evicted.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, ["/old", "/mid"]);
        assert_eq!(store, keep_one);
        assert!(size(&store, &rules) < target);
    }

    #[test]
    fn test_size_tracking_matches_serialization() {
        let mut store = store_with(&[
            ("https://a.test", "/1", 1),
            ("https://a.test", "/2", 2),
            ("https://b.test", "/3", 3),
            ("https://c.test", "/4", 4),
            ("https://b.test", "/5", 5),
        ]);
        let rules = RuleSet::default();
        let before = size(&store, &rules);

        for target in (0..before).rev().step_by(97) {
            let mut working = store.clone();
            evict(&mut working, &rules, target).unwrap();
            let after = size(&working, &rules);
            assert!(after < target || working.is_empty());
        }

        evict(&mut store, &rules, 0).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_exhausted_candidates_is_not_an_error() {
        let mut store = store_with(&[("https://a.test", "/1", 1)]);
        let rules = RuleSet::default();

        let evicted = evict(&mut store, &rules, 1).unwrap();

        assert_eq!(evicted.len(), 1);
        assert!(store.is_empty());
    }
}
