//! Property tests for field focus, admission rules and eviction

use proptest::prelude::*;
use serde_json::{Map, Value};

use tapedeck::fingerprint::{derive_key, Method};
use tapedeck::focus::FieldPath;
use tapedeck::persist::{evict, parse_document, Snapshot};
use tapedeck::rules::{RuleMatcher, RuleSet};
use tapedeck::store::RecordStore;

fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        (0.0f64..1_000.0).prop_map(Value::from),
        prop::num::f64::NORMAL.prop_map(Value::from),
        "[a-z é]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn path_strategy() -> impl Strategy<Value = FieldPath> {
    prop::collection::vec("[a-c]{1,2}", 1..4).prop_map(|segments| {
        FieldPath::parse(&format!(".{}", segments.join("."))).unwrap()
    })
}

fn path_exists(path: &FieldPath, target: &Value) -> bool {
    let mut current = target;
    for segment in path.segments() {
        match current.as_object().and_then(|map| map.get(segment)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn store_strategy() -> impl Strategy<Value = RecordStore> {
    prop::collection::vec((0..3usize, 0..20usize, 0..1_000u64, 0..300usize), 0..40).prop_map(
        |entries| {
            let mut store = RecordStore::new();
            for (origin, url, time, size) in entries {
                let origin = format!("https://site{origin}.test");
                let url = format!("https://api.test/{url}");
                let key = derive_key(&origin, Method::Get, &url, None::<&()>, false);
                store.capture(&key, Value::String("x".repeat(size)), 200, time);
            }
            store
        },
    )
}

fn recorded_store_strategy() -> impl Strategy<Value = RecordStore> {
    prop::collection::vec((0..20usize, json_strategy(), 100..600u16), 0..20).prop_map(|entries| {
        let mut store = RecordStore::new();
        for (i, (url, response, status)) in entries.into_iter().enumerate() {
            let url = format!("https://api.test/{url}");
            let key = derive_key("https://site.test", Method::Post, &url, Some(&response), false);
            store.capture(&key, response, status, i as u64);
        }
        store
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_focus_round_trip_is_noop(target in json_strategy(), path in path_strategy()) {
        prop_assume!(path_exists(&path, &target));

        let extracted = path.extract(&target);
        prop_assert_eq!(path.inject(&target, extracted), target);
    }

    #[test]
    fn prop_inject_then_extract(
        target in json_strategy(),
        path in path_strategy(),
        value in json_strategy(),
    ) {
        let updated = path.inject(&target, value.clone());
        prop_assert_eq!(path.extract(&updated), value);
    }

    #[test]
    fn prop_exclude_always_wins(
        prefix in "[a-z]{0,6}",
        marker in "[a-z]{1,6}",
        suffix in "[a-z/]{0,6}",
    ) {
        let url = format!("https://{prefix}.test/{marker}{suffix}");
        let rules = RuleSet {
            include_regexp: ".*".to_string(),
            exclude_regexp: regex::escape(&marker),
            ..RuleSet::default()
        };

        let matcher = RuleMatcher::compile(&rules);
        prop_assert!(!matcher.admits(&url));
        prop_assert!(!matcher.admits_call("https://site.test", &url));
    }

    #[test]
    fn prop_eviction_is_lru_and_reaches_target(
        store in store_strategy(),
        fraction in 0.0f64..1.2,
    ) {
        let rules = RuleSet::default();
        let full = Snapshot::new(&rules, &store).document_len().unwrap();
        let target = (full as f64 * fraction) as usize;
        let mut working = store.clone();

        let evicted = evict(&mut working, &rules, target).unwrap();

        let size = Snapshot::new(&rules, &working).document_len().unwrap();
        prop_assert!(size < target || working.is_empty());
        prop_assert_eq!(evicted.len() + working.endpoint_count(), store.endpoint_count());

        if let Some(newest_evicted) = evicted.iter().map(|e| e.last_call_time).max() {
            for (_, endpoint) in working.iter_endpoints() {
                prop_assert!(endpoint.last_call_time >= newest_evicted);
            }
        }
    }

    #[test]
    fn prop_persisted_document_reserializes_identically(store in recorded_store_strategy()) {
        let rules = RuleSet::default();
        let document = Snapshot::new(&rules, &store).to_json().unwrap();

        let parsed = parse_document(&document).unwrap();
        prop_assert_eq!(&parsed.store, &store);
        let reserialized = Snapshot::new(&parsed.rules, &parsed.store).to_json().unwrap();
        prop_assert_eq!(reserialized, document);
    }
}
