//! Persistence of rules and recordings under a byte budget

mod backend;
mod evict;
mod manager;

pub use backend::{FileStorage, MemoryStorage};
pub use evict::evict;
pub use manager::{parse_document, PersistenceManager};

use std::io;

use serde::{Deserialize, Serialize};

use crate::fingerprint::Method;
use crate::rules::RuleSet;
use crate::store::RecordStore;
use crate::Result;

/// Key/value backend holding the serialized state
pub trait Storage: Send + Sync {
    /// Read the document stored under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, replacing any previous document
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the write
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Owned form of the persisted document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Rule set
    pub rules: RuleSet,
    /// Recordings
    pub store: RecordStore,
}

/// Borrowed view of the document, serialized without cloning the store
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Snapshot<'a> {
    /// Rule set
    pub rules: &'a RuleSet,
    /// Recordings
    pub store: &'a RecordStore,
}

impl<'a> Snapshot<'a> {
    /// View over `rules` and `store`
    pub fn new(rules: &'a RuleSet, store: &'a RecordStore) -> Self {
        Self { rules, store }
    }

    /// Serialized size in bytes
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be serialized
    pub fn document_len(&self) -> Result<usize> {
        let mut counter = ByteCounter(0);
        serde_json::to_writer(&mut counter, self)?;
        Ok(counter.0)
    }

    /// Serialized document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be serialized
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Endpoint removed to fit the byte budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedEndpoint {
    /// Site the endpoint was recorded under
    pub origin: String,
    /// HTTP method
    pub method: Method,
    /// URL
    pub url: String,
    /// Last call time in epoch milliseconds
    pub last_call_time: u64,
}

/// Outcome of a save
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Size of the written document
    pub bytes: usize,
    /// Endpoints evicted before writing, oldest first
    pub evicted: Vec<EvictedEndpoint>,
}

impl SaveReport {
    /// Whether anything had to be evicted
    pub fn pruned(&self) -> bool {
        !self.evicted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::derive_key;
    use serde_json::json;

    #[test]
    fn test_document_len_matches_serialization() {
        let mut store = RecordStore::new();
        let key = derive_key("https://a.test", Method::Get, "/u", None::<&()>, false);
        store.capture(&key, json!({"data": "é"}), 200, 1);
        let rules = RuleSet::default();

        let snapshot = Snapshot::new(&rules, &store);
        assert_eq!(
            snapshot.document_len().unwrap(),
            snapshot.to_json().unwrap().len()
        );
    }

    #[test]
    fn test_document_shape() {
        let rules = RuleSet::default();
        let store = RecordStore::new();
        let value: serde_json::Value =
            serde_json::from_str(&Snapshot::new(&rules, &store).to_json().unwrap()).unwrap();

        assert!(value["rules"].is_object());
        assert_eq!(value["store"], json!({}));
    }

    #[test]
    fn test_owned_and_borrowed_forms_agree() {
        let state = PersistedState::default();
        assert_eq!(
            serde_json::to_string(&state).unwrap(),
            Snapshot::new(&state.rules, &state.store).to_json().unwrap()
        );
    }
}
