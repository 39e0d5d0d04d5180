//! Save and load of the persisted document

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::backend::{FileStorage, MemoryStorage};
use super::{evict, PersistedState, SaveReport, Snapshot, Storage};
use crate::config::{LimitsConfig, StorageBackend, StorageConfig};
use crate::rules::RuleSet;
use crate::store::RecordStore;
use crate::{Result, TapedeckError};

/// Writes `{ rules, store }` to a [`Storage`] under a byte budget
pub struct PersistenceManager {
    storage: Arc<dyn Storage>,
    key: String,
    limits: LimitsConfig,
}

impl PersistenceManager {
    /// Manager writing under `key`
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty or the limits are invalid
    pub fn new(
        storage: Arc<dyn Storage>,
        key: impl Into<String>,
        limits: LimitsConfig,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TapedeckError::ConfigError(
                "Storage key cannot be empty".to_string(),
            ));
        }
        limits.validate()?;

        Ok(Self {
            storage,
            key,
            limits,
        })
    }

    /// Manager for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be opened
    pub fn from_config(config: &StorageConfig, limits: LimitsConfig) -> Result<Self> {
        let storage: Arc<dyn Storage> = match config.backend {
            StorageBackend::File => {
                let dir = config.dir.clone().ok_or_else(|| {
                    TapedeckError::ConfigError(
                        "storage.dir is required for the file backend".to_string(),
                    )
                })?;
                Arc::new(FileStorage::new(dir)?)
            }
            StorageBackend::Memory => match config.capacity_bytes {
                Some(capacity) => Arc::new(MemoryStorage::with_capacity(capacity)),
                None => Arc::new(MemoryStorage::new()),
            },
        };

        Self::new(storage, config.key.clone(), limits)
    }

    /// Storage key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Byte budget
    pub fn limits(&self) -> LimitsConfig {
        self.limits
    }

    /// Read the persisted document
    ///
    /// A document that does not parse is reported and treated as absent,
    /// so a damaged store never prevents start-up.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be read
    pub fn load(&self) -> Result<Option<PersistedState>> {
        let Some(document) = self.storage.get(&self.key)? else {
            debug!("Nothing persisted under {}", self.key);
            return Ok(None);
        };

        match parse_document(&document) {
            Ok(state) => {
                info!(
                    "Loaded {} endpoints across {} sites from {}",
                    state.store.endpoint_count(),
                    state.store.origin_count(),
                    self.key
                );
                Ok(Some(state))
            }
            Err(e) => {
                error!("Discarding persisted state under {}: {e}", self.key);
                Ok(None)
            }
        }
    }

    /// Write `rules` and `store`, evicting first when over budget
    ///
    /// Eviction runs on a copy. `store` is replaced by the pruned copy only
    /// once the backend has accepted the write, so a failed save leaves it
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the backend write fails
    pub fn save(&self, rules: &RuleSet, store: &mut RecordStore) -> Result<SaveReport> {
        let size = Snapshot::new(rules, store).document_len()?;

        if size <= self.limits.high_water_bytes {
            let document = Snapshot::new(rules, store).to_json()?;
            self.storage.set(&self.key, &document)?;
            debug!("Saved {} bytes under {}", document.len(), self.key);
            return Ok(SaveReport {
                bytes: document.len(),
                evicted: Vec::new(),
            });
        }

        let mut working = store.clone();
        let evicted = evict(&mut working, rules, self.limits.low_water_bytes)?;
        let document = Snapshot::new(rules, &working).to_json()?;
        self.storage.set(&self.key, &document)?;
        *store = working;

        warn!(
            "Recorded data reached {} bytes (limit {}); evicted {} endpoints, saved {} bytes",
            size,
            self.limits.high_water_bytes,
            evicted.len(),
            document.len()
        );

        Ok(SaveReport {
            bytes: document.len(),
            evicted,
        })
    }
}

/// Parse a persisted document, checking its top-level shape first
///
/// # Errors
///
/// Returns error if the text is not JSON or `rules`/`store` are not objects
pub fn parse_document(document: &str) -> Result<PersistedState> {
    let value: Value = serde_json::from_str(document)?;
    let Value::Object(fields) = &value else {
        return Err(TapedeckError::InvalidFormat(
            "top level is not an object".to_string(),
        ));
    };
    for name in ["rules", "store"] {
        if fields.get(name).is_some_and(|field| !field.is_object()) {
            return Err(TapedeckError::InvalidFormat(format!(
                "`{name}` is not an object"
            )));
        }
    }

    Ok(serde_json::from_value(value)?)
}
