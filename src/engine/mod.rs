//! Per-client engine: rules, matcher and recordings behind one lock

mod autosave;
mod registry;

pub use autosave::AutosaveHandle;
pub use registry::{ClientId, EngineRegistry, MAX_ENGINES};

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;
use crate::fingerprint::Method;
use crate::focus::FieldPath;
use crate::persist::{PersistenceManager, SaveReport, Snapshot};
use crate::rules::{RuleField, RuleMatcher, RuleSet};
use crate::store::{RecordQuery, RecordStore};
use crate::{Result, TapedeckError};

/// Mutable engine state, always updated as a whole
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) rules: RuleSet,
    pub(crate) matcher: RuleMatcher,
    pub(crate) store: RecordStore,
    pub(crate) rules_dirty: bool,
}

impl EngineState {
    fn new(rules: RuleSet, store: RecordStore) -> Self {
        let matcher = RuleMatcher::compile(&rules);
        Self {
            rules,
            matcher,
            store,
            rules_dirty: false,
        }
    }

    fn rules_changed(&mut self) {
        self.matcher = RuleMatcher::compile(&self.rules);
        self.rules_dirty = true;
    }
}

/// Record/replay engine for one HTTP client
pub struct Engine {
    site: RwLock<String>,
    state: RwLock<EngineState>,
    persistence: Option<PersistenceManager>,
}

impl Engine {
    /// In-memory engine with default rules
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: RwLock::new(site.into()),
            state: RwLock::new(EngineState::default()),
            persistence: None,
        }
    }

    /// Engine backed by `persistence`, loading whatever it holds
    ///
    /// # Errors
    ///
    /// Returns error if the storage backend cannot be read
    pub fn with_persistence(
        site: impl Into<String>,
        persistence: PersistenceManager,
    ) -> Result<Self> {
        Self::open(site.into(), persistence, RuleSet::default())
    }

    /// Engine built from configuration
    ///
    /// The configured rules apply only when nothing has been persisted yet.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or storage cannot be read
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let persistence = PersistenceManager::from_config(&config.storage, config.limits)?;
        Self::open(config.site.clone(), persistence, config.rules.clone())
    }

    fn open(site: String, persistence: PersistenceManager, initial_rules: RuleSet) -> Result<Self> {
        let state = match persistence.load()? {
            Some(loaded) => EngineState::new(loaded.rules, loaded.store),
            None => EngineState::new(initial_rules, RecordStore::new()),
        };
        info!("Engine ready for {} (storage key {})", site, persistence.key());

        Ok(Self {
            site: RwLock::new(site),
            state: RwLock::new(state),
            persistence: Some(persistence),
        })
    }

    /// Current site
    pub fn site(&self) -> String {
        self.site
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch the site subsequent calls are recorded under
    pub fn set_site(&self, site: impl Into<String>) {
        let site = site.into();
        debug!("Switching site to {}", site);
        *self.site.write().unwrap_or_else(PoisonError::into_inner) = site;
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a storage backend is attached
    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    /// Copy of the current rules
    pub fn rules(&self) -> RuleSet {
        self.read_state().rules.clone()
    }

    /// Copy of the whole store
    pub fn store_snapshot(&self) -> RecordStore {
        self.read_state().store.clone()
    }

    /// Filtered copy of the store
    pub fn query(&self, query: &RecordQuery) -> RecordStore {
        self.read_state().store.query(query)
    }

    /// Serialized size of the persisted document right now
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be serialized
    pub fn document_len(&self) -> Result<usize> {
        let state = self.read_state();
        Snapshot::new(&state.rules, &state.store).document_len()
    }

    /// Whether rules changed since the last successful save
    pub fn has_unsaved_rule_changes(&self) -> bool {
        self.read_state().rules_dirty
    }

    /// Set one rule field
    ///
    /// # Errors
    ///
    /// Returns error if the value is rejected; the previous value stays
    pub fn set_rule(&self, field: RuleField, value: Value) -> Result<()> {
        let mut state = self.write_state();
        state.rules.set(field, value)?;
        state.rules_changed();
        debug!("Rule {} updated", field);
        Ok(())
    }

    /// Pause or resume caching for one exact URL
    pub fn ban_url(&self, url: &str, banned: bool) {
        let mut state = self.write_state();
        state.rules.banned_url.insert(url.to_string(), banned);
        state.rules_changed();
    }

    /// Pause or resume caching for one exact site
    pub fn ban_site(&self, site: &str, banned: bool) {
        let mut state = self.write_state();
        state.rules.banned_site.insert(site.to_string(), banned);
        state.rules_changed();
    }

    /// Remove an endpoint record with all its variants
    pub fn delete_endpoint(&self, origin: &str, method: Method, url: &str) -> bool {
        self.write_state().store.delete_endpoint(origin, method, url)
    }

    /// Remove everything recorded under a site
    pub fn delete_origin(&self, origin: &str) -> bool {
        self.write_state().store.delete_origin(origin)
    }

    /// Recorded response of one variant, narrowed by the field focus
    ///
    /// # Errors
    ///
    /// Returns error if the variant does not exist or the focus is invalid
    pub fn focused_response(
        &self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
    ) -> Result<Value> {
        let state = self.read_state();
        let response = &state.store.variant(origin, method, url, index)?.response;
        Ok(match focus_path(&state.rules)? {
            Some(path) => path.extract(response),
            None => response.clone(),
        })
    }

    /// Replace the response of one variant
    ///
    /// With a field focus set only the focused value is replaced.
    ///
    /// # Errors
    ///
    /// Returns error if the variant does not exist or the focus is invalid
    pub fn update_variant_response(
        &self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        value: Value,
    ) -> Result<()> {
        let mut state = self.write_state();
        let response = match focus_path(&state.rules)? {
            Some(path) => {
                let current = state.store.variant(origin, method, url, index)?;
                path.inject(&current.response, value)
            }
            None => value,
        };
        state
            .store
            .set_variant_response(origin, method, url, index, response)
    }

    /// Replace the response of one variant from editor text
    ///
    /// # Errors
    ///
    /// Returns error if `text` is not valid JSON; nothing is changed
    pub fn update_variant_response_text(
        &self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        text: &str,
    ) -> Result<()> {
        let value: Value = serde_json::from_str(text)?;
        self.update_variant_response(origin, method, url, index, value)
    }

    /// Replace the status of one variant
    ///
    /// # Errors
    ///
    /// Returns error if the variant does not exist
    pub fn update_variant_status(
        &self,
        origin: &str,
        method: Method,
        url: &str,
        index: usize,
        status: u16,
    ) -> Result<()> {
        self.write_state()
            .store
            .set_variant_status(origin, method, url, index, status)
    }

    /// Persist rules and recordings, evicting when over budget
    ///
    /// The write lock is held for the whole save, so callers never observe
    /// the store between eviction and write.
    ///
    /// # Errors
    ///
    /// Returns error if no storage is attached or the write fails
    pub fn save(&self) -> Result<SaveReport> {
        let persistence = self.persistence.as_ref().ok_or_else(|| {
            TapedeckError::ConfigError("Engine has no storage attached".to_string())
        })?;

        let mut state = self.write_state();
        let EngineState {
            rules,
            store,
            rules_dirty,
            ..
        } = &mut *state;

        let report = persistence.save(rules, store)?;
        *rules_dirty = false;
        Ok(report)
    }
}

fn focus_path(rules: &RuleSet) -> Result<Option<FieldPath>> {
    if rules.field_focus.is_empty() {
        return Ok(None);
    }
    FieldPath::parse(&rules.field_focus).map(Some)
}
