//! One engine per HTTP client instance

use std::any::Any;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::Engine;
use crate::{Result, TapedeckError};

/// Maximum number of live engines in one registry
pub const MAX_ENGINES: usize = 1024;

/// Identity of an HTTP client instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(usize);

impl ClientId {
    /// Identity supplied by the caller
    pub fn from_raw(id: usize) -> Self {
        Self(id)
    }

    fn address<T>(client: &Arc<T>) -> Self {
        Self(Arc::as_ptr(client).cast::<()>() as usize)
    }
}

type Owner = Weak<dyn Any + Send + Sync>;

struct Slot {
    // Held weakly so the client's allocation, and with it the key, cannot
    // be reused while the slot exists
    owner: Option<Owner>,
    engine: Arc<Engine>,
}

impl Slot {
    fn is_live(&self) -> bool {
        match &self.owner {
            Some(owner) => owner.strong_count() > 0,
            None => true,
        }
    }
}

/// Engines keyed by client
#[derive(Default)]
pub struct EngineRegistry {
    engines: DashMap<ClientId, Slot>,
}

impl EngineRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine for a shared client, built with `init` on first use
    ///
    /// The engine lives as long as `client` does; once every handle to the
    /// client is gone its engine is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the registry is full or `init` fails
    pub fn get_or_create_for<T, F>(&self, client: &Arc<T>, init: F) -> Result<Arc<Engine>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<Engine>,
    {
        let weak: Weak<T> = Arc::downgrade(client);
        let owner: Owner = weak;
        self.get_or_insert(ClientId::address(client), Some(owner), init)
    }

    /// Engine for `client`, built with `init` on first use
    ///
    /// # Errors
    ///
    /// Returns error if the registry is full or `init` fails
    pub fn get_or_create<F>(&self, client: ClientId, init: F) -> Result<Arc<Engine>>
    where
        F: FnOnce() -> Result<Engine>,
    {
        self.get_or_insert(client, None, init)
    }

    fn get_or_insert<F>(
        &self,
        client: ClientId,
        owner: Option<Owner>,
        init: F,
    ) -> Result<Arc<Engine>>
    where
        F: FnOnce() -> Result<Engine>,
    {
        if let Some(slot) = self.engines.get(&client) {
            if slot.is_live() {
                return Ok(Arc::clone(&slot.engine));
            }
        }

        if self.engines.len() >= MAX_ENGINES && self.prune() == 0 {
            return Err(TapedeckError::Other(format!(
                "Engine limit reached: {MAX_ENGINES}"
            )));
        }

        let engine = Arc::new(init()?);
        let slot = Slot {
            owner,
            engine: Arc::clone(&engine),
        };
        // Another caller may have won the race while `init` ran
        match self.engines.entry(client) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_live() {
                    return Ok(Arc::clone(&existing.get().engine));
                }
                existing.insert(slot);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }
        debug!("Created engine for {:?}", client);
        Ok(engine)
    }

    /// Engine for a shared client, if one exists
    pub fn get_for<T>(&self, client: &Arc<T>) -> Option<Arc<Engine>> {
        self.get(ClientId::address(client))
    }

    /// Engine for `client`, if one exists
    pub fn get(&self, client: ClientId) -> Option<Arc<Engine>> {
        self.engines
            .get(&client)
            .filter(|slot| slot.is_live())
            .map(|slot| Arc::clone(&slot.engine))
    }

    /// Drop the engine for `client`
    pub fn remove(&self, client: ClientId) -> Option<Arc<Engine>> {
        self.engines.remove(&client).map(|(_, slot)| slot.engine)
    }

    /// Drop engines whose client is gone, returning how many were dropped
    pub fn prune(&self) -> usize {
        let before = self.engines.len();
        self.engines.retain(|_, slot| slot.is_live());
        before - self.engines.len()
    }

    /// Number of live engines
    pub fn len(&self) -> usize {
        self.engines.iter().filter(|slot| slot.is_live()).count()
    }

    /// Whether no engine exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
