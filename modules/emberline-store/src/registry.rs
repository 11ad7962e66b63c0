//! Explicit per-universe client registry.
//!
//! Built once at process startup from [`Config`] and passed by reference
//! into the engine components; there is no implicit module-global
//! connection state.

use std::collections::HashMap;
use std::sync::Arc;

use emberline_common::{Config, EmberlineError};

use crate::elastic::EsStore;

pub struct StoreRegistry {
    stores: HashMap<String, Arc<EsStore>>,
}

impl StoreRegistry {
    /// Connect a store for every configured universe.
    pub fn from_config(config: &Config) -> Result<Self, EmberlineError> {
        let mut stores = HashMap::new();
        for universe in &config.universes {
            let store = EsStore::connect(&config.elasticsearch_url)?;
            stores.insert(universe.clone(), Arc::new(store));
        }
        Ok(Self { stores })
    }

    pub fn get(&self, universe: &str) -> Option<Arc<EsStore>> {
        self.stores.get(universe).cloned()
    }

    pub fn universes(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }
}
