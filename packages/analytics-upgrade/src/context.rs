use analytics_storage::DocumentStore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::UpgradeConfig;
use crate::error::{Result, UpgradeError};

/// Shared state threaded through every controller hook.
///
/// Connect hooks attach their store handles here; refresh and transform
/// hooks read them back, including stores owned by other controllers.
pub struct UpgradeContext {
    pub config: UpgradeConfig,
    stores: BTreeMap<String, Arc<dyn DocumentStore>>,
}

impl UpgradeContext {
    pub fn new(config: UpgradeConfig) -> Self {
        Self {
            config,
            stores: BTreeMap::new(),
        }
    }

    /// Attach (or replace) the store used under `name`
    pub fn attach_store(&mut self, name: impl Into<String>, store: Arc<dyn DocumentStore>) {
        self.stores.insert(name.into(), store);
    }

    pub fn has_store(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    pub fn store(&self, name: &str) -> Result<Arc<dyn DocumentStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| UpgradeError::StoreNotConnected(name.to_string()))
    }
}

impl Default for UpgradeContext {
    fn default() -> Self {
        Self::new(UpgradeConfig::default())
    }
}

impl fmt::Debug for UpgradeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeContext")
            .field("config", &self.config)
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
