use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::controller::Controller;

/// Named controllers, fixed before the first round.
///
/// Iteration is name-ordered so two runs over the same data take the same
/// path.
#[derive(Default, Clone)]
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Arc<dyn Controller>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller. A second registration under the same name
    /// replaces the first.
    pub fn register(&mut self, name: impl Into<String>, controller: impl Controller + 'static) {
        self.register_arc(name, Arc::new(controller));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, controller: Arc<dyn Controller>) {
        let name = name.into();
        if self.controllers.insert(name.clone(), controller).is_some() {
            warn!("Controller '{}' registered twice, keeping the last one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Controller>> {
        self.controllers.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Controller>)> {
        self.controllers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> Vec<&str> {
        self.controllers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
