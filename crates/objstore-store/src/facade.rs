//! Process-wide backend registry
//!
//! Wire handlers never hold direct backend references; they resolve
//! backends by name through the facade, so tests can substitute backends
//! by re-initialising.

use crate::store::ObjectStore;
use objstore_common::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

#[derive(Default)]
struct Registry {
    backends: HashMap<String, Arc<dyn ObjectStore>>,
    default: Option<String>,
}

/// Named-backend registry with init-once / reset-for-tests semantics
#[derive(Default)]
pub struct Facade {
    registry: RwLock<Registry>,
}

impl Facade {
    /// Create an empty, uninitialised facade
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide facade instance
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<Facade>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Install the backends and declare the default.
    ///
    /// The registry is set once; call `reset` first to replace it
    /// (tests only).
    pub fn initialize(
        &self,
        backends: HashMap<String, Arc<dyn ObjectStore>>,
        default: &str,
    ) -> Result<()> {
        if !backends.contains_key(default) {
            return Err(Error::configuration(format!(
                "default backend {default:?} is not registered"
            )));
        }
        let mut registry = self.registry.write();
        if registry.default.is_some() {
            return Err(Error::configuration("facade is already initialized"));
        }
        registry.backends = backends;
        registry.default = Some(default.to_string());
        Ok(())
    }

    /// Resolve a backend by name
    pub fn backend(&self, name: &str) -> Result<Arc<dyn ObjectStore>> {
        self.registry
            .read()
            .backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackendNotFound(name.to_string()))
    }

    /// Resolve the default backend
    pub fn default_backend(&self) -> Result<Arc<dyn ObjectStore>> {
        let registry = self.registry.read();
        let name = registry
            .default
            .as_ref()
            .ok_or_else(|| Error::configuration("facade is not initialized"))?;
        registry
            .backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::BackendNotFound(name.clone()))
    }

    /// Name of the declared default backend
    pub fn default_backend_name(&self) -> Result<String> {
        self.registry
            .read()
            .default
            .clone()
            .ok_or_else(|| Error::configuration("facade is not initialized"))
    }

    /// Whether a backend name is registered
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().backends.contains_key(name)
    }

    /// Names of all registered backends, sorted
    #[must_use]
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Clear the registry so it can be re-initialised (tests only)
    pub fn reset(&self) {
        let mut registry = self.registry.write();
        registry.backends.clear();
        registry.default = None;
    }
}
