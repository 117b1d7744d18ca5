use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::presence::PresenceCheckReconstructor;
use super::traits::{ReconstructError, Reconstructor};
use crate::conf::JobConf;
use crate::storage::StorageClient;

/// Builds a reconstructor from the job configuration
pub type ReconstructorFactory =
    Arc<dyn Fn(&JobConf) -> Result<Arc<dyn Reconstructor>, ReconstructError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("reconstructor not registered: {0}")]
    NotFound(String),

    #[error("reconstructor {name} failed to initialise: {source}")]
    Instantiate {
        name: String,
        #[source]
        source: ReconstructError,
    },
}

/// Registry mapping reconstructor names to factories
#[derive(Clone, Default)]
pub struct ReconstructorRegistry {
    factories: BTreeMap<String, ReconstructorFactory>,
}

impl ReconstructorRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&JobConf) -> Result<Arc<dyn Reconstructor>, ReconstructError>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        tracing::debug!(name, "Registered reconstructor");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Register a shared instance that ignores the job configuration
    pub fn register_instance(&mut self, name: impl Into<String>, instance: Arc<dyn Reconstructor>) {
        self.register(name, move |_| Ok(instance.clone()));
    }

    pub fn instantiate(
        &self,
        name: &str,
        conf: &JobConf,
    ) -> Result<Arc<dyn Reconstructor>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        factory(conf).map_err(|source| RegistryError::Instantiate {
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create default registry with built-in reconstructors
    pub fn with_defaults(storage: StorageClient) -> Self {
        let mut registry = Self::new();
        registry.register(PresenceCheckReconstructor::NAME, move |_| {
            Ok(Arc::new(PresenceCheckReconstructor::new(storage.clone())))
        });
        registry
    }
}
