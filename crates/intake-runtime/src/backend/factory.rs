//! Backend factory pattern for dynamic registration.
//!
//! New backends plug in by implementing [`BackendFactory`] and
//! registering it, without touching the engine or any enum.
//!
//! ## Usage
//!
//! ```ignore
//! let mut registry = BackendRegistry::new();
//! registry.register(Arc::new(LocalBackendFactory));
//!
//! let backend = registry.create("local", &config)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{BackendError, CompletionBackend};

/// Factory for creating completion backends from configuration.
pub trait BackendFactory: Send + Sync {
    /// Unique identifier for this backend type.
    ///
    /// Examples: "local", "openai", "vertex"
    fn backend_type(&self) -> &'static str;

    /// Create a backend instance from JSON configuration.
    fn create(&self, config: &JsonValue) -> Result<Arc<dyn CompletionBackend>, BackendError>;

    /// Validate configuration without creating a backend.
    ///
    /// Use this for fast config validation during startup.
    fn validate_config(&self, config: &JsonValue) -> Result<(), BackendError>;

    /// Human-readable description of this backend.
    fn description(&self) -> &'static str {
        "completion backend"
    }
}

/// Registry of available backend factories.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory.
    ///
    /// A factory with the same type replaces the existing one.
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories
            .insert(factory.backend_type().to_string(), factory);
    }

    /// Create a backend of the given type from configuration.
    pub fn create(
        &self,
        backend_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn CompletionBackend>, BackendError> {
        self.factory(backend_type)?.create(config)
    }

    /// Validate configuration for the given backend type.
    pub fn validate_config(
        &self,
        backend_type: &str,
        config: &JsonValue,
    ) -> Result<(), BackendError> {
        self.factory(backend_type)?.validate_config(config)
    }

    /// Registered backend type names, sorted.
    pub fn backend_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    fn factory(&self, backend_type: &str) -> Result<&Arc<dyn BackendFactory>, BackendError> {
        self.factories.get(backend_type).ok_or_else(|| {
            BackendError::NotConfigured(format!(
                "unknown backend type '{}', registered types: {:?}",
                backend_type,
                self.backend_types()
            ))
        })
    }
}
