// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of behavior factories.
//!
//! Built once by the surrounding tooling (the editor discovers node types;
//! the engine only consumes opaque behavior identifiers). Factories produce
//! one behavior instance per compiled node, since behaviors carry
//! per-instance state.

use crate::behavior::{NodeBehavior, NodeError};
use emberplay_graph::Port;
use indexmap::IndexMap;

/// Factory producing a behavior instance from a configuration blob
pub type BehaviorFactory = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn NodeBehavior>, NodeError>>;

/// Registry of available behavior types
#[derive(Default)]
pub struct BehaviorRegistry {
    factories: IndexMap<String, BehaviorFactory>,
}

impl BehaviorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a behavior type
    pub fn register<F>(&mut self, behavior: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn NodeBehavior>, NodeError> + 'static,
    {
        self.factories.insert(behavior.into(), Box::new(factory));
    }

    /// Instantiate a behavior from its type identifier and configuration
    pub fn instantiate(
        &self,
        behavior: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn NodeBehavior>, NodeError> {
        let factory = self
            .factories
            .get(behavior)
            .ok_or_else(|| NodeError::UnknownBehavior(behavior.to_string()))?;
        factory(config)
    }

    /// Generate the port array a behavior exposes for a configuration.
    ///
    /// Used by editor tooling when a node's configuration changes; the
    /// result feeds `GraphAsset::invalidate_node`.
    pub fn create_ports(
        &self,
        behavior: &str,
        config: &serde_json::Value,
    ) -> Result<Vec<Port>, NodeError> {
        Ok(self.instantiate(behavior, config)?.create_ports())
    }

    /// Check whether a behavior type is registered
    pub fn contains(&self, behavior: &str) -> bool {
        self.factories.contains_key(behavior)
    }

    /// Registered behavior type identifiers, in registration order
    pub fn behaviors(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
