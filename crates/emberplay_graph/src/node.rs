// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node descriptors for authored graph vertices.

use crate::library::AssetId;
use crate::port::{Port, PortIndex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node within one graph asset.
///
/// Survives edits until the node is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An authored graph vertex.
///
/// The port array is regenerated from behavior type + configuration (port
/// count and types can depend on configuration); see
/// [`GraphAsset::invalidate_node`](crate::graph::GraphAsset::invalidate_node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Stable node identity within the owning asset
    pub id: NodeId,
    /// Opaque behavior type identifier (registry key)
    pub behavior: String,
    /// Serialized configuration blob
    pub config: serde_json::Value,
    /// Referenced graph asset, for sub-graph nodes
    pub subgraph: Option<AssetId>,
    /// Current port array
    pub ports: Vec<Port>,
    /// Position in the graph UI
    pub position: [f32; 2],
}

impl NodeDescriptor {
    /// Create a new node with the given behavior type
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            behavior: behavior.into(),
            config: serde_json::Value::Null,
            subgraph: None,
            ports: Vec::new(),
            position: [0.0, 0.0],
        }
    }

    /// Set the configuration blob
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Set the port array
    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Get a port by index
    pub fn port(&self, index: PortIndex) -> Option<&Port> {
        self.ports.get(index.index())
    }

    /// Check whether this node instantiates another graph asset
    pub fn is_subgraph(&self) -> bool {
        self.subgraph.is_some()
    }

    /// Iterate over ports with their indices
    pub fn ports_indexed(&self) -> impl Iterator<Item = (PortIndex, &Port)> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, p)| (PortIndex(i as u16), p))
    }
}
