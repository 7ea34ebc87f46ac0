// SPDX-License-Identifier: MIT OR Apache-2.0
//! Link (edge) definitions for the graph.

use crate::node::NodeId;
use crate::port::PortIndex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub Uuid);

impl LinkId {
    /// Create a new random link ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed edge between two ports.
///
/// Control links connect exit→enter ports, data links connect output→input
/// ports. Both endpoints are nodes of the same graph asset; the only way a
/// value or call crosses assets is through sub-graph external ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Unique link ID
    pub id: LinkId,
    /// Source node ID
    pub from_node: NodeId,
    /// Source port index
    pub from_port: PortIndex,
    /// Target node ID
    pub to_node: NodeId,
    /// Target port index
    pub to_port: PortIndex,
}

impl Link {
    /// Create a new link
    pub fn new(from_node: NodeId, from_port: PortIndex, to_node: NodeId, to_port: PortIndex) -> Self {
        Self {
            id: LinkId::new(),
            from_node,
            from_port,
            to_node,
            to_port,
        }
    }

    /// Check if this link touches a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.from_node == node_id || self.to_node == node_id
    }

    /// Check if this link starts at a specific port
    pub fn starts_at(&self, node_id: NodeId, port: PortIndex) -> bool {
        self.from_node == node_id && self.from_port == port
    }

    /// Check if this link ends at a specific port
    pub fn ends_at(&self, node_id: NodeId, port: PortIndex) -> bool {
        self.to_node == node_id && self.to_port == port
    }
}
