// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph asset: the authored, editable graph structure.
//!
//! This layer is purely structural. It validates edits and keeps the link
//! table consistent, and never executes node logic.

use crate::blackboard::BlackboardSpec;
use crate::library::{AssetId, AssetLibrary};
use crate::link::{Link, LinkId};
use crate::node::{NodeDescriptor, NodeId};
use crate::port::{Port, PortDirection, PortIndex};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The externally visible surface of a graph asset.
///
/// Mirrors every port marked external on the asset's nodes, in node order
/// then port order. A sub-graph node hosting the asset exposes exactly
/// these ports; `targets[i]` names the internal endpoint behind `ports[i]`.
#[derive(Debug, Clone, Default)]
pub struct ExternalPorts {
    /// Mirrored port descriptors, in exposure order
    pub ports: Vec<Port>,
    /// Internal endpoint behind each mirrored port
    pub targets: Vec<(NodeId, PortIndex)>,
}

/// An authored graph: node table, link table, variable declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphAsset {
    /// Asset identity
    pub id: AssetId,
    /// Asset name
    pub name: String,
    /// Nodes in the graph
    nodes: IndexMap<NodeId, NodeDescriptor>,
    /// Links between ports
    links: IndexMap<LinkId, Link>,
    /// Declared blackboard variables
    pub blackboard: BlackboardSpec,
}

impl GraphAsset {
    /// Create a new empty graph asset
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: AssetId::new(),
            name: name.into(),
            nodes: IndexMap::new(),
            links: IndexMap::new(),
            blackboard: BlackboardSpec::new(),
        }
    }

    /// Add a node to the graph
    pub fn add_node(&mut self, node: NodeDescriptor) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<NodeDescriptor> {
        self.links.retain(|_, link| !link.involves_node(node_id));
        let removed = self.nodes.shift_remove(&node_id);
        if removed.is_some() {
            tracing::debug!(%node_id, graph = %self.name, "removed node");
        }
        removed
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&NodeDescriptor> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut NodeDescriptor> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a link between two ports.
    ///
    /// Control links connect exit→enter, data links connect output→input.
    /// Both endpoints must be nodes of this asset, which is also what makes
    /// cross-asset control links inexpressible.
    pub fn add_link(
        &mut self,
        from_node: NodeId,
        from_port: PortIndex,
        to_node: NodeId,
        to_port: PortIndex,
    ) -> Result<LinkId, LinkError> {
        let source_node = self
            .nodes
            .get(&from_node)
            .ok_or(LinkError::NodeNotFound(from_node))?;
        let target_node = self
            .nodes
            .get(&to_node)
            .ok_or(LinkError::NodeNotFound(to_node))?;

        let source = source_node.port(from_port).ok_or(LinkError::PortNotFound {
            node: from_node,
            port: from_port,
        })?;
        let target = target_node.port(to_port).ok_or(LinkError::PortNotFound {
            node: to_node,
            port: to_port,
        })?;

        match (source.direction, target.direction) {
            (PortDirection::ControlExit, PortDirection::ControlEnter) => {}
            (PortDirection::DataOutput, PortDirection::DataInput) => {
                if let (Some(src), Some(dst)) = (source.data_type, target.data_type) {
                    if !dst.accepts(src) {
                        return Err(LinkError::IncompatibleTypes { from: src, to: dst });
                    }
                }
            }
            _ => return Err(LinkError::DirectionMismatch),
        }

        let mut incoming = self.links.values().filter(|l| l.ends_at(to_node, to_port));
        if incoming.any(|l| l.from_node == from_node && l.from_port == from_port) {
            return Err(LinkError::DuplicateLink);
        }
        if target.direction == PortDirection::DataInput
            && !target.is_multiple
            && self.links.values().any(|l| l.ends_at(to_node, to_port))
        {
            return Err(LinkError::InputOccupied {
                node: to_node,
                port: to_port,
            });
        }

        let link = Link::new(from_node, from_port, to_node, to_port);
        let id = link.id;
        self.links.insert(id, link);
        Ok(id)
    }

    /// Remove a link
    pub fn remove_link(&mut self, link_id: LinkId) -> Option<Link> {
        self.links.shift_remove(&link_id)
    }

    /// Get a link by ID
    pub fn link(&self, link_id: LinkId) -> Option<&Link> {
        self.links.get(&link_id)
    }

    /// Get all links in insertion order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Links starting at a node
    pub fn links_from(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.from_node == node_id)
    }

    /// Links ending at a node
    pub fn links_to(&self, node_id: NodeId) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.to_node == node_id)
    }

    /// Links starting at a specific port, in insertion order
    pub fn outgoing(&self, node_id: NodeId, port: PortIndex) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.starts_at(node_id, port))
    }

    /// Links ending at a specific port, in insertion order
    pub fn incoming(&self, node_id: NodeId, port: PortIndex) -> impl Iterator<Item = &Link> {
        self.links.values().filter(move |l| l.ends_at(node_id, port))
    }

    /// Replace a node's port array with a freshly generated one and prune
    /// links that no longer resolve.
    ///
    /// The array is swapped atomically; indices keep their meaning only as
    /// far as the new array agrees with the old one. Idempotent.
    pub fn invalidate_node(&mut self, node_id: NodeId, ports: Vec<Port>) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        node.ports = ports;
        let pruned = self.prune_invalid_links();
        if pruned > 0 {
            tracing::debug!(%node_id, pruned, "invalidated node ports");
        }
    }

    /// Point a node at another graph asset.
    ///
    /// The node's ports are regenerated from the referenced asset's external
    /// ports. Rejects self-reference and transitive reference cycles so the
    /// error surfaces at authoring time rather than at compile time.
    pub fn set_subgraph_reference(
        &mut self,
        node_id: NodeId,
        asset: AssetId,
        library: &AssetLibrary,
    ) -> Result<(), ReferenceError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(ReferenceError::NodeNotFound(node_id));
        }
        if asset == self.id {
            return Err(ReferenceError::SelfReference);
        }
        let Some(referenced) = library.get(asset) else {
            return Err(ReferenceError::AssetNotFound(asset));
        };
        if library.references_transitively(asset, self.id) {
            return Err(ReferenceError::CyclicReference(asset));
        }

        let ports = referenced.external_ports().ports;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return Err(ReferenceError::NodeNotFound(node_id));
        };
        node.subgraph = Some(asset);
        node.ports = ports;
        self.prune_invalid_links();
        Ok(())
    }

    /// Compute the asset's externally visible port surface.
    ///
    /// Walks nodes in insertion order, ports in index order; mirrored ports
    /// drop the external flag so nesting does not re-export implicitly.
    pub fn external_ports(&self) -> ExternalPorts {
        let mut external = ExternalPorts::default();
        for node in self.nodes.values() {
            for (index, port) in node.ports_indexed() {
                if port.is_external {
                    let mut mirrored = port.clone();
                    mirrored.is_external = false;
                    external.ports.push(mirrored);
                    external.targets.push((node.id, index));
                }
            }
        }
        external
    }

    /// Integrity sweep: IDs of links whose endpoints no longer resolve
    pub fn validate(&self) -> Vec<LinkId> {
        self.links
            .values()
            .filter(|link| !self.link_is_valid(link))
            .map(|link| link.id)
            .collect()
    }

    fn link_is_valid(&self, link: &Link) -> bool {
        let (Some(from), Some(to)) = (self.nodes.get(&link.from_node), self.nodes.get(&link.to_node))
        else {
            return false;
        };
        match (from.port(link.from_port), to.port(link.to_port)) {
            (Some(source), Some(target)) => source.can_link_to(target),
            _ => false,
        }
    }

    fn prune_invalid_links(&mut self) -> usize {
        let stale = self.validate();
        for id in &stale {
            if let Some(link) = self.links.shift_remove(id) {
                tracing::debug!(
                    from = %link.from_node,
                    to = %link.to_node,
                    "pruned stale link"
                );
            }
        }
        stale.len()
    }
}

impl Default for GraphAsset {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when adding a link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Endpoint node is not part of this graph
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Endpoint port index is out of range
    #[error("port {port} not found on node {node}")]
    PortNotFound {
        /// Node carrying the missing port
        node: NodeId,
        /// Missing port index
        port: PortIndex,
    },

    /// Port directions do not pair up
    #[error("port directions do not form an exit→enter or output→input pair")]
    DirectionMismatch,

    /// Data types cannot be bridged
    #[error("cannot link {from:?} output to {to:?} input")]
    IncompatibleTypes {
        /// Source data type
        from: crate::port::ValueType,
        /// Target data type
        to: crate::port::ValueType,
    },

    /// Non-multiple input already has an incoming link
    #[error("input port {port} on node {node} already has a link")]
    InputOccupied {
        /// Occupied node
        node: NodeId,
        /// Occupied port index
        port: PortIndex,
    },

    /// An identical link already exists
    #[error("an identical link already exists")]
    DuplicateLink,
}

/// Error when setting a sub-graph reference
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// Node is not part of this graph
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node may not reference its own owning asset
    #[error("a sub-graph node may not reference its own asset")]
    SelfReference,

    /// The reference would close an asset cycle
    #[error("referencing asset {0} would create a reference cycle")]
    CyclicReference(AssetId),

    /// Referenced asset is not loaded
    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),
}
