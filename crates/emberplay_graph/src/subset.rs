// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node subset extraction for copy/paste and fragment serialization.

use crate::graph::GraphAsset;
use crate::link::Link;
use crate::node::{NodeDescriptor, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A detached fragment of a graph: a clone of selected nodes and the links
/// whose both endpoints lie inside the selection.
///
/// Links crossing the selection boundary are dropped at extraction time.
/// Node positions are kept, so pasting preserves relative layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSubset {
    /// Cloned node descriptors
    pub nodes: Vec<NodeDescriptor>,
    /// Cloned internal links
    pub links: Vec<Link>,
}

impl GraphSubset {
    /// Extract a subset from an asset
    pub fn extract(asset: &GraphAsset, selection: &[NodeId]) -> Self {
        let nodes: Vec<NodeDescriptor> = selection
            .iter()
            .filter_map(|id| asset.node(*id).cloned())
            .collect();
        let inside: std::collections::HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
        let links = asset
            .links()
            .filter(|l| inside.contains(&l.from_node) && inside.contains(&l.to_node))
            .cloned()
            .collect();
        Self { nodes, links }
    }

    /// Paste this subset into an asset.
    ///
    /// Every node and link gets a fresh identity; link endpoints are
    /// remapped onto the new node IDs and positions are shifted by
    /// `offset`. Returns the new node IDs in subset order.
    pub fn paste_into(&self, asset: &mut GraphAsset, offset: [f32; 2]) -> Vec<NodeId> {
        let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
        let mut pasted = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            let mut copy = node.clone();
            copy.id = NodeId::new();
            copy.position = [node.position[0] + offset[0], node.position[1] + offset[1]];
            mapping.insert(node.id, copy.id);
            pasted.push(copy.id);
            asset.add_node(copy);
        }

        for link in &self.links {
            let (Some(&from), Some(&to)) = (mapping.get(&link.from_node), mapping.get(&link.to_node))
            else {
                continue;
            };
            if let Err(err) = asset.add_link(from, link.from_port, to, link.to_port) {
                tracing::warn!(%err, "dropped link while pasting subset");
            }
        }

        pasted
    }

    /// Check if the subset holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Port, PortIndex, ValueType};

    fn sample_asset() -> (GraphAsset, NodeId, NodeId, NodeId) {
        let mut graph = GraphAsset::new("sample");
        let a = graph.add_node(
            NodeDescriptor::new("value")
                .with_ports(vec![Port::output("Out", ValueType::Int)])
                .with_position(0.0, 0.0),
        );
        let b = graph.add_node(
            NodeDescriptor::new("sink")
                .with_ports(vec![Port::input("In", ValueType::Int)])
                .with_position(100.0, 40.0),
        );
        let c = graph.add_node(
            NodeDescriptor::new("sink")
                .with_ports(vec![Port::input("In", ValueType::Int)])
                .with_position(200.0, 0.0),
        );
        graph.add_link(a, PortIndex(0), b, PortIndex(0)).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn test_extract_drops_boundary_links() {
        let (mut graph, a, b, c) = sample_asset();
        graph.add_link(a, PortIndex(0), c, PortIndex(0)).unwrap();

        let subset = GraphSubset::extract(&graph, &[a, b]);
        assert_eq!(subset.nodes.len(), 2);
        // a→b is internal, a→c crosses the boundary
        assert_eq!(subset.links.len(), 1);
    }

    #[test]
    fn test_paste_remaps_ids_and_preserves_layout() {
        let (mut graph, a, b, _c) = sample_asset();
        let subset = GraphSubset::extract(&graph, &[a, b]);

        let before_nodes = graph.node_count();
        let pasted = subset.paste_into(&mut graph, [10.0, 10.0]);
        assert_eq!(graph.node_count(), before_nodes + 2);
        assert_eq!(graph.link_count(), 2);
        assert!(graph.validate().is_empty());

        // fresh identities
        assert!(!pasted.contains(&a));
        assert!(!pasted.contains(&b));

        // relative layout preserved under the offset
        let na = graph.node(pasted[0]).unwrap();
        let nb = graph.node(pasted[1]).unwrap();
        assert_eq!(nb.position[0] - na.position[0], 100.0);
        assert_eq!(nb.position[1] - na.position[1], 40.0);
    }
}
