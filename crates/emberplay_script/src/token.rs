// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime identity of node instances.
//!
//! A `NodeId` is stable per asset, but one asset can be instantiated many
//! times (once per sub-graph node referencing it, recursively). The scope
//! chain disambiguates: every instantiation path hashes to its own
//! `ScopeId`, and `ScopeId` + `NodeId` addresses exactly one runtime slot.

use emberplay_graph::NodeId;
use std::hash::{Hash, Hasher};

/// Identity of one sub-graph instantiation path.
///
/// The root asset occupies [`ScopeId::ROOT`]; each sub-graph node chains a
/// hash of its own `NodeId` onto the enclosing scope. The hash is built
/// with the std `DefaultHasher` (fixed-key SipHash), so the same graph
/// compiles to the same scope ids every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// The top-level scope
    pub const ROOT: ScopeId = ScopeId(0);

    /// Derive the scope created by a sub-graph node in this scope
    pub fn child(self, subgraph_node: NodeId) -> ScopeId {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.0.hash(&mut hasher);
        subgraph_node.0.hash(&mut hasher);
        ScopeId(hasher.finish())
    }

    /// Check if this is the top-level scope
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "{:016x}", self.0)
        }
    }
}

/// Runtime identity of a node instance within one compiled executor.
///
/// Stable for the lifetime of that executor; recompilation invalidates all
/// tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeToken {
    /// Instantiation path of the owning asset
    pub scope: ScopeId,
    /// Authored node identity within that asset
    pub node: NodeId,
}

impl NodeToken {
    /// Token of a node instance in an arbitrary scope
    pub fn new(scope: ScopeId, node: NodeId) -> Self {
        Self { scope, node }
    }

    /// Token of a node in the top-level asset
    pub fn root(node: NodeId) -> Self {
        Self::new(ScopeId::ROOT, node)
    }
}

impl std::fmt::Display for NodeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.node, self.scope)
    }
}
