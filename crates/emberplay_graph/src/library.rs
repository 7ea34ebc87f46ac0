// SPDX-License-Identifier: MIT OR Apache-2.0
//! Asset library resolving graph assets by identity.

use crate::graph::GraphAsset;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a graph asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub Uuid);

impl AssetId {
    /// Create a new random asset ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collection of loaded graph assets, keyed by identity.
///
/// Sub-graph references and the compiler resolve assets through this.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetLibrary {
    assets: IndexMap<AssetId, GraphAsset>,
}

impl AssetLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an asset, returning its ID
    pub fn insert(&mut self, asset: GraphAsset) -> AssetId {
        let id = asset.id;
        self.assets.insert(id, asset);
        id
    }

    /// Remove an asset
    pub fn remove(&mut self, id: AssetId) -> Option<GraphAsset> {
        self.assets.shift_remove(&id)
    }

    /// Get an asset by ID
    pub fn get(&self, id: AssetId) -> Option<&GraphAsset> {
        self.assets.get(&id)
    }

    /// Get a mutable asset by ID
    pub fn get_mut(&mut self, id: AssetId) -> Option<&mut GraphAsset> {
        self.assets.get_mut(&id)
    }

    /// Check whether an asset is loaded
    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(&id)
    }

    /// Iterate over loaded assets
    pub fn assets(&self) -> impl Iterator<Item = &GraphAsset> {
        self.assets.values()
    }

    /// Number of loaded assets
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Check if the library is empty
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Check whether `start` reaches `needle` through sub-graph references.
    ///
    /// Used to reject reference cycles at edit time, including indirect ones
    /// (A references B, B references C, C references A).
    pub fn references_transitively(&self, start: AssetId, needle: AssetId) -> bool {
        let mut stack = vec![start];
        let mut visited = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == needle {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(asset) = self.get(current) {
                for node in asset.nodes() {
                    if let Some(referenced) = node.subgraph {
                        stack.push(referenced);
                    }
                }
            }
        }
        false
    }
}
