// SPDX-License-Identifier: MIT OR Apache-2.0
//! Authored node-graph model for Emberplay visual scripting.
//!
//! This crate holds the editable, persisted side of the scripting engine:
//! - Typed ports (control enter/exit, data input/output)
//! - Node descriptors with opaque behavior types and configuration blobs
//! - Validated links and structural edit operations
//! - Sub-graph references with edit-time cycle rejection
//! - Blackboard variable declarations and per-instance copies
//!
//! ## Architecture
//!
//! Everything here is purely structural: edits are validated and the link
//! table is kept consistent, but no node logic ever runs. The runtime side
//! (compiler and executor) lives in `emberplay_script` and consumes
//! snapshots of these assets.

pub mod blackboard;
pub mod graph;
pub mod library;
pub mod link;
pub mod node;
pub mod port;
pub mod subset;

pub use blackboard::{Blackboard, BlackboardSpec};
pub use graph::{ExternalPorts, GraphAsset, LinkError, ReferenceError};
pub use library::{AssetId, AssetLibrary};
pub use link::{Link, LinkId};
pub use node::{NodeDescriptor, NodeId};
pub use port::{Port, PortDirection, PortIndex, Value, ValueType};
pub use subset::GraphSubset;
