// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph compiler and runtime executor for Emberplay visual scripting.
//!
//! Takes authored [`emberplay_graph`] assets and turns them into running
//! script instances:
//! - [`BehaviorRegistry`] maps opaque behavior identifiers to node
//!   implementations ([`NodeBehavior`])
//! - [`compile`] flattens an asset — sub-graph references included — into a
//!   dense slot arena with all links resolved up front
//! - [`Executor`] drives node lifecycle and the two runtime operations
//!   nodes build on: `call` (push control flow) and `read` (pull data)
//!
//! ## Execution model
//!
//! Single-threaded and cooperative: the host's update loop and node-started
//! callbacks are the only drivers. `call`/`read` are synchronous, re-entrant
//! function calls; asynchronous node work re-enters the graph later and must
//! check its [`Liveness`] handle first.

pub mod behavior;
pub mod compile;
pub mod executor;
pub mod host;
pub mod registry;
pub mod token;

pub use behavior::{Caps, NodeBehavior, NodeError};
pub use compile::{compile, CompileError, CompileOptions};
pub use executor::{Executor, ExecutorError, Liveness, NodeContext, Phase};
pub use host::{EmptyHost, HostContext};
pub use registry::{BehaviorFactory, BehaviorRegistry};
pub use token::{NodeToken, ScopeId};
