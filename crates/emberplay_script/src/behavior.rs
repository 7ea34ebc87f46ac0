// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node behavior contract: the callbacks a node type may implement.

use crate::executor::NodeContext;
use emberplay_graph::{Port, PortIndex, Value};

/// Capability bitmask declaring which optional callbacks a behavior
/// implements.
///
/// Queried once per node at compile time and stored per slot, so the
/// executor never probes behaviors inside the `call`/`read` hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Caps(u8);

impl Caps {
    /// No optional callbacks
    pub const NONE: Caps = Caps(0);
    /// Implements [`NodeBehavior::on_enter_port`]
    pub const ENTER: Caps = Caps(1);
    /// Implements [`NodeBehavior::output_value`]
    pub const OUTPUT: Caps = Caps(1 << 1);
    /// Implements [`NodeBehavior::on_start`]
    pub const START: Caps = Caps(1 << 2);
    /// Implements [`NodeBehavior::on_enable`]
    pub const ENABLE: Caps = Caps(1 << 3);
    /// Implements [`NodeBehavior::on_links_changed`]
    pub const LINKS: Caps = Caps(1 << 4);

    /// Check whether every capability in `other` is present
    pub fn contains(self, other: Caps) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Caps {
    type Output = Caps;

    fn bitor(self, rhs: Caps) -> Caps {
        Caps(self.0 | rhs.0)
    }
}

/// Error raised by a node behavior callback.
///
/// The executor never swallows these; they propagate to whoever invoked
/// `call`/`read` (possibly another node).
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// No factory registered for a behavior type identifier
    #[error("unknown behavior type `{0}`")]
    UnknownBehavior(String),

    /// Configuration blob could not be interpreted
    #[error("invalid node configuration: {0}")]
    BadConfig(String),

    /// Behavior-specific failure
    #[error("{0}")]
    Custom(String),
}

/// One node type's runtime implementation.
///
/// All callbacks take `&self`: behaviors keep their mutable state in
/// interior-mutability cells (`Cell`, `RefCell`). That is what makes
/// synchronous re-entrancy sound — `on_enter_port` may call back into the
/// executor, including along links that loop into the calling node, without
/// any lock being held. A behavior must not keep its own `RefCell` borrowed
/// across an outgoing `call`/`read`.
pub trait NodeBehavior {
    /// Produce the node's port array; a pure function of configuration
    fn create_ports(&self) -> Vec<Port>;

    /// Declare the optional callbacks this behavior implements
    fn capabilities(&self) -> Caps {
        Caps::NONE
    }

    /// One-time setup; runs in slot order during executor initialization
    fn on_initialize(&self, _ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Teardown; runs in reverse slot order during de-initialization
    fn on_deinitialize(&self) {}

    /// Enable/disable notification (requires [`Caps::ENABLE`])
    fn on_enable(&self, _ctx: &NodeContext<'_>, _enabled: bool) {}

    /// First-tick notification, once per instance (requires [`Caps::START`])
    fn on_start(&self, _ctx: &NodeContext<'_>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Control-flow entry handler (requires [`Caps::ENTER`])
    fn on_enter_port(&self, _ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
        Ok(())
    }

    /// Data-output evaluation handler, pulled by `read` (requires
    /// [`Caps::OUTPUT`]); re-evaluated on every read, never cached
    fn output_value(&self, _ctx: &NodeContext<'_>, port: PortIndex) -> Result<Value, NodeError> {
        Err(NodeError::Custom(format!("port {port} produces no value")))
    }

    /// Wiring notification (requires [`Caps::LINKS`]): invoked once per
    /// port at the end of compilation with the resolved link count
    fn on_links_changed(&self, _port: PortIndex, _link_count: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_bit_algebra() {
        let caps = Caps::ENTER | Caps::START;
        assert!(caps.contains(Caps::ENTER));
        assert!(caps.contains(Caps::START));
        assert!(!caps.contains(Caps::OUTPUT));
        assert!(caps.contains(Caps::NONE));
        assert!(Caps::NONE.contains(Caps::NONE));
    }
}
