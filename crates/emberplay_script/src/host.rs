// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host context handed to a graph instance at initialization.

use std::any::Any;

/// Context the owning host provides to a running graph instance.
///
/// Nodes that act on their owner (a controller, an entity, a widget) reach
/// it through this object during `on_initialize` and downcast to the
/// concrete host type. Ambient services stay out of the engine: anything a
/// node needs from its environment comes through here.
pub trait HostContext: Any {
    /// Downcast access to the concrete host type
    fn as_any(&self) -> &dyn Any;
}

/// Host context for graphs that need nothing from their host
#[derive(Debug, Default)]
pub struct EmptyHost;

impl HostContext for EmptyHost {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spawner {
        budget: u32,
    }

    impl HostContext for Spawner {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_downcast_to_concrete_host() {
        let host: Box<dyn HostContext> = Box::new(Spawner { budget: 3 });
        let spawner = host.as_any().downcast_ref::<Spawner>().unwrap();
        assert_eq!(spawner.budget, 3);
        assert!(host.as_any().downcast_ref::<EmptyHost>().is_none());
    }
}
