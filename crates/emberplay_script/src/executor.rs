// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime executor for one compiled graph instance.
//!
//! Owns the dense slot arena the compiler produced and drives node
//! lifecycle plus the two core operations node implementations use during
//! execution: `call` (propagate control flow) and `read` (pull a data
//! value). Everything is single-threaded and re-entrant: a node's
//! `on_enter_port` may call back into the executor, including along links
//! that loop into the node itself, so no borrow is held across node
//! callbacks and the compiled tables are immutable after construction.

use crate::behavior::{Caps, NodeBehavior, NodeError};
use crate::host::HostContext;
use crate::token::{NodeToken, ScopeId};
use emberplay_graph::{Blackboard, Port, PortDirection, PortIndex, Value, ValueType};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// Lifecycle phase of a runtime instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Compiled, not yet initialized
    #[default]
    Uninitialized,
    /// Nodes have run their one-time setup
    Initialized,
    /// The owning host is active
    Enabled,
    /// The owning host is inactive; may be re-enabled
    Disabled,
    /// Torn down; terminal
    DeInitialized,
}

impl Phase {
    /// Check if `call`/`read` may run in this phase
    pub fn is_running(self) -> bool {
        matches!(self, Self::Initialized | Self::Enabled | Self::Disabled)
    }

    /// Check if the instance is currently enabled
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Resolved endpoint of a compiled link
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target {
    /// Dense slot index of the resolved node instance
    pub slot: usize,
    /// Port index on that node
    pub port: PortIndex,
}

/// Compiled source binding of one data-input port
#[derive(Debug, Clone)]
pub(crate) enum DataBinding {
    /// No incoming link; reads fall back to the port's inline default
    Unlinked,
    /// Exactly one source
    Single(Target),
    /// Multiple sources, in link order
    Many(Vec<Target>),
}

/// One compiled node instance
pub(crate) struct Slot {
    pub token: NodeToken,
    pub behavior: Box<dyn NodeBehavior>,
    pub ports: Vec<Port>,
    pub caps: Caps,
    pub scope: usize,
    /// Per-port resolved call targets (non-empty only for control exits)
    pub control: Vec<Vec<Target>>,
    /// Per-port resolved data sources (meaningful only for data inputs)
    pub data: Vec<DataBinding>,
}

/// One sub-graph instantiation (the root asset included)
pub(crate) struct ScopeRecord {
    pub id: ScopeId,
    /// This instance's own copy of the asset's variables
    pub blackboard: RefCell<Blackboard>,
}

/// Cancellation handle tied to the instance's enabled span.
///
/// Asynchronous continuations started by a node must check `is_live`
/// before re-entering the graph; disabling or de-initializing the instance
/// revokes every handle armed since the matching enable.
#[derive(Debug, Clone)]
pub struct Liveness {
    flag: Rc<Cell<bool>>,
}

impl Liveness {
    /// Check whether re-entering the graph is still permitted
    pub fn is_live(&self) -> bool {
        self.flag.get()
    }
}

/// Error from a lifecycle transition
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Transition invoked in the wrong phase
    #[error("`{op}` is not valid in phase {phase:?}")]
    Phase {
        /// Offending operation
        op: &'static str,
        /// Phase the instance was in
        phase: Phase,
    },

    /// `start` may only run once per instance
    #[error("the instance has already started")]
    AlreadyStarted,

    /// A node callback failed during the transition
    #[error(transparent)]
    Node(#[from] NodeError),
}

/// Executor for one compiled graph instance.
///
/// All methods take `&self`; internal state lives in cells. The instance is
/// deliberately not `Send`/`Sync` — scheduling is cooperative on the host's
/// thread.
pub struct Executor {
    slots: Vec<Slot>,
    index: HashMap<NodeToken, usize>,
    scopes: Vec<ScopeRecord>,
    phase: Cell<Phase>,
    started: Cell<bool>,
    live: RefCell<Rc<Cell<bool>>>,
    host: RefCell<Option<Rc<dyn HostContext>>>,
}

impl Executor {
    pub(crate) fn from_parts(
        slots: Vec<Slot>,
        index: HashMap<NodeToken, usize>,
        scopes: Vec<ScopeRecord>,
    ) -> Self {
        Self {
            slots,
            index,
            scopes,
            phase: Cell::new(Phase::Uninitialized),
            started: Cell::new(false),
            live: RefCell::new(Rc::new(Cell::new(false))),
            host: RefCell::new(None),
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Check whether `start` has run
    pub fn has_started(&self) -> bool {
        self.started.get()
    }

    /// Number of compiled node instances (nested sub-graphs included)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of asset instantiations (1 for a graph without sub-graphs)
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Tokens of every compiled node instance, in slot order
    pub fn tokens(&self) -> impl Iterator<Item = NodeToken> + '_ {
        self.slots.iter().map(|s| s.token)
    }

    /// Check whether a token addresses a slot in this instance
    pub fn contains(&self, token: NodeToken) -> bool {
        self.index.contains_key(&token)
    }

    /// Run every node's one-time setup, in slot order.
    ///
    /// Nodes may capture host context here.
    pub fn initialize(&self, host: Rc<dyn HostContext>) -> Result<(), ExecutorError> {
        if self.phase.get() != Phase::Uninitialized {
            return Err(ExecutorError::Phase {
                op: "initialize",
                phase: self.phase.get(),
            });
        }
        *self.host.borrow_mut() = Some(host);
        self.phase.set(Phase::Initialized);
        tracing::debug!(slots = self.slots.len(), "initializing graph instance");
        for i in 0..self.slots.len() {
            self.slots[i].behavior.on_initialize(&self.context(i))?;
        }
        Ok(())
    }

    /// Notify nodes that the owning host became active.
    ///
    /// Arms a fresh [`Liveness`] handle. May alternate with [`disable`]
    /// any number of times.
    ///
    /// [`disable`]: Executor::disable
    pub fn enable(&self) -> Result<(), ExecutorError> {
        match self.phase.get() {
            Phase::Initialized | Phase::Disabled => {}
            phase => return Err(ExecutorError::Phase { op: "enable", phase }),
        }
        *self.live.borrow_mut() = Rc::new(Cell::new(true));
        self.phase.set(Phase::Enabled);
        for i in 0..self.slots.len() {
            if self.slots[i].caps.contains(Caps::ENABLE) {
                self.slots[i].behavior.on_enable(&self.context(i), true);
            }
        }
        Ok(())
    }

    /// Notify nodes that the owning host became inactive.
    ///
    /// Revokes the current [`Liveness`] handle, cancelling pending
    /// asynchronous continuations.
    pub fn disable(&self) -> Result<(), ExecutorError> {
        if self.phase.get() != Phase::Enabled {
            return Err(ExecutorError::Phase {
                op: "disable",
                phase: self.phase.get(),
            });
        }
        self.live.borrow().set(false);
        self.phase.set(Phase::Disabled);
        for i in 0..self.slots.len() {
            if self.slots[i].caps.contains(Caps::ENABLE) {
                self.slots[i].behavior.on_enable(&self.context(i), false);
            }
        }
        Ok(())
    }

    /// First-tick notification; runs exactly once, while enabled
    pub fn start(&self) -> Result<(), ExecutorError> {
        if self.phase.get() != Phase::Enabled {
            return Err(ExecutorError::Phase {
                op: "start",
                phase: self.phase.get(),
            });
        }
        if self.started.get() {
            return Err(ExecutorError::AlreadyStarted);
        }
        self.started.set(true);
        for i in 0..self.slots.len() {
            if self.slots[i].caps.contains(Caps::START) {
                self.slots[i].behavior.on_start(&self.context(i))?;
            }
        }
        Ok(())
    }

    /// Tear down every node in reverse slot order; terminal
    pub fn deinitialize(&self) -> Result<(), ExecutorError> {
        if !self.phase.get().is_running() {
            return Err(ExecutorError::Phase {
                op: "deinitialize",
                phase: self.phase.get(),
            });
        }
        self.live.borrow().set(false);
        for slot in self.slots.iter().rev() {
            slot.behavior.on_deinitialize();
        }
        *self.host.borrow_mut() = None;
        self.phase.set(Phase::DeInitialized);
        tracing::debug!("deinitialized graph instance");
        Ok(())
    }

    /// Propagate control flow out of an exit port.
    ///
    /// Invokes `on_enter_port` on each resolved target synchronously,
    /// depth-first, in the link order fixed at compile time. Re-entrant;
    /// control cycles are the node author's responsibility.
    pub fn call(&self, token: NodeToken, exit_port: PortIndex) -> Result<(), NodeError> {
        let Some(&slot) = self.index.get(&token) else {
            tracing::warn!(%token, "call on a token this instance does not contain");
            return Ok(());
        };
        self.call_slot(slot, exit_port)
    }

    /// Pull the value feeding an input port.
    ///
    /// Unlinked ports yield the port's inline default if it has one, else
    /// `default`. Linked ports evaluate the source lazily on every read; a
    /// source value incompatible with the reading port's declared type is
    /// discarded with a warning in favor of `default`. Source node errors
    /// propagate.
    pub fn read(
        &self,
        token: NodeToken,
        input_port: PortIndex,
        default: Value,
    ) -> Result<Value, NodeError> {
        let Some(&slot) = self.index.get(&token) else {
            tracing::warn!(%token, "read on a token this instance does not contain");
            return Ok(default);
        };
        self.read_slot(slot, input_port, default)
    }

    /// Pull every value feeding a multi-link input port, in link order.
    ///
    /// The aggregation policy belongs to the consuming node; this returns
    /// the raw values.
    pub fn read_all(&self, token: NodeToken, input_port: PortIndex) -> Result<Vec<Value>, NodeError> {
        let Some(&slot) = self.index.get(&token) else {
            tracing::warn!(%token, "read on a token this instance does not contain");
            return Ok(Vec::new());
        };
        self.read_all_slot(slot, input_port)
    }

    /// Current value of a top-level blackboard variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.scopes
            .first()
            .and_then(|s| s.blackboard.borrow().get(name).cloned())
    }

    /// Set a top-level blackboard variable; see [`Blackboard::set`].
    ///
    /// Hosts apply per-instance variable overrides here, typically between
    /// compilation and the first enable.
    pub fn set_variable(&self, name: &str, value: Value) -> bool {
        match self.scopes.first() {
            Some(scope) => scope.blackboard.borrow_mut().set(name, value),
            None => false,
        }
    }

    fn context(&self, slot: usize) -> NodeContext<'_> {
        NodeContext { exec: self, slot }
    }

    fn call_slot(&self, slot: usize, port: PortIndex) -> Result<(), NodeError> {
        if !self.phase.get().is_running() {
            tracing::warn!(phase = ?self.phase.get(), "call outside the running phases is a no-op");
            return Ok(());
        }
        let source = &self.slots[slot];
        match source.ports.get(port.index()) {
            Some(p) if p.direction == PortDirection::ControlExit => {}
            Some(_) => {
                self.port_misuse("call on a port that is not a control exit", source.token, port);
                return Ok(());
            }
            None => {
                self.port_misuse("call with port index out of range", source.token, port);
                return Ok(());
            }
        }
        for target in &source.control[port.index()] {
            let t = &self.slots[target.slot];
            t.behavior.on_enter_port(&self.context(target.slot), target.port)?;
        }
        Ok(())
    }

    fn read_slot(&self, slot: usize, port: PortIndex, default: Value) -> Result<Value, NodeError> {
        if !self.phase.get().is_running() {
            tracing::warn!(phase = ?self.phase.get(), "read outside the running phases yields the default");
            return Ok(default);
        }
        let reader = &self.slots[slot];
        match reader.ports.get(port.index()) {
            Some(p) if p.direction == PortDirection::DataInput => {}
            Some(_) => {
                self.port_misuse("read on a port that is not a data input", reader.token, port);
                return Ok(default);
            }
            None => {
                self.port_misuse("read with port index out of range", reader.token, port);
                return Ok(default);
            }
        }
        let inline = reader.ports[port.index()].default_value.clone();
        let declared = reader.ports[port.index()].data_type;
        match &reader.data[port.index()] {
            DataBinding::Unlinked => Ok(inline.unwrap_or(default)),
            DataBinding::Single(target) => match self.pull(*target, declared)? {
                Some(value) => Ok(value),
                None => Ok(default),
            },
            DataBinding::Many(targets) => {
                // first type-compatible source wins
                for target in targets {
                    if let Some(value) = self.pull(*target, declared)? {
                        return Ok(value);
                    }
                }
                Ok(default)
            }
        }
    }

    fn read_all_slot(&self, slot: usize, port: PortIndex) -> Result<Vec<Value>, NodeError> {
        if !self.phase.get().is_running() {
            return Ok(Vec::new());
        }
        let reader = &self.slots[slot];
        if !matches!(
            reader.ports.get(port.index()).map(|p| p.direction),
            Some(PortDirection::DataInput)
        ) {
            self.port_misuse("read_all on a port that is not a data input", reader.token, port);
            return Ok(Vec::new());
        }
        let targets: &[Target] = match &reader.data[port.index()] {
            DataBinding::Unlinked => &[],
            DataBinding::Single(t) => std::slice::from_ref(t),
            DataBinding::Many(ts) => ts,
        };
        let mut values = Vec::with_capacity(targets.len());
        for target in targets {
            let source = &self.slots[target.slot];
            values.push(source.behavior.output_value(&self.context(target.slot), target.port)?);
        }
        Ok(values)
    }

    /// Evaluate one source; `None` means the value's type did not fit the
    /// reading port's declaration.
    fn pull(&self, target: Target, declared: Option<ValueType>) -> Result<Option<Value>, NodeError> {
        let source = &self.slots[target.slot];
        let value = source
            .behavior
            .output_value(&self.context(target.slot), target.port)?;
        let Some(expected) = declared else {
            return Ok(Some(value));
        };
        if expected.accepts(value.value_type()) {
            Ok(Some(coerce(value, expected)))
        } else {
            tracing::warn!(
                token = %source.token,
                port = %target.port,
                expected = ?expected,
                got = ?value.value_type(),
                "output type mismatch, falling back to default"
            );
            Ok(None)
        }
    }

    /// Fatal in development builds, logged no-op in release.
    fn port_misuse(&self, what: &str, token: NodeToken, port: PortIndex) {
        tracing::error!(%token, %port, "{what}");
        if cfg!(debug_assertions) {
            panic!("{what}: port {port} on {token}");
        }
    }
}

/// Coerce a value to the requested numeric type; everything else passes
/// through unchanged.
fn coerce(value: Value, expected: ValueType) -> Value {
    match (expected, &value) {
        (ValueType::Float, Value::Int(i)) => Value::Float(*i as f32),
        (ValueType::Int, Value::Float(f)) => Value::Int(*f as i32),
        _ => value,
    }
}

/// Execution context handed to every node callback.
///
/// Wraps the executor with the calling node's identity so behaviors can
/// address their own ports without holding a token around.
pub struct NodeContext<'a> {
    exec: &'a Executor,
    slot: usize,
}

impl NodeContext<'_> {
    /// Runtime identity of the node this context belongs to
    pub fn token(&self) -> NodeToken {
        self.exec.slots[self.slot].token
    }

    /// The node's compiled port array
    pub fn ports(&self) -> &[Port] {
        &self.exec.slots[self.slot].ports
    }

    /// Propagate control flow out of one of this node's exit ports
    pub fn call(&self, exit_port: PortIndex) -> Result<(), NodeError> {
        self.exec.call_slot(self.slot, exit_port)
    }

    /// Pull the value feeding one of this node's input ports
    pub fn read(&self, input_port: PortIndex, default: Value) -> Result<Value, NodeError> {
        self.exec.read_slot(self.slot, input_port, default)
    }

    /// Pull every value feeding a multi-link input port
    pub fn read_all(&self, input_port: PortIndex) -> Result<Vec<Value>, NodeError> {
        self.exec.read_all_slot(self.slot, input_port)
    }

    /// Get a variable from the owning asset instance's blackboard
    pub fn get_var(&self, name: &str) -> Option<Value> {
        let scope = self.exec.slots[self.slot].scope;
        self.exec.scopes[scope].blackboard.borrow().get(name).cloned()
    }

    /// Set a variable on the owning asset instance's blackboard
    pub fn set_var(&self, name: &str, value: Value) -> bool {
        let scope = self.exec.slots[self.slot].scope;
        self.exec.scopes[scope].blackboard.borrow_mut().set(name, value)
    }

    /// The host context captured at initialization
    pub fn host(&self) -> Option<Rc<dyn HostContext>> {
        self.exec.host.borrow().clone()
    }

    /// Cancellation handle for asynchronous continuations
    pub fn liveness(&self) -> Liveness {
        Liveness {
            flag: Rc::clone(&self.exec.live.borrow()),
        }
    }
}
