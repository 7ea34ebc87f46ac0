// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph compiler: one-shot transform of authored assets into the runtime
//! dispatch structure.
//!
//! Compilation amortizes all link resolution so the executor never walks a
//! link table at call time:
//!
//! 1. Expand the root asset recursively, assigning every reachable node
//!    instance a dense slot and every sub-graph instance its own scope
//!    (with a private blackboard copy).
//! 2. Resolve every control-exit port into an ordered target list and every
//!    data-input port into its source binding.
//! 3. Forward external ports through sub-graph boundaries in both
//!    directions, so neither side of a boundary ever sees the nesting.
//!
//! Anything that fails to resolve — dangling links, unknown behavior types,
//! missing sub-graph assets — is dropped with a warning; compilation always
//! yields a runnable (possibly degraded) executor. Only a missing root
//! asset or runaway nesting aborts.

use crate::behavior::Caps;
use crate::executor::{DataBinding, Executor, ScopeRecord, Slot, Target};
use crate::registry::BehaviorRegistry;
use crate::token::{NodeToken, ScopeId};
use emberplay_graph::{
    AssetId, AssetLibrary, Blackboard, GraphAsset, NodeId, Port, PortDirection, PortIndex,
};
use std::cell::RefCell;
use std::collections::HashMap;

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Maximum sub-graph nesting depth.
    ///
    /// Edit-time validation already rejects reference cycles; this caps the
    /// damage if assets were mutated behind the library's back.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

/// Error aborting compilation outright
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The root asset is not loaded in the library
    #[error("root asset not found: {0}")]
    AssetNotFound(AssetId),

    /// Sub-graph nesting exceeded [`CompileOptions::max_depth`]
    #[error("sub-graph nesting exceeds {0} levels")]
    DepthExceeded(usize),
}

/// Compile a graph asset into an executor for one runtime instance.
///
/// Compiling the same library snapshot twice yields executors with
/// identical dispatch behavior; node and link tables iterate in insertion
/// order.
///
/// There is no incremental patching: after an authoring-time edit, compile
/// a fresh executor and de-initialize the old one (while it has not
/// started). Tokens never carry over between compilations.
pub fn compile(
    library: &AssetLibrary,
    root: AssetId,
    registry: &BehaviorRegistry,
    options: &CompileOptions,
) -> Result<Executor, CompileError> {
    let Some(root_asset) = library.get(root) else {
        return Err(CompileError::AssetNotFound(root));
    };
    tracing::debug!(graph = %root_asset.name, "compiling graph asset");

    let mut compiler = Compiler {
        library,
        registry,
        max_depth: options.max_depth,
        slots: Vec::new(),
        slot_index: HashMap::new(),
        scopes: Vec::new(),
        scope_index: HashMap::new(),
    };
    compiler.expand(ScopeId::ROOT, root_asset, None, None, 0)?;
    compiler.resolve();
    compiler.notify_links();

    tracing::info!(
        graph = %root_asset.name,
        slots = compiler.slots.len(),
        scopes = compiler.scopes.len(),
        "graph compiled"
    );

    let scopes = compiler
        .scopes
        .iter()
        .map(|scope| ScopeRecord {
            id: scope.id,
            blackboard: RefCell::new(Blackboard::from_spec(&scope.asset.blackboard)),
        })
        .collect();
    Ok(Executor::from_parts(compiler.slots, compiler.slot_index, scopes))
}

/// One asset instantiation under construction
struct ScopeBuild<'a> {
    id: ScopeId,
    asset: &'a GraphAsset,
    parent: Option<usize>,
    /// Sub-graph node in the parent asset that owns this scope
    owner: Option<NodeId>,
    /// Internal endpoint behind each mirrored external port
    externals: Vec<(NodeId, PortIndex)>,
}

struct Compiler<'a> {
    library: &'a AssetLibrary,
    registry: &'a BehaviorRegistry,
    max_depth: usize,
    slots: Vec<Slot>,
    slot_index: HashMap<NodeToken, usize>,
    scopes: Vec<ScopeBuild<'a>>,
    scope_index: HashMap<ScopeId, usize>,
}

impl<'a> Compiler<'a> {
    /// Walk one asset, instantiating behaviors and recursing into
    /// sub-graph references depth-first.
    fn expand(
        &mut self,
        scope_id: ScopeId,
        asset: &'a GraphAsset,
        parent: Option<usize>,
        owner: Option<NodeId>,
        depth: usize,
    ) -> Result<(), CompileError> {
        if depth > self.max_depth {
            return Err(CompileError::DepthExceeded(self.max_depth));
        }
        let library = self.library;
        let scope_idx = self.scopes.len();
        self.scopes.push(ScopeBuild {
            id: scope_id,
            asset,
            parent,
            owner,
            externals: asset.external_ports().targets,
        });
        self.scope_index.insert(scope_id, scope_idx);

        for node in asset.nodes() {
            if let Some(referenced) = node.subgraph {
                match library.get(referenced) {
                    Some(sub_asset) => self.expand(
                        scope_id.child(node.id),
                        sub_asset,
                        Some(scope_idx),
                        Some(node.id),
                        depth + 1,
                    )?,
                    None => tracing::warn!(
                        node = %node.id,
                        asset = %referenced,
                        "sub-graph asset missing, node dropped"
                    ),
                }
                continue;
            }
            match self.registry.instantiate(&node.behavior, &node.config) {
                Ok(behavior) => {
                    let token = NodeToken::new(scope_id, node.id);
                    let caps = behavior.capabilities();
                    self.slot_index.insert(token, self.slots.len());
                    self.slots.push(Slot {
                        token,
                        behavior,
                        ports: node.ports.clone(),
                        caps,
                        scope: scope_idx,
                        control: Vec::new(),
                        data: Vec::new(),
                    });
                }
                Err(err) => tracing::warn!(
                    node = %node.id,
                    behavior = %node.behavior,
                    %err,
                    "node dropped from compilation"
                ),
            }
        }
        Ok(())
    }

    /// Fill every slot's control targets and data bindings.
    fn resolve(&mut self) {
        for i in 0..self.slots.len() {
            let scope = self.slots[i].scope;
            let node = self.slots[i].token.node;
            let port_count = self.slots[i].ports.len();
            let mut control = vec![Vec::new(); port_count];
            let mut data = vec![DataBinding::Unlinked; port_count];
            for p in 0..port_count {
                let port = self.slots[i].ports[p].clone();
                let index = PortIndex(p as u16);
                match port.direction {
                    PortDirection::ControlExit => {
                        control[p] = self.exit_targets(scope, node, index, port.is_external);
                    }
                    PortDirection::DataInput => {
                        data[p] = self.input_binding(scope, node, index, &port);
                    }
                    _ => {}
                }
            }
            self.slots[i].control = control;
            self.slots[i].data = data;
        }
    }

    /// Resolved call targets of one control-exit port, in link order.
    ///
    /// External exits additionally forward into the parent graph through
    /// the owning sub-graph node's mirrored port.
    fn exit_targets(
        &self,
        scope: usize,
        node: NodeId,
        port: PortIndex,
        is_external: bool,
    ) -> Vec<Target> {
        let mut targets = Vec::new();
        self.collect_control(scope, node, port, &mut targets);
        if is_external {
            if let Some((parent, owner, mirror)) = self.boundary_of(scope, node, port) {
                self.collect_control(parent, owner, mirror, &mut targets);
            }
        }
        targets
    }

    fn collect_control(&self, scope: usize, node: NodeId, port: PortIndex, out: &mut Vec<Target>) {
        let asset = self.scopes[scope].asset;
        for link in asset.outgoing(node, port) {
            match self.resolve_endpoint(scope, link.to_node, link.to_port, PortDirection::ControlEnter)
            {
                Some(target) => out.push(target),
                None => tracing::warn!(
                    graph = %asset.name,
                    from = %node,
                    to = %link.to_node,
                    "dropped unresolvable control link"
                ),
            }
        }
    }

    /// Resolved source binding of one data-input port.
    ///
    /// External inputs with no internal source fall through to the parent
    /// graph's links into the owning sub-graph node's mirrored port.
    fn input_binding(&self, scope: usize, node: NodeId, port: PortIndex, desc: &Port) -> DataBinding {
        let asset = self.scopes[scope].asset;
        let mut sources = Vec::new();
        for link in asset.incoming(node, port) {
            match self.resolve_endpoint(scope, link.from_node, link.from_port, PortDirection::DataOutput)
            {
                Some(target) => sources.push(target),
                None => tracing::warn!(
                    graph = %asset.name,
                    from = %link.from_node,
                    to = %node,
                    "dropped unresolvable data link"
                ),
            }
        }
        if sources.is_empty() && desc.is_external {
            if let Some((parent, owner, mirror)) = self.boundary_of(scope, node, port) {
                let parent_asset = self.scopes[parent].asset;
                for link in parent_asset.incoming(owner, mirror) {
                    match self.resolve_endpoint(
                        parent,
                        link.from_node,
                        link.from_port,
                        PortDirection::DataOutput,
                    ) {
                        Some(target) => sources.push(target),
                        None => tracing::warn!(
                            graph = %parent_asset.name,
                            from = %link.from_node,
                            "dropped unresolvable data link into sub-graph"
                        ),
                    }
                }
            }
        }

        if sources.is_empty() {
            DataBinding::Unlinked
        } else if desc.is_multiple {
            DataBinding::Many(sources)
        } else {
            if sources.len() > 1 {
                tracing::warn!(node = %node, %port, "extra links on single input ignored");
            }
            DataBinding::Single(sources[0])
        }
    }

    /// Find the parent-side mirror of an external port: the owning scope,
    /// the sub-graph node hosting this asset, and the mirrored port index.
    fn boundary_of(&self, scope: usize, node: NodeId, port: PortIndex) -> Option<(usize, NodeId, PortIndex)> {
        let record = &self.scopes[scope];
        let parent = record.parent?;
        let owner = record.owner?;
        let mirror = record
            .externals
            .iter()
            .position(|&(n, p)| n == node && p == port)?;
        Some((parent, owner, PortIndex(mirror as u16)))
    }

    /// Chase an endpoint down through sub-graph boundaries until it lands
    /// on a concrete slot whose port has the wanted direction.
    fn resolve_endpoint(
        &self,
        scope: usize,
        node: NodeId,
        port: PortIndex,
        want: PortDirection,
    ) -> Option<Target> {
        let mut scope = scope;
        let mut node = node;
        let mut port = port;
        loop {
            let asset = self.scopes[scope].asset;
            let desc = asset.node(node)?;
            if desc.subgraph.is_some() {
                let child_id = self.scopes[scope].id.child(node);
                let child = *self.scope_index.get(&child_id)?;
                let &(inner_node, inner_port) = self.scopes[child].externals.get(port.index())?;
                scope = child;
                node = inner_node;
                port = inner_port;
                continue;
            }
            let token = NodeToken::new(self.scopes[scope].id, node);
            let slot = *self.slot_index.get(&token)?;
            let fits = self.slots[slot]
                .ports
                .get(port.index())
                .is_some_and(|p| p.direction == want);
            return fits.then_some(Target { slot, port });
        }
    }

    /// Tell wiring-sensitive behaviors what their ports resolved to.
    fn notify_links(&self) {
        for slot in &self.slots {
            if !slot.caps.contains(Caps::LINKS) {
                continue;
            }
            for p in 0..slot.ports.len() {
                let count = match &slot.data[p] {
                    DataBinding::Single(_) => 1,
                    DataBinding::Many(targets) => targets.len(),
                    DataBinding::Unlinked => slot.control[p].len(),
                };
                slot.behavior.on_links_changed(PortIndex(p as u16), count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{NodeBehavior, NodeError};
    use crate::executor::NodeContext;
    use crate::host::EmptyHost;
    use emberplay_graph::{NodeDescriptor, Value, ValueType};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    // ------------------------------------------------------------------
    // Test node set
    // ------------------------------------------------------------------

    /// Entry node: fires its exit on the instance's first tick
    struct StartNode;

    impl NodeBehavior for StartNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::control_exit("Exec")]
        }

        fn capabilities(&self) -> Caps {
            Caps::START
        }

        fn on_start(&self, ctx: &NodeContext<'_>) -> Result<(), NodeError> {
            ctx.call(PortIndex(0))
        }
    }

    /// Adds its two integer inputs; defaults come from configuration
    struct AddNode {
        a: i32,
        b: i32,
    }

    impl NodeBehavior for AddNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::input("A", ValueType::Int).with_default(Value::Int(self.a)),
                Port::input("B", ValueType::Int).with_default(Value::Int(self.b)),
                Port::output("Sum", ValueType::Int),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::OUTPUT
        }

        fn output_value(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            let a = ctx.read(PortIndex(0), Value::Int(0))?.as_int().unwrap_or(0);
            let b = ctx.read(PortIndex(1), Value::Int(0))?.as_int().unwrap_or(0);
            Ok(Value::Int(a + b))
        }
    }

    /// Records whatever its text input evaluates to when entered
    struct LogNode {
        sink: Rc<RefCell<Vec<Value>>>,
        fallback: String,
    }

    impl NodeBehavior for LogNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::control_enter("Exec"),
                Port::input("Text", ValueType::Any)
                    .with_default(Value::String(self.fallback.clone())),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::ENTER
        }

        fn on_enter_port(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
            let value = ctx.read(PortIndex(1), Value::String(String::new()))?;
            self.sink.borrow_mut().push(value);
            Ok(())
        }
    }

    /// Blackboard tally with external ports, for sub-graph tests
    struct CounterNode;

    impl NodeBehavior for CounterNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::control_enter("Bump").external(),
                Port::output("Count", ValueType::Int).external(),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::ENTER | Caps::OUTPUT
        }

        fn on_enter_port(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
            let n = ctx.get_var("count").and_then(|v| v.as_int()).unwrap_or(0);
            ctx.set_var("count", Value::Int(n + 1));
            Ok(())
        }

        fn output_value(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            Ok(ctx.get_var("count").unwrap_or(Value::Int(0)))
        }
    }

    /// Forwards its external enter to its exit
    struct RelayNode;

    impl NodeBehavior for RelayNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::control_enter("In").external(),
                Port::control_exit("Out"),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::ENTER
        }

        fn on_enter_port(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
            ctx.call(PortIndex(1))
        }
    }

    /// Passes its input through to an external output
    struct EchoNode;

    impl NodeBehavior for EchoNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::input("In", ValueType::Int),
                Port::output("Out", ValueType::Int).external(),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::OUTPUT
        }

        fn output_value(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            ctx.read(PortIndex(0), Value::Int(0))
        }
    }

    /// Single integer input, read from the outside by tests
    struct ProbeNode;

    impl NodeBehavior for ProbeNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::input("In", ValueType::Int)]
        }
    }

    /// Multi-link integer input
    struct GatherNode;

    impl NodeBehavior for GatherNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::input("Items", ValueType::Int).multiple()]
        }
    }

    /// Constant integer output
    struct ConstNode {
        value: i32,
    }

    impl NodeBehavior for ConstNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::output("Value", ValueType::Int)]
        }

        fn capabilities(&self) -> Caps {
            Caps::OUTPUT
        }

        fn output_value(&self, _ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            Ok(Value::Int(self.value))
        }
    }

    /// Declares an `Any` output but produces a string at runtime
    struct ChaosNode;

    impl NodeBehavior for ChaosNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::output("Out", ValueType::Any)]
        }

        fn capabilities(&self) -> Caps {
            Caps::OUTPUT
        }

        fn output_value(&self, _ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            Ok(Value::String("not a number".into()))
        }
    }

    /// Fails when entered
    struct FailNode;

    impl NodeBehavior for FailNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![Port::control_enter("Exec")]
        }

        fn capabilities(&self) -> Caps {
            Caps::ENTER
        }

        fn on_enter_port(&self, _ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
            Err(NodeError::Custom("boom".into()))
        }
    }

    /// Re-fires its own exit until its budget runs out; the graph links the
    /// exit back into the enter port, so this exercises same-node re-entry
    struct CountdownNode {
        remaining: Cell<i32>,
    }

    impl NodeBehavior for CountdownNode {
        fn create_ports(&self) -> Vec<Port> {
            vec![
                Port::control_enter("Tick"),
                Port::control_exit("Next"),
                Port::output("Left", ValueType::Int),
            ]
        }

        fn capabilities(&self) -> Caps {
            Caps::ENTER | Caps::OUTPUT
        }

        fn on_enter_port(&self, ctx: &NodeContext<'_>, _port: PortIndex) -> Result<(), NodeError> {
            if self.remaining.get() > 0 {
                self.remaining.set(self.remaining.get() - 1);
                ctx.call(PortIndex(1))?;
            }
            Ok(())
        }

        fn output_value(&self, _ctx: &NodeContext<'_>, _port: PortIndex) -> Result<Value, NodeError> {
            Ok(Value::Int(self.remaining.get()))
        }
    }

    fn test_registry(sink: &Rc<RefCell<Vec<Value>>>) -> BehaviorRegistry {
        let mut registry = BehaviorRegistry::new();
        registry.register("start", |_| Ok(Box::new(StartNode)));
        registry.register("add", |config| {
            let a = config.get("a").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            let b = config.get("b").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            Ok(Box::new(AddNode { a, b }))
        });
        let log_sink = Rc::clone(sink);
        registry.register("log", move |config| {
            let fallback = config
                .get("fallback")
                .and_then(|v| v.as_str())
                .unwrap_or("hello")
                .to_string();
            Ok(Box::new(LogNode {
                sink: Rc::clone(&log_sink),
                fallback,
            }))
        });
        registry.register("counter", |_| Ok(Box::new(CounterNode)));
        registry.register("relay", |_| Ok(Box::new(RelayNode)));
        registry.register("echo", |_| Ok(Box::new(EchoNode)));
        registry.register("probe", |_| Ok(Box::new(ProbeNode)));
        registry.register("gather", |_| Ok(Box::new(GatherNode)));
        registry.register("const", |config| {
            let value = config.get("value").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            Ok(Box::new(ConstNode { value }))
        });
        registry.register("chaos", |_| Ok(Box::new(ChaosNode)));
        registry.register("fail", |_| Ok(Box::new(FailNode)));
        registry.register("countdown", |config| {
            let count = config.get("count").and_then(|v| v.as_i64()).unwrap_or(0) as i32;
            Ok(Box::new(CountdownNode {
                remaining: Cell::new(count),
            }))
        });
        registry
    }

    fn make_node(registry: &BehaviorRegistry, behavior: &str, config: serde_json::Value) -> NodeDescriptor {
        let ports = registry.create_ports(behavior, &config).unwrap();
        NodeDescriptor::new(behavior).with_ports(ports).with_config(config)
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn running(library: &AssetLibrary, root: AssetId, registry: &BehaviorRegistry) -> Executor {
        let exec = compile(library, root, registry, &CompileOptions::default()).unwrap();
        exec.initialize(Rc::new(EmptyHost)).unwrap();
        exec.enable().unwrap();
        exec
    }

    // ------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------

    #[test]
    fn test_start_add_log_scenario() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let add = graph.add_node(make_node(&registry, "add", serde_json::json!({"a": 2, "b": 3})));
        let log = graph.add_node(make_node(&registry, "log", serde_json::Value::Null));
        graph.add_link(start, PortIndex(0), log, PortIndex(0)).unwrap();
        graph.add_link(add, PortIndex(2), log, PortIndex(1)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);
        exec.start().unwrap();

        assert_eq!(sink.borrow().as_slice(), &[Value::Int(5)]);
    }

    #[test]
    fn test_unlinked_input_reads_inline_default() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let log = graph.add_node(make_node(&registry, "log", serde_json::Value::Null));
        graph.add_link(start, PortIndex(0), log, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);
        exec.start().unwrap();

        assert_eq!(sink.borrow().as_slice(), &[Value::String("hello".into())]);
    }

    #[test]
    fn test_control_fan_out_in_link_order() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let first = graph.add_node(make_node(
            &registry,
            "log",
            serde_json::json!({"fallback": "first"}),
        ));
        let second = graph.add_node(make_node(
            &registry,
            "log",
            serde_json::json!({"fallback": "second"}),
        ));
        graph.add_link(start, PortIndex(0), first, PortIndex(0)).unwrap();
        graph.add_link(start, PortIndex(0), second, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);
        exec.start().unwrap();

        // each target entered exactly once, in link order, synchronously
        assert_eq!(
            sink.borrow().as_slice(),
            &[Value::String("first".into()), Value::String("second".into())]
        );
    }

    #[test]
    fn test_compiling_twice_gives_identical_behavior() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let add = graph.add_node(make_node(&registry, "add", serde_json::json!({"a": 4, "b": 1})));
        let log = graph.add_node(make_node(&registry, "log", serde_json::Value::Null));
        graph.add_link(start, PortIndex(0), log, PortIndex(0)).unwrap();
        graph.add_link(add, PortIndex(2), log, PortIndex(1)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);

        let first = running(&library, root, &registry);
        let second = running(&library, root, &registry);
        assert_eq!(
            first.tokens().collect::<Vec<_>>(),
            second.tokens().collect::<Vec<_>>()
        );

        first.start().unwrap();
        let after_first = sink.borrow().clone();
        sink.borrow_mut().clear();
        second.start().unwrap();
        assert_eq!(sink.borrow().as_slice(), after_first.as_slice());
        assert_eq!(sink.borrow().as_slice(), &[Value::Int(5)]);
    }

    #[test]
    fn test_removing_a_node_removes_its_links_everywhere() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let add = graph.add_node(make_node(&registry, "add", serde_json::json!({"a": 2, "b": 3})));
        let log = graph.add_node(make_node(&registry, "log", serde_json::Value::Null));
        graph.add_link(start, PortIndex(0), log, PortIndex(0)).unwrap();
        graph.add_link(add, PortIndex(2), log, PortIndex(1)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);

        let asset = library.get_mut(root).unwrap();
        asset.remove_node(add);
        assert!(asset.validate().is_empty());
        assert_eq!(asset.link_count(), 1);

        let exec = running(&library, root, &registry);
        assert!(!exec.tokens().any(|t| t.node == add));

        // the log input fell back to its default
        exec.start().unwrap();
        assert_eq!(sink.borrow().as_slice(), &[Value::String("hello".into())]);
    }

    // ------------------------------------------------------------------
    // Sub-graph instancing
    // ------------------------------------------------------------------

    #[test]
    fn test_subgraph_instances_are_independent() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);
        let mut library = AssetLibrary::new();

        let mut inner = GraphAsset::new("inner");
        inner.blackboard.declare("count", Value::Int(0));
        inner.add_node(make_node(&registry, "counter", serde_json::Value::Null));
        let inner_id = library.insert(inner);

        let mut outer = GraphAsset::new("outer");
        let fire_a = outer.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let fire_b = outer.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let host_a = outer.add_node(NodeDescriptor::new("subgraph"));
        let host_b = outer.add_node(NodeDescriptor::new("subgraph"));
        let probe_a = outer.add_node(make_node(&registry, "probe", serde_json::Value::Null));
        let probe_b = outer.add_node(make_node(&registry, "probe", serde_json::Value::Null));
        outer.set_subgraph_reference(host_a, inner_id, &library).unwrap();
        outer.set_subgraph_reference(host_b, inner_id, &library).unwrap();
        outer.add_link(fire_a, PortIndex(0), host_a, PortIndex(0)).unwrap();
        outer.add_link(fire_b, PortIndex(0), host_b, PortIndex(0)).unwrap();
        outer.add_link(host_a, PortIndex(1), probe_a, PortIndex(0)).unwrap();
        outer.add_link(host_b, PortIndex(1), probe_b, PortIndex(0)).unwrap();
        let root = library.insert(outer);

        let exec = running(&library, root, &registry);
        assert_eq!(exec.scope_count(), 3);

        exec.call(NodeToken::root(fire_a), PortIndex(0)).unwrap();
        exec.call(NodeToken::root(fire_a), PortIndex(0)).unwrap();
        exec.call(NodeToken::root(fire_b), PortIndex(0)).unwrap();

        let a = exec.read(NodeToken::root(probe_a), PortIndex(0), Value::Int(-1)).unwrap();
        let b = exec.read(NodeToken::root(probe_b), PortIndex(0), Value::Int(-1)).unwrap();
        assert_eq!(a, Value::Int(2));
        assert_eq!(b, Value::Int(1));

        // instance variables never leak into the root blackboard
        assert_eq!(exec.variable("count"), None);
    }

    #[test]
    fn test_forwarding_through_two_nesting_levels() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);
        let mut library = AssetLibrary::new();

        let mut inner = GraphAsset::new("inner");
        inner.blackboard.declare("count", Value::Int(0));
        inner.add_node(make_node(&registry, "counter", serde_json::Value::Null));
        let inner_id = library.insert(inner);

        let mut middle = GraphAsset::new("middle");
        let relay = middle.add_node(make_node(&registry, "relay", serde_json::Value::Null));
        let inner_host = middle.add_node(NodeDescriptor::new("subgraph"));
        let echo = middle.add_node(make_node(&registry, "echo", serde_json::Value::Null));
        middle.set_subgraph_reference(inner_host, inner_id, &library).unwrap();
        middle.add_link(relay, PortIndex(1), inner_host, PortIndex(0)).unwrap();
        middle.add_link(inner_host, PortIndex(1), echo, PortIndex(0)).unwrap();
        let middle_id = library.insert(middle);

        let mut outer = GraphAsset::new("outer");
        let fire = outer.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let middle_host = outer.add_node(NodeDescriptor::new("subgraph"));
        let probe = outer.add_node(make_node(&registry, "probe", serde_json::Value::Null));
        outer.set_subgraph_reference(middle_host, middle_id, &library).unwrap();
        outer.add_link(fire, PortIndex(0), middle_host, PortIndex(0)).unwrap();
        outer.add_link(middle_host, PortIndex(1), probe, PortIndex(0)).unwrap();
        let root = library.insert(outer);

        let exec = running(&library, root, &registry);
        for _ in 0..3 {
            exec.call(NodeToken::root(fire), PortIndex(0)).unwrap();
        }
        let value = exec.read(NodeToken::root(probe), PortIndex(0), Value::Int(-1)).unwrap();
        assert_eq!(value, Value::Int(3));
    }

    #[test]
    fn test_missing_subgraph_asset_degrades() {
        init_tracing();
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let fire = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        // stale reference: the asset was unloaded after authoring
        let mut stale = NodeDescriptor::new("subgraph")
            .with_ports(vec![Port::control_enter("Run")]);
        stale.subgraph = Some(AssetId::new());
        let host = graph.add_node(stale);
        graph.add_link(fire, PortIndex(0), host, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        // still runnable: the dangling call resolved to nothing
        assert_eq!(exec.slot_count(), 1);
        exec.call(NodeToken::root(fire), PortIndex(0)).unwrap();
    }

    // ------------------------------------------------------------------
    // Degradation and failure semantics
    // ------------------------------------------------------------------

    #[test]
    fn test_unknown_behavior_degrades() {
        init_tracing();
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let start = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let mystery = graph.add_node(
            NodeDescriptor::new("mystery").with_ports(vec![Port::control_enter("Exec")]),
        );
        graph.add_link(start, PortIndex(0), mystery, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        assert_eq!(exec.slot_count(), 1);
        exec.start().unwrap();
    }

    #[test]
    fn test_node_errors_propagate_to_the_caller() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let fire = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let fail = graph.add_node(make_node(&registry, "fail", serde_json::Value::Null));
        graph.add_link(fire, PortIndex(0), fail, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        let err = exec.call(NodeToken::root(fire), PortIndex(0)).unwrap_err();
        assert!(matches!(err, NodeError::Custom(_)));
    }

    #[test]
    fn test_type_mismatch_recovers_with_default() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let chaos = graph.add_node(make_node(&registry, "chaos", serde_json::Value::Null));
        let probe = graph.add_node(make_node(&registry, "probe", serde_json::Value::Null));
        graph.add_link(chaos, PortIndex(0), probe, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        let value = exec.read(NodeToken::root(probe), PortIndex(0), Value::Int(-7)).unwrap();
        assert_eq!(value, Value::Int(-7));
    }

    #[test]
    fn test_multi_link_input_aggregation() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let four = graph.add_node(make_node(&registry, "const", serde_json::json!({"value": 4})));
        let nine = graph.add_node(make_node(&registry, "const", serde_json::json!({"value": 9})));
        let gather = graph.add_node(make_node(&registry, "gather", serde_json::Value::Null));
        graph.add_link(four, PortIndex(0), gather, PortIndex(0)).unwrap();
        graph.add_link(nine, PortIndex(0), gather, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        let token = NodeToken::root(gather);
        assert_eq!(
            exec.read_all(token, PortIndex(0)).unwrap(),
            vec![Value::Int(4), Value::Int(9)]
        );
        // single-value read applies the first-compatible policy
        assert_eq!(exec.read(token, PortIndex(0), Value::Int(0)).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_control_loop_back_into_the_same_node() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let fire = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let countdown = graph.add_node(make_node(
            &registry,
            "countdown",
            serde_json::json!({"count": 3}),
        ));
        let probe = graph.add_node(make_node(&registry, "probe", serde_json::Value::Null));
        graph.add_link(fire, PortIndex(0), countdown, PortIndex(0)).unwrap();
        // loop the exit back into the node's own enter port
        graph.add_link(countdown, PortIndex(1), countdown, PortIndex(0)).unwrap();
        graph.add_link(countdown, PortIndex(2), probe, PortIndex(0)).unwrap();

        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        exec.call(NodeToken::root(fire), PortIndex(0)).unwrap();
        let left = exec.read(NodeToken::root(probe), PortIndex(0), Value::Int(-1)).unwrap();
        assert_eq!(left, Value::Int(0));
    }

    #[test]
    fn test_missing_root_asset_is_an_error() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);
        let library = AssetLibrary::new();
        assert!(matches!(
            compile(&library, AssetId::new(), &registry, &CompileOptions::default()),
            Err(CompileError::AssetNotFound(_))
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_port_index_out_of_range_is_fatal_in_dev() {
        let sink = Rc::new(RefCell::new(Vec::new()));
        let registry = test_registry(&sink);

        let mut graph = GraphAsset::new("main");
        let fire = graph.add_node(make_node(&registry, "start", serde_json::Value::Null));
        let mut library = AssetLibrary::new();
        let root = library.insert(graph);
        let exec = running(&library, root, &registry);

        let _ = exec.call(NodeToken::root(fire), PortIndex(9));
    }
}
