//! Authoring-time graph of primitives and fragments.
//!
//! All nodes and ports live in one [`FragmentGraph`] arena and are addressed
//! by [`NodeId`] / [`PortId`] handles. Port connections are stored as handles,
//! so the graph has no reference cycles and is dropped as a unit.
//!
//! ## Scopes
//!
//! A consumer in-port on node `N` lives in the scope of `N`'s parent
//! fragment. A source is visible in exactly one scope:
//!
//! | Source | Visible in |
//! |--------|------------|
//! | Out-port of node `N` (leaf or fragment boundary) | parent of `N` |
//! | Boundary in-port of fragment `F` | inside `F` |
//!
//! A link is well-scoped when the source is visible in the consumer's scope.
//! `correct_links` (see `links.rs`) repairs links that are not.

use std::collections::HashMap;

use rpi_common::value::{Value, ValueError, ValueType};

use crate::error::FragmentError;

/// Handle of a node (primitive or fragment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Handle of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub(crate) usize);

/// Port direction as seen from outside its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Receives a value.
    In,
    /// Provides a value.
    Out,
}

/// A typed, named slot on a node.
#[derive(Debug, Clone)]
pub struct Port {
    pub(crate) name: String,
    pub(crate) owner: NodeId,
    pub(crate) direction: PortDirection,
    pub(crate) ty: ValueType,
    /// In-port: connected source. Fragment out-port: aliased internal source.
    pub(crate) link: Option<PortId>,
    /// History span [s] sampled by the runtime for this in-port.
    pub(crate) debug: Option<f64>,
}

impl Port {
    /// Port name, unique within its owner.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning node.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// Direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Declared value type.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Connected (in-port) or aliased (boundary out-port) source.
    pub fn link(&self) -> Option<PortId> {
        self.link
    }

    /// Debug history span, if the connection is debug-tagged.
    pub fn debug(&self) -> Option<f64> {
        self.debug
    }
}

/// Closed node model: a leaf primitive or a composite fragment.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Atomic primitive, instantiated by type name at link time.
    Leaf {
        /// Registered type name.
        type_name: String,
        /// Placeholder for a type unknown at deserialization time.
        opaque: bool,
    },
    /// Composite with boundary ports.
    Fragment {
        /// Ordered children.
        children: Vec<NodeId>,
        /// Internal source → boundary out-port exposing it.
        provided: HashMap<PortId, PortId>,
        /// External source → boundary in-port forwarding it.
        imported: HashMap<PortId, PortId>,
    },
}

/// A primitive or fragment.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) in_ports: Vec<PortId>,
    pub(crate) out_ports: Vec<PortId>,
    pub(crate) parameters: Vec<(String, Value)>,
}

impl Node {
    /// Name, unique within the parent fragment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enclosing fragment, `None` for top-level nodes.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Leaf or fragment.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node is a fragment.
    pub fn is_fragment(&self) -> bool {
        matches!(self.kind, NodeKind::Fragment { .. })
    }

    /// Type name of a leaf.
    pub fn type_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Leaf { type_name, .. } => Some(type_name),
            NodeKind::Fragment { .. } => None,
        }
    }

    /// Whether this leaf is an opaque placeholder.
    pub fn is_opaque(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { opaque: true, .. })
    }

    /// Children of a fragment; empty for leaves.
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Fragment { children, .. } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// In-ports (boundary in-ports for fragments), in creation order.
    pub fn in_ports(&self) -> &[PortId] {
        &self.in_ports
    }

    /// Out-ports (boundary out-ports for fragments), in creation order.
    pub fn out_ports(&self) -> &[PortId] {
        &self.out_ports
    }

    /// Parameters in assignment order.
    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    /// Parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Arena holding every node and port of one authoring session.
#[derive(Debug, Clone, Default)]
pub struct FragmentGraph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) ports: Vec<Port>,
}

impl FragmentGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node by handle.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Port by handle.
    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.0]
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ─── Nodes ──────────────────────────────────────────────────────

    /// Add a fragment. `parent: None` creates a detached top-level fragment.
    pub fn add_fragment(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
    ) -> Result<NodeId, FragmentError> {
        self.add_node(
            parent,
            name,
            NodeKind::Fragment {
                children: Vec::new(),
                provided: HashMap::new(),
                imported: HashMap::new(),
            },
        )
    }

    /// Add a leaf primitive of the given type (ports are added separately).
    pub fn add_primitive(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        type_name: &str,
    ) -> Result<NodeId, FragmentError> {
        self.add_node(
            parent,
            name,
            NodeKind::Leaf {
                type_name: type_name.to_string(),
                opaque: false,
            },
        )
    }

    pub(crate) fn add_opaque(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        type_name: &str,
    ) -> Result<NodeId, FragmentError> {
        self.add_node(
            parent,
            name,
            NodeKind::Leaf {
                type_name: type_name.to_string(),
                opaque: true,
            },
        )
    }

    fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId, FragmentError> {
        if let Some(p) = parent {
            self.check_child_name(p, name)?;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            name: name.to_string(),
            parent,
            kind,
            in_ports: Vec::new(),
            out_ports: Vec::new(),
            parameters: Vec::new(),
        });
        if let Some(p) = parent {
            self.children_mut(p)?.push(id);
        }
        Ok(id)
    }

    fn check_child_name(&self, parent: NodeId, name: &str) -> Result<(), FragmentError> {
        let node = self.node(parent);
        if !node.is_fragment() {
            return Err(FragmentError::NotAFragment(self.path(parent)));
        }
        if node.children().iter().any(|c| self.node(*c).name == name) {
            return Err(FragmentError::DuplicateChild {
                parent: self.path(parent),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn children_mut(&mut self, fragment: NodeId) -> Result<&mut Vec<NodeId>, FragmentError> {
        let path = self.path(fragment);
        match &mut self.nodes[fragment.0].kind {
            NodeKind::Fragment { children, .. } => Ok(children),
            NodeKind::Leaf { .. } => Err(FragmentError::NotAFragment(path)),
        }
    }

    /// Attach a detached node (built independently) under `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), FragmentError> {
        if self.node(child).parent.is_some() || self.is_within(parent, child) {
            return Err(FragmentError::InvalidAttach {
                parent: self.path(parent),
                child: self.path(child),
            });
        }
        let name = self.node(child).name.clone();
        self.check_child_name(parent, &name)?;
        self.children_mut(parent)?.push(child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Children of a fragment.
    pub fn children(&self, fragment: NodeId) -> &[NodeId] {
        self.node(fragment).children()
    }

    /// Child of `fragment` named `name`.
    pub fn find_child(&self, fragment: NodeId, name: &str) -> Option<NodeId> {
        self.children(fragment)
            .iter()
            .copied()
            .find(|c| self.node(*c).name == name)
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.node(n).parent;
        }
        false
    }

    /// The child of `ancestor` on the path down to `node`.
    pub(crate) fn child_towards(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut cur = node;
        loop {
            let parent = self.node(cur).parent?;
            if parent == ancestor {
                return Some(cur);
            }
            cur = parent;
        }
    }

    /// Leaf primitives below `root`, depth-first in child order.
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(root, &mut out);
        out
    }

    fn collect_leaves(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.node(node).is_fragment() {
            for child in self.children(node) {
                self.collect_leaves(*child, out);
            }
        } else {
            out.push(node);
        }
    }

    /// Slash-separated path from the top-level ancestor.
    pub fn path(&self, node: NodeId) -> String {
        let mut names = Vec::new();
        let mut cur = Some(node);
        while let Some(n) = cur {
            names.push(self.node(n).name.as_str());
            cur = self.node(n).parent;
        }
        names.reverse();
        names.join("/")
    }

    /// `path.port` of a port.
    pub fn port_path(&self, port: PortId) -> String {
        let p = self.port(port);
        format!("{}.{}", self.path(p.owner), p.name)
    }

    /// `node:port` name used for synthesized boundary ports.
    pub(crate) fn qualified_name(&self, port: PortId) -> String {
        let p = self.port(port);
        format!("{}:{}", self.node(p.owner).name, p.name)
    }

    // ─── Ports ──────────────────────────────────────────────────────

    /// Add an in-port. On a fragment this declares a boundary in-port
    /// (see [`add_boundary_in_port`](Self::add_boundary_in_port)).
    pub fn add_in_port(
        &mut self,
        node: NodeId,
        name: &str,
        ty: ValueType,
    ) -> Result<PortId, FragmentError> {
        self.new_port(node, name, PortDirection::In, ty, None)
    }

    /// Declare a boundary in-port on a fragment.
    pub fn add_boundary_in_port(
        &mut self,
        fragment: NodeId,
        name: &str,
        ty: ValueType,
    ) -> Result<PortId, FragmentError> {
        if !self.node(fragment).is_fragment() {
            return Err(FragmentError::NotAFragment(self.path(fragment)));
        }
        self.new_port(fragment, name, PortDirection::In, ty, None)
    }

    /// Add an out-port to a primitive.
    ///
    /// Fragment out-ports are created through `provide_out_port`.
    pub fn add_out_port(
        &mut self,
        node: NodeId,
        name: &str,
        ty: ValueType,
    ) -> Result<PortId, FragmentError> {
        if self.node(node).is_fragment() {
            return Err(FragmentError::NotALeaf(self.path(node)));
        }
        self.new_port(node, name, PortDirection::Out, ty, None)
    }

    pub(crate) fn new_port(
        &mut self,
        node: NodeId,
        name: &str,
        direction: PortDirection,
        ty: ValueType,
        link: Option<PortId>,
    ) -> Result<PortId, FragmentError> {
        if self.find_port(node, name).is_some() {
            return Err(FragmentError::DuplicatePort {
                node: self.path(node),
                port: name.to_string(),
            });
        }
        let id = PortId(self.ports.len());
        self.ports.push(Port {
            name: name.to_string(),
            owner: node,
            direction,
            ty,
            link,
            debug: None,
        });
        let n = &mut self.nodes[node.0];
        match direction {
            PortDirection::In => n.in_ports.push(id),
            PortDirection::Out => n.out_ports.push(id),
        }
        Ok(id)
    }

    /// Drop every port created at or after `mark` together with its
    /// `provided`/`imported` cache entries. Older ports never link to them.
    pub(crate) fn discard_ports_from(&mut self, mark: usize) {
        if self.ports.len() <= mark {
            return;
        }
        for node in &mut self.nodes {
            node.in_ports.retain(|p| p.0 < mark);
            node.out_ports.retain(|p| p.0 < mark);
            if let NodeKind::Fragment {
                provided, imported, ..
            } = &mut node.kind
            {
                provided.retain(|k, v| k.0 < mark && v.0 < mark);
                imported.retain(|k, v| k.0 < mark && v.0 < mark);
            }
        }
        self.ports.truncate(mark);
    }

    fn find_port(&self, node: NodeId, name: &str) -> Option<PortId> {
        let n = self.node(node);
        n.in_ports
            .iter()
            .chain(n.out_ports.iter())
            .copied()
            .find(|p| self.port(*p).name == name)
    }

    /// In-port of `node` by name.
    pub fn in_port(&self, node: NodeId, name: &str) -> Option<PortId> {
        self.node(node)
            .in_ports
            .iter()
            .copied()
            .find(|p| self.port(*p).name == name)
    }

    /// Out-port of `node` by name.
    pub fn out_port(&self, node: NodeId, name: &str) -> Option<PortId> {
        self.node(node)
            .out_ports
            .iter()
            .copied()
            .find(|p| self.port(*p).name == name)
    }

    /// Whether `port` may feed in-ports: any out-port, or a fragment's
    /// boundary in-port seen from inside.
    pub fn is_source(&self, port: PortId) -> bool {
        let p = self.port(port);
        p.direction == PortDirection::Out || self.node(p.owner).is_fragment()
    }

    /// Scope in which `source` may be referenced.
    pub(crate) fn source_scope(&self, source: PortId) -> Option<NodeId> {
        let p = self.port(source);
        match p.direction {
            PortDirection::Out => self.node(p.owner).parent,
            PortDirection::In => self.node(p.owner).is_fragment().then_some(p.owner),
        }
    }

    /// Scope in which the in-port `input` consumes its source.
    pub(crate) fn consumer_scope(&self, input: PortId) -> Option<NodeId> {
        self.node(self.port(input).owner).parent
    }

    /// Connect `input` to `source`, replacing any previous connection.
    ///
    /// The link may cross scopes; `correct_links` repairs it later.
    pub fn connect(&mut self, input: PortId, source: PortId) -> Result<(), FragmentError> {
        let target = self.port(input);
        if target.direction != PortDirection::In {
            return Err(if self.node(target.owner).is_fragment() {
                FragmentError::ForwardedPort(self.port_path(input))
            } else {
                FragmentError::NotAnInPort(self.port_path(input))
            });
        }
        if !self.is_source(source) {
            return Err(FragmentError::NotASource(self.port_path(source)));
        }
        let (expected, actual) = (target.ty, self.port(source).ty);
        if !expected.accepts(actual) {
            return Err(ValueError::TypeMismatch { expected, actual }.into());
        }
        self.ports[input.0].link = Some(source);
        Ok(())
    }

    /// Remove the connection of `input`.
    pub fn disconnect(&mut self, input: PortId) -> Result<(), FragmentError> {
        if self.port(input).direction != PortDirection::In {
            return Err(FragmentError::NotAnInPort(self.port_path(input)));
        }
        self.ports[input.0].link = None;
        Ok(())
    }

    /// Tag the connection of `input` for debug sampling over `span` seconds.
    pub fn set_debug(&mut self, input: PortId, span: f64) -> Result<(), FragmentError> {
        if self.port(input).direction != PortDirection::In {
            return Err(FragmentError::NotAnInPort(self.port_path(input)));
        }
        self.ports[input.0].debug = Some(span);
        Ok(())
    }

    /// Set (or replace) a parameter of a primitive.
    pub fn set_parameter(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), FragmentError> {
        if self.node(node).is_fragment() {
            return Err(FragmentError::NotALeaf(self.path(node)));
        }
        let value = value.into();
        let params = &mut self.nodes[node.0].parameters;
        match params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => params.push((name.to_string(), value)),
        }
        Ok(())
    }

    /// Follow boundary aliases and forwards from `port` to the primitive
    /// out-port that ultimately feeds it.
    ///
    /// Returns `None` when the chain ends at an unconnected port.
    pub fn resolve_source(&self, port: PortId) -> Option<PortId> {
        let mut cur = port;
        for _ in 0..=self.ports.len() {
            let p = self.port(cur);
            if p.direction == PortDirection::Out && !self.node(p.owner).is_fragment() {
                return Some(cur);
            }
            cur = p.link?;
        }
        None
    }
}
