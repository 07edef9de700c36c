//! JSON serialization of fragment graphs.
//!
//! A net document is a tree of `fragment` and `module` elements:
//!
//! ```json
//! { "fragment": {
//!     "name": "root",
//!     "inports": [],
//!     "outports": [{ "name": "terminate", "type": "any",
//!                    "frommodule": "done", "fromport": "outValue" }],
//!     "modules": [
//!       { "module": { "name": "done", "type": "Core::Constant",
//!                     "parameters": { "Value": "true" }, "ports": [] } }
//!     ] } }
//! ```
//!
//! Connections are stored on the consuming side as `frommodule`/`fromport`,
//! relative to the enclosing fragment; an empty `frommodule` names one of the
//! fragment's own boundary in-ports. Parameters use the canonical string
//! encoding, prefixed with the type name (`"double:2"`) when the bare text
//! would read back as another type. Modules of unregistered types become opaque placeholders whose
//! ports are created on demand, so the document still links once the type is
//! known and still takes part in `correct_links`.

use std::collections::BTreeMap;

use rpi_common::value::{Value, ValueType};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, FragmentError};
use crate::runtime::registry::PrimitiveRegistry;

use super::graph::{FragmentGraph, NodeId, PortDirection, PortId};

/// Root of a serialized net.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDocument {
    /// Root fragment.
    pub fragment: FragmentElement,
}

/// Child element of a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    /// Nested fragment.
    Fragment(FragmentElement),
    /// Leaf primitive.
    Module(ModuleElement),
}

/// Serialized fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentElement {
    /// Fragment name.
    pub name: String,
    /// Boundary in-ports, connected in the enclosing scope.
    #[serde(default)]
    pub inports: Vec<PortDecl>,
    /// Boundary out-ports, aliasing internal sources.
    #[serde(default)]
    pub outports: Vec<PortDecl>,
    /// Children in order.
    #[serde(default)]
    pub modules: Vec<Element>,
}

/// Serialized leaf primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleElement {
    /// Primitive name.
    pub name: String,
    /// Registered type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Parameters, string-encoded, optionally `type:`-tagged.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Connected in-ports.
    #[serde(default)]
    pub ports: Vec<PortConnection>,
}

/// Boundary port declaration with its connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDecl {
    /// Port name.
    pub name: String,
    /// Port type.
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Source module; empty for a boundary in-port of the scope.
    #[serde(default)]
    pub frommodule: String,
    /// Source port; empty when unconnected.
    #[serde(default)]
    pub fromport: String,
}

/// Connection of one module in-port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConnection {
    /// In-port name.
    pub name: String,
    /// Source module; empty for a boundary in-port of the enclosing fragment.
    #[serde(default)]
    pub frommodule: String,
    /// Source port.
    pub fromport: String,
    /// Debug history span [s].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<f64>,
}

// ─── Serialization ──────────────────────────────────────────────────

/// Serialize the fragment `root`.
///
/// # Errors
/// `CrossScope` if any link below `root` is not well-scoped; run
/// `correct_links` first.
pub fn to_document(graph: &FragmentGraph, root: NodeId) -> Result<NetDocument, CodecError> {
    if !graph.node(root).is_fragment() {
        return Err(FragmentError::NotAFragment(graph.path(root)).into());
    }
    if let Some(first) = graph.unresolved(root).into_iter().next() {
        return Err(CodecError::CrossScope(first));
    }
    Ok(NetDocument {
        fragment: fragment_element(graph, root),
    })
}

/// Serialize the fragment `root` to pretty-printed JSON.
pub fn to_json(graph: &FragmentGraph, root: NodeId) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&to_document(graph, root)?)?)
}

fn source_ref(graph: &FragmentGraph, source: Option<PortId>) -> (String, String) {
    let Some(source) = source else {
        return (String::new(), String::new());
    };
    let port = graph.port(source);
    match port.direction() {
        PortDirection::Out => (
            graph.node(port.owner()).name().to_string(),
            port.name().to_string(),
        ),
        PortDirection::In => (String::new(), port.name().to_string()),
    }
}

fn fragment_element(graph: &FragmentGraph, fragment: NodeId) -> FragmentElement {
    let node = graph.node(fragment);
    let is_top = node.parent().is_none();
    let decl = |port: PortId, link: Option<PortId>| {
        let (frommodule, fromport) = source_ref(graph, link);
        PortDecl {
            name: graph.port(port).name().to_string(),
            ty: graph.port(port).value_type(),
            frommodule,
            fromport,
        }
    };
    FragmentElement {
        name: node.name().to_string(),
        inports: node
            .in_ports()
            .iter()
            .map(|&p| decl(p, if is_top { None } else { graph.port(p).link() }))
            .collect(),
        outports: node
            .out_ports()
            .iter()
            .map(|&p| decl(p, graph.port(p).link()))
            .collect(),
        modules: node
            .children()
            .iter()
            .map(|&child| {
                if graph.node(child).is_fragment() {
                    Element::Fragment(fragment_element(graph, child))
                } else {
                    Element::Module(module_element(graph, child))
                }
            })
            .collect(),
    }
}

fn module_element(graph: &FragmentGraph, leaf: NodeId) -> ModuleElement {
    let node = graph.node(leaf);
    let ports = node
        .in_ports()
        .iter()
        .filter_map(|&p| {
            let port = graph.port(p);
            let link = port.link()?;
            let (frommodule, fromport) = source_ref(graph, Some(link));
            Some(PortConnection {
                name: port.name().to_string(),
                frommodule,
                fromport,
                debug: port.debug(),
            })
        })
        .collect();
    ModuleElement {
        name: node.name().to_string(),
        type_name: node.type_name().unwrap_or_default().to_string(),
        parameters: node
            .parameters()
            .iter()
            .map(|(name, value)| {
                // Placeholders hold the document text verbatim.
                let text = if node.is_opaque() {
                    value.encode()
                } else {
                    value.encode_tagged()
                };
                (name.clone(), text)
            })
            .collect(),
        ports,
    }
}

// ─── Deserialization ────────────────────────────────────────────────

/// Rebuild a graph from a document. Returns the graph and its root.
///
/// Nodes are created first; connections are made bottom-up so that every
/// nested fragment exposes its boundary out-ports before any sibling in the
/// enclosing scope references them, whatever the declaration order.
pub fn from_document(
    doc: &NetDocument,
    registry: &PrimitiveRegistry,
) -> Result<(FragmentGraph, NodeId), CodecError> {
    let mut graph = FragmentGraph::new();
    let root = create_fragment(&mut graph, None, &doc.fragment, registry)?;
    connect_fragment(&mut graph, root, &doc.fragment)?;
    Ok((graph, root))
}

/// Parse a JSON document and rebuild its graph.
pub fn from_json(
    json: &str,
    registry: &PrimitiveRegistry,
) -> Result<(FragmentGraph, NodeId), CodecError> {
    let doc: NetDocument = serde_json::from_str(json)?;
    from_document(&doc, registry)
}

fn create_fragment(
    graph: &mut FragmentGraph,
    parent: Option<NodeId>,
    element: &FragmentElement,
    registry: &PrimitiveRegistry,
) -> Result<NodeId, CodecError> {
    let fragment = graph.add_fragment(parent, &element.name)?;
    for decl in &element.inports {
        graph.add_boundary_in_port(fragment, &decl.name, decl.ty)?;
    }
    for child in &element.modules {
        match child {
            Element::Fragment(f) => {
                create_fragment(graph, Some(fragment), f, registry)?;
            }
            Element::Module(m) => {
                create_module(graph, fragment, m, registry)?;
            }
        }
    }
    Ok(fragment)
}

fn create_module(
    graph: &mut FragmentGraph,
    parent: NodeId,
    element: &ModuleElement,
    registry: &PrimitiveRegistry,
) -> Result<NodeId, CodecError> {
    let Some(spec) = registry.get(&element.type_name) else {
        let node = graph.add_opaque(Some(parent), &element.name, &element.type_name)?;
        for (name, raw) in &element.parameters {
            graph.set_parameter(node, name, Value::String(raw.clone()))?;
        }
        return Ok(node);
    };
    let node = graph.instantiate(Some(parent), &element.name, spec)?;
    for (name, raw) in &element.parameters {
        let decl = spec
            .param_spec(name)
            .ok_or_else(|| CodecError::UnknownParameter {
                module: graph.path(node),
                param: name.clone(),
            })?;
        graph.set_parameter(node, name, Value::decode(decl.ty, raw)?)?;
    }
    Ok(node)
}

fn connect_fragment(
    graph: &mut FragmentGraph,
    fragment: NodeId,
    element: &FragmentElement,
) -> Result<(), CodecError> {
    for child in &element.modules {
        if let Element::Fragment(f) = child {
            let node = find_child(graph, fragment, &f.name)?;
            connect_fragment(graph, node, f)?;
        }
    }
    for child in &element.modules {
        match child {
            Element::Fragment(f) => {
                let node = find_child(graph, fragment, &f.name)?;
                for decl in &f.inports {
                    if decl.fromport.is_empty() {
                        continue;
                    }
                    let input = graph
                        .in_port(node, &decl.name)
                        .ok_or_else(|| unknown_port(graph, node, &decl.name))?;
                    let source = scope_source(graph, fragment, &decl.frommodule, &decl.fromport)?;
                    graph.connect(input, source)?;
                }
            }
            Element::Module(m) => {
                let node = find_child(graph, fragment, &m.name)?;
                for conn in &m.ports {
                    let input = module_port(graph, node, &conn.name, PortDirection::In)?;
                    let source = scope_source(graph, fragment, &conn.frommodule, &conn.fromport)?;
                    graph.connect(input, source)?;
                    if let Some(span) = conn.debug {
                        graph.set_debug(input, span)?;
                    }
                }
            }
        }
    }
    for decl in &element.outports {
        let source = scope_source(graph, fragment, &decl.frommodule, &decl.fromport)?;
        graph.provide_out_port(fragment, source, &decl.name)?;
    }
    Ok(())
}

fn find_child(graph: &FragmentGraph, fragment: NodeId, name: &str) -> Result<NodeId, CodecError> {
    graph
        .find_child(fragment, name)
        .ok_or_else(|| CodecError::UnknownModule {
            fragment: graph.path(fragment),
            module: name.to_string(),
        })
}

fn unknown_port(graph: &FragmentGraph, node: NodeId, port: &str) -> CodecError {
    CodecError::UnknownPort {
        module: graph.path(node),
        port: port.to_string(),
    }
}

/// Port `name` of a leaf, created with type `any` on opaque placeholders.
fn module_port(
    graph: &mut FragmentGraph,
    node: NodeId,
    name: &str,
    direction: PortDirection,
) -> Result<PortId, CodecError> {
    let existing = match direction {
        PortDirection::In => graph.in_port(node, name),
        PortDirection::Out => graph.out_port(node, name),
    };
    if let Some(port) = existing {
        return Ok(port);
    }
    if !graph.node(node).is_opaque() {
        return Err(unknown_port(graph, node, name));
    }
    Ok(graph.new_port(node, name, direction, ValueType::Any, None)?)
}

/// Source `frommodule.fromport` as seen inside `scope`.
fn scope_source(
    graph: &mut FragmentGraph,
    scope: NodeId,
    frommodule: &str,
    fromport: &str,
) -> Result<PortId, CodecError> {
    if frommodule.is_empty() {
        return graph
            .in_port(scope, fromport)
            .ok_or_else(|| unknown_port(graph, scope, fromport));
    }
    let module = find_child(graph, scope, frommodule)?;
    if graph.node(module).is_fragment() {
        graph
            .out_port(module, fromport)
            .ok_or_else(|| unknown_port(graph, module, fromport))
    } else {
        module_port(graph, module, fromport, PortDirection::Out)
    }
}
