//! Fragment composition.
//!
//! Nets are authored as a tree of fragments holding leaf primitives. The
//! graph keeps structure, ports, parameters and links; `links` repairs links
//! that cross fragment boundaries; `codec` moves whole trees in and out of
//! JSON.

pub mod codec;
pub mod graph;
pub mod links;

pub use codec::{from_json, to_json, NetDocument};
pub use graph::{FragmentGraph, Node, NodeId, NodeKind, Port, PortDirection, PortId};
