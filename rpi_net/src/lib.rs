//! # RPI Primitive Net Library
//!
//! Composition and cyclic execution of primitive nets for robot control.
//!
//! A primitive is a small dataflow block with typed in-ports, out-ports and
//! parameters. Primitives are grouped into fragments, fragments nest, and a
//! top-level fragment linked against a [`PrimitiveRegistry`] becomes a
//! [`Net`]: an executable unit cycled at a fixed rate.
//!
//! ## Cycle
//!
//! Every cycle runs three phases over all primitives:
//!
//! 1. **read sensors** with sensor devices locked
//! 2. **update data** in topological order
//! 3. **write actuators** with actuator devices locked
//!
//! A value written during a cycle is only visible to readers in that same
//! cycle; stale values fall back to the port default.
//!
//! ## Lifecycle
//!
//! `ready → running → (cancelling) → terminated`, or `killed` at any time.
//! A net terminates when its `terminate` output becomes true. A terminated
//! net may hand over to a successor that reads its netcomm channels.
//!
//! ## Module Structure
//!
//! - [`fragment`] - Authoring graph, boundary resolution and JSON codec
//! - [`runtime`] - Linker, net execution, netcomm and scheduling
//! - [`primitives`] - Built-in `Core::` primitives
//! - [`error`] - Error types

pub mod error;
pub mod fragment;
pub mod primitives;
pub mod runtime;

pub use error::{CodecError, FragmentError, LinkError, NetError};
pub use fragment::{FragmentGraph, NodeId, PortId};
pub use runtime::{Linker, Net, NetHandle, NetStatus, PrimitiveRegistry, Scheduler};

static_assertions::assert_impl_all!(runtime::Net: Send);
static_assertions::assert_impl_all!(runtime::NetHandle: Send, Sync, Clone);
static_assertions::assert_impl_all!(runtime::NotificationExecutor: Send, Sync);
