//! Built-in `Core::` primitives.
//!
//! The leaf catalog (math, geometry, kinematics) attaches through
//! [`PrimitiveRegistry`]; the primitives here define engine semantics
//! (delay, cancellation, netcomm, net chaining) and are always available.
//!
//! | Type | Ports | Parameters |
//! |------|-------|------------|
//! | `Core::Pre` | `inValue` → `outValue` | |
//! | `Core::Constant` | → `outValue` | `Value` |
//! | `Core::Cancel` | → `outCancel` | |
//! | `Core::History` | `inValue`, `inAge` → `outValue` | `MaxAge`, `Age` |
//! | `Core::NetcommIn` | → `outValue`, `outTimestamp` | `Key`, `Type` |
//! | `Core::NetcommOut` | `inValue` → | `Key`, `Type` |
//! | `Core::InterNetIn` | → `outValue` | `RemoteNet`, `RemoteKey` |

pub mod channels;
pub mod flow;

use crate::runtime::registry::PrimitiveRegistry;

pub use channels::{InterNetIn, NetcommIn, NetcommOut, INTER_NET_IN, NETCOMM_IN, NETCOMM_OUT};
pub use flow::{Cancel, Constant, History, Pre, CANCEL, CONSTANT, HISTORY, PRE};

/// Register every built-in primitive.
///
/// # Panics
/// Panics if one of the `Core::` names is already registered.
pub fn register_builtins(registry: &mut PrimitiveRegistry) {
    registry.register(Pre::spec());
    registry.register(Constant::spec());
    registry.register(Cancel::spec());
    registry.register(History::spec());
    registry.register(NetcommIn::spec());
    registry.register(NetcommOut::spec());
    registry.register(InterNetIn::spec());
}
