//! Error types for composition, serialization, linking and net control.
//!
//! Link-time problems are fatal: a net that fails to link never runs.
//! Run-time value absence is not an error and never appears here.

use rpi_common::value::{ValueError, ValueType};
use thiserror::Error;

/// Construction errors raised by the authoring layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FragmentError {
    /// Two children of one fragment share a name.
    #[error("'{parent}' already has a child named '{name}'")]
    DuplicateChild {
        /// Fragment path.
        parent: String,
        /// Conflicting child name.
        name: String,
    },

    /// Two ports of one node share a name.
    #[error("'{node}' already has a port named '{port}'")]
    DuplicatePort {
        /// Node path.
        node: String,
        /// Conflicting port name.
        port: String,
    },

    /// The node is a primitive where a fragment was required.
    #[error("'{0}' is not a fragment")]
    NotAFragment(String),

    /// The node is a fragment where a primitive was required.
    #[error("'{0}' is not a primitive")]
    NotALeaf(String),

    /// The port cannot receive a connection.
    #[error("port '{0}' is not an in-port")]
    NotAnInPort(String),

    /// The port cannot feed other ports.
    #[error("port '{0}' cannot act as a source")]
    NotASource(String),

    /// Boundary out-ports only alias internal sources.
    #[error("port '{0}' is a forwarded boundary port and cannot be written")]
    ForwardedPort(String),

    /// Attaching would break the tree shape.
    #[error("cannot attach '{child}' to '{parent}'")]
    InvalidAttach {
        /// Prospective parent path.
        parent: String,
        /// Child path.
        child: String,
    },

    /// The source port does not live below the fragment.
    #[error("port '{port}' is not inside fragment '{fragment}'")]
    NotInScope {
        /// Fragment path.
        fragment: String,
        /// Port path.
        port: String,
    },

    /// In-ports still referencing sources outside their scope.
    #[error("{} unresolved in-port(s): {}", .0.len(), .0.join(", "))]
    Unresolved(Vec<String>),

    /// Port type check failed.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Errors at the serialization boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed JSON document.
    #[error("malformed net document: {0}")]
    Json(#[from] serde_json::Error),

    /// A connection names a module that does not exist in its fragment.
    #[error("fragment '{fragment}' has no module '{module}'")]
    UnknownModule {
        /// Fragment path.
        fragment: String,
        /// Referenced module name.
        module: String,
    },

    /// A connection names a port the module does not declare.
    #[error("module '{module}' has no port '{port}'")]
    UnknownPort {
        /// Module path.
        module: String,
        /// Referenced port name.
        port: String,
    },

    /// A known primitive type received a parameter it does not declare.
    #[error("module '{module}' has no parameter '{param}'")]
    UnknownParameter {
        /// Module path.
        module: String,
        /// Parameter name.
        param: String,
    },

    /// The graph still has cross-scope links; run `correct_links` first.
    #[error("in-port '{0}' references a source outside its scope")]
    CrossScope(String),

    /// Construction failure while rebuilding the graph.
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    /// Parameter value failed to parse.
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Fatal link-time failures. The net fails to load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// The root node is not a fragment.
    #[error("net root '{0}' is not a fragment")]
    NotAFragment(String),

    /// In-ports that could not be resolved inside the root.
    #[error("{} unresolved in-port(s): {}", .0.len(), .0.join(", "))]
    Unresolved(Vec<String>),

    /// No factory registered for the type name.
    #[error("{path}: unregistered primitive type '{type_name}'")]
    UnknownType {
        /// Primitive path.
        path: String,
        /// Type name.
        type_name: String,
    },

    /// The primitive uses a port its type does not declare.
    #[error("{path}: type has no port '{port}'")]
    UnknownPort {
        /// Primitive path.
        path: String,
        /// Port name.
        port: String,
    },

    /// Required parameter without default is not set.
    #[error("{path}: missing parameter '{param}'")]
    MissingParameter {
        /// Primitive path.
        path: String,
        /// Parameter name.
        param: String,
    },

    /// Parameter not declared by the type.
    #[error("{path}: unknown parameter '{param}'")]
    UnknownParameter {
        /// Primitive path.
        path: String,
        /// Parameter name.
        param: String,
    },

    /// Parameter present but unusable.
    #[error("{path}: invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Primitive path.
        path: String,
        /// Parameter name.
        param: String,
        /// Explanation.
        reason: String,
    },

    /// Debug span that cannot be sampled.
    #[error("{port}: invalid debug span: {reason}")]
    InvalidDebugSpan {
        /// In-port path.
        port: String,
        /// Explanation.
        reason: String,
    },

    /// Connected ports carry incompatible types.
    #[error("{path}: port '{port}' expects {expected}, source provides {actual}")]
    TypeMismatch {
        /// Primitive path.
        path: String,
        /// Port name.
        port: String,
        /// Declared type.
        expected: ValueType,
        /// Source type.
        actual: ValueType,
    },

    /// Inter-net link names a net that is not loaded.
    #[error("{path}: predecessor net '{net}' is not loaded")]
    UnknownNet {
        /// Primitive path.
        path: String,
        /// Remote net id.
        net: String,
    },

    /// Inter-net link names a channel the predecessor does not have.
    #[error("{path}: net '{net}' has no netcomm channel '{key}'")]
    UnknownNetcommKey {
        /// Primitive path.
        path: String,
        /// Remote net id.
        net: String,
        /// Channel key.
        key: String,
    },

    /// Two netcomm primitives claim the same key.
    #[error("{path}: netcomm key '{key}' is already in use")]
    DuplicateNetcommKey {
        /// Primitive path.
        path: String,
        /// Channel key.
        key: String,
    },

    /// Device lookup failed.
    #[error("{path}: no device '{device}' of class '{class}'")]
    UnknownDevice {
        /// Primitive path.
        path: String,
        /// Device name.
        device: String,
        /// Device class.
        class: String,
    },

    /// The net references more devices than one cycle may lock.
    #[error("net references {0} devices, more than the supported maximum")]
    TooManyDevices(usize),

    /// Same-cycle dependency cycle not broken by a Pre primitive.
    #[error("same-cycle dependency loop through: {}", .0.join(", "))]
    AlgebraicLoop(Vec<String>),
}

/// Errors raised while managing loaded nets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    /// A net with the same id is already loaded.
    #[error("net '{0}' is already loaded")]
    DuplicateNet(String),

    /// No net with this id.
    #[error("net '{0}' is not loaded")]
    UnknownNet(String),

    /// No netcomm channel with this key.
    #[error("no netcomm channel '{0}'")]
    UnknownChannel(String),

    /// External writers may only push into inbound channels.
    #[error("netcomm channel '{0}' is not writable from outside the net")]
    WrongDirection(String),

    /// The channel belongs to an unloaded net.
    #[error("netcomm channel '{0}' has been killed")]
    ChannelKilled(String),

    /// Operation not allowed in the current lifecycle state.
    #[error("net '{net}' is {status}")]
    InvalidState {
        /// Net id.
        net: String,
        /// Current status name.
        status: String,
    },

    /// Value failed to parse or type-check.
    #[error(transparent)]
    Value(#[from] ValueError),
}
