//! Primitive type registry.
//!
//! Provides a `PrimitiveRegistry` mapping type names to [`PrimitiveSpec`]s:
//! the declared ports and parameters of a leaf type plus the factory creating
//! its [`Behavior`]. The registry is built explicitly at startup and passed to
//! the linker and the codec by reference. No global state.

use std::collections::HashMap;

use rpi_common::device::DeviceHandle;
use rpi_common::value::{Value, ValueType};

use crate::error::{FragmentError, LinkError};
use crate::fragment::{FragmentGraph, NodeId};

use super::linker::LinkContext;
use super::port::PortIo;

/// Per-type leaf behavior, driven by the cycle engine.
///
/// # Timing Contracts
///
/// | Method | Phase | RT Constraint |
/// |--------|-------|---------------|
/// | `check_parameters()` | link time | None (may allocate, may fail) |
/// | `read_sensor()` | 1 | **HARD**, the only phase allowed to sample hardware |
/// | `update_data()` | 2 | **HARD**, must not block |
/// | `write_actuator()` | 3 | **HARD**, the only phase allowed to command hardware |
///
/// Absent inputs are normal: a behavior typically suppresses its own output
/// for that cycle.
pub trait Behavior: Send {
    /// Validate parameters and acquire devices or channels.
    fn check_parameters(&mut self, _ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        Ok(())
    }

    /// Phase 1. The cycle counter still holds the previous cycle.
    fn read_sensor(&mut self, _io: &mut PortIo<'_>) {}

    /// Phase 2. Runs in dependency order.
    fn update_data(&mut self, io: &mut PortIo<'_>);

    /// Phase 3.
    fn write_actuator(&mut self, _io: &mut PortIo<'_>) {}

    /// Devices sampled in `read_sensor`.
    fn sensors(&self) -> Vec<DeviceHandle> {
        Vec::new()
    }

    /// Devices commanded in `write_actuator`.
    fn actuators(&self) -> Vec<DeviceHandle> {
        Vec::new()
    }

    /// Whether this primitive's output lags its inputs by one cycle, so
    /// edges into it are not same-cycle dependencies.
    fn delays_input(&self) -> bool {
        false
    }

    /// Type of input `index` once parameters are known, if narrower than
    /// the declared one. Checked against the source at link time.
    fn input_type(&self, _index: usize) -> Option<ValueType> {
        None
    }
}

/// Factory creating a fresh behavior instance.
pub type BehaviorFactory = fn() -> Box<dyn Behavior>;

/// Declared in-port.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    /// Port name.
    pub name: String,
    /// Port type.
    pub ty: ValueType,
    /// Parameter whose value is read when the port is absent.
    pub fallback: Option<String>,
}

/// Declared out-port.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    /// Port name.
    pub name: String,
    /// Port type.
    pub ty: ValueType,
}

/// Declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: ValueType,
    /// Default; `None` makes the parameter mandatory.
    pub default: Option<Value>,
}

/// Declaration of one primitive type.
#[derive(Debug, Clone)]
pub struct PrimitiveSpec {
    type_name: String,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    params: Vec<ParamSpec>,
    factory: BehaviorFactory,
}

impl PrimitiveSpec {
    /// Start a declaration with no ports or parameters.
    pub fn new(type_name: &str, factory: BehaviorFactory) -> Self {
        Self {
            type_name: type_name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: Vec::new(),
            factory,
        }
    }

    /// Declare an in-port.
    pub fn input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs.push(InputSpec {
            name: name.to_string(),
            ty,
            fallback: None,
        });
        self
    }

    /// Declare an in-port falling back to parameter `param` when absent.
    pub fn input_with_fallback(mut self, name: &str, ty: ValueType, param: &str) -> Self {
        self.inputs.push(InputSpec {
            name: name.to_string(),
            ty,
            fallback: Some(param.to_string()),
        });
        self
    }

    /// Declare an out-port.
    pub fn output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs.push(OutputSpec {
            name: name.to_string(),
            ty,
        });
        self
    }

    /// Declare a mandatory parameter.
    pub fn param(mut self, name: &str, ty: ValueType) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            default: None,
        });
        self
    }

    /// Declare a parameter with a default.
    pub fn param_with_default(
        mut self,
        name: &str,
        ty: ValueType,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            default: Some(default.into()),
        });
        self
    }

    /// Registered type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared in-ports in index order.
    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// Declared out-ports in index order.
    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    /// Declared parameters.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Parameter declaration by name.
    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Create a behavior instance.
    pub fn create(&self) -> Box<dyn Behavior> {
        (self.factory)()
    }
}

/// Registry of available primitive types.
///
/// Constructed at startup, populated via `register()`, and passed to the
/// linker by reference. No global state, testable in isolation.
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    specs: HashMap<String, PrimitiveSpec>,
}

impl PrimitiveRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the engine's `Core::` primitives.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::primitives::register_builtins(&mut registry);
        registry
    }

    /// Register a primitive type.
    ///
    /// # Panics
    /// Panics if a type with the same name is already registered.
    pub fn register(&mut self, spec: PrimitiveSpec) {
        if self.specs.contains_key(spec.type_name()) {
            panic!("Primitive type '{}' is already registered", spec.type_name());
        }
        self.specs.insert(spec.type_name().to_string(), spec);
    }

    /// Declaration of a type.
    pub fn get(&self, type_name: &str) -> Option<&PrimitiveSpec> {
        self.specs.get(type_name)
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.specs.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Add a primitive of registered type `type_name` to `graph`, with the
    /// ports its declaration lists.
    ///
    /// Returns `None` if the type is unknown.
    pub fn instantiate(
        &self,
        graph: &mut FragmentGraph,
        parent: Option<NodeId>,
        name: &str,
        type_name: &str,
    ) -> Option<Result<NodeId, FragmentError>> {
        self.get(type_name)
            .map(|spec| graph.instantiate(parent, name, spec))
    }
}

impl FragmentGraph {
    /// Add a primitive with the ports declared by `spec`.
    pub fn instantiate(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        spec: &PrimitiveSpec,
    ) -> Result<NodeId, FragmentError> {
        let node = self.add_primitive(parent, name, spec.type_name())?;
        for input in spec.inputs() {
            self.add_in_port(node, &input.name, input.ty)?;
        }
        for output in spec.outputs() {
            self.add_out_port(node, &output.name, output.ty)?;
        }
        Ok(node)
    }
}
