//! Linker: fragment graph → executable [`Net`].
//!
//! ## Link Sequence
//! 1. Root must be a fragment whose in-ports are all well-scoped.
//! 2. Depth-first over leaves: look up the type, check ports, bind
//!    parameters, create the behavior and run `check_parameters`.
//! 3. Allocate one slot per declared out-port.
//! 4. Resolve every declared in-port through boundary ports to one slot (or
//!    none), type-check it and attach parameter fallbacks and debug probes.
//! 5. Order `update_data` topologically. Edges into delaying primitives
//!    (`Core::Pre`) are not same-cycle dependencies.
//! 6. Collect sensor and actuator devices, sorted by name.
//!
//! Every failure is a [`LinkError`]: a net that does not link never runs.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use heapless::Vec as HVec;
use rpi_common::config::EngineConfig;
use rpi_common::consts::{MAX_NET_DEVICES, TERMINATE_PORT};
use rpi_common::device::{DeviceHandle, DeviceRegistry};
use rpi_common::value::{Value, ValueType};
use tracing::debug;

use crate::error::LinkError;
use crate::fragment::{FragmentGraph, NodeId, PortDirection, PortId};

use super::debug::{span_samples, DebugProbe};
use super::executor::NotificationExecutor;
use super::net::{Net, NetParts, PrimitiveInstance};
use super::netcomm::{ChannelDirection, NetcommChannel, NetcommTable};
use super::port::{InBinding, OutSlot, SlotId};
use super::registry::{PrimitiveRegistry, PrimitiveSpec};

/// Link-time services offered to `Behavior::check_parameters`.
pub struct LinkContext<'a> {
    path: &'a str,
    params: &'a HashMap<String, Value>,
    cycle_time: f64,
    devices: &'a dyn DeviceRegistry,
    netcomm: &'a mut NetcommTable,
    predecessors: &'a HashMap<String, NetcommTable>,
}

impl<'a> LinkContext<'a> {
    /// Path of the primitive being linked.
    pub fn path(&self) -> &str {
        self.path
    }

    /// Bound parameter value (explicit or default).
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Numeric parameter.
    pub fn param_f64(&self, name: &str) -> Result<f64, LinkError> {
        self.param(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.invalid(name, "expected a number"))
    }

    /// String parameter.
    pub fn param_str(&self, name: &str) -> Result<&str, LinkError> {
        self.param(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(name, "expected a string"))
    }

    /// Fixed cycle time [s] of the net.
    pub fn cycle_time(&self) -> f64 {
        self.cycle_time
    }

    /// Build an `InvalidParameter` error for this primitive.
    pub fn invalid(&self, param: &str, reason: impl Into<String>) -> LinkError {
        LinkError::InvalidParameter {
            path: self.path.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// Look up a device.
    pub fn device(&self, name: &str, device_class: &str) -> Result<DeviceHandle, LinkError> {
        self.devices
            .lookup(name, device_class)
            .ok_or_else(|| LinkError::UnknownDevice {
                path: self.path.to_string(),
                device: name.to_string(),
                class: device_class.to_string(),
            })
    }

    /// Create a fresh netcomm channel owned by the net being linked.
    pub fn create_channel(
        &mut self,
        key: &str,
        ty: ValueType,
        direction: ChannelDirection,
    ) -> Result<Arc<NetcommChannel>, LinkError> {
        self.netcomm
            .create(key, ty, direction)
            .ok_or_else(|| LinkError::DuplicateNetcommKey {
                path: self.path.to_string(),
                key: key.to_string(),
            })
    }

    /// Channel `key` of the already loaded net `net`.
    pub fn remote_channel(&self, net: &str, key: &str) -> Result<Arc<NetcommChannel>, LinkError> {
        let table = self
            .predecessors
            .get(net)
            .ok_or_else(|| LinkError::UnknownNet {
                path: self.path.to_string(),
                net: net.to_string(),
            })?;
        table
            .get(key)
            .cloned()
            .ok_or_else(|| LinkError::UnknownNetcommKey {
                path: self.path.to_string(),
                net: net.to_string(),
                key: key.to_string(),
            })
    }
}

/// Turns fragment graphs into nets.
pub struct Linker<'a> {
    registry: &'a PrimitiveRegistry,
    devices: &'a dyn DeviceRegistry,
    config: &'a EngineConfig,
    executor: NotificationExecutor,
    predecessors: HashMap<String, NetcommTable>,
}

impl<'a> Linker<'a> {
    /// Create a linker. Nets it produces notify on `executor`.
    pub fn new(
        registry: &'a PrimitiveRegistry,
        devices: &'a dyn DeviceRegistry,
        config: &'a EngineConfig,
        executor: NotificationExecutor,
    ) -> Self {
        Self {
            registry,
            devices,
            config,
            executor,
            predecessors: HashMap::new(),
        }
    }

    /// Netcomm tables of loaded nets, by net id, for `Core::InterNetIn`.
    pub fn with_predecessors(mut self, tables: HashMap<String, NetcommTable>) -> Self {
        self.predecessors = tables;
        self
    }

    /// Link the fragment `root` of `graph` into the net `id`.
    pub fn link(&self, id: &str, graph: &FragmentGraph, root: NodeId) -> Result<Net, LinkError> {
        if !graph.node(root).is_fragment() {
            return Err(LinkError::NotAFragment(graph.path(root)));
        }
        let unresolved = graph.unresolved(root);
        if !unresolved.is_empty() {
            return Err(LinkError::Unresolved(unresolved));
        }

        let cycle_time = self.config.cycle_time_secs();
        let leaves = graph.leaves(root);
        let mut netcomm = NetcommTable::new();
        let mut primitives = Vec::with_capacity(leaves.len());
        let mut specs = Vec::with_capacity(leaves.len());
        let mut bound = Vec::with_capacity(leaves.len());
        let mut slots = Vec::new();
        let mut slot_types = Vec::new();
        let mut slot_owner = Vec::new();
        let mut slot_of = HashMap::new();
        let mut sensors = Vec::new();
        let mut actuators = Vec::new();

        // ── Instantiate ──
        for (index, &leaf) in leaves.iter().enumerate() {
            let path = graph.path(leaf);
            let node = graph.node(leaf);
            let type_name = node.type_name().unwrap_or_default();
            let spec = self
                .registry
                .get(type_name)
                .ok_or_else(|| LinkError::UnknownType {
                    path: path.clone(),
                    type_name: type_name.to_string(),
                })?;
            check_ports(graph, leaf, spec, &path)?;
            let params = bind_parameters(graph, leaf, spec, &path)?;

            let mut behavior = spec.create();
            let mut ctx = LinkContext {
                path: &path,
                params: &params,
                cycle_time,
                devices: self.devices,
                netcomm: &mut netcomm,
                predecessors: &self.predecessors,
            };
            behavior.check_parameters(&mut ctx)?;
            sensors.extend(behavior.sensors());
            actuators.extend(behavior.actuators());

            let mut outputs = Vec::with_capacity(spec.outputs().len());
            for output in spec.outputs() {
                let slot = SlotId(slots.len());
                slots.push(OutSlot::default());
                slot_types.push(output.ty);
                slot_owner.push(index);
                if let Some(port) = graph.out_port(leaf, &output.name) {
                    slot_of.insert(port, slot);
                }
                outputs.push(slot);
            }

            primitives.push(PrimitiveInstance {
                path,
                behavior,
                inputs: Vec::new(),
                outputs,
            });
            specs.push(spec);
            bound.push(params);
        }

        // ── Resolve in-ports ──
        let mut probes = Vec::new();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); leaves.len()];
        let mut in_degree = vec![0usize; leaves.len()];
        for (index, &leaf) in leaves.iter().enumerate() {
            let spec = specs[index];
            let delays = primitives[index].behavior.delays_input();
            let mut inputs = Vec::with_capacity(spec.inputs().len());
            for (i, input) in spec.inputs().iter().enumerate() {
                let port = graph.in_port(leaf, &input.name);
                let source = port
                    .and_then(|p| resolve_within(graph, root, p))
                    .and_then(|p| slot_of.get(&p).copied());
                if let Some(slot) = source {
                    let expected = primitives[index].behavior.input_type(i).unwrap_or(input.ty);
                    let actual = slot_types[slot.0];
                    if !expected.accepts(actual) {
                        return Err(LinkError::TypeMismatch {
                            path: primitives[index].path.clone(),
                            port: input.name.clone(),
                            expected,
                            actual,
                        });
                    }
                    if !delays {
                        successors[slot_owner[slot.0]].push(index);
                        in_degree[index] += 1;
                    }
                }
                let binding = InBinding {
                    source,
                    fallback: input
                        .fallback
                        .as_ref()
                        .and_then(|param| bound[index].get(param).cloned()),
                };
                if let Some((p, span)) = port.and_then(|p| Some((p, graph.port(p).debug()?))) {
                    let capacity = span_samples(span, cycle_time).map_err(|reason| {
                        LinkError::InvalidDebugSpan {
                            port: graph.port_path(p),
                            reason,
                        }
                    })?;
                    probes.push(DebugProbe::new(graph.port_path(p), binding.clone(), capacity));
                }
                inputs.push(binding);
            }
            primitives[index].inputs = inputs;
        }

        // ── Root outputs ──
        let mut outputs = HashMap::new();
        for &port in graph.node(root).out_ports() {
            if let Some(slot) = resolve_within(graph, root, port).and_then(|p| slot_of.get(&p)) {
                outputs.insert(graph.port(port).name().to_string(), *slot);
            }
        }
        let terminate = outputs.get(TERMINATE_PORT).copied();

        let order = topological_order(&successors, in_degree).map_err(|stuck| {
            LinkError::AlgebraicLoop(stuck.iter().map(|i| primitives[*i].path.clone()).collect())
        })?;

        let parts = NetParts {
            id: id.to_string(),
            slots,
            primitives,
            order,
            sensors: device_set(sensors)?,
            actuators: device_set(actuators)?,
            probes,
            outputs,
            terminate,
            netcomm,
            cycle_time,
            report_interval: self.config.report_interval_secs(),
            executor: self.executor.clone(),
        };
        let net = Net::new(parts);
        debug!(
            net = id,
            primitives = net.primitive_count(),
            channels = net.netcomm().len(),
            "net linked"
        );
        Ok(net)
    }
}

fn check_ports(
    graph: &FragmentGraph,
    leaf: NodeId,
    spec: &PrimitiveSpec,
    path: &str,
) -> Result<(), LinkError> {
    let node = graph.node(leaf);
    for &port in node.in_ports() {
        let name = graph.port(port).name();
        if !spec.inputs().iter().any(|i| i.name == name) {
            return Err(LinkError::UnknownPort {
                path: path.to_string(),
                port: name.to_string(),
            });
        }
    }
    for &port in node.out_ports() {
        let name = graph.port(port).name();
        if !spec.outputs().iter().any(|o| o.name == name) {
            return Err(LinkError::UnknownPort {
                path: path.to_string(),
                port: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Coerce authored parameters to the declared types and add defaults.
fn bind_parameters(
    graph: &FragmentGraph,
    leaf: NodeId,
    spec: &PrimitiveSpec,
    path: &str,
) -> Result<HashMap<String, Value>, LinkError> {
    let mut params = HashMap::new();
    let opaque = graph.node(leaf).is_opaque();
    for (name, value) in graph.node(leaf).parameters() {
        let decl = spec
            .param_spec(name)
            .ok_or_else(|| LinkError::UnknownParameter {
                path: path.to_string(),
                param: name.clone(),
            })?;
        let value = coerce(decl.ty, value, opaque).map_err(|reason| LinkError::InvalidParameter {
            path: path.to_string(),
            param: name.clone(),
            reason,
        })?;
        params.insert(name.clone(), value);
    }
    for decl in spec.params() {
        if params.contains_key(&decl.name) {
            continue;
        }
        match &decl.default {
            Some(default) => {
                params.insert(decl.name.clone(), default.clone());
            }
            None => {
                return Err(LinkError::MissingParameter {
                    path: path.to_string(),
                    param: decl.name.clone(),
                });
            }
        }
    }
    Ok(params)
}

/// `raw` marks parameters of opaque placeholders, which hold the document's
/// strings until the type is known.
fn coerce(ty: ValueType, value: &Value, raw: bool) -> Result<Value, String> {
    match (ty, value) {
        (_, Value::String(text)) if raw => Value::decode(ty, text).map_err(|e| e.to_string()),
        (ValueType::Double, Value::Int(i)) => Ok(Value::Double(*i as f64)),
        (ValueType::String | ValueType::Any, _) if ty.accepts(value.value_type()) => {
            Ok(value.clone())
        }
        (_, Value::String(text)) => Value::decode(ty, text).map_err(|e| e.to_string()),
        _ => ty.check(value).map(|()| value.clone()).map_err(|e| e.to_string()),
    }
}

/// Follow links from in-port `port` to the leaf out-port feeding it, without
/// leaving `root`. Root boundary in-ports are net inputs and resolve to none.
fn resolve_within(graph: &FragmentGraph, root: NodeId, port: PortId) -> Option<PortId> {
    let mut cur = graph.port(port).link()?;
    for _ in 0..=graph.ports.len() {
        let p = graph.port(cur);
        let owner = p.owner();
        if !graph.is_within(owner, root) {
            return None;
        }
        if p.direction() == PortDirection::Out && !graph.node(owner).is_fragment() {
            return Some(cur);
        }
        if owner == root && p.direction() == PortDirection::In {
            return None;
        }
        cur = p.link()?;
    }
    None
}

/// Kahn's algorithm, lowest index first so independent primitives keep
/// depth-first order. On a cycle returns the primitives left over.
fn topological_order(
    successors: &[Vec<usize>],
    mut in_degree: Vec<usize>,
) -> Result<Vec<usize>, Vec<usize>> {
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &next in &successors[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    if order.len() == in_degree.len() {
        Ok(order)
    } else {
        Err((0..in_degree.len()).filter(|i| in_degree[*i] > 0).collect())
    }
}

/// Distinct devices sorted by name, the order they are locked in.
fn device_set(
    mut devices: Vec<DeviceHandle>,
) -> Result<HVec<DeviceHandle, MAX_NET_DEVICES>, LinkError> {
    devices.sort_by(|a, b| a.name().cmp(b.name()));
    devices.dedup_by(|a, b| a.name() == b.name());
    let count = devices.len();
    let mut set = HVec::new();
    for device in devices {
        set.push(device)
            .map_err(|_| LinkError::TooManyDevices(count))?;
    }
    Ok(set)
}
