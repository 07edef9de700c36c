//! Test primitives, devices and link helpers.

use std::sync::Arc;

use parking_lot::Mutex;
use rpi_common::config::EngineConfig;
use rpi_common::device::{Device, DeviceHandle, DeviceLock, DeviceMap};
use rpi_common::value::{Value, ValueType};
use rpi_net::error::LinkError;
use rpi_net::fragment::{FragmentGraph, NodeId, PortId};
use rpi_net::runtime::{
    Behavior, LinkContext, Linker, Net, NotificationExecutor, PortIo, PrimitiveRegistry,
    PrimitiveSpec,
};

pub const COUNTER: &str = "Test::Counter";
pub const IDENTITY: &str = "Test::Identity";
pub const DEVICE_USER: &str = "Test::DeviceUser";
pub const FLAG: &str = "Test::Flag";
pub const FAKE_CLASS: &str = "fake";

/// Emits the cycle number on every `Every`-th cycle.
#[derive(Default)]
struct Counter {
    every: u64,
}

impl Behavior for Counter {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let every = ctx.param("Every").and_then(Value::as_i64).unwrap_or(1);
        if every < 1 {
            return Err(ctx.invalid("Every", "must be at least 1"));
        }
        self.every = every as u64;
        Ok(())
    }

    fn update_data(&mut self, io: &mut PortIo<'_>) {
        let cycle = io.info().cycle;
        if cycle % self.every == 0 {
            io.write(0, cycle as f64);
        }
    }
}

fn counter() -> Box<dyn Behavior> {
    Box::new(Counter::default())
}

/// Copies its input; absent in, absent out.
struct Identity;

impl Behavior for Identity {
    fn update_data(&mut self, io: &mut PortIo<'_>) {
        if let Some(value) = io.read(0).cloned() {
            io.write(0, value);
        }
    }
}

fn identity() -> Box<dyn Behavior> {
    Box::new(Identity)
}

/// Declares one sensor and one actuator device by name.
#[derive(Default)]
struct DeviceUser {
    sensors: Vec<DeviceHandle>,
    actuators: Vec<DeviceHandle>,
}

impl Behavior for DeviceUser {
    fn check_parameters(&mut self, ctx: &mut LinkContext<'_>) -> Result<(), LinkError> {
        let sensor = ctx.param_str("Sensor")?.to_string();
        let actuator = ctx.param_str("Actuator")?.to_string();
        if !sensor.is_empty() {
            self.sensors.push(ctx.device(&sensor, FAKE_CLASS)?);
        }
        if !actuator.is_empty() {
            self.actuators.push(ctx.device(&actuator, FAKE_CLASS)?);
        }
        Ok(())
    }

    fn update_data(&mut self, _io: &mut PortIo<'_>) {}

    fn sensors(&self) -> Vec<DeviceHandle> {
        self.sensors.clone()
    }

    fn actuators(&self) -> Vec<DeviceHandle> {
        self.actuators.clone()
    }
}

fn device_user() -> Box<dyn Behavior> {
    Box::new(DeviceUser::default())
}

/// Boolean source, used to provoke link-time type mismatches.
struct Flag;

impl Behavior for Flag {
    fn update_data(&mut self, io: &mut PortIo<'_>) {
        io.write(0, true);
    }
}

fn flag() -> Box<dyn Behavior> {
    Box::new(Flag)
}

pub fn registry() -> PrimitiveRegistry {
    let mut registry = PrimitiveRegistry::with_builtins();
    registry.register(
        PrimitiveSpec::new(COUNTER, counter)
            .output("outValue", ValueType::Double)
            .param_with_default("Every", ValueType::Int, 1i64),
    );
    registry.register(
        PrimitiveSpec::new(IDENTITY, identity)
            .input("inValue", ValueType::Any)
            .output("outValue", ValueType::Any),
    );
    registry.register(
        PrimitiveSpec::new(DEVICE_USER, device_user)
            .param_with_default("Sensor", ValueType::String, "")
            .param_with_default("Actuator", ValueType::String, ""),
    );
    registry.register(PrimitiveSpec::new(FLAG, flag).output("outFlag", ValueType::Bool));
    registry
}

pub fn executor() -> NotificationExecutor {
    NotificationExecutor::spawn("test-notify", 64).unwrap()
}

/// Add a primitive of a registered type.
pub fn add(
    registry: &PrimitiveRegistry,
    graph: &mut FragmentGraph,
    parent: NodeId,
    name: &str,
    type_name: &str,
) -> NodeId {
    registry
        .instantiate(graph, Some(parent), name, type_name)
        .expect("registered type")
        .expect("valid primitive")
}

pub fn out(graph: &FragmentGraph, node: NodeId, port: &str) -> PortId {
    graph.out_port(node, port).expect("out-port")
}

pub fn inp(graph: &FragmentGraph, node: NodeId, port: &str) -> PortId {
    graph.in_port(node, port).expect("in-port")
}

pub fn link(
    registry: &PrimitiveRegistry,
    graph: &FragmentGraph,
    root: NodeId,
    config: &EngineConfig,
    executor: &NotificationExecutor,
) -> Result<Net, LinkError> {
    let devices = DeviceMap::new();
    Linker::new(registry, &devices, config, executor.clone()).link(
        graph.node(root).name(),
        graph,
        root,
    )
}

/// Device recording every lock/unlock call into a shared log.
///
/// Entries are written while the device is held, so concurrent users
/// show up as strict `lock`/`unlock` pairs only if exclusion holds.
pub struct FakeDevice {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    lock: DeviceLock,
}

impl FakeDevice {
    pub fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> DeviceHandle {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            lock: DeviceLock::new(),
        })
    }
}

impl Device for FakeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_class(&self) -> &str {
        FAKE_CLASS
    }

    fn lock(&self) {
        self.lock.lock();
        self.log.lock().push(format!("{}:lock", self.name));
    }

    fn unlock(&self) {
        self.log.lock().push(format!("{}:unlock", self.name));
        self.lock.unlock();
    }
}

pub fn as_f64(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}
