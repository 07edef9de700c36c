//! Linked nets and their lifecycle.
//!
//! A [`Net`] is the flattened, executable form of one root fragment. The
//! scheduler calls [`Net::cycle`] once per control cycle; each call runs the
//! three phases strictly in order:
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ readSensor │ → │  updateData  │ → │ writeActuator │ → debug / netcomm / terminate
//! │ lock sens. │   │ cycle += 1   │   │ lock act.     │
//! └────────────┘   │ topo order   │   └───────────────┘
//!                  └──────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Ready → Running → {Cancelling, Terminated, Killed}`,
//! `Cancelling → {Terminated, Killed}`, any state `→ Unloaded`.
//! Status is derived from [`NetFlags`] plus the cycle counter; every flag
//! transition is notified to listeners exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use heapless::Vec as HVec;
use parking_lot::Mutex;
use rpi_common::consts::MAX_NET_DEVICES;
use rpi_common::device::DeviceHandle;
use rpi_common::value::Value;
use tracing::{debug, info, warn};

use crate::error::NetError;

use super::debug::DebugProbe;
use super::executor::NotificationExecutor;
use super::netcomm::{ChannelDirection, NetcommReporter, NetcommTable};
use super::port::{CycleInfo, InBinding, OutSlot, PortIo, SlotId};
use super::registry::Behavior;

bitflags! {
    /// Lifecycle flags of a net.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NetFlags: u8 {
        /// `cancel()` was requested.
        const CANCELLED = 1 << 0;
        /// `kill()` was requested; no further cycles run.
        const KILLED = 1 << 1;
        /// The terminate output read true.
        const COMPLETED = 1 << 2;
        /// The net was unloaded.
        const UNLOADED = 1 << 3;
    }
}

impl NetFlags {
    /// Flags after which the net never cycles again.
    pub const TERMINAL: Self = Self::KILLED.union(Self::COMPLETED).union(Self::UNLOADED);
}

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetStatus {
    /// Loaded, never cycled.
    Ready,
    /// Cycling.
    Running,
    /// Cancel requested, still cycling.
    Cancelling,
    /// Terminate output read true.
    Terminated,
    /// Stopped by `kill()`.
    Killed,
    /// Torn down.
    Unloaded,
}

impl NetStatus {
    /// Whether the net will never cycle again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated | Self::Killed | Self::Unloaded)
    }

    fn from_flags(flags: NetFlags, cycle: u64) -> Self {
        if flags.contains(NetFlags::UNLOADED) {
            Self::Unloaded
        } else if flags.contains(NetFlags::KILLED) {
            Self::Killed
        } else if flags.contains(NetFlags::COMPLETED) {
            Self::Terminated
        } else if flags.contains(NetFlags::CANCELLED) {
            Self::Cancelling
        } else if cycle > 0 {
            Self::Running
        } else {
            Self::Ready
        }
    }
}

impl fmt::Display for NetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Terminated => "terminated",
            Self::Killed => "killed",
            Self::Unloaded => "unloaded",
        };
        f.write_str(s)
    }
}

/// Observer of one net. Every callback runs on the notification executor.
pub trait NetListener: Send + Sync {
    /// An outbound netcomm channel changed.
    fn value_changed(&self, _net: &str, _key: &str, _value: &Value, _timestamp: f64) {}

    /// A netcomm batch was fully delivered.
    fn update_performed(&self, _net: &str) {}

    /// The net's status changed.
    fn status_changed(&self, _net: &str, _status: NetStatus) {}
}

/// State shared between a net and its handles.
pub struct NetControl {
    id: Arc<str>,
    flags: AtomicU8,
    cycle: AtomicU64,
    listeners: Mutex<Vec<Arc<dyn NetListener>>>,
    /// Status changes not yet accepted by the executor, oldest first.
    pending: Mutex<Vec<NetStatus>>,
    executor: NotificationExecutor,
    netcomm: NetcommTable,
}

impl fmt::Debug for NetControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetControl")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl NetControl {
    pub(crate) fn new(id: &str, executor: NotificationExecutor, netcomm: NetcommTable) -> Self {
        Self {
            id: Arc::from(id),
            flags: AtomicU8::new(0),
            cycle: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            executor,
            netcomm,
        }
    }

    /// Net id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn id_arc(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    pub(crate) fn executor(&self) -> &NotificationExecutor {
        &self.executor
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn NetListener>> {
        self.listeners.lock().clone()
    }

    /// Current flags.
    pub fn flags(&self) -> NetFlags {
        NetFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Current status.
    pub fn status(&self) -> NetStatus {
        NetStatus::from_flags(self.flags(), self.cycle.load(Ordering::Acquire))
    }

    pub(crate) fn publish_cycle(&self, cycle: u64) {
        self.cycle.store(cycle, Ordering::Release);
    }

    /// Set `flag` unless the net is already past it.
    ///
    /// Returns `true` only for the call that actually changed the status.
    /// Terminal nets accept nothing but `UNLOADED`.
    pub(crate) fn set_flag(&self, flag: NetFlags) -> bool {
        let result = self
            .flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = NetFlags::from_bits_truncate(bits);
                let blocked = if flag == NetFlags::UNLOADED {
                    NetFlags::UNLOADED
                } else {
                    NetFlags::TERMINAL
                };
                if current.intersects(blocked) || current.contains(flag) {
                    None
                } else {
                    Some((current | flag).bits())
                }
            });
        if result.is_ok() {
            let status = self.status();
            debug!(net = %self.id, %status, "net status changed");
            self.notify_status(status);
        }
        result.is_ok()
    }

    pub(crate) fn notify_status(&self, status: NetStatus) {
        self.pending.lock().push(status);
        self.flush_statuses();
    }

    /// Hand pending status changes to the executor as one job.
    ///
    /// A full queue keeps them pending for the next attempt, so no change is
    /// ever lost or delivered twice. Returns `true` if a job was queued.
    pub(crate) fn flush_statuses(&self) -> bool {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return false;
        }
        let listeners = self.listeners();
        if listeners.is_empty() {
            pending.clear();
            return false;
        }
        let batch = pending.clone();
        let net = self.id_arc();
        let queued = self.executor.submit(move || {
            for status in batch {
                for listener in &listeners {
                    listener.status_changed(&net, status);
                }
            }
        });
        if queued {
            pending.clear();
        } else {
            warn!(net = %self.id, pending = pending.len(), "status notification deferred");
        }
        queued
    }
}

/// Cloneable remote control of a loaded net, usable from any thread.
#[derive(Debug, Clone)]
pub struct NetHandle {
    control: Arc<NetControl>,
}

impl NetHandle {
    /// Net id.
    pub fn id(&self) -> &str {
        self.control.id()
    }

    /// Current status.
    pub fn status(&self) -> NetStatus {
        self.control.status()
    }

    /// Request a cooperative stop: `Core::Cancel` outputs switch to true.
    ///
    /// Returns `true` if this call changed the status.
    pub fn cancel(&self) -> bool {
        self.control.set_flag(NetFlags::CANCELLED)
    }

    /// Stop the net before its next cycle.
    ///
    /// Returns `true` if this call changed the status.
    pub fn kill(&self) -> bool {
        self.control.set_flag(NetFlags::KILLED)
    }

    /// Register a listener.
    pub fn add_listener(&self, listener: Arc<dyn NetListener>) {
        self.control.listeners.lock().push(listener);
    }

    /// Write the string-encoded `value` to inbound channel `key`.
    ///
    /// # Errors
    /// `UnknownChannel`, `WrongDirection` for outbound channels,
    /// `ChannelKilled` after unload, `Value` if the encoding does not parse.
    pub fn write_netcomm(&self, key: &str, value: &str, timestamp: f64) -> Result<(), NetError> {
        let channel = self
            .control
            .netcomm
            .get(key)
            .ok_or_else(|| NetError::UnknownChannel(key.to_string()))?;
        if channel.direction() != ChannelDirection::Inbound {
            return Err(NetError::WrongDirection(key.to_string()));
        }
        channel.write_encoded(value, timestamp)
    }

    /// Latest value and timestamp of channel `key`.
    pub fn read_netcomm(&self, key: &str) -> Result<Option<(Value, f64)>, NetError> {
        self.control
            .netcomm
            .get(key)
            .map(|c| c.latest())
            .ok_or_else(|| NetError::UnknownChannel(key.to_string()))
    }

    /// Block until every notification queued so far was delivered,
    /// including status changes deferred by a full queue.
    pub fn flush_notifications(&self) {
        self.control.flush_statuses();
        self.control.executor.flush();
        if self.control.flush_statuses() {
            self.control.executor.flush();
        }
    }
}

/// One linked primitive.
pub(crate) struct PrimitiveInstance {
    pub(crate) path: String,
    pub(crate) behavior: Box<dyn Behavior>,
    pub(crate) inputs: Vec<InBinding>,
    pub(crate) outputs: Vec<SlotId>,
}

/// Link output consumed by [`Net::new`].
pub(crate) struct NetParts {
    pub(crate) id: String,
    pub(crate) slots: Vec<OutSlot>,
    pub(crate) primitives: Vec<PrimitiveInstance>,
    pub(crate) order: Vec<usize>,
    pub(crate) sensors: HVec<DeviceHandle, MAX_NET_DEVICES>,
    pub(crate) actuators: HVec<DeviceHandle, MAX_NET_DEVICES>,
    pub(crate) probes: Vec<DebugProbe>,
    pub(crate) outputs: HashMap<String, SlotId>,
    pub(crate) terminate: Option<SlotId>,
    pub(crate) netcomm: NetcommTable,
    pub(crate) cycle_time: f64,
    pub(crate) report_interval: f64,
    pub(crate) executor: NotificationExecutor,
}

/// Executable net.
pub struct Net {
    slots: Vec<OutSlot>,
    primitives: Vec<PrimitiveInstance>,
    order: Vec<usize>,
    sensors: HVec<DeviceHandle, MAX_NET_DEVICES>,
    actuators: HVec<DeviceHandle, MAX_NET_DEVICES>,
    probes: Vec<DebugProbe>,
    outputs: HashMap<String, SlotId>,
    terminate: Option<SlotId>,
    netcomm: NetcommTable,
    reporter: NetcommReporter,
    control: Arc<NetControl>,
    cycle: u64,
    time: f64,
    cycle_time: f64,
    finished: bool,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("id", &self.id())
            .field("primitives", &self.primitives.len())
            .field("cycle", &self.cycle)
            .field("status", &self.status())
            .finish()
    }
}

impl Net {
    pub(crate) fn new(parts: NetParts) -> Self {
        let reporter = NetcommReporter::new(&parts.netcomm, parts.report_interval);
        let control = Arc::new(NetControl::new(
            &parts.id,
            parts.executor,
            parts.netcomm.clone(),
        ));
        Self {
            slots: parts.slots,
            primitives: parts.primitives,
            order: parts.order,
            sensors: parts.sensors,
            actuators: parts.actuators,
            probes: parts.probes,
            outputs: parts.outputs,
            terminate: parts.terminate,
            netcomm: parts.netcomm,
            reporter,
            control,
            cycle: 0,
            time: 0.0,
            cycle_time: parts.cycle_time,
            finished: false,
        }
    }

    /// Net id.
    pub fn id(&self) -> &str {
        self.control.id()
    }

    /// Remote control handle.
    pub fn handle(&self) -> NetHandle {
        NetHandle {
            control: Arc::clone(&self.control),
        }
    }

    /// Current status.
    pub fn status(&self) -> NetStatus {
        self.control.status()
    }

    /// Completed cycles.
    pub fn cycle_count(&self) -> u64 {
        self.cycle
    }

    /// Logical net time [s] of the last cycle.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Netcomm channels of this net.
    pub fn netcomm(&self) -> &NetcommTable {
        &self.netcomm
    }

    /// Number of linked primitives.
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// Primitive paths in update order.
    pub fn update_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|i| self.primitives[*i].path.as_str())
            .collect()
    }

    /// Names of the sensor and actuator devices, in locking order.
    pub fn devices(&self) -> (Vec<&str>, Vec<&str>) {
        (
            self.sensors.iter().map(|d| d.name()).collect(),
            self.actuators.iter().map(|d| d.name()).collect(),
        )
    }

    /// Value of root boundary out-port `name` in the current cycle.
    pub fn output(&self, name: &str) -> Option<&Value> {
        let slot = self.outputs.get(name)?;
        self.slots[slot.0].fresh(self.cycle)
    }

    /// Debug probe sampling in-port `port` (`root/prim.port`).
    pub fn probe(&self, port: &str) -> Option<&DebugProbe> {
        self.probes.iter().find(|p| p.port() == port)
    }

    /// Whether the net will never cycle again.
    pub fn is_terminal(&self) -> bool {
        self.control.flags().intersects(NetFlags::TERMINAL)
    }

    fn info(&self) -> CycleInfo {
        CycleInfo {
            cycle: self.cycle,
            time: self.time,
            cycle_time: self.cycle_time,
            cancel_requested: self.control.flags().contains(NetFlags::CANCELLED),
        }
    }

    /// Run one control cycle at wall-clock time `wall` [s].
    ///
    /// Does nothing once the net is terminal, except delivering the final
    /// netcomm report on the first call after a kill.
    pub fn cycle(&mut self, wall: f64) {
        self.control.flush_statuses();
        if self.is_terminal() {
            self.finish();
            return;
        }
        if self.cycle == 0 {
            info!(net = self.id(), primitives = self.primitives.len(), "net started");
        }

        // ═══ READ SENSOR ═══
        for device in &self.sensors {
            device.lock();
        }
        let info = self.info();
        for prim in &mut self.primitives {
            let mut io = PortIo::new(&mut self.slots, &prim.inputs, &prim.outputs, info);
            prim.behavior.read_sensor(&mut io);
        }
        for device in self.sensors.iter().rev() {
            device.unlock();
        }

        // ═══ UPDATE DATA ═══
        self.cycle += 1;
        self.time = if self.cycle == 1 {
            wall
        } else {
            self.time + self.cycle_time
        };
        self.control.publish_cycle(self.cycle);
        if self.cycle == 1 && self.control.status() == NetStatus::Running {
            debug!(net = self.id(), "net status changed: running");
            self.control.notify_status(NetStatus::Running);
        }
        let info = self.info();
        for idx in &self.order {
            let prim = &mut self.primitives[*idx];
            let mut io = PortIo::new(&mut self.slots, &prim.inputs, &prim.outputs, info);
            prim.behavior.update_data(&mut io);
        }

        // ═══ WRITE ACTUATOR ═══
        for device in &self.actuators {
            device.lock();
        }
        for prim in &mut self.primitives {
            let mut io = PortIo::new(&mut self.slots, &prim.inputs, &prim.outputs, info);
            prim.behavior.write_actuator(&mut io);
        }
        for device in self.actuators.iter().rev() {
            device.unlock();
        }

        for probe in &mut self.probes {
            probe.sample(&self.slots, self.cycle, self.time);
        }

        let terminate = self
            .terminate
            .and_then(|s| self.slots[s.0].fresh(self.cycle))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if terminate && self.control.set_flag(NetFlags::COMPLETED) {
            info!(net = self.id(), cycles = self.cycle, "net terminated");
            self.finish();
        } else {
            self.reporter.poll(self.time, &self.control, false);
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.reporter.poll(self.time, &self.control, true);
        }
    }

    /// Tear the net down: kill its channels, sever every binding and notify
    /// `Unloaded`. Returns `false` if the net was already unloaded.
    pub fn unload(&mut self) -> bool {
        if !self.control.set_flag(NetFlags::UNLOADED) {
            return false;
        }
        self.finished = true;
        self.netcomm.kill_all();
        for prim in &mut self.primitives {
            prim.inputs.clear();
            prim.outputs.clear();
        }
        self.probes.clear();
        self.outputs.clear();
        self.terminate = None;
        self.slots.clear();
        info!(net = self.id(), "net unloaded");
        true
    }
}
