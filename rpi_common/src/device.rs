//! Device contract shared by primitives and the engine.
//!
//! Hardware devices are the only resource shared across nets. A device
//! exposes explicit `lock()` / `unlock()` calls which the engine brackets
//! around the sensor-read and actuator-write phases. Device implementations
//! typically embed a [`DeviceLock`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Device registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// A device with the same name is already registered.
    #[error("device '{0}' is already registered")]
    Duplicate(String),
}

/// A hardware device (or a simulation of one).
///
/// # Timing Contracts
///
/// | Operation | RT Constraint |
/// |-----------|---------------|
/// | `lock()` | May block until the holder unlocks; holders never keep it across phases |
/// | `unlock()` | **HARD**, must not block |
pub trait Device: Send + Sync {
    /// Unique device name (e.g. "lwr", "gripper").
    fn name(&self) -> &str;

    /// Device class (e.g. "robotarm", "io").
    fn device_class(&self) -> &str;

    /// Acquire exclusive access for one phase.
    fn lock(&self);

    /// Release exclusive access.
    fn unlock(&self);
}

impl fmt::Debug for dyn Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .field("class", &self.device_class())
            .finish()
    }
}

/// Shared device handle.
pub type DeviceHandle = Arc<dyn Device>;

/// Lookup seam used by the linker to resolve device parameters.
pub trait DeviceRegistry {
    /// Find the device `name` of class `device_class`.
    fn lookup(&self, name: &str, device_class: &str) -> Option<DeviceHandle>;
}

/// Name-keyed device registry.
///
/// Built at startup and handed to the linker by reference.
#[derive(Debug, Default)]
pub struct DeviceMap {
    devices: HashMap<String, DeviceHandle>,
}

impl DeviceMap {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under its own name.
    ///
    /// # Errors
    /// Returns `DeviceError::Duplicate` if the name is already taken.
    pub fn register(&mut self, device: DeviceHandle) -> Result<(), DeviceError> {
        let name = device.name().to_string();
        if self.devices.contains_key(&name) {
            return Err(DeviceError::Duplicate(name));
        }
        self.devices.insert(name, device);
        Ok(())
    }

    /// Registered device names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.devices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceRegistry for DeviceMap {
    fn lookup(&self, name: &str, device_class: &str) -> Option<DeviceHandle> {
        self.devices
            .get(name)
            .filter(|d| d.device_class() == device_class)
            .cloned()
    }
}

/// Explicit lock/unlock mutual exclusion for device implementations.
///
/// Unlike a guard-based mutex, acquisition and release are separate calls,
/// matching the engine's per-phase bracketing.
#[derive(Debug, Default)]
pub struct DeviceLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl DeviceLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it.
    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    /// Release the lock and wake one waiter.
    pub fn unlock(&self) {
        *self.locked.lock() = false;
        self.released.notify_one();
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}
