//! Simulated devices created from configuration.
//!
//! Each configured `[[devices]]` entry becomes a [`SimDevice`]: a named
//! device of the given class whose `lock()` / `unlock()` are backed by a
//! [`DeviceLock`]. Leaf primitives look them up by name and class at link
//! time; the engine brackets the sensor and actuator phases with them.

use std::sync::Arc;

use rpi_common::config::DeviceConfig;
use rpi_common::device::{Device, DeviceLock, DeviceMap};
use tracing::debug;

use crate::error::RccError;

/// In-process device without hardware behind it.
#[derive(Debug)]
pub struct SimDevice {
    name: String,
    class: String,
    lock: DeviceLock,
}

impl SimDevice {
    /// Create an unlocked device.
    pub fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            lock: DeviceLock::new(),
        }
    }

    /// Whether a phase currently holds the device.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn device_class(&self) -> &str {
        &self.class
    }

    fn lock(&self) {
        self.lock.lock();
    }

    fn unlock(&self) {
        self.lock.unlock();
    }
}

/// Build the device table from configuration.
///
/// # Errors
/// `Device` if two entries share a name.
pub fn build_devices(configs: &[DeviceConfig]) -> Result<DeviceMap, RccError> {
    let mut devices = DeviceMap::new();
    for config in configs {
        devices.register(Arc::new(SimDevice::new(&config.name, &config.class)))?;
        debug!(device = %config.name, class = %config.class, "device registered");
    }
    Ok(devices)
}
