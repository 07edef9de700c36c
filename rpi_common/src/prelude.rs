//! Prelude module for common re-exports.
//!
//! ```rust
//! use rpi_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, EngineConfig, LogLevel, RccConfig, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, MAX_NET_DEVICES, TERMINATE_PORT};

// ─── Devices ────────────────────────────────────────────────────────
pub use crate::device::{Device, DeviceHandle, DeviceLock, DeviceMap, DeviceRegistry};

// ─── Values ─────────────────────────────────────────────────────────
pub use crate::value::{Value, ValueError, ValueType};
