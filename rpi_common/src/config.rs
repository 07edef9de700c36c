//! TOML configuration for the control core.
//!
//! [`RccConfig`] bundles the shared service settings, the cycle engine
//! parameters, the real-time placement of the cycle thread and the devices
//! to register. Any deserializable type can be
//! read through [`ConfigLoader`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use rpi_common::config::{ConfigError, ConfigLoader, RccConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = RccConfig::load(Path::new("rcc.toml"))?;
//!     config.validate()?;
//!     println!("Cycle time: {}us", config.engine.cycle_time_us);
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
    DEFAULT_CYCLE_TIME_US, DEFAULT_NETCOMM_REPORT_INTERVAL_US,
    DEFAULT_NOTIFICATION_QUEUE_CAPACITY, MAX_RT_CPU_CORE, MIN_CYCLE_TIME_US, RT_PRIORITY_RANGE,
};

/// Why a configuration could not be used.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Nothing at the given path.
    #[error("config file does not exist")]
    FileNotFound,

    /// Unreadable file or malformed TOML.
    #[error("cannot parse config: {0}")]
    ParseError(String),

    /// Parsed, but the values are inconsistent.
    #[error("invalid config: {0}")]
    ValidationError(String),
}

/// Default tracing level, written in lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-cycle detail.
    Trace,
    /// Status transitions and netcomm batches.
    Debug,
    /// Load, start and unload of nets.
    #[default]
    Info,
    /// Overruns and dropped notification batches.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "rcc-sim-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Level used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Name reported in logs.
    pub service_name: String,
}

impl SharedConfig {
    /// Rejects an empty `service_name`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError("service_name is empty".into()));
        }
        Ok(())
    }
}

/// Cyclic engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fixed control cycle time [µs]. Logical net time advances by exactly
    /// this amount per cycle.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,

    /// Minimum interval between netcomm report batches [µs].
    #[serde(default = "default_report_interval_us")]
    pub netcomm_report_interval_us: u32,

    /// Capacity of each notification executor queue.
    #[serde(default = "default_queue_capacity")]
    pub notification_queue_capacity: usize,
}

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_report_interval_us() -> u32 {
    DEFAULT_NETCOMM_REPORT_INTERVAL_US
}

fn default_queue_capacity() -> usize {
    DEFAULT_NOTIFICATION_QUEUE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            netcomm_report_interval_us: DEFAULT_NETCOMM_REPORT_INTERVAL_US,
            notification_queue_capacity: DEFAULT_NOTIFICATION_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Cycle time as `Duration`.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us as u64)
    }

    /// Cycle time in seconds, the unit of logical net time.
    pub fn cycle_time_secs(&self) -> f64 {
        self.cycle_time_us as f64 * 1e-6
    }

    /// Report interval in seconds.
    pub fn report_interval_secs(&self) -> f64 {
        self.netcomm_report_interval_us as f64 * 1e-6
    }

    /// Validate bounds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the cycle time is below
    /// `MIN_CYCLE_TIME_US` or the queue capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_time_us < MIN_CYCLE_TIME_US {
            return Err(ConfigError::ValidationError(format!(
                "cycle_time_us must be >= {MIN_CYCLE_TIME_US}, got {}",
                self.cycle_time_us
            )));
        }
        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "notification_queue_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Real-time placement of the cycle thread.
///
/// Unset fields leave the OS defaults in place. Only applied in builds
/// with the `rt` feature.
///
/// # TOML Example
///
/// ```toml
/// [rt]
/// cpu_core = 1
/// priority = 80
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RtConfig {
    /// Lock current and future pages into RAM before cycling.
    #[serde(default = "default_lock_memory")]
    pub lock_memory: bool,

    /// CPU the cycle thread is pinned to.
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// SCHED_FIFO priority of the cycle thread.
    #[serde(default)]
    pub priority: Option<i32>,
}

fn default_lock_memory() -> bool {
    true
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            lock_memory: true,
            cpu_core: None,
            priority: None,
        }
    }
}

impl RtConfig {
    /// Rejects CPUs beyond `MAX_RT_CPU_CORE` and priorities outside
    /// `RT_PRIORITY_RANGE`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(core) = self.cpu_core.filter(|c| *c > MAX_RT_CPU_CORE) {
            return Err(ConfigError::ValidationError(format!(
                "cpu_core must be <= {MAX_RT_CPU_CORE}, got {core}"
            )));
        }
        if let Some(priority) = self.priority.filter(|p| !RT_PRIORITY_RANGE.contains(p)) {
            return Err(ConfigError::ValidationError(format!(
                "priority must be in {}..={}, got {priority}",
                RT_PRIORITY_RANGE.start(),
                RT_PRIORITY_RANGE.end()
            )));
        }
        Ok(())
    }
}

/// A device the control core exposes to nets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Unique device name.
    pub name: String,
    /// Device class, matched by primitives at link time.
    pub class: String,
}

/// Complete control core configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "rcc"
///
/// [engine]
/// cycle_time_us = 2000
///
/// [rt]
/// priority = 80
///
/// [[devices]]
/// name = "arm"
/// class = "robotarm"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RccConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Cycle thread placement.
    #[serde(default)]
    pub rt: RtConfig,
    /// Devices to create at startup.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl RccConfig {
    /// Validate all sections, including device name uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.engine.validate()?;
        self.rt.validate()?;
        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "device name cannot be empty".to_string(),
                ));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate device name: {}",
                    device.name
                )));
            }
        }
        Ok(())
    }
}

/// Reads any deserializable type from a TOML file.
///
/// A missing file is [`ConfigError::FileNotFound`]; read and syntax
/// failures are [`ConfigError::ParseError`].
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::FileNotFound),
            Err(e) => Err(ConfigError::ParseError(e.to_string())),
        }
    }

    /// Same as [`ConfigLoader::load`] for in-memory TOML.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
