//! RPI Common Library
//!
//! Shared building blocks for the primitive-net workspace: the value model
//! carried by ports, parameters and netcomm channels, the device contract
//! used for per-phase hardware locking, and configuration loading.
//!
//! # Module Structure
//!
//! - [`value`] - Port/parameter values and their string encoding
//! - [`device`] - Device trait, registry and explicit lock helper
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide constants
//! - [`prelude`] - Common re-exports for convenience

pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;
pub mod value;
