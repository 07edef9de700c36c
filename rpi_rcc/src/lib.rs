//! # RPI Control Core Library
//!
//! Hosts primitive nets on a real-time thread: builds the device table from
//! configuration, loads serialized nets (optionally as a successor chain)
//! and drives them through the [`Scheduler`](rpi_net::Scheduler).
//!
//! ## Module Structure
//!
//! - [`device`] - Simulated devices from `[[devices]]` config entries
//! - [`loader`] - Net file parsing, linking and chaining
//! - [`rt`] - Memory locking, CPU pinning and SCHED_FIFO
//! - [`error`] - Error types

pub mod device;
pub mod error;
pub mod loader;
pub mod rt;

pub use error::RccError;
