//! System-wide constants.

/// Default control cycle time in microseconds (1ms).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Smallest accepted cycle time in microseconds.
pub const MIN_CYCLE_TIME_US: u32 = 50;

/// Default minimum interval between two netcomm report batches [µs].
pub const DEFAULT_NETCOMM_REPORT_INTERVAL_US: u32 = 20_000;

/// Default capacity of a notification executor queue.
pub const DEFAULT_NOTIFICATION_QUEUE_CAPACITY: usize = 256;

/// Upper bound on the samples one history or debug buffer may keep.
pub const MAX_HISTORY_SAMPLES: usize = 1_000_000;

/// Maximum number of distinct devices a single net may lock.
pub const MAX_NET_DEVICES: usize = 16;

/// Name of the root boundary OutPort that ends a net when it reads `true`.
pub const TERMINATE_PORT: &str = "terminate";

/// Accepted SCHED_FIFO priority range.
pub const RT_PRIORITY_RANGE: core::ops::RangeInclusive<i32> = 1..=99;

/// Highest CPU index a cycle thread may be pinned to (`CPU_SETSIZE - 1`).
pub const MAX_RT_CPU_CORE: usize = 1023;
