//! Net scheduler: owns loaded nets and drives their cycles.
//!
//! One scheduler thread ticks every started net once per control cycle, in
//! net-id order. Successors start on the tick after their predecessor
//! terminates, so a chained hand-off has no idle cycle.
//!
//! ## Deadline Policy
//! [`Scheduler::run`] paces ticks on absolute deadlines
//! (`start + k · cycle_time`), so sleep jitter never accumulates. A tick
//! that ends after its deadline counts as an overrun. When the loop falls
//! more than one full cycle behind it resynchronizes to "now" instead of
//! bursting missed ticks; net logical time is unaffected either way.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rpi_common::config::EngineConfig;
use tracing::{info, warn};

use crate::error::NetError;

use super::executor::NotificationExecutor;
use super::net::{Net, NetHandle, NetStatus};
use super::netcomm::NetcommTable;

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics.
///
/// Updated every tick with no allocation. Provides min/max/avg for tick
/// latency monitoring and overrun detection.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total ticks executed.
    pub cycle_count: u64,
    /// Last tick duration [ns].
    pub last_cycle_ns: i64,
    /// Minimum tick duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum tick duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Number of overruns detected.
    pub overruns: u64,
    /// Maximum wake-up latency [ns] (time between deadline and actual wake).
    pub max_latency_ns: i64,
}

impl CycleStats {
    /// Create a new zeroed stats instance.
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            last_cycle_ns: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
            max_latency_ns: 0,
        }
    }

    /// Record a tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: i64, latency_ns: i64) {
        self.cycle_count += 1;
        self.last_cycle_ns = duration_ns;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns += duration_ns;
        self.max_latency_ns = self.max_latency_ns.max(latency_ns);
    }

    /// Average tick time [ns] (returns 0 if no ticks).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall-clock time [s since the Unix epoch].
pub fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ─── Scheduler ──────────────────────────────────────────────────────

struct Entry {
    net: Net,
    active: bool,
    successor: Option<String>,
}

/// Owner of all loaded nets.
pub struct Scheduler {
    config: EngineConfig,
    executor: NotificationExecutor,
    nets: BTreeMap<String, Entry>,
    stats: CycleStats,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new(config: EngineConfig, executor: NotificationExecutor) -> Self {
        Self {
            config,
            executor,
            nets: BTreeMap::new(),
            stats: CycleStats::new(),
        }
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executor shared by the nets of this scheduler.
    pub fn executor(&self) -> &NotificationExecutor {
        &self.executor
    }

    /// Tick statistics of [`run`](Self::run).
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// Take ownership of a linked net. It does not cycle until started.
    ///
    /// # Errors
    /// `DuplicateNet` if a net with the same id is loaded.
    pub fn load(&mut self, net: Net) -> Result<NetHandle, NetError> {
        let id = net.id().to_string();
        if self.nets.contains_key(&id) {
            return Err(NetError::DuplicateNet(id));
        }
        let handle = net.handle();
        info!(net = %id, primitives = net.primitive_count(), "net loaded");
        self.nets.insert(
            id,
            Entry {
                net,
                active: false,
                successor: None,
            },
        );
        Ok(handle)
    }

    /// Cycle net `id` from the next tick on.
    pub fn start(&mut self, id: &str) -> Result<(), NetError> {
        let entry = self.entry_mut(id)?;
        let status = entry.net.status();
        if status.is_terminal() {
            return Err(NetError::InvalidState {
                net: id.to_string(),
                status: status.to_string(),
            });
        }
        entry.active = true;
        Ok(())
    }

    /// Start `successor` on the tick after `predecessor` terminates.
    ///
    /// A killed predecessor does not start its successor.
    pub fn set_successor(&mut self, predecessor: &str, successor: &str) -> Result<(), NetError> {
        if !self.nets.contains_key(successor) {
            return Err(NetError::UnknownNet(successor.to_string()));
        }
        self.entry_mut(predecessor)?.successor = Some(successor.to_string());
        Ok(())
    }

    /// Run one control cycle of every started net at wall time `wall` [s].
    pub fn tick(&mut self, wall: f64) {
        let mut finished = Vec::new();
        for (id, entry) in self.nets.iter_mut() {
            if !entry.active {
                continue;
            }
            entry.net.cycle(wall);
            if entry.net.is_terminal() {
                entry.active = false;
                finished.push((entry.net.status(), entry.successor.clone(), id.clone()));
            }
        }
        for (status, successor, id) in finished {
            let Some(next) = successor else { continue };
            if status != NetStatus::Terminated {
                info!(net = %id, successor = %next, %status, "successor not started");
                continue;
            }
            if let Some(entry) = self.nets.get_mut(&next) {
                if !entry.net.is_terminal() {
                    info!(net = %id, successor = %next, "starting successor");
                    entry.active = true;
                }
            }
        }
    }

    /// Remote control handle of net `id`.
    pub fn handle(&self, id: &str) -> Option<NetHandle> {
        self.nets.get(id).map(|e| e.net.handle())
    }

    /// Loaded net `id`.
    pub fn net(&self, id: &str) -> Option<&Net> {
        self.nets.get(id).map(|e| &e.net)
    }

    /// Loaded net ids, sorted.
    pub fn net_ids(&self) -> Vec<&str> {
        self.nets.keys().map(String::as_str).collect()
    }

    /// Tear down net `id` and forget it.
    ///
    /// # Errors
    /// `InvalidState` while the net is running or cancelling.
    pub fn unload(&mut self, id: &str) -> Result<(), NetError> {
        let status = self.entry_mut(id)?.net.status();
        if matches!(status, NetStatus::Running | NetStatus::Cancelling) {
            return Err(NetError::InvalidState {
                net: id.to_string(),
                status: status.to_string(),
            });
        }
        if let Some(mut entry) = self.nets.remove(id) {
            entry.net.unload();
        }
        for entry in self.nets.values_mut() {
            if entry.successor.as_deref() == Some(id) {
                entry.successor = None;
            }
        }
        Ok(())
    }

    /// Netcomm tables of all loaded nets, for linking successors.
    pub fn netcomm_tables(&self) -> HashMap<String, NetcommTable> {
        self.nets
            .iter()
            .map(|(id, e)| (id.clone(), e.net.netcomm().clone()))
            .collect()
    }

    /// Whether no started net is still cycling.
    pub fn is_idle(&self) -> bool {
        !self.nets.values().any(|e| e.active)
    }

    /// Tick at the configured cycle time until `running` is cleared or
    /// every net is finished.
    pub fn run(&mut self, running: &AtomicBool) {
        let cycle = self.config.cycle_time();
        let cycle_ns = cycle.as_nanos() as i64;
        let mut deadline = Instant::now();

        while running.load(Ordering::Acquire) && !self.is_idle() {
            let scheduled = deadline;
            let start = Instant::now();
            let latency_ns = start.saturating_duration_since(scheduled).as_nanos() as i64;
            self.tick(wall_clock());
            let duration_ns = start.elapsed().as_nanos() as i64;
            self.stats.record(duration_ns, latency_ns);

            let now = Instant::now();
            if now > scheduled + cycle {
                self.stats.overruns += 1;
                warn!(
                    duration_us = duration_ns / 1000,
                    budget_us = cycle_ns / 1000,
                    overruns = self.stats.overruns,
                    "cycle overrun"
                );
            }
            deadline = next_deadline(scheduled, cycle, now);
            if deadline > now {
                std::thread::sleep(deadline - now);
            }
        }
        info!(
            ticks = self.stats.cycle_count,
            avg_us = self.stats.avg_cycle_ns() / 1000,
            max_us = self.stats.max_cycle_ns / 1000,
            overruns = self.stats.overruns,
            "scheduler loop stopped"
        );
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry, NetError> {
        self.nets
            .get_mut(id)
            .ok_or_else(|| NetError::UnknownNet(id.to_string()))
    }
}

/// Absolute deadline following `previous`, resynchronized to `now` when
/// the loop is more than one cycle behind.
pub fn next_deadline(previous: Instant, cycle: Duration, now: Instant) -> Instant {
    let next = previous + cycle;
    if now > next && now - next > cycle {
        now
    } else {
        next
    }
}
