//! Real-time placement of the cycle thread.
//!
//! [`RtPlan`] turns the `[rt]` config section into the steps to take on
//! the thread that enters [`Scheduler::run`](rpi_net::runtime::Scheduler::run).
//! Without the `rt` feature the plan is logged but nothing is applied.

use rpi_common::config::RtConfig;
use tracing::{debug, info};

use crate::error::RccError;

/// One setup action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtStep {
    /// `mlockall(MCL_CURRENT | MCL_FUTURE)`.
    LockMemory,
    /// Restrict the calling thread to one CPU.
    PinCpu(usize),
    /// Switch the calling thread to SCHED_FIFO.
    Fifo(i32),
}

/// Ordered setup steps for the cycle thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtPlan {
    steps: Vec<RtStep>,
}

impl RtPlan {
    /// Steps requested by `config`. Memory is locked before the thread is
    /// moved, so page faults are taken at normal priority.
    pub fn new(config: &RtConfig) -> Self {
        let steps = config
            .lock_memory
            .then_some(RtStep::LockMemory)
            .into_iter()
            .chain(config.cpu_core.map(RtStep::PinCpu))
            .chain(config.priority.map(RtStep::Fifo))
            .collect();
        Self { steps }
    }

    /// Planned steps, in application order.
    pub fn steps(&self) -> &[RtStep] {
        &self.steps
    }

    /// Apply every step on the calling thread, stopping at the first failure.
    ///
    /// # Errors
    /// `RccError::RtSetup` naming the failed step.
    pub fn apply(&self) -> Result<(), RccError> {
        for step in &self.steps {
            step.apply()?;
            debug!(?step, applied = cfg!(feature = "rt"), "rt step");
        }
        info!(steps = self.steps.len(), enforced = cfg!(feature = "rt"), "rt setup complete");
        Ok(())
    }
}

impl RtStep {
    #[cfg(feature = "rt")]
    fn apply(self) -> Result<(), RccError> {
        use nix::sched::{sched_setaffinity, CpuSet};
        use nix::sys::mman::{mlockall, MlockallFlags};
        use nix::unistd::Pid;

        let fail = |e: String| RccError::RtSetup(format!("{self:?}: {e}"));
        match self {
            Self::LockMemory => {
                mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE).map_err(|e| fail(e.to_string()))
            }
            Self::PinCpu(core) => {
                let mut set = CpuSet::new();
                set.set(core).map_err(|e| fail(e.to_string()))?;
                sched_setaffinity(Pid::from_raw(0), &set).map_err(|e| fail(e.to_string()))
            }
            Self::Fifo(priority) => {
                let param = libc::sched_param {
                    sched_priority: priority,
                };
                // SAFETY: `param` outlives the call; pid 0 is the calling thread.
                match unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } {
                    0 => Ok(()),
                    _ => Err(fail(std::io::Error::last_os_error().to_string())),
                }
            }
        }
    }

    #[cfg(not(feature = "rt"))]
    fn apply(self) -> Result<(), RccError> {
        Ok(())
    }
}
