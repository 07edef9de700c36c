//! Linked nets and their cyclic execution.
//!
//! The [`Linker`](linker::Linker) turns a well-scoped fragment tree into a
//! [`Net`](net::Net): a flat, topologically ordered set of primitive
//! instances bound to a value slot arena. The [`Scheduler`](scheduler::Scheduler)
//! drives loaded nets through the three-phase cycle and hands completed
//! nets over to their successors.

pub mod debug;
pub mod executor;
pub mod linker;
pub mod net;
pub mod netcomm;
pub mod port;
pub mod registry;
pub mod scheduler;

pub use executor::NotificationExecutor;
pub use linker::{LinkContext, Linker};
pub use net::{Net, NetFlags, NetHandle, NetListener, NetStatus};
pub use netcomm::{ChannelDirection, NetcommChannel, NetcommTable};
pub use port::{CycleInfo, PortIo};
pub use registry::{Behavior, PrimitiveRegistry, PrimitiveSpec};
pub use scheduler::{CycleStats, Scheduler};
