//! GPU memory placement auto-tuner.
//!
//! Interposes on accelerator allocation calls (`allocate`/`release`) and
//! decides, for each allocation site, whether its buffer should live in
//! device-global or device-mapped pinned host memory. Placement is found
//! by repeatedly re-running the host program's compute loop under
//! different assignments and measuring wall-clock time; the winning
//! assignment persists to a plan file and is replayed on subsequent runs
//! without further search.
//!
//! The `driver` module is the only seam a production embedder must fill
//! in: a concrete [`driver::Driver`] that calls into the real accelerator
//! API. Everything else — [`context`], [`plan`], [`interposer`],
//! [`tuner`], [`session`] — is the tuning core.

pub mod context;
pub mod driver;
pub mod error;
pub mod interposer;
pub mod plan;
pub mod session;
pub mod tuner;

#[cfg(test)]
mod test_support;

pub use context::{Context, ContextRegistry, OpMode};
pub use driver::{ContextHandle, DeviceHandle, DevicePtr, Driver, HostAllocFlags, HostPtr, NullDriver};
pub use error::{fatal, DriverError, PlanIoError, TuneError};
pub use interposer::{allocate, place_entry, release};
pub use plan::{KnobId, Location, Plan, PlanEntry};
pub use session::{plan_exists, session_end, session_start};
pub use tuner::{Tuner, TunerKind};
