//! Error types for the tuning core.
//!
//! Per the propagation policy: a driver allocation failure is recoverable
//! locally inside [`crate::interposer::place_entry`] (it falls back from
//! device to pinned host memory). Every other variant here is fatal — the
//! public entry points in [`crate::interposer`] and [`crate::session`] log
//! it and abort the process rather than let the caller continue against an
//! inconsistent plan.

use std::io;

/// Failure from the accelerator [`crate::driver::Driver`] surface.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("device allocation failed")]
    DeviceOutOfMemory,
    #[error("pinned host allocation failed")]
    HostOutOfMemory,
    #[error("no accelerator context is current")]
    NoContext,
}

/// Failure reading or writing a plan file.
#[derive(Debug, thiserror::Error)]
pub enum PlanIoError {
    #[error("plan file not found: {0}")]
    NotFound(String),
    #[error("malformed plan record: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Top-level error for the tuning core.
///
/// Every variant other than [`TuneError::Driver`] is fatal: it indicates
/// the plan is inconsistent with the running program, the search space
/// overflowed, or a tuner was asked for an action it doesn't implement.
#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("allocation matches neither a knob nor a loopy entry; plan does not describe this program")]
    PlanInconsistent,

    #[error("attempted to free a pointer with no matching plan entry")]
    InvalidPointerRelease,

    #[error("search space overflow: {num_knobs} knobs exceeds the 64-bit candidate limit")]
    SearchSpaceOverflow { num_knobs: u32 },

    #[error(transparent)]
    PlanIo(#[from] PlanIoError),

    #[error("tuner asked to perform an action it does not implement")]
    UnknownTunerAction,

    #[error("allocation failed under the active tuning candidate")]
    AllocationFailure,
}

/// Log a fatal error and terminate the process.
///
/// The error kinds above are not meant to be handled by the caller, they
/// are diagnostics for an operator. Kept as a single function so the abort
/// path is easy to find.
pub fn fatal(err: TuneError) -> ! {
    log::error!("accel-mem-tuner: fatal: {err}");
    std::process::abort();
}
