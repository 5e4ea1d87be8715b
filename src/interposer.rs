//! The `allocate`/`release` entry points interposed on the target
//! program's accelerator allocation calls, and the placement mechanics
//! they share with the tuner engines.

use log::{debug, warn};

use crate::context::{Context, OpMode};
use crate::driver::{Driver, DevicePtr, HostAllocFlags};
use crate::error::{DriverError, TuneError};
use crate::plan::{Location, PlanEntry};

/// Place `entry` at its recorded location, falling back from device to
/// pinned host memory on allocation failure. The fallback mutates
/// `entry.loc` — an environment-induced change the tuner must observe.
pub fn place_entry(entry: &mut PlanEntry, size: u64, driver: &mut dyn Driver) -> Result<(), DriverError> {
    match entry.loc {
        Location::Device => match driver.device_alloc(size) {
            Ok(ptr) => {
                entry.device_ptr = Some(ptr);
                entry.host_ptr = None;
                Ok(())
            }
            Err(_) => {
                warn!("knob {} ({} bytes): device alloc failed, falling back to pinned host", entry.id, size);
                entry.loc = Location::PinnedHost;
                place_pinned(entry, size, driver)
            }
        },
        Location::PinnedHost => place_pinned(entry, size, driver),
    }
}

fn place_pinned(entry: &mut PlanEntry, size: u64, driver: &mut dyn Driver) -> Result<(), DriverError> {
    let flags = HostAllocFlags::PORTABLE | HostAllocFlags::DEVICE_MAPPED;
    let host = driver.host_pinned_alloc(size, flags)?;
    let mapped = driver.host_pinned_to_device_ptr(host);
    entry.host_ptr = Some(host);
    entry.device_ptr = Some(mapped);
    Ok(())
}

/// Classify `ctx.mode` and dispatch an allocation of `size` bytes.
pub fn allocate(ctx: &mut Context, driver: &mut dyn Driver, size: u64) -> Result<DevicePtr, TuneError> {
    match ctx.mode {
        OpMode::Run => allocate_run(ctx, driver, size),
        OpMode::Tune => allocate_tune(ctx, driver, size),
    }
}

fn allocate_run(ctx: &mut Context, driver: &mut dyn Driver, size: u64) -> Result<DevicePtr, TuneError> {
    let knob = ctx.current_knob;
    if let Some(entry) = ctx.plan.get_mut(knob) {
        place_entry(entry, size, driver)?;
        ctx.current_knob += 1;
        return Ok(entry.device_ptr.expect("place_entry always sets device_ptr on success"));
    }

    if let Some(entry) = ctx.plan.find_released_inloop(size) {
        place_entry(entry, size, driver)?;
        return Ok(entry.device_ptr.expect("place_entry always sets device_ptr on success"));
    }

    Err(TuneError::PlanInconsistent)
}

fn allocate_tune(ctx: &mut Context, driver: &mut dyn Driver, size: u64) -> Result<DevicePtr, TuneError> {
    let mut tuner = std::mem::replace(&mut ctx.tuner, Box::new(crate::tuner::notune::NoTune::new()));
    let result = tuner.lookup(ctx, driver, size);
    ctx.tuner = tuner;
    let id = result?.ok_or(TuneError::AllocationFailure)?;

    if ctx.tune_iter == 0 {
        ctx.allocated_mem += size;
    }

    let entry = ctx.plan.get(id).expect("tuner.lookup must return an id present in the plan");
    Ok(entry.device_ptr.expect("a successful lookup always places the entry"))
}

/// Release the allocation at `device_ptr`.
pub fn release(ctx: &mut Context, driver: &mut dyn Driver, device_ptr: DevicePtr) -> Result<(), TuneError> {
    if ctx.plan.find_by_device_ptr(device_ptr).is_none() {
        return Err(TuneError::InvalidPointerRelease);
    }

    if ctx.mode == OpMode::Tune && ctx.tune_iter == 0 {
        if ctx.allocated_mem > ctx.most_mem_allocated {
            ctx.most_mem_allocated = ctx.allocated_mem;
            debug!("new peak live: {} bytes, re-snapshotting gold members", ctx.allocated_mem);
            for e in ctx.plan.iter_mut() {
                e.gold_member = e.is_live();
            }
        }
        let size = ctx.plan.find_by_device_ptr(device_ptr).unwrap().size;
        ctx.allocated_mem = ctx.allocated_mem.saturating_sub(size);
    }

    let entry = ctx.plan.find_by_device_ptr(device_ptr).unwrap();
    if let Some(host) = entry.host_ptr.take() {
        driver.host_pinned_free(host);
    } else if let Some(dev) = entry.device_ptr {
        driver.device_free(dev);
    }
    entry.device_ptr = None;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::driver::NullDriver;
    use crate::plan::PlanEntry;

    #[test]
    fn place_entry_falls_back_to_pinned_on_device_exhaustion() {
        let mut driver = NullDriver::with_device_capacity(0);
        let mut entry = PlanEntry::new(0, 1024);
        place_entry(&mut entry, 1024, &mut driver).unwrap();
        assert_eq!(entry.loc, Location::PinnedHost);
        assert!(entry.host_ptr.is_some());
        assert!(entry.device_ptr.is_some());
    }

    #[test]
    fn run_mode_advances_current_knob_and_fails_without_match() {
        let mut ctx = Context::with_defaults();
        ctx.mode = OpMode::Run;
        ctx.plan.push(PlanEntry::new(0, 1024));
        let mut driver = NullDriver::with_device_capacity(1 << 30);

        allocate(&mut ctx, &mut driver, 1024).unwrap();
        assert_eq!(ctx.current_knob, 1);

        let err = allocate(&mut ctx, &mut driver, 1024).unwrap_err();
        assert!(matches!(err, TuneError::PlanInconsistent));
    }

    #[test]
    fn run_mode_reuses_inloop_entry_past_knob_count() {
        let mut ctx = Context::with_defaults();
        ctx.mode = OpMode::Run;
        let mut entry = PlanEntry::new(0, 512);
        entry.inloop = true;
        ctx.plan.push(entry);
        ctx.current_knob = 1; // exhausted the single discovered knob
        let mut driver = NullDriver::with_device_capacity(1 << 30);

        let ptr = allocate(&mut ctx, &mut driver, 512).unwrap();
        assert_eq!(ctx.current_knob, 1, "a loop re-hit must not advance current_knob");
        release(&mut ctx, &mut driver, ptr).unwrap();

        allocate(&mut ctx, &mut driver, 512).unwrap();
    }

    #[test]
    fn release_tracks_gold_members_at_peak_live_during_zeroth_iteration() {
        let mut ctx = Context::with_defaults();
        ctx.mode = OpMode::Tune;
        let mut driver = NullDriver::with_device_capacity(1 << 30);

        let ptr_a = allocate(&mut ctx, &mut driver, 1024).unwrap();
        allocate(&mut ctx, &mut driver, 2048).unwrap();
        assert_eq!(ctx.most_mem_allocated, 0, "peak updates only at release time");

        release(&mut ctx, &mut driver, ptr_a).unwrap();
        assert_eq!(ctx.most_mem_allocated, 3072);
        assert!(ctx.plan.get(0).unwrap().gold_member);
        assert!(ctx.plan.get(1).unwrap().gold_member);
    }

    #[test]
    fn release_with_unknown_pointer_is_fatal_inconsistency() {
        let mut ctx = Context::with_defaults();
        ctx.mode = OpMode::Run;
        let mut driver = NullDriver::with_device_capacity(1 << 30);
        let err = release(&mut ctx, &mut driver, DevicePtr(9999)).unwrap_err();
        assert!(matches!(err, TuneError::InvalidPointerRelease));
    }
}
