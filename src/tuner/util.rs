//! Helpers shared by every tuner engine: zeroth-iteration plan building,
//! loop detection, and loop re-hit handling.

use log::{debug, warn};

use crate::context::{Context, OpMode};
use crate::driver::Driver;
use crate::error::TuneError;
use crate::interposer::place_entry;
use crate::plan::{self, KnobId, Location, PlanEntry};

/// Builds the plan draft. Only ever called during the zeroth iteration —
/// every engine's `lookup` gates on `ctx.tune_iter == 0` before calling
/// this, so the precondition is a debug assertion rather than a runtime
/// branch.
pub fn zeroth_lookup(
    ctx: &mut Context,
    driver: &mut dyn Driver,
    size: u64,
) -> Result<Option<KnobId>, TuneError> {
    debug_assert_eq!(ctx.tune_iter, 0);

    if let Some(entry) = ctx.plan.find_released_same_size(size) {
        entry.inloop = true;
        let id = entry.id;
        if place_entry(entry, size, driver).is_err() {
            return Ok(None);
        }
        return Ok(Some(id));
    }

    let id = ctx.current_knob;
    let mut entry = PlanEntry::new(id, size);
    if place_entry(&mut entry, size, driver).is_err() {
        return Ok(None);
    }
    ctx.plan.push(entry);
    ctx.current_knob += 1;
    Ok(Some(id))
}

/// Closes out the zeroth iteration: decides whether the program already
/// fits entirely in device memory (done) or freezes the search space for
/// the engine's own subsequent iterations. Returns `true` if tuning is
/// already complete.
pub fn zeroth_end(ctx: &mut Context) -> Result<bool, TuneError> {
    debug_assert_eq!(ctx.tune_iter, 0);

    let all_device = ctx.plan.iter().all(|e| e.loc == Location::Device);
    if all_device {
        debug!("{} knobs, all device: skipping search", ctx.plan.len());
        ctx.mode = OpMode::Run;
        plan::store::write_plan(&ctx.plan, &ctx.project, &ctx.plan_name)?;
        return Ok(true);
    }

    let num_knobs = ctx.current_knob;
    if num_knobs > 64 {
        warn!("{} knobs exceeds the 64-bit candidate limit", num_knobs);
        return Err(TuneError::SearchSpaceOverflow { num_knobs });
    }
    ctx.num_knobs = Some(num_knobs);
    Ok(false)
}

/// The outcome of a post-zeroth-iteration lookup.
pub enum Hit {
    /// A re-hit of a malloc/free loop: re-place this existing entry as-is,
    /// without advancing `current_knob`.
    Rehit(KnobId),
    /// The normal path: the entry at `current_knob`. The caller must set
    /// its `loc` from its own candidate state, call `place_entry`, and
    /// advance `current_knob`.
    Normal(KnobId),
}

/// Re-hit detection for iterations after the zeroth.
///
/// Matches purely on `(size, no live pointer)` within already-known
/// `inloop` entries — two distinct knobs of the same byte size released at
/// the same point in an iteration alias here. Accepted, not fixed.
pub fn loopy_entry(ctx: &mut Context, size: u64) -> Hit {
    let rehit = ctx
        .plan
        .iter_mut()
        .find(|e| e.inloop && e.device_ptr.is_none() && e.size == size && !e.first_hit)
        .map(|e| e.id);

    if let Some(id) = rehit {
        return Hit::Rehit(id);
    }

    let id = ctx.current_knob;
    if let Some(entry) = ctx.plan.get_mut(id) {
        if entry.inloop {
            entry.first_hit = false;
        }
    }
    Hit::Normal(id)
}

/// A bit mask covering the low `n` bits (all 64 if `n >= 64`).
pub fn generate_mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}
