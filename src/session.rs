//! Framework glue: `session_start`/`session_end`, called by the target
//! program around its compute loop, plus the public configuration setters
//! a host integration calls before `session_start`.

use log::info;

use crate::context::{Context, OpMode};
use crate::driver::{DeviceHandle, Driver};
use crate::error::TuneError;
use crate::plan::store;
use crate::tuner::notune::NoTune;

/// Attach to (or create) the accelerator context, reset the knob cursor,
/// and either load the persisted plan (`Run`) or kick off the tuner
/// (`Tune`).
pub fn session_start(
    ctx: &mut Context,
    driver: &mut dyn Driver,
    mode: OpMode,
    device: DeviceHandle,
) -> Result<(), TuneError> {
    if ctx.tune_iter == 0 {
        ctx.owned_accel_context = match driver.context_attach(device) {
            Ok(_) => None,
            Err(_) => Some(driver.context_create(device)?),
        };
    }

    ctx.current_knob = 0;
    ctx.mode = mode;

    match mode {
        OpMode::Run => {
            ctx.plan = store::read_plan(&ctx.project, &ctx.plan_name)?;
        }
        OpMode::Tune => {
            with_tuner(ctx, |tuner, ctx| tuner.start(ctx, driver));
        }
    }

    Ok(())
}

/// End the current iteration. In `Tune` mode this drives the tuner's `end`
/// callback and advances `tune_iter`; in `Run` mode it tears down an
/// accelerator context this session created. Returns the (possibly
/// tuner-transitioned) mode.
pub fn session_end(ctx: &mut Context, driver: &mut dyn Driver) -> Result<OpMode, TuneError> {
    match ctx.mode {
        OpMode::Tune => {
            with_tuner(ctx, |tuner, ctx| tuner.end(ctx, driver))?;
            ctx.tune_iter += 1;
            if ctx.mode == OpMode::Run {
                info!("{}/{}: tuning complete after {} iterations", ctx.project, ctx.plan_name, ctx.tune_iter);
            }
        }
        OpMode::Run => {
            if let Some(accel) = ctx.owned_accel_context.take() {
                driver.context_destroy(accel);
            }
        }
    }
    Ok(ctx.mode)
}

/// Does a plan already exist for `(project, plan_name)`?
pub fn plan_exists(project: &str, plan_name: &str) -> bool {
    store::plan_exists(project, plan_name)
}

/// Temporarily takes `ctx.tuner` out so the tuner callback can receive
/// `&mut Context` and `&mut dyn Tuner` as disjoint borrows.
fn with_tuner<R>(ctx: &mut Context, f: impl FnOnce(&mut dyn crate::tuner::Tuner, &mut Context) -> R) -> R {
    let mut tuner = std::mem::replace(&mut ctx.tuner, Box::new(NoTune::new()));
    let result = f(&mut *tuner, ctx);
    ctx.tuner = tuner;
    result
}
