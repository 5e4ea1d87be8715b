//! Enumerates every bit pattern over the knob set, subject to a
//! device-utilization window.

use std::time::Instant;

use log::debug;

use super::util::{self, Hit};
use super::Tuner;
use crate::context::{Context, OpMode};
use crate::driver::Driver;
use crate::error::TuneError;
use crate::interposer::place_entry;
use crate::plan::{KnobId, Location};

const MEM_HEADROOM: u64 = 20 * 1024 * 1024;

/// Exhausts `2^num_knobs` candidates; stateless beyond the `Context` it's
/// handed, since the candidate assignment at iteration `tune_iter` is
/// `tune_iter` itself, interpreted bitwise.
#[derive(Debug, Default)]
pub struct Exhaustive;

impl Exhaustive {
    pub fn new() -> Self {
        Self
    }
}

impl Tuner for Exhaustive {
    fn start(&mut self, ctx: &mut Context, _driver: &mut dyn Driver) {
        if ctx.tune_iter > 0 {
            ctx.start_time = Some(Instant::now());
        }
    }

    fn lookup(
        &mut self,
        ctx: &mut Context,
        driver: &mut dyn Driver,
        size: u64,
    ) -> Result<Option<KnobId>, TuneError> {
        if ctx.tune_iter == 0 {
            return util::zeroth_lookup(ctx, driver, size);
        }

        match util::loopy_entry(ctx, size) {
            Hit::Rehit(id) => {
                let entry = ctx.plan.get_mut(id).expect("rehit knob must exist in plan");
                if place_entry(entry, size, driver).is_err() {
                    return Ok(None);
                }
                Ok(Some(id))
            }
            Hit::Normal(id) => {
                let candidate = ctx.tune_iter;
                let entry = ctx.plan.get_mut(id).expect("current knob must exist in plan");
                entry.loc = Location::from_bit(candidate >> entry.id);
                if place_entry(entry, size, driver).is_err() {
                    return Ok(None);
                }
                ctx.current_knob += 1;
                Ok(Some(id))
            }
        }
    }

    fn end(&mut self, ctx: &mut Context, driver: &mut dyn Driver) -> Result<(), TuneError> {
        if ctx.tune_iter == 0 {
            if util::zeroth_end(ctx)? {
                return Ok(());
            }
            let num_knobs = ctx.num_knobs.expect("zeroth_end must freeze num_knobs");
            ctx.tune_iter_max = 1u64 << num_knobs;
            debug!("exhaustive search over {} knobs: {} candidates", num_knobs, ctx.tune_iter_max);
            return Ok(());
        }

        let candidate = ctx.tune_iter;
        let elapsed = Instant::now().duration_since(
            ctx.start_time.expect("start() must stamp start_time on non-zeroth iterations"),
        );

        let (free, _total) = driver.query_free_memory();
        let request = device_demand(ctx, candidate);
        let gpu_mem_min = free * u64::from(ctx.gpu_mem_percent) / 100;
        let feasible = request >= gpu_mem_min && request < free.saturating_sub(MEM_HEADROOM);

        if feasible && ctx.best_time.map(|best| elapsed < best).unwrap_or(true) {
            debug!("candidate {:#x}: new best at {:?}", candidate, elapsed);
            ctx.best_time = Some(elapsed);
            ctx.best_plan = candidate;
        }

        if ctx.tune_iter + 1 >= ctx.tune_iter_max {
            for entry in ctx.plan.iter_mut() {
                entry.loc = Location::from_bit(ctx.best_plan >> entry.id);
            }
            ctx.mode = OpMode::Run;
            crate::plan::store::write_plan(&ctx.plan, &ctx.project, &ctx.plan_name)?;
        }

        Ok(())
    }
}

fn device_demand(ctx: &Context, candidate: u64) -> u64 {
    ctx.plan
        .iter()
        .filter(|e| e.gold_member && Location::from_bit(candidate >> e.id) == Location::Device)
        .map(|e| e.size)
        .sum()
}
