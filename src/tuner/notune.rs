//! Pass-through tuner: runs only the zeroth iteration and accepts whatever
//! placement that discovery pass produced, spilling into pinned host
//! memory where device memory ran out.

use std::time::Instant;

use log::debug;

use super::util;
use super::Tuner;
use crate::context::{Context, OpMode};
use crate::driver::Driver;
use crate::error::TuneError;
use crate::plan::KnobId;

#[derive(Debug, Default)]
pub struct NoTune;

impl NoTune {
    pub fn new() -> Self {
        Self
    }
}

impl Tuner for NoTune {
    fn start(&mut self, ctx: &mut Context, _driver: &mut dyn Driver) {
        ctx.start_time = Some(Instant::now());
    }

    fn lookup(
        &mut self,
        ctx: &mut Context,
        driver: &mut dyn Driver,
        size: u64,
    ) -> Result<Option<KnobId>, TuneError> {
        util::zeroth_lookup(ctx, driver, size)
    }

    /// Always a single iteration: transitions to `Run` regardless of
    /// whether every knob ended up in device memory. The plan is never
    /// persisted — this engine is an optimization bypass, not a search.
    fn end(&mut self, ctx: &mut Context, _driver: &mut dyn Driver) -> Result<(), TuneError> {
        debug!("notune: single iteration done, running whatever the zeroth pass placed");
        ctx.mode = OpMode::Run;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::driver::NullDriver;

    #[test]
    fn one_iteration_then_run_without_persisting() {
        let mut ctx = Context::with_defaults();
        ctx.mode = OpMode::Tune;
        let mut tuner = NoTune::new();
        let mut driver = NullDriver::with_device_capacity(16);

        tuner.start(&mut ctx, &mut driver);
        tuner.lookup(&mut ctx, &mut driver, 4).unwrap();
        tuner.end(&mut ctx, &mut driver).unwrap();

        assert_eq!(ctx.mode, OpMode::Run);
    }
}
