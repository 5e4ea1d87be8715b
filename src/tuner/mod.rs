//! The tuner engine contract and the three interchangeable strategies.

pub mod exhaustive;
pub mod genetic;
pub mod notune;
pub mod util;

use crate::context::Context;
use crate::driver::Driver;
use crate::error::TuneError;
use crate::plan::KnobId;

/// A pluggable placement-search strategy.
///
/// Modeled as a capability object carrying its own private state, rather
/// than a function-pointer-plus-opaque-state-slot pair, so each engine can
/// hold whatever bookkeeping its search needs (a population, a candidate
/// cursor) without widening `Context`.
pub trait Tuner: Send {
    /// Invoked at the top of each tuning iteration.
    fn start(&mut self, ctx: &mut Context, driver: &mut dyn Driver);

    /// Invoked once per allocation during the iteration. `Ok(None)` means
    /// the engine could not place the allocation under any location.
    fn lookup(
        &mut self,
        ctx: &mut Context,
        driver: &mut dyn Driver,
        size: u64,
    ) -> Result<Option<KnobId>, TuneError>;

    /// Invoked at the bottom of each tuning iteration.
    fn end(&mut self, ctx: &mut Context, driver: &mut dyn Driver) -> Result<(), TuneError>;
}

/// Which [`Tuner`] a [`Context`] should use; selected via `set_tuner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerKind {
    NoTune,
    Exhaustive,
    Genetic,
}

impl TunerKind {
    pub fn build(self) -> Box<dyn Tuner> {
        match self {
            TunerKind::NoTune => Box::new(notune::NoTune::new()),
            TunerKind::Exhaustive => Box::new(exhaustive::Exhaustive::new()),
            TunerKind::Genetic => Box::new(genetic::Genetic::new()),
        }
    }
}
