//! Elitist genetic-algorithm search over bit-string placement candidates.

use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;

use super::util::{self, Hit};
use super::Tuner;
use crate::context::{Context, OpMode};
use crate::driver::Driver;
use crate::error::TuneError;
use crate::interposer::place_entry;
use crate::plan::{KnobId, Location};

const GENERATIONS: u64 = 10;
const POPULATION: usize = 20;
const ELITE_FRACTION: f64 = 0.25;
const MIN_GPU_MEM: f64 = 0.90;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dna: u64,
    fit: Duration,
}

/// Population-based search: each candidate is a 64-bit placement string.
/// The population lives on the engine itself, not on `Context`.
#[derive(Debug, Default)]
pub struct Genetic {
    population: Vec<Candidate>,
}

impl Genetic {
    pub fn new() -> Self {
        Self { population: Vec::new() }
    }

    fn breed(&mut self, num_knobs: u32) {
        self.population.sort_by(|a, b| a.fit.cmp(&b.fit));
        let num_elite = ((POPULATION as f64) * ELITE_FRACTION) as usize;
        let half = POPULATION / 2;
        let mask_n = util::generate_mask(num_knobs);

        let mut next = Vec::with_capacity(POPULATION);
        next.extend(self.population.iter().take(num_elite).copied());

        let mut rng = rand::thread_rng();
        while next.len() < POPULATION {
            // No asexual reproduction: draw two distinct parents from the
            // top half of the sorted population.
            let (mom, dad) = loop {
                let mom = rng.gen_range(0..half);
                let dad = rng.gen_range(0..half);
                if mom != dad {
                    break (mom, dad);
                }
            };
            let mix = rng.gen::<u64>() & mask_n;
            let dna = (self.population[mom].dna & mix) | (self.population[dad].dna & !mix & mask_n);
            next.push(Candidate { dna, fit: Duration::ZERO });
        }
        debug!("bred generation: {} elites kept, {} bred", num_elite, POPULATION - num_elite);
        self.population = next;
    }
}

fn immaculate_conception(ctx: &Context, driver: &mut dyn Driver, num_knobs: u32) -> u64 {
    let (free, _total) = driver.query_free_memory();
    let mask_n = util::generate_mask(num_knobs);
    let mut rng = rand::thread_rng();
    loop {
        let dna = rng.gen::<u64>() & mask_n;
        let request: u64 = ctx
            .plan
            .iter()
            .filter(|e| e.gold_member && Location::from_bit(dna >> e.id) == Location::Device)
            .map(|e| e.size)
            .sum();
        if (request as f64) > (free as f64) * MIN_GPU_MEM {
            return dna;
        }
    }
}

impl Tuner for Genetic {
    fn start(&mut self, ctx: &mut Context, driver: &mut dyn Driver) {
        if ctx.tune_iter == 0 {
            self.population.clear();
            return;
        }

        if (ctx.tune_iter - 1) % POPULATION as u64 == 0 {
            let num_knobs = ctx.num_knobs.expect("zeroth iteration must have frozen num_knobs");
            if ctx.tune_iter == 1 {
                self.population = (0..POPULATION)
                    .map(|_| Candidate { dna: immaculate_conception(ctx, driver, num_knobs), fit: Duration::ZERO })
                    .collect();
                debug!("seeded population of {} over {} knobs", POPULATION, num_knobs);
            } else {
                self.breed(num_knobs);
            }
        }

        ctx.start_time = Some(Instant::now());
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
                let c_num = ((ctx.tune_iter - 1) % POPULATION as u64) as usize;
                let candidate_loc = Location::from_bit(self.population[c_num].dna >> id);
                let entry = ctx.plan.get_mut(id).expect("current knob must exist in plan");
                entry.loc = candidate_loc;
                if place_entry(entry, size, driver).is_err() {
                    return Ok(None);
                }

                // Environment-induced mutation: reflect a driver-forced
                // fallback back into the candidate's DNA.
                if entry.loc != candidate_loc {
                    let bit = entry.loc.as_bit();
                    let dna = &mut self.population[c_num].dna;
                    *dna &= !(1u64 << id);
                    *dna |= bit << id;
                }

                ctx.current_knob += 1;
                Ok(Some(id))
            }
        }
    }

    fn end(&mut self, ctx: &mut Context, _driver: &mut dyn Driver) -> Result<(), TuneError> {
        if ctx.tune_iter == 0 {
            if util::zeroth_end(ctx)? {
                return Ok(());
            }
            ctx.tune_iter_max = GENERATIONS * POPULATION as u64;
            return Ok(());
        }

        let c_num = ((ctx.tune_iter - 1) % POPULATION as u64) as usize;
        let elapsed = Instant::now().duration_since(
            ctx.start_time.expect("start() must stamp start_time on non-zeroth iterations"),
        );
        self.population[c_num].fit = elapsed;

        if ctx.best_time.map(|best| elapsed < best).unwrap_or(true) {
            ctx.best_time = Some(elapsed);
            ctx.best_plan = self.population[c_num].dna;
        }

        if ctx.tune_iter + 1 >= ctx.tune_iter_max {
            ctx.mode = OpMode::Run;
            for entry in ctx.plan.iter_mut() {
                entry.loc = Location::from_bit(ctx.best_plan >> entry.id);
            }
            crate::plan::store::write_plan(&ctx.plan, &ctx.project, &ctx.plan_name)?;
        }

        Ok(())
    }
}
