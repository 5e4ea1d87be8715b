//! Per-session tuning state and the registry that keys sessions by caller.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::driver::ContextHandle;
use crate::plan::Plan;
use crate::tuner::{exhaustive::Exhaustive, Tuner};

/// Whether a session is replaying a persisted plan or searching for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    Run,
    Tune,
}

/// Per-session tuning state: the plan under construction or replay, the
/// active tuner engine, and the bookkeeping that tuner shares with the
/// interposer (knob cursor, iteration counter, peak-live tracking).
pub struct Context {
    pub project: String,
    pub plan_name: String,
    pub mode: OpMode,
    pub plan: Plan,
    /// Fixed after the zeroth iteration; the size of the search bit-vector.
    pub num_knobs: Option<u32>,
    /// Cursor advanced by each non-loopy lookup during a TUNE iteration;
    /// reset to 0 at the start of each iteration.
    pub current_knob: u32,
    pub tune_iter: u64,
    pub tune_iter_max: u64,
    pub best_plan: u64,
    pub best_time: Option<Duration>,
    pub start_time: Option<Instant>,
    /// Lower bound on device utilization a candidate must satisfy to be
    /// considered, as a percentage of free device memory.
    pub gpu_mem_percent: u32,
    /// Running live device bytes during the zeroth iteration only.
    pub allocated_mem: u64,
    /// Peak live device bytes observed during the zeroth iteration.
    pub most_mem_allocated: u64,
    pub tuner: Box<dyn Tuner>,
    /// Set only if this session created the accelerator context (as
    /// opposed to attaching to one the target program already had); only
    /// then does `session_end` destroy it.
    pub owned_accel_context: Option<ContextHandle>,
}

impl Context {
    pub(crate) fn with_defaults() -> Self {
        Self {
            project: "phantom_project".to_string(),
            plan_name: "phantom_plan".to_string(),
            mode: OpMode::Run,
            plan: Plan::new(),
            num_knobs: None,
            current_knob: 0,
            tune_iter: 0,
            tune_iter_max: 0,
            best_plan: 0,
            best_time: None,
            start_time: None,
            gpu_mem_percent: 90,
            allocated_mem: 0,
            most_mem_allocated: 0,
            tuner: Box::new(Exhaustive::new()),
            owned_accel_context: None,
        }
    }

    pub fn set_project(&mut self, name: impl Into<String>) {
        self.project = name.into();
    }

    pub fn set_plan(&mut self, name: impl Into<String>) {
        self.plan_name = name.into();
    }

    pub fn set_tuner(&mut self, tuner: Box<dyn Tuner>) {
        self.tuner = tuner;
    }

    pub fn set_minimum_utilization(&mut self, percent: u32) {
        self.gpu_mem_percent = percent;
    }
}

/// A registry of [`Context`]s keyed by caller identity.
///
/// The distilled spec's Non-goals rule out concurrent use *within* one
/// tuning session, but require that multiple independent sessions be
/// admissible at once (keyed by caller identity). The `Mutex` here
/// serializes only registry mutation — creating, looking up, and
/// destroying a `Context` handle — never the body of a tuning call, which
/// always runs against an already-acquired `Context` on the caller's own
/// thread. Callers are expected to use a stable per-session identifier;
/// the registry itself places no bound on how many sessions coexist.
pub struct ContextRegistry<K> {
    sessions: Mutex<HashMap<K, Context>>,
}

impl<K: Eq + Hash + Clone> ContextRegistry<K> {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()) }
    }

    /// Run `f` against the `Context` for `caller_id`, creating one with
    /// defaults (`mode = Run`, `gpu_mem_percent = 90`, `tuner = Exhaustive`,
    /// `best_time = None`) if absent.
    pub fn with_context<R>(&self, caller_id: K, f: impl FnOnce(&mut Context) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap();
        let ctx = sessions.entry(caller_id).or_insert_with(Context::with_defaults);
        f(ctx)
    }

    /// Destroy the `Context` for `caller_id`, if any.
    pub fn release(&self, caller_id: &K) {
        self.sessions.lock().unwrap().remove(caller_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone> Default for ContextRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_defaults_once() {
        let registry: ContextRegistry<u64> = ContextRegistry::new();
        registry.with_context(1, |ctx| {
            assert_eq!(ctx.mode, OpMode::Run);
            assert_eq!(ctx.gpu_mem_percent, 90);
            assert!(ctx.best_time.is_none());
            ctx.gpu_mem_percent = 50;
        });
        registry.with_context(1, |ctx| {
            assert_eq!(ctx.gpu_mem_percent, 50, "second acquire must see the same context");
        });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn independent_sessions_do_not_share_state() {
        let registry: ContextRegistry<u64> = ContextRegistry::new();
        registry.with_context(1, |ctx| ctx.gpu_mem_percent = 10);
        registry.with_context(2, |ctx| ctx.gpu_mem_percent = 20);
        registry.with_context(1, |ctx| assert_eq!(ctx.gpu_mem_percent, 10));
        registry.with_context(2, |ctx| assert_eq!(ctx.gpu_mem_percent, 20));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn release_removes_context() {
        let registry: ContextRegistry<u64> = ContextRegistry::new();
        registry.with_context(1, |_| {});
        registry.release(&1);
        assert!(registry.is_empty());
    }
}
