use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

use crate::config::PolicyKind;
use crate::foundation::core::WorkerId;

/// A live worker and the number of requests it has not answered yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerLoad {
    pub worker: WorkerId,
    pub outstanding: usize,
}

/// Chooses which worker receives the next request.
///
/// `loads` lists live workers only, in ascending id order. `None` means there is nobody to pick.
pub trait SchedulingPolicy: Send {
    fn select(&mut self, loads: &[WorkerLoad]) -> Option<WorkerId>;
}

/// Build the policy configured for a run. `seed` only matters for [`PolicyKind::Random`].
pub fn policy_for(kind: PolicyKind, seed: u64) -> Box<dyn SchedulingPolicy> {
    match kind {
        PolicyKind::RoundRobin => Box::new(RoundRobin::default()),
        PolicyKind::LeastLoaded => Box::new(LeastLoaded),
        PolicyKind::Random => Box::new(RandomPick::seeded(seed)),
    }
}

/// Cycles through worker ids, skipping dead workers.
#[derive(Debug, Default)]
pub struct RoundRobin {
    last: Option<WorkerId>,
}

impl SchedulingPolicy for RoundRobin {
    fn select(&mut self, loads: &[WorkerLoad]) -> Option<WorkerId> {
        let next = match self.last {
            Some(last) => loads
                .iter()
                .find(|l| l.worker > last)
                .or_else(|| loads.first()),
            None => loads.first(),
        }?
        .worker;
        self.last = Some(next);
        Some(next)
    }
}

/// Picks the worker with the fewest outstanding requests; ties go to the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl SchedulingPolicy for LeastLoaded {
    fn select(&mut self, loads: &[WorkerLoad]) -> Option<WorkerId> {
        loads
            .iter()
            .min_by_key(|l| (l.outstanding, l.worker))
            .map(|l| l.worker)
    }
}

/// Uniform random choice, reproducible from its seed.
#[derive(Debug)]
pub struct RandomPick {
    rng: StdRng,
}

impl RandomPick {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SchedulingPolicy for RandomPick {
    fn select(&mut self, loads: &[WorkerLoad]) -> Option<WorkerId> {
        if loads.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..loads.len());
        Some(loads[i].worker)
    }
}
