//! Speaking-rate calibration.
//!
//! Two pieces: [`initial_multiplier`] picks a starting rate from how far the
//! script's estimated length is from the target, and [`next_multiplier`] is
//! the per-segment controller, a pure function of the remaining budget.

use serde::{Deserialize, Serialize};

pub const MIN_MULTIPLIER: f64 = 0.85;
pub const MAX_MULTIPLIER: f64 = 1.8;
/// Floor when relaxing the rate because the budget is ample.
pub const RELAXED_FLOOR: f64 = 0.9;

/// Average seconds per remaining segment below which the rate escalates.
pub const CRITICAL_AVG_SECS: f64 = 2.0;
pub const TIGHT_AVG_SECS: f64 = 3.0;
/// Budget above `remaining_allotted * AMPLE_RATIO` counts as ample.
pub const AMPLE_RATIO: f64 = 1.15;

/// Pick the starting multiplier from the relative deviation of the
/// estimated duration from the target.
///
/// | deviation        | multiplier |
/// |------------------|------------|
/// | > +20%           | 1.25       |
/// | +5% .. +20%      | 1.10       |
/// | within ±5%       | 1.00       |
/// | -20% .. -5%      | 0.90       |
/// | < -20%           | 0.85       |
pub fn initial_multiplier(estimated_secs: f64, target_secs: f64) -> f64 {
    if !(target_secs > 0.0) || !estimated_secs.is_finite() {
        return 1.0;
    }
    let deviation = (estimated_secs - target_secs) / target_secs;
    if deviation > 0.20 {
        1.25
    } else if deviation > 0.05 {
        1.10
    } else if deviation >= -0.05 {
        1.0
    } else if deviation >= -0.20 {
        0.90
    } else {
        0.85
    }
}

/// Budget left after measuring the segments synthesized so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Target minus the measured duration so far. May be negative.
    pub remaining_budget: f64,
    pub remaining_segments: usize,
    /// Sum of the allotted durations of the remaining segments.
    pub remaining_allotted: f64,
}

impl BudgetState {
    pub fn average_per_segment(&self) -> Option<f64> {
        (self.remaining_segments > 0).then(|| self.remaining_budget / self.remaining_segments as f64)
    }
}

/// Rate for the next segment. Always within
/// [`MIN_MULTIPLIER`, `MAX_MULTIPLIER`].
pub fn next_multiplier(base: f64, state: BudgetState) -> f64 {
    let base = if base.is_finite() { base } else { 1.0 };
    let next = match state.average_per_segment() {
        None => base,
        Some(_) if state.remaining_budget <= 0.0 => MAX_MULTIPLIER,
        Some(avg) if avg < CRITICAL_AVG_SECS => (base + 0.4).min(MAX_MULTIPLIER),
        Some(avg) if avg < TIGHT_AVG_SECS => (base + 0.2).min(MAX_MULTIPLIER),
        Some(_) if state.remaining_budget > state.remaining_allotted * AMPLE_RATIO => {
            (base - 0.1).max(RELAXED_FLOOR)
        }
        Some(_) => base,
    };
    next.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

/// Running calibration for one assembly. Dropped once the voice is merged.
#[derive(Debug, Clone)]
pub struct RateController {
    base: f64,
    current: f64,
    target: f64,
    spent: f64,
    allotted: Vec<f64>,
    measured: usize,
}

impl RateController {
    pub fn new(base: f64, target: f64, allotted: Vec<f64>) -> Self {
        let base = base.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
        Self {
            base,
            current: base,
            target,
            spent: 0.0,
            allotted,
            measured: 0,
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Multiplier for the next segment to synthesize.
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn state(&self) -> BudgetState {
        let rest = self.allotted.get(self.measured..).unwrap_or(&[]);
        BudgetState {
            remaining_budget: self.target - self.spent,
            remaining_segments: rest.len(),
            remaining_allotted: rest.iter().sum(),
        }
    }

    /// Feed the measured duration of the segment just synthesized and
    /// re-evaluate the rate for the rest.
    pub fn record(&mut self, measured_secs: f64) -> f64 {
        self.spent += measured_secs.max(0.0);
        self.measured += 1;
        self.current = next_multiplier(self.base, self.state());
        self.current
    }
}
