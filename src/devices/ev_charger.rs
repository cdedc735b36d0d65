use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::commodity::Commodity;
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput};
use crate::sim::distributor::{Encoding, SolutionSlice};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::ActivePower];

/// One connection of the vehicle, in steps relative to the reference time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvSession {
    pub arrival_step: usize,
    /// First step the vehicle is gone (exclusive).
    pub deadline_step: usize,
    pub energy_wh: f64,
}

impl EvSession {
    /// Number of steps the vehicle is connected.
    pub fn dwell_steps(&self) -> usize {
        self.deadline_step - self.arrival_step
    }
}

/// Ranges the charging session is sampled from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvSessionRanges {
    pub demand_wh_min: f64,
    pub demand_wh_max: f64,
    pub dwell_steps_min: usize,
    pub dwell_steps_max: usize,
}

impl Default for EvSessionRanges {
    fn default() -> Self {
        Self {
            demand_wh_min: 5_000.0,
            demand_wh_max: 15_000.0,
            dwell_steps_min: 8,
            dwell_steps_max: 40,
        }
    }
}

/// A flexible EV charging load.
///
/// The model samples one charging session per optimization run from its
/// seed: a random arrival, a random dwell duration (which sets the deadline)
/// and a random energy demand, capped at what can be delivered in time.
///
/// The solution holds one switch per step of the session window. A step
/// whose switch is on charges at `max_charge_w` until the demand is met.
///
/// # Power Flow Convention (Meter)
/// Publishes **positive** ACTIVEPOWER (consumption).
#[derive(Debug, Clone)]
pub struct EvCharger {
    base: PartBase,

    /// Maximum charging power in watts.
    pub max_charge_w: f64,

    /// Cost per kWh still missing at the deadline.
    pub penalty_per_kwh: f64,

    session: EvSession,
    enabled: Vec<bool>,
    remaining_wh: f64,
    cervisia: f64,
}

impl EvCharger {
    /// Creates an EV charger with a session sampled from `seed`.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Device identifier
    /// * `reference_time` - First simulated tick
    /// * `optimization_horizon` - Last simulated tick
    /// * `step_size` - Ticks per charging decision
    /// * `max_charge_w` - Maximum charging power in W (must be > 0)
    /// * `ranges` - Session sampling ranges
    /// * `seed` - Random seed for reproducible session generation
    ///
    /// # Panics
    ///
    /// Panics if `max_charge_w <= 0` or the ranges are invalid.
    pub fn new(
        device_id: DeviceId,
        reference_time: u64,
        optimization_horizon: u64,
        step_size: u64,
        max_charge_w: f64,
        ranges: EvSessionRanges,
        seed: u64,
    ) -> Self {
        assert!(max_charge_w > 0.0);
        assert!(ranges.demand_wh_min >= 0.0);
        assert!(ranges.demand_wh_max >= ranges.demand_wh_min);
        assert!(ranges.dwell_steps_min > 0);
        assert!(ranges.dwell_steps_max >= ranges.dwell_steps_min);

        let base = PartBase::new(device_id, reference_time, optimization_horizon)
            .with_step_size(step_size);
        let session = Self::sample_session(&base, max_charge_w, &ranges, seed);
        Self {
            base,
            max_charge_w,
            penalty_per_kwh: 0.0,
            session,
            enabled: Vec::new(),
            remaining_wh: session.energy_wh,
            cervisia: 0.0,
        }
    }

    /// Replaces the sampled session.
    ///
    /// The deadline is clamped to the horizon and the demand to what can be
    /// delivered before it.
    pub fn with_session(mut self, arrival_step: usize, dwell_steps: usize, energy_wh: f64) -> Self {
        let steps = self.base.steps();
        let arrival_step = arrival_step.min(steps);
        let deadline_step = (arrival_step + dwell_steps).min(steps);
        let deliverable = self.max_charge_w * self.base.step_hours() * (deadline_step - arrival_step) as f64;
        self.session = EvSession {
            arrival_step,
            deadline_step,
            energy_wh: energy_wh.clamp(0.0, deliverable),
        };
        self.remaining_wh = self.session.energy_wh;
        self
    }

    pub fn with_penalty(mut self, penalty_per_kwh: f64) -> Self {
        self.penalty_per_kwh = penalty_per_kwh.max(0.0);
        self
    }

    pub fn session(&self) -> EvSession {
        self.session
    }

    /// Energy not yet delivered in the current evaluation.
    pub fn remaining_wh(&self) -> f64 {
        self.remaining_wh
    }

    fn sample_session(base: &PartBase, max_charge_w: f64, ranges: &EvSessionRanges, seed: u64) -> EvSession {
        let mut rng = StdRng::seed_from_u64(seed);
        let steps = base.steps();
        if steps == 0 {
            return EvSession {
                arrival_step: 0,
                deadline_step: 0,
                energy_wh: 0.0,
            };
        }

        let dwell_max = ranges.dwell_steps_max.min(steps);
        let dwell_min = ranges.dwell_steps_min.min(dwell_max);
        let dwell = rng.random_range(dwell_min..=dwell_max);

        let arrival = rng.random_range(0..=steps - dwell);
        let deadline = arrival + dwell;

        let deliverable = max_charge_w * base.step_hours() * dwell as f64;
        let raw_demand = rng.random_range(ranges.demand_wh_min..=ranges.demand_wh_max);

        EvSession {
            arrival_step: arrival,
            deadline_step: deadline,
            energy_wh: raw_demand.min(deliverable).max(0.0),
        }
    }
}

impl ProblemPart for EvCharger {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "EvCharger"
    }

    fn dense_id(&self) -> usize {
        self.base.dense_id
    }

    fn set_dense_id(&mut self, id: usize) {
        self.base.dense_id = id;
    }

    fn output_commodities(&self) -> &[Commodity] {
        &OUTPUTS
    }

    fn reference_time(&self) -> u64 {
        self.base.reference_time
    }

    fn optimization_horizon(&self) -> u64 {
        self.base.optimization_horizon
    }

    fn variable_count(&self, _encoding: Encoding) -> usize {
        self.session.dwell_steps()
    }

    fn set_solution(&mut self, slice: SolutionSlice<'_>) {
        self.enabled = (0..slice.len()).map(|i| slice.flag(i)).collect();
    }

    fn initialize_interdependent_calculation(
        &mut self,
        reference_time: u64,
        step_size: u64,
        log: bool,
        keep_prediction: bool,
    ) {
        self.base
            .initialize(reference_time, step_size, log, keep_prediction);
        self.remaining_wh = self.session.energy_wh;
        self.cervisia = 0.0;
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        let dt_hours = self.base.step_hours();
        let mut power = 0.0;
        if let Some(step) = self.base.step_index(input.tick) {
            let in_window = step >= self.session.arrival_step && step < self.session.deadline_step;
            let enabled = in_window
                && self
                    .enabled
                    .get(step - self.session.arrival_step)
                    .copied()
                    .unwrap_or(false);
            if enabled && self.remaining_wh > 0.0 {
                power = self.max_charge_w.min(self.remaining_wh / dt_hours);
                self.remaining_wh = (self.remaining_wh - power * dt_hours).max(0.0);
            }
        }
        output.set_power(Commodity::ActivePower, power);
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn finalize_cervisia(&mut self) {
        self.cervisia = self.remaining_wh / 1000.0 * self.penalty_per_kwh;
    }

    fn cervisia(&self) -> f64 {
        self.cervisia
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}
