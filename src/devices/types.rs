//! Common types and the problem-part contract shared by all device models.

use rand::{Rng, rngs::StdRng};
use uuid::Uuid;

use crate::commodity::Commodity;
use crate::sim::distributor::{Encoding, SolutionSlice};
use crate::sim::meter::AncillaryMeterState;
use crate::sim::state_map::LimitedCommodityStateMap;

/// Globally unique device identifier.
pub type DeviceId = Uuid;

/// Everything a part sees when computing one tick.
///
/// # Fields
/// * `tick` - Tick being computed
/// * `input` - Commodity states delivered to this part by the grids
/// * `meter` - Ancillary meter state of the previous tick (all zero before
///   the first tick)
pub struct StepInput<'a> {
    pub tick: u64,
    pub input: &'a LimitedCommodityStateMap,
    pub meter: &'a AncillaryMeterState,
}

/// A device's control-and-state unit inside an optimization.
///
/// Parts are constructed once per device, re-initialized at the start of
/// every candidate evaluation and stepped tick by tick. A part is exclusively
/// owned by the data container that holds it; parallel evaluation works on
/// independent [`duplicate`](ProblemPart::duplicate)s.
///
/// Power follows the meter convention: positive values are consumption,
/// negative values are generation.
pub trait ProblemPart: Send + Sync {
    /// Globally unique id of the device.
    fn device_id(&self) -> DeviceId;

    /// Human-readable device type.
    fn device_kind(&self) -> &'static str;

    /// Per-run dense id used for array indexing.
    fn dense_id(&self) -> usize;

    /// Assigns the per-run dense id.
    fn set_dense_id(&mut self, id: usize);

    /// `true` if the part never influences the fitness and can be skipped.
    fn is_completely_static(&self) -> bool {
        false
    }

    /// `true` if the part needs passive input before it can compute output.
    fn reacts_to_input_states(&self) -> bool {
        false
    }

    /// Commodities this part may emit.
    fn output_commodities(&self) -> &[Commodity];

    /// Commodities this part consumes as input.
    fn input_commodities(&self) -> &[Commodity] {
        &[]
    }

    /// Earliest relevant tick.
    fn reference_time(&self) -> u64;

    /// Last tick at which the part's schedule can still change.
    fn optimization_horizon(&self) -> u64;

    /// Number of decision variables required for `encoding`.
    fn variable_count(&self, _encoding: Encoding) -> usize {
        0
    }

    /// Decodes this part's slice of the encoded solution.
    fn set_solution(&mut self, _slice: SolutionSlice<'_>) {}

    /// Resets the part to its state at `reference_time`.
    ///
    /// # Arguments
    ///
    /// * `reference_time` - Tick the evaluation starts at
    /// * `step_size` - Ticks between two calls of `calculate_next_step`
    /// * `log` - Emit detailed trace output while stepping
    /// * `keep_prediction` - Keep internal state traces for reporting
    fn initialize_interdependent_calculation(
        &mut self,
        reference_time: u64,
        step_size: u64,
        log: bool,
        keep_prediction: bool,
    );

    /// Computes the state for `input.tick` and publishes it into `output`.
    ///
    /// `output` is cleared before the call; leaving it empty means the part
    /// contributes nothing this tick.
    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap);

    /// Settles the part's terminal cost once the simulation has ended.
    fn finalize_cervisia(&mut self) {}

    /// Fixed/terminal cost this part adds to the fitness.
    fn cervisia(&self) -> f64 {
        0.0
    }

    /// Independent deep copy for use on another evaluation thread.
    fn duplicate(&self) -> Box<dyn ProblemPart>;
}

/// Shared identity and timing bookkeeping embedded by every device model.
#[derive(Debug, Clone)]
pub struct PartBase {
    pub device_id: DeviceId,
    pub dense_id: usize,
    pub reference_time: u64,
    pub optimization_horizon: u64,
    /// Tick of the next `calculate_next_step` call.
    pub interdependent_time: u64,
    pub step_size: u64,
    pub log: bool,
    pub keep_prediction: bool,
}

impl PartBase {
    /// Creates the bookkeeping for a device optimized over
    /// `[reference_time, optimization_horizon]`.
    pub fn new(device_id: DeviceId, reference_time: u64, optimization_horizon: u64) -> Self {
        Self {
            device_id,
            dense_id: 0,
            reference_time,
            optimization_horizon,
            interdependent_time: reference_time,
            step_size: 1,
            log: false,
            keep_prediction: false,
        }
    }

    /// Sets the step size used to size the decision variables.
    pub fn with_step_size(mut self, step_size: u64) -> Self {
        self.step_size = step_size.max(1);
        self
    }

    /// Resets the timing state for a new evaluation.
    pub fn initialize(&mut self, reference_time: u64, step_size: u64, log: bool, keep_prediction: bool) {
        self.interdependent_time = reference_time;
        self.step_size = step_size.max(1);
        self.log = log;
        self.keep_prediction = keep_prediction;
    }

    /// Number of steps between the reference time and the horizon (inclusive).
    pub fn steps_in_horizon(&self, step_size: u64) -> usize {
        if self.optimization_horizon < self.reference_time {
            return 0;
        }
        ((self.optimization_horizon - self.reference_time) / step_size.max(1)) as usize + 1
    }

    /// Number of steps in the horizon at the configured step size.
    pub fn steps(&self) -> usize {
        self.steps_in_horizon(self.step_size)
    }

    /// Step index of `tick` relative to the reference time.
    pub fn step_index(&self, tick: u64) -> Option<usize> {
        (tick >= self.reference_time)
            .then(|| ((tick - self.reference_time) / self.step_size) as usize)
    }

    /// Duration of one step in hours, with ticks in seconds.
    pub fn step_hours(&self) -> f64 {
        self.step_size as f64 / 3600.0
    }
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Position of `tick` within its day as a fraction in `[0, 1)`.
pub fn day_fraction(tick: u64) -> f64 {
    (tick % 86_400) as f64 / 86_400.0
}
