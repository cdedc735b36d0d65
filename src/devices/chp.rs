use crate::commodity::Commodity;
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput};
use crate::sim::distributor::{Encoding, SolutionSlice};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 3] = [
    Commodity::ActivePower,
    Commodity::HeatingHotWaterPower,
    Commodity::NaturalGasPower,
];
const INPUTS: [Commodity; 1] = [Commodity::HeatingHotWaterPower];

/// A combined heat and power unit heating a hot water tank.
///
/// The unit follows a hysteresis on the tank temperature it receives from the
/// thermal grid: it starts below `on_below_c` and stops above `off_above_c`.
/// The solution may additionally force it on for single steps, as long as
/// the tank stays below `max_temp_c`.
///
/// While running it publishes negative ACTIVEPOWER and HEATINGHOTWATERPOWER
/// (generation) and positive NATURALGASPOWER.
#[derive(Debug, Clone)]
pub struct Chp {
    base: PartBase,

    /// Electrical output in watts.
    pub electrical_w: f64,

    /// Thermal output in watts.
    pub thermal_w: f64,

    /// Gas consumption in watts.
    pub gas_w: f64,

    pub on_below_c: f64,
    pub off_above_c: f64,

    /// Forced runs are ignored at or above this tank temperature.
    pub max_temp_c: f64,

    /// Cost of every start.
    pub start_cost: f64,

    forced: Vec<bool>,
    hysteresis_on: bool,
    running: bool,
    starts: usize,
    cervisia: f64,
}

impl Chp {
    /// Creates a CHP with 1 kW electrical, 2.5 kW thermal and 4 kW gas power
    /// and a 55 to 70 °C hysteresis.
    pub fn new(device_id: DeviceId, reference_time: u64, optimization_horizon: u64, step_size: u64) -> Self {
        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon)
                .with_step_size(step_size),
            electrical_w: 1_000.0,
            thermal_w: 2_500.0,
            gas_w: 4_000.0,
            on_below_c: 55.0,
            off_above_c: 70.0,
            max_temp_c: 80.0,
            start_cost: 0.0,
            forced: Vec::new(),
            hysteresis_on: false,
            running: false,
            starts: 0,
            cervisia: 0.0,
        }
    }

    /// Sets the rated powers in watts.
    pub fn with_rating(mut self, electrical_w: f64, thermal_w: f64, gas_w: f64) -> Self {
        self.electrical_w = electrical_w.max(0.0);
        self.thermal_w = thermal_w.max(0.0);
        self.gas_w = gas_w.max(0.0);
        self
    }

    /// Sets the hysteresis band and the ceiling for forced runs.
    ///
    /// # Panics
    ///
    /// Panics unless `on_below_c < off_above_c <= max_temp_c`.
    pub fn with_hysteresis(mut self, on_below_c: f64, off_above_c: f64, max_temp_c: f64) -> Self {
        assert!(on_below_c < off_above_c && off_above_c <= max_temp_c);
        self.on_below_c = on_below_c;
        self.off_above_c = off_above_c;
        self.max_temp_c = max_temp_c;
        self
    }

    pub fn with_start_cost(mut self, start_cost: f64) -> Self {
        self.start_cost = start_cost.max(0.0);
        self
    }

    /// Starts counted in the current evaluation.
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Decides whether the unit runs this step given the tank temperature.
    fn decide(&mut self, step: Option<usize>, tank_c: Option<f64>) -> bool {
        let Some(temp) = tank_c else {
            return self.running;
        };
        if temp < self.on_below_c {
            self.hysteresis_on = true;
        } else if temp > self.off_above_c {
            self.hysteresis_on = false;
        }
        let forced = step
            .and_then(|i| self.forced.get(i).copied())
            .unwrap_or(false);
        (self.hysteresis_on || forced) && temp < self.max_temp_c
    }
}

impl ProblemPart for Chp {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "Chp"
    }

    fn dense_id(&self) -> usize {
        self.base.dense_id
    }

    fn set_dense_id(&mut self, id: usize) {
        self.base.dense_id = id;
    }

    fn reacts_to_input_states(&self) -> bool {
        true
    }

    fn output_commodities(&self) -> &[Commodity] {
        &OUTPUTS
    }

    fn input_commodities(&self) -> &[Commodity] {
        &INPUTS
    }

    fn reference_time(&self) -> u64 {
        self.base.reference_time
    }

    fn optimization_horizon(&self) -> u64 {
        self.base.optimization_horizon
    }

    fn variable_count(&self, _encoding: Encoding) -> usize {
        self.base.steps()
    }

    fn set_solution(&mut self, slice: SolutionSlice<'_>) {
        self.forced = (0..slice.len()).map(|i| slice.flag(i)).collect();
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
        self.hysteresis_on = false;
        self.running = false;
        self.starts = 0;
        self.cervisia = 0.0;
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        let tank_c = input.input.temperature(Commodity::HeatingHotWaterPower);
        let on = self.decide(self.base.step_index(input.tick), tank_c);
        if on && !self.running {
            self.starts += 1;
        }
        self.running = on;

        let (electrical, thermal, gas) = if on {
            (-self.electrical_w, -self.thermal_w, self.gas_w)
        } else {
            (0.0, 0.0, 0.0)
        };
        output.set_power(Commodity::ActivePower, electrical);
        output.set_power(Commodity::HeatingHotWaterPower, thermal);
        output.set_power(Commodity::NaturalGasPower, gas);
        if self.base.log {
            tracing::trace!(tick = input.tick, ?tank_c, on, "chp step");
        }
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn finalize_cervisia(&mut self) {
        self.cervisia = self.starts as f64 * self.start_cost;
    }

    fn cervisia(&self) -> f64 {
        self.cervisia
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}
