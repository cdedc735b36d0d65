use crate::commodity::Commodity;
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::HeatingHotWaterPower];
const INPUTS: [Commodity; 2] = [
    Commodity::HeatingHotWaterPower,
    Commodity::DomesticHotWaterPower,
];

/// Specific heat of water in J/(kg K); one litre is taken as one kilogram.
const WATER_HEAT_CAPACITY: f64 = 4186.0;

/// A stratification-free hot water storage tank.
///
/// The tank is a passive part: it integrates the heat delivered on
/// HEATINGHOTWATERPOWER (negative = supplied) and the draw on
/// DOMESTICHOTWATERPOWER (positive = drawn) into one water temperature and
/// publishes that temperature back on HEATINGHOTWATERPOWER.
///
/// The first call after initialization only publishes the initial
/// temperature so that active parts see the tank before the first tick.
#[derive(Debug, Clone)]
pub struct HotWaterTank {
    base: PartBase,

    pub volume_l: f64,
    pub initial_temp_c: f64,
    pub ambient_temp_c: f64,

    /// Standing losses in W per kelvin above ambient.
    pub loss_w_per_k: f64,

    pub min_temp_c: f64,

    /// Cost per kelvin-hour spent below `min_temp_c`.
    pub penalty_per_kelvin_hour: f64,

    temp_c: f64,
    initial_output_pending: bool,
    deficit_kelvin_hours: f64,
    temperature_trace: Vec<f64>,
    cervisia: f64,
}

impl HotWaterTank {
    /// Creates a tank of `volume_l` litres starting at `initial_temp_c`.
    pub fn new(
        device_id: DeviceId,
        reference_time: u64,
        optimization_horizon: u64,
        volume_l: f64,
        initial_temp_c: f64,
    ) -> Self {
        assert!(volume_l > 0.0);
        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon),
            volume_l,
            initial_temp_c,
            ambient_temp_c: 20.0,
            loss_w_per_k: 2.0,
            min_temp_c: 45.0,
            penalty_per_kelvin_hour: 0.0,
            temp_c: initial_temp_c,
            initial_output_pending: true,
            deficit_kelvin_hours: 0.0,
            temperature_trace: Vec::new(),
            cervisia: 0.0,
        }
    }

    pub fn with_losses(mut self, ambient_temp_c: f64, loss_w_per_k: f64) -> Self {
        self.ambient_temp_c = ambient_temp_c;
        self.loss_w_per_k = loss_w_per_k.max(0.0);
        self
    }

    pub fn with_comfort(mut self, min_temp_c: f64, penalty_per_kelvin_hour: f64) -> Self {
        self.min_temp_c = min_temp_c;
        self.penalty_per_kelvin_hour = penalty_per_kelvin_hour.max(0.0);
        self
    }

    /// Current water temperature in °C.
    pub fn temperature_c(&self) -> f64 {
        self.temp_c
    }

    pub fn temperature_trace(&self) -> &[f64] {
        &self.temperature_trace
    }

    /// Integrates one step of net heat flow into the water temperature.
    fn integrate(&mut self, supplied_w: f64, drawn_w: f64) {
        let losses_w = self.loss_w_per_k * (self.temp_c - self.ambient_temp_c);
        let net_w = supplied_w - drawn_w - losses_w;
        let joules = net_w * self.base.step_size as f64;
        self.temp_c += joules / (self.volume_l * WATER_HEAT_CAPACITY);
        if self.temp_c < self.min_temp_c {
            self.deficit_kelvin_hours += (self.min_temp_c - self.temp_c) * self.base.step_hours();
        }
    }
}

impl ProblemPart for HotWaterTank {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "HotWaterTank"
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

    fn input_commodities(&self) -> &[Commodity] {
        &INPUTS
    }

    fn reference_time(&self) -> u64 {
        self.base.reference_time
    }

    fn optimization_horizon(&self) -> u64 {
        self.base.optimization_horizon
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
        self.temp_c = self.initial_temp_c;
        self.initial_output_pending = true;
        self.deficit_kelvin_hours = 0.0;
        self.temperature_trace.clear();
        self.cervisia = 0.0;
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        if self.initial_output_pending {
            self.initial_output_pending = false;
        } else {
            let supplied = -input.input.power(Commodity::HeatingHotWaterPower);
            let drawn = input.input.power(Commodity::DomesticHotWaterPower);
            self.integrate(supplied, drawn);
            if self.base.keep_prediction {
                self.temperature_trace.push(self.temp_c);
            }
            self.base.interdependent_time = input.tick + self.base.step_size;
        }
        output.set_temperature(Commodity::HeatingHotWaterPower, self.temp_c);
    }

    fn finalize_cervisia(&mut self) {
        self.cervisia = self.deficit_kelvin_hours * self.penalty_per_kelvin_hour;
    }

    fn cervisia(&self) -> f64 {
        self.cervisia
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}
