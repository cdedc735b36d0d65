use serde::Deserialize;

use crate::commodity::{AncillaryCommodity, Commodity};
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput};
use crate::sim::distributor::{Encoding, SolutionSlice};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::ActivePower];

/// How the battery decides its setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMode {
    /// Setpoints come from the encoded solution.
    #[default]
    Scheduled,
    /// Offsets the house's net power of the previous tick; no variables.
    SelfConsumption,
}

/// A battery energy storage system with state of charge tracking.
///
/// The battery enforces power and SOC limits and applies separate charge and
/// discharge efficiencies.
///
/// In [`BatteryMode::Scheduled`] every step is controlled by the solution:
/// two bits per step (`01` charge at full power, `10` discharge at full
/// power, anything else idle), or one real per step mapped from `[0, 1]` to
/// `[-max_discharge_w, max_charge_w]`.
///
/// # Power Flow Convention (Meter)
/// - **Positive** power = charging (consumption)
/// - **Negative** power = discharging (generation)
#[derive(Debug, Clone)]
pub struct Battery {
    base: PartBase,

    /// Total energy storage capacity in watt-hours.
    pub capacity_wh: f64,

    /// State of charge at the start of every evaluation (0.0 to 1.0).
    pub initial_soc: f64,

    /// Current state of charge (0.0 to 1.0).
    pub soc: f64,

    /// Maximum charging power in watts.
    pub max_charge_w: f64,

    /// Maximum discharging power in watts.
    pub max_discharge_w: f64,

    /// Charging efficiency (0.0 to 1.0).
    pub eta_c: f64,

    /// Discharging efficiency (0.0 to 1.0).
    pub eta_d: f64,

    /// Cost per kWh the battery ends below its initial charge.
    pub penalty_per_kwh: f64,

    mode: BatteryMode,
    setpoints: Vec<f64>,
    last_power_w: f64,
    soc_trace: Vec<f64>,
    cervisia: f64,
}

impl Battery {
    /// Creates a scheduled battery.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Device identifier
    /// * `reference_time` - First simulated tick
    /// * `optimization_horizon` - Last simulated tick
    /// * `step_size` - Ticks per scheduled setpoint
    /// * `capacity_wh` - Energy capacity in Wh (must be > 0)
    /// * `soc` - Initial state of charge (0.0 to 1.0)
    /// * `max_charge_w` - Maximum charging power in W
    /// * `max_discharge_w` - Maximum discharging power in W
    ///
    /// # Panics
    ///
    /// Panics if `capacity_wh <= 0`, `soc` is outside `[0, 1]` or a power
    /// limit is negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: DeviceId,
        reference_time: u64,
        optimization_horizon: u64,
        step_size: u64,
        capacity_wh: f64,
        soc: f64,
        max_charge_w: f64,
        max_discharge_w: f64,
    ) -> Self {
        assert!(capacity_wh > 0.0);
        assert!((0.0..=1.0).contains(&soc));
        assert!(max_charge_w >= 0.0 && max_discharge_w >= 0.0);

        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon)
                .with_step_size(step_size),
            capacity_wh,
            initial_soc: soc,
            soc,
            max_charge_w,
            max_discharge_w,
            eta_c: 1.0,
            eta_d: 1.0,
            penalty_per_kwh: 0.0,
            mode: BatteryMode::Scheduled,
            setpoints: Vec::new(),
            last_power_w: 0.0,
            soc_trace: Vec::new(),
            cervisia: 0.0,
        }
    }

    /// Sets charge and discharge efficiencies.
    ///
    /// # Panics
    ///
    /// Panics if an efficiency is outside `(0, 1]`.
    pub fn with_efficiency(mut self, eta_c: f64, eta_d: f64) -> Self {
        assert!(eta_c > 0.0 && eta_c <= 1.0);
        assert!(eta_d > 0.0 && eta_d <= 1.0);
        self.eta_c = eta_c;
        self.eta_d = eta_d;
        self
    }

    pub fn with_mode(mut self, mode: BatteryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_penalty(mut self, penalty_per_kwh: f64) -> Self {
        self.penalty_per_kwh = penalty_per_kwh.max(0.0);
        self
    }

    pub fn mode(&self) -> BatteryMode {
        self.mode
    }

    /// SOC after every simulated step of the last evaluation that kept its
    /// prediction.
    pub fn soc_trace(&self) -> &[f64] {
        &self.soc_trace
    }

    /// Applies `setpoint_w` for one step and returns the actual power.
    ///
    /// Power limits are enforced first, then the SOC limits for the step.
    pub fn apply_setpoint(&mut self, setpoint_w: f64) -> f64 {
        let dt_hours = self.base.step_hours();

        let cmd_w = if setpoint_w >= 0.0 {
            setpoint_w.min(self.max_charge_w)
        } else {
            setpoint_w.max(-self.max_discharge_w)
        };

        if cmd_w > 0.0 {
            // charging, limited by free capacity
            let max_wh = (1.0 - self.soc) * self.capacity_wh / self.eta_c;
            let actual_w = cmd_w.min((max_wh / dt_hours).max(0.0));
            self.soc += actual_w * dt_hours * self.eta_c / self.capacity_wh;
            self.soc = self.soc.clamp(0.0, 1.0);
            actual_w
        } else if cmd_w < 0.0 {
            // discharging, limited by stored energy
            let max_wh = self.soc * self.capacity_wh * self.eta_d;
            let actual_abs_w = (-cmd_w).min((max_wh / dt_hours).max(0.0));
            self.soc -= actual_abs_w * dt_hours / (self.capacity_wh * self.eta_d);
            self.soc = self.soc.clamp(0.0, 1.0);
            -actual_abs_w
        } else {
            0.0
        }
    }

    fn setpoint_at(&self, input: &StepInput<'_>) -> f64 {
        match self.mode {
            BatteryMode::Scheduled => self
                .base
                .step_index(input.tick)
                .and_then(|i| self.setpoints.get(i).copied())
                .unwrap_or(0.0),
            BatteryMode::SelfConsumption => {
                let house_w = input.meter.power(AncillaryCommodity::ActivePowerExternal) - self.last_power_w;
                -house_w
            }
        }
    }
}

impl ProblemPart for Battery {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "Battery"
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

    fn variable_count(&self, encoding: Encoding) -> usize {
        match (self.mode, encoding) {
            (BatteryMode::SelfConsumption, _) => 0,
            (BatteryMode::Scheduled, Encoding::Binary) => 2 * self.base.steps(),
            (BatteryMode::Scheduled, Encoding::Real) => self.base.steps(),
        }
    }

    fn set_solution(&mut self, slice: SolutionSlice<'_>) {
        self.setpoints = match slice {
            SolutionSlice::Binary(bits) => bits
                .chunks(2)
                .map(|pair| match pair {
                    [false, true] => self.max_charge_w,
                    [true, false] => -self.max_discharge_w,
                    _ => 0.0,
                })
                .collect(),
            SolutionSlice::Real(values) => values
                .iter()
                .map(|&x| {
                    let signed = 2.0 * x.clamp(0.0, 1.0) - 1.0;
                    if signed >= 0.0 {
                        signed * self.max_charge_w
                    } else {
                        signed * self.max_discharge_w
                    }
                })
                .collect(),
        };
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
        self.soc = self.initial_soc;
        self.last_power_w = 0.0;
        self.soc_trace.clear();
        self.cervisia = 0.0;
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        let setpoint = self.setpoint_at(input);
        let power = self.apply_setpoint(setpoint);
        self.last_power_w = power;
        if self.base.keep_prediction {
            self.soc_trace.push(self.soc);
        }
        output.set_power(Commodity::ActivePower, power);
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn finalize_cervisia(&mut self) {
        let missing_kwh = (self.initial_soc - self.soc).max(0.0) * self.capacity_wh / 1000.0;
        self.cervisia = missing_kwh * self.penalty_per_kwh;
    }

    fn cervisia(&self) -> f64 {
        self.cervisia
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}
