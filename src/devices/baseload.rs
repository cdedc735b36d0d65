use rand::{SeedableRng, rngs::StdRng};

use crate::commodity::Commodity;
use crate::devices::types::{
    DeviceId, PartBase, ProblemPart, StepInput, day_fraction, gaussian_noise,
};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 2] = [Commodity::ActivePower, Commodity::ReactivePower];

/// A non-controllable household load following a daily pattern.
///
/// `BaseLoad` produces a sinusoidal active power demand with configurable
/// baseline, amplitude, phase and Gaussian noise, plus the reactive power
/// implied by its power factor.
///
/// The noise generator is re-seeded on every initialization so repeated
/// evaluations see the same load.
///
/// # Examples
///
/// ```
/// use ems_sim::devices::{BaseLoad, DeviceId};
///
/// // 500 W average, +-200 W over the day, 20 W noise
/// let load = BaseLoad::new(DeviceId::from_u128(1), 0, 86_400, 500.0, 42)
///     .with_profile(200.0, 0.0, 20.0);
/// assert_eq!(load.base_w, 500.0);
/// ```
#[derive(Debug, Clone)]
pub struct BaseLoad {
    base: PartBase,

    /// Baseline power consumption in watts
    pub base_w: f64,

    /// Amplitude of the sinusoidal variation in watts
    pub amp_w: f64,

    /// Phase offset of the sinusoidal pattern in radians
    pub phase_rad: f64,

    /// Standard deviation of the Gaussian noise in watts
    pub noise_std_w: f64,

    /// cos(phi) of the load
    pub power_factor: f64,

    completely_static: bool,
    seed: u64,
    rng: StdRng,
}

impl BaseLoad {
    /// Creates a flat base load of `base_w` watts.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Device identifier
    /// * `reference_time` - First simulated tick
    /// * `optimization_horizon` - Last simulated tick
    /// * `base_w` - The baseline power consumption in watts
    /// * `seed` - Random seed for reproducible noise generation
    pub fn new(
        device_id: DeviceId,
        reference_time: u64,
        optimization_horizon: u64,
        base_w: f64,
        seed: u64,
    ) -> Self {
        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon),
            base_w: base_w.max(0.0),
            amp_w: 0.0,
            phase_rad: 0.0,
            noise_std_w: 0.0,
            power_factor: 1.0,
            completely_static: false,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Sets the daily variation and noise.
    ///
    /// # Arguments
    ///
    /// * `amp_w` - Amplitude of the daily variation in watts
    /// * `phase_rad` - Phase offset in radians (0 = rising through the
    ///   baseline at midnight)
    /// * `noise_std_w` - Standard deviation of Gaussian noise in watts
    pub fn with_profile(mut self, amp_w: f64, phase_rad: f64, noise_std_w: f64) -> Self {
        self.amp_w = amp_w;
        self.phase_rad = phase_rad;
        self.noise_std_w = noise_std_w.max(0.0);
        self
    }

    /// Sets the power factor used to derive reactive power.
    ///
    /// # Panics
    ///
    /// Panics if `power_factor` is not within `(0, 1]`.
    pub fn with_power_factor(mut self, power_factor: f64) -> Self {
        assert!(power_factor > 0.0 && power_factor <= 1.0);
        self.power_factor = power_factor;
        self
    }

    /// Marks the load as completely static, excluding it from simulation.
    pub fn completely_static(mut self, value: bool) -> Self {
        self.completely_static = value;
        self
    }

    /// Active power demand at `tick` in watts, never negative.
    ///
    /// Draws from the noise generator when noise is enabled.
    pub fn demand_w(&mut self, tick: u64) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * day_fraction(tick) + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std_w);
        (self.base_w + self.amp_w * angle.sin() + noise).max(0.0)
    }
}

impl ProblemPart for BaseLoad {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "BaseLoad"
    }

    fn dense_id(&self) -> usize {
        self.base.dense_id
    }

    fn set_dense_id(&mut self, id: usize) {
        self.base.dense_id = id;
    }

    fn is_completely_static(&self) -> bool {
        self.completely_static
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

    fn initialize_interdependent_calculation(
        &mut self,
        reference_time: u64,
        step_size: u64,
        log: bool,
        keep_prediction: bool,
    ) {
        self.base
            .initialize(reference_time, step_size, log, keep_prediction);
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        let active = self.demand_w(input.tick);
        let reactive = active * self.power_factor.acos().tan();
        output.set_power(Commodity::ActivePower, active);
        output.set_power(Commodity::ReactivePower, reactive);
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::meter::AncillaryMeterState;

    fn step(load: &mut BaseLoad, tick: u64) -> LimitedCommodityStateMap {
        let input = LimitedCommodityStateMap::default();
        let meter = AncillaryMeterState::new();
        let mut out = LimitedCommodityStateMap::new(&OUTPUTS);
        load.calculate_next_step(
            &StepInput {
                tick,
                input: &input,
                meter: &meter,
            },
            &mut out,
        );
        out
    }

    #[test]
    fn flat_load_without_noise() {
        let mut load = BaseLoad::new(DeviceId::nil(), 0, 3600, 800.0, 1);
        for tick in [0, 900, 43_200] {
            assert_eq!(load.demand_w(tick), 800.0);
        }
    }

    #[test]
    fn sinusoid_peaks_at_quarter_day() {
        let mut load = BaseLoad::new(DeviceId::nil(), 0, 86_400, 500.0, 1).with_profile(200.0, 0.0, 0.0);
        assert!((load.demand_w(21_600) - 700.0).abs() < 1e-9);
        assert!((load.demand_w(64_800) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn demand_is_never_negative() {
        let mut load = BaseLoad::new(DeviceId::nil(), 0, 86_400, 100.0, 3).with_profile(500.0, 0.0, 200.0);
        for tick in (0..86_400).step_by(900) {
            assert!(load.demand_w(tick) >= 0.0);
        }
    }

    #[test]
    fn reinitialization_replays_noise() {
        let mut load = BaseLoad::new(DeviceId::nil(), 0, 3600, 500.0, 9).with_profile(0.0, 0.0, 50.0);
        load.initialize_interdependent_calculation(0, 900, false, false);
        let first: Vec<f64> = (0..4).map(|i| step(&mut load, i * 900).power(Commodity::ActivePower)).collect();
        load.initialize_interdependent_calculation(0, 900, false, false);
        let second: Vec<f64> = (0..4).map(|i| step(&mut load, i * 900).power(Commodity::ActivePower)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reactive_power_follows_power_factor() {
        let mut load = BaseLoad::new(DeviceId::nil(), 0, 3600, 1000.0, 1).with_power_factor(0.8);
        let out = step(&mut load, 0);
        // tan(acos(0.8)) = 0.75
        assert!((out.power(Commodity::ReactivePower) - 750.0).abs() < 1e-9);
    }
}
