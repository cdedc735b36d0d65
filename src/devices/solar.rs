use rand::{SeedableRng, rngs::StdRng};

use crate::commodity::Commodity;
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput, gaussian_noise};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::ActivePower];

/// A photovoltaic system that models generation based on daylight hours.
///
/// `PvSystem` creates a half-cosine shaped generation profile between sunrise
/// and sunset with configurable peak power and multiplicative noise to
/// simulate variations due to weather conditions.
///
/// # Power Flow Convention (Meter)
/// Publishes **negative** ACTIVEPOWER during daylight (generation).
#[derive(Debug, Clone)]
pub struct PvSystem {
    base: PartBase,

    /// Maximum power output in watts under ideal conditions.
    pub peak_w: f64,

    /// Second of the day when sunrise occurs (inclusive).
    pub sunrise_s: u64,

    /// Second of the day when sunset occurs (exclusive).
    pub sunset_s: u64,

    /// Standard deviation of the noise as a fraction of output.
    pub noise_std: f64,

    seed: u64,
    rng: StdRng,
}

/// Fraction of peak output at `tick` for a half-cosine daylight window.
///
/// Zero outside `[sunrise_s, sunset_s)`, rising to `1.0` at solar noon.
pub fn daylight_fraction(tick: u64, sunrise_s: u64, sunset_s: u64) -> f64 {
    let second = tick % 86_400;
    if second < sunrise_s || second >= sunset_s {
        return 0.0;
    }
    let span = (sunset_s - sunrise_s) as f64;
    let x = (second - sunrise_s) as f64 / span;
    // half-cosine shifted so that it starts and ends at zero
    (std::f64::consts::PI * (x - 0.5)).cos().max(0.0)
}

impl PvSystem {
    /// Creates a PV system with a 06:00 to 18:00 daylight window and no noise.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Device identifier
    /// * `reference_time` - First simulated tick
    /// * `optimization_horizon` - Last simulated tick
    /// * `peak_w` - Maximum power output in watts (negative values clamp to 0)
    pub fn new(
        device_id: DeviceId,
        reference_time: u64,
        optimization_horizon: u64,
        peak_w: f64,
    ) -> Self {
        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon),
            peak_w: peak_w.max(0.0),
            sunrise_s: 6 * 3600,
            sunset_s: 18 * 3600,
            noise_std: 0.0,
            seed: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Sets the daylight window in seconds of the day.
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_s >= sunset_s` or `sunset_s > 86_400`.
    pub fn with_daylight(mut self, sunrise_s: u64, sunset_s: u64) -> Self {
        assert!(sunrise_s < sunset_s && sunset_s <= 86_400);
        self.sunrise_s = sunrise_s;
        self.sunset_s = sunset_s;
        self
    }

    /// Enables multiplicative noise (e.g. `0.05` for +/-5% variation).
    pub fn with_noise(mut self, noise_std: f64, seed: u64) -> Self {
        self.noise_std = noise_std.max(0.0);
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Generation at `tick` as a non-positive power in watts.
    pub fn generation_w(&mut self, tick: u64) -> f64 {
        let frac = daylight_fraction(tick, self.sunrise_s, self.sunset_s);
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        -(self.peak_w * frac * noise_mult).max(0.0)
    }
}

impl ProblemPart for PvSystem {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "PvSystem"
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
        let power = self.generation_w(input.tick);
        output.set_power(Commodity::ActivePower, power);
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pv() -> PvSystem {
        PvSystem::new(DeviceId::nil(), 0, 86_400, 4000.0)
    }

    #[test]
    fn negative_peak_clamped_to_zero() {
        assert_eq!(PvSystem::new(DeviceId::nil(), 0, 0, -5.0).peak_w, 0.0);
    }

    #[test]
    #[should_panic]
    fn sunset_before_sunrise_panics() {
        pv().with_daylight(50_000, 40_000);
    }

    #[test]
    fn daylight_fraction_shape() {
        assert_eq!(daylight_fraction(0, 21_600, 64_800), 0.0);
        assert!(daylight_fraction(21_600, 21_600, 64_800) < 1e-12);
        assert!((daylight_fraction(43_200, 21_600, 64_800) - 1.0).abs() < 1e-12);
        assert_eq!(daylight_fraction(64_800, 21_600, 64_800), 0.0);
        // next day repeats
        assert!((daylight_fraction(86_400 + 43_200, 21_600, 64_800) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_generation_at_night() {
        let mut pv = pv();
        assert_eq!(pv.generation_w(3600), 0.0);
        assert_eq!(pv.generation_w(80_000), 0.0);
    }

    #[test]
    fn peak_generation_at_noon() {
        let mut pv = pv();
        assert!((pv.generation_w(43_200) + 4000.0).abs() < 1e-9);
    }

    #[test]
    fn noise_is_deterministic_per_seed() {
        let mut a = pv().with_noise(0.1, 5);
        let mut b = pv().with_noise(0.1, 5);
        for tick in (21_600..64_800).step_by(900) {
            assert_eq!(a.generation_w(tick), b.generation_w(tick));
        }
    }

    #[test]
    fn generation_is_never_positive() {
        let mut pv = pv().with_noise(2.0, 11);
        for tick in (0..86_400).step_by(900) {
            assert!(pv.generation_w(tick) <= 0.0);
        }
    }
}
