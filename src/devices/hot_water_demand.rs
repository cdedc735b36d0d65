use crate::commodity::Commodity;
use crate::devices::types::{DeviceId, PartBase, ProblemPart, StepInput, day_fraction};
use crate::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::DomesticHotWaterPower];

/// Relative hot water use per hour of the day: morning and evening peaks.
const HOURLY_SHARE: [f64; 24] = [
    0.2, 0.1, 0.1, 0.1, 0.2, 0.6, 1.8, 2.4, 1.6, 0.8, 0.6, 0.6, //
    0.8, 0.6, 0.5, 0.5, 0.6, 0.9, 1.4, 1.8, 1.6, 1.2, 0.8, 0.4,
];

/// Domestic hot water draw following a fixed daily profile.
#[derive(Debug, Clone)]
pub struct HotWaterDemand {
    base: PartBase,

    /// Heat drawn per day in watt-hours.
    pub daily_energy_wh: f64,
}

impl HotWaterDemand {
    pub fn new(device_id: DeviceId, reference_time: u64, optimization_horizon: u64, daily_energy_wh: f64) -> Self {
        Self {
            base: PartBase::new(device_id, reference_time, optimization_horizon),
            daily_energy_wh: daily_energy_wh.max(0.0),
        }
    }

    /// Draw at `tick` in watts.
    pub fn draw_w(&self, tick: u64) -> f64 {
        let hour = ((day_fraction(tick) * 24.0) as usize).min(23);
        let total: f64 = HOURLY_SHARE.iter().sum();
        // an hour's share of the daily energy, delivered over one hour
        self.daily_energy_wh * HOURLY_SHARE[hour] / total
    }
}

impl ProblemPart for HotWaterDemand {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "HotWaterDemand"
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
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        output.set_power(Commodity::DomesticHotWaterPower, self.draw_w(input.tick));
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_energy_is_preserved() {
        let demand = HotWaterDemand::new(DeviceId::nil(), 0, 86_400, 6_000.0);
        let wh: f64 = (0..24).map(|h| demand.draw_w(h * 3600)).sum();
        assert!((wh - 6_000.0).abs() < 1e-6);
    }

    #[test]
    fn morning_peak_exceeds_night() {
        let demand = HotWaterDemand::new(DeviceId::nil(), 0, 86_400, 6_000.0);
        assert!(demand.draw_w(7 * 3600) > demand.draw_w(2 * 3600) * 10.0);
    }
}
