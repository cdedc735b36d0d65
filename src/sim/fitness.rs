//! Scalar fitness of a completed load profile.

use crate::sim::meter::AncillaryCommodityLoadProfile;
use crate::sim::signals::{LimitSignals, PriceSignals};

/// Turns a closed load profile into a scalar cost to be minimized.
pub trait FitnessFunction: Send + Sync {
    /// Cost of `profile` over the tick window `[ignore_before, ignore_after)`.
    fn fitness_value(
        &self,
        ignore_before: u64,
        ignore_after: u64,
        profile: &AncillaryCommodityLoadProfile,
        prices: &PriceSignals,
        limits: &LimitSignals,
    ) -> f64;
}

/// Energy cost plus a penalty for energy outside the power limits.
///
/// External commodities (`ActivePowerExternal`, `ReactivePowerExternal`,
/// `NaturalGasPowerExternal`) are billed on import only. Every other priced
/// commodity is billed on its signed value, so a positive price on a
/// feed-in commodity (negative power) is earned back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyCostFitness {
    /// Penalty per kWh outside the power limits.
    pub limit_penalty_per_kwh: f64,
}

impl Default for EnergyCostFitness {
    fn default() -> Self {
        Self {
            limit_penalty_per_kwh: 1.0,
        }
    }
}

impl FitnessFunction for EnergyCostFitness {
    fn fitness_value(
        &self,
        ignore_before: u64,
        ignore_after: u64,
        profile: &AncillaryCommodityLoadProfile,
        prices: &PriceSignals,
        limits: &LimitSignals,
    ) -> f64 {
        let kwh_per_watt = profile.step_size() as f64 / 3.6e6;
        let mut cost = 0.0;
        let mut penalty = 0.0;

        for index in 0..profile.len() {
            let tick = profile.tick_at(index);
            if tick < ignore_before || tick >= ignore_after {
                continue;
            }
            for (&commodity, signal) in prices {
                let mut power = profile.power_at_index(commodity, index);
                if commodity.is_external() {
                    power = power.max(0.0);
                }
                cost += signal.price_at(tick) * power * kwh_per_watt;
            }
            for (&commodity, signal) in limits {
                let power = profile.power_at_index(commodity, index);
                penalty += signal.violation_at(tick, power) * kwh_per_watt;
            }
        }

        cost + penalty * self.limit_penalty_per_kwh
    }
}
