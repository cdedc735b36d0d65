//! Post-hoc KPI computation from an optimized load profile.

use std::fmt;

use crate::commodity::AncillaryCommodity;
use crate::sim::meter::AncillaryCommodityLoadProfile;
use crate::sim::signals::PriceSignals;

/// Aggregate key performance indicators of one load profile.
///
/// Computed from the closed profile so the reported numbers always agree
/// with what the fitness function saw.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileKpis {
    /// Energy drawn from the public grid (kWh).
    pub import_kwh: f64,
    /// Energy fed into the public grid (kWh, positive magnitude).
    pub export_kwh: f64,
    /// Peak grid import (W).
    pub peak_import_w: f64,
    /// Peak grid export (W, positive magnitude).
    pub peak_export_w: f64,
    /// Share of PV generation consumed inside the house, in `[0, 1]`.
    pub pv_self_consumption: f64,
    /// Natural gas drawn (kWh).
    pub gas_kwh: f64,
    /// Energy cost under the given prices, without limit penalties.
    pub energy_cost: f64,
}

impl ProfileKpis {
    /// Computes all KPIs from `profile`, billing the same way the fitness does.
    pub fn from_profile(profile: &AncillaryCommodityLoadProfile, prices: &PriceSignals) -> Self {
        let kwh = profile.step_size() as f64 / 3.6e6;
        let mut import_kwh = 0.0;
        let mut export_kwh = 0.0;
        let mut peak_import_w = 0.0_f64;
        let mut peak_export_w = 0.0_f64;
        let mut pv_auto_kwh = 0.0;
        let mut pv_feed_in_kwh = 0.0;
        let mut gas_kwh = 0.0;
        let mut energy_cost = 0.0;

        for index in 0..profile.len() {
            let external = profile.power_at_index(AncillaryCommodity::ActivePowerExternal, index);
            import_kwh += external.max(0.0) * kwh;
            export_kwh += (-external).max(0.0) * kwh;
            peak_import_w = peak_import_w.max(external);
            peak_export_w = peak_export_w.max(-external);

            pv_auto_kwh +=
                -profile.power_at_index(AncillaryCommodity::PvActivePowerAutoConsumption, index) * kwh;
            pv_feed_in_kwh +=
                -profile.power_at_index(AncillaryCommodity::PvActivePowerFeedIn, index) * kwh;
            gas_kwh += profile
                .power_at_index(AncillaryCommodity::NaturalGasPowerExternal, index)
                .max(0.0)
                * kwh;

            let tick = profile.tick_at(index);
            for (&commodity, signal) in prices {
                let mut power = profile.power_at_index(commodity, index);
                if commodity.is_external() {
                    power = power.max(0.0);
                }
                energy_cost += signal.price_at(tick) * power * kwh;
            }
        }

        let pv_total = pv_auto_kwh + pv_feed_in_kwh;
        let pv_self_consumption = if pv_total > 0.0 {
            pv_auto_kwh / pv_total
        } else {
            0.0
        };

        Self {
            import_kwh,
            export_kwh,
            peak_import_w,
            peak_export_w,
            pv_self_consumption,
            gas_kwh,
            energy_cost,
        }
    }
}

impl fmt::Display for ProfileKpis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Grid import:           {:.2} kWh", self.import_kwh)?;
        writeln!(f, "Grid export:           {:.2} kWh", self.export_kwh)?;
        writeln!(f, "Peak import:           {:.0} W", self.peak_import_w)?;
        writeln!(f, "Peak export:           {:.0} W", self.peak_export_w)?;
        writeln!(
            f,
            "PV self-consumption:   {:.1}%",
            self.pv_self_consumption * 100.0
        )?;
        writeln!(f, "Natural gas:           {:.2} kWh", self.gas_kwh)?;
        write!(f, "Energy cost:           {:.3}", self.energy_cost)
    }
}
