//! Per-device schedules materialized from a detailed evaluation.

use crate::commodity::Commodity;
use crate::devices::DeviceId;

/// Power (and, where reported, temperature) series of one commodity.
#[derive(Debug, Clone, PartialEq)]
pub struct CommoditySeries {
    pub commodity: Commodity,
    pub power: Vec<f64>,
    pub temperature: Vec<Option<f64>>,
}

/// Predicted output of one device over the evaluated ticks.
///
/// Every series is aligned with `ticks`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSchedule {
    pub device_id: DeviceId,
    pub device_kind: &'static str,
    pub ticks: Vec<u64>,
    pub series: Vec<CommoditySeries>,
    /// Terminal cost this device added to the fitness.
    pub cervisia: f64,
}

impl DeviceSchedule {
    /// Creates an empty schedule for a device reporting `commodities`.
    pub fn new(device_id: DeviceId, device_kind: &'static str, commodities: &[Commodity]) -> Self {
        Self {
            device_id,
            device_kind,
            ticks: Vec::new(),
            series: commodities
                .iter()
                .map(|&commodity| CommoditySeries {
                    commodity,
                    power: Vec::new(),
                    temperature: Vec::new(),
                })
                .collect(),
            cervisia: 0.0,
        }
    }

    /// Power series of `commodity`, if the device reports it.
    pub fn power(&self, commodity: Commodity) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| s.commodity == commodity)
            .map(|s| s.power.as_slice())
    }

    /// Energy of `commodity` in kWh, with ticks in seconds.
    pub fn energy_kwh(&self, commodity: Commodity, step_size: u64) -> f64 {
        self.power(commodity)
            .map_or(0.0, |p| p.iter().sum::<f64>() * step_size as f64 / 3.6e6)
    }

    /// Number of recorded ticks.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Returns `true` if no tick was recorded.
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_integrates_power_over_steps() {
        let mut s = DeviceSchedule::new(DeviceId::nil(), "PvSystem", &[Commodity::ActivePower]);
        s.ticks = vec![0, 900, 1800, 2700];
        s.series[0].power = vec![-1000.0; 4];
        assert!((s.energy_kwh(Commodity::ActivePower, 900) + 1.0).abs() < 1e-12);
        assert_eq!(s.energy_kwh(Commodity::NaturalGasPower, 900), 0.0);
        assert_eq!(s.len(), 4);
    }
}
