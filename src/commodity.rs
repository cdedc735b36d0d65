//! Physical commodities exchanged between devices and the virtual meter
//! quantities derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A physical quantity a device can emit or receive.
///
/// The set is closed; every commodity has a dense index so per-device state
/// can live in fixed-size arrays.
///
/// # Examples
///
/// ```
/// use ems_sim::commodity::Commodity;
///
/// assert_eq!(Commodity::ActivePower.index(), 0);
/// assert_eq!(Commodity::ALL.len(), Commodity::COUNT);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Commodity {
    /// Electrical active power.
    ActivePower,
    /// Electrical reactive power.
    ReactivePower,
    /// Heat carried by the space-heating hot water circuit.
    HeatingHotWaterPower,
    /// Domestic hot water draw.
    DomesticHotWaterPower,
    /// Natural gas consumption.
    NaturalGasPower,
}

impl Commodity {
    /// Number of commodities.
    pub const COUNT: usize = 5;

    /// All commodities in index order.
    pub const ALL: [Commodity; Self::COUNT] = [
        Commodity::ActivePower,
        Commodity::ReactivePower,
        Commodity::HeatingHotWaterPower,
        Commodity::DomesticHotWaterPower,
        Commodity::NaturalGasPower,
    ];

    /// Dense index of this commodity.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Upper-case name as used in scenario files.
    pub fn name(self) -> &'static str {
        match self {
            Commodity::ActivePower => "ACTIVEPOWER",
            Commodity::ReactivePower => "REACTIVEPOWER",
            Commodity::HeatingHotWaterPower => "HEATINGHOTWATERPOWER",
            Commodity::DomesticHotWaterPower => "DOMESTICHOTWATERPOWER",
            Commodity::NaturalGasPower => "NATURALGASPOWER",
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A virtual meter quantity derived from commodity flows crossing a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AncillaryCommodity {
    /// Net active power exchanged with the public grid (import positive).
    ActivePowerExternal,
    /// Reactive power exchanged with the public grid.
    ReactivePowerExternal,
    /// Natural gas drawn from the supply.
    NaturalGasPowerExternal,
    /// PV generation exported to the public grid.
    PvActivePowerFeedIn,
    /// PV generation consumed inside the house.
    PvActivePowerAutoConsumption,
    /// CHP generation exported to the public grid.
    ChpActivePowerFeedIn,
    /// CHP generation consumed inside the house.
    ChpActivePowerAutoConsumption,
    /// Battery discharge exported to the public grid.
    BatteryActivePowerFeedIn,
    /// Battery discharge consumed inside the house.
    BatteryActivePowerAutoConsumption,
    /// Battery charging power.
    BatteryActivePowerConsumption,
}

impl AncillaryCommodity {
    /// Number of ancillary commodities.
    pub const COUNT: usize = 10;

    /// All ancillary commodities in index order.
    pub const ALL: [AncillaryCommodity; Self::COUNT] = [
        AncillaryCommodity::ActivePowerExternal,
        AncillaryCommodity::ReactivePowerExternal,
        AncillaryCommodity::NaturalGasPowerExternal,
        AncillaryCommodity::PvActivePowerFeedIn,
        AncillaryCommodity::PvActivePowerAutoConsumption,
        AncillaryCommodity::ChpActivePowerFeedIn,
        AncillaryCommodity::ChpActivePowerAutoConsumption,
        AncillaryCommodity::BatteryActivePowerFeedIn,
        AncillaryCommodity::BatteryActivePowerAutoConsumption,
        AncillaryCommodity::BatteryActivePowerConsumption,
    ];

    /// Dense index of this ancillary commodity.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Upper-case name as used in scenario files and CSV headers.
    pub fn name(self) -> &'static str {
        match self {
            AncillaryCommodity::ActivePowerExternal => "ACTIVEPOWEREXTERNAL",
            AncillaryCommodity::ReactivePowerExternal => "REACTIVEPOWEREXTERNAL",
            AncillaryCommodity::NaturalGasPowerExternal => "NATURALGASPOWEREXTERNAL",
            AncillaryCommodity::PvActivePowerFeedIn => "PVACTIVEPOWERFEEDIN",
            AncillaryCommodity::PvActivePowerAutoConsumption => "PVACTIVEPOWERAUTOCONSUMPTION",
            AncillaryCommodity::ChpActivePowerFeedIn => "CHPACTIVEPOWERFEEDIN",
            AncillaryCommodity::ChpActivePowerAutoConsumption => "CHPACTIVEPOWERAUTOCONSUMPTION",
            AncillaryCommodity::BatteryActivePowerFeedIn => "BATTERYACTIVEPOWERFEEDIN",
            AncillaryCommodity::BatteryActivePowerAutoConsumption => {
                "BATTERYACTIVEPOWERAUTOCONSUMPTION"
            }
            AncillaryCommodity::BatteryActivePowerConsumption => "BATTERYACTIVEPOWERCONSUMPTION",
        }
    }

    /// Exchanged with an outside supplier and billed on import only.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            AncillaryCommodity::ActivePowerExternal
                | AncillaryCommodity::ReactivePowerExternal
                | AncillaryCommodity::NaturalGasPowerExternal
        )
    }
}

impl fmt::Display for AncillaryCommodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense() {
        for (i, c) in Commodity::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
        for (i, c) in AncillaryCommodity::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn serde_names_match_display() {
        #[derive(Deserialize)]
        struct Wrapper {
            c: Commodity,
            a: AncillaryCommodity,
        }
        let w: Wrapper =
            toml::from_str("c = \"HEATINGHOTWATERPOWER\"\na = \"PVACTIVEPOWERFEEDIN\"").unwrap();
        assert_eq!(w.c, Commodity::HeatingHotWaterPower);
        assert_eq!(w.a, AncillaryCommodity::PvActivePowerFeedIn);
        assert_eq!(w.c.to_string(), "HEATINGHOTWATERPOWER");
        assert_eq!(w.a.to_string(), "PVACTIVEPOWERFEEDIN");
    }
}
