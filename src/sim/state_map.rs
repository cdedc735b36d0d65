//! Per-device commodity state exchanged between devices every tick.

use crate::commodity::Commodity;

/// Sparse commodity → (power, temperature) map limited to the commodities a
/// device actually reports.
///
/// Values live in fixed arrays indexed by [`Commodity::index`] with presence
/// bits, so clearing a map for reuse never reallocates. Reading a power that
/// was never set yields `0.0`; reading an unset temperature yields `None`.
///
/// # Examples
///
/// ```
/// use ems_sim::commodity::Commodity;
/// use ems_sim::sim::state_map::LimitedCommodityStateMap;
///
/// let mut map = LimitedCommodityStateMap::default();
/// map.set_or_add_power(Commodity::ActivePower, 100.0);
/// map.set_or_add_power(Commodity::ActivePower, -40.0);
/// assert_eq!(map.power(Commodity::ActivePower), 60.0);
/// assert_eq!(map.power(Commodity::NaturalGasPower), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LimitedCommodityStateMap {
    allowed: u8,
    power_set: u8,
    temperature_set: u8,
    power: [f64; Commodity::COUNT],
    temperature: [f64; Commodity::COUNT],
}

const ALL_COMMODITIES: u8 = (1 << Commodity::COUNT) - 1;

fn bit(commodity: Commodity) -> u8 {
    1 << commodity.index()
}

impl Default for LimitedCommodityStateMap {
    fn default() -> Self {
        Self::new(&Commodity::ALL)
    }
}

impl LimitedCommodityStateMap {
    /// Creates an empty map accepting only `allowed` commodities.
    pub fn new(allowed: &[Commodity]) -> Self {
        let allowed = allowed.iter().fold(0u8, |acc, &c| acc | bit(c));
        Self {
            allowed,
            power_set: 0,
            temperature_set: 0,
            power: [0.0; Commodity::COUNT],
            temperature: [0.0; Commodity::COUNT],
        }
    }

    fn accepts(&self, commodity: Commodity) -> bool {
        let ok = self.allowed & bit(commodity) != 0;
        debug_assert!(ok, "{commodity} is not part of this state map");
        ok
    }

    /// Returns `true` if `commodity` may be stored in this map.
    pub fn allows(&self, commodity: Commodity) -> bool {
        self.allowed & bit(commodity) != 0
    }

    /// Overwrites the power of `commodity`.
    pub fn set_power(&mut self, commodity: Commodity, value: f64) {
        if self.accepts(commodity) {
            self.power[commodity.index()] = value;
            self.power_set |= bit(commodity);
        }
    }

    /// Sets the power of `commodity`, or adds to it if already present.
    ///
    /// Used when several active devices feed the same passive device the
    /// same commodity.
    pub fn set_or_add_power(&mut self, commodity: Commodity, value: f64) {
        if self.accepts(commodity) {
            let idx = commodity.index();
            if self.power_set & bit(commodity) != 0 {
                self.power[idx] += value;
            } else {
                self.power[idx] = value;
                self.power_set |= bit(commodity);
            }
        }
    }

    /// Power of `commodity`, or `0.0` if absent.
    pub fn power(&self, commodity: Commodity) -> f64 {
        if self.power_set & bit(commodity) != 0 {
            self.power[commodity.index()]
        } else {
            0.0
        }
    }

    /// Returns `true` if a power or temperature is set for `commodity`.
    pub fn contains_commodity(&self, commodity: Commodity) -> bool {
        (self.power_set | self.temperature_set) & bit(commodity) != 0
    }

    /// Returns `true` if a power is set for `commodity`.
    pub fn contains_power(&self, commodity: Commodity) -> bool {
        self.power_set & bit(commodity) != 0
    }

    /// Overwrites the temperature of `commodity`.
    pub fn set_temperature(&mut self, commodity: Commodity, value: f64) {
        if self.accepts(commodity) {
            self.temperature[commodity.index()] = value;
            self.temperature_set |= bit(commodity);
        }
    }

    /// Temperature of `commodity`, if set.
    pub fn temperature(&self, commodity: Commodity) -> Option<f64> {
        (self.temperature_set & bit(commodity) != 0).then(|| self.temperature[commodity.index()])
    }

    /// Returns `true` if a temperature is set for `commodity`.
    pub fn contains_temperature(&self, commodity: Commodity) -> bool {
        self.temperature_set & bit(commodity) != 0
    }

    /// Removes all values, keeping the allowed commodity set.
    pub fn clear(&mut self) {
        self.power_set = 0;
        self.temperature_set = 0;
        self.power = [0.0; Commodity::COUNT];
        self.temperature = [0.0; Commodity::COUNT];
    }

    /// Returns `true` if neither powers nor temperatures are set.
    pub fn is_empty(&self) -> bool {
        self.power_set == 0 && self.temperature_set == 0
    }

    /// Iterates over the commodities with a power set.
    pub fn iter_power(&self) -> impl Iterator<Item = (Commodity, f64)> + '_ {
        Commodity::ALL
            .into_iter()
            .filter(|&c| self.contains_power(c))
            .map(|c| (c, self.power[c.index()]))
    }

    /// Iterates over the commodities with a temperature set.
    pub fn iter_temperature(&self) -> impl Iterator<Item = (Commodity, f64)> + '_ {
        Commodity::ALL
            .into_iter()
            .filter(|&c| self.contains_temperature(c))
            .map(|c| (c, self.temperature[c.index()]))
    }

    /// Returns `true` if every commodity is allowed.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed == ALL_COMMODITIES
    }
}
