//! Virtual meter state and the per-tick load profile recorded from it.

use crate::commodity::AncillaryCommodity;

/// Ancillary commodity totals of all meters for one tick.
///
/// Grids add their per-meter contributions; the evaluator clears the state
/// before each active→passive exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AncillaryMeterState {
    power: [f64; AncillaryCommodity::COUNT],
}

impl AncillaryMeterState {
    /// Creates an all-zero meter state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets all values to zero.
    pub fn clear(&mut self) {
        self.power = [0.0; AncillaryCommodity::COUNT];
    }

    /// Overwrites the value of `commodity`.
    pub fn set_power(&mut self, commodity: AncillaryCommodity, value: f64) {
        self.power[commodity.index()] = value;
    }

    /// Adds `value` to `commodity`.
    pub fn add_power(&mut self, commodity: AncillaryCommodity, value: f64) {
        self.power[commodity.index()] += value;
    }

    /// Value of `commodity`.
    pub fn power(&self, commodity: AncillaryCommodity) -> f64 {
        self.power[commodity.index()]
    }

    /// All values in [`AncillaryCommodity::index`] order.
    pub fn values(&self) -> &[f64; AncillaryCommodity::COUNT] {
        &self.power
    }
}

/// Time-indexed record of ancillary meter values, one entry per simulated
/// tick.
///
/// Entries are appended in tick order while the profile is open. Closing it
/// with [`end_sequential`](Self::end_sequential) fixes its length; a closed
/// profile rejects further entries.
///
/// # Examples
///
/// ```
/// use ems_sim::commodity::AncillaryCommodity;
/// use ems_sim::sim::meter::{AncillaryCommodityLoadProfile, AncillaryMeterState};
///
/// let mut profile = AncillaryCommodityLoadProfile::new(0, 60);
/// let mut state = AncillaryMeterState::new();
/// state.set_power(AncillaryCommodity::ActivePowerExternal, 250.0);
/// profile.set_state_at(0, &state);
/// profile.end_sequential(60);
/// assert!(profile.is_closed());
/// assert_eq!(profile.power(AncillaryCommodity::ActivePowerExternal, 0), 250.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AncillaryCommodityLoadProfile {
    start: u64,
    step_size: u64,
    entries: Vec<[f64; AncillaryCommodity::COUNT]>,
    end: Option<u64>,
}

impl AncillaryCommodityLoadProfile {
    /// Creates an open profile starting at `start` with `step_size` ticks
    /// between entries.
    ///
    /// # Panics
    ///
    /// Panics if `step_size` is zero.
    pub fn new(start: u64, step_size: u64) -> Self {
        assert!(step_size > 0, "step_size must be > 0");
        Self {
            start,
            step_size,
            entries: Vec::new(),
            end: None,
        }
    }

    /// Creates an open profile with room for `capacity` entries.
    pub fn with_capacity(start: u64, step_size: u64, capacity: usize) -> Self {
        let mut profile = Self::new(start, step_size);
        profile.entries.reserve(capacity);
        profile
    }

    /// Appends the meter state for `tick`.
    ///
    /// `tick` must be the next tick in sequence; the profile must be open.
    pub fn set_state_at(&mut self, tick: u64, state: &AncillaryMeterState) {
        debug_assert!(self.end.is_none(), "load profile is already closed");
        debug_assert_eq!(
            tick,
            self.start + self.entries.len() as u64 * self.step_size,
            "load profile entries must be appended in tick order"
        );
        if self.end.is_none() {
            self.entries.push(*state.values());
        }
    }

    /// Closes the profile at `end` (exclusive) and fixes its length.
    pub fn end_sequential(&mut self, end: u64) {
        debug_assert!(self.end.is_none(), "load profile closed twice");
        self.end = Some(end);
        self.entries.shrink_to_fit();
    }

    /// Returns `true` once [`end_sequential`](Self::end_sequential) was called.
    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    /// Exclusive end tick, if closed.
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// First tick of the profile.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Ticks between entries.
    pub fn step_size(&self) -> u64 {
        self.step_size
    }

    /// Number of recorded ticks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no tick was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tick of the entry at `index`.
    pub fn tick_at(&self, index: usize) -> u64 {
        self.start + index as u64 * self.step_size
    }

    /// Iterator over the recorded ticks.
    pub fn ticks(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.entries.len()).map(|i| self.tick_at(i))
    }

    /// Value of `commodity` at `tick`; zero outside the recorded range.
    ///
    /// Ticks between entries resolve to the preceding entry.
    pub fn power(&self, commodity: AncillaryCommodity, tick: u64) -> f64 {
        if tick < self.start {
            return 0.0;
        }
        let idx = ((tick - self.start) / self.step_size) as usize;
        self.entries
            .get(idx)
            .map_or(0.0, |entry| entry[commodity.index()])
    }

    /// Value of `commodity` at entry `index`.
    pub fn power_at_index(&self, commodity: AncillaryCommodity, index: usize) -> f64 {
        self.entries
            .get(index)
            .map_or(0.0, |entry| entry[commodity.index()])
    }

    /// All values of `commodity`, one per recorded tick.
    pub fn series(&self, commodity: AncillaryCommodity) -> Vec<f64> {
        self.entries.iter().map(|e| e[commodity.index()]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: f64) -> AncillaryMeterState {
        let mut s = AncillaryMeterState::new();
        s.set_power(AncillaryCommodity::ActivePowerExternal, value);
        s
    }

    #[test]
    fn meter_state_add_and_clear() {
        let mut s = AncillaryMeterState::new();
        s.add_power(AncillaryCommodity::PvActivePowerFeedIn, -30.0);
        s.add_power(AncillaryCommodity::PvActivePowerFeedIn, -20.0);
        assert_eq!(s.power(AncillaryCommodity::PvActivePowerFeedIn), -50.0);
        s.clear();
        assert_eq!(s, AncillaryMeterState::new());
    }

    #[test]
    fn profile_records_one_entry_per_tick() {
        let mut p = AncillaryCommodityLoadProfile::new(100, 10);
        for (i, tick) in [100, 110, 120].into_iter().enumerate() {
            p.set_state_at(tick, &state(i as f64));
        }
        p.end_sequential(130);
        assert_eq!(p.len(), 3);
        assert_eq!(p.end(), Some(130));
        assert_eq!(p.ticks().collect::<Vec<_>>(), vec![100, 110, 120]);
        assert_eq!(p.power(AncillaryCommodity::ActivePowerExternal, 115), 1.0);
        assert_eq!(p.power(AncillaryCommodity::ActivePowerExternal, 90), 0.0);
        assert_eq!(p.power(AncillaryCommodity::ActivePowerExternal, 500), 0.0);
        assert_eq!(
            p.series(AncillaryCommodity::ActivePowerExternal),
            vec![0.0, 1.0, 2.0]
        );
    }

    #[test]
    #[should_panic]
    fn zero_step_panics() {
        AncillaryCommodityLoadProfile::new(0, 0);
    }
}
