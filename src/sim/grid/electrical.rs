//! Electrical grid: active/reactive power exchange and the per-meter split of
//! the net flow into external, feed-in and auto-consumption shares.

use crate::commodity::{AncillaryCommodity, Commodity};
use crate::error::{Error, Result};
use crate::sim::grid::{EnergyGrid, GridParticipants, GridTopology, ReducedRelations};
use crate::sim::meter::AncillaryMeterState;
use crate::sim::state_map::LimitedCommodityStateMap;

/// Dense ids of the special device types attached to one meter, restricted
/// to the participants of the current run.
#[derive(Debug, Clone, Default, PartialEq)]
struct ResolvedMeter {
    pv: Vec<usize>,
    chp: Vec<usize>,
    battery: Vec<usize>,
}

impl ResolvedMeter {
    fn at_most_one_per_type(&self) -> bool {
        self.pv.len() <= 1 && self.chp.len() <= 1 && self.battery.len() <= 1
    }
}

#[derive(Debug, Clone)]
struct RunState {
    reduced: ReducedRelations,
    meters: Vec<ResolvedMeter>,
    accumulators: Vec<LimitedCommodityStateMap>,
    single_meter: bool,
}

/// Electrical energy grid.
///
/// Besides delivering power between devices, each active → passive exchange
/// splits the net active power at every meter:
///
/// * net `>= 0`: all PV and CHP generation is consumed on-site; a charging
///   battery counts as battery consumption, a discharging one as battery
///   auto-consumption.
/// * net `< 0`: each generating source (PV, CHP, discharging battery) is
///   split into a feed-in share proportional to its part of the total
///   generation and the remaining auto-consumption. Feed-in shares are
///   rounded to whole watts, halves toward positive infinity, so a share of
///   -2.5 W feeds in -2 W; auto-consumption is the exact remainder so
///   feed-in plus auto-consumption always equals the source power.
///
/// When exactly one meter exists and each special device type has at most
/// one participant, a fast path with direct lookups is used. It produces the
/// same values as the general path.
#[derive(Debug, Clone)]
pub struct ElectricalEnergyGrid {
    topology: GridTopology,
    fast_path: bool,
    state: Option<RunState>,
}

impl ElectricalEnergyGrid {
    /// Creates the grid from a validated topology.
    ///
    /// # Errors
    ///
    /// Propagates [`GridTopology::validate`] failures.
    pub fn new(topology: GridTopology) -> Result<Self> {
        topology.validate()?;
        Ok(Self {
            topology,
            fast_path: true,
            state: None,
        })
    }

    /// Enables or disables the single-meter fast path.
    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled;
        self
    }

    /// Returns `true` if the current run uses the single-meter fast path.
    pub fn uses_fast_path(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.single_meter)
    }

    fn aggregate_single_meter(
        meter: &ResolvedMeter,
        accumulator: &LimitedCommodityStateMap,
        outputs: &[LimitedCommodityStateMap],
        meter_state: &mut AncillaryMeterState,
    ) {
        let lookup = |ids: &[usize]| ids.first().map(|&d| outputs[d].power(Commodity::ActivePower));
        split_meter(
            accumulator,
            lookup(&meter.pv),
            lookup(&meter.chp),
            lookup(&meter.battery),
            meter_state,
        );
    }

    fn aggregate_general(
        meters: &[ResolvedMeter],
        accumulators: &[LimitedCommodityStateMap],
        outputs: &[LimitedCommodityStateMap],
        meter_state: &mut AncillaryMeterState,
    ) {
        // explicit loops from 0.0: `Iterator::sum` of an empty f64 slice is -0.0
        let total = |ids: &[usize]| {
            if ids.is_empty() {
                return None;
            }
            let mut sum = 0.0;
            for &d in ids {
                sum += outputs[d].power(Commodity::ActivePower);
            }
            Some(sum)
        };
        for (meter, accumulator) in meters.iter().zip(accumulators) {
            split_meter(
                accumulator,
                total(&meter.pv),
                total(&meter.chp),
                total(&meter.battery),
                meter_state,
            );
        }
    }
}

/// Writes one meter's ancillary values into `meter_state`.
///
/// A `None` source means no device of that type is attached to the meter.
fn split_meter(
    accumulator: &LimitedCommodityStateMap,
    pv: Option<f64>,
    chp: Option<f64>,
    battery: Option<f64>,
    meter_state: &mut AncillaryMeterState,
) {
    let net = accumulator.power(Commodity::ActivePower);

    if accumulator.contains_power(Commodity::ReactivePower) {
        meter_state.add_power(
            AncillaryCommodity::ReactivePowerExternal,
            accumulator.power(Commodity::ReactivePower),
        );
    }
    meter_state.add_power(AncillaryCommodity::ActivePowerExternal, net);

    if let Some(b) = battery.filter(|b| *b > 0.0) {
        meter_state.add_power(AncillaryCommodity::BatteryActivePowerConsumption, b);
    }
    let discharge = battery.filter(|b| *b <= 0.0);

    if net >= 0.0 {
        if let Some(pv) = pv {
            meter_state.add_power(AncillaryCommodity::PvActivePowerAutoConsumption, pv);
        }
        if let Some(chp) = chp {
            meter_state.add_power(AncillaryCommodity::ChpActivePowerAutoConsumption, chp);
        }
        if let Some(b) = discharge {
            meter_state.add_power(AncillaryCommodity::BatteryActivePowerAutoConsumption, b);
        }
        return;
    }

    let total_generation = pv.unwrap_or(0.0) + chp.unwrap_or(0.0) + discharge.unwrap_or(0.0);
    let sources = [
        (
            pv,
            AncillaryCommodity::PvActivePowerFeedIn,
            AncillaryCommodity::PvActivePowerAutoConsumption,
        ),
        (
            chp,
            AncillaryCommodity::ChpActivePowerFeedIn,
            AncillaryCommodity::ChpActivePowerAutoConsumption,
        ),
        (
            discharge,
            AncillaryCommodity::BatteryActivePowerFeedIn,
            AncillaryCommodity::BatteryActivePowerAutoConsumption,
        ),
    ];
    for (source, feed_in, auto) in sources {
        let Some(power) = source else {
            continue;
        };
        let external = if total_generation < 0.0 {
            round_half_up(power / total_generation * net)
        } else {
            0.0
        };
        meter_state.add_power(feed_in, external);
        meter_state.add_power(auto, power - external);
    }
}

/// Rounds to the nearest integer, halves toward positive infinity.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

impl EnergyGrid for ElectricalEnergyGrid {
    fn name(&self) -> &'static str {
        "electrical"
    }

    fn topology(&self) -> &GridTopology {
        &self.topology
    }

    fn initialize_grid(&mut self, participants: &GridParticipants) {
        let reduced = ReducedRelations::build(&self.topology, participants);
        let resolve = |ids: &[crate::devices::DeviceId]| -> Vec<usize> {
            ids.iter()
                .filter_map(|id| participants.active_dense_id(id))
                .collect()
        };
        let meters: Vec<ResolvedMeter> = self
            .topology
            .meters
            .iter()
            .map(|meter| {
                self.topology
                    .meter_devices
                    .iter()
                    .filter(|md| md.meter == *meter)
                    .fold(ResolvedMeter::default(), |mut acc, md| {
                        acc.pv.extend(resolve(&md.pv));
                        acc.chp.extend(resolve(&md.chp));
                        acc.battery.extend(resolve(&md.battery));
                        acc
                    })
            })
            .collect();
        let single_meter =
            self.fast_path && meters.len() == 1 && meters[0].at_most_one_per_type();
        let accumulators = vec![LimitedCommodityStateMap::default(); meters.len()];
        self.state = Some(RunState {
            reduced,
            meters,
            accumulators,
            single_meter,
        });
    }

    fn finalize_grid(&mut self) {
        self.state = None;
    }

    fn reduced_relations(&self) -> Option<&ReducedRelations> {
        self.state.as_ref().map(|s| &s.reduced)
    }

    fn do_active_to_passive_exchange(
        &mut self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
        meter_state: &mut AncillaryMeterState,
    ) -> Result<()> {
        let state = self
            .state
            .as_mut()
            .ok_or(Error::GridNotInitialized("electrical"))?;
        for acc in &mut state.accumulators {
            acc.clear();
        }
        state
            .reduced
            .exchange_active_to_passive(outputs, inputs, &mut state.accumulators, false);

        if state.single_meter {
            Self::aggregate_single_meter(
                &state.meters[0],
                &state.accumulators[0],
                outputs,
                meter_state,
            );
        } else {
            Self::aggregate_general(&state.meters, &state.accumulators, outputs, meter_state);
        }
        Ok(())
    }

    fn do_passive_to_active_exchange(
        &self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
    ) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or(Error::GridNotInitialized("electrical"))?;
        state.reduced.exchange_passive_to_active(outputs, inputs, false);
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn EnergyGrid> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceId;
    use crate::sim::grid::{EnergyRelation, MeterDevices, PartRole};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    const METER: u128 = 100;
    const LOAD: u128 = 1;
    const PV: u128 = 2;
    const CHP: u128 = 3;
    const BATTERY: u128 = 4;
    const PV2: u128 = 5;

    fn id(n: u128) -> DeviceId {
        DeviceId::from_u128(n)
    }

    fn topology(devices: &[u128]) -> GridTopology {
        let mut md = MeterDevices {
            meter: id(METER),
            ..Default::default()
        };
        for &d in devices {
            match d {
                PV | PV2 => md.pv.push(id(d)),
                CHP => md.chp.push(id(d)),
                BATTERY => md.battery.push(id(d)),
                _ => {}
            }
        }
        GridTopology {
            meters: vec![id(METER)],
            relations: devices
                .iter()
                .map(|&d| EnergyRelation::symmetric(id(d), id(METER), Commodity::ActivePower))
                .collect(),
            meter_devices: vec![md],
        }
    }

    fn participants(devices: &[u128]) -> GridParticipants {
        let mut p = GridParticipants::new();
        for (dense, &d) in devices.iter().enumerate() {
            p.add(id(d), dense, PartRole::Active, false, &[Commodity::ActivePower]);
        }
        p
    }

    fn run(
        grid: &mut ElectricalEnergyGrid,
        powers: &[f64],
    ) -> AncillaryMeterState {
        let outputs: Vec<LimitedCommodityStateMap> = powers
            .iter()
            .map(|&p| {
                let mut m = LimitedCommodityStateMap::new(&[Commodity::ActivePower]);
                m.set_power(Commodity::ActivePower, p);
                m
            })
            .collect();
        let mut inputs = vec![LimitedCommodityStateMap::default(); powers.len()];
        let mut meter = AncillaryMeterState::new();
        grid.do_active_to_passive_exchange(&outputs, &mut inputs, &mut meter)
            .unwrap();
        meter
    }

    fn grid(devices: &[u128], fast: bool) -> ElectricalEnergyGrid {
        let mut g = ElectricalEnergyGrid::new(topology(devices))
            .unwrap()
            .with_fast_path(fast);
        g.initialize_grid(&participants(devices));
        g
    }

    #[test]
    fn pure_pv_export_is_all_feed_in() {
        let mut g = grid(&[PV], true);
        let m = run(&mut g, &[-100.0]);
        assert_eq!(m.power(AncillaryCommodity::ActivePowerExternal), -100.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -100.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), 0.0);
    }

    #[test]
    fn net_consumption_makes_pv_auto_consumed() {
        let mut g = grid(&[LOAD, PV], true);
        let m = run(&mut g, &[150.0, -100.0]);
        assert_eq!(m.power(AncillaryCommodity::ActivePowerExternal), 50.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -100.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), 0.0);
    }

    #[test]
    fn export_is_split_proportionally() {
        let mut g = grid(&[LOAD, PV, CHP], true);
        let m = run(&mut g, &[300.0, -600.0, -300.0]);
        // net -600 over total generation -900
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -400.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -200.0);
        assert_eq!(m.power(AncillaryCommodity::ChpActivePowerFeedIn), -200.0);
        assert_eq!(m.power(AncillaryCommodity::ChpActivePowerAutoConsumption), -100.0);
    }

    #[test]
    fn half_watt_feed_in_shares_round_up() {
        let mut g = grid(&[LOAD, PV, CHP], true);
        let m = run(&mut g, &[5.0, -5.0, -5.0]);
        // net -5 split evenly: -2.5 each
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -2.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -3.0);
        assert_eq!(m.power(AncillaryCommodity::ChpActivePowerFeedIn), -2.0);
        assert_eq!(m.power(AncillaryCommodity::ChpActivePowerAutoConsumption), -3.0);
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.6), -3.0);
    }

    #[test]
    fn meters_are_split_separately_and_summed() {
        const OTHER_METER: u128 = 101;
        // meter A exports its PV, meter B consumes its PV locally
        let topology = GridTopology {
            meters: vec![id(METER), id(OTHER_METER)],
            relations: vec![
                EnergyRelation::symmetric(id(PV), id(METER), Commodity::ActivePower),
                EnergyRelation::symmetric(id(LOAD), id(OTHER_METER), Commodity::ActivePower),
                EnergyRelation::symmetric(id(PV2), id(OTHER_METER), Commodity::ActivePower),
            ],
            meter_devices: vec![
                MeterDevices {
                    meter: id(METER),
                    pv: vec![id(PV)],
                    ..Default::default()
                },
                MeterDevices {
                    meter: id(OTHER_METER),
                    pv: vec![id(PV2)],
                    ..Default::default()
                },
            ],
        };
        let devices = [PV, LOAD, PV2];
        let mut g = ElectricalEnergyGrid::new(topology).unwrap();
        g.initialize_grid(&participants(&devices));
        assert!(!g.uses_fast_path());

        let m = run(&mut g, &[-100.0, 150.0, -100.0]);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -100.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -100.0);
        assert_eq!(m.power(AncillaryCommodity::ActivePowerExternal), -50.0);
    }

    #[test]
    fn charging_battery_counts_as_consumption() {
        let mut g = grid(&[PV, BATTERY], true);
        let m = run(&mut g, &[-500.0, 200.0]);
        assert_eq!(m.power(AncillaryCommodity::BatteryActivePowerConsumption), 200.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -300.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -200.0);
    }

    #[test]
    fn feed_in_plus_auto_consumption_conserves_source_power() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut g = grid(&[LOAD, PV, CHP, BATTERY], true);
        for _ in 0..500 {
            let powers = [
                rng.random_range(0.0..3000.0),
                rng.random_range(-4000.0..0.0),
                rng.random_range(-2000.0..0.0),
                rng.random_range(-2500.0..2500.0),
            ];
            let m = run(&mut g, &powers);
            let pv = m.power(AncillaryCommodity::PvActivePowerFeedIn)
                + m.power(AncillaryCommodity::PvActivePowerAutoConsumption);
            let chp = m.power(AncillaryCommodity::ChpActivePowerFeedIn)
                + m.power(AncillaryCommodity::ChpActivePowerAutoConsumption);
            assert!((pv - powers[1]).abs() < 1e-9);
            assert!((chp - powers[2]).abs() < 1e-9);
            if powers[3] <= 0.0 {
                let b = m.power(AncillaryCommodity::BatteryActivePowerFeedIn)
                    + m.power(AncillaryCommodity::BatteryActivePowerAutoConsumption);
                assert!((b - powers[3]).abs() < 1e-9);
            } else {
                assert_eq!(
                    m.power(AncillaryCommodity::BatteryActivePowerConsumption),
                    powers[3]
                );
            }
            let net: f64 = powers.iter().sum();
            assert!((m.power(AncillaryCommodity::ActivePowerExternal) - net).abs() < 1e-9);
        }
    }

    #[test]
    fn fast_path_matches_general_path() {
        let devices = [LOAD, PV, CHP, BATTERY];
        let mut fast = grid(&devices, true);
        let mut general = grid(&devices, false);
        assert!(fast.uses_fast_path());
        assert!(!general.uses_fast_path());

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            let powers = [
                rng.random_range(0.0..3000.0),
                rng.random_range(-4000.0..0.0),
                rng.random_range(-2000.0..0.0),
                rng.random_range(-2500.0..2500.0),
            ];
            assert_eq!(run(&mut fast, &powers), run(&mut general, &powers));
        }
    }

    #[test]
    fn two_devices_of_one_type_fall_back_to_general_path() {
        let devices = [LOAD, PV, PV2];
        let mut g = grid(&devices, true);
        assert!(!g.uses_fast_path());
        let m = run(&mut g, &[100.0, -300.0, -100.0]);
        // net -300 over total -400
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerFeedIn), -300.0);
        assert_eq!(m.power(AncillaryCommodity::PvActivePowerAutoConsumption), -100.0);
    }

    #[test]
    fn reinitialization_is_idempotent() {
        let devices = [LOAD, PV, BATTERY];
        let mut g = grid(&devices, true);
        let first = g.reduced_relations().cloned();
        g.finalize_grid();
        assert!(!g.is_initialized());
        g.initialize_grid(&participants(&devices));
        assert_eq!(g.reduced_relations().cloned(), first);
    }

    #[test]
    fn exchange_before_initialization_fails() {
        let mut g = ElectricalEnergyGrid::new(topology(&[PV])).unwrap();
        let mut meter = AncillaryMeterState::new();
        let err = g
            .do_active_to_passive_exchange(&[], &mut [], &mut meter)
            .unwrap_err();
        assert!(matches!(err, Error::GridNotInitialized(_)));
    }
}
