//! Commodity exchange topologies between active devices, passive devices and
//! meters.
//!
//! A grid is built once from a static [`GridTopology`]. For each optimization
//! run it is initialized with the participating devices, which precomputes a
//! [`ReducedRelations`] table restricted to devices that actually take part
//! and actually emit the relevant commodity. Exchanges then only walk that
//! reduced table.

/// Electrical grid with PV/CHP/battery meter splitting.
pub mod electrical;
/// Thermal grid with a single natural-gas meter.
pub mod thermal;

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;

use crate::commodity::Commodity;
use crate::devices::DeviceId;
use crate::error::{Error, Result};
use crate::sim::meter::AncillaryMeterState;
use crate::sim::state_map::LimitedCommodityStateMap;

pub use electrical::ElectricalEnergyGrid;
pub use thermal::ThermalEnergyGrid;

/// A static active → passive relation.
///
/// `active_to_passive` flows from the active device to the passive one,
/// `passive_to_active` flows back.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnergyRelation {
    pub active: DeviceId,
    pub passive: DeviceId,
    pub active_to_passive: Commodity,
    pub passive_to_active: Commodity,
}

impl EnergyRelation {
    /// Creates a relation carrying `commodity` in both directions.
    pub fn symmetric(active: DeviceId, passive: DeviceId, commodity: Commodity) -> Self {
        Self {
            active,
            passive,
            active_to_passive: commodity,
            passive_to_active: commodity,
        }
    }
}

/// Devices of the special types attached to one meter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterDevices {
    pub meter: DeviceId,
    pub pv: Vec<DeviceId>,
    pub chp: Vec<DeviceId>,
    pub battery: Vec<DeviceId>,
}

/// Static description of a grid: meters, relations and meter device types.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridTopology {
    pub meters: Vec<DeviceId>,
    pub relations: Vec<EnergyRelation>,
    pub meter_devices: Vec<MeterDevices>,
}

impl GridTopology {
    /// Devices that appear as the active end of a relation.
    pub fn active_ids(&self) -> BTreeSet<DeviceId> {
        self.relations.iter().map(|r| r.active).collect()
    }

    /// Devices that appear as the passive end of a relation, meters excluded.
    pub fn passive_ids(&self) -> BTreeSet<DeviceId> {
        self.relations
            .iter()
            .map(|r| r.passive)
            .filter(|id| !self.meters.contains(id))
            .collect()
    }

    /// Checks that the active and passive sets are disjoint and that every
    /// meter referenced by `meter_devices` is declared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActivePassiveCollision`] for the first device found on
    /// both sides (meters count as passive), [`Error::UnknownDevice`] for an
    /// undeclared meter.
    pub fn validate(&self) -> Result<()> {
        let mut passive: BTreeSet<DeviceId> = self.relations.iter().map(|r| r.passive).collect();
        passive.extend(self.meters.iter().copied());
        if let Some(r) = self.relations.iter().find(|r| passive.contains(&r.active)) {
            return Err(Error::ActivePassiveCollision(r.active));
        }
        if let Some(m) = self
            .meter_devices
            .iter()
            .find(|m| !self.meters.contains(&m.meter))
        {
            return Err(Error::UnknownDevice(m.meter));
        }
        Ok(())
    }
}

/// Role of a participating device in this optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartRole {
    Active,
    Passive,
}

#[derive(Debug, Clone)]
struct Participant {
    dense_id: usize,
    role: PartRole,
    needs_input: bool,
    outputs: Vec<Commodity>,
}

/// The non-static devices taking part in one optimization run.
#[derive(Debug, Clone, Default)]
pub struct GridParticipants {
    by_id: HashMap<DeviceId, Participant>,
}

impl GridParticipants {
    /// Creates an empty participant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a participating device.
    pub fn add(
        &mut self,
        device_id: DeviceId,
        dense_id: usize,
        role: PartRole,
        needs_input: bool,
        outputs: &[Commodity],
    ) {
        self.by_id.insert(
            device_id,
            Participant {
                dense_id,
                role,
                needs_input: needs_input && role == PartRole::Active,
                outputs: outputs.to_vec(),
            },
        );
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn active(&self, id: &DeviceId) -> Option<&Participant> {
        self.by_id.get(id).filter(|p| p.role == PartRole::Active)
    }

    fn passive(&self, id: &DeviceId) -> Option<&Participant> {
        self.by_id.get(id).filter(|p| p.role == PartRole::Passive)
    }

    /// Dense id of an active device.
    pub fn active_dense_id(&self, id: &DeviceId) -> Option<usize> {
        self.active(id).map(|p| p.dense_id)
    }
}

/// Destination of an active → passive flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Input map of the part with this dense id.
    Part(usize),
    /// Accumulator of the meter with this index.
    Meter(usize),
}

/// All reduced active → passive flows rooted at one active device.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveFlows {
    pub active: usize,
    pub flows: Vec<(Target, Commodity)>,
}

/// All reduced passive → active flows into one active device.
#[derive(Debug, Clone, PartialEq)]
pub struct PassiveFlows {
    pub active: usize,
    pub flows: Vec<(usize, Commodity)>,
}

/// Relations restricted to the participants of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducedRelations {
    pub active_to_passive: Vec<ActiveFlows>,
    pub passive_to_active: Vec<PassiveFlows>,
}

impl ReducedRelations {
    /// Reduces `topology` to the devices in `participants`.
    pub fn build(topology: &GridTopology, participants: &GridParticipants) -> Self {
        let mut a2p: Vec<ActiveFlows> = Vec::new();
        let mut p2a: Vec<PassiveFlows> = Vec::new();

        for relation in &topology.relations {
            let Some(active) = participants.active(&relation.active) else {
                continue;
            };

            if active.outputs.contains(&relation.active_to_passive) {
                let target = if let Some(m) = topology.meters.iter().position(|m| *m == relation.passive) {
                    Some(Target::Meter(m))
                } else {
                    participants
                        .passive(&relation.passive)
                        .map(|p| Target::Part(p.dense_id))
                };
                if let Some(target) = target {
                    push_flow(&mut a2p, active.dense_id, (target, relation.active_to_passive));
                }
            }

            if active.needs_input {
                if let Some(passive) = participants.passive(&relation.passive) {
                    if passive.outputs.contains(&relation.passive_to_active) {
                        let flow = (passive.dense_id, relation.passive_to_active);
                        match p2a.iter_mut().find(|f| f.active == active.dense_id) {
                            Some(f) => f.flows.push(flow),
                            None => p2a.push(PassiveFlows {
                                active: active.dense_id,
                                flows: vec![flow],
                            }),
                        }
                    }
                }
            }
        }

        a2p.sort_by_key(|f| f.active);
        p2a.sort_by_key(|f| f.active);
        Self {
            active_to_passive: a2p,
            passive_to_active: p2a,
        }
    }

    /// Copies active outputs into passive inputs and meter accumulators.
    ///
    /// Devices that emitted nothing are skipped; several sources of the same
    /// commodity accumulate. Temperatures are copied when `with_temperature`
    /// is set.
    pub fn exchange_active_to_passive(
        &self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
        meters: &mut [LimitedCommodityStateMap],
        with_temperature: bool,
    ) {
        for active in &self.active_to_passive {
            let out = &outputs[active.active];
            if out.is_empty() {
                continue;
            }
            for &(target, commodity) in &active.flows {
                if !out.contains_commodity(commodity) {
                    continue;
                }
                let dest = match target {
                    Target::Part(p) => &mut inputs[p],
                    Target::Meter(m) => &mut meters[m],
                };
                copy_commodity(out, dest, commodity, with_temperature);
            }
        }
    }

    /// Copies passive outputs into the inputs of active devices that need
    /// them.
    pub fn exchange_passive_to_active(
        &self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
        with_temperature: bool,
    ) {
        for active in &self.passive_to_active {
            for &(passive, commodity) in &active.flows {
                let out = &outputs[passive];
                if !out.contains_commodity(commodity) {
                    continue;
                }
                copy_commodity(out, &mut inputs[active.active], commodity, with_temperature);
            }
        }
    }
}

fn push_flow(flows: &mut Vec<ActiveFlows>, active: usize, flow: (Target, Commodity)) {
    match flows.iter_mut().find(|f| f.active == active) {
        Some(f) => f.flows.push(flow),
        None => flows.push(ActiveFlows {
            active,
            flows: vec![flow],
        }),
    }
}

fn copy_commodity(
    from: &LimitedCommodityStateMap,
    to: &mut LimitedCommodityStateMap,
    commodity: Commodity,
    with_temperature: bool,
) {
    if from.contains_power(commodity) {
        to.set_or_add_power(commodity, from.power(commodity));
    }
    if with_temperature {
        if let Some(t) = from.temperature(commodity) {
            to.set_temperature(commodity, t);
        }
    }
}

/// A commodity exchange topology stepped by the evaluator.
///
/// Lifecycle per run: uninitialized → [`initialize_grid`] → exchanges →
/// [`finalize_grid`] → uninitialized. Finalizing while evaluations are in
/// flight is the caller's responsibility to avoid.
///
/// [`initialize_grid`]: EnergyGrid::initialize_grid
/// [`finalize_grid`]: EnergyGrid::finalize_grid
pub trait EnergyGrid: Send + Sync {
    /// Short grid name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Static topology of this grid.
    fn topology(&self) -> &GridTopology;

    /// Precomputes the reduced relations for this run's participants.
    fn initialize_grid(&mut self, participants: &GridParticipants);

    /// Discards the reduced state.
    fn finalize_grid(&mut self);

    /// Returns `true` between initialization and finalization.
    fn is_initialized(&self) -> bool {
        self.reduced_relations().is_some()
    }

    /// Reduced relations of the current run, if initialized.
    fn reduced_relations(&self) -> Option<&ReducedRelations>;

    /// Delivers active outputs to passive inputs and writes this tick's
    /// ancillary meter values into `meter_state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GridNotInitialized`] if the grid is not initialized.
    fn do_active_to_passive_exchange(
        &mut self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
        meter_state: &mut AncillaryMeterState,
    ) -> Result<()>;

    /// Delivers passive outputs to the active devices that need input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GridNotInitialized`] if the grid is not initialized.
    fn do_passive_to_active_exchange(
        &self,
        outputs: &[LimitedCommodityStateMap],
        inputs: &mut [LimitedCommodityStateMap],
    ) -> Result<()>;

    /// Independent deep copy, including the reduced state.
    fn duplicate(&self) -> Box<dyn EnergyGrid>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> DeviceId {
        DeviceId::from_u128(n)
    }

    #[test]
    fn collision_between_active_and_passive_is_rejected() {
        let topology = GridTopology {
            meters: vec![id(100)],
            relations: vec![
                EnergyRelation::symmetric(id(1), id(2), Commodity::ActivePower),
                EnergyRelation::symmetric(id(2), id(100), Commodity::ActivePower),
            ],
            meter_devices: vec![],
        };
        assert!(matches!(
            topology.validate(),
            Err(Error::ActivePassiveCollision(d)) if d == id(2)
        ));
    }

    #[test]
    fn meter_as_active_endpoint_is_a_collision() {
        let topology = GridTopology {
            meters: vec![id(100)],
            relations: vec![EnergyRelation::symmetric(id(100), id(3), Commodity::ActivePower)],
            meter_devices: vec![],
        };
        assert!(topology.validate().is_err());
    }

    #[test]
    fn reduction_skips_non_participants_and_silent_commodities() {
        let topology = GridTopology {
            meters: vec![id(100)],
            relations: vec![
                EnergyRelation::symmetric(id(1), id(100), Commodity::ActivePower),
                EnergyRelation::symmetric(id(2), id(100), Commodity::ActivePower),
                EnergyRelation::symmetric(id(3), id(100), Commodity::ActivePower),
                EnergyRelation::symmetric(id(1), id(4), Commodity::HeatingHotWaterPower),
            ],
            meter_devices: vec![],
        };
        let mut participants = GridParticipants::new();
        participants.add(id(1), 0, PartRole::Active, true, &[Commodity::ActivePower]);
        participants.add(id(2), 1, PartRole::Active, false, &[Commodity::NaturalGasPower]);
        participants.add(
            id(4),
            2,
            PartRole::Passive,
            false,
            &[Commodity::HeatingHotWaterPower],
        );

        let reduced = ReducedRelations::build(&topology, &participants);
        assert_eq!(
            reduced.active_to_passive,
            vec![ActiveFlows {
                active: 0,
                flows: vec![(Target::Meter(0), Commodity::ActivePower)]
            }]
        );
        assert_eq!(
            reduced.passive_to_active,
            vec![PassiveFlows {
                active: 0,
                flows: vec![(2, Commodity::HeatingHotWaterPower)]
            }]
        );
    }

    #[test]
    fn exchange_accumulates_sources_and_skips_silent_devices() {
        let topology = GridTopology {
            meters: vec![id(100)],
            relations: vec![
                EnergyRelation::symmetric(id(1), id(100), Commodity::ActivePower),
                EnergyRelation::symmetric(id(2), id(100), Commodity::ActivePower),
            ],
            meter_devices: vec![],
        };
        let mut participants = GridParticipants::new();
        participants.add(id(1), 0, PartRole::Active, false, &[Commodity::ActivePower]);
        participants.add(id(2), 1, PartRole::Active, false, &[Commodity::ActivePower]);
        let reduced = ReducedRelations::build(&topology, &participants);

        let mut outputs = vec![LimitedCommodityStateMap::default(); 2];
        outputs[0].set_power(Commodity::ActivePower, 300.0);
        outputs[1].set_power(Commodity::ActivePower, -120.0);
        let mut inputs = vec![LimitedCommodityStateMap::default(); 2];
        let mut meters = vec![LimitedCommodityStateMap::default()];

        reduced.exchange_active_to_passive(&outputs, &mut inputs, &mut meters, false);
        assert_eq!(meters[0].power(Commodity::ActivePower), 180.0);

        meters[0].clear();
        outputs[1].clear();
        reduced.exchange_active_to_passive(&outputs, &mut inputs, &mut meters, false);
        assert_eq!(meters[0].power(Commodity::ActivePower), 300.0);
    }
}
