//! Thermal grid carrying hot-water power and temperatures, with natural gas
//! metered at a single meter.

use crate::commodity::{AncillaryCommodity, Commodity};
use crate::error::{Error, Result};
use crate::sim::grid::{EnergyGrid, GridParticipants, GridTopology, ReducedRelations};
use crate::sim::meter::AncillaryMeterState;
use crate::sim::state_map::LimitedCommodityStateMap;

#[derive(Debug, Clone)]
struct RunState {
    reduced: ReducedRelations,
    accumulator: [LimitedCommodityStateMap; 1],
}

/// Thermal energy grid.
///
/// Temperatures travel along with power in both directions. Positive
/// natural-gas power reaching the meter is reported as
/// [`AncillaryCommodity::NaturalGasPowerExternal`].
#[derive(Debug, Clone)]
pub struct ThermalEnergyGrid {
    topology: GridTopology,
    state: Option<RunState>,
}

impl ThermalEnergyGrid {
    /// Creates the grid from a topology with exactly one meter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDeviceType`] unless exactly one meter is
    /// declared, and propagates [`GridTopology::validate`] failures.
    pub fn new(topology: GridTopology) -> Result<Self> {
        if topology.meters.len() != 1 {
            return Err(Error::MissingDeviceType(format!(
                "thermal grid needs exactly one meter, found {}",
                topology.meters.len()
            )));
        }
        topology.validate()?;
        Ok(Self {
            topology,
            state: None,
        })
    }
}

impl EnergyGrid for ThermalEnergyGrid {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn topology(&self) -> &GridTopology {
        &self.topology
    }

    fn initialize_grid(&mut self, participants: &GridParticipants) {
        self.state = Some(RunState {
            reduced: ReducedRelations::build(&self.topology, participants),
            accumulator: [LimitedCommodityStateMap::default()],
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
            .ok_or(Error::GridNotInitialized("thermal"))?;
        state.accumulator[0].clear();
        state
            .reduced
            .exchange_active_to_passive(outputs, inputs, &mut state.accumulator, true);

        let gas = state.accumulator[0].power(Commodity::NaturalGasPower);
        if gas > 0.0 {
            meter_state.add_power(AncillaryCommodity::NaturalGasPowerExternal, gas);
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
            .ok_or(Error::GridNotInitialized("thermal"))?;
        state.reduced.exchange_passive_to_active(outputs, inputs, true);
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn EnergyGrid> {
        Box::new(self.clone())
    }
}
