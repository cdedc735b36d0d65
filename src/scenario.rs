//! Turns a [`ScenarioConfig`] into parts, grids, signals and search
//! machinery ready for the solver.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::config::{
    AlgorithmConfig, DeviceKind, GridConfig, LimitConfig, PriceConfig, ScenarioConfig,
};
use crate::devices::{
    BaseLoad, Battery, Chp, DeviceId, EvCharger, EvSessionRanges, HotWaterDemand, HotWaterTank,
    ProblemPart, PvSystem,
};
use crate::error::{Error, Result};
use crate::sim::algorithm::{AlgorithmExecutor, GeneticAlgorithm};
use crate::sim::evaluator::Signals;
use crate::sim::fitness::{EnergyCostFitness, FitnessFunction};
use crate::sim::grid::{
    ElectricalEnergyGrid, EnergyGrid, EnergyRelation, GridTopology, MeterDevices,
    ThermalEnergyGrid,
};
use crate::sim::ranking::SolutionRanking;
use crate::sim::signals::{PowerLimitSignal, PriceSignal};
use crate::sim::solver::{EnergySolver, ScheduleResult, SolverSettings};

/// Seed offset between consecutive devices to avoid correlated noise.
const DEVICE_SEED_OFFSET: u64 = 57;

/// Meter ids live above the range used for positional device ids.
const METER_ID_BASE: u128 = 1 << 64;

/// Everything needed for one optimization run.
pub struct Scenario {
    pub parts: Vec<Box<dyn ProblemPart>>,
    pub grids: Vec<Box<dyn EnergyGrid>>,
    pub signals: Arc<Signals>,
    pub fitness: Arc<dyn FitnessFunction>,
    pub executor: AlgorithmExecutor,
    pub ranking: Box<dyn SolutionRanking>,
    pub settings: SolverSettings,
    pub optimization_start: u64,
    /// Configured name of every device.
    pub names: BTreeMap<DeviceId, String>,
}

impl Scenario {
    /// Builds the scenario described by `cfg`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if validation fails, and propagates
    /// grid and algorithm construction errors.
    pub fn build(cfg: &ScenarioConfig) -> Result<Self> {
        let errors = cfg.validate();
        if !errors.is_empty() {
            return Err(Error::InvalidConfig(errors));
        }

        let o = &cfg.optimization;
        let mut ids: HashMap<&str, DeviceId> = HashMap::new();
        let mut names = BTreeMap::new();
        let mut parts = Vec::with_capacity(cfg.devices.len());
        for (i, device) in cfg.devices.iter().enumerate() {
            let id = device.id.unwrap_or_else(|| Uuid::from_u128(i as u128 + 1));
            let seed = o
                .seed
                .wrapping_add(DEVICE_SEED_OFFSET.wrapping_mul(i as u64 + 1));
            parts.push(build_part(&device.kind, id, cfg, seed));
            ids.insert(&device.name, id);
            names.insert(id, device.name.clone());
            debug!(name = %device.name, kind = device.kind.name(), %id, "device built");
        }

        let mut meter_count = 0u128;
        let mut grids: Vec<Box<dyn EnergyGrid>> = Vec::new();
        if let Some(grid) = &cfg.grid.electrical {
            let topology = topology(grid, &ids, &mut meter_count);
            grids.push(Box::new(
                ElectricalEnergyGrid::new(topology)?.with_fast_path(grid.fast_path),
            ));
        }
        if let Some(grid) = &cfg.grid.thermal {
            let topology = topology(grid, &ids, &mut meter_count);
            grids.push(Box::new(ThermalEnergyGrid::new(topology)?));
        }

        let mut executor = AlgorithmExecutor::new();
        for algorithm in &cfg.algorithms {
            executor = match algorithm {
                AlgorithmConfig::Genetic(params) => {
                    executor.with(Box::new(GeneticAlgorithm::new(params.clone())?))
                }
                AlgorithmConfig::Random(random) => executor.with(Box::new(random.clone())),
            };
        }

        Ok(Self {
            parts,
            grids,
            signals: Arc::new(signals(&cfg.prices, &cfg.limits)),
            fitness: Arc::new(EnergyCostFitness {
                limit_penalty_per_kwh: cfg.fitness.limit_penalty_per_kwh,
            }),
            executor,
            ranking: cfg.ranking.build(),
            settings: SolverSettings {
                step_size: o.step_size,
                multithreaded: o.multithreaded,
            },
            optimization_start: o.optimization_start,
            names,
        })
    }

    /// Runs the solver on this scenario.
    ///
    /// # Errors
    ///
    /// See [`EnergySolver::get_solution`].
    pub fn solve(self) -> Result<Option<ScheduleResult>> {
        let solver = EnergySolver::new(self.settings, self.ranking);
        solver.get_solution(
            self.parts,
            self.grids,
            self.optimization_start,
            self.fitness,
            self.signals,
            &self.executor,
        )
    }
}

/// Device registry: maps a configured kind to its part.
fn build_part(kind: &DeviceKind, id: DeviceId, cfg: &ScenarioConfig, seed: u64) -> Box<dyn ProblemPart> {
    let o = &cfg.optimization;
    let (start, horizon, step) = (o.reference_time, o.horizon, o.step_size);
    match kind {
        DeviceKind::BaseLoad(c) => Box::new(
            BaseLoad::new(id, start, horizon, c.base_w, seed)
                .with_profile(c.amp_w, c.phase_rad, c.noise_std_w)
                .with_power_factor(c.power_factor)
                .completely_static(c.completely_static),
        ),
        DeviceKind::PvSystem(c) => Box::new(
            PvSystem::new(id, start, horizon, c.peak_w)
                .with_daylight(c.sunrise_s, c.sunset_s)
                .with_noise(c.noise_std, seed),
        ),
        DeviceKind::Battery(c) => Box::new(
            Battery::new(
                id,
                start,
                horizon,
                step,
                c.capacity_wh,
                c.initial_soc,
                c.max_charge_w,
                c.max_discharge_w,
            )
            .with_efficiency(c.eta_charge, c.eta_discharge)
            .with_mode(c.mode)
            .with_penalty(c.penalty_per_kwh),
        ),
        DeviceKind::EvCharger(c) => Box::new(
            EvCharger::new(
                id,
                start,
                horizon,
                step,
                c.max_charge_w,
                EvSessionRanges {
                    demand_wh_min: c.demand_wh_min,
                    demand_wh_max: c.demand_wh_max,
                    dwell_steps_min: c.dwell_steps_min,
                    dwell_steps_max: c.dwell_steps_max,
                },
                seed,
            )
            .with_penalty(c.penalty_per_kwh),
        ),
        DeviceKind::Chp(c) => Box::new(
            Chp::new(id, start, horizon, step)
                .with_rating(c.electrical_w, c.thermal_w, c.gas_w)
                .with_hysteresis(c.on_below_c, c.off_above_c, c.max_temp_c)
                .with_start_cost(c.start_cost),
        ),
        DeviceKind::HotWaterTank(c) => Box::new(
            HotWaterTank::new(id, start, horizon, c.volume_l, c.initial_temp_c)
                .with_losses(c.ambient_temp_c, c.loss_w_per_k)
                .with_comfort(c.min_temp_c, c.penalty_per_kelvin_hour),
        ),
        DeviceKind::HotWaterDemand(c) => {
            Box::new(HotWaterDemand::new(id, start, horizon, c.daily_energy_wh))
        }
    }
}

/// Resolves names in `grid` to ids; meters get fresh ids.
///
/// Names were checked by validation, so unresolved names cannot occur.
fn topology(grid: &GridConfig, devices: &HashMap<&str, DeviceId>, meter_count: &mut u128) -> GridTopology {
    let mut meters: HashMap<&str, DeviceId> = HashMap::new();
    for meter in &grid.meters {
        meters.insert(&meter.name, Uuid::from_u128(METER_ID_BASE + *meter_count));
        *meter_count += 1;
    }
    let resolve = |name: &str| -> DeviceId {
        devices
            .get(name)
            .or_else(|| meters.get(name))
            .copied()
            .unwrap_or_default()
    };
    let resolve_all = |names: &[String]| -> Vec<DeviceId> { names.iter().map(|n| resolve(n)).collect() };

    GridTopology {
        meters: grid.meters.iter().map(|m| resolve(&m.name)).collect(),
        relations: grid
            .relations
            .iter()
            .map(|r| EnergyRelation {
                active: resolve(&r.active),
                passive: resolve(&r.passive),
                active_to_passive: r.commodity,
                passive_to_active: r.back.unwrap_or(r.commodity),
            })
            .collect(),
        meter_devices: grid
            .meters
            .iter()
            .map(|m| MeterDevices {
                meter: resolve(&m.name),
                pv: resolve_all(&m.pv),
                chp: resolve_all(&m.chp),
                battery: resolve_all(&m.battery),
            })
            .collect(),
    }
}

fn signals(prices: &[PriceConfig], limits: &[LimitConfig]) -> Signals {
    Signals {
        prices: prices
            .iter()
            .map(|p| (p.commodity, PriceSignal::with_windows(p.default, p.windows.clone())))
            .collect(),
        limits: limits
            .iter()
            .map(|l| (l.commodity, PowerLimitSignal::new(l.windows.clone())))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::AncillaryCommodity;

    #[test]
    fn household_builds_parts_and_grid() {
        let scenario = Scenario::build(&ScenarioConfig::household()).unwrap();
        assert_eq!(scenario.parts.len(), 4);
        assert_eq!(scenario.grids.len(), 1);
        assert_eq!(scenario.executor.len(), 1);
        assert_eq!(scenario.names.get(&Uuid::from_u128(2)).map(String::as_str), Some("pv"));
        assert!(scenario.signals.prices.contains_key(&AncillaryCommodity::ActivePowerExternal));
    }

    #[test]
    fn chp_household_adds_thermal_grid() {
        let scenario = Scenario::build(&ScenarioConfig::chp_household()).unwrap();
        assert_eq!(scenario.grids.len(), 2);
        assert_eq!(scenario.grids[1].name(), "thermal");
        let tank = Uuid::from_u128(6);
        assert!(scenario.grids[1].topology().passive_ids().contains(&tank));
    }

    #[test]
    fn meters_resolve_to_distinct_ids() {
        let cfg = ScenarioConfig::chp_household();
        let scenario = Scenario::build(&cfg).unwrap();
        let house = &scenario.grids[0].topology().meters;
        let gas = &scenario.grids[1].topology().meters;
        assert_eq!(house.len(), 1);
        assert_ne!(house[0], gas[0]);
        let attached = &scenario.grids[0].topology().meter_devices[0];
        assert_eq!(attached.pv, vec![Uuid::from_u128(2)]);
        assert_eq!(attached.chp, vec![Uuid::from_u128(5)]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = ScenarioConfig::household();
        cfg.optimization.step_size = 0;
        assert!(matches!(Scenario::build(&cfg), Err(Error::InvalidConfig(_))));
    }
}
