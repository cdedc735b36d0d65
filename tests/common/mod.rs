//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use ems_sim::commodity::Commodity;
use ems_sim::devices::{
    BaseLoad, Battery, DeviceId, PartBase, ProblemPart, PvSystem, StepInput,
};
use ems_sim::sim::container::{ContainerPool, DataContainer};
use ems_sim::sim::distributor::SolutionDistributor;
use ems_sim::sim::evaluator::{EvaluationWindow, ProblemEvaluator, Signals};
use ems_sim::sim::fitness::EnergyCostFitness;
use ems_sim::sim::grid::{
    ElectricalEnergyGrid, EnergyGrid, EnergyRelation, GridTopology, MeterDevices,
};
use ems_sim::sim::state_map::LimitedCommodityStateMap;

const OUTPUTS: [Commodity; 1] = [Commodity::ActivePower];

/// Meter id used by every single-meter fixture.
pub const METER: u128 = 1000;

pub fn id(n: u128) -> DeviceId {
    DeviceId::from_u128(n)
}

/// Active part emitting a constant active power at every tick.
#[derive(Debug, Clone)]
pub struct FixedPower {
    base: PartBase,
    pub power_w: f64,
    pub calls: usize,
}

impl FixedPower {
    pub fn new(n: u128, horizon: u64, power_w: f64) -> Self {
        Self {
            base: PartBase::new(id(n), 0, horizon),
            power_w,
            calls: 0,
        }
    }
}

impl ProblemPart for FixedPower {
    fn device_id(&self) -> DeviceId {
        self.base.device_id
    }

    fn device_kind(&self) -> &'static str {
        "FixedPower"
    }

    fn dense_id(&self) -> usize {
        self.base.dense_id
    }

    fn set_dense_id(&mut self, id: usize) {
        self.base.dense_id = id;
    }

    fn output_commodities(&self) -> &[Commodity] {
        &OUTPUTS
    }

    fn reference_time(&self) -> u64 {
        self.base.reference_time
    }

    fn optimization_horizon(&self) -> u64 {
        self.base.optimization_horizon
    }

    fn initialize_interdependent_calculation(
        &mut self,
        reference_time: u64,
        step_size: u64,
        log: bool,
        keep_prediction: bool,
    ) {
        self.base
            .initialize(reference_time, step_size, log, keep_prediction);
        self.calls = 0;
    }

    fn calculate_next_step(&mut self, input: &StepInput<'_>, output: &mut LimitedCommodityStateMap) {
        output.set_power(Commodity::ActivePower, self.power_w);
        self.calls += 1;
        self.base.interdependent_time = input.tick + self.base.step_size;
    }

    fn duplicate(&self) -> Box<dyn ProblemPart> {
        Box::new(self.clone())
    }
}

/// Single-meter electrical topology with every device related to the meter.
///
/// `pv` and `battery` name the devices attached to the meter as such.
pub fn single_meter_topology(devices: &[u128], pv: &[u128], battery: &[u128]) -> GridTopology {
    GridTopology {
        meters: vec![id(METER)],
        relations: devices
            .iter()
            .map(|&d| EnergyRelation::symmetric(id(d), id(METER), Commodity::ActivePower))
            .collect(),
        meter_devices: vec![MeterDevices {
            meter: id(METER),
            pv: pv.iter().map(|&d| id(d)).collect(),
            chp: Vec::new(),
            battery: battery.iter().map(|&d| id(d)).collect(),
        }],
    }
}

pub fn electrical_grid(topology: GridTopology, fast_path: bool) -> Vec<Box<dyn EnergyGrid>> {
    vec![Box::new(
        ElectricalEnergyGrid::new(topology)
            .expect("topology should be valid")
            .with_fast_path(fast_path),
    )]
}

/// Evaluator over `parts` and `grids` with no prices or limits.
pub fn evaluator(
    parts: Vec<Box<dyn ProblemPart>>,
    grids: Vec<Box<dyn EnergyGrid>>,
    step_size: u64,
    multithreaded: bool,
) -> ProblemEvaluator {
    evaluator_with_signals(parts, grids, step_size, multithreaded, Signals::default())
}

pub fn evaluator_with_signals(
    parts: Vec<Box<dyn ProblemPart>>,
    grids: Vec<Box<dyn EnergyGrid>>,
    step_size: u64,
    multithreaded: bool,
    signals: Signals,
) -> ProblemEvaluator {
    let master = DataContainer::new(parts, grids).expect("container should build");
    let window = EvaluationWindow::new(
        master.reference_time(),
        master.optimization_horizon(),
        step_size,
        master.reference_time(),
    );
    let distributor = SolutionDistributor::new(master.parts());
    ProblemEvaluator::new(
        ContainerPool::new(master, multithreaded),
        distributor,
        Arc::new(EnergyCostFitness::default()),
        Arc::new(signals),
        window,
    )
}

pub const HORIZON: u64 = 85_500;
pub const STEP: u64 = 900;

pub const LOAD: u128 = 1;
pub const PV: u128 = 2;
pub const BATTERY: u128 = 3;

/// Base load, PV and a scheduled battery on one meter, one day at 15 min.
pub fn household_parts() -> Vec<Box<dyn ProblemPart>> {
    vec![
        Box::new(BaseLoad::new(id(LOAD), 0, HORIZON, 600.0, 42).with_profile(400.0, 1.2, 50.0)),
        Box::new(PvSystem::new(id(PV), 0, HORIZON, 5000.0).with_noise(0.05, 43)),
        Box::new(Battery::new(id(BATTERY), 0, HORIZON, STEP, 10_000.0, 0.5, 5000.0, 5000.0)),
    ]
}

pub fn household_topology() -> GridTopology {
    single_meter_topology(&[LOAD, PV, BATTERY], &[PV], &[BATTERY])
}
