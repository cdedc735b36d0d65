//! Per-evaluation working set and the pool that hands it out to threads.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::queue::SegQueue;

use crate::devices::{DeviceId, ProblemPart};
use crate::error::{Error, Result};
use crate::sim::grid::{EnergyGrid, GridParticipants, PartRole};
use crate::sim::meter::AncillaryMeterState;
use crate::sim::state_map::LimitedCommodityStateMap;

/// Everything one evaluation mutates: the parts, the grids, the exchange
/// maps and the meter state.
///
/// A container is exclusively owned by the evaluation using it. Parallel
/// evaluations use independent [`duplicate`](Self::duplicate)s.
pub struct DataContainer {
    pub(crate) parts: Vec<Box<dyn ProblemPart>>,
    pub(crate) grids: Vec<Box<dyn EnergyGrid>>,
    pub(crate) active: Vec<usize>,
    pub(crate) passive: Vec<usize>,
    pub(crate) needs_input: Vec<usize>,
    pub(crate) non_static: Vec<usize>,
    /// Outputs of active parts, by dense id.
    pub(crate) active_to_passive: Vec<LimitedCommodityStateMap>,
    /// Outputs of passive parts, by dense id.
    pub(crate) passive_to_active: Vec<LimitedCommodityStateMap>,
    pub(crate) inputs: Vec<LimitedCommodityStateMap>,
    pub(crate) meter_state: AncillaryMeterState,
}

impl DataContainer {
    /// Builds the container, assigns dense ids in list order, derives the
    /// part roles from the grid topologies and initializes every grid.
    ///
    /// A part is passive if any grid lists it as the passive end of a
    /// relation, active otherwise. Completely static parts get a dense id
    /// but take no part in the simulation.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyProblem`] if `parts` is empty
    /// * [`Error::ActivePassiveCollision`] if a device is active in one grid
    ///   and passive (or a meter) in another
    pub fn new(
        mut parts: Vec<Box<dyn ProblemPart>>,
        mut grids: Vec<Box<dyn EnergyGrid>>,
    ) -> Result<Self> {
        if parts.is_empty() {
            return Err(Error::EmptyProblem);
        }

        let mut topology_active: BTreeSet<DeviceId> = BTreeSet::new();
        let mut topology_passive: BTreeSet<DeviceId> = BTreeSet::new();
        for grid in &grids {
            let topology = grid.topology();
            topology_active.extend(topology.active_ids());
            topology_passive.extend(topology.passive_ids());
            topology_passive.extend(topology.meters.iter().copied());
        }
        if let Some(id) = topology_active.intersection(&topology_passive).next() {
            return Err(Error::ActivePassiveCollision(*id));
        }

        let mut container = Self {
            parts: Vec::new(),
            grids: Vec::new(),
            active: Vec::new(),
            passive: Vec::new(),
            needs_input: Vec::new(),
            non_static: Vec::new(),
            active_to_passive: Vec::with_capacity(parts.len()),
            passive_to_active: Vec::with_capacity(parts.len()),
            inputs: vec![LimitedCommodityStateMap::default(); parts.len()],
            meter_state: AncillaryMeterState::new(),
        };

        let mut participants = GridParticipants::new();
        for (dense_id, part) in parts.iter_mut().enumerate() {
            part.set_dense_id(dense_id);
            let outputs = part.output_commodities();
            container
                .active_to_passive
                .push(LimitedCommodityStateMap::new(outputs));
            container
                .passive_to_active
                .push(LimitedCommodityStateMap::new(outputs));

            if part.is_completely_static() {
                continue;
            }
            container.non_static.push(dense_id);
            let role = if topology_passive.contains(&part.device_id()) {
                container.passive.push(dense_id);
                PartRole::Passive
            } else {
                container.active.push(dense_id);
                if part.reacts_to_input_states() {
                    container.needs_input.push(dense_id);
                }
                PartRole::Active
            };
            participants.add(
                part.device_id(),
                dense_id,
                role,
                part.reacts_to_input_states(),
                outputs,
            );
        }

        for grid in &mut grids {
            grid.initialize_grid(&participants);
        }
        container.parts = parts;
        container.grids = grids;
        Ok(container)
    }

    /// Parts ordered by dense id.
    pub fn parts(&self) -> &[Box<dyn ProblemPart>] {
        &self.parts
    }

    /// Grids in configuration order.
    pub fn grids(&self) -> &[Box<dyn EnergyGrid>] {
        &self.grids
    }

    /// Dense ids of the active, passive and input-reacting parts.
    pub fn roles(&self) -> (&[usize], &[usize], &[usize]) {
        (&self.active, &self.passive, &self.needs_input)
    }

    /// Earliest reference time over all non-static parts.
    pub fn reference_time(&self) -> u64 {
        self.non_static
            .iter()
            .map(|&d| self.parts[d].reference_time())
            .min()
            .unwrap_or(0)
    }

    /// Latest optimization horizon over all non-static parts.
    pub fn optimization_horizon(&self) -> u64 {
        self.non_static
            .iter()
            .map(|&d| self.parts[d].optimization_horizon())
            .max()
            .unwrap_or(0)
    }

    /// Clears every exchange map, input map and the meter state.
    pub(crate) fn clear_exchange_state(&mut self) {
        for map in self
            .active_to_passive
            .iter_mut()
            .chain(&mut self.passive_to_active)
            .chain(&mut self.inputs)
        {
            map.clear();
        }
        self.meter_state.clear();
    }

    /// Finalizes every grid. Must not run while evaluations are in flight.
    pub fn finalize_grids(&mut self) {
        for grid in &mut self.grids {
            grid.finalize_grid();
        }
    }

    /// Independent deep copy of the whole container.
    pub fn duplicate(&self) -> Self {
        Self {
            parts: self.parts.iter().map(|p| p.duplicate()).collect(),
            grids: self.grids.iter().map(|g| g.duplicate()).collect(),
            active: self.active.clone(),
            passive: self.passive.clone(),
            needs_input: self.needs_input.clone(),
            non_static: self.non_static.clone(),
            active_to_passive: self.active_to_passive.clone(),
            passive_to_active: self.passive_to_active.clone(),
            inputs: self.inputs.clone(),
            meter_state: self.meter_state.clone(),
        }
    }
}

/// Source of containers for evaluations.
pub enum ContainerPool {
    /// One container behind a mutex; evaluations are serialized.
    Shared(Mutex<DataContainer>),
    /// Lock-free pool of duplicates of a read-only master.
    Pooled {
        master: DataContainer,
        pool: SegQueue<DataContainer>,
    },
}

impl ContainerPool {
    /// Wraps `master` for single-threaded or multithreaded use.
    pub fn new(master: DataContainer, multithreaded: bool) -> Self {
        if multithreaded {
            ContainerPool::Pooled {
                master,
                pool: SegQueue::new(),
            }
        } else {
            ContainerPool::Shared(Mutex::new(master))
        }
    }

    /// Hands out a container for exclusive use until the guard is dropped.
    ///
    /// In pooled mode an idle container is reused or the master is
    /// duplicated; the master itself is never handed out.
    pub fn acquire(&self) -> PooledContainer<'_> {
        match self {
            ContainerPool::Shared(mutex) => {
                PooledContainer::Shared(mutex.lock().unwrap_or_else(PoisonError::into_inner))
            }
            ContainerPool::Pooled { master, pool } => PooledContainer::Pooled {
                container: Some(pool.pop().unwrap_or_else(|| master.duplicate())),
                pool,
            },
        }
    }

    /// Number of idle pooled containers.
    pub fn idle(&self) -> usize {
        match self {
            ContainerPool::Shared(_) => 0,
            ContainerPool::Pooled { pool, .. } => pool.len(),
        }
    }

    /// Consumes the pool and returns the master container.
    pub fn into_master(self) -> DataContainer {
        match self {
            ContainerPool::Shared(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            ContainerPool::Pooled { master, .. } => master,
        }
    }
}

/// A container on loan from a [`ContainerPool`]; returned on drop.
pub enum PooledContainer<'a> {
    Shared(MutexGuard<'a, DataContainer>),
    Pooled {
        container: Option<DataContainer>,
        pool: &'a SegQueue<DataContainer>,
    },
}

impl Deref for PooledContainer<'_> {
    type Target = DataContainer;

    fn deref(&self) -> &DataContainer {
        match self {
            PooledContainer::Shared(guard) => guard,
            PooledContainer::Pooled { container, .. } => {
                container.as_ref().unwrap_or_else(|| unreachable!("container taken before drop"))
            }
        }
    }
}

impl DerefMut for PooledContainer<'_> {
    fn deref_mut(&mut self) -> &mut DataContainer {
        match self {
            PooledContainer::Shared(guard) => guard,
            PooledContainer::Pooled { container, .. } => {
                container.as_mut().unwrap_or_else(|| unreachable!("container taken before drop"))
            }
        }
    }
}

impl Drop for PooledContainer<'_> {
    fn drop(&mut self) {
        if let PooledContainer::Pooled { container, pool } = self {
            if let Some(c) = container.take() {
                pool.push(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::Commodity;
    use crate::devices::{BaseLoad, PvSystem};
    use crate::sim::grid::{ElectricalEnergyGrid, EnergyRelation, GridTopology};

    fn id(n: u128) -> DeviceId {
        DeviceId::from_u128(n)
    }

    fn parts() -> Vec<Box<dyn ProblemPart>> {
        vec![
            Box::new(BaseLoad::new(id(1), 0, 3600, 900.0, 1)),
            Box::new(PvSystem::new(id(2), 0, 3600, 4000.0)),
        ]
    }

    fn grid(relations: Vec<EnergyRelation>) -> Box<dyn EnergyGrid> {
        Box::new(
            ElectricalEnergyGrid::new(GridTopology {
                meters: vec![id(100)],
                relations,
                meter_devices: vec![],
            })
            .unwrap(),
        )
    }

    #[test]
    fn assigns_dense_ids_and_roles() {
        let c = DataContainer::new(
            parts(),
            vec![grid(vec![
                EnergyRelation::symmetric(id(1), id(100), Commodity::ActivePower),
                EnergyRelation::symmetric(id(2), id(100), Commodity::ActivePower),
            ])],
        )
        .unwrap();
        assert_eq!(c.parts()[1].dense_id(), 1);
        assert_eq!(c.roles(), (&[0, 1][..], &[][..], &[][..]));
        assert!(c.grids()[0].is_initialized());
    }

    #[test]
    fn collision_across_grids_is_rejected() {
        let a = grid(vec![EnergyRelation::symmetric(id(1), id(2), Commodity::ActivePower)]);
        let b = grid(vec![EnergyRelation::symmetric(id(2), id(100), Commodity::ActivePower)]);
        let err = DataContainer::new(parts(), vec![a, b]).err();
        assert!(matches!(err, Some(Error::ActivePassiveCollision(d)) if d == id(2)));
    }

    #[test]
    fn empty_problem_is_rejected() {
        assert!(matches!(
            DataContainer::new(Vec::new(), Vec::new()).err(),
            Some(Error::EmptyProblem)
        ));
    }

    #[test]
    fn pooled_containers_are_reused() {
        let master = DataContainer::new(parts(), vec![grid(vec![])]).unwrap();
        let pool = ContainerPool::new(master, true);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
        }
        assert_eq!(pool.idle(), 2);
        let _c = pool.acquire();
        assert_eq!(pool.idle(), 1);
    }
}
