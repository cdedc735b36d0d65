//! Top-level optimization entry point.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::devices::ProblemPart;
use crate::error::Result;
use crate::sim::algorithm::{AlgorithmExecutor, OptimizationProblem};
use crate::sim::container::{ContainerPool, DataContainer};
use crate::sim::distributor::{EncodedSolution, SolutionDistributor};
use crate::sim::evaluator::{EvaluationFlags, EvaluationWindow, ProblemEvaluator, Signals};
use crate::sim::fitness::FitnessFunction;
use crate::sim::grid::EnergyGrid;
use crate::sim::logger::{EvaluationLogger, MeterSample};
use crate::sim::meter::AncillaryCommodityLoadProfile;
use crate::sim::ranking::{SolutionRanking, normalize};
use crate::sim::schedule::DeviceSchedule;

/// Winning schedule of one optimization run.
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub predicted_state: Vec<MeterSample>,
    pub schedules: Vec<DeviceSchedule>,
    pub load_profile: AncillaryCommodityLoadProfile,
    pub solution: EncodedSolution,
    /// Fitness of the final detailed evaluation.
    pub fitness: f64,
}

/// Solver settings shared by every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverSettings {
    /// Ticks between two simulated steps.
    pub step_size: u64,
    /// Pool containers for parallel evaluation instead of sharing one.
    pub multithreaded: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            step_size: 900,
            multithreaded: true,
        }
    }
}

/// Builds the evaluation machinery, runs the search algorithms and
/// materializes the best-ranked schedule.
pub struct EnergySolver {
    settings: SolverSettings,
    ranking: Box<dyn SolutionRanking>,
}

impl EnergySolver {
    /// Creates a solver ranking its candidates with `ranking`.
    pub fn new(settings: SolverSettings, ranking: Box<dyn SolutionRanking>) -> Self {
        Self { settings, ranking }
    }

    /// Optimizes the schedules of `parts` over `grids`.
    ///
    /// Returns `Ok(None)` when the search algorithms fail; the failure is
    /// logged and the caller keeps its previous schedule.
    ///
    /// # Errors
    ///
    /// Configuration errors (role collisions, empty problem, grid errors in
    /// the final evaluation) are returned immediately.
    pub fn get_solution(
        &self,
        parts: Vec<Box<dyn ProblemPart>>,
        grids: Vec<Box<dyn EnergyGrid>>,
        optimization_start: u64,
        fitness: Arc<dyn FitnessFunction>,
        signals: Arc<Signals>,
        executor: &AlgorithmExecutor,
    ) -> Result<Option<ScheduleResult>> {
        let master = DataContainer::new(parts, grids)?;
        let window = EvaluationWindow::new(
            master.reference_time(),
            master.optimization_horizon(),
            self.settings.step_size,
            optimization_start,
        );
        let distributor = SolutionDistributor::new(master.parts());
        let (active, passive, needs_input) = master.roles();
        info!(
            parts = master.parts().len(),
            active = active.len(),
            passive = passive.len(),
            needs_input = needs_input.len(),
            reference_time = window.reference_time,
            horizon = window.optimization_horizon,
            step = window.step_size,
            "starting optimization"
        );

        let evaluator = ProblemEvaluator::new(
            ContainerPool::new(master, self.settings.multithreaded),
            distributor,
            fitness,
            signals,
            window,
        );

        let result = executor.run_algorithms(&OptimizationProblem::new(&evaluator));
        let solutions = match result {
            Ok(solutions) => solutions,
            Err(e) => {
                error!(error = %e, "optimization produced no solution");
                evaluator.into_master().finalize_grids();
                return Ok(None);
            }
        };

        let objectives: Vec<Vec<f64>> = solutions.iter().map(|s| s.objectives.clone()).collect();
        let order = self.ranking.rank(&normalize(&objectives));
        let Some(winner) = order.first().and_then(|&i| solutions.get(i)) else {
            error!("ranking returned no solution");
            evaluator.into_master().finalize_grids();
            return Ok(None);
        };
        info!(
            ranking = self.ranking.name(),
            candidates = solutions.len(),
            objectives = ?winner.objectives,
            "selected solution"
        );

        let mut logger = EvaluationLogger::new();
        let outcome = evaluator.evaluate_detailed(
            &winner.solution,
            EvaluationFlags {
                log: true,
                keep_prediction: true,
            },
            &mut logger,
        )?;

        let recorded = winner.objectives.first().copied().unwrap_or(f64::NAN);
        if (outcome.fitness - recorded).abs() > 1e-9 * recorded.abs().max(1.0) {
            warn!(
                recomputed = outcome.fitness,
                recorded, "final evaluation disagrees with the algorithm's fitness"
            );
        }

        evaluator.into_master().finalize_grids();
        let log = logger.finish();
        info!(fitness = outcome.fitness, "optimization finished");

        Ok(Some(ScheduleResult {
            predicted_state: log.predicted_state,
            schedules: log.schedules,
            load_profile: outcome.load_profile,
            solution: winner.solution.clone(),
            fitness: outcome.fitness,
        }))
    }
}
