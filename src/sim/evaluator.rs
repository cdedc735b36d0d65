//! Interdependent tick-by-tick simulation of one candidate solution.
//!
//! Every evaluation starts from a freshly re-initialized set of parts, so two
//! evaluations of the same solution yield bit-identical fitness and load
//! profile regardless of which pooled container or thread ran them.

use std::sync::Arc;

use tracing::trace;

use crate::commodity::AncillaryCommodity;
use crate::devices::StepInput;
use crate::error::Result;
use crate::sim::clock::Clock;
use crate::sim::container::{ContainerPool, DataContainer};
use crate::sim::distributor::{EncodedSolution, SolutionDistributor};
use crate::sim::fitness::FitnessFunction;
use crate::sim::logger::EvaluationLogger;
use crate::sim::meter::{AncillaryCommodityLoadProfile, AncillaryMeterState};
use crate::sim::signals::{LimitSignals, PriceSignals};

/// Tick range of an evaluation and the window the fitness is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationWindow {
    pub reference_time: u64,
    pub optimization_horizon: u64,
    pub step_size: u64,
    /// Ticks before this are ignored by the fitness function.
    pub ignore_before: u64,
    /// Ticks from this on are ignored by the fitness function.
    pub ignore_after: u64,
}

impl EvaluationWindow {
    /// Window simulating `[reference_time, horizon + step_size)` with the
    /// fitness computed from `optimization_start` to the end.
    pub fn new(reference_time: u64, optimization_horizon: u64, step_size: u64, optimization_start: u64) -> Self {
        let step_size = step_size.max(1);
        Self {
            reference_time,
            optimization_horizon,
            step_size,
            ignore_before: optimization_start,
            ignore_after: optimization_horizon + step_size,
        }
    }

    /// Exclusive end tick of the simulation.
    pub fn end(&self) -> u64 {
        self.optimization_horizon + self.step_size
    }

    /// Number of simulated ticks.
    pub fn tick_count(&self) -> usize {
        Clock::new(self.reference_time, self.end(), self.step_size).remaining()
    }
}

/// Extra work requested from a detailed evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationFlags {
    /// Parts emit `trace!` output while stepping.
    pub log: bool,
    /// Parts keep their internal state traces.
    pub keep_prediction: bool,
}

/// Result of a detailed evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub fitness: f64,
    pub load_profile: AncillaryCommodityLoadProfile,
}

/// Price and limit signals the fitness is computed against.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub prices: PriceSignals,
    pub limits: LimitSignals,
}

/// Maps an encoded solution to a scalar fitness by simulating it.
///
/// `evaluate` takes `&self` and may be called from many threads at once;
/// each call borrows its own container from the pool.
pub struct ProblemEvaluator {
    pool: ContainerPool,
    distributor: SolutionDistributor,
    fitness: Arc<dyn FitnessFunction>,
    signals: Arc<Signals>,
    window: EvaluationWindow,
}

impl ProblemEvaluator {
    /// Creates an evaluator over the containers of `pool`.
    pub fn new(
        pool: ContainerPool,
        distributor: SolutionDistributor,
        fitness: Arc<dyn FitnessFunction>,
        signals: Arc<Signals>,
        window: EvaluationWindow,
    ) -> Self {
        Self {
            pool,
            distributor,
            fitness,
            signals,
            window,
        }
    }

    /// Solution distributor of this problem.
    pub fn distributor(&self) -> &SolutionDistributor {
        &self.distributor
    }

    /// Simulated window.
    pub fn window(&self) -> &EvaluationWindow {
        &self.window
    }

    /// Fitness of `solution`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SolutionSizeMismatch`](crate::Error::SolutionSizeMismatch)
    /// for a solution of the wrong width, or a grid error.
    pub fn evaluate(&self, solution: &EncodedSolution) -> Result<f64> {
        let mut container = self.pool.acquire();
        let (fitness, _) = self.run(&mut container, solution, EvaluationFlags::default(), None)?;
        Ok(fitness)
    }

    /// Fitness and load profile of `solution`, feeding `logger` with every
    /// tick's meter state and part outputs.
    ///
    /// # Errors
    ///
    /// Same as [`evaluate`](Self::evaluate).
    pub fn evaluate_detailed(
        &self,
        solution: &EncodedSolution,
        flags: EvaluationFlags,
        logger: &mut EvaluationLogger,
    ) -> Result<EvaluationOutcome> {
        let mut container = self.pool.acquire();
        let (fitness, load_profile) = self.run(&mut container, solution, flags, Some(logger))?;
        Ok(EvaluationOutcome {
            fitness,
            load_profile,
        })
    }

    /// Consumes the evaluator and returns the master container.
    pub fn into_master(self) -> DataContainer {
        self.pool.into_master()
    }

    fn run(
        &self,
        c: &mut DataContainer,
        solution: &EncodedSolution,
        flags: EvaluationFlags,
        mut logger: Option<&mut EvaluationLogger>,
    ) -> Result<(f64, AncillaryCommodityLoadProfile)> {
        let window = &self.window;

        c.clear_exchange_state();
        self.distributor.distribute_solution(solution, &mut c.parts)?;
        for &d in &c.non_static {
            c.parts[d].initialize_interdependent_calculation(
                window.reference_time,
                window.step_size,
                flags.log,
                flags.keep_prediction,
            );
        }
        if let Some(logger) = logger.as_deref_mut() {
            logger.begin(&c.parts);
        }

        // Tick-0 meter state is unknown and taken as all zero.
        let zero_meter = AncillaryMeterState::new();
        for &d in &c.passive {
            let step = StepInput {
                tick: window.reference_time,
                input: &c.inputs[d],
                meter: &zero_meter,
            };
            c.passive_to_active[d].clear();
            c.parts[d].calculate_next_step(&step, &mut c.passive_to_active[d]);
        }
        for grid in &c.grids {
            grid.do_passive_to_active_exchange(&c.passive_to_active, &mut c.inputs)?;
        }

        let mut profile = AncillaryCommodityLoadProfile::with_capacity(
            window.reference_time,
            window.step_size,
            window.tick_count(),
        );
        let mut clock = Clock::new(window.reference_time, window.end(), window.step_size);
        clock.try_run(|tick| -> Result<()> {
            for &d in &c.active {
                let step = StepInput {
                    tick,
                    input: &c.inputs[d],
                    meter: &c.meter_state,
                };
                c.active_to_passive[d].clear();
                c.parts[d].calculate_next_step(&step, &mut c.active_to_passive[d]);
            }

            c.meter_state.clear();
            for &d in &c.passive {
                c.inputs[d].clear();
            }
            for grid in &mut c.grids {
                grid.do_active_to_passive_exchange(
                    &c.active_to_passive,
                    &mut c.inputs,
                    &mut c.meter_state,
                )?;
            }
            profile.set_state_at(tick, &c.meter_state);

            for &d in &c.passive {
                let step = StepInput {
                    tick,
                    input: &c.inputs[d],
                    meter: &c.meter_state,
                };
                c.passive_to_active[d].clear();
                c.parts[d].calculate_next_step(&step, &mut c.passive_to_active[d]);
            }

            for &d in &c.needs_input {
                c.inputs[d].clear();
            }
            for grid in &c.grids {
                grid.do_passive_to_active_exchange(&c.passive_to_active, &mut c.inputs)?;
            }

            if let Some(logger) = logger.as_deref_mut() {
                logger.record_meter(tick, &c.meter_state);
                for &d in &c.active {
                    logger.record_output(d, tick, &c.active_to_passive[d]);
                }
                for &d in &c.passive {
                    logger.record_output(d, tick, &c.passive_to_active[d]);
                }
            }
            if flags.log {
                trace!(
                    tick,
                    external = c.meter_state.power(AncillaryCommodity::ActivePowerExternal),
                    "simulated tick"
                );
            }
            Ok(())
        })?;
        profile.end_sequential(window.end());

        let mut fitness = self.fitness.fitness_value(
            window.ignore_before,
            window.ignore_after,
            &profile,
            &self.signals.prices,
            &self.signals.limits,
        );
        for &d in &c.non_static {
            let part = &mut c.parts[d];
            part.finalize_cervisia();
            let cervisia = part.cervisia();
            fitness += cervisia;
            if let Some(logger) = logger.as_deref_mut() {
                logger.record_cervisia(d, cervisia);
            }
        }

        Ok((fitness, profile))
    }
}
