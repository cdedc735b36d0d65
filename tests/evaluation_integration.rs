//! Integration tests for the interdependent evaluation loop.

mod common;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use common::*;
use ems_sim::Error;
use ems_sim::commodity::AncillaryCommodity;
use ems_sim::devices::ProblemPart;
use ems_sim::sim::distributor::{EncodedSolution, Encoding};
use ems_sim::sim::evaluator::{EvaluationFlags, ProblemEvaluator, Signals};
use ems_sim::sim::logger::EvaluationLogger;
use ems_sim::sim::signals::PriceSignal;

fn random_solution(width: usize, seed: u64) -> EncodedSolution {
    let mut rng = StdRng::seed_from_u64(seed);
    EncodedSolution::Binary((0..width).map(|_| rng.random_bool(0.5)).collect())
}

#[test]
fn three_tick_window_produces_three_entries() {
    let parts: Vec<Box<dyn ProblemPart>> = vec![Box::new(FixedPower::new(1, 2, 100.0))];
    let grids = electrical_grid(single_meter_topology(&[1], &[], &[]), true);
    let ev = evaluator(parts, grids, 1, false);

    let mut logger = EvaluationLogger::new();
    let outcome = ev
        .evaluate_detailed(
            &EncodedSolution::Binary(Vec::new()),
            EvaluationFlags::default(),
            &mut logger,
        )
        .expect("evaluation should succeed");

    let profile = outcome.load_profile;
    assert!(profile.is_closed());
    assert_eq!(profile.len(), 3);
    assert_eq!(profile.ticks().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert_eq!(profile.end(), Some(3));

    let log = logger.finish();
    assert_eq!(log.predicted_state.len(), 3);
    assert_eq!(log.schedules[0].ticks, vec![0, 1, 2]);
}

#[test]
fn pv_only_meter_feeds_everything_in() {
    let parts: Vec<Box<dyn ProblemPart>> = vec![Box::new(FixedPower::new(PV, 0, -100.0))];
    let grids = electrical_grid(single_meter_topology(&[PV], &[PV], &[]), true);
    let ev = evaluator(parts, grids, 1, false);

    let outcome = ev
        .evaluate_detailed(
            &EncodedSolution::Binary(Vec::new()),
            EvaluationFlags::default(),
            &mut EvaluationLogger::new(),
        )
        .expect("evaluation should succeed");

    let p = &outcome.load_profile;
    assert_eq!(p.power(AncillaryCommodity::PvActivePowerFeedIn, 0), -100.0);
    assert_eq!(p.power(AncillaryCommodity::PvActivePowerAutoConsumption, 0), 0.0);
    assert_eq!(p.power(AncillaryCommodity::ActivePowerExternal, 0), -100.0);
}

#[test]
fn local_load_consumes_pv_output() {
    let parts: Vec<Box<dyn ProblemPart>> = vec![
        Box::new(FixedPower::new(LOAD, 0, 150.0)),
        Box::new(FixedPower::new(PV, 0, -100.0)),
    ];
    let grids = electrical_grid(single_meter_topology(&[LOAD, PV], &[PV], &[]), true);
    let ev = evaluator(parts, grids, 1, false);

    let outcome = ev
        .evaluate_detailed(
            &EncodedSolution::Binary(Vec::new()),
            EvaluationFlags::default(),
            &mut EvaluationLogger::new(),
        )
        .expect("evaluation should succeed");

    let p = &outcome.load_profile;
    assert_eq!(p.power(AncillaryCommodity::PvActivePowerAutoConsumption, 0), -100.0);
    assert_eq!(p.power(AncillaryCommodity::PvActivePowerFeedIn, 0), 0.0);
    assert_eq!(p.power(AncillaryCommodity::ActivePowerExternal, 0), 50.0);
}

#[test]
fn fitness_bills_imported_energy() {
    let parts: Vec<Box<dyn ProblemPart>> = vec![Box::new(FixedPower::new(LOAD, 3600, 1000.0))];
    let grids = electrical_grid(single_meter_topology(&[LOAD], &[], &[]), true);
    let signals = Signals {
        prices: [(AncillaryCommodity::ActivePowerExternal, PriceSignal::flat(0.25))].into(),
        ..Signals::default()
    };
    let ev = evaluator_with_signals(parts, grids, 3600, false, signals);

    // ticks 0 and 3600, 1 kWh each
    let fitness = ev
        .evaluate(&EncodedSolution::Binary(Vec::new()))
        .expect("evaluation should succeed");
    assert!((fitness - 0.5).abs() < 1e-12);
}

#[test]
fn wrong_solution_width_is_rejected() {
    let ev = evaluator(
        household_parts(),
        electrical_grid(household_topology(), true),
        STEP,
        false,
    );
    let width = ev.distributor().width(Encoding::Binary);
    assert_eq!(width, 2 * 96);

    let err = ev
        .evaluate(&random_solution(width - 1, 1))
        .expect_err("short solution must fail");
    assert!(matches!(
        err,
        Error::SolutionSizeMismatch {
            expected: 192,
            actual: 191
        }
    ));
}

#[test]
fn evaluations_are_deterministic_across_pooled_containers() {
    let single = evaluator(
        household_parts(),
        electrical_grid(household_topology(), true),
        STEP,
        false,
    );
    let pooled = evaluator(
        household_parts(),
        electrical_grid(household_topology(), true),
        STEP,
        true,
    );
    let width = single.distributor().width(Encoding::Binary);
    let solutions: Vec<EncodedSolution> = (0..8).map(|s| random_solution(width, s)).collect();

    let detailed = |ev: &ProblemEvaluator, solution: &EncodedSolution| {
        ev.evaluate_detailed(solution, EvaluationFlags::default(), &mut EvaluationLogger::new())
            .expect("evaluation should succeed")
    };
    let expected: Vec<_> = solutions.iter().map(|s| detailed(&single, s)).collect();

    // every solution evaluated several times, interleaved across threads
    let repeated: Vec<_> = (0..solutions.len() * 4)
        .into_par_iter()
        .map(|i| {
            let k = i % solutions.len();
            (k, detailed(&pooled, &solutions[k]))
        })
        .collect();

    for (k, outcome) in repeated {
        assert_eq!(
            outcome.fitness.to_bits(),
            expected[k].fitness.to_bits(),
            "solution {k} fitness diverged"
        );
        assert_eq!(outcome.load_profile, expected[k].load_profile, "solution {k} profile diverged");
    }
}

#[test]
fn fast_path_matches_general_path_end_to_end() {
    let fast = evaluator(
        household_parts(),
        electrical_grid(household_topology(), true),
        STEP,
        false,
    );
    let general = evaluator(
        household_parts(),
        electrical_grid(household_topology(), false),
        STEP,
        false,
    );
    let width = fast.distributor().width(Encoding::Binary);

    for seed in 0..4 {
        let solution = random_solution(width, 100 + seed);
        let a = fast
            .evaluate_detailed(&solution, EvaluationFlags::default(), &mut EvaluationLogger::new())
            .expect("evaluation should succeed");
        let b = general
            .evaluate_detailed(&solution, EvaluationFlags::default(), &mut EvaluationLogger::new())
            .expect("evaluation should succeed");
        assert_eq!(a.load_profile, b.load_profile);
        assert_eq!(a.fitness.to_bits(), b.fitness.to_bits());
    }
}
