use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Deserialize;

use crate::sim::algorithm::{
    AlgorithmError, EvaluatedSolution, OptimizationProblem, SearchAlgorithm, non_dominated,
};
use crate::sim::distributor::{EncodedSolution, Encoding};

/// Evaluates uniformly sampled candidates and keeps the non-dominated ones.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomSearch {
    pub encoding: Encoding,
    pub samples: usize,
    pub seed: u64,
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self {
            encoding: Encoding::Binary,
            samples: 100,
            seed: 7,
        }
    }
}

impl SearchAlgorithm for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn run(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<EvaluatedSolution>, AlgorithmError> {
        if self.samples == 0 {
            return Err(AlgorithmError::InvalidParameter {
                name: "samples",
                reason: "must be > 0".to_string(),
            });
        }
        let width = problem.width(self.encoding);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let samples = if width == 0 { 1 } else { self.samples };

        let mut found = Vec::with_capacity(samples);
        for _ in 0..samples {
            let solution = match self.encoding {
                Encoding::Binary => EncodedSolution::Binary((0..width).map(|_| rng.random_bool(0.5)).collect()),
                Encoding::Real => EncodedSolution::Real((0..width).map(|_| rng.random::<f64>()).collect()),
            };
            let objectives = problem.evaluate(&solution)?;
            found.push(EvaluatedSolution {
                solution,
                objectives,
            });
        }
        Ok(non_dominated(found))
    }
}
