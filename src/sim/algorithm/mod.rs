//! Search algorithms driving the evaluator, and the executor that runs a
//! configured set of them.

/// Genetic algorithm over binary or real encodings.
pub mod genetic;
/// Uniform random sampling baseline.
pub mod random;

use thiserror::Error;
use tracing::{debug, info};

use crate::error::Error;
use crate::sim::distributor::{EncodedSolution, Encoding};
use crate::sim::evaluator::ProblemEvaluator;

pub use genetic::{GeneticAlgorithm, GeneticParams};
pub use random::RandomSearch;

/// Failures inside a search algorithm.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// A parameter is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Evaluating a candidate failed.
    #[error("evaluation failed: {0}")]
    Evaluation(#[source] Box<Error>),

    /// The evaluation thread pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(String),

    /// The algorithms finished without a single evaluated solution.
    #[error("no solution produced")]
    NoSolution,
}

/// A candidate together with its objective values (all minimized).
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedSolution {
    pub solution: EncodedSolution,
    pub objectives: Vec<f64>,
}

impl EvaluatedSolution {
    /// Returns `true` if `self` is no worse in every objective and strictly
    /// better in at least one.
    pub fn dominates(&self, other: &EvaluatedSolution) -> bool {
        let mut strictly_better = false;
        for (a, b) in self.objectives.iter().zip(&other.objectives) {
            if a > b {
                return false;
            }
            if a < b {
                strictly_better = true;
            }
        }
        strictly_better
    }
}

/// Keeps the solutions no other solution dominates, dropping duplicates.
pub fn non_dominated(solutions: Vec<EvaluatedSolution>) -> Vec<EvaluatedSolution> {
    let mut front: Vec<EvaluatedSolution> = Vec::new();
    for (i, candidate) in solutions.iter().enumerate() {
        if solutions.iter().any(|other| other.dominates(candidate)) {
            continue;
        }
        if solutions[..i].iter().any(|s| s.solution == candidate.solution) {
            continue;
        }
        front.push(candidate.clone());
    }
    front
}

/// The problem as seen by a search algorithm.
pub struct OptimizationProblem<'a> {
    evaluator: &'a ProblemEvaluator,
}

impl<'a> OptimizationProblem<'a> {
    /// Wraps `evaluator`.
    pub fn new(evaluator: &'a ProblemEvaluator) -> Self {
        Self { evaluator }
    }

    /// Number of variables for `encoding`.
    pub fn width(&self, encoding: Encoding) -> usize {
        self.evaluator.distributor().width(encoding)
    }

    /// Objective values of `solution`.
    ///
    /// # Errors
    ///
    /// Wraps evaluator failures in [`AlgorithmError::Evaluation`].
    pub fn evaluate(&self, solution: &EncodedSolution) -> Result<Vec<f64>, AlgorithmError> {
        self.evaluator
            .evaluate(solution)
            .map(|fitness| vec![fitness])
            .map_err(|e| AlgorithmError::Evaluation(Box::new(e)))
    }
}

/// A search algorithm: repeatedly evaluates self-generated candidates and
/// returns a non-dominated set.
pub trait SearchAlgorithm: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Encoding of the candidates this algorithm produces.
    fn encoding(&self) -> Encoding;

    /// Runs the search to its own stopping rule.
    ///
    /// # Errors
    ///
    /// Returns an [`AlgorithmError`] on invalid parameters or failed
    /// evaluations.
    fn run(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<EvaluatedSolution>, AlgorithmError>;
}

/// Runs a list of search algorithms in order and merges their results.
#[derive(Default)]
pub struct AlgorithmExecutor {
    algorithms: Vec<Box<dyn SearchAlgorithm>>,
}

impl AlgorithmExecutor {
    /// Creates an executor without algorithms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an algorithm.
    pub fn with(mut self, algorithm: Box<dyn SearchAlgorithm>) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Number of configured algorithms.
    pub fn len(&self) -> usize {
        self.algorithms.len()
    }

    /// Returns `true` if no algorithm is configured.
    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    /// Runs every algorithm and returns the merged non-dominated set.
    ///
    /// # Errors
    ///
    /// Propagates the first algorithm failure; returns
    /// [`AlgorithmError::NoSolution`] if nothing was produced.
    pub fn run_algorithms(
        &self,
        problem: &OptimizationProblem<'_>,
    ) -> Result<Vec<EvaluatedSolution>, AlgorithmError> {
        let mut merged = Vec::new();
        for algorithm in &self.algorithms {
            info!(
                algorithm = algorithm.name(),
                width = problem.width(algorithm.encoding()),
                "running search algorithm"
            );
            let found = algorithm.run(problem)?;
            debug!(algorithm = algorithm.name(), solutions = found.len(), "search finished");
            merged.extend(found);
        }
        let front = non_dominated(merged);
        if front.is_empty() {
            return Err(AlgorithmError::NoSolution);
        }
        Ok(front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluated(bits: &[bool], objectives: &[f64]) -> EvaluatedSolution {
        EvaluatedSolution {
            solution: EncodedSolution::Binary(bits.to_vec()),
            objectives: objectives.to_vec(),
        }
    }

    #[test]
    fn dominance_requires_strict_improvement() {
        let a = evaluated(&[true], &[1.0, 2.0]);
        let b = evaluated(&[false], &[1.0, 3.0]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&a));
    }

    #[test]
    fn non_dominated_keeps_the_front_once() {
        let front = non_dominated(vec![
            evaluated(&[true, true], &[1.0, 5.0]),
            evaluated(&[true, false], &[2.0, 2.0]),
            evaluated(&[false, false], &[3.0, 3.0]),
            evaluated(&[true, true], &[1.0, 5.0]),
        ]);
        assert_eq!(front.len(), 2);
        assert_eq!(front[0].objectives, vec![1.0, 5.0]);
        assert_eq!(front[1].objectives, vec![2.0, 2.0]);
    }
}
