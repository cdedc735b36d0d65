use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::devices::gaussian_noise;
use crate::sim::algorithm::{
    AlgorithmError, EvaluatedSolution, OptimizationProblem, SearchAlgorithm, non_dominated,
};
use crate::sim::distributor::{EncodedSolution, Encoding};

/// Parameters of the genetic algorithm.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneticParams {
    pub encoding: Encoding,
    pub population_size: usize,
    pub generations: usize,
    /// Stop once this many candidates were evaluated.
    pub max_evaluations: Option<usize>,
    pub crossover_rate: f64,
    /// Per-variable mutation probability; `None` means `1 / width`.
    pub mutation_rate: Option<f64>,
    /// Standard deviation of the real-valued mutation.
    pub mutation_sigma: f64,
    pub tournament_size: usize,
    /// Best individuals copied unchanged into the next generation.
    pub elitism: usize,
    pub seed: u64,
    /// Evaluation threads; `0` lets rayon decide.
    pub threads: usize,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            encoding: Encoding::Binary,
            population_size: 40,
            generations: 30,
            max_evaluations: None,
            crossover_rate: 0.9,
            mutation_rate: None,
            mutation_sigma: 0.1,
            tournament_size: 2,
            elitism: 2,
            seed: 42,
            threads: 0,
        }
    }
}

impl GeneticParams {
    fn validate(&self) -> Result<(), AlgorithmError> {
        let invalid = |name, reason: &str| {
            Err(AlgorithmError::InvalidParameter {
                name,
                reason: reason.to_string(),
            })
        };
        if self.population_size < 2 {
            return invalid("population_size", "must be at least 2");
        }
        if self.tournament_size == 0 {
            return invalid("tournament_size", "must be > 0");
        }
        if self.elitism >= self.population_size {
            return invalid("elitism", "must be below population_size");
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return invalid("crossover_rate", "must be within [0, 1]");
        }
        if self.mutation_rate.is_some_and(|r| !(0.0..=1.0).contains(&r)) {
            return invalid("mutation_rate", "must be within [0, 1]");
        }
        if self.mutation_sigma < 0.0 {
            return invalid("mutation_sigma", "must be >= 0");
        }
        Ok(())
    }
}

/// Generational genetic algorithm with tournament selection and elitism.
///
/// Binary genomes use one-point crossover and bit-flip mutation; real
/// genomes use blend crossover and Gaussian mutation clamped to `[0, 1]`.
/// Candidates of a generation are evaluated in parallel; all randomness
/// comes from one seeded generator on the calling thread, so results do not
/// depend on the thread count. The first objective drives selection.
#[derive(Debug, Clone)]
pub struct GeneticAlgorithm {
    params: GeneticParams,
}

struct Individual {
    genome: Genome,
    objectives: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Genome {
    Binary(Vec<bool>),
    Real(Vec<f64>),
}

impl Genome {
    fn random(encoding: Encoding, width: usize, rng: &mut StdRng) -> Self {
        match encoding {
            Encoding::Binary => Genome::Binary((0..width).map(|_| rng.random_bool(0.5)).collect()),
            Encoding::Real => Genome::Real((0..width).map(|_| rng.random::<f64>()).collect()),
        }
    }

    fn to_solution(&self) -> EncodedSolution {
        match self {
            Genome::Binary(bits) => EncodedSolution::Binary(bits.clone()),
            Genome::Real(values) => EncodedSolution::Real(values.clone()),
        }
    }
}

impl Individual {
    fn score(&self) -> f64 {
        self.objectives
            .as_ref()
            .and_then(|o| o.first().copied())
            .unwrap_or(f64::INFINITY)
    }
}

/// Child of a one-point crossover: `a[..cut]` followed by `b[cut..]`.
pub(crate) fn one_point_crossover<T: Clone>(a: &[T], b: &[T], rng: &mut StdRng) -> Vec<T> {
    let len = a.len().min(b.len());
    if len < 2 {
        return a.to_vec();
    }
    let cut = rng.random_range(1..len);
    let mut child = Vec::with_capacity(len);
    child.extend_from_slice(&a[..cut]);
    child.extend_from_slice(&b[cut..len]);
    child
}

/// Child of a blend crossover, every gene drawn between its parents' genes.
pub(crate) fn blend_crossover(a: &[f64], b: &[f64], rng: &mut StdRng) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let t: f64 = rng.random();
            x + t * (y - x)
        })
        .collect()
}

impl GeneticAlgorithm {
    /// Creates the algorithm.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError::InvalidParameter`] for out-of-range
    /// parameters.
    pub fn new(params: GeneticParams) -> Result<Self, AlgorithmError> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Parameters of this algorithm.
    pub fn params(&self) -> &GeneticParams {
        &self.params
    }

    fn tournament<'p>(&self, population: &'p [Individual], rng: &mut StdRng) -> &'p Individual {
        let mut best = &population[rng.random_range(0..population.len())];
        for _ in 1..self.params.tournament_size {
            let challenger = &population[rng.random_range(0..population.len())];
            if challenger.score() < best.score() {
                best = challenger;
            }
        }
        best
    }

    fn offspring(&self, a: &Genome, b: &Genome, width: usize, rng: &mut StdRng) -> Genome {
        let crossover = rng.random_bool(self.params.crossover_rate);
        let rate = self
            .params
            .mutation_rate
            .unwrap_or(1.0 / width.max(1) as f64);
        match (a, b) {
            (Genome::Binary(x), Genome::Binary(y)) => {
                let mut child = if crossover {
                    one_point_crossover(x, y, rng)
                } else {
                    x.clone()
                };
                for bit in &mut child {
                    if rng.random_bool(rate) {
                        *bit = !*bit;
                    }
                }
                Genome::Binary(child)
            }
            (Genome::Real(x), Genome::Real(y)) => {
                let mut child = if crossover {
                    blend_crossover(x, y, rng)
                } else {
                    x.clone()
                };
                for gene in &mut child {
                    if rng.random_bool(rate) {
                        *gene = (*gene + gaussian_noise(rng, self.params.mutation_sigma)).clamp(0.0, 1.0);
                    }
                }
                Genome::Real(child)
            }
            _ => a.clone(),
        }
    }

    fn evaluate_pending(
        population: &mut [Individual],
        problem: &OptimizationProblem<'_>,
        budget: usize,
    ) -> Result<usize, AlgorithmError> {
        let pending: Vec<&mut Individual> = population
            .iter_mut()
            .filter(|ind| ind.objectives.is_none())
            .take(budget)
            .collect();
        let count = pending.len();
        pending
            .into_par_iter()
            .map(|ind| -> Result<(), AlgorithmError> {
                ind.objectives = Some(problem.evaluate(&ind.genome.to_solution())?);
                Ok(())
            })
            .collect::<Result<(), AlgorithmError>>()?;
        Ok(count)
    }
}

impl SearchAlgorithm for GeneticAlgorithm {
    fn name(&self) -> &'static str {
        "genetic"
    }

    fn encoding(&self) -> Encoding {
        self.params.encoding
    }

    fn run(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<EvaluatedSolution>, AlgorithmError> {
        let p = &self.params;
        let width = problem.width(p.encoding);
        let mut rng = StdRng::seed_from_u64(p.seed);

        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(p.threads)
            .build()
            .map_err(|e| AlgorithmError::ThreadPool(e.to_string()))?;

        if width == 0 {
            let solution = Genome::random(p.encoding, 0, &mut rng).to_solution();
            let objectives = problem.evaluate(&solution)?;
            return Ok(vec![EvaluatedSolution {
                solution,
                objectives,
            }]);
        }

        let mut budget = p.max_evaluations.unwrap_or(usize::MAX);
        let mut population: Vec<Individual> = (0..p.population_size)
            .map(|_| Individual {
                genome: Genome::random(p.encoding, width, &mut rng),
                objectives: None,
            })
            .collect();
        let used = threads.install(|| Self::evaluate_pending(&mut population, problem, budget))?;
        budget -= used;
        population.retain(|ind| ind.objectives.is_some());

        for generation in 0..p.generations {
            if budget == 0 || population.is_empty() {
                break;
            }
            population.sort_by(|a, b| a.score().total_cmp(&b.score()));
            debug!(generation, best = population[0].score(), "genetic generation");

            let mut next: Vec<Individual> = population
                .drain(..p.elitism.min(population.len()))
                .collect();
            let parents = if population.is_empty() { &next[..] } else { &population[..] };
            let mut children = Vec::with_capacity(p.population_size - next.len());
            while next.len() + children.len() < p.population_size {
                let a = &self.tournament(parents, &mut rng).genome;
                let b = &self.tournament(parents, &mut rng).genome;
                children.push(Individual {
                    genome: self.offspring(a, b, width, &mut rng),
                    objectives: None,
                });
            }
            next.extend(children);
            let used = threads.install(|| Self::evaluate_pending(&mut next, problem, budget))?;
            budget -= used;
            next.retain(|ind| ind.objectives.is_some());
            population = next;
        }

        let evaluated = population
            .into_iter()
            .filter_map(|ind| {
                let solution = ind.genome.to_solution();
                ind.objectives.map(|objectives| EvaluatedSolution {
                    solution,
                    objectives,
                })
            })
            .collect();
        Ok(non_dominated(evaluated))
    }
}
