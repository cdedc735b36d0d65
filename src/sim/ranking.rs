//! Normalization and ranking of a non-dominated solution set.
//!
//! All objectives are minimized. Strategies receive objectives normalized
//! to `[0, 1]` per objective, where `0` is the best value in the set.

use serde::Deserialize;

/// Min-max normalizes every objective over the set.
///
/// An objective with the same value everywhere normalizes to `0.0`.
pub fn normalize(objectives: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = objectives.iter().map(Vec::len).max().unwrap_or(0);
    let mut min = vec![f64::INFINITY; dims];
    let mut max = vec![f64::NEG_INFINITY; dims];
    for row in objectives {
        for (i, &v) in row.iter().enumerate() {
            min[i] = min[i].min(v);
            max[i] = max[i].max(v);
        }
    }
    objectives
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, &v)| {
                    let range = max[i] - min[i];
                    if range > 0.0 { (v - min[i]) / range } else { 0.0 }
                })
                .collect()
        })
        .collect()
}

/// Orders normalized solutions best-first.
pub trait SolutionRanking: Send + Sync {
    /// Strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Indices into `normalized`, best first.
    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize>;
}

fn rank_by_score(normalized: &[Vec<f64>], score: impl Fn(&[f64]) -> f64) -> Vec<usize> {
    let scores: Vec<f64> = normalized.iter().map(|row| score(row)).collect();
    let mut order: Vec<usize> = (0..normalized.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]).then(a.cmp(&b)));
    order
}

fn weight(weights: &[f64], i: usize) -> f64 {
    weights.get(i).copied().unwrap_or(1.0)
}

/// Non-domination level first, then the sum of normalized objectives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dominance;

impl SolutionRanking for Dominance {
    fn name(&self) -> &'static str {
        "dominance"
    }

    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize> {
        let dominates = |a: &[f64], b: &[f64]| {
            a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
        };
        let mut level = vec![usize::MAX; normalized.len()];
        let mut current = 0;
        while level.contains(&usize::MAX) {
            let remaining: Vec<usize> = (0..normalized.len()).filter(|&i| level[i] == usize::MAX).collect();
            for &i in &remaining {
                if !remaining
                    .iter()
                    .any(|&j| dominates(&normalized[j], &normalized[i]))
                {
                    level[i] = current;
                }
            }
            current += 1;
        }
        let sums: Vec<f64> = normalized.iter().map(|r| r.iter().sum()).collect();
        let mut order: Vec<usize> = (0..normalized.len()).collect();
        order.sort_by(|&a, &b| {
            level[a]
                .cmp(&level[b])
                .then(sums[a].total_cmp(&sums[b]))
                .then(a.cmp(&b))
        });
        order
    }
}

/// Orders by one objective.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleObjective {
    pub index: usize,
}

impl SolutionRanking for SingleObjective {
    fn name(&self) -> &'static str {
        "single-objective"
    }

    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize> {
        rank_by_score(normalized, |row| row.get(self.index).copied().unwrap_or(f64::INFINITY))
    }
}

/// Orders by the weighted sum of objectives. Missing weights count as `1`.
#[derive(Debug, Clone, Default)]
pub struct WeightedSum {
    pub weights: Vec<f64>,
}

impl SolutionRanking for WeightedSum {
    fn name(&self) -> &'static str {
        "weighted-sum"
    }

    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize> {
        rank_by_score(normalized, |row| {
            row.iter()
                .enumerate()
                .map(|(i, v)| weight(&self.weights, i) * v)
                .sum()
        })
    }
}

/// Orders by the weighted Chebyshev distance to the ideal point.
#[derive(Debug, Clone, Default)]
pub struct Chebyshev {
    pub weights: Vec<f64>,
}

impl SolutionRanking for Chebyshev {
    fn name(&self) -> &'static str {
        "chebyshev"
    }

    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize> {
        rank_by_score(normalized, |row| {
            row.iter()
                .enumerate()
                .map(|(i, v)| weight(&self.weights, i) * v)
                .fold(0.0, f64::max)
        })
    }
}

/// Nash bargaining: maximizes the product of every objective's gain over the
/// nadir point of the set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NashBargaining;

impl SolutionRanking for NashBargaining {
    fn name(&self) -> &'static str {
        "nash-bargaining"
    }

    fn rank(&self, normalized: &[Vec<f64>]) -> Vec<usize> {
        // nadir is 1.0 in every objective after normalization
        rank_by_score(normalized, |row| {
            -row.iter().map(|v| 1.0 - v).product::<f64>()
        })
    }
}

/// Ranking strategy as configured.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RankingConfig {
    Dominance,
    SingleObjective {
        #[serde(default)]
        index: usize,
    },
    WeightedSum {
        weights: Vec<f64>,
    },
    Chebyshev {
        weights: Vec<f64>,
    },
    NashBargaining,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig::SingleObjective { index: 0 }
    }
}

impl RankingConfig {
    /// Builds the configured strategy.
    pub fn build(&self) -> Box<dyn SolutionRanking> {
        match self {
            RankingConfig::Dominance => Box::new(Dominance),
            RankingConfig::SingleObjective { index } => Box::new(SingleObjective { index: *index }),
            RankingConfig::WeightedSum { weights } => Box::new(WeightedSum {
                weights: weights.clone(),
            }),
            RankingConfig::Chebyshev { weights } => Box::new(Chebyshev {
                weights: weights.clone(),
            }),
            RankingConfig::NashBargaining => Box::new(NashBargaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front() -> Vec<Vec<f64>> {
        // trade-off between cost and discomfort
        vec![
            vec![10.0, 0.0],
            vec![6.0, 3.0],
            vec![4.0, 8.0],
            vec![0.0, 10.0],
        ]
    }

    #[test]
    fn normalize_maps_to_unit_range() {
        let n = normalize(&front());
        assert_eq!(n[0], vec![1.0, 0.0]);
        assert_eq!(n[3], vec![0.0, 1.0]);
        assert!((n[1][0] - 0.6).abs() < 1e-12);
        assert_eq!(normalize(&[vec![5.0], vec![5.0]]), vec![vec![0.0], vec![0.0]]);
    }

    #[test]
    fn single_objective_orders_by_index() {
        let n = normalize(&front());
        assert_eq!(SingleObjective { index: 0 }.rank(&n), vec![3, 2, 1, 0]);
        assert_eq!(SingleObjective { index: 1 }.rank(&n), vec![0, 1, 2, 3]);
    }

    #[test]
    fn weighted_sum_and_chebyshev_prefer_balanced_solution() {
        let n = normalize(&front());
        assert_eq!(WeightedSum { weights: vec![] }.rank(&n)[0], 1);
        assert_eq!(Chebyshev { weights: vec![1.0, 1.0] }.rank(&n)[0], 1);
    }

    #[test]
    fn nash_bargaining_maximizes_product_of_gains() {
        let n = normalize(&front());
        // gains: (0,1) (0.4,0.7) (0.6,0.2) (1,0)
        assert_eq!(NashBargaining.rank(&n)[0], 1);
    }

    #[test]
    fn dominance_puts_dominated_solutions_last() {
        let n = normalize(&[vec![1.0, 1.0], vec![2.0, 2.0], vec![0.0, 3.0]]);
        let order = Dominance.rank(&n);
        assert_eq!(*order.last().unwrap_or(&usize::MAX), 1);
    }

    #[test]
    fn config_builds_strategy() {
        let cfg: RankingConfig = toml::from_str("strategy = \"weighted_sum\"\nweights = [1.0, 2.0]").unwrap();
        assert_eq!(cfg.build().name(), "weighted-sum");
        assert_eq!(RankingConfig::default().build().name(), "single-objective");
    }
}
