//! Random forest of CART trees.
//!
//! Each tree is grown on a bootstrap sample with Gini impurity, considering
//! `floor(sqrt(n_features))` randomly chosen features per split (at least
//! one). A node is split while it holds at least two samples, is impure, and
//! is above `max_depth`. If none of the sampled features separates the node,
//! the remaining features are tried before giving up and emitting a leaf.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::error::Result;

const MIN_SAMPLES_SPLIT: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single decision tree stored as a node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn leaf_distribution(&self, row: &[f64]) -> &[f64] {
        let mut at = 0;
        loop {
            match &self.nodes[at] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    max_depth: Option<usize>,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.y[i]] += 1;
        }
        counts
    }

    fn leaf(&mut self, counts: &[usize]) -> usize {
        let total: usize = counts.iter().sum();
        let distribution = counts
            .iter()
            .map(|&c| c as f64 / total.max(1) as f64)
            .collect();
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    /// Best threshold on one feature by weighted Gini impurity.
    fn best_threshold(&self, samples: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut order: Vec<usize> = samples.to_vec();
        order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

        let n = order.len();
        let mut left = vec![0usize; self.n_classes];
        let mut right = self.class_counts(&order);
        let mut best: Option<SplitCandidate> = None;

        for split_at in 1..n {
            let moved = order[split_at - 1];
            left[self.y[moved]] += 1;
            right[self.y[moved]] -= 1;

            let lo = self.x[moved][feature];
            let hi = self.x[order[split_at]][feature];
            if lo == hi {
                continue;
            }

            let impurity = (split_at as f64 * gini(&left, split_at)
                + (n - split_at) as f64 * gini(&right, n - split_at))
                / n as f64;
            if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
        best
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<SplitCandidate> {
        let n_features = self.x[0].len();
        let sampled = index::sample(&mut self.rng, n_features, self.max_features).into_vec();

        let pick = |builder: &Self, features: &[usize]| {
            let mut best: Option<SplitCandidate> = None;
            for &feature in features {
                if let Some(candidate) = builder.best_threshold(samples, feature)
                    && best.as_ref().is_none_or(|b| candidate.impurity < b.impurity)
                {
                    best = Some(candidate);
                }
            }
            best
        };

        if let Some(found) = pick(&*self, &sampled) {
            return Some(found);
        }
        let remaining: Vec<usize> = (0..n_features).filter(|f| !sampled.contains(f)).collect();
        pick(&*self, &remaining)
    }

    fn grow(&mut self, samples: &[usize], depth: usize) -> usize {
        let counts = self.class_counts(samples);
        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);

        if pure || depth_reached || samples.len() < MIN_SAMPLES_SPLIT {
            return self.leaf(&counts);
        }

        let Some(split) = self.best_split(samples) else {
            return self.leaf(&counts);
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[i][split.feature] <= split.threshold);

        // Reserve the split slot so children get later indices
        let at = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: Vec::new(),
        });
        let left = self.grow(&left_samples, depth + 1);
        let right = self.grow(&right_samples, depth + 1);
        self.nodes[at] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        at
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| (c as f64 / total).powi(2))
        .sum::<f64>()
}

/// Bootstrap-aggregated decision trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit `n_estimators` trees. Inputs are validated by the caller.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        n_estimators: usize,
        max_depth: Option<usize>,
        seed: u64,
    ) -> Result<Self> {
        let n = x.len();
        let n_features = x[0].len();
        let max_features = ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features);
        let mut master = StdRng::seed_from_u64(seed);

        let trees = (0..n_estimators)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(master.next_u64());
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    max_features,
                    max_depth,
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(&bootstrap, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Ok(Self {
            n_features,
            n_classes,
            trees,
        })
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, d) in proba.iter_mut().zip(tree.leaf_distribution(row)) {
                *p += d;
            }
        }
        let n = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        proba
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::blobs;

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5, 0], 5), 0.0);
        assert_eq!(gini(&[2, 2], 4), 0.5);
        assert_eq!(gini(&[0, 0], 0), 0.0);
    }

    #[test]
    fn test_fits_separable_data() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, 3, 10, None, 42).unwrap();
        assert_eq!(forest.n_estimators(), 10);
        assert_eq!(forest.predict(&x), y);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, 3, 7, Some(2), 1).unwrap();
        for row in &x {
            let proba = forest.predict_proba_row(row);
            assert_eq!(proba.len(), 3);
            assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs();
        let a = RandomForest::fit(&x, &y, 3, 5, None, 9).unwrap();
        let b = RandomForest::fit(&x, &y, 3, 5, None, 9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_depth_one_makes_stumps() {
        let (x, y) = blobs();
        let forest = RandomForest::fit(&x, &y, 3, 3, Some(1), 0).unwrap();
        for tree in &forest.trees {
            assert!(tree.nodes.len() <= 3);
        }
    }

    #[test]
    fn test_absent_class_gets_zero_probability() {
        // class 2 exists in the encoder but not in this training portion
        let x = vec![vec![0.0], vec![0.1], vec![1.0], vec![1.1]];
        let y = vec![0, 0, 1, 1];
        let forest = RandomForest::fit(&x, &y, 3, 4, None, 3).unwrap();
        let proba = forest.predict_proba_row(&[0.05]);
        assert_eq!(proba[2], 0.0);
    }
}
