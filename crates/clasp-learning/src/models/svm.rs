//! One-vs-rest soft-margin support vector classifier.
//!
//! Every class present in the training labels gets a binary machine that
//! separates it from all other classes. Machines are trained with sequential
//! minimal optimisation using the maximal violating pair as working set, and
//! stop once the KKT violation falls below [`TOLERANCE`]. A machine that is
//! still violating after the iteration cap is a training failure.
//!
//! Class scores are the machines' decision values. Probabilities are their
//! softmax, so the most probable class is also the highest-scoring one. A
//! class absent from the training labels has no machine and scores negative
//! infinity (probability zero).

use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::error::{LearningError, Result};
use crate::grid::Kernel;

const TOLERANCE: f64 = 1e-3;
const TAU: f64 = 1e-12;
const FAMILY: &str = "support_vector";

/// Kernel with its fitted parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum KernelFn {
    Linear,
    Rbf { gamma: f64 },
}

impl KernelFn {
    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            KernelFn::Linear => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            KernelFn::Rbf { gamma } => {
                let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * dist).exp()
            }
        }
    }
}

/// `1 / (n_features * var(X))` over all feature values, or 1.0 for constant input.
fn scale_gamma(x: &[Vec<f64>]) -> f64 {
    let values: Vec<f64> = x.iter().flatten().copied().collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let n_features = x[0].len() as f64;
    if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinaryMachine {
    support_vectors: Vec<Vec<f64>>,
    /// `alpha_i * y_i` for each support vector.
    dual_coef: Vec<f64>,
    rho: f64,
}

impl BinaryMachine {
    fn decision(&self, kernel: &KernelFn, row: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * kernel.eval(sv, row))
            .sum::<f64>()
            - self.rho
    }
}

/// Iteration cap used when none is configured.
fn default_max_iter(n_samples: usize) -> usize {
    (100 * n_samples).max(100_000)
}

/// Solve the binary dual problem for targets `signs` (+1/-1).
fn train_binary(
    gram: &[Vec<f64>],
    x: &[Vec<f64>],
    signs: &[f64],
    c: f64,
    max_iter: usize,
) -> Result<BinaryMachine> {
    let n = signs.len();
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];
    let q = |i: usize, j: usize| signs[i] * signs[j] * gram[i][j];

    let mut converged = false;
    for _ in 0..max_iter {
        // Maximal violating pair
        let mut i = None;
        let mut g_max = f64::NEG_INFINITY;
        let mut j = None;
        let mut g_min = f64::INFINITY;
        for t in 0..n {
            let v = -signs[t] * grad[t];
            let up = (signs[t] > 0.0 && alpha[t] < c) || (signs[t] < 0.0 && alpha[t] > 0.0);
            let low = (signs[t] > 0.0 && alpha[t] > 0.0) || (signs[t] < 0.0 && alpha[t] < c);
            if up && v > g_max {
                g_max = v;
                i = Some(t);
            }
            if low && v < g_min {
                g_min = v;
                j = Some(t);
            }
        }
        let (Some(i), Some(j)) = (i, j) else {
            converged = true;
            break;
        };
        if g_max - g_min < TOLERANCE {
            converged = true;
            break;
        }

        let (old_i, old_j) = (alpha[i], alpha[j]);
        if signs[i] != signs[j] {
            let mut quad = gram[i][i] + gram[j][j] + 2.0 * q(i, j);
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let mut quad = gram[i][i] + gram[j][j] - 2.0 * q(i, j);
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (delta_i, delta_j) = (alpha[i] - old_i, alpha[j] - old_j);
        for k in 0..n {
            grad[k] += q(i, k) * delta_i + q(j, k) * delta_j;
        }
    }
    if !converged {
        return Err(LearningError::training(
            FAMILY,
            format!("SMO did not converge within {} iterations", max_iter),
        ));
    }

    let rho = compute_rho(&alpha, &grad, signs, c);
    let mut support_vectors = Vec::new();
    let mut dual_coef = Vec::new();
    for t in 0..n {
        if alpha[t] > 0.0 {
            support_vectors.push(x[t].clone());
            dual_coef.push(alpha[t] * signs[t]);
        }
    }

    if support_vectors.is_empty() {
        return Err(LearningError::training(FAMILY, "solver found no support vectors"));
    }
    if !rho.is_finite() || dual_coef.iter().any(|v| !v.is_finite()) {
        return Err(LearningError::training(FAMILY, "solver produced non-finite coefficients"));
    }

    Ok(BinaryMachine {
        support_vectors,
        dual_coef,
        rho,
    })
}

/// Offset from the free multipliers, or the midpoint of the feasible range.
fn compute_rho(alpha: &[f64], grad: &[f64], signs: &[f64], c: f64) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0usize;

    for t in 0..alpha.len() {
        let yg = signs[t] * grad[t];
        let at_upper = alpha[t] >= c;
        let at_lower = alpha[t] <= 0.0;
        if at_upper {
            if signs[t] < 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else if at_lower {
            if signs[t] > 0.0 {
                upper = upper.min(yg);
            } else {
                lower = lower.max(yg);
            }
        } else {
            free_sum += yg;
            free_count += 1;
        }
    }

    if free_count > 0 {
        free_sum / free_count as f64
    } else {
        match (upper.is_finite(), lower.is_finite()) {
            (true, true) => (upper + lower) / 2.0,
            (true, false) => upper,
            (false, true) => lower,
            (false, false) => 0.0,
        }
    }
}

/// One-vs-rest support vector classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportVectorMachine {
    n_features: usize,
    n_classes: usize,
    kernel: KernelFn,
    /// One machine per class code; `None` for classes absent from training.
    machines: Vec<Option<BinaryMachine>>,
}

impl SupportVectorMachine {
    /// Fit one binary machine per present class. Inputs are validated by the caller.
    ///
    /// `max_iter` caps the solver per machine; `None` scales the cap with the
    /// number of rows.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        c: f64,
        kernel: Kernel,
        max_iter: Option<usize>,
    ) -> Result<Self> {
        let max_iter = max_iter.unwrap_or_else(|| default_max_iter(x.len()));
        let kernel = match kernel {
            Kernel::Linear => KernelFn::Linear,
            Kernel::Rbf => KernelFn::Rbf {
                gamma: scale_gamma(x),
            },
        };

        let gram: Vec<Vec<f64>> = x
            .iter()
            .map(|a| x.iter().map(|b| kernel.eval(a, b)).collect())
            .collect();

        let machines = (0..n_classes)
            .map(|class| {
                if !y.contains(&class) {
                    return Ok(None);
                }
                let signs: Vec<f64> = y
                    .iter()
                    .map(|&label| if label == class { 1.0 } else { -1.0 })
                    .collect();
                train_binary(&gram, x, &signs, c, max_iter).map(Some)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            n_features: x[0].len(),
            n_classes,
            kernel,
            machines,
        })
    }

    /// Per-class decision values for one row.
    pub fn decision_function(&self, row: &[f64]) -> Vec<f64> {
        self.machines
            .iter()
            .map(|m| match m {
                Some(machine) => machine.decision(&self.kernel, row),
                None => f64::NEG_INFINITY,
            })
            .collect()
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

impl Classifier for SupportVectorMachine {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        softmax(&self.decision_function(row))
    }
}
