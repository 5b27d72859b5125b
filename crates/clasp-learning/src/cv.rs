//! K-fold cross-validation.
//!
//! Folds are contiguous and unshuffled: the rows reaching the selector were
//! already shuffled by the splitter, and keeping folds positional makes every
//! score reproducible. The first `n % k` folds hold one extra row.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};
use crate::metrics::accuracy;
use crate::models::{Classifier, FittedModel, Hyperparameters};

/// Contiguous k-fold splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    k: usize,
}

impl KFold {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Validation ranges of each fold over `n` rows.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidData`] unless `2 <= k <= n`.
    pub fn folds(&self, n: usize) -> Result<Vec<Range<usize>>> {
        if self.k < 2 {
            return Err(LearningError::InvalidData(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.k
            )));
        }
        if self.k > n {
            return Err(LearningError::InvalidData(format!(
                "cannot make {} folds from {} training samples",
                self.k, n
            )));
        }

        let base = n / self.k;
        let extra = n % self.k;
        let mut start = 0;
        Ok((0..self.k)
            .map(|fold| {
                let len = base + usize::from(fold < extra);
                let range = start..start + len;
                start += len;
                range
            })
            .collect())
    }
}

/// Per-fold scores of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvScores {
    pub fold_scores: Vec<f64>,
}

impl CvScores {
    pub fn mean(&self) -> f64 {
        if self.fold_scores.is_empty() {
            return 0.0;
        }
        self.fold_scores.iter().sum::<f64>() / self.fold_scores.len() as f64
    }

    /// Population standard deviation of the fold scores.
    pub fn std(&self) -> f64 {
        if self.fold_scores.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .fold_scores
            .iter()
            .map(|s| (s - mean).powi(2))
            .sum::<f64>()
            / self.fold_scores.len() as f64;
        var.sqrt()
    }
}

/// Fit on `k - 1` folds and score accuracy on the held-out fold, for every fold.
///
/// # Errors
///
/// Returns [`LearningError::InvalidData`] for an invalid fold count and
/// propagates [`LearningError::Training`] from any fold's fit.
pub fn cross_val_score(
    params: &Hyperparameters,
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
    kfold: KFold,
    seed: u64,
) -> Result<CvScores> {
    let folds = kfold.folds(x.len())?;
    let mut fold_scores = Vec::with_capacity(folds.len());

    for held_out in folds {
        let mut train_x = Vec::with_capacity(x.len() - held_out.len());
        let mut train_y = Vec::with_capacity(x.len() - held_out.len());
        for i in (0..x.len()).filter(|i| !held_out.contains(i)) {
            train_x.push(x[i].clone());
            train_y.push(y[i]);
        }

        let model = FittedModel::fit(params, &train_x, &train_y, n_classes, seed)?;
        let predicted = model.predict(&x[held_out.clone()]);
        fold_scores.push(accuracy(&y[held_out], &predicted));
    }

    Ok(CvScores { fold_scores })
}
