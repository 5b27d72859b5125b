//! Model families.
//!
//! Two families are available: an ensemble of decision trees
//! ([`RandomForest`]) and a one-vs-rest kernel support vector classifier
//! ([`SupportVectorMachine`]). Both implement [`Classifier`] over scaled
//! feature rows and integer class codes, and both serialize, so a fitted
//! model can be persisted inside a bundle as a [`FittedModel`].
//!
//! Fitting is deterministic: the forest derives every random choice from the
//! seed, and the SVM solver has no random component.

mod forest;
mod svm;

pub use forest::RandomForest;
pub use svm::SupportVectorMachine;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};
use crate::grid::Kernel;

/// A model family searched by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Bootstrap-aggregated decision trees.
    RandomForest,
    /// Soft-margin kernel support vector classifier.
    SupportVector,
}

impl ModelFamily {
    /// Returns the string representation used in reports and bundles.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::SupportVector => "support_vector",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = LearningError;

    /// Accepts the canonical name or the short aliases `rf` and `svm`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random_forest" | "rf" => Ok(ModelFamily::RandomForest),
            "support_vector" | "svm" | "svc" => Ok(ModelFamily::SupportVector),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown model family '{}'. Valid values are: random_forest (rf), support_vector (svm)",
                other
            ))),
        }
    }
}

/// One point of a family's hyperparameter grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Hyperparameters {
    RandomForest {
        n_estimators: usize,
        max_depth: Option<usize>,
    },
    SupportVector {
        c: f64,
        kernel: Kernel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_iter: Option<usize>,
    },
}

impl Hyperparameters {
    pub fn family(&self) -> ModelFamily {
        match self {
            Hyperparameters::RandomForest { .. } => ModelFamily::RandomForest,
            Hyperparameters::SupportVector { .. } => ModelFamily::SupportVector,
        }
    }

    /// Hyperparameter values keyed by name, without the family tag.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        match self {
            Hyperparameters::RandomForest {
                n_estimators,
                max_depth,
            } => {
                map.insert("n_estimators".into(), (*n_estimators).into());
                map.insert("max_depth".into(), (*max_depth).into());
            }
            Hyperparameters::SupportVector { c, kernel, max_iter } => {
                map.insert("c".into(), (*c).into());
                map.insert("kernel".into(), kernel.as_str().into());
                if let Some(max_iter) = max_iter {
                    map.insert("max_iter".into(), (*max_iter).into());
                }
            }
        }
        map
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hyperparameters::RandomForest {
                n_estimators,
                max_depth,
            } => match max_depth {
                Some(depth) => write!(f, "n_estimators={}, max_depth={}", n_estimators, depth),
                None => write!(f, "n_estimators={}, max_depth=None", n_estimators),
            },
            Hyperparameters::SupportVector {
                c,
                kernel,
                max_iter,
            } => match max_iter {
                Some(cap) => write!(f, "c={}, kernel={}, max_iter={}", c, kernel, cap),
                None => write!(f, "c={}, kernel={}", c, kernel),
            },
        }
    }
}

/// A fitted classifier over scaled features and class codes `0..n_classes`.
pub trait Classifier {
    /// Width of the feature rows the model was trained on.
    fn n_features(&self) -> usize;

    /// Number of class codes the model scores.
    fn n_classes(&self) -> usize;

    /// Class probabilities for one row, indexed by class code.
    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64>;

    /// Most probable class code; the lowest code wins ties.
    fn predict_row(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba_row(row))
    }

    fn predict(&self, x: &[Vec<f64>]) -> Vec<usize> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Index of the largest value; the first index wins ties.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// A fitted model of either family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FittedModel {
    RandomForest(RandomForest),
    SupportVector(SupportVectorMachine),
}

impl FittedModel {
    /// Fit a model for the given hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::Training`] when the training data cannot be
    /// fitted: no rows, ragged or non-finite features, codes outside
    /// `0..n_classes`, fewer than two distinct classes, or a numerical
    /// failure inside the solver.
    pub fn fit(
        params: &Hyperparameters,
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        seed: u64,
    ) -> Result<Self> {
        let family = params.family();
        check_training_data(family, x, y, n_classes)?;

        match *params {
            Hyperparameters::RandomForest {
                n_estimators,
                max_depth,
            } => RandomForest::fit(x, y, n_classes, n_estimators, max_depth, seed)
                .map(FittedModel::RandomForest),
            Hyperparameters::SupportVector {
                c,
                kernel,
                max_iter,
            } => SupportVectorMachine::fit(x, y, n_classes, c, kernel, max_iter)
                .map(FittedModel::SupportVector),
        }
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            FittedModel::RandomForest(_) => ModelFamily::RandomForest,
            FittedModel::SupportVector(_) => ModelFamily::SupportVector,
        }
    }
}

impl Classifier for FittedModel {
    fn n_features(&self) -> usize {
        match self {
            FittedModel::RandomForest(m) => m.n_features(),
            FittedModel::SupportVector(m) => m.n_features(),
        }
    }

    fn n_classes(&self) -> usize {
        match self {
            FittedModel::RandomForest(m) => m.n_classes(),
            FittedModel::SupportVector(m) => m.n_classes(),
        }
    }

    fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        match self {
            FittedModel::RandomForest(m) => m.predict_proba_row(row),
            FittedModel::SupportVector(m) => m.predict_proba_row(row),
        }
    }

    fn predict_row(&self, row: &[f64]) -> usize {
        match self {
            FittedModel::RandomForest(m) => m.predict_row(row),
            FittedModel::SupportVector(m) => m.predict_row(row),
        }
    }
}

fn check_training_data(
    family: ModelFamily,
    x: &[Vec<f64>],
    y: &[usize],
    n_classes: usize,
) -> Result<()> {
    let fail = |reason: String| Err(LearningError::training(family.as_str(), reason));

    if x.is_empty() {
        return fail("no training samples".to_string());
    }
    if x.len() != y.len() {
        return fail(format!("{} feature rows but {} labels", x.len(), y.len()));
    }
    let width = x[0].len();
    if width == 0 {
        return fail("training rows have no features".to_string());
    }
    if x.iter().any(|row| row.len() != width) {
        return fail("training rows have different widths".to_string());
    }
    if x.iter().flatten().any(|v| !v.is_finite()) {
        return fail("training features contain non-finite values".to_string());
    }
    if let Some(&code) = y.iter().find(|&&c| c >= n_classes) {
        return fail(format!("label code {} outside 0..{}", code, n_classes));
    }
    let first = y[0];
    if y.iter().all(|&c| c == first) {
        return fail("training labels contain a single class".to_string());
    }
    Ok(())
}
