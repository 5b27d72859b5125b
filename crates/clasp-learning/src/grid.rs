//! Hyperparameter grids.
//!
//! Each family has a grid of candidate values per hyperparameter. Candidates
//! are enumerated with the hyperparameter names in alphabetical order and the
//! last name varying fastest, so the enumeration order (and with it the
//! within-family tie-break) is fixed for a given grid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LearningError;
use crate::models::{Hyperparameters, ModelFamily};

/// Kernel function of the support vector classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// Plain dot product.
    Linear,
    /// Gaussian radial basis function.
    Rbf,
}

impl Kernel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Kernel::Linear => "linear",
            Kernel::Rbf => "rbf",
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kernel {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Kernel::Linear),
            "rbf" => Ok(Kernel::Rbf),
            other => Err(LearningError::InvalidConfig(format!(
                "unknown kernel '{}'. Valid values are: linear, rbf",
                other
            ))),
        }
    }
}

/// Grid for the random forest family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestGrid {
    /// Number of trees.
    pub n_estimators: Vec<usize>,
    /// Maximum tree depth; `None` grows trees until leaves are pure.
    pub max_depth: Vec<Option<usize>>,
}

impl Default for ForestGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![10, 50, 100],
            max_depth: vec![None, Some(10), Some(20)],
        }
    }
}

impl ForestGrid {
    pub fn len(&self) -> usize {
        self.n_estimators.len() * self.max_depth.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn validate(&self) -> Result<(), LearningError> {
        if self.n_estimators.is_empty() {
            return Err(LearningError::InvalidConfig(
                "forest_grid.n_estimators must not be empty".to_string(),
            ));
        }
        if self.max_depth.is_empty() {
            return Err(LearningError::InvalidConfig(
                "forest_grid.max_depth must not be empty".to_string(),
            ));
        }
        if self.n_estimators.contains(&0) {
            return Err(LearningError::InvalidConfig(
                "forest_grid.n_estimators values must be at least 1".to_string(),
            ));
        }
        if self.max_depth.contains(&Some(0)) {
            return Err(LearningError::InvalidConfig(
                "forest_grid.max_depth values must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidates in enumeration order (`max_depth` outer, `n_estimators` inner).
    pub fn candidates(&self) -> Vec<Hyperparameters> {
        self.max_depth
            .iter()
            .flat_map(|&max_depth| {
                self.n_estimators
                    .iter()
                    .map(move |&n_estimators| Hyperparameters::RandomForest {
                        n_estimators,
                        max_depth,
                    })
            })
            .collect()
    }
}

/// Grid for the support vector family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmGrid {
    /// Soft-margin penalty.
    pub c: Vec<f64>,
    /// Kernel functions.
    pub kernel: Vec<Kernel>,
    /// Solver iteration cap applied to every candidate. `None` scales the
    /// cap with the number of training rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<usize>,
}

impl Default for SvmGrid {
    fn default() -> Self {
        Self {
            c: vec![0.1, 1.0, 10.0],
            kernel: vec![Kernel::Linear, Kernel::Rbf],
            max_iter: None,
        }
    }
}

impl SvmGrid {
    pub fn len(&self) -> usize {
        self.c.len() * self.kernel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn validate(&self) -> Result<(), LearningError> {
        if self.c.is_empty() {
            return Err(LearningError::InvalidConfig(
                "svm_grid.c must not be empty".to_string(),
            ));
        }
        if self.kernel.is_empty() {
            return Err(LearningError::InvalidConfig(
                "svm_grid.kernel must not be empty".to_string(),
            ));
        }
        if self.c.iter().any(|c| !(c.is_finite() && *c > 0.0)) {
            return Err(LearningError::InvalidConfig(
                "svm_grid.c values must be positive and finite".to_string(),
            ));
        }
        if self.max_iter == Some(0) {
            return Err(LearningError::InvalidConfig(
                "svm_grid.max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidates in enumeration order (`c` outer, `kernel` inner).
    pub fn candidates(&self) -> Vec<Hyperparameters> {
        self.c
            .iter()
            .flat_map(|&c| {
                self.kernel.iter().map(move |&kernel| Hyperparameters::SupportVector {
                    c,
                    kernel,
                    max_iter: self.max_iter,
                })
            })
            .collect()
    }
}

/// Candidates of one family under the given grids.
pub fn family_candidates(
    family: ModelFamily,
    forest: &ForestGrid,
    svm: &SvmGrid,
) -> Vec<Hyperparameters> {
    match family {
        ModelFamily::RandomForest => forest.candidates(),
        ModelFamily::SupportVector => svm.candidates(),
    }
}
