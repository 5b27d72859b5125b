//! Configuration types for the training pipeline.
//!
//! This module provides [`PipelineConfig`] and its builder. The defaults
//! reproduce the reference setup: a 70/15/15 split with seed 42, 3-fold
//! cross-validation, and a random forest and a support vector machine
//! searched over small grids.
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_learning::{ModelFamily, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .label_column("species")
//!     .cv_folds(5)
//!     .families(vec![ModelFamily::SupportVector])
//!     .build()?;
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::LearningError;
use crate::grid::{ForestGrid, SvmGrid};
use crate::models::ModelFamily;

/// Configuration for the training pipeline.
///
/// Use [`PipelineConfig::builder()`] to construct a validated configuration.
///
/// # Validation
///
/// The builder validates the following constraints on [`build()`](PipelineConfigBuilder::build):
/// - `train_fraction` must be in range `(0.0, 1.0)` (exclusive)
/// - `cv_folds` must be at least 2
/// - `families` must be non-empty and list each family once
/// - the grid of every selected family must be non-empty with positive values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fraction of records used for training (default: 0.7).
    ///
    /// The remainder is halved between validation and test.
    pub train_fraction: f64,

    /// Random seed for the split and for model training (default: 42).
    pub random_seed: u64,

    /// Number of cross-validation folds (default: 3).
    pub cv_folds: usize,

    /// Name of the label column in the input CSV.
    ///
    /// If `None`, the last column is used.
    pub label_column: Option<String>,

    /// Model families to search, in tie-break preference order.
    ///
    /// When two families reach the same best score, the one listed first wins.
    pub families: Vec<ModelFamily>,

    /// Hyperparameter grid for [`ModelFamily::RandomForest`].
    pub forest_grid: ForestGrid,

    /// Hyperparameter grid for [`ModelFamily::SupportVector`].
    pub svm_grid: SvmGrid,

    /// Evaluate candidates on the rayon thread pool (default: true).
    ///
    /// Results are identical either way; only wall-clock time changes.
    pub parallel: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            train_fraction: clasp_processing::DEFAULT_TRAIN_FRACTION,
            random_seed: 42,
            cv_folds: 3,
            label_column: None,
            families: vec![ModelFamily::RandomForest, ModelFamily::SupportVector],
            forest_grid: ForestGrid::default(),
            svm_grid: SvmGrid::default(),
            parallel: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Total number of hyperparameter combinations across selected families.
    pub fn candidate_count(&self) -> usize {
        self.families
            .iter()
            .map(|family| match family {
                ModelFamily::RandomForest => self.forest_grid.len(),
                ModelFamily::SupportVector => self.svm_grid.len(),
            })
            .sum()
    }
}

/// Builder for [`PipelineConfig`].
///
/// Created via [`PipelineConfig::builder()`]. All setters return `self` to allow
/// method chaining.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the train fraction (default: 0.7).
    #[must_use]
    pub fn train_fraction(mut self, fraction: f64) -> Self {
        self.config.train_fraction = fraction;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Set the number of cross-validation folds (default: 3).
    #[must_use]
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    /// Set the label column name.
    #[must_use]
    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.config.label_column = Some(column.into());
        self
    }

    /// Set the model families to search, in preference order.
    #[must_use]
    pub fn families(mut self, families: Vec<ModelFamily>) -> Self {
        self.config.families = families;
        self
    }

    /// Set the random forest grid.
    #[must_use]
    pub fn forest_grid(mut self, grid: ForestGrid) -> Self {
        self.config.forest_grid = grid;
        self
    }

    /// Set the support vector grid.
    #[must_use]
    pub fn svm_grid(mut self, grid: SvmGrid) -> Self {
        self.config.svm_grid = grid;
        self
    }

    /// Enable or disable parallel candidate evaluation (default: true).
    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] naming the first invalid setting.
    pub fn build(self) -> Result<PipelineConfig, LearningError> {
        let config = self.config;

        if !(config.train_fraction > 0.0 && config.train_fraction < 1.0) {
            return Err(LearningError::InvalidConfig(
                "train_fraction must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if config.cv_folds < 2 {
            return Err(LearningError::InvalidConfig(
                "cv_folds must be at least 2".to_string(),
            ));
        }

        if config.families.is_empty() {
            return Err(LearningError::InvalidConfig(
                "families must list at least one model family".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for family in &config.families {
            if !seen.insert(*family) {
                return Err(LearningError::InvalidConfig(format!(
                    "families lists {} more than once",
                    family
                )));
            }
        }

        for family in &config.families {
            match family {
                ModelFamily::RandomForest => config.forest_grid.validate()?,
                ModelFamily::SupportVector => config.svm_grid.validate()?,
            }
        }

        Ok(config)
    }
}
