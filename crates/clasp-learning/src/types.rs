//! Report and metadata types returned by the pipeline and the inference service.
//!
//! # Overview
//!
//! - [`TrainingReport`]: Summary of a [`Pipeline::train()`](crate::Pipeline::train) run
//! - [`SplitSizes`]: Record counts of the three subsets
//! - [`SelectionSummary`]: The selector's decision without the fitted model
//! - [`ModelInfo`]: Metadata about a bundle
//! - [`PredictionResult`]: Result of one prediction
//!
//! # Example
//!
//! ```ignore
//! let run = pipeline.train(&dataset)?;
//!
//! println!("Selected: {}", run.report.selection.family);
//! println!("Test accuracy: {:.3}", run.report.test_metrics.accuracy);
//! println!("{}", serde_json::to_string_pretty(&run.report)?);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::ClassificationMetrics;
use crate::models::ModelFamily;
use crate::selection::{CandidateFailure, FamilyResult, SelectionOutcome};

/// Summary of a training pipeline run.
///
/// Serializable so the CLI can print it as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TrainingReport {
    /// Sizes of the train, validation and test subsets.
    pub split: SplitSizes,

    /// Feature names in schema order.
    pub feature_names: Vec<String>,

    /// Label values in code order.
    pub classes: Vec<String>,

    /// What the selector decided and why.
    pub selection: SelectionSummary,

    /// Metrics of the selected model on the validation subset.
    pub validation_metrics: ClassificationMetrics,

    /// Metrics of the selected model on the held-out test subset.
    ///
    /// Computed after selection; test labels play no part in any decision.
    pub test_metrics: ClassificationMetrics,

    /// Fingerprint of the bundle, as 8 hex digits.
    pub fingerprint: String,

    /// Wall-clock time of the whole run in seconds.
    pub training_time_seconds: f64,
}

/// Record counts of one split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl From<(usize, usize, usize)> for SplitSizes {
    fn from((train, validation, test): (usize, usize, usize)) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }
}

/// The selector's decision, without the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SelectionSummary {
    /// Winning model family.
    pub family: ModelFamily,

    /// Winning hyperparameters keyed by name.
    pub hyperparameters: serde_json::Map<String, serde_json::Value>,

    /// Mean cross-validated accuracy of the winner.
    pub cv_score: f64,

    /// Accuracy of the winner on the validation subset.
    pub validation_score: f64,

    /// Best candidate and every candidate score, per family.
    pub family_results: Vec<FamilyResult>,

    /// Candidates that failed to fit.
    pub failures: Vec<CandidateFailure>,
}

impl From<&SelectionOutcome> for SelectionSummary {
    fn from(outcome: &SelectionOutcome) -> Self {
        Self {
            family: outcome.selected.family,
            hyperparameters: outcome.selected.hyperparameter_map(),
            cv_score: outcome.selected.cv_score,
            validation_score: outcome.selected.validation_score,
            family_results: outcome.family_results.clone(),
            failures: outcome.failures.clone(),
        }
    }
}

/// Information about a model bundle.
///
/// Returned by [`ModelBundle::info()`](crate::ModelBundle::info) and
/// [`InferenceService::model_info()`](crate::InferenceService::model_info).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ModelInfo {
    /// Model family of the selected model.
    pub family: ModelFamily,

    /// Hyperparameters of the selected model.
    pub hyperparameters: serde_json::Map<String, serde_json::Value>,

    /// Names of the feature columns in the order expected by the model.
    ///
    /// Named requests must carry exactly these keys; ordered requests must
    /// list values in this order.
    pub feature_names: Vec<String>,

    /// Label values in code order.
    pub classes: Vec<String>,

    /// Cross-validated accuracy that won the selection.
    pub cv_score: f64,

    /// Accuracy on the validation subset.
    pub validation_score: f64,

    /// Preprocessing fingerprint, as 8 hex digits.
    pub fingerprint: String,

    /// When the bundle was built.
    pub created_at: DateTime<Utc>,

    /// Encoding version of the bundle.
    pub format_version: u32,
}

/// Result of a single prediction.
///
/// Serialized with camelCase keys to match the request boundary.
///
/// # Example
///
/// ```ignore
/// let result = service.predict(&RawRecord::Ordered(vec![5.1, 3.5, 1.4, 0.2]))?;
///
/// println!("Predicted: {} ({:.0}%)", result.predicted_label, result.confidence * 100.0);
/// for (label, p) in &result.probabilities {
///     println!("  {}: {:.3}", label, p);
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct PredictionResult {
    /// Raw feature values in schema order, before scaling.
    pub input: Vec<f64>,

    /// Decoded label of the most probable class.
    pub predicted_label: String,

    /// Probability of every class, keyed by label.
    pub probabilities: BTreeMap<String, f64>,

    /// Probability of the predicted class.
    pub confidence: f64,
}
