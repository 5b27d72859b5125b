//! Progress reporting for the training pipeline.
//!
//! The pipeline sends a [`ProgressUpdate`] at every stage boundary and after
//! each evaluated candidate during model selection.
//!
//! # Example
//!
//! ```
//! use clasp_learning::{Pipeline, PipelineConfig, ProgressUpdate};
//!
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::default())
//!     .on_progress(|update: ProgressUpdate| {
//!         println!(
//!             "[{}] {:.0}% - {}",
//!             update.stage,
//!             update.progress * 100.0,
//!             update.message
//!         );
//!         if let Some((done, total)) = update.candidates_completed {
//!             println!("  Candidates: {}/{}", done, total);
//!         }
//!     })
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The current stage of the training pipeline.
///
/// Stages run in declaration order. A run ends in
/// [`Complete`](Self::Complete) or [`Failed`](Self::Failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TrainingStage {
    /// Validating configuration and input.
    #[default]
    Initializing,

    /// Partitioning records into train, validation and test.
    Splitting,

    /// Fitting the scaler and label encoder on the train subset.
    Preprocessing,

    /// Grid search with cross-validation over the configured families.
    ModelSelection,

    /// Scoring the selected model on validation and held-out test records.
    Evaluation,

    /// Training finished and a bundle is available.
    Complete,

    /// Training stopped at a stage error. No bundle was produced.
    Failed,
}

impl TrainingStage {
    /// Returns the snake_case name used in logs and reports.
    ///
    /// # Examples
    ///
    /// ```
    /// use clasp_learning::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::ModelSelection.as_str(), "model_selection");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Initializing => "initializing",
            TrainingStage::Splitting => "splitting",
            TrainingStage::Preprocessing => "preprocessing",
            TrainingStage::ModelSelection => "model_selection",
            TrainingStage::Evaluation => "evaluation",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
        }
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress update from the training pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    /// The current training stage.
    pub stage: TrainingStage,

    /// Overall progress from 0.0 to 1.0.
    pub progress: f64,

    /// Human-readable status message.
    pub message: String,

    /// `(completed, total)` candidates, during
    /// [`ModelSelection`](TrainingStage::ModelSelection) only.
    pub candidates_completed: Option<(usize, usize)>,
}

impl ProgressUpdate {
    pub(crate) fn stage(stage: TrainingStage, progress: f64, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress,
            message: message.into(),
            candidates_completed: None,
        }
    }
}

/// Type alias for a progress callback function.
///
/// Callbacks must be `Send + Sync`: during parallel model selection they are
/// called from rayon worker threads.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use clasp_learning::{ProgressCallback, ProgressUpdate};
///
/// let callback: ProgressCallback = Arc::new(|update: ProgressUpdate| {
///     println!("[{}] {} - {}", update.stage, update.progress, update.message);
/// });
/// ```
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;
