//! Training pipeline implementation.
//!
//! This module provides the [`Pipeline`] struct and its builder. A run
//! executes these stages in order:
//!
//! 1. **Splitting** - Seeded train/validation/test split, test labels held out
//! 2. **Preprocessing** - Fit scaler and label encoder on train, transform train and validation
//! 3. **Model Selection** - Grid search with k-fold cross-validation per family
//! 4. **Evaluation** - Metrics on validation, then on the held-out test subset
//!
//! Any stage error ends the run with [`TrainingStage::Failed`] and no bundle.
//! A successful run returns a [`TrainingRun`] whose bundle is persisted with a
//! separate, explicit [`ArtifactStore::save()`](crate::ArtifactStore::save).
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_learning::{ArtifactStore, FileArtifactStore, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .label_column("target")
//!     .build()?;
//!
//! let pipeline = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{}] {:.0}% - {}", update.stage, update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let run = pipeline.train_csv("data/iris.csv")?;
//! println!("Selected {} (test accuracy {:.3})", run.report.selection.family, run.report.test_metrics.accuracy);
//!
//! FileArtifactStore::new("out/model").save(&run.bundle)?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use clasp_processing::{Dataset, DatasetSplit, PreparedData, fit_transform, io, split};
use tracing::{error, info, warn};

use crate::bundle::ModelBundle;
use crate::config::PipelineConfig;
use crate::error::{LearningError, Result};
use crate::metrics::ClassificationMetrics;
use crate::models::Classifier;
use crate::progress::{ProgressCallback, ProgressUpdate, TrainingStage};
use crate::selection::ModelSelector;
use crate::types::{SelectionSummary, SplitSizes, TrainingReport};

const SELECTION_START: f64 = 0.15;
const SELECTION_END: f64 = 0.9;

/// Everything a successful run produced.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    /// The consistent preprocessing + model unit, ready to save.
    pub bundle: ModelBundle,
    /// The three subsets, with test labels held out.
    pub split: DatasetSplit,
    /// Fitted state plus the transformed train and validation subsets.
    pub prepared: PreparedData,
    pub report: TrainingReport,
}

/// The training pipeline.
///
/// Use [`Pipeline::builder()`] to construct a pipeline. `Pipeline` holds no
/// per-run state, so one instance can train any number of datasets.
pub struct Pipeline {
    config: PipelineConfig,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Pipeline {
    /// Create a new builder for `Pipeline`.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a CSV with the configured label column and train on it.
    pub fn train_csv(&self, path: impl AsRef<Path>) -> Result<TrainingRun> {
        let dataset = io::read_dataset(path, self.config.label_column.as_deref())?;
        self.train(&dataset)
    }

    /// Run every stage on `dataset`.
    ///
    /// # Errors
    ///
    /// Returns the first stage error:
    /// - invalid input from splitting an empty or too small dataset
    /// - an unknown label if validation holds a label the train subset lacks
    /// - [`LearningError::InvalidData`] if there are fewer train records than folds
    /// - [`LearningError::NoViableModel`] if every candidate fails
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingRun> {
        let mut stage = TrainingStage::Initializing;
        let result = self.run(dataset, &mut stage);
        if let Err(e) = &result {
            error!("Training failed during {}: {}", stage, e);
            self.emit(ProgressUpdate::stage(
                TrainingStage::Failed,
                stage_start(stage),
                format!("Failed during {}: {}", stage, e),
            ));
        }
        result
    }

    fn run(&self, dataset: &Dataset, stage: &mut TrainingStage) -> Result<TrainingRun> {
        let started = Instant::now();
        let config = &self.config;

        self.enter(stage, TrainingStage::Initializing, "Validating input");
        info!(
            "Training on {} records with {} features, label '{}'",
            dataset.len(),
            dataset.features().n_features(),
            dataset.label_name()
        );

        self.enter(stage, TrainingStage::Splitting, "Splitting records");
        let split = split(dataset, config.train_fraction, config.random_seed)?;
        let sizes = SplitSizes::from(split.sizes());

        self.enter(stage, TrainingStage::Preprocessing, "Fitting scaler and label encoder");
        let prepared = fit_transform(&split)?;
        let n_classes = prepared.state.n_classes();

        self.enter(
            stage,
            TrainingStage::ModelSelection,
            format!("Evaluating {} candidates", config.candidate_count()),
        );
        let mut selector = ModelSelector::new(config);
        if let Some(callback) = &self.progress_callback {
            let callback = Arc::clone(callback);
            selector = selector.on_candidate(Arc::new(move |done, total| {
                let fraction = done as f64 / total.max(1) as f64;
                callback(ProgressUpdate {
                    stage: TrainingStage::ModelSelection,
                    progress: SELECTION_START + (SELECTION_END - SELECTION_START) * fraction,
                    message: format!("Evaluated {}/{} candidates", done, total),
                    candidates_completed: Some((done, total)),
                });
            }));
        }
        let outcome = selector.select(&prepared.state, &prepared.train, &prepared.validation)?;
        let bundle = ModelBundle::new(prepared.state.clone(), outcome.selected.clone())?;

        self.enter(stage, TrainingStage::Evaluation, "Scoring validation and test records");
        let model = &bundle.model().model;
        let validation_metrics = ClassificationMetrics::compute(
            &prepared.validation.y,
            &model.predict(&prepared.validation.x),
            n_classes,
        )?;
        let test_metrics = evaluate_test(&bundle, &split)?;
        info!(
            "Validation accuracy {:.4}, test accuracy {:.4}",
            validation_metrics.accuracy, test_metrics.accuracy
        );

        let report = TrainingReport {
            split: sizes,
            feature_names: prepared.state.feature_names().to_vec(),
            classes: prepared.state.classes().to_vec(),
            selection: SelectionSummary::from(&outcome),
            validation_metrics,
            test_metrics,
            fingerprint: format!("{:08x}", bundle.fingerprint()),
            training_time_seconds: started.elapsed().as_secs_f64(),
        };

        *stage = TrainingStage::Complete;
        self.emit(ProgressUpdate::stage(
            TrainingStage::Complete,
            1.0,
            format!("Selected {} ({})", outcome.selected.family, outcome.selected.hyperparameters),
        ));

        Ok(TrainingRun {
            bundle,
            split,
            prepared,
            report,
        })
    }

    fn enter(&self, stage: &mut TrainingStage, next: TrainingStage, message: impl Into<String>) {
        *stage = next;
        self.emit(ProgressUpdate::stage(next, stage_start(next), message));
    }

    fn emit(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.progress_callback {
            callback(update);
        }
    }
}

fn stage_start(stage: TrainingStage) -> f64 {
    match stage {
        TrainingStage::Initializing => 0.0,
        TrainingStage::Splitting => 0.05,
        TrainingStage::Preprocessing => 0.1,
        TrainingStage::ModelSelection => SELECTION_START,
        TrainingStage::Evaluation => SELECTION_END,
        TrainingStage::Complete | TrainingStage::Failed => 1.0,
    }
}

/// Score the bundle on the test subset, joining the held-out labels back.
///
/// Test labels the encoder never saw cannot be predicted; those rows are
/// left out of the metrics.
fn evaluate_test(bundle: &ModelBundle, split: &DatasetSplit) -> Result<ClassificationMetrics> {
    let state = bundle.preprocessing();
    let scaled = state.transform(&split.test)?;
    let predicted = bundle.model().model.predict(&scaled);

    let mut y_true = Vec::with_capacity(predicted.len());
    let mut y_pred = Vec::with_capacity(predicted.len());
    let mut unknown = 0;
    for (label, &code) in split.test_labels.as_slice().iter().zip(&predicted) {
        match state.encoder().encode_one(label) {
            Ok(true_code) => {
                y_true.push(true_code);
                y_pred.push(code);
            }
            Err(_) => unknown += 1,
        }
    }
    if unknown > 0 {
        warn!(
            "{} test records carry labels unseen in training and are excluded from test metrics",
            unknown
        );
    }
    if y_true.is_empty() {
        return Err(LearningError::InvalidData(
            "no test record carries a label seen in training".to_string(),
        ));
    }
    ClassificationMetrics::compute(&y_true, &y_pred, state.n_classes())
}

/// Builder for [`Pipeline`].
///
/// # Required Configuration
///
/// - [`config()`](Self::config): Pipeline configuration
///
/// # Optional Configuration
///
/// - [`on_progress()`](Self::on_progress): Progress callback for monitoring
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl PipelineBuilder {
    /// Set the pipeline configuration (required).
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the progress callback (optional).
    ///
    /// During parallel model selection the callback runs on rayon worker
    /// threads, so it should return quickly.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] if no configuration was provided.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.ok_or_else(|| {
            LearningError::InvalidConfig("Pipeline config is required".to_string())
        })?;

        Ok(Pipeline {
            config,
            progress_callback: self.progress_callback,
        })
    }
}
