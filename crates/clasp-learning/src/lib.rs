//! clasp-learning: model selection, bundle persistence and inference for
//! tabular classification.
//!
//! This crate sits on top of `clasp-processing`. It searches hyperparameter
//! grids of two model families with k-fold cross-validation, packages the
//! winner with the preprocessing state it was trained against, persists that
//! pair as one unit, and serves predictions from it.
//!
//! # Features
//!
//! - **Native Model Families**: Random forest (CART, Gini) and one-vs-rest SVM (SMO, linear/RBF)
//! - **Grid Search**: Deterministic grid order, k-fold cross-validation, parallel on rayon
//! - **Consistent Bundles**: Model and preprocessing state tied by a CRC-32 fingerprint
//! - **Atomic Persistence**: Temp-file + fsync + rename, or an in-memory store
//! - **Strict Inference**: Named or ordered records validated against the feature schema
//! - **Progress Reporting**: Stage and per-candidate callbacks
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use clasp_learning::{
//!     ArtifactStore, FileArtifactStore, InferenceService, Pipeline, PipelineConfig, RawRecord,
//! };
//!
//! // Train
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::default())
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?;
//! let run = pipeline.train_csv("data/iris.csv")?;
//!
//! // Persist
//! let store = FileArtifactStore::new("out/model");
//! let handle = store.save(&run.bundle)?;
//!
//! // Serve
//! let service = InferenceService::new();
//! service.load(&store, &handle)?;
//! let prediction = service.predict(&RawRecord::Ordered(vec![5.1, 3.5, 1.4, 0.2]))?;
//! println!("{}", prediction.predicted_label);
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         clasp-processing                         │
//! │   Dataset ──► split() ──► DatasetSplit ──► fit_transform()       │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ PreparedData
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          clasp-learning                          │
//! │                                                                  │
//! │  ModelSelector ──► SelectedModel ──► ModelBundle ──► ArtifactStore│
//! │                                           │                      │
//! │                                           ▼                      │
//! │                                   InferenceService               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`](LearningError).
//! Each variant carries a stable [`error_code()`](LearningError::error_code):
//!
//! - [`LearningError::InvalidConfig`] - Invalid pipeline configuration
//! - [`LearningError::InvalidData`] - Data cannot be trained or scored
//! - [`LearningError::Training`] - One candidate failed; collected by the selector
//! - [`LearningError::NoViableModel`] - Every candidate failed
//! - [`LearningError::BundleNotFound`] / [`LearningError::BundleCorrupt`] - Loading failed
//! - [`LearningError::SchemaMismatch`] - A request does not match the feature schema
//!
//! # Thread Safety
//!
//! [`InferenceService`] and [`ModelBundle`] are `Send + Sync`. Share one
//! service across threads (for example in an `Arc`); predictions run in
//! parallel without locking the bundle.

mod bundle;
mod config;
mod cv;
mod error;
mod grid;
mod inference;
mod metrics;
mod models;
mod pipeline;
mod progress;
mod selection;
mod store;
mod types;

// Configuration
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use grid::{ForestGrid, Kernel, SvmGrid, family_candidates};

// Error types
pub use error::{LearningError, Result as LearningResult};

// Models
pub use models::{
    Classifier, FittedModel, Hyperparameters, ModelFamily, RandomForest, SupportVectorMachine,
};

// Cross-validation and metrics
pub use cv::{CvScores, KFold, cross_val_score};
pub use metrics::{ClassificationMetrics, accuracy};

// Selection
pub use selection::{
    CandidateCallback, CandidateFailure, CandidateScore, FamilyResult, ModelSelector,
    SelectedModel, SelectionOutcome,
};

// Bundles and stores
pub use bundle::{FORMAT_VERSION, ModelBundle};
pub use store::{ArtifactStore, BUNDLE_FILE, BundleHandle, FileArtifactStore, MemoryArtifactStore};

// Inference
pub use inference::{ErrorBody, InferenceService, PredictionResponse, RawRecord, ServiceStatus};

// Pipeline
pub use pipeline::{Pipeline, PipelineBuilder, TrainingRun};
pub use progress::{ProgressCallback, ProgressUpdate, TrainingStage};

// Result types
pub use types::{ModelInfo, PredictionResult, SelectionSummary, SplitSizes, TrainingReport};
