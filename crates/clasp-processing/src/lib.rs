//! Dataset handling and preprocessing for tabular classification.
//!
//! This crate covers the data side of the classification pipeline: loading a
//! labeled CSV into a [`Dataset`], splitting it into disjoint train,
//! validation and test subsets, and fitting the preprocessing state (a
//! standard scaler and a label encoder) that training and inference share.
//!
//! # Overview
//!
//! - **Loading**: CSV via polars, label column defaults to the last column
//! - **Splitting**: seeded random split, test labels held out separately
//! - **Preprocessing**: fit on train only, apply stored parameters everywhere else
//! - **Fingerprinting**: a CRC-32 identifying each fitted state
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use clasp_processing::{fit_transform, io, split};
//!
//! let dataset = io::read_dataset("data/iris.csv", None)?;
//! let split = split(&dataset, 0.7, 42)?;
//! io::write_split("out/data", &split)?;
//!
//! let prepared = fit_transform(&split)?;
//! println!(
//!     "{} features, classes: {:?}",
//!     prepared.state.n_features(),
//!     prepared.state.classes()
//! );
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ProcessingError>`](ProcessingError).
//! Every error carries a stable [`error_code()`](ProcessingError::error_code)
//! and serializes as `{code, message}`.

pub mod dataset;
pub mod error;
pub mod io;
pub mod preprocessing;
pub mod split;
pub mod utils;

// Re-export commonly used types
pub use dataset::{Dataset, DatasetSplit, FeatureTable, HeldOutLabels};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use preprocessing::{
    EncodedSubset, LabelEncoder, PreparedData, PreprocessingState, StandardScaler, fit_transform,
    transform_subset,
};
pub use split::{DEFAULT_TRAIN_FRACTION, split, split_sizes};

