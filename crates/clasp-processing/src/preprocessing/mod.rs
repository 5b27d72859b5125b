//! Preprocessing fitter.
//!
//! Fits a [`StandardScaler`] and a [`LabelEncoder`] on the train subset only
//! and applies the stored parameters, never re-fitting, to every other input.
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_processing::{split, fit_transform};
//!
//! let split = split(&dataset, 0.7, 42)?;
//! let prepared = fit_transform(&split)?;
//!
//! // The same state later transforms an inference record
//! let scaled = prepared.state.transform_row(&[5.1, 3.5, 1.4, 0.2])?;
//! ```

mod encoder;
mod scaler;
mod state;

pub use encoder::LabelEncoder;
pub use scaler::StandardScaler;
pub use state::PreprocessingState;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{Dataset, DatasetSplit};
use crate::error::{Result, ResultExt};

/// Scaled features and encoded labels of one subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedSubset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<usize>,
}

impl EncodedSubset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Output of the fitter: the fitted state plus the transformed subsets.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedData {
    pub state: PreprocessingState,
    pub train: EncodedSubset,
    pub validation: EncodedSubset,
}

/// Transform a labeled subset with an already-fitted state.
///
/// # Errors
///
/// Returns [`ProcessingError::UnknownLabel`](crate::ProcessingError::UnknownLabel)
/// if the subset holds a label the encoder has not seen.
pub fn transform_subset(state: &PreprocessingState, subset: &Dataset) -> Result<EncodedSubset> {
    Ok(EncodedSubset {
        x: state.transform(subset.features())?,
        y: state.encode_labels(subset.labels())?,
    })
}

/// Fit preprocessing on the train subset and transform train and validation.
///
/// Test features are left untouched; they go through the same state at
/// evaluation time.
pub fn fit_transform(split: &DatasetSplit) -> Result<PreparedData> {
    let state = PreprocessingState::fit(&split.train).context("Fitting preprocessing state")?;
    debug!(
        features = state.n_features(),
        classes = state.n_classes(),
        "Fitted scaler and label encoder"
    );

    let train = transform_subset(&state, &split.train).context("Transforming train subset")?;
    let validation =
        transform_subset(&state, &split.validation).context("Transforming validation subset")?;

    info!(
        "Preprocessing fitted on {} train records ({} classes: {})",
        train.len(),
        state.n_classes(),
        state.classes().join(", ")
    );

    Ok(PreparedData {
        state,
        train,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureTable;
    use crate::split::split;

    fn dataset(labels: &[&str]) -> Dataset {
        let rows = (0..labels.len())
            .map(|i| vec![i as f64, (i * i) as f64])
            .collect();
        let table = FeatureTable::new(vec!["a".into(), "b".into()], rows).unwrap();
        Dataset::new(table, labels.iter().map(|s| s.to_string()).collect(), "y").unwrap()
    }

    #[test]
    fn test_fit_transform_uses_train_statistics_only() {
        let ds = dataset(&["x"; 20]);
        let split = split(&ds, 0.6, 11).unwrap();
        let prepared = fit_transform(&split).unwrap();

        let train_mean = split.train.features().column(0).iter().sum::<f64>()
            / split.train.len() as f64;
        assert_eq!(prepared.state.scaler().mean()[0], train_mean);
        assert_eq!(prepared.train.len(), split.train.len());
        assert_eq!(prepared.validation.len(), split.validation.len());
    }

    #[test]
    fn test_validation_label_unseen_in_train() {
        let ds = dataset(&["a", "b", "a", "b", "c"]);
        // hand-built split so "c" only appears in validation
        let train = ds.select(&[0, 1, 2, 3]);
        let validation = ds.select(&[4]);
        let state = PreprocessingState::fit(&train).unwrap();
        let err = transform_subset(&state, &validation).unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_LABEL");
    }
}
