//! The persisted unit: preprocessing state plus the selected model.
//!
//! A [`ModelBundle`] can only be built from a state and a model that belong
//! together. The model records the fingerprint of the state it was trained
//! against, and construction checks it along with the feature and class
//! counts. Decoding repeats the same checks, so a bundle that mixes two
//! training runs never reaches the inference service.
//!
//! The encoding is a single JSON document:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "preprocessing": { "scaler": { ... }, "encoder": { ... } },
//!   "model": { "family": "random_forest", "hyperparameters": { ... }, ... }
//! }
//! ```

use chrono::{DateTime, Utc};
use clasp_processing::PreprocessingState;
use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};
use crate::models::Classifier;
use crate::selection::SelectedModel;
use crate::types::ModelInfo;

/// Version written into every encoded bundle.
pub const FORMAT_VERSION: u32 = 1;

/// Preprocessing state and selected model, persisted and loaded together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    format_version: u32,
    created_at: DateTime<Utc>,
    preprocessing: PreprocessingState,
    model: SelectedModel,
}

impl ModelBundle {
    /// Pair a state with the model trained on its transformed features.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InconsistentBundle`] if the model was trained
    /// against a different preprocessing state.
    pub fn new(preprocessing: PreprocessingState, model: SelectedModel) -> Result<Self> {
        check_consistency(&preprocessing, &model).map_err(LearningError::InconsistentBundle)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            preprocessing,
            model,
        })
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn preprocessing(&self) -> &PreprocessingState {
        &self.preprocessing
    }

    pub fn model(&self) -> &SelectedModel {
        &self.model
    }

    /// Fingerprint of the preprocessing state both halves share.
    pub fn fingerprint(&self) -> u32 {
        self.model.preprocessing_fingerprint
    }

    pub fn feature_names(&self) -> &[String] {
        self.preprocessing.feature_names()
    }

    pub fn classes(&self) -> &[String] {
        self.preprocessing.classes()
    }

    /// Summary of what this bundle serves.
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            family: self.model.family,
            hyperparameters: self.model.hyperparameter_map(),
            feature_names: self.feature_names().to_vec(),
            classes: self.classes().to_vec(),
            cv_score: self.model.cv_score,
            validation_score: self.model.validation_score,
            fingerprint: format!("{:08x}", self.fingerprint()),
            created_at: self.created_at,
            format_version: self.format_version,
        }
    }

    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decode and verify an encoded bundle.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::BundleCorrupt`] if the bytes are not a bundle,
    /// carry an unsupported format version, or pair a model with a state it
    /// was not trained against.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let bundle: Self = serde_json::from_slice(bytes)
            .map_err(|e| LearningError::BundleCorrupt(format!("cannot decode bundle: {}", e)))?;

        if bundle.format_version != FORMAT_VERSION {
            return Err(LearningError::BundleCorrupt(format!(
                "unsupported format version {} (expected {})",
                bundle.format_version, FORMAT_VERSION
            )));
        }
        check_consistency(&bundle.preprocessing, &bundle.model)
            .map_err(LearningError::BundleCorrupt)?;
        Ok(bundle)
    }
}

fn check_consistency(
    preprocessing: &PreprocessingState,
    model: &SelectedModel,
) -> std::result::Result<(), String> {
    let fingerprint = preprocessing
        .fingerprint()
        .map_err(|e| format!("cannot fingerprint preprocessing state: {}", e))?;
    if fingerprint != model.preprocessing_fingerprint {
        return Err(format!(
            "model was trained against preprocessing {:08x}, bundle holds {:08x}",
            model.preprocessing_fingerprint, fingerprint
        ));
    }
    if model.model.family() != model.family || model.hyperparameters.family() != model.family {
        return Err(format!(
            "model family {} does not match its fitted parameters",
            model.family
        ));
    }
    if model.model.n_features() != preprocessing.n_features() {
        return Err(format!(
            "model expects {} features, preprocessing has {}",
            model.model.n_features(),
            preprocessing.n_features()
        ));
    }
    if model.model.n_classes() != preprocessing.n_classes() {
        return Err(format!(
            "model scores {} classes, label encoder has {}",
            model.model.n_classes(),
            preprocessing.n_classes()
        ));
    }
    Ok(())
}

// Shared read-only across inference threads
static_assertions::assert_impl_all!(ModelBundle: Send, Sync);
