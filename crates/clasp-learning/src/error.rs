//! Error types for the clasp-learning crate.
//!
//! This module defines [`LearningError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! # Error Handling
//!
//! Errors are split by where they are recovered:
//! - **Stage-fatal**: configuration, data, selection and bundle errors halt a
//!   training run or a service load before anything is published
//! - **Candidate-local**: [`Training`](LearningError::Training) is collected by
//!   the selector, and the remaining candidates keep running
//! - **Request-local**: [`SchemaMismatch`](LearningError::SchemaMismatch) and
//!   [`NotLoaded`](LearningError::NotLoaded) fail one prediction; the service
//!   keeps serving
//!
//! Every variant has a stable [`error_code()`](LearningError::error_code) and
//! serializes as `{code, message}`.
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_learning::{LearningError, PipelineConfig};
//!
//! fn configure() -> Result<PipelineConfig, LearningError> {
//!     // Errors are automatically propagated with ?
//!     let config = PipelineConfig::builder().cv_folds(5).build()?;
//!     Ok(config)
//! }
//! ```

use clasp_processing::ProcessingError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for clasp-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration provided to the pipeline.
    ///
    /// The message names the offending setting.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid data provided for training or evaluation.
    ///
    /// Common causes:
    /// - Fewer samples than cross-validation folds
    /// - Feature rows of different widths
    /// - Label codes outside the encoder's range
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An inference request does not match the bundle's feature schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A single candidate model failed to fit.
    ///
    /// The selector records these and continues with the other candidates.
    #[error("Training {family} failed: {reason}")]
    Training {
        /// Model family of the failing candidate.
        family: String,
        /// What went wrong.
        reason: String,
    },

    /// Every candidate failed, so there is nothing to select.
    #[error("No viable model: all {attempted} candidates failed")]
    NoViableModel {
        /// Number of candidates attempted.
        attempted: usize,
    },

    /// No bundle exists at the given location.
    #[error("Bundle not found: {location}")]
    BundleNotFound {
        /// Where the store looked.
        location: String,
    },

    /// Stored bundle data cannot be decoded into a consistent bundle.
    #[error("Bundle corrupt: {0}")]
    BundleCorrupt(String),

    /// The model and preprocessing state do not belong together.
    #[error("Inconsistent bundle: {0}")]
    InconsistentBundle(String),

    /// A prediction was requested while no bundle is loaded.
    #[error("No model bundle is loaded")]
    NotLoaded,

    /// Error raised by dataset handling or preprocessing.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LearningError {
    /// Create a [`Training`](Self::Training) error.
    pub fn training(family: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Training {
            family: family.into(),
            reason: reason.into(),
        }
    }

    /// Get the stable error code for this error.
    ///
    /// Wrapped processing errors report their own code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            Self::Training { .. } => "TRAINING_FAILED",
            Self::NoViableModel { .. } => "NO_VIABLE_MODEL",
            Self::BundleNotFound { .. } => "BUNDLE_NOT_FOUND",
            Self::BundleCorrupt(_) => "BUNDLE_CORRUPT",
            Self::InconsistentBundle(_) => "INCONSISTENT_BUNDLE",
            Self::NotLoaded => "NOT_LOADED",
            Self::Processing(e) => e.error_code(),
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Check if this error only affects the request that raised it.
    ///
    /// Request-local errors are answered with a structured failure; the
    /// service keeps its loaded bundle.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self.error_code(),
            "SCHEMA_MISMATCH" | "NOT_LOADED" | "INVALID_INPUT" | "INVALID_DATA"
        )
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for LearningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("LearningError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(LearningError::NotLoaded.error_code(), "NOT_LOADED");
        assert_eq!(
            LearningError::training("random_forest", "nan").error_code(),
            "TRAINING_FAILED"
        );
        assert_eq!(
            LearningError::NoViableModel { attempted: 3 }.error_code(),
            "NO_VIABLE_MODEL"
        );
        assert_eq!(
            LearningError::BundleNotFound {
                location: "/tmp/x".to_string()
            }
            .error_code(),
            "BUNDLE_NOT_FOUND"
        );
    }

    #[test]
    fn test_processing_error_keeps_code() {
        let err: LearningError = ProcessingError::SchemaMismatch("missing".to_string()).into();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.is_request_error());
        assert_eq!(err.to_string(), "Schema mismatch: missing");
    }

    #[test]
    fn test_error_serialization() {
        let err = LearningError::training("support_vector", "decision values are not finite");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "TRAINING_FAILED");
        assert_eq!(
            json["message"],
            "Training support_vector failed: decision values are not finite"
        );
    }

    #[test]
    fn test_request_errors() {
        assert!(LearningError::SchemaMismatch("x".into()).is_request_error());
        assert!(LearningError::NotLoaded.is_request_error());
        assert!(!LearningError::BundleCorrupt("x".into()).is_request_error());
    }
}
