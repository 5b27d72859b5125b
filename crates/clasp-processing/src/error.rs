//! Error types for dataset handling and preprocessing.
//!
//! This module provides the error hierarchy for the data side of the
//! pipeline using `thiserror`. Errors are serializable as `{code, message}`
//! so a request boundary can hand them back to a caller as structured data.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for dataset and preprocessing operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProcessingError {
    /// The dataset or a derived subset is malformed or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A label was presented for encoding that was not seen during fitting.
    #[error("Unknown label '{0}' (not seen during fitting)")]
    UnknownLabel(String),

    /// An integer code is outside the range of the fitted label encoder.
    #[error("Unknown label code {code} (encoder has {n_classes} classes)")]
    UnknownCode { code: usize, n_classes: usize },

    /// A record does not match the fitted feature schema.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get the stable error code for this error.
    ///
    /// Context wrappers report the code of the error they wrap.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::UnknownLabel(_) => "UNKNOWN_LABEL",
            Self::UnknownCode { .. } => "UNKNOWN_LABEL",
            Self::SchemaMismatch(_) => "SCHEMA_MISMATCH",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is a schema mismatch, looking through context wrappers.
    pub fn is_schema_mismatch(&self) -> bool {
        match self {
            Self::SchemaMismatch(_) => true,
            Self::WithContext { source, .. } => source.is_schema_mismatch(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Io(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ProcessingError::InvalidInput("empty".to_string()).error_code(),
            "INVALID_INPUT"
        );
        assert_eq!(
            ProcessingError::UnknownLabel("virginica".to_string()).error_code(),
            "UNKNOWN_LABEL"
        );
        assert_eq!(
            ProcessingError::SchemaMismatch("missing".to_string()).error_code(),
            "SCHEMA_MISMATCH"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = ProcessingError::ColumnNotFound("petal width (cm)".to_string());
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["code"], "COLUMN_NOT_FOUND");
        assert!(json["message"].as_str().unwrap().contains("petal width (cm)"));
    }

    #[test]
    fn test_with_context() {
        let error = ProcessingError::SchemaMismatch("expected 4 values, got 3".to_string())
            .with_context("While transforming record");
        assert!(error.to_string().contains("While transforming record"));
        assert_eq!(error.error_code(), "SCHEMA_MISMATCH"); // Preserves original code
        assert!(error.is_schema_mismatch());
    }

    #[test]
    fn test_result_ext_on_io() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let error = result.context("Reading train.csv").unwrap_err();
        assert_eq!(error.error_code(), "IO_ERROR");
        assert!(error.to_string().starts_with("Reading train.csv"));
    }
}
