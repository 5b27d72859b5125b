//! Fitted preprocessing state shared by training and inference.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::encoder::LabelEncoder;
use super::scaler::StandardScaler;
use crate::dataset::{Dataset, FeatureTable};
use crate::error::{ProcessingError, Result};

/// Scaler and label encoder fitted together on one train subset.
///
/// Immutable once fitted. The feature schema (names and order) is the
/// scaler's, and every input transformed through this state is validated
/// against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingState {
    scaler: StandardScaler,
    encoder: LabelEncoder,
}

impl PreprocessingState {
    /// Fit both transforms on the train subset.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if the subset is empty or
    /// holds non-finite feature values.
    pub fn fit(train: &Dataset) -> Result<Self> {
        let scaler = StandardScaler::fit(train.features())?;
        let encoder = LabelEncoder::fit(train.labels())?;
        Ok(Self { scaler, encoder })
    }

    /// Assemble a state from separately fitted parts.
    pub fn from_parts(scaler: StandardScaler, encoder: LabelEncoder) -> Self {
        Self { scaler, encoder }
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    /// Feature names in schema order.
    pub fn feature_names(&self) -> &[String] {
        self.scaler.feature_names()
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    /// Label values in code order.
    pub fn classes(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn n_classes(&self) -> usize {
        self.encoder.n_classes()
    }

    /// CRC-32 of the canonical JSON encoding.
    ///
    /// Two states fitted on different data yield different fingerprints with
    /// overwhelming likelihood; models record the fingerprint of the state
    /// whose transformed features they were trained on.
    pub fn fingerprint(&self) -> Result<u32> {
        let bytes = serde_json::to_vec(self)?;
        Ok(crc32fast::hash(&bytes))
    }

    /// Transform a table using the stored scaler parameters.
    pub fn transform(&self, features: &FeatureTable) -> Result<Vec<Vec<f64>>> {
        self.scaler.transform(features)
    }

    /// Transform one row given in schema order.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.scaler.transform_row(row)
    }

    /// Arrange a named record into schema order.
    ///
    /// The record's keys must be exactly the fitted feature names: a missing
    /// or unexpected key is a [`ProcessingError::SchemaMismatch`]. Key order
    /// in the record is irrelevant.
    pub fn order_named(&self, record: &HashMap<String, f64>) -> Result<Vec<f64>> {
        let names = self.feature_names();

        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !record.contains_key(n.as_str()))
            .map(String::as_str)
            .collect();
        let mut unexpected: Vec<&str> = record
            .keys()
            .filter(|k| !names.contains(k))
            .map(String::as_str)
            .collect();
        unexpected.sort_unstable();

        if !missing.is_empty() || !unexpected.is_empty() {
            let mut parts = Vec::new();
            if !missing.is_empty() {
                parts.push(format!("missing features [{}]", missing.join(", ")));
            }
            if !unexpected.is_empty() {
                parts.push(format!("unexpected features [{}]", unexpected.join(", ")));
            }
            return Err(ProcessingError::SchemaMismatch(parts.join("; ")));
        }

        Ok(names.iter().map(|n| record[n.as_str()]).collect())
    }

    /// Encode labels to codes.
    pub fn encode_labels(&self, labels: &[String]) -> Result<Vec<usize>> {
        self.encoder.encode(labels)
    }

    /// Decode codes to labels.
    pub fn decode_labels(&self, codes: &[usize]) -> Result<Vec<String>> {
        self.encoder.decode(codes)
    }

    /// Decode one code.
    pub fn decode_label(&self, code: usize) -> Result<&str> {
        self.encoder.decode_one(code)
    }
}

// Shared read-only across inference threads
static_assertions::assert_impl_all!(PreprocessingState: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn iris_like() -> Dataset {
        let names = vec!["sepal".to_string(), "petal".to_string()];
        let rows = vec![vec![5.1, 1.4], vec![7.0, 4.7], vec![6.3, 6.0], vec![4.9, 1.5]];
        let table = FeatureTable::new(names, rows).unwrap();
        let labels = ["0", "1", "2", "0"].iter().map(|s| s.to_string()).collect();
        Dataset::new(table, labels, "target").unwrap()
    }

    #[test]
    fn test_fit_exposes_schema_and_classes() {
        let state = PreprocessingState::fit(&iris_like()).unwrap();
        assert_eq!(state.feature_names(), &["sepal".to_string(), "petal".to_string()]);
        assert_eq!(state.n_classes(), 3);
        assert_eq!(state.classes(), &["0".to_string(), "1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_fingerprint_is_stable_and_discriminating() {
        let state = PreprocessingState::fit(&iris_like()).unwrap();
        assert_eq!(state.fingerprint().unwrap(), state.clone().fingerprint().unwrap());

        let json = serde_json::to_string(&state).unwrap();
        let restored: PreprocessingState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.fingerprint().unwrap(), restored.fingerprint().unwrap());

        let other = PreprocessingState::fit(&iris_like().select(&[0, 1, 2])).unwrap();
        assert_ne!(state.fingerprint().unwrap(), other.fingerprint().unwrap());
    }

    #[test]
    fn test_order_named_reorders_to_schema() {
        let state = PreprocessingState::fit(&iris_like()).unwrap();
        let record = HashMap::from([("petal".to_string(), 1.4), ("sepal".to_string(), 5.1)]);
        assert_eq!(state.order_named(&record).unwrap(), vec![5.1, 1.4]);
    }

    #[test]
    fn test_order_named_rejects_missing_and_extra() {
        let state = PreprocessingState::fit(&iris_like()).unwrap();

        let missing = HashMap::from([("sepal".to_string(), 5.1)]);
        let err = state.order_named(&missing).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("missing features [petal]"));

        let extra = HashMap::from([
            ("sepal".to_string(), 5.1),
            ("petal".to_string(), 1.4),
            ("stem".to_string(), 0.0),
        ]);
        let err = state.order_named(&extra).unwrap_err();
        assert!(err.to_string().contains("unexpected features [stem]"));
    }

    #[test]
    fn test_decode_inverts_encode() {
        let ds = iris_like();
        let state = PreprocessingState::fit(&ds).unwrap();
        let codes = state.encode_labels(ds.labels()).unwrap();
        assert_eq!(state.decode_labels(&codes).unwrap(), ds.labels().to_vec());
    }
}
