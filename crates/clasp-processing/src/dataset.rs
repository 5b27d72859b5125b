//! In-memory tabular data model.
//!
//! A [`FeatureTable`] is a row-major matrix of numeric features with a fixed,
//! named column order. A [`Dataset`] pairs a feature table with one label per
//! row. Both validate their shape on construction, so every other module can
//! rely on rectangular rows and matching lengths.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Numeric features with a fixed column schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    /// Create a feature table, validating the schema and row widths.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if there are no feature
    /// columns, a name is empty or duplicated, or a row has the wrong width.
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if feature_names.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "at least one feature column is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(feature_names.len());
        for name in &feature_names {
            if name.trim().is_empty() {
                return Err(ProcessingError::InvalidInput(
                    "feature names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ProcessingError::InvalidInput(format!(
                    "feature '{}' appears more than once",
                    name
                )));
            }
        }

        let width = feature_names.len();
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ProcessingError::InvalidInput(format!(
                "row {} has {} values, expected {}",
                index,
                row.len(),
                width
            )));
        }

        Ok(Self {
            feature_names,
            rows,
        })
    }

    /// Column names in schema order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Row-major feature values.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of feature columns.
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }

    /// Rows at the given indices, preserving the schema.
    ///
    /// Indices must be in range; they come from the splitter's own permutation.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Labeled records: features plus one categorical label per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    features: FeatureTable,
    labels: Vec<String>,
    label_name: String,
}

impl Dataset {
    /// Create a dataset from a feature table and its labels.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if the label count does not
    /// match the row count, or the label column shares a name with a feature.
    pub fn new(
        features: FeatureTable,
        labels: Vec<String>,
        label_name: impl Into<String>,
    ) -> Result<Self> {
        let label_name = label_name.into();
        if labels.len() != features.len() {
            return Err(ProcessingError::InvalidInput(format!(
                "{} labels for {} feature rows",
                labels.len(),
                features.len()
            )));
        }
        if features.feature_names().iter().any(|n| *n == label_name) {
            return Err(ProcessingError::InvalidInput(format!(
                "label column '{}' is also a feature column",
                label_name
            )));
        }
        Ok(Self {
            features,
            labels,
            label_name,
        })
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Name of the label column.
    pub fn label_name(&self) -> &str {
        &self.label_name
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Records at the given indices.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(indices),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
            label_name: self.label_name.clone(),
        }
    }

    /// Split into features and labels.
    pub fn into_parts(self) -> (FeatureTable, Vec<String>) {
        (self.features, self.labels)
    }
}

/// Labels of the test subset, kept apart from its features.
///
/// Nothing in fitting or selection accepts this type; it is only joined back
/// with predictions for final evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeldOutLabels(Vec<String>);

impl HeldOutLabels {
    pub(crate) fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The three disjoint subsets produced by the splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    /// Records used for fitting preprocessing and training models.
    pub train: Dataset,
    /// Records used to report the selected model's held-out score.
    pub validation: Dataset,
    /// Test features without their labels.
    pub test: FeatureTable,
    /// Test labels, held out from fitting and selection.
    pub test_labels: HeldOutLabels,
}

impl DatasetSplit {
    /// Sizes as `(train, validation, test)`.
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.validation.len(), self.test.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{}", i)).collect()
    }

    #[test]
    fn test_feature_table_rejects_ragged_rows() {
        let err = FeatureTable::new(names(2), vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_feature_table_rejects_duplicate_names() {
        let err = FeatureTable::new(vec!["a".into(), "a".into()], vec![]).unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_feature_table_rejects_empty_schema() {
        assert!(FeatureTable::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_dataset_label_count_must_match() {
        let table = FeatureTable::new(names(1), vec![vec![1.0], vec![2.0]]).unwrap();
        let err = Dataset::new(table, vec!["a".into()], "target").unwrap_err();
        assert!(err.to_string().contains("1 labels for 2 feature rows"));
    }

    #[test]
    fn test_dataset_label_name_collides_with_feature() {
        let table = FeatureTable::new(names(1), vec![vec![1.0]]).unwrap();
        assert!(Dataset::new(table, vec!["a".into()], "f0").is_err());
    }

    #[test]
    fn test_select_keeps_schema_and_order() {
        let table = FeatureTable::new(names(2), vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]])
            .unwrap();
        let ds = Dataset::new(table, vec!["x".into(), "y".into(), "z".into()], "target").unwrap();

        let picked = ds.select(&[2, 0]);
        assert_eq!(picked.features().rows(), &[vec![5.0, 6.0], vec![1.0, 2.0]]);
        assert_eq!(picked.labels(), &["z".to_string(), "x".to_string()]);
        assert_eq!(picked.features().feature_names(), ds.features().feature_names());
        assert_eq!(picked.label_name(), "target");
    }

    #[test]
    fn test_column_extraction() {
        let table = FeatureTable::new(names(2), vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(table.column(1), vec![2.0, 4.0]);
    }
}
