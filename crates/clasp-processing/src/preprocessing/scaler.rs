//! Standard scaler: per-feature mean removal and unit-variance scaling.

use serde::{Deserialize, Serialize};

use crate::dataset::FeatureTable;
use crate::error::{ProcessingError, Result};

/// Fitted per-feature normalization parameters.
///
/// `scale` holds the population standard deviation of each training column.
/// A zero scale marks a constant training column, whose transformed value is
/// always `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on the training features.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if the table has no rows or
    /// any value is not finite.
    pub fn fit(features: &FeatureTable) -> Result<Self> {
        if features.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }

        let n = features.len() as f64;
        let mut mean = Vec::with_capacity(features.n_features());
        let mut scale = Vec::with_capacity(features.n_features());

        for (index, name) in features.feature_names().iter().enumerate() {
            let column = features.column(index);
            if column.iter().any(|v| !v.is_finite()) {
                return Err(ProcessingError::InvalidInput(format!(
                    "feature '{}' contains non-finite values",
                    name
                )));
            }
            let m = column.iter().sum::<f64>() / n;
            let var = column.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean.push(m);
            scale.push(var.sqrt());
        }

        Ok(Self {
            feature_names: features.feature_names().to_vec(),
            mean,
            scale,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Scale one row given in schema order.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::SchemaMismatch`] if the row width differs
    /// from the fitted schema, and [`ProcessingError::InvalidInput`] for a
    /// non-finite value.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(ProcessingError::SchemaMismatch(format!(
                "expected {} feature values, got {}",
                self.n_features(),
                row.len()
            )));
        }

        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .enumerate()
            .map(|(i, (&x, (&m, &s)))| {
                if !x.is_finite() {
                    return Err(ProcessingError::InvalidInput(format!(
                        "feature '{}' is not a finite number",
                        self.feature_names[i]
                    )));
                }
                Ok(if s == 0.0 { 0.0 } else { (x - m) / s })
            })
            .collect()
    }

    /// Scale every row of a table.
    ///
    /// The table's column names must equal the fitted names in the same order.
    pub fn transform(&self, features: &FeatureTable) -> Result<Vec<Vec<f64>>> {
        if features.feature_names() != self.feature_names.as_slice() {
            return Err(ProcessingError::SchemaMismatch(format!(
                "table columns [{}] do not match fitted features [{}]",
                features.feature_names().join(", "),
                self.feature_names.join(", ")
            )));
        }
        features.rows().iter().map(|r| self.transform_row(r)).collect()
    }
}
