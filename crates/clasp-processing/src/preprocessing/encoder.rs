//! Label encoder: a bijection between label values and codes `0..k`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::utils::sort_labels;

/// Fitted label mapping. Code `i` decodes to `classes[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit on the training labels.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidInput`] if `labels` is empty.
    pub fn fit(labels: &[String]) -> Result<Self> {
        if labels.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "cannot fit label encoder on zero labels".to_string(),
            ));
        }
        let distinct: BTreeSet<&String> = labels.iter().collect();
        let mut classes: Vec<String> = distinct.into_iter().cloned().collect();
        sort_labels(&mut classes);
        Ok(Self { classes })
    }

    /// Label values in code order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Encode a single label.
    pub fn encode_one(&self, label: &str) -> Result<usize> {
        self.classes
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| ProcessingError::UnknownLabel(label.to_string()))
    }

    /// Encode labels to codes.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::UnknownLabel`] for the first label not seen
    /// during fitting.
    pub fn encode(&self, labels: &[String]) -> Result<Vec<usize>> {
        let lookup: HashMap<&str, usize> = self
            .classes
            .iter()
            .enumerate()
            .map(|(code, class)| (class.as_str(), code))
            .collect();
        labels
            .iter()
            .map(|label| {
                lookup
                    .get(label.as_str())
                    .copied()
                    .ok_or_else(|| ProcessingError::UnknownLabel(label.clone()))
            })
            .collect()
    }

    /// Decode a single code.
    pub fn decode_one(&self, code: usize) -> Result<&str> {
        self.classes
            .get(code)
            .map(String::as_str)
            .ok_or(ProcessingError::UnknownCode {
                code,
                n_classes: self.classes.len(),
            })
    }

    /// Decode codes back to labels.
    pub fn decode(&self, codes: &[usize]) -> Result<Vec<String>> {
        codes
            .iter()
            .map(|&code| self.decode_one(code).map(str::to_string))
            .collect()
    }
}
