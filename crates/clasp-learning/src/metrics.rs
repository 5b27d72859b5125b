//! Classification metrics.
//!
//! Weighted averages weight each class by its support in `y_true`, so classes
//! that never occur in the true labels do not contribute.

use serde::{Deserialize, Serialize};

use crate::error::{LearningError, Result};

/// Fraction of predictions equal to the true code. Empty input scores 0.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Evaluation summary of one labeled subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Rows are true codes, columns are predicted codes.
    pub confusion_matrix: Vec<Vec<usize>>,
    pub support: usize,
}

impl ClassificationMetrics {
    /// Compute metrics for codes in `0..n_classes`.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidData`] if the inputs differ in length,
    /// are empty, or hold a code outside `0..n_classes`.
    pub fn compute(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(LearningError::InvalidData(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(LearningError::InvalidData(
                "cannot compute metrics on zero samples".to_string(),
            ));
        }
        if let Some(code) = y_true.iter().chain(y_pred).find(|&&c| c >= n_classes) {
            return Err(LearningError::InvalidData(format!(
                "label code {} outside 0..{}",
                code, n_classes
            )));
        }

        let mut confusion = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            confusion[t][p] += 1;
        }

        let total = y_true.len() as f64;
        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        for class in 0..n_classes {
            let support = confusion[class].iter().sum::<usize>();
            if support == 0 {
                continue;
            }
            let tp = confusion[class][class] as f64;
            let predicted = (0..n_classes).map(|r| confusion[r][class]).sum::<usize>() as f64;

            let p = if predicted > 0.0 { tp / predicted } else { 0.0 };
            let r = tp / support as f64;
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            let weight = support as f64 / total;
            precision += weight * p;
            recall += weight * r;
            f1 += weight * f;
        }

        Ok(Self {
            accuracy: accuracy(y_true, y_pred),
            precision,
            recall,
            f1_score: f1,
            confusion_matrix: confusion,
            support: y_true.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0, 1, 2, 1], &[0, 1, 1, 1]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_perfect_predictions() {
        let m = ClassificationMetrics::compute(&[0, 1, 2], &[0, 1, 2], 3).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.confusion_matrix, vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 0, 1]]);
    }

    #[test]
    fn test_weighted_scores() {
        // class 0: 2 samples, both right; class 1: 2 samples, one predicted as 0
        let m = ClassificationMetrics::compute(&[0, 0, 1, 1], &[0, 0, 0, 1], 2).unwrap();
        assert_eq!(m.accuracy, 0.75);
        assert_eq!(m.confusion_matrix, vec![vec![2, 0], vec![1, 1]]);
        // precision: class 0 = 2/3, class 1 = 1; weighted = (2/3 + 1) / 2
        assert!((m.precision - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
        // recall: class 0 = 1, class 1 = 1/2
        assert!((m.recall - 0.75).abs() < 1e-12);
        assert_eq!(m.support, 4);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(ClassificationMetrics::compute(&[0], &[0, 1], 2).is_err());
        assert!(ClassificationMetrics::compute(&[], &[], 2).is_err());
        let err = ClassificationMetrics::compute(&[0, 3], &[0, 0], 2).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }
}
