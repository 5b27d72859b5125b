//! Shared utilities for dataset loading and preprocessing.
//!
//! This module contains small helpers used by several modules: dtype checks
//! on polars columns and the ordering rule for label values.

use std::cmp::Ordering;

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Label Ordering
// =============================================================================

/// Try to read a label as a number.
///
/// Surrounding whitespace is ignored. NaN is not treated as numeric.
pub fn parse_label_number(label: &str) -> Option<f64> {
    label.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Sort distinct labels into encoder order.
///
/// When every label parses as a number the labels are ordered numerically,
/// so `"2"` sorts before `"10"`. Otherwise the order is lexicographic.
/// Labels with equal numeric values (`"1"` and `"1.0"`) fall back to
/// lexicographic order between themselves.
pub fn sort_labels(labels: &mut [String]) {
    let all_numeric = labels.iter().all(|l| parse_label_number(l).is_some());
    if all_numeric {
        labels.sort_by(|a, b| {
            let (x, y) = (parse_label_number(a), parse_label_number(b));
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal).then_with(|| a.cmp(b)),
                _ => a.cmp(b),
            }
        });
    } else {
        labels.sort();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_parse_label_number() {
        assert_eq!(parse_label_number("2"), Some(2.0));
        assert_eq!(parse_label_number(" 1.5 "), Some(1.5));
        assert_eq!(parse_label_number("setosa"), None);
        assert_eq!(parse_label_number("NaN"), None);
    }

    #[test]
    fn test_sort_labels_numeric() {
        let mut labels = vec!["10".to_string(), "2".to_string(), "-1".to_string()];
        sort_labels(&mut labels);
        assert_eq!(labels, vec!["-1", "2", "10"]);
    }

    #[test]
    fn test_sort_labels_lexicographic_when_mixed() {
        let mut labels = vec!["virginica".to_string(), "10".to_string(), "setosa".to_string()];
        sort_labels(&mut labels);
        assert_eq!(labels, vec!["10", "setosa", "virginica"]);
    }

    #[test]
    fn test_sort_labels_equal_values_are_stable() {
        let mut labels = vec!["1.0".to_string(), "1".to_string()];
        sort_labels(&mut labels);
        assert_eq!(labels, vec!["1", "1.0"]);
    }
}
