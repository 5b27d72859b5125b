//! Dataset splitter.
//!
//! Partitions a labeled dataset into disjoint train, validation and test
//! subsets. The records are shuffled with a seeded RNG, so a given
//! `(dataset, train_fraction, seed)` always yields the same subsets. The
//! split is a plain random split; label proportions are not stratified.
//!
//! The train subset receives `round(n * train_fraction)` records. The rest
//! is halved, with validation taking the floor and test the remainder, so
//! 150 records at 0.7 become 105/22/23.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::dataset::{Dataset, DatasetSplit, HeldOutLabels};
use crate::error::{ProcessingError, Result};

/// Default fraction of records assigned to the train subset.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.7;

/// Subset sizes for `n` records at `train_fraction`.
///
/// # Errors
///
/// Returns [`ProcessingError::InvalidConfig`] if `train_fraction` is not in
/// `(0, 1)`, and [`ProcessingError::InvalidInput`] if the dataset is empty or
/// any subset would be empty.
pub fn split_sizes(n: usize, train_fraction: f64) -> Result<(usize, usize, usize)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(ProcessingError::InvalidConfig(format!(
            "train_fraction must be between 0.0 and 1.0 (exclusive), got {}",
            train_fraction
        )));
    }
    if n == 0 {
        return Err(ProcessingError::InvalidInput(
            "cannot split an empty dataset".to_string(),
        ));
    }

    let n_train = ((n as f64) * train_fraction).round() as usize;
    let n_train = n_train.min(n);
    let rest = n - n_train;
    let n_validation = rest / 2;
    let n_test = rest - n_validation;

    for (subset, size) in [("train", n_train), ("validation", n_validation), ("test", n_test)] {
        if size == 0 {
            return Err(ProcessingError::InvalidInput(format!(
                "{} records at train_fraction {} leave the {} subset empty",
                n, train_fraction, subset
            )));
        }
    }

    Ok((n_train, n_validation, n_test))
}

/// Split a dataset into train, validation and test subsets.
///
/// Test labels are moved into [`HeldOutLabels`] and the test features carry
/// no label column.
///
/// # Errors
///
/// See [`split_sizes`].
pub fn split(dataset: &Dataset, train_fraction: f64, seed: u64) -> Result<DatasetSplit> {
    let (n_train, n_validation, n_test) = split_sizes(dataset.len(), train_fraction)?;

    let mut indices: Vec<usize> = (0..dataset.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let (train_idx, rest) = indices.split_at(n_train);
    let (validation_idx, test_idx) = rest.split_at(n_validation);
    debug!(seed, "Shuffled {} record indices", indices.len());

    let train = dataset.select(train_idx);
    let validation = dataset.select(validation_idx);
    let (test, test_labels) = dataset.select(test_idx).into_parts();

    info!(
        "Split {} records into train={}, validation={}, test={}",
        dataset.len(),
        n_train,
        n_validation,
        n_test
    );

    Ok(DatasetSplit {
        train,
        validation,
        test,
        test_labels: HeldOutLabels::new(test_labels),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureTable;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn numbered_dataset(n: usize) -> Dataset {
        let rows = (0..n).map(|i| vec![i as f64]).collect();
        let table = FeatureTable::new(vec!["id".to_string()], rows).unwrap();
        let labels = (0..n).map(|i| (i % 3).to_string()).collect();
        Dataset::new(table, labels, "target").unwrap()
    }

    fn ids(rows: &[Vec<f64>]) -> Vec<usize> {
        rows.iter().map(|r| r[0] as usize).collect()
    }

    #[test]
    fn test_split_sizes_default_fraction() {
        assert_eq!(split_sizes(150, 0.7).unwrap(), (105, 22, 23));
        assert_eq!(split_sizes(10, 0.8).unwrap(), (8, 1, 1));
    }

    #[test]
    fn test_split_sizes_rejects_bad_fraction() {
        for fraction in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = split_sizes(100, fraction).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CONFIG");
        }
    }

    #[test]
    fn test_split_rejects_empty_dataset() {
        let err = split_sizes(0, 0.7).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_split_rejects_empty_subset() {
        // 2 records at 0.7: train=1, validation=0
        let err = split(&numbered_dataset(2), 0.7, 1).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(err.to_string().contains("validation"));
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = numbered_dataset(60);
        let a = split(&ds, 0.7, 42).unwrap();
        let b = split(&ds, 0.7, 42).unwrap();
        assert_eq!(a, b);

        let c = split(&ds, 0.7, 7).unwrap();
        assert_ne!(ids(a.train.features().rows()), ids(c.train.features().rows()));
    }

    #[test]
    fn test_split_partitions_every_record_once() {
        let ds = numbered_dataset(150);
        let split = split(&ds, 0.7, 42).unwrap();
        assert_eq!(split.sizes(), (105, 22, 23));

        let mut all = ids(split.train.features().rows());
        all.extend(ids(split.validation.features().rows()));
        all.extend(ids(split.test.rows()));
        let unique: HashSet<usize> = all.iter().copied().collect();
        assert_eq!(all.len(), 150);
        assert_eq!(unique.len(), 150);
    }

    #[test]
    fn test_split_keeps_test_labels_aligned() {
        let ds = numbered_dataset(30);
        let split = split(&ds, 0.6, 3).unwrap();
        for (row, label) in split.test.rows().iter().zip(split.test_labels.as_slice()) {
            assert_eq!(((row[0] as usize) % 3).to_string(), *label);
        }
    }
}
