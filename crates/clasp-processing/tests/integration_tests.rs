//! Integration tests for loading, splitting and preprocessing.
//!
//! These tests run the data side of the pipeline end to end on the fixtures
//! in `tests/fixtures`.

use clasp_processing::{
    DatasetSplit, PreprocessingState, ProcessingError, fit_transform, io, split, transform_subset,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn iris_split() -> DatasetSplit {
    let dataset = io::read_dataset(fixtures_path().join("iris.csv"), None).unwrap();
    split(&dataset, 0.7, 42).unwrap()
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_iris() {
    let dataset = io::read_dataset(fixtures_path().join("iris.csv"), None).unwrap();
    assert_eq!(dataset.len(), 150);
    assert_eq!(dataset.features().n_features(), 4);
    assert_eq!(dataset.label_name(), "target");
    assert_eq!(dataset.features().feature_names()[0], "sepal length (cm)");
    assert_eq!(dataset.features().rows()[0], vec![5.1, 3.5, 1.4, 0.2]);
}

#[test]
fn test_load_rejects_missing_values() {
    let err = io::read_dataset(fixtures_path().join("missing_values.csv"), None).unwrap_err();
    assert!(matches!(err, ProcessingError::InvalidInput(_)));
    assert!(err.to_string().contains("'b'"));
}

// ============================================================================
// Splitting
// ============================================================================

#[test]
fn test_iris_split_sizes_and_determinism() {
    let a = iris_split();
    let b = iris_split();
    assert_eq!(a.sizes(), (105, 22, 23));
    assert_eq!(a, b);
    assert_eq!(a.test_labels.len(), 23);
}

#[test]
fn test_split_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let split = iris_split();
    io::write_split(dir.path(), &split).unwrap();

    let validation = io::read_dataset(dir.path().join(io::VALIDATION_FILE), None).unwrap();
    assert_eq!(validation, split.validation);

    let test = io::read_features(dir.path().join(io::TEST_FILE)).unwrap();
    assert_eq!(test, split.test);

    let header = std::fs::read_to_string(dir.path().join(io::TEST_FILE)).unwrap();
    assert!(!header.lines().next().unwrap().contains("target"));
}

// ============================================================================
// Preprocessing
// ============================================================================

#[test]
fn test_transformed_train_is_standardized() {
    let split = iris_split();
    let prepared = fit_transform(&split).unwrap();

    for j in 0..prepared.state.n_features() {
        let column: Vec<f64> = prepared.train.x.iter().map(|r| r[j]).collect();
        let (mean, std) = mean_and_std(&column);
        assert!(mean.abs() < 1e-9, "feature {} mean {}", j, mean);
        assert!((std - 1.0).abs() < 1e-9, "feature {} std {}", j, std);
    }
}

#[test]
fn test_setosa_record_sign_matches_deviation() {
    let split = iris_split();
    let prepared = fit_transform(&split).unwrap();
    let setosa = [5.1, 3.5, 1.4, 0.2];

    let scaled = prepared.state.transform_row(&setosa).unwrap();
    let means = prepared.state.scaler().mean();
    for j in 0..4 {
        assert!(scaled[j].is_finite());
        assert_eq!(scaled[j] > 0.0, setosa[j] > means[j]);
    }
}

#[test]
fn test_constant_feature_scales_to_zero() {
    let dataset = io::read_dataset(fixtures_path().join("constant_feature.csv"), None).unwrap();
    let split = split(&dataset, 0.6, 1).unwrap();
    let prepared = fit_transform(&split).unwrap();

    assert!(prepared.train.x.iter().all(|r| r[1] == 0.0));
    assert!(prepared.validation.x.iter().all(|r| r[1] == 0.0));
    assert_eq!(prepared.state.transform_row(&[3.0, 100.0]).unwrap()[1], 0.0);
}

#[test]
fn test_string_labels_round_trip() {
    let dataset =
        io::read_dataset(fixtures_path().join("iris_species.csv"), Some("species")).unwrap();
    let split = split(&dataset, 0.7, 42).unwrap();
    let state = PreprocessingState::fit(&split.train).unwrap();

    assert_eq!(state.classes(), &["setosa", "versicolor", "virginica"]);
    let encoded = transform_subset(&state, &split.validation).unwrap();
    assert!(encoded.y.iter().all(|&c| c < 3));
    assert_eq!(
        state.decode_labels(&encoded.y).unwrap(),
        split.validation.labels().to_vec()
    );
}

#[test]
fn test_state_survives_json_round_trip() {
    let split = iris_split();
    let state = PreprocessingState::fit(&split.train).unwrap();
    let json = serde_json::to_string(&state).unwrap();
    let restored: PreprocessingState = serde_json::from_str(&json).unwrap();

    assert_eq!(restored, state);
    assert_eq!(
        restored.transform(&split.test).unwrap(),
        state.transform(&split.test).unwrap()
    );
}

#[test]
fn test_transformed_outputs_written() {
    let dir = tempfile::tempdir().unwrap();
    let split = iris_split();
    let prepared = fit_transform(&split).unwrap();

    let (features, target) = io::write_transformed(
        dir.path(),
        "train",
        prepared.state.feature_names(),
        &prepared.train.x,
        &prepared.train.y,
        "target",
    )
    .unwrap();

    let table = io::read_features(&features).unwrap();
    assert_eq!(table.len(), 105);
    let codes = std::fs::read_to_string(&target).unwrap();
    assert_eq!(codes.lines().count(), 106);
}
