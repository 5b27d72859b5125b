//! Integration tests for selection, bundle persistence and inference.
//!
//! These tests train on `tests/fixtures/iris.csv` (150 records, 4 features,
//! 3 classes) and exercise the bundle through both artifact stores and the
//! inference service.

use clasp_learning::{
    ArtifactStore, BundleHandle, FileArtifactStore, ForestGrid, InferenceService, Kernel,
    LearningError, MemoryArtifactStore, ModelBundle, ModelFamily, Pipeline, PipelineConfig,
    RawRecord, ServiceStatus, SvmGrid, TrainingRun,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

const SETOSA: [f64; 4] = [5.1, 3.5, 1.4, 0.2];

fn feature_names() -> Vec<String> {
    [
        "sepal length (cm)",
        "sepal width (cm)",
        "petal length (cm)",
        "petal width (cm)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn small_config() -> PipelineConfig {
    PipelineConfig::builder()
        .forest_grid(ForestGrid {
            n_estimators: vec![10, 25],
            max_depth: vec![None, Some(3)],
        })
        .svm_grid(SvmGrid {
            c: vec![0.1, 1.0],
            kernel: vec![Kernel::Linear, Kernel::Rbf],
            max_iter: None,
        })
        .build()
        .unwrap()
}

fn train(config: PipelineConfig) -> TrainingRun {
    Pipeline::builder()
        .config(config)
        .build()
        .unwrap()
        .train_csv(fixtures_path().join("iris.csv"))
        .unwrap()
}

/// One shared run with the small grid; training is the slow part.
fn iris_run() -> &'static TrainingRun {
    static RUN: OnceLock<TrainingRun> = OnceLock::new();
    RUN.get_or_init(|| train(small_config()))
}

fn named(values: &[f64]) -> RawRecord {
    RawRecord::Named(feature_names().into_iter().zip(values.iter().copied()).collect())
}

// ============================================================================
// Training
// ============================================================================

#[test]
fn test_iris_end_to_end_with_default_grids() {
    let run = train(PipelineConfig::default());
    let report = &run.report;

    assert_eq!(
        (report.split.train, report.split.validation, report.split.test),
        (105, 22, 23)
    );
    assert_eq!(report.classes, vec!["0", "1", "2"]);
    assert_eq!(report.feature_names, feature_names());
    assert!(report.selection.failures.is_empty());
    assert_eq!(report.selection.family_results.len(), 2);
    assert_eq!(
        report
            .selection
            .family_results
            .iter()
            .map(|r| r.candidates.len())
            .sum::<usize>(),
        15
    );
    assert!(report.selection.cv_score > 0.85);
    assert!(report.test_metrics.accuracy > 0.85);
    assert_eq!(report.test_metrics.support, 23);
}

#[test]
fn test_setosa_record_scaling_and_prediction() {
    let run = iris_run();
    let state = &run.prepared.state;
    let scaled = state.transform_row(&SETOSA).unwrap();

    for (i, value) in scaled.iter().enumerate() {
        assert!(value.is_finite());
        let deviation = SETOSA[i] - state.scaler().mean()[i];
        assert_eq!(value.signum(), deviation.signum(), "feature {}", i);
    }

    let service = InferenceService::with_bundle(run.bundle.clone());
    let result = service.predict(&RawRecord::Ordered(SETOSA.to_vec())).unwrap();
    assert_eq!(result.predicted_label, "0");
    assert!(run.report.classes.contains(&result.predicted_label));
    assert_eq!(result.probabilities.len(), 3);
    assert!((result.probabilities.values().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn test_selection_is_deterministic() {
    let mut sequential = small_config();
    sequential.parallel = false;

    let a = iris_run();
    let b = train(sequential);
    assert_eq!(a.split, b.split);
    assert_eq!(a.report.selection, b.report.selection);
    assert_eq!(a.bundle.model(), b.bundle.model());
}

#[test]
fn test_family_order_breaks_ties() {
    let config = PipelineConfig::builder()
        .families(vec![ModelFamily::SupportVector, ModelFamily::RandomForest])
        .forest_grid(ForestGrid {
            n_estimators: vec![10],
            max_depth: vec![None],
        })
        .svm_grid(SvmGrid {
            c: vec![1.0],
            kernel: vec![Kernel::Linear],
            max_iter: None,
        })
        .build()
        .unwrap();
    let run = train(config);
    let results = &run.report.selection.family_results;

    assert_eq!(results[0].family, ModelFamily::SupportVector);
    let best = results
        .iter()
        .map(|r| r.best_cv_score)
        .fold(f64::MIN, f64::max);
    let first_best = results.iter().find(|r| r.best_cv_score == best).unwrap();
    assert_eq!(run.report.selection.family, first_best.family);
}

// ============================================================================
// Artifact Stores
// ============================================================================

#[test]
fn test_save_then_load_gives_identical_predictions() {
    let run = iris_run();
    let dir = tempfile::tempdir().unwrap();
    let store = FileArtifactStore::new(dir.path().join("model"));

    let handle = store.save(&run.bundle).unwrap();
    let loaded = store.load(&handle).unwrap();
    assert_eq!(loaded, run.bundle);

    let before = InferenceService::with_bundle(run.bundle.clone());
    let after = InferenceService::new();
    after.load(&store, &handle).unwrap();

    let test = &run.split.test;
    assert_eq!(
        before.predict_table(test).unwrap(),
        after.predict_table(test).unwrap()
    );
}

#[test]
fn test_memory_store_round_trip() {
    let run = iris_run();
    let store = MemoryArtifactStore::new();
    let handle = store.save(&run.bundle).unwrap();
    assert_eq!(handle, BundleHandle::Memory);
    assert_eq!(store.load(&handle).unwrap().fingerprint(), run.bundle.fingerprint());
}

#[test]
fn test_load_failures_keep_service_unloaded() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileArtifactStore::new(dir.path());
    let service = InferenceService::new();

    let err = service.load(&store, &store.handle()).unwrap_err();
    assert!(matches!(err, LearningError::BundleNotFound { .. }));

    std::fs::write(store.bundle_path(), b"not a bundle").unwrap();
    let err = service.load(&store, &store.handle()).unwrap_err();
    assert!(matches!(err, LearningError::BundleCorrupt(_)));
    assert_eq!(service.status(), ServiceStatus::Unloaded);
}

#[test]
fn test_bundle_rejects_state_from_another_run() {
    let run = iris_run();
    let other = train(
        PipelineConfig::builder()
            .random_seed(7)
            .families(vec![ModelFamily::SupportVector])
            .svm_grid(SvmGrid {
                c: vec![1.0],
                kernel: vec![Kernel::Linear],
                max_iter: None,
            })
            .build()
            .unwrap(),
    );

    let err = ModelBundle::new(other.prepared.state.clone(), run.bundle.model().clone()).unwrap_err();
    assert_eq!(err.error_code(), "INCONSISTENT_BUNDLE");
}

// ============================================================================
// Inference
// ============================================================================

#[test]
fn test_named_record_matches_ordered_record() {
    let service = InferenceService::with_bundle(iris_run().bundle.clone());
    let by_name = service.predict(&named(&SETOSA)).unwrap();
    let by_order = service.predict(&RawRecord::Ordered(SETOSA.to_vec())).unwrap();
    assert_eq!(by_name, by_order);
}

#[test]
fn test_schema_mismatch_is_rejected() {
    let service = InferenceService::with_bundle(iris_run().bundle.clone());

    let mut missing: HashMap<String, f64> = feature_names().into_iter().zip(SETOSA).collect();
    missing.remove("petal width (cm)");
    let err = service.predict(&RawRecord::Named(missing)).unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    assert!(err.to_string().contains("petal width (cm)"));

    let mut extra: HashMap<String, f64> = feature_names().into_iter().zip(SETOSA).collect();
    extra.insert("colour".to_string(), 1.0);
    let err = service.predict(&RawRecord::Named(extra)).unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_MISMATCH");

    let err = service.predict(&RawRecord::Ordered(vec![5.1, 3.5, 1.4])).unwrap_err();
    assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
}

#[test]
fn test_json_request_boundary() {
    let service = InferenceService::new();
    let request = json!({
        "sepal length (cm)": 5.1,
        "sepal width (cm)": 3.5,
        "petal length (cm)": 1.4,
        "petal width (cm)": 0.2
    })
    .to_string();

    let response = serde_json::to_value(service.handle_json(&request)).unwrap();
    assert_eq!(response["error"]["code"], "NOT_LOADED");

    service.install(iris_run().bundle.clone());
    let response = serde_json::to_value(service.handle_json(&request)).unwrap();
    assert_eq!(response["predictedLabel"], "0");
    assert_eq!(response["probabilities"].as_object().unwrap().len(), 3);

    let response = serde_json::to_value(service.handle_json(r#"{"petal length (cm)": 1.4}"#)).unwrap();
    assert_eq!(response["error"]["code"], "SCHEMA_MISMATCH");

    let repeated = r#"{
        "sepal length (cm)": 5.1,
        "sepal width (cm)": 3.5,
        "petal length (cm)": 1.4,
        "petal length (cm)": 6.0,
        "petal width (cm)": 0.2
    }"#;
    let response = serde_json::to_value(service.handle_json(repeated)).unwrap();
    assert_eq!(response["error"]["code"], "SCHEMA_MISMATCH");
}

#[test]
fn test_concurrent_predictions_match_serial() {
    let run = iris_run();
    let service = Arc::new(InferenceService::with_bundle(run.bundle.clone()));
    let records: Vec<RawRecord> = (0..100)
        .map(|i| {
            let row = &run.split.test.rows()[i % run.split.test.len()];
            if i % 2 == 0 {
                RawRecord::Ordered(row.clone())
            } else {
                named(row)
            }
        })
        .collect();

    let serial: Vec<_> = records.iter().map(|r| service.predict(r).unwrap()).collect();

    let concurrent: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = records
            .iter()
            .map(|record| {
                let service = Arc::clone(&service);
                scope.spawn(move || service.predict(record).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(concurrent, serial);
}

#[test]
fn test_reload_while_serving() {
    let run = iris_run();
    let service = Arc::new(InferenceService::with_bundle(run.bundle.clone()));
    let expected = service.predict(&RawRecord::Ordered(SETOSA.to_vec())).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let service = Arc::clone(&service);
            let expected = expected.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    let result = service.predict(&RawRecord::Ordered(SETOSA.to_vec())).unwrap();
                    assert_eq!(result, expected);
                }
            });
        }
        for _ in 0..20 {
            service.install(run.bundle.clone());
        }
    });

    assert_eq!(service.status(), ServiceStatus::Loaded);
}
