//! The inference service: strict-schema predictions from one active bundle.
//!
//! [`InferenceService`] starts unloaded and serves predictions once a bundle
//! is loaded or installed. The active bundle sits behind an
//! `RwLock<Option<Arc<ModelBundle>>>`: a prediction clones the `Arc` under a
//! short read lock and runs without holding it, and a reload swaps the `Arc`
//! under the write lock. In-flight predictions finish on the bundle they
//! started with.
//!
//! Requests are validated against the bundle's feature schema. A named record
//! must carry exactly the fitted feature names; an ordered record must have
//! exactly as many values as there are features. Nothing is dropped, filled
//! in or guessed.
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_learning::{FileArtifactStore, InferenceService, RawRecord};
//!
//! let store = FileArtifactStore::new("out/model");
//! let service = InferenceService::new();
//! service.load(&store, &store.handle())?;
//!
//! let result = service.predict(&RawRecord::Ordered(vec![5.1, 3.5, 1.4, 0.2]))?;
//! println!("{}", result.predicted_label);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use clasp_processing::{FeatureTable, ProcessingError};
use parking_lot::RwLock;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bundle::ModelBundle;
use crate::error::{LearningError, Result};
use crate::models::{Classifier, argmax};
use crate::store::{ArtifactStore, BundleHandle};
use crate::types::{ModelInfo, PredictionResult};

/// One inference request.
///
/// Deserializes from a JSON object into [`Named`](Self::Named) or from a JSON
/// array into [`Ordered`](Self::Ordered). An object that repeats a key is
/// rejected rather than keeping one of the values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawRecord {
    /// Feature values keyed by feature name.
    Named(HashMap<String, f64>),
    /// Feature values in schema order.
    Ordered(Vec<f64>),
}

impl RawRecord {
    /// Number of values carried by the record.
    pub fn len(&self) -> usize {
        match self {
            RawRecord::Named(map) => map.len(),
            RawRecord::Ordered(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let body = RequestBody::deserialize(deserializer)?;
        RawRecord::try_from(body).map_err(de::Error::custom)
    }
}

/// A request body as written, before duplicate keys are checked.
#[derive(Debug)]
enum RequestBody {
    Named(Vec<(String, f64)>),
    Ordered(Vec<f64>),
}

impl RequestBody {
    fn len(&self) -> usize {
        match self {
            RequestBody::Named(entries) => entries.len(),
            RequestBody::Ordered(values) => values.len(),
        }
    }
}

impl<'de> Deserialize<'de> for RequestBody {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BodyVisitor;

        impl<'de> Visitor<'de> for BodyVisitor {
            type Value = RequestBody;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of numeric feature values or an array of numbers")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, f64>()? {
                    entries.push(entry);
                }
                Ok(RequestBody::Named(entries))
            }

            fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(value) = seq.next_element::<f64>()? {
                    values.push(value);
                }
                Ok(RequestBody::Ordered(values))
            }
        }

        deserializer.deserialize_any(BodyVisitor)
    }
}

impl TryFrom<RequestBody> for RawRecord {
    type Error = LearningError;

    fn try_from(body: RequestBody) -> Result<Self> {
        match body {
            RequestBody::Ordered(values) => Ok(RawRecord::Ordered(values)),
            RequestBody::Named(entries) => {
                let mut values = HashMap::with_capacity(entries.len());
                let mut repeated: Vec<String> = Vec::new();
                for (name, value) in entries {
                    if values.contains_key(&name) {
                        if !repeated.contains(&name) {
                            repeated.push(name);
                        }
                    } else {
                        values.insert(name, value);
                    }
                }
                if !repeated.is_empty() {
                    return Err(LearningError::SchemaMismatch(format!(
                        "duplicate features [{}]",
                        repeated.join(", ")
                    )));
                }
                Ok(RawRecord::Named(values))
            }
        }
    }
}

/// Whether a bundle is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Unloaded,
    Loaded,
}

/// `{code, message}` of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&LearningError> for ErrorBody {
    fn from(err: &LearningError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Response of [`InferenceService::handle_json()`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Prediction {
        #[serde(rename = "predictedLabel")]
        predicted_label: String,
        probabilities: BTreeMap<String, f64>,
        confidence: f64,
    },
    Error {
        error: ErrorBody,
    },
}

impl PredictionResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, PredictionResponse::Error { .. })
    }
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        PredictionResponse::Prediction {
            predicted_label: result.predicted_label,
            probabilities: result.probabilities,
            confidence: result.confidence,
        }
    }
}

/// Serves predictions from a single active [`ModelBundle`].
#[derive(Debug, Default)]
pub struct InferenceService {
    active: RwLock<Option<Arc<ModelBundle>>>,
}

impl InferenceService {
    /// An unloaded service.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service already serving `bundle`.
    pub fn with_bundle(bundle: ModelBundle) -> Self {
        Self {
            active: RwLock::new(Some(Arc::new(bundle))),
        }
    }

    /// Load a bundle from `store` and make it active.
    ///
    /// On failure the previously active bundle, if any, keeps serving.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::BundleNotFound`] or
    /// [`LearningError::BundleCorrupt`] from the store.
    pub fn load(&self, store: &dyn ArtifactStore, handle: &BundleHandle) -> Result<ModelInfo> {
        let bundle = store.load(handle).inspect_err(|e| {
            warn!("Cannot load bundle from {}: {}", handle, e);
        })?;
        let info = bundle.info();
        self.install(bundle);
        info!(
            "Serving {} bundle {} ({} features, {} classes)",
            info.family,
            info.fingerprint,
            info.feature_names.len(),
            info.classes.len()
        );
        Ok(info)
    }

    /// Make `bundle` active, replacing any previous one.
    pub fn install(&self, bundle: ModelBundle) {
        let bundle = Arc::new(bundle);
        *self.active.write() = Some(bundle);
    }

    /// Drop the active bundle. Returns whether one was loaded.
    pub fn unload(&self) -> bool {
        self.active.write().take().is_some()
    }

    pub fn status(&self) -> ServiceStatus {
        if self.active.read().is_some() {
            ServiceStatus::Loaded
        } else {
            ServiceStatus::Unloaded
        }
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.active.read().as_ref().map(|bundle| bundle.info())
    }

    /// The active bundle.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::NotLoaded`] if no bundle is active.
    pub fn bundle(&self) -> Result<Arc<ModelBundle>> {
        self.active.read().clone().ok_or(LearningError::NotLoaded)
    }

    /// Predict one record.
    ///
    /// # Errors
    ///
    /// - [`LearningError::NotLoaded`] if no bundle is active
    /// - a schema mismatch if the record's features differ from the bundle's
    /// - invalid input if a value is not finite
    pub fn predict(&self, record: &RawRecord) -> Result<PredictionResult> {
        let bundle = self.bundle()?;
        predict_with(&bundle, record)
    }

    /// Predict several records against one bundle snapshot.
    ///
    /// Fails as a whole on the first invalid record, naming its index.
    pub fn predict_batch(&self, records: &[RawRecord]) -> Result<Vec<PredictionResult>> {
        let bundle = self.bundle()?;
        let results = records
            .iter()
            .enumerate()
            .map(|(i, record)| predict_with(&bundle, record).map_err(|e| at_record(i, e)))
            .collect::<Result<Vec<_>>>()?;
        debug!("Predicted {} records", results.len());
        Ok(results)
    }

    /// Predict every row of a feature table.
    ///
    /// The table's columns must be the bundle's features in schema order.
    pub fn predict_table(&self, table: &FeatureTable) -> Result<Vec<PredictionResult>> {
        let bundle = self.bundle()?;
        if table.feature_names() != bundle.feature_names() {
            return Err(LearningError::SchemaMismatch(format!(
                "table columns [{}] do not match model features [{}]",
                table.feature_names().join(", "),
                bundle.feature_names().join(", ")
            )));
        }
        let results = table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| {
                predict_with(&bundle, &RawRecord::Ordered(row.clone())).map_err(|e| at_record(i, e))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Predicted {} table rows", results.len());
        Ok(results)
    }

    /// Answer one JSON request body.
    ///
    /// The body is parsed here rather than taken as a parsed value so that a
    /// key repeated inside the object is still visible and can be rejected as
    /// a schema mismatch.
    ///
    /// Never fails: any error becomes a structured `{"error": {code, message}}`
    /// response and the service keeps serving.
    pub fn handle_json(&self, request: &str) -> PredictionResponse {
        let body = serde_json::from_str::<RequestBody>(request).map_err(|_| {
            LearningError::InvalidData(
                "request must be an object of numeric feature values or an array of numbers"
                    .to_string(),
            )
        });
        let n_values = body.as_ref().map_or(0, RequestBody::len);
        let outcome = body
            .and_then(RawRecord::try_from)
            .and_then(|record| self.predict(&record));

        match outcome {
            Ok(result) => result.into(),
            Err(err) => {
                warn!(
                    code = err.error_code(),
                    features = n_values,
                    "Rejected prediction request"
                );
                PredictionResponse::Error {
                    error: ErrorBody::from(&err),
                }
            }
        }
    }
}

fn predict_with(bundle: &ModelBundle, record: &RawRecord) -> Result<PredictionResult> {
    let state = bundle.preprocessing();
    let input = match record {
        RawRecord::Named(values) => state.order_named(values)?,
        RawRecord::Ordered(values) => {
            if values.len() != state.n_features() {
                return Err(LearningError::SchemaMismatch(format!(
                    "expected {} feature values, got {}",
                    state.n_features(),
                    values.len()
                )));
            }
            values.clone()
        }
    };

    let scaled = state.transform_row(&input)?;
    let proba = bundle.model().model.predict_proba_row(&scaled);
    let code = argmax(&proba);
    let predicted_label = state.decode_label(code)?.to_string();

    let probabilities = state
        .classes()
        .iter()
        .cloned()
        .zip(proba.iter().copied())
        .collect();

    Ok(PredictionResult {
        input,
        predicted_label,
        probabilities,
        confidence: proba[code],
    })
}

fn at_record(index: usize, err: LearningError) -> LearningError {
    match err {
        LearningError::SchemaMismatch(msg)
        | LearningError::Processing(ProcessingError::SchemaMismatch(msg)) => {
            LearningError::SchemaMismatch(format!("record {}: {}", index, msg))
        }
        LearningError::Processing(ProcessingError::InvalidInput(msg)) => {
            LearningError::InvalidData(format!("record {}: {}", index, msg))
        }
        other => other,
    }
}

static_assertions::assert_impl_all!(InferenceService: Send, Sync);
