//! Grid search with k-fold cross-validation across model families.
//!
//! Every hyperparameter combination of every configured family is scored by
//! mean cross-validated accuracy on the training subset. The best combination
//! of each family is the first one reaching that family's highest mean, and
//! the winner across families is the first family (in configuration order)
//! reaching the highest family score. The winner is then refitted on the whole
//! training subset and scored once on the validation subset; that score is
//! reported but never used for the decision.
//!
//! Candidates are independent, so with `parallel` set they run on the rayon
//! pool. Results are collected in grid order, which keeps the outcome identical
//! to a sequential run.
//!
//! # Example
//!
//! ```rust,ignore
//! use clasp_learning::{ModelSelector, PipelineConfig};
//!
//! let selector = ModelSelector::new(&PipelineConfig::default());
//! let outcome = selector.select(&prepared.state, &prepared.train, &prepared.validation)?;
//! println!("{} ({})", outcome.selected.family, outcome.selected.hyperparameters);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clasp_processing::{EncodedSubset, PreprocessingState};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::cv::{CvScores, KFold, cross_val_score};
use crate::error::{LearningError, Result};
use crate::grid::{ForestGrid, SvmGrid, family_candidates};
use crate::metrics::accuracy;
use crate::models::{Classifier, FittedModel, Hyperparameters, ModelFamily};

/// Called after each candidate finishes with `(completed, total)`.
pub type CandidateCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Cross-validation result of one successful candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub hyperparameters: Hyperparameters,
    pub mean_cv_score: f64,
    pub std_cv_score: f64,
}

/// A candidate whose fit failed in at least one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub family: ModelFamily,
    pub hyperparameters: Hyperparameters,
    pub reason: String,
}

/// Best combination of one family plus every successful candidate's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyResult {
    pub family: ModelFamily,
    pub best_hyperparameters: Hyperparameters,
    pub best_cv_score: f64,
    pub candidates: Vec<CandidateScore>,
}

/// The winning model, fitted on the full training subset.
///
/// Carries the fingerprint of the preprocessing state its training features
/// were transformed with, so it can only be bundled with that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedModel {
    pub family: ModelFamily,
    pub hyperparameters: Hyperparameters,
    /// Mean cross-validated accuracy that won the selection.
    pub cv_score: f64,
    /// Accuracy on the validation subset, for reporting only.
    pub validation_score: f64,
    pub preprocessing_fingerprint: u32,
    pub model: FittedModel,
}

impl SelectedModel {
    /// Hyperparameters keyed by name.
    pub fn hyperparameter_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.hyperparameters.to_map()
    }
}

/// Everything the selector learned in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    pub selected: SelectedModel,
    /// One entry per family with at least one successful candidate, in
    /// configuration order.
    pub family_results: Vec<FamilyResult>,
    pub failures: Vec<CandidateFailure>,
}

/// Scores model families by grid search and picks one winner.
#[derive(Clone)]
pub struct ModelSelector {
    families: Vec<ModelFamily>,
    forest_grid: ForestGrid,
    svm_grid: SvmGrid,
    kfold: KFold,
    seed: u64,
    parallel: bool,
    on_candidate: Option<CandidateCallback>,
}

impl std::fmt::Debug for ModelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSelector")
            .field("families", &self.families)
            .field("forest_grid", &self.forest_grid)
            .field("svm_grid", &self.svm_grid)
            .field("kfold", &self.kfold)
            .field("seed", &self.seed)
            .field("parallel", &self.parallel)
            .field("has_candidate_callback", &self.on_candidate.is_some())
            .finish()
    }
}

impl ModelSelector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            families: config.families.clone(),
            forest_grid: config.forest_grid.clone(),
            svm_grid: config.svm_grid.clone(),
            kfold: KFold::new(config.cv_folds),
            seed: config.random_seed,
            parallel: config.parallel,
            on_candidate: None,
        }
    }

    /// Report candidate completion through `callback`.
    #[must_use]
    pub fn on_candidate(mut self, callback: CandidateCallback) -> Self {
        self.on_candidate = Some(callback);
        self
    }

    /// Every `(family, hyperparameters)` pair in evaluation order.
    pub fn candidates(&self) -> Vec<Hyperparameters> {
        self.families
            .iter()
            .flat_map(|&family| family_candidates(family, &self.forest_grid, &self.svm_grid))
            .collect()
    }

    /// Run the search.
    ///
    /// # Errors
    ///
    /// - [`LearningError::InvalidData`] if the training subset cannot be
    ///   split into the configured folds, or the subsets disagree with the
    ///   preprocessing state
    /// - [`LearningError::NoViableModel`] if every candidate fails
    /// - [`LearningError::Training`] if refitting the winner fails
    pub fn select(
        &self,
        state: &PreprocessingState,
        train: &EncodedSubset,
        validation: &EncodedSubset,
    ) -> Result<SelectionOutcome> {
        let n_classes = state.n_classes();
        check_subset("train", train, state)?;
        check_subset("validation", validation, state)?;
        // Fold count problems are the same for every candidate
        self.kfold.folds(train.len())?;

        let candidates = self.candidates();
        let total = candidates.len();
        info!(
            "Evaluating {} candidates across {} families with {}-fold cross-validation",
            total,
            self.families.len(),
            self.kfold.k()
        );

        let completed = AtomicUsize::new(0);
        let evaluate = |params: &Hyperparameters| {
            let scores = cross_val_score(params, &train.x, &train.y, n_classes, self.kfold, self.seed);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(callback) = &self.on_candidate {
                callback(done, total);
            }
            scores
        };

        let results: Vec<Result<CvScores>> = if self.parallel {
            candidates.par_iter().map(evaluate).collect()
        } else {
            candidates.iter().map(evaluate).collect()
        };

        let mut family_results = Vec::new();
        let mut failures = Vec::new();
        for &family in &self.families {
            let mut scored = Vec::new();
            for (params, result) in candidates.iter().zip(&results) {
                if params.family() != family {
                    continue;
                }
                match result {
                    Ok(scores) => {
                        debug!(
                            family = family.as_str(),
                            "{}: mean={:.4} std={:.4}",
                            params,
                            scores.mean(),
                            scores.std()
                        );
                        scored.push(CandidateScore {
                            hyperparameters: params.clone(),
                            mean_cv_score: scores.mean(),
                            std_cv_score: scores.std(),
                        });
                    }
                    Err(LearningError::Training { reason, .. }) => {
                        warn!("Candidate {} ({}) failed: {}", family, params, reason);
                        failures.push(CandidateFailure {
                            family,
                            hyperparameters: params.clone(),
                            reason: reason.clone(),
                        });
                    }
                    Err(other) => {
                        return Err(LearningError::InvalidData(format!(
                            "evaluating {} ({}): {}",
                            family, params, other
                        )));
                    }
                }
            }

            if let Some(best) = best_candidate(&scored) {
                info!(
                    "Best {}: {} (cv accuracy {:.4})",
                    family, best.hyperparameters, best.mean_cv_score
                );
                family_results.push(FamilyResult {
                    family,
                    best_hyperparameters: best.hyperparameters.clone(),
                    best_cv_score: best.mean_cv_score,
                    candidates: scored,
                });
            }
        }

        let mut winner: Option<&FamilyResult> = None;
        for result in &family_results {
            if winner.is_none_or(|w| result.best_cv_score > w.best_cv_score) {
                winner = Some(result);
            }
        }
        let Some(winner) = winner else {
            return Err(LearningError::NoViableModel { attempted: total });
        };

        let model = FittedModel::fit(
            &winner.best_hyperparameters,
            &train.x,
            &train.y,
            n_classes,
            self.seed,
        )?;
        let validation_score = accuracy(&validation.y, &model.predict(&validation.x));
        info!(
            "Selected {} ({}): cv accuracy {:.4}, validation accuracy {:.4}",
            winner.family, winner.best_hyperparameters, winner.best_cv_score, validation_score
        );

        let selected = SelectedModel {
            family: winner.family,
            hyperparameters: winner.best_hyperparameters.clone(),
            cv_score: winner.best_cv_score,
            validation_score,
            preprocessing_fingerprint: state.fingerprint()?,
            model,
        };

        Ok(SelectionOutcome {
            selected,
            family_results,
            failures,
        })
    }
}

/// First candidate with the highest mean score.
fn best_candidate(scored: &[CandidateScore]) -> Option<&CandidateScore> {
    let mut best: Option<&CandidateScore> = None;
    for candidate in scored {
        if best.is_none_or(|b| candidate.mean_cv_score > b.mean_cv_score) {
            best = Some(candidate);
        }
    }
    best
}

fn check_subset(name: &str, subset: &EncodedSubset, state: &PreprocessingState) -> Result<()> {
    if subset.x.len() != subset.y.len() {
        return Err(LearningError::InvalidData(format!(
            "{} subset has {} feature rows but {} labels",
            name,
            subset.x.len(),
            subset.y.len()
        )));
    }
    if subset.x.iter().any(|row| row.len() != state.n_features()) {
        return Err(LearningError::InvalidData(format!(
            "{} subset rows must have {} features",
            name,
            state.n_features()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Kernel;
    use clasp_processing::{Dataset, FeatureTable, transform_subset};
    use pretty_assertions::assert_eq;

    /// Two interleaved well-separated classes, already in fold-friendly order.
    fn prepared() -> (PreprocessingState, EncodedSubset, EncodedSubset) {
        let rows: Vec<Vec<f64>> = (0..30)
            .map(|i| {
                let base = if i % 2 == 0 { 0.0 } else { 5.0 };
                vec![base + (i % 5) as f64 * 0.1, base - (i % 3) as f64 * 0.1]
            })
            .collect();
        let labels: Vec<String> = (0..30)
            .map(|i| if i % 2 == 0 { "a" } else { "b" }.to_string())
            .collect();
        let features = FeatureTable::new(vec!["x".into(), "y".into()], rows).unwrap();
        let dataset = Dataset::new(features, labels, "label").unwrap();
        let state = PreprocessingState::fit(&dataset).unwrap();
        let encoded = transform_subset(&state, &dataset).unwrap();
        (state, encoded.clone(), encoded)
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::builder()
            .forest_grid(ForestGrid {
                n_estimators: vec![3, 5],
                max_depth: vec![None, Some(2)],
            })
            .svm_grid(SvmGrid {
                c: vec![0.1, 1.0],
                kernel: vec![Kernel::Linear],
                max_iter: None,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_candidates_follow_family_order() {
        let config = PipelineConfig::builder()
            .families(vec![ModelFamily::SupportVector, ModelFamily::RandomForest])
            .build()
            .unwrap();
        let candidates = ModelSelector::new(&config).candidates();
        assert_eq!(candidates.len(), 15);
        assert_eq!(candidates[0].family(), ModelFamily::SupportVector);
        assert_eq!(candidates[6].family(), ModelFamily::RandomForest);
    }

    #[test]
    fn test_first_of_equal_scores_wins() {
        let scored = vec![
            CandidateScore {
                hyperparameters: Hyperparameters::SupportVector { c: 0.1, kernel: Kernel::Linear, max_iter: None },
                mean_cv_score: 1.0,
                std_cv_score: 0.0,
            },
            CandidateScore {
                hyperparameters: Hyperparameters::SupportVector { c: 1.0, kernel: Kernel::Linear, max_iter: None },
                mean_cv_score: 1.0,
                std_cv_score: 0.0,
            },
        ];
        let best = best_candidate(&scored).unwrap();
        assert_eq!(
            best.hyperparameters,
            Hyperparameters::SupportVector { c: 0.1, kernel: Kernel::Linear, max_iter: None }
        );
        assert!(best_candidate(&[]).is_none());
    }

    #[test]
    fn test_select_prefers_first_family_on_tie() {
        let (state, train, validation) = prepared();
        let outcome = ModelSelector::new(&small_config())
            .select(&state, &train, &validation)
            .unwrap();

        // both families separate the data perfectly
        assert_eq!(outcome.family_results.len(), 2);
        assert!(outcome.family_results.iter().all(|r| r.best_cv_score == 1.0));
        assert_eq!(outcome.selected.family, ModelFamily::RandomForest);
        assert_eq!(
            outcome.selected.hyperparameters,
            Hyperparameters::RandomForest {
                n_estimators: 3,
                max_depth: None
            }
        );
        assert_eq!(outcome.selected.validation_score, 1.0);
        assert_eq!(outcome.selected.preprocessing_fingerprint, state.fingerprint().unwrap());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let (state, train, validation) = prepared();
        let parallel = ModelSelector::new(&small_config())
            .select(&state, &train, &validation)
            .unwrap();

        let mut config = small_config();
        config.parallel = false;
        let sequential = ModelSelector::new(&config)
            .select(&state, &train, &validation)
            .unwrap();

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_candidate_callback_counts_every_candidate() {
        let (state, train, validation) = prepared();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        ModelSelector::new(&small_config())
            .on_candidate(Arc::new(move |_, total| {
                assert_eq!(total, 6);
                counter.fetch_add(1, Ordering::Relaxed);
            }))
            .select(&state, &train, &validation)
            .unwrap();
        assert_eq!(seen.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_all_candidates_failing_is_no_viable_model() {
        let (state, mut train, validation) = prepared();
        // sort by class so the first fold's training part holds one class only
        let mut order: Vec<usize> = (0..train.len()).collect();
        order.sort_by_key(|&i| train.y[i]);
        train = EncodedSubset {
            x: order.iter().map(|&i| train.x[i].clone()).collect(),
            y: order.iter().map(|&i| train.y[i]).collect(),
        };

        let config = PipelineConfig::builder().cv_folds(2).build().unwrap();
        let err = ModelSelector::new(&config)
            .select(&state, &train, &validation)
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_VIABLE_MODEL");
        assert!(err.to_string().contains("15"));
    }

    #[test]
    fn test_unconverged_svm_candidates_are_failures() {
        let (state, train, validation) = prepared();
        let mut config = small_config();
        config.svm_grid.max_iter = Some(1);
        let outcome = ModelSelector::new(&config)
            .select(&state, &train, &validation)
            .unwrap();

        assert_eq!(outcome.failures.len(), 2);
        for failure in &outcome.failures {
            assert_eq!(failure.family, ModelFamily::SupportVector);
            assert!(failure.reason.contains("did not converge"), "{}", failure.reason);
        }
        assert_eq!(outcome.family_results.len(), 1);
        assert_eq!(outcome.family_results[0].family, ModelFamily::RandomForest);
        assert_eq!(outcome.selected.family, ModelFamily::RandomForest);
    }

    #[test]
    fn test_too_few_samples_for_folds() {
        let (state, train, validation) = prepared();
        let config = PipelineConfig::builder().cv_folds(31).build().unwrap();
        let err = ModelSelector::new(&config)
            .select(&state, &train, &validation)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_selected_model_hyperparameter_map() {
        let (state, train, validation) = prepared();
        let config = PipelineConfig::builder()
            .families(vec![ModelFamily::SupportVector])
            .svm_grid(SvmGrid {
                c: vec![1.0],
                kernel: vec![Kernel::Rbf],
                max_iter: None,
            })
            .build()
            .unwrap();
        let outcome = ModelSelector::new(&config)
            .select(&state, &train, &validation)
            .unwrap();
        let map = outcome.selected.hyperparameter_map();
        assert_eq!(map["kernel"], "rbf");
        assert_eq!(map["c"], 1.0);
    }
}
