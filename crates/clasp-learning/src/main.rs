//! CLI entry point for training, batch prediction and single-record prediction.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clasp_learning::{
    ArtifactStore, BundleHandle, ErrorBody, FileArtifactStore, InferenceService, Kernel,
    ModelFamily, Pipeline, PipelineConfig, SvmGrid, TrainingReport, TrainingRun,
};
use clasp_processing::io;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Tabular classification: split, preprocess, select a model, serve predictions",
    long_about = "Trains a classifier on a labeled CSV by grid search over a random forest and a \
                  support vector machine, persists the winner together with its preprocessing \
                  state, and predicts from that bundle.\n\n\
                  EXAMPLES:\n  \
                  # Train with defaults (70/15/15 split, seed 42, 3-fold CV)\n  \
                  clasp train --input iris.csv --output-dir out\n\n  \
                  # Linear kernel only\n  \
                  clasp train --input iris.csv --kernels linear\n\n  \
                  # Batch predictions\n  \
                  clasp predict --model out/model --input out/data/test.csv --output submission.csv\n\n  \
                  # One request\n  \
                  clasp predict-one --model out/model --record '[5.1, 3.5, 1.4, 0.2]'"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model bundle from a labeled CSV
    Train(TrainArgs),

    /// Predict every row of a features CSV
    Predict {
        /// Bundle directory (or bundle.json path)
        #[arg(short, long)]
        model: PathBuf,

        /// Features CSV with the training feature columns in order
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the single `predictions` column
        #[arg(short, long, default_value = "submission.csv")]
        output: PathBuf,
    },

    /// Answer one JSON request: an object of named features or an array of values
    PredictOne {
        /// Bundle directory (or bundle.json path)
        #[arg(short, long)]
        model: PathBuf,

        /// The request, e.g. '{"petal_length": 1.4, ...}'
        #[arg(short, long)]
        record: String,
    },
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// Labeled CSV file
    #[arg(short, long)]
    input: PathBuf,

    /// Label column (defaults to the last column)
    #[arg(long)]
    label: Option<String>,

    /// Output directory; receives data/ and model/
    #[arg(short, long, default_value = "./outputs")]
    output_dir: PathBuf,

    /// Fraction of records used for training; the rest is halved
    #[arg(long, default_value = "0.7")]
    train_fraction: f64,

    /// Random seed for the split and the models
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Cross-validation folds
    #[arg(long, default_value = "3")]
    cv_folds: usize,

    /// Model families to search, in tie-break order
    #[arg(long, value_delimiter = ',', default_value = "rf,svm")]
    families: Vec<ModelFamily>,

    /// Kernels in the support vector grid
    #[arg(long, value_delimiter = ',', default_value = "linear,rbf")]
    kernels: Vec<Kernel>,

    /// Iteration cap for each support vector machine (defaults to one
    /// scaled by the number of training rows)
    #[arg(long)]
    svm_max_iter: Option<usize>,

    /// Evaluate candidates one at a time instead of on all cores
    #[arg(long)]
    sequential: bool,

    /// Print the training report as JSON instead of a summary
    ///
    /// Disables all logs so stdout carries only JSON.
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let json_output = matches!(&cli.command, Command::Train(args) if args.json)
        || matches!(cli.command, Command::PredictOne { .. });
    init_logging(&cli.log_level, cli.quiet, json_output);

    match cli.command {
        Command::Train(args) => run_train(&args),
        Command::Predict {
            model,
            input,
            output,
        } => run_predict(&model, &input, &output),
        Command::PredictOne { model, record } => Ok(run_predict_one(&model, &record)),
    }
}

fn run_train(args: &TrainArgs) -> Result<ExitCode> {
    let mut builder = PipelineConfig::builder()
        .train_fraction(args.train_fraction)
        .random_seed(args.seed)
        .cv_folds(args.cv_folds)
        .families(args.families.clone())
        .svm_grid(SvmGrid {
            kernel: args.kernels.clone(),
            max_iter: args.svm_max_iter,
            ..SvmGrid::default()
        })
        .parallel(!args.sequential);
    if let Some(label) = &args.label {
        builder = builder.label_column(label.as_str());
    }
    let config = builder.build()?;

    info!("Loading dataset from: {}", args.input.display());
    let pipeline = Pipeline::builder()
        .config(config)
        .on_progress(|update| {
            if update.candidates_completed.is_none() {
                info!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
            }
        })
        .build()?;
    let run = pipeline
        .train_csv(&args.input)
        .with_context(|| format!("Training on {}", args.input.display()))?;

    write_outputs(&args.output_dir, &run)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run.report)?);
    } else {
        print_summary(&run.report, &args.output_dir);
    }
    Ok(ExitCode::SUCCESS)
}

/// Write split files and preprocessing outputs under `data/`, the bundle
/// under `model/`, and the report next to them.
fn write_outputs(output_dir: &Path, run: &TrainingRun) -> Result<()> {
    let data_dir = output_dir.join("data");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Creating {}", data_dir.display()))?;

    io::write_split(&data_dir, &run.split)?;
    let state = &run.prepared.state;
    let label_name = run.split.train.label_name();
    io::write_transformed(
        &data_dir,
        "train",
        state.feature_names(),
        &run.prepared.train.x,
        &run.prepared.train.y,
        label_name,
    )?;
    io::write_transformed(
        &data_dir,
        "validation",
        state.feature_names(),
        &run.prepared.validation.x,
        &run.prepared.validation.y,
        label_name,
    )?;

    let store = FileArtifactStore::new(output_dir.join("model"));
    store.save(&run.bundle)?;

    let report_path = output_dir.join("report.json");
    std::fs::write(&report_path, serde_json::to_vec_pretty(&run.report)?)
        .with_context(|| format!("Writing {}", report_path.display()))?;
    info!("Outputs written to {}", output_dir.display());
    Ok(())
}

fn print_summary(report: &TrainingReport, output_dir: &Path) {
    let selection = &report.selection;
    println!("\n=== Training Summary ===");
    println!(
        "Split:            {} train / {} validation / {} test",
        report.split.train, report.split.validation, report.split.test
    );
    println!("Features:         {}", report.feature_names.join(", "));
    println!("Classes:          {}", report.classes.join(", "));
    println!();
    for family in &selection.family_results {
        println!(
            "  {:<16} best cv accuracy {:.4}  ({} candidates)",
            family.family.as_str(),
            family.best_cv_score,
            family.candidates.len()
        );
    }
    if !selection.failures.is_empty() {
        println!("  {} candidates failed", selection.failures.len());
    }
    println!();
    println!(
        "Selected:         {} {}",
        selection.family,
        serde_json::Value::Object(selection.hyperparameters.clone())
    );
    println!("CV accuracy:      {:.4}", selection.cv_score);
    println!("Validation acc.:  {:.4}", report.validation_metrics.accuracy);
    println!(
        "Test accuracy:    {:.4}  (F1 {:.4})",
        report.test_metrics.accuracy, report.test_metrics.f1_score
    );
    println!("Bundle:           {} ({})", output_dir.join("model").display(), report.fingerprint);
    println!("Time:             {:.2}s", report.training_time_seconds);
}

fn run_predict(model: &Path, input: &Path, output: &Path) -> Result<ExitCode> {
    let service = load_service(model)?;
    let features = io::read_features(input)
        .with_context(|| format!("Reading features from {}", input.display()))?;

    let results = service.predict_table(&features)?;
    let labels: Vec<String> = results.into_iter().map(|r| r.predicted_label).collect();
    io::write_labels(output, "predictions", &labels)?;

    info!("Wrote {} predictions to {}", labels.len(), output.display());
    Ok(ExitCode::SUCCESS)
}

/// Print the JSON response of one request; failures print a structured error
/// and exit non-zero.
fn run_predict_one(model: &Path, record: &str) -> ExitCode {
    let service = match load_service(model) {
        Ok(service) => service,
        Err(e) => return print_error(&error_body(&e)),
    };
    let response = service.handle_json(record);
    match serde_json::to_string_pretty(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Cannot encode response: {}", e),
    }
    if response.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn load_service(model: &Path) -> Result<InferenceService> {
    let store = FileArtifactStore::new(model);
    let service = InferenceService::new();
    service.load(&store, &BundleHandle::Path(model.to_path_buf()))?;
    Ok(service)
}

fn error_body(err: &anyhow::Error) -> ErrorBody {
    match err.downcast_ref::<clasp_learning::LearningError>() {
        Some(e) => ErrorBody::from(e),
        None => ErrorBody {
            code: "INTERNAL".to_string(),
            message: err.to_string(),
        },
    }
}

fn print_error(body: &ErrorBody) -> ExitCode {
    let response = serde_json::json!({ "error": body });
    println!("{}", response);
    ExitCode::FAILURE
}
