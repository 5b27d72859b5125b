//! CSV loading and writing.
//!
//! Datasets are read with polars: a header row names every column, the label
//! column defaults to the last one, and every other column must be numeric
//! without nulls. The writers produce the file layout used between pipeline
//! stages (`train.csv`, `validation.csv`, `test.csv`, `test_target.csv`, and
//! `<name>_features.csv` / `<name>_target.csv` for transformed data).

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::dataset::{Dataset, DatasetSplit, FeatureTable};
use crate::error::{ProcessingError, Result, ResultExt};
use crate::utils::is_numeric_dtype;

/// File names written by [`write_split`].
pub const TRAIN_FILE: &str = "train.csv";
pub const VALIDATION_FILE: &str = "validation.csv";
pub const TEST_FILE: &str = "test.csv";
pub const TEST_TARGET_FILE: &str = "test_target.csv";

fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(ProcessingError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .context(format!("Reading {}", path.display()))?;
    debug!("Read {} rows x {} columns from {}", df.height(), df.width(), path.display());
    Ok(df)
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df
        .column(name)
        .map_err(|_| ProcessingError::ColumnNotFound(name.to_string()))?
        .as_materialized_series();

    if !is_numeric_dtype(series.dtype()) {
        return Err(ProcessingError::InvalidInput(format!(
            "feature column '{}' is not numeric (found {})",
            name,
            series.dtype()
        )));
    }
    if series.null_count() > 0 {
        return Err(ProcessingError::InvalidInput(format!(
            "feature column '{}' has {} missing values",
            name,
            series.null_count()
        )));
    }

    let floats = series.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_no_null_iter().collect())
}

fn read_label_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let series = df
        .column(name)
        .map_err(|_| ProcessingError::ColumnNotFound(name.to_string()))?
        .as_materialized_series();
    if series.null_count() > 0 {
        return Err(ProcessingError::InvalidInput(format!(
            "label column '{}' has {} missing values",
            name,
            series.null_count()
        )));
    }
    let strings = series.cast(&DataType::String)?;
    Ok(strings
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn feature_table(df: &DataFrame, names: Vec<String>) -> Result<FeatureTable> {
    let columns = names
        .iter()
        .map(|n| numeric_column(df, n))
        .collect::<Result<Vec<_>>>()?;
    let rows = (0..df.height())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect();
    FeatureTable::new(names, rows)
}

/// Read a labeled dataset.
///
/// `label_column` defaults to the last column. Labels are read as strings, so
/// integer labels become `"0"`, `"1"`, and so on.
///
/// # Errors
///
/// Returns [`ProcessingError::ColumnNotFound`] for an unknown label column and
/// [`ProcessingError::InvalidInput`] when the file has no records, fewer than
/// two columns, or a non-numeric or incomplete feature column.
pub fn read_dataset(path: impl AsRef<Path>, label_column: Option<&str>) -> Result<Dataset> {
    let path = path.as_ref();
    let df = read_csv(path)?;

    if df.height() == 0 {
        return Err(ProcessingError::InvalidInput(format!(
            "{} contains no records",
            path.display()
        )));
    }
    let columns: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
    if columns.len() < 2 {
        return Err(ProcessingError::InvalidInput(format!(
            "{} needs at least one feature column and one label column",
            path.display()
        )));
    }

    let label_name = match label_column {
        Some(name) if columns.iter().any(|c| c == name) => name.to_string(),
        Some(name) => return Err(ProcessingError::ColumnNotFound(name.to_string())),
        None => columns[columns.len() - 1].clone(),
    };
    let feature_names: Vec<String> = columns.into_iter().filter(|c| *c != label_name).collect();

    let features = feature_table(&df, feature_names)?;
    let labels = read_label_column(&df, &label_name)?;
    let dataset = Dataset::new(features, labels, label_name)?;

    info!(
        "Loaded {} records with {} features from {}",
        dataset.len(),
        dataset.features().n_features(),
        path.display()
    );
    Ok(dataset)
}

/// Read an unlabeled feature table (every column is a feature).
pub fn read_features(path: impl AsRef<Path>) -> Result<FeatureTable> {
    let path = path.as_ref();
    let df = read_csv(path)?;
    let names = df.get_column_names().iter().map(|c| c.to_string()).collect();
    feature_table(&df, names)
}

fn write_frame(path: &Path, columns: Vec<Column>) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context(format!("Creating {}", parent.display()))?;
    }
    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(path).context(format!("Creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)
        .context(format!("Writing {}", path.display()))?;
    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}

fn feature_columns(features: &FeatureTable) -> Vec<Column> {
    features
        .feature_names()
        .iter()
        .enumerate()
        .map(|(i, name)| Column::from(Series::new(name.as_str().into(), features.column(i))))
        .collect()
}

fn string_column(name: &str, values: &[String]) -> Column {
    Column::from(Series::new(name.into(), values.to_vec()))
}

/// Write features only.
pub fn write_features(path: impl AsRef<Path>, features: &FeatureTable) -> Result<()> {
    write_frame(path.as_ref(), feature_columns(features))
}

/// Write a labeled dataset (features followed by the label column).
pub fn write_dataset(path: impl AsRef<Path>, dataset: &Dataset) -> Result<()> {
    let mut columns = feature_columns(dataset.features());
    columns.push(string_column(dataset.label_name(), dataset.labels()));
    write_frame(path.as_ref(), columns)
}

/// Write a single column of labels.
pub fn write_labels(path: impl AsRef<Path>, column: &str, labels: &[String]) -> Result<()> {
    write_frame(path.as_ref(), vec![string_column(column, labels)])
}

/// Write a single column of integer label codes.
pub fn write_codes(path: impl AsRef<Path>, column: &str, codes: &[usize]) -> Result<()> {
    let values: Vec<u32> = codes.iter().map(|&c| c as u32).collect();
    write_frame(
        path.as_ref(),
        vec![Column::from(Series::new(column.into(), values))],
    )
}

/// Write the three subsets of a split into `dir`.
///
/// The test features and test labels go to separate files so the label
/// column never appears next to the test features.
pub fn write_split(dir: impl AsRef<Path>, split: &DatasetSplit) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let label_name = split.train.label_name();
    let paths = vec![
        dir.join(TRAIN_FILE),
        dir.join(VALIDATION_FILE),
        dir.join(TEST_FILE),
        dir.join(TEST_TARGET_FILE),
    ];

    write_dataset(&paths[0], &split.train)?;
    write_dataset(&paths[1], &split.validation)?;
    write_features(&paths[2], &split.test)?;
    write_labels(&paths[3], label_name, split.test_labels.as_slice())?;

    info!("Split files written to {}", dir.display());
    Ok(paths)
}

/// Write transformed features and encoded labels as
/// `<name>_features.csv` and `<name>_target.csv`.
pub fn write_transformed(
    dir: impl AsRef<Path>,
    name: &str,
    feature_names: &[String],
    x: &[Vec<f64>],
    codes: &[usize],
    label_name: &str,
) -> Result<(PathBuf, PathBuf)> {
    let dir = dir.as_ref();
    let features = FeatureTable::new(feature_names.to_vec(), x.to_vec())?;
    let features_path = dir.join(format!("{}_features.csv", name));
    let target_path = dir.join(format!("{}_target.csv", name));

    write_features(&features_path, &features)?;
    write_codes(&target_path, label_name, codes)?;
    Ok((features_path, target_path))
}
