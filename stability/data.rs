//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for user-provided data. It reads a
//! delimited table, validates the columns named by the analysis against a strict
//! schema, and hands the statistical core clean `ndarray` structures.
//!
//! - Strict Schema: every outcome and predictor column must exist, be numeric,
//!   finite and complete. Nothing is imputed or dropped.
//! - User-Centric Errors: failures are assumed to be user-input errors and the
//!   `DataError` enum names the offending column.
//! - Projection: only the columns the analysis needs are kept after validation.

use ahash::AHashMap;
use ndarray::{Array1, Array2, ArrayView1};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A validated, complete table: one outcome vector plus named numeric columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    outcome_name: String,
    y: Array1<f64>,
    /// Shape: [n_rows, n_columns], columns in the order they were supplied.
    columns: Array2<f64>,
    index: AHashMap<String, usize>,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Complete data with no missing values is required."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. All data must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error(
        "Input contains only {found} data rows, but at least {required} are needed to fit the full model."
    )]
    InsufficientRows { found: usize, required: usize },
    #[error("Column '{column_name}' has {found} rows, but the outcome has {expected}.")]
    LengthMismatch {
        column_name: String,
        found: usize,
        expected: usize,
    },
    #[error("Column '{0}' was supplied more than once.")]
    DuplicateColumn(String),
}

impl Dataset {
    /// Builds a dataset from in-memory columns, applying the same validation as the file loader.
    pub fn from_columns(
        outcome_name: &str,
        y: Array1<f64>,
        columns: Vec<(String, Array1<f64>)>,
    ) -> Result<Self, DataError> {
        validate_is_finite(y.iter().copied(), outcome_name)?;
        let n = y.len();
        let k = columns.len();

        let mut index = AHashMap::with_capacity(k);
        let mut matrix = Array2::zeros((n, k));
        for (position, (name, values)) in columns.into_iter().enumerate() {
            if name == outcome_name || index.insert(name.clone(), position).is_some() {
                return Err(DataError::DuplicateColumn(name));
            }
            if values.len() != n {
                return Err(DataError::LengthMismatch {
                    column_name: name,
                    found: values.len(),
                    expected: n,
                });
            }
            validate_is_finite(values.iter().copied(), &name)?;
            matrix.column_mut(position).assign(&values);
        }

        Ok(Self {
            outcome_name: outcome_name.to_string(),
            y,
            columns: matrix,
            index,
        })
    }

    pub fn outcome_name(&self) -> &str {
        &self.outcome_name
    }

    pub fn outcome(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|j| self.columns.column(j))
    }

    /// Gathers the named columns, in the given order, into a fresh `[n_rows, names.len()]` matrix.
    pub fn select_columns(&self, names: &[String]) -> Result<Array2<f64>, DataError> {
        let mut out = Array2::zeros((self.n_rows(), names.len()));
        for (target, name) in names.iter().enumerate() {
            let source = self
                .column(name)
                .ok_or_else(|| DataError::ColumnNotFound(name.clone()))?;
            out.column_mut(target).assign(&source);
        }
        Ok(out)
    }
}

fn validate_is_finite(
    values: impl IntoIterator<Item = f64>,
    column_name: &str,
) -> Result<(), DataError> {
    if values.into_iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(())
}

/// Loads a delimited file and validates the outcome and predictor columns.
///
/// Only `outcome` and `predictors` are kept; any other column in the file is ignored.
/// At least `predictors.len() + 2` rows are required so the full model retains a
/// residual degree of freedom.
pub fn load_dataset(
    path: &Path,
    outcome: &str,
    predictors: &[String],
    separator: u8,
) -> Result<Dataset, DataError> {
    internal::load_data(path, outcome, predictors, separator)
}

/// Internal module for the file-backed loading path.
mod internal {
    use super::*;

    pub(super) fn load_data(
        path: &Path,
        outcome: &str,
        predictors: &[String],
        separator: u8,
    ) -> Result<Dataset, DataError> {
        fn extract_numeric_column(
            df: &DataFrame,
            column_name: &str,
        ) -> Result<Vec<f64>, DataError> {
            let series = df.column(column_name)?;
            if series.null_count() > 0 {
                return Err(DataError::MissingValuesFound(column_name.to_string()));
            }

            let casted = match series.cast(&DataType::Float64) {
                Ok(casted) => casted,
                Err(_) => {
                    return Err(DataError::ColumnWrongType {
                        column_name: column_name.to_string(),
                        expected_type: "f64 (numeric)",
                        found_type: format!("{:?}", series.dtype()),
                    });
                }
            };

            // A failed string-to-float cast surfaces as fresh nulls rather than an error.
            if casted.null_count() > 0 {
                return Err(DataError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }

            let chunked = casted.f64()?.rechunk();
            let values: Vec<f64> = chunked.into_no_null_iter().collect();
            validate_is_finite(values.iter().copied(), column_name)?;
            Ok(values)
        }

        let mut required_cols: Vec<String> = Vec::with_capacity(predictors.len() + 1);
        required_cols.push(outcome.to_string());
        for name in predictors {
            if required_cols.contains(name) {
                return Err(DataError::DuplicateColumn(name.clone()));
            }
            required_cols.push(name.clone());
        }

        log::info!("Loading data from '{}'", path.display());
        let mut df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        let minimum_rows = predictors.len() + 2;
        if df.height() < minimum_rows {
            return Err(DataError::InsufficientRows {
                found: df.height(),
                required: minimum_rows,
            });
        }

        let columns_set: HashSet<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for col_name in &required_cols {
            if !columns_set.contains(col_name) {
                return Err(DataError::ColumnNotFound(col_name.clone()));
            }
        }
        log::debug!("All required columns found: {required_cols:?}");

        let projection: Vec<&str> = required_cols.iter().map(|s| s.as_str()).collect();
        df = df.select(projection)?;

        let y = Array1::from_vec(extract_numeric_column(&df, outcome)?);
        let mut columns = Vec::with_capacity(predictors.len());
        for name in predictors {
            let values = extract_numeric_column(&df, name)?;
            columns.push((name.clone(), Array1::from_vec(values)));
        }

        log::info!(
            "Loaded {} rows with outcome '{}' and {} predictor columns.",
            y.len(),
            outcome,
            predictors.len()
        );
        Dataset::from_columns(outcome, y, columns)
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_file(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn generate_content(header: &str, data_row: &str, num_rows: usize) -> String {
        let data_rows = std::iter::repeat(data_row)
            .take(num_rows)
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n{}", header, data_rows)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_dataset_success() {
        let mut rows = vec!["y\tage\tweight\tignored".to_string()];
        for i in 0..12 {
            rows.push(format!(
                "{:.1}\t{}\t{:.2}\tzzz",
                i as f64 * 0.5,
                20 + i,
                60.0 + i as f64 / 4.0
            ));
        }
        let file = create_test_file(&rows.join("\n")).unwrap();
        let data = load_dataset(file.path(), "y", &names(&["weight", "age"]), b'\t').unwrap();

        assert_eq!(data.n_rows(), 12);
        assert_eq!(data.column_index("weight"), Some(0));
        assert_eq!(data.column_index("age"), Some(1));
        assert!(data.column("ignored").is_none());
        assert_abs_diff_eq!(data.outcome()[3], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(data.column("age").unwrap()[11], 31.0, epsilon = 1e-12);
        assert_abs_diff_eq!(data.column("weight").unwrap()[4], 61.0, epsilon = 1e-12);
    }

    #[test]
    fn test_comma_separator() {
        let content = generate_content("y,x1", "1.0,2.0", 5);
        let file = create_test_file(&content).unwrap();
        let data = load_dataset(file.path(), "y", &names(&["x1"]), b',').unwrap();
        assert_eq!(data.n_rows(), 5);
    }

    #[test]
    fn test_error_column_not_found() {
        let content = generate_content("y\tx1", "1.0\t0.1", 10);
        let file = create_test_file(&content).unwrap();
        let err = load_dataset(file.path(), "y", &names(&["x1", "x2"]), b'\t').unwrap_err();
        match err {
            DataError::ColumnNotFound(col) => assert_eq!(col, "x2"),
            other => panic!("Expected ColumnNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_error_missing_values() {
        let content = generate_content("y\tx1", "1.0\t", 10);
        let file = create_test_file(&content).unwrap();
        match load_dataset(file.path(), "y", &names(&["x1"]), b'\t') {
            Err(DataError::MissingValuesFound(col)) => assert_eq!(col, "x1"),
            other => panic!("Expected MissingValuesFound(x1), got {:?}", other),
        }
    }

    #[test]
    fn test_error_wrong_type_in_outcome() {
        let content = generate_content("y\tx1", "high\t0.5", 10);
        let file = create_test_file(&content).unwrap();
        match load_dataset(file.path(), "y", &names(&["x1"]), b'\t') {
            Err(DataError::ColumnWrongType { column_name, .. }) => assert_eq!(column_name, "y"),
            other => panic!("Expected ColumnWrongType(y), got {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let content = generate_content("y\tx1", "1.0\tNaN", 10);
        let file = create_test_file(&content).unwrap();
        match load_dataset(file.path(), "y", &names(&["x1"]), b'\t') {
            Err(DataError::NonFiniteValuesFound(col)) => assert_eq!(col, "x1"),
            other => panic!("Expected NonFiniteValuesFound(x1), got {:?}", other),
        }
    }

    #[test]
    fn test_error_insufficient_rows() {
        let content = generate_content("y\tx1\tx2\tx3", "1.0\t2.0\t3.0\t4.0", 4);
        let file = create_test_file(&content).unwrap();
        let err =
            load_dataset(file.path(), "y", &names(&["x1", "x2", "x3"]), b'\t').unwrap_err();
        match err {
            DataError::InsufficientRows { found, required } => {
                assert_eq!(found, 4);
                assert_eq!(required, 5);
            }
            other => panic!("Expected InsufficientRows, got {:?}", other),
        }
    }

    #[test]
    fn test_from_columns_rejects_duplicates_and_mismatches() {
        let y = array![1.0, 2.0, 3.0];
        let dup = Dataset::from_columns(
            "y",
            y.clone(),
            vec![
                ("a".to_string(), array![1.0, 2.0, 3.0]),
                ("a".to_string(), array![1.0, 2.0, 3.0]),
            ],
        );
        assert!(matches!(dup, Err(DataError::DuplicateColumn(name)) if name == "a"));

        let short = Dataset::from_columns("y", y, vec![("b".to_string(), array![1.0, 2.0])]);
        assert!(matches!(
            short,
            Err(DataError::LengthMismatch { found: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn test_select_columns_orders_by_request() {
        let data = Dataset::from_columns(
            "y",
            array![0.0, 0.0],
            vec![
                ("a".to_string(), array![1.0, 2.0]),
                ("b".to_string(), array![3.0, 4.0]),
            ],
        )
        .unwrap();
        let x = data.select_columns(&names(&["b", "a"])).unwrap();
        assert_eq!(x, array![[3.0, 1.0], [4.0, 2.0]]);
    }
}
