//! Export of a `StabilityReport` as tab-separated tables plus a TOML run summary.
//!
//! Non-finite statistics are written as `NA`, never as zero.

use crate::config::AnalysisConfig;
use crate::pipeline::StabilityReport;
use crate::shrinkage::ShrinkageResult;
use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const OVERVIEW_FILE: &str = "overview.tsv";
pub const PAIRWISE_FILE: &str = "pairwise.tsv";
pub const PAIRWISE_TESTS_FILE: &str = "pairwise_tests.tsv";
pub const COMBINATIONS_FILE: &str = "combinations.tsv";
pub const SHRINKAGE_FILE: &str = "shrinkage.tsv";
pub const SUMMARY_FILE: &str = "summary.toml";

const MISSING: &str = "NA";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write output file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write table '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to serialize the run summary to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// Run-level facts written to `summary.toml`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub outcome: String,
    pub observations: usize,
    pub bootstrap_iterations: usize,
    pub seed: u64,
    pub forced: Vec<String>,
    pub candidates: Vec<String>,
    pub selected_predictors: Vec<String>,
    /// Percent of bootstrap samples reproducing the selected model exactly.
    pub reproduction_frequency: f64,
    pub combinations_listed: usize,
    pub full_model_aic: f64,
    pub full_model_r_squared: f64,
    pub selected_model_aic: f64,
    pub selected_model_r_squared: f64,
    pub global_shrinkage_factor: Option<f64>,
}

impl RunSummary {
    pub fn new(report: &StabilityReport, config: &AnalysisConfig, observations: usize) -> Self {
        Self {
            outcome: config.outcome.clone(),
            observations,
            bootstrap_iterations: report.ensemble.iterations(),
            seed: report.ensemble.seed(),
            forced: config.forced.clone(),
            candidates: config.candidates.clone(),
            selected_predictors: report.selected_predictors(),
            reproduction_frequency: report.reproduction_frequency,
            combinations_listed: report.combinations.len(),
            full_model_aic: report.full.quality.aic,
            full_model_r_squared: report.full.quality.r_squared,
            selected_model_aic: report.selected.quality.aic,
            selected_model_r_squared: report.selected.quality.r_squared,
            global_shrinkage_factor: report.shrinkage.as_ref().map(|s| s.global.factors[0]),
        }
    }
}

fn number(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.6}")
    } else {
        MISSING.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), number)
}

fn tsv_writer(path: &Path) -> Result<Writer<File>, ReportError> {
    WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Writes every table of `report` into `out_dir`, creating it if needed.
/// Returns the written paths in the order they were written.
pub fn write_report(
    report: &StabilityReport,
    summary: &RunSummary,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    let path = out_dir.join(OVERVIEW_FILE);
    write_overview(report, &path)?;
    written.push(path);

    let path = out_dir.join(PAIRWISE_FILE);
    write_pairwise_matrix(report, &path)?;
    written.push(path);

    let path = out_dir.join(PAIRWISE_TESTS_FILE);
    write_pairwise_tests(report, &path)?;
    written.push(path);

    let path = out_dir.join(COMBINATIONS_FILE);
    write_combinations(report, &path)?;
    written.push(path);

    if let Some(shrinkage) = &report.shrinkage {
        let path = out_dir.join(SHRINKAGE_FILE);
        write_shrinkage(&[&shrinkage.global, &shrinkage.parameterwise], &path)?;
        written.push(path);
    }

    let path = out_dir.join(SUMMARY_FILE);
    fs::write(&path, toml::to_string_pretty(summary)?)?;
    written.push(path);

    log::info!("Wrote {} result files to {}", written.len(), out_dir.display());
    Ok(written)
}

fn write_records<I, R>(path: &Path, header: &[&str], records: I) -> Result<(), ReportError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let csv_error = |source: csv::Error| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = tsv_writer(path)?;
    wtr.write_record(header).map_err(csv_error)?;
    for record in records {
        wtr.write_record(record.into_iter().collect::<Vec<_>>())
            .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_overview(report: &StabilityReport, path: &Path) -> Result<(), ReportError> {
    let header = [
        "variable",
        "full_estimate",
        "full_se",
        "bif",
        "selected_estimate",
        "selected_se",
        "rmsd_ratio",
        "rel_cond_bias",
        "median",
        "p2.5",
        "p97.5",
        "shrinkage_factor",
        "shrunken_estimate",
    ];
    let records = report.overview.iter().map(|row| {
        vec![
            row.name.clone(),
            number(row.full_estimate),
            number(row.full_se),
            number(row.bif),
            number(row.selected_estimate),
            number(row.selected_se),
            number(row.rmsd_ratio),
            number(row.relative_conditional_bias),
            number(row.median),
            number(row.lower),
            number(row.upper),
            optional(row.shrinkage_factor),
            optional(row.shrunken_estimate),
        ]
    });
    write_records(path, &header, records)
}

fn write_pairwise_matrix(report: &StabilityReport, path: &Path) -> Result<(), ReportError> {
    let table = &report.pairwise;
    let mut header = vec!["variable"];
    header.extend(table.names.iter().map(String::as_str));
    let records = table.names.iter().enumerate().map(|(i, name)| {
        std::iter::once(name.clone())
            .chain((0..table.names.len()).map(|j| table.display_cell(i, j)))
            .collect::<Vec<_>>()
    });
    write_records(path, &header, records)
}

fn write_pairwise_tests(report: &StabilityReport, path: &Path) -> Result<(), ReportError> {
    let table = &report.pairwise;
    let header = [
        "first",
        "second",
        "joint_percent",
        "expected_percent",
        "p_value",
        "flag",
    ];
    let records = table.pairs.iter().map(|pair| {
        vec![
            table.names[pair.first].clone(),
            table.names[pair.second].clone(),
            number(pair.joint_percent),
            number(pair.expected_percent),
            optional(pair.p_value),
            pair.flag.symbol().to_string(),
        ]
    });
    write_records(path, &header, records)
}

fn write_combinations(report: &StabilityReport, path: &Path) -> Result<(), ReportError> {
    let header = [
        "rank",
        "predictors",
        "count",
        "percent",
        "cumulative_percent",
        "selected_model",
    ];
    let records = report
        .combinations
        .iter()
        .enumerate()
        .map(|(rank, combination)| {
            let predictors = if combination.predictors.is_empty() {
                "(none)".to_string()
            } else {
                combination.predictors.join(",")
            };
            vec![
                (rank + 1).to_string(),
                predictors,
                combination.count.to_string(),
                number(combination.percent),
                number(combination.cumulative_percent),
                if combination.is_selected_model { "*" } else { "" }.to_string(),
            ]
        });
    write_records(path, &header, records)
}

fn write_shrinkage(results: &[&ShrinkageResult], path: &Path) -> Result<(), ReportError> {
    let header = ["mode", "parameter", "factor", "std_error"];
    let records = results.iter().flat_map(|result| {
        let mode = format!("{:?}", result.mode).to_lowercase();
        let std_errors = result.std_errors();
        result
            .names
            .iter()
            .enumerate()
            .map(move |(j, name)| {
                vec![
                    mode.clone(),
                    name.clone(),
                    number(result.factors[j]),
                    number(std_errors[j]),
                ]
            })
            .collect::<Vec<_>>()
    });
    write_records(path, &header, records)
}
