//! Analysis configuration, stored as TOML.
//!
//! Every field has a default except the outcome and the predictor lists, so a config
//! file only needs to name the columns. The CLI layers its flags on top of a loaded file.

use crate::bootstrap::BootstrapSettings;
use crate::inclusion::InclusionSettings;
use crate::model::{PredictorSet, PredictorSetError};
use crate::selection::Criterion;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("No outcome column was configured.")]
    MissingOutcome,
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("Invalid predictor configuration: {0}")]
    Predictors(#[from] PredictorSetError),
}

/// Field delimiter of the input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    #[default]
    Tab,
    Comma,
}

impl Separator {
    pub fn as_byte(self) -> u8 {
        match self {
            Separator::Tab => b'\t',
            Separator::Comma => b',',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub outcome: String,
    /// Predictors that are never eliminated.
    pub forced: Vec<String>,
    pub candidates: Vec<String>,
    pub bootstrap_iterations: usize,
    pub seed: u64,
    pub significance_level: f64,
    pub yates_correction: bool,
    pub combination_cumulative_cap: f64,
    pub combination_limit: usize,
    pub threads: Option<usize>,
    pub criterion: Criterion,
    /// Estimate leave-one-out shrinkage factors for the selected model.
    pub shrinkage: bool,
    pub separator: Separator,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let inclusion = InclusionSettings::default();
        Self {
            outcome: String::new(),
            forced: Vec::new(),
            candidates: Vec::new(),
            bootstrap_iterations: 1000,
            seed: 42,
            significance_level: inclusion.significance_level,
            yates_correction: inclusion.yates_correction,
            combination_cumulative_cap: inclusion.combination_cumulative_cap,
            combination_limit: inclusion.combination_limit,
            threads: None,
            criterion: Criterion::default(),
            shrinkage: true,
            separator: Separator::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Checks everything that can be checked without the data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outcome.trim().is_empty() {
            return Err(ConfigError::MissingOutcome);
        }
        if self.bootstrap_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bootstrap_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "significance_level",
                reason: format!("{} is not in (0, 1)", self.significance_level),
            });
        }
        if !(0.0..=100.0).contains(&self.combination_cumulative_cap) {
            return Err(ConfigError::InvalidValue {
                field: "combination_cumulative_cap",
                reason: format!("{} is not a percentage", self.combination_cumulative_cap),
            });
        }
        if self.combination_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "combination_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.threads == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "threads",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        self.predictor_set().validate(&self.outcome)?;
        Ok(())
    }

    pub fn predictor_set(&self) -> PredictorSet {
        PredictorSet::new(self.forced.clone(), self.candidates.clone())
    }

    pub fn bootstrap_settings(&self) -> BootstrapSettings {
        BootstrapSettings {
            iterations: self.bootstrap_iterations,
            seed: self.seed,
            threads: self.threads,
        }
    }

    pub fn inclusion_settings(&self) -> InclusionSettings {
        InclusionSettings {
            significance_level: self.significance_level,
            yates_correction: self.yates_correction,
            combination_cumulative_cap: self.combination_cumulative_cap,
            combination_limit: self.combination_limit,
        }
    }
}
