//! # Stability Analysis Pipeline
//!
//! Runs the complete analysis on a validated dataset:
//!
//! 1. resolve the predictor layout and check the data contract,
//! 2. fit the full model and the model selected on the full data,
//! 3. run the bootstrap with the selection procedure,
//! 4. derive inclusion, pairwise, combination and bias statistics,
//! 5. estimate shrinkage factors for the selected model,
//! 6. assemble the overview.
//!
//! Every failure is reported with the stage it happened in. Nothing after the data
//! contract check is retried or skipped, except shrinkage for a selected model
//! without predictors, which has nothing to shrink.

use crate::bias;
use crate::bootstrap::{BootstrapEnsemble, BootstrapError, BootstrapProgressObserver, run_bootstrap};
use crate::config::{AnalysisConfig, ConfigError};
use crate::data::{DataError, Dataset};
use crate::inclusion::{
    ModelCombination, PairwiseTable, inclusion_frequencies, model_combinations, pairwise_table,
    reproduction_frequency,
};
use crate::model::{FittedModel, PredictorLayout, PredictorSetError};
use crate::ols::FitError;
use crate::overview::{OverviewRow, assemble};
use crate::selection::{BackwardElimination, FullModel, ModelFitter};
use crate::shrinkage::{SelectedModelSpec, ShrinkageError, ShrinkageMode, ShrinkageResult, shrink};
use ndarray::Array1;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StabilityError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Data contract violated: {0}")]
    DataContract(#[from] PredictorSetError),

    #[error("Data contract violated: {0}")]
    Data(#[from] DataError),

    #[error("Fitting the full model failed: {0}")]
    FullModelFit(#[source] FitError),

    #[error("Fitting the selected model on the full data failed: {0}")]
    SelectedModelFit(#[source] FitError),

    #[error(
        "Bootstrap iteration {iteration} failed (iteration seed {seed}); the run was aborted: {source}"
    )]
    BootstrapIteration {
        iteration: usize,
        seed: u64,
        #[source]
        source: FitError,
    },

    #[error("The bootstrap could not be run: {0}")]
    Bootstrap(BootstrapError),

    #[error("Shrinkage estimation failed: {0}")]
    Shrinkage(#[from] ShrinkageError),
}

impl From<BootstrapError> for StabilityError {
    fn from(error: BootstrapError) -> Self {
        match error {
            BootstrapError::Iteration {
                iteration,
                iteration_seed,
                source,
            } => StabilityError::BootstrapIteration {
                iteration,
                seed: iteration_seed,
                source,
            },
            other => StabilityError::Bootstrap(other),
        }
    }
}

/// Global and parameterwise factors for the selected model.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkageSummary {
    pub global: ShrinkageResult,
    pub parameterwise: ShrinkageResult,
}

/// Everything an analysis produces, in memory.
#[derive(Debug, Clone)]
pub struct StabilityReport {
    pub layout: PredictorLayout,
    pub full: FittedModel,
    pub selected: FittedModel,
    pub ensemble: BootstrapEnsemble,
    /// Bootstrap inclusion frequency per layout entry, percent.
    pub bif: Array1<f64>,
    pub overview: Vec<OverviewRow>,
    pub pairwise: PairwiseTable,
    pub combinations: Vec<ModelCombination>,
    /// Percent of bootstrap rows that reproduce the selected model exactly.
    pub reproduction_frequency: f64,
    pub shrinkage: Option<ShrinkageSummary>,
}

impl StabilityReport {
    pub fn selected_predictors(&self) -> Vec<String> {
        self.selected.selected_predictors(&self.layout)
    }
}

/// Runs the full analysis described by `config` on `data`.
pub fn run_analysis<O>(
    data: &Dataset,
    config: &AnalysisConfig,
    progress: &O,
) -> Result<StabilityReport, StabilityError>
where
    O: BootstrapProgressObserver + ?Sized,
{
    config.validate()?;
    if data.outcome_name() != config.outcome {
        return Err(DataError::ColumnNotFound(config.outcome.clone()).into());
    }
    let set = config.predictor_set();
    let layout = PredictorLayout::for_dataset(&set, data)?;
    let required = layout.len() + 1;
    if data.n_rows() < required {
        return Err(DataError::InsufficientRows {
            found: data.n_rows(),
            required,
        }
        .into());
    }

    let y = data.outcome();
    let x = data.select_columns(&set.all())?;
    log::info!(
        "Analysing '{}' with {} forced and {} candidate predictors over {} rows.",
        config.outcome,
        set.forced.len(),
        set.candidate.len(),
        data.n_rows()
    );

    let full = FullModel
        .fit(y, x.view(), &layout)
        .map_err(StabilityError::FullModelFit)?;
    let selector = BackwardElimination::new(config.criterion);
    let selected = selector
        .fit(y, x.view(), &layout)
        .map_err(StabilityError::SelectedModelFit)?;
    let selected_names = selected.selected_predictors(&layout);
    log::info!(
        "Selected model on the full data: [{}] (AIC {:.3}, full model AIC {:.3}).",
        selected_names.join(", "),
        selected.quality.aic,
        full.quality.aic
    );

    let ensemble = run_bootstrap(
        y,
        x.view(),
        &layout,
        &selector,
        &config.bootstrap_settings(),
        progress,
    )?;

    let inclusion = ensemble.inclusion_matrix();
    let bif = inclusion_frequencies(inclusion.view());
    let settings = config.inclusion_settings();
    let selected_inclusion = selected.inclusion();
    let pairwise = pairwise_table(inclusion.view(), &layout, &settings);
    let combinations =
        model_combinations(inclusion.view(), &layout, &selected_inclusion, &settings);
    let reproduction = reproduction_frequency(inclusion.view(), &selected_inclusion);
    let bias_rows = bias::summarize(ensemble.estimates(), &full, bif.view());
    log::info!(
        "The selected model was reproduced in {:.1}% of {} bootstrap samples; {} distinct models were listed.",
        reproduction,
        ensemble.iterations(),
        combinations.len()
    );

    let shrinkage = if config.shrinkage {
        estimate_shrinkage(data, &config.outcome, selected_names)?
    } else {
        None
    };

    let overview = assemble(
        &layout,
        &full,
        &selected,
        bif.view(),
        &bias_rows,
        shrinkage.as_ref().map(|s| &s.parameterwise),
    );

    Ok(StabilityReport {
        layout,
        full,
        selected,
        ensemble,
        bif,
        overview,
        pairwise,
        combinations,
        reproduction_frequency: reproduction,
        shrinkage,
    })
}

fn estimate_shrinkage(
    data: &Dataset,
    outcome: &str,
    predictors: Vec<String>,
) -> Result<Option<ShrinkageSummary>, StabilityError> {
    if predictors.is_empty() {
        log::warn!("The selected model contains only the intercept; shrinkage is skipped.");
        return Ok(None);
    }
    let spec = SelectedModelSpec {
        outcome: outcome.to_string(),
        predictors,
    };
    let global = shrink(&spec, data, ShrinkageMode::Global)?;
    let parameterwise = shrink(&spec, data, ShrinkageMode::Parameterwise)?;
    log::info!("Global shrinkage factor: {:.4}", global.factors[0]);
    Ok(Some(ShrinkageSummary {
        global,
        parameterwise,
    }))
}
