//! # Shrinkage Estimator
//!
//! Post-selection shrinkage factors for the model selected on the full data, estimated
//! by leave-one-out resampling.
//!
//! Leave-one-out coefficients are exact and need no refits: for OLS with design `X`,
//! coefficient vector `b`, residuals `e` and leverages `h`,
//!
//! ```text
//! b(-i) = b - (X'X)^-1 x_i e_i / (1 - h_ii)
//! ```
//!
//! The outcome is then regressed, with an intercept, on the leave-one-out linear
//! predictor (global factor) or on each predictor's leave-one-out contribution
//! `x_ij * b(-i)_j` (parameterwise factors). The slopes are the factors and their OLS
//! covariance is reported alongside.

use crate::data::{DataError, Dataset};
use crate::ols::{FitError, design_with_intercept, fit_ols};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `1 - h_ii` below this value is treated as a leverage of one.
const LEVERAGE_TOLERANCE: f64 = 1e-10;

/// Name reported for the single factor of the global mode.
pub const GLOBAL_FACTOR_NAME: &str = "global";

#[derive(Error, Debug)]
pub enum ShrinkageError {
    #[error("The selected model has no predictors besides the intercept, so there is nothing to shrink.")]
    NoPredictors,

    #[error("The selected model was fitted to outcome '{expected}', but the dataset's outcome is '{found}'.")]
    OutcomeMismatch { expected: String, found: String },

    #[error("Observation {row} has leverage 1; its leave-one-out estimate is undefined.")]
    UnitLeverage { row: usize },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Least-squares fit failed during shrinkage estimation: {0}")]
    Fit(#[from] FitError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShrinkageMode {
    /// One factor for the whole linear predictor.
    #[default]
    Global,
    /// One factor per selected predictor.
    Parameterwise,
}

/// The model to shrink: outcome plus the retained predictors in model order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModelSpec {
    pub outcome: String,
    pub predictors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkageResult {
    pub mode: ShrinkageMode,
    /// `["global"]`, or the selected predictor names.
    pub names: Vec<String>,
    pub factors: Array1<f64>,
    /// Shape: [factors.len(), factors.len()].
    pub covariance: Array2<f64>,
}

impl ShrinkageResult {
    pub fn factor(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|j| self.factors[j])
    }

    pub fn std_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
    }
}

/// Estimates shrinkage factors for `spec` on `data`.
pub fn shrink(
    spec: &SelectedModelSpec,
    data: &Dataset,
    mode: ShrinkageMode,
) -> Result<ShrinkageResult, ShrinkageError> {
    if spec.predictors.is_empty() {
        return Err(ShrinkageError::NoPredictors);
    }
    if spec.outcome != data.outcome_name() {
        return Err(ShrinkageError::OutcomeMismatch {
            expected: spec.outcome.clone(),
            found: data.outcome_name().to_string(),
        });
    }

    let x = data.select_columns(&spec.predictors)?;
    let columns: Vec<usize> = (0..x.ncols()).collect();
    let design = design_with_intercept(x.view(), &columns);
    let y = data.outcome();
    let loo = leave_one_out_coefficients(design.view(), y)?;

    // Per-row contributions of each predictor under its leave-one-out coefficients.
    let contributions = &design.slice(s![.., 1..]) * &loo.slice(s![.., 1..]);

    let (names, regressors) = match mode {
        ShrinkageMode::Global => {
            let linear_predictor = contributions.sum_axis(Axis(1));
            (
                vec![GLOBAL_FACTOR_NAME.to_string()],
                linear_predictor.insert_axis(Axis(1)),
            )
        }
        ShrinkageMode::Parameterwise => (spec.predictors.clone(), contributions),
    };

    let regressor_columns: Vec<usize> = (0..regressors.ncols()).collect();
    let calibration = design_with_intercept(regressors.view(), &regressor_columns);
    let fit = fit_ols(calibration.view(), y)?;
    let factors = fit.coefficients.slice(s![1..]).to_owned();
    let covariance = fit.covariance.slice(s![1.., 1..]).to_owned();

    log::debug!(
        "{:?} shrinkage over {} predictors: factors {:.4}",
        mode,
        spec.predictors.len(),
        factors
    );

    Ok(ShrinkageResult {
        mode,
        names,
        factors,
        covariance,
    })
}

/// Exact leave-one-out OLS coefficients. Row `i` of the result is the coefficient
/// vector fitted without observation `i`. Shape: [n, design.ncols()].
pub fn leave_one_out_coefficients(
    design: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<Array2<f64>, ShrinkageError> {
    let fit = fit_ols(design, y)?;
    let mut loo = Array2::zeros(design.dim());
    for (i, row) in design.outer_iter().enumerate() {
        let direction = fit.xtx_inv.dot(&row);
        let leverage = row.dot(&direction);
        let remaining = 1.0 - leverage;
        if remaining < LEVERAGE_TOLERANCE {
            return Err(ShrinkageError::UnitLeverage { row: i });
        }
        let step = fit.residuals[i] / remaining;
        loo.row_mut(i).assign(&(&fit.coefficients - &(direction * step)));
    }
    Ok(loo)
}
