//! # Bias/Uncertainty Estimator
//!
//! Per-parameter summaries of the bootstrap estimate columns, measured against the
//! full-model fit. Every statistic uses all `B` rows, including the zeros written for
//! iterations that did not retain the parameter.

use crate::model::FittedModel;
use ndarray::parallel::prelude::*;
use ndarray::{ArrayView1, ArrayView2, Axis};

/// Quantile levels reported for each parameter, as fractions.
pub const LOWER_PERCENTILE: f64 = 0.025;
pub const UPPER_PERCENTILE: f64 = 0.975;

/// Bootstrap bias and spread of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterBias {
    /// Root mean squared deviation from the full estimate, in units of the full SE.
    pub rmsd_ratio: f64,
    /// Percent; NaN when the full estimate is numerically zero or the inclusion
    /// frequency is zero.
    pub relative_conditional_bias: f64,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
}

/// `sqrt(mean((b_i - full)^2)) / full_se`. NaN when the full SE is not positive.
pub fn rmsd_ratio(estimates: ArrayView1<f64>, full_estimate: f64, full_se: f64) -> f64 {
    if estimates.is_empty() || !(full_se > 0.0) {
        return f64::NAN;
    }
    let mean_square = estimates
        .iter()
        .map(|&b| (b - full_estimate) * (b - full_estimate))
        .sum::<f64>()
        / estimates.len() as f64;
    mean_square.sqrt() / full_se
}

/// `((mean(b) / full) / (bif / 100) - 1) * 100`, with `bif` in percent.
///
/// The mean runs over all rows, so dividing by the inclusion fraction turns it into the
/// mean over the rows that retained the parameter. A full estimate within rounding of
/// zero, relative to the largest bootstrap estimate, leaves the ratio undefined.
pub fn relative_conditional_bias(estimates: ArrayView1<f64>, full_estimate: f64, bif: f64) -> f64 {
    let scale = estimates.iter().fold(0.0_f64, |acc, b| acc.max(b.abs()));
    if full_estimate.abs() <= f64::EPSILON * scale || bif == 0.0 {
        return f64::NAN;
    }
    let Some(mean) = estimates.mean() else {
        return f64::NAN;
    };
    ((mean / full_estimate) / (bif / 100.0) - 1.0) * 100.0
}

/// Linear-interpolation quantile of sorted data (`x[h]` with `h = (n - 1) p`).
pub fn quantile_sorted(sorted: &[f64], probability: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * probability.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        }
    }
}

/// Summarises one estimate column.
pub fn parameter_bias(
    estimates: ArrayView1<f64>,
    full_estimate: f64,
    full_se: f64,
    bif: f64,
) -> ParameterBias {
    let mut sorted = estimates.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    ParameterBias {
        rmsd_ratio: rmsd_ratio(estimates, full_estimate, full_se),
        relative_conditional_bias: relative_conditional_bias(estimates, full_estimate, bif),
        median: quantile_sorted(&sorted, 0.5),
        lower: quantile_sorted(&sorted, LOWER_PERCENTILE),
        upper: quantile_sorted(&sorted, UPPER_PERCENTILE),
    }
}

/// Summaries for every column of the `[B, P]` estimate matrix, in layout order.
///
/// `bif` holds the inclusion frequency (percent) of each column.
pub fn summarize(
    estimates: ArrayView2<f64>,
    full: &FittedModel,
    bif: ArrayView1<f64>,
) -> Vec<ParameterBias> {
    estimates
        .axis_iter(Axis(1))
        .into_par_iter()
        .enumerate()
        .map(|(j, column)| {
            parameter_bias(column, full.coefficients[j], full.std_errors[j], bif[j])
        })
        .collect()
}
