//! Ordinary least squares on an explicit design matrix.
//!
//! The normal equations are checked with a Cholesky factorisation before they are
//! inverted: a pivot that collapses relative to its diagonal entry marks the design as
//! rank deficient, which is reported instead of producing meaningless coefficients.

use crate::model::FitQuality;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use ndarray_linalg::{Cholesky, Inverse, UPLO};
use thiserror::Error;

/// Relative size below which a Cholesky pivot is treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum FitError {
    #[error(
        "The design matrix is singular: column {column} is (numerically) a linear combination of the columns before it."
    )]
    SingularDesign { column: usize },

    #[error(
        "Cannot fit {parameters} parameters to {observations} observations; at least one residual degree of freedom is required."
    )]
    InsufficientDegreesOfFreedom {
        observations: usize,
        parameters: usize,
    },

    #[error("A linear algebra routine failed: {0}")]
    LinearAlgebra(#[from] ndarray_linalg::error::LinalgError),
}

/// Raw output of a least-squares fit, in the column order of the design matrix.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    /// `sigma^2 (X'X)^-1`.
    pub covariance: Array2<f64>,
    /// `(X'X)^-1`, kept for leverage and leave-one-out computations.
    pub xtx_inv: Array2<f64>,
    pub residuals: Array1<f64>,
    pub rss: f64,
    pub quality: FitQuality,
}

impl OlsFit {
    pub fn std_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
    }
}

/// Builds `[1 | x[:, columns]]`.
pub fn design_with_intercept(x: ArrayView2<f64>, columns: &[usize]) -> Array2<f64> {
    let mut design = Array2::ones((x.nrows(), columns.len() + 1));
    for (k, &j) in columns.iter().enumerate() {
        design.column_mut(k + 1).assign(&x.column(j));
    }
    design
}

/// Fits `y ~ design` by least squares. The design is expected to carry its own
/// intercept column in position 0; goodness-of-fit statistics assume it does.
pub fn fit_ols(design: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<OlsFit, FitError> {
    let n = design.nrows();
    let p = design.ncols();
    if n <= p {
        return Err(FitError::InsufficientDegreesOfFreedom {
            observations: n,
            parameters: p,
        });
    }

    let xtx = design.t().dot(&design);
    let lower = xtx
        .cholesky(UPLO::Lower)
        .map_err(|_| FitError::SingularDesign {
            column: first_weak_pivot(&xtx).unwrap_or(p - 1),
        })?;
    for j in 0..p {
        let pivot = lower[[j, j]] * lower[[j, j]];
        if !(pivot > RANK_TOLERANCE * xtx[[j, j]].max(f64::MIN_POSITIVE)) {
            return Err(FitError::SingularDesign { column: j });
        }
    }

    let xtx_inv = xtx.inv()?;
    let coefficients = xtx_inv.dot(&design.t().dot(&y));
    let residuals = &y - &design.dot(&coefficients);
    let rss = residuals.dot(&residuals);

    let df_residual = n - p;
    let sigma2 = rss / df_residual as f64;
    let covariance = &xtx_inv * sigma2;

    let y_mean = y.mean().unwrap_or(0.0);
    let tss: f64 = y.iter().map(|&v| (v - y_mean) * (v - y_mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_residual as f64;

    let quality = FitQuality {
        aic: aic(n, rss, p),
        r_squared,
        adj_r_squared,
        residual_se: sigma2.sqrt(),
        df_residual,
    };

    Ok(OlsFit {
        coefficients,
        covariance,
        xtx_inv,
        residuals,
        rss,
        quality,
    })
}

/// Gaussian-likelihood AIC up to an additive constant: `n ln(RSS/n) + 2 edf`.
pub fn aic(n: usize, rss: f64, edf: usize) -> f64 {
    let n = n as f64;
    n * (rss / n).ln() + 2.0 * edf as f64
}

/// Column index whose Gram–Schmidt remainder vanishes first, used to name the
/// offending column when the factorisation itself fails.
fn first_weak_pivot(xtx: &Array2<f64>) -> Option<usize> {
    let p = xtx.nrows();
    let mut lower = Array2::<f64>::zeros((p, p));
    for j in 0..p {
        let mut diag = xtx[[j, j]];
        for k in 0..j {
            diag -= lower[[j, k]] * lower[[j, k]];
        }
        if !(diag > RANK_TOLERANCE * xtx[[j, j]].max(f64::MIN_POSITIVE)) {
            return Some(j);
        }
        let root = diag.sqrt();
        lower[[j, j]] = root;
        for i in (j + 1)..p {
            let mut value = xtx[[i, j]];
            for k in 0..j {
                value -= lower[[i, k]] * lower[[j, k]];
            }
            lower[[i, j]] = value / root;
        }
    }
    None
}
