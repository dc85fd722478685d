//! Model fitters consumed by the stability analysis.
//!
//! The bootstrap core only sees the `ModelFitter` trait. `BackwardElimination` is the
//! selection procedure under study; `FullModel` fits every predictor and provides the
//! reference estimates the bias statistics are measured against.

use crate::model::{FittedModel, PredictorLayout};
use crate::ols::{FitError, OlsFit, design_with_intercept, fit_ols};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// A procedure that fits a linear model on `y` and the predictor matrix `x`.
///
/// `x` holds one column per non-intercept layout entry, in layout order, so column
/// `k` of `x` is layout index `k + 1`. Implementations must return the fit in dense
/// layout form and must never drop a forced predictor.
pub trait ModelFitter: Sync {
    fn fit(
        &self,
        y: ArrayView1<f64>,
        x: ArrayView2<f64>,
        layout: &PredictorLayout,
    ) -> Result<FittedModel, FitError>;
}

/// Penalty per estimated parameter used when comparing candidate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Akaike: 2 per parameter.
    #[default]
    Aic,
    /// Schwarz: ln(n) per parameter.
    Bic,
}

impl Criterion {
    fn penalty(self, n: usize) -> f64 {
        match self {
            Criterion::Aic => 2.0,
            Criterion::Bic => (n as f64).ln(),
        }
    }

    fn score(self, fit: &OlsFit, n: usize, edf: usize) -> f64 {
        let nf = n as f64;
        nf * (fit.rss / nf).ln() + self.penalty(n) * edf as f64
    }
}

/// Fits every predictor in the layout, without selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullModel;

impl ModelFitter for FullModel {
    fn fit(
        &self,
        y: ArrayView1<f64>,
        x: ArrayView2<f64>,
        layout: &PredictorLayout,
    ) -> Result<FittedModel, FitError> {
        let active: Vec<usize> = (0..layout.len()).collect();
        let fit = fit_active(y, x, &active)?;
        Ok(to_dense(layout, &active, &fit))
    }
}

/// Backward elimination: starting from all predictors, repeatedly remove the candidate
/// whose removal lowers the criterion the most, until no removal lowers it.
///
/// Ties between removals go to the predictor that comes first in the layout, and a
/// removal that leaves the criterion unchanged is not taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackwardElimination {
    pub criterion: Criterion,
}

impl BackwardElimination {
    pub fn new(criterion: Criterion) -> Self {
        Self { criterion }
    }
}

impl ModelFitter for BackwardElimination {
    fn fit(
        &self,
        y: ArrayView1<f64>,
        x: ArrayView2<f64>,
        layout: &PredictorLayout,
    ) -> Result<FittedModel, FitError> {
        let n = y.len();
        let mut active: Vec<usize> = (0..layout.len()).collect();
        let mut current = fit_active(y, x, &active)?;
        let mut current_score = self.criterion.score(&current, n, active.len());

        loop {
            let mut best: Option<(usize, f64, OlsFit)> = None;
            for (position, &j) in active.iter().enumerate() {
                if j == 0 || layout.is_forced(j) {
                    continue;
                }
                let trial: Vec<usize> = active.iter().copied().filter(|&k| k != j).collect();
                let fit = fit_active(y, x, &trial)?;
                let score = self.criterion.score(&fit, n, trial.len());
                let improves = match &best {
                    Some((_, best_score, _)) => score < *best_score,
                    None => true,
                };
                if improves {
                    best = Some((position, score, fit));
                }
            }

            match best {
                Some((position, score, fit)) if score < current_score => {
                    log::trace!(
                        "Dropping '{}' ({:.4} -> {:.4})",
                        layout.names()[active[position]],
                        current_score,
                        score
                    );
                    active.remove(position);
                    current = fit;
                    current_score = score;
                }
                _ => break,
            }
        }

        Ok(to_dense(layout, &active, &current))
    }
}

/// Fits the intercept plus the layout indices in `active` (which always starts with 0).
fn fit_active(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    active: &[usize],
) -> Result<OlsFit, FitError> {
    let columns: Vec<usize> = active.iter().filter(|&&j| j > 0).map(|&j| j - 1).collect();
    let design = design_with_intercept(x, &columns);
    fit_ols(design.view(), y)
}

fn to_dense(layout: &PredictorLayout, active: &[usize], fit: &OlsFit) -> FittedModel {
    FittedModel::from_active(
        layout.len(),
        active,
        fit.coefficients.view(),
        fit.std_errors().view(),
        fit.quality,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PredictorSet;
    use crate::test_fixtures::SyntheticDataBuilder;

    fn layout(forced: &[&str], candidate: &[&str]) -> PredictorLayout {
        PredictorLayout::new(&PredictorSet::new(
            forced.iter().map(|s| s.to_string()).collect(),
            candidate.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[test]
    fn full_model_keeps_everything() {
        let data = SyntheticDataBuilder::new(60)
            .with_coefficients(&[1.0, 0.0, 0.5])
            .build();
        let layout = layout(&[], &["x1", "x2", "x3"]);
        let model = FullModel
            .fit(data.y.view(), data.x.view(), &layout)
            .unwrap();
        assert!(model.inclusion().iter().all(|&included| included));
        assert!(model.std_errors.iter().all(|&se| se > 0.0));
    }

    #[test]
    fn backward_elimination_drops_noise_and_keeps_signal() {
        let data = SyntheticDataBuilder::new(200)
            .with_coefficients(&[2.0, 0.0, 0.0, -1.5])
            .with_noise_sd(0.5)
            .with_correlation(0.0)
            .with_seed(11)
            .build();
        let layout = layout(&[], &["x1", "x2", "x3", "x4"]);
        let model = BackwardElimination::default()
            .fit(data.y.view(), data.x.view(), &layout)
            .unwrap();
        let selected = model.selected_predictors(&layout);
        assert!(selected.contains(&"x1".to_string()));
        assert!(selected.contains(&"x4".to_string()));
        assert_eq!(model.coefficients[2] == 0.0, model.std_errors[2] == 0.0);
    }

    #[test]
    fn forced_predictors_survive_even_without_signal() {
        let data = SyntheticDataBuilder::new(120)
            .with_coefficients(&[0.0, 0.0, 3.0])
            .with_seed(5)
            .build();
        let layout = layout(&["x1", "x2"], &["x3"]);
        let model = BackwardElimination::new(Criterion::Bic)
            .fit(data.y.view(), data.x.view(), &layout)
            .unwrap();
        assert_ne!(model.coefficients[1], 0.0);
        assert_ne!(model.coefficients[2], 0.0);
        assert_ne!(model.coefficients[3], 0.0);
    }

    #[test]
    fn selected_model_never_scores_worse_than_the_full_model() {
        let data = SyntheticDataBuilder::new(80)
            .with_coefficients(&[0.8, 0.3, 0.0, 0.0, 0.1])
            .with_seed(99)
            .build();
        let layout = layout(&["x1"], &["x2", "x3", "x4", "x5"]);
        let full = FullModel.fit(data.y.view(), data.x.view(), &layout).unwrap();
        let selected = BackwardElimination::default()
            .fit(data.y.view(), data.x.view(), &layout)
            .unwrap();
        assert!(selected.quality.aic <= full.quality.aic);
    }
}
