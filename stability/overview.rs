//! # Overview Assembler
//!
//! Joins the full model, the selected model, the bootstrap summaries and the optional
//! parameterwise shrinkage factors into one row per parameter. Nothing is computed here
//! beyond the shrunken estimate; the rows are ordered by inclusion frequency, highest
//! first, keeping layout order among ties.

use crate::bias::ParameterBias;
use crate::model::{FittedModel, PredictorLayout};
use crate::shrinkage::{ShrinkageMode, ShrinkageResult};
use ndarray::ArrayView1;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub name: String,
    pub full_estimate: f64,
    pub full_se: f64,
    /// Bootstrap inclusion frequency, percent.
    pub bif: f64,
    /// Zero when the predictor was eliminated on the full data.
    pub selected_estimate: f64,
    pub selected_se: f64,
    pub rmsd_ratio: f64,
    pub relative_conditional_bias: f64,
    pub median: f64,
    pub lower: f64,
    pub upper: f64,
    /// Parameterwise factor, present only for predictors of the selected model.
    pub shrinkage_factor: Option<f64>,
    pub shrunken_estimate: Option<f64>,
}

/// Builds the overview table. `bif` and `bias` are in layout order.
pub fn assemble(
    layout: &PredictorLayout,
    full: &FittedModel,
    selected: &FittedModel,
    bif: ArrayView1<f64>,
    bias: &[ParameterBias],
    shrinkage: Option<&ShrinkageResult>,
) -> Vec<OverviewRow> {
    let parameterwise = shrinkage.filter(|s| s.mode == ShrinkageMode::Parameterwise);

    let mut rows: Vec<OverviewRow> = layout
        .names()
        .iter()
        .zip(bias)
        .enumerate()
        .map(|(j, (name, summary))| {
            let selected_estimate = selected.coefficients[j];
            let shrinkage_factor = parameterwise.and_then(|s| s.factor(name));
            OverviewRow {
                name: name.clone(),
                full_estimate: full.coefficients[j],
                full_se: full.std_errors[j],
                bif: bif[j],
                selected_estimate,
                selected_se: selected.std_errors[j],
                rmsd_ratio: summary.rmsd_ratio,
                relative_conditional_bias: summary.relative_conditional_bias,
                median: summary.median,
                lower: summary.lower,
                upper: summary.upper,
                shrinkage_factor,
                shrunken_estimate: shrinkage_factor.map(|c| c * selected_estimate),
            }
        })
        .collect();

    rows.sort_by(|a, b| b.bif.total_cmp(&a.bif));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FitQuality, PredictorSet};
    use ndarray::{Array1, Array2, array};

    fn model(coefficients: Array1<f64>) -> FittedModel {
        let std_errors = coefficients.mapv(|b| if b != 0.0 { 0.1 } else { 0.0 });
        FittedModel {
            coefficients,
            std_errors,
            quality: FitQuality {
                aic: 10.0,
                r_squared: 0.5,
                adj_r_squared: 0.4,
                residual_se: 1.0,
                df_residual: 20,
            },
        }
    }

    fn bias_rows(n: usize) -> Vec<ParameterBias> {
        (0..n)
            .map(|j| ParameterBias {
                rmsd_ratio: j as f64,
                relative_conditional_bias: 0.0,
                median: 0.0,
                lower: 0.0,
                upper: 0.0,
            })
            .collect()
    }

    fn layout() -> PredictorLayout {
        PredictorLayout::new(&PredictorSet::new(
            vec!["age".to_string()],
            vec!["bmi".to_string(), "chol".to_string(), "bp".to_string()],
        ))
    }

    #[test]
    fn rows_are_sorted_by_bif_with_stable_ties() {
        let full = model(array![1.0, 0.5, 0.3, 0.2, 0.1]);
        let selected = model(array![1.0, 0.6, 0.0, 0.25, 0.0]);
        let bif = array![100.0, 100.0, 40.0, 85.0, 40.0];
        let rows = assemble(&layout(), &full, &selected, bif.view(), &bias_rows(5), None);

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["(Intercept)", "age", "chol", "bmi", "bp"]);
        assert_eq!(rows[2].rmsd_ratio, 3.0);
        assert_eq!(rows[3].selected_estimate, 0.0);
        assert!(rows.iter().all(|r| r.shrinkage_factor.is_none()));
    }

    #[test]
    fn parameterwise_factors_join_by_name() {
        let full = model(array![1.0, 0.5, 0.3, 0.2, 0.1]);
        let selected = model(array![1.0, 0.6, 0.0, 0.25, 0.0]);
        let bif = Array1::from_elem(5, 50.0);
        let shrinkage = ShrinkageResult {
            mode: ShrinkageMode::Parameterwise,
            names: vec!["age".to_string(), "chol".to_string()],
            factors: array![0.9, 0.8],
            covariance: Array2::eye(2),
        };
        let rows = assemble(
            &layout(),
            &full,
            &selected,
            bif.view(),
            &bias_rows(5),
            Some(&shrinkage),
        );

        let chol = rows.iter().find(|r| r.name == "chol").unwrap();
        assert_eq!(chol.shrinkage_factor, Some(0.8));
        assert_eq!(chol.shrunken_estimate, Some(0.8 * 0.25));
        let bmi = rows.iter().find(|r| r.name == "bmi").unwrap();
        assert_eq!(bmi.shrinkage_factor, None);
        assert_eq!(rows[0].name, "(Intercept)");
        assert_eq!(rows[0].shrinkage_factor, None);
    }

    #[test]
    fn global_factor_is_not_spread_over_rows() {
        let full = model(array![1.0, 0.5, 0.3, 0.2, 0.1]);
        let selected = full.clone();
        let shrinkage = ShrinkageResult {
            mode: ShrinkageMode::Global,
            names: vec!["global".to_string()],
            factors: array![0.7],
            covariance: Array2::eye(1),
        };
        let bif = Array1::from_elem(5, 100.0);
        let rows = assemble(
            &layout(),
            &full,
            &selected,
            bif.view(),
            &bias_rows(5),
            Some(&shrinkage),
        );
        assert!(rows.iter().all(|r| r.shrinkage_factor.is_none()));
    }
}
