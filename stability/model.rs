use crate::data::Dataset;
use ahash::AHashMap;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Public Data Structures ---
// Every fitted model is stored densely in the layout order defined here. A predictor
// that a fit did not retain is present with coefficient and standard error of exactly 0.

/// Name used for the intercept column in every layout and every output table.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// The predictors entering an analysis, split into those the selection procedure may
/// drop (`candidate`) and those it must always keep (`forced`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictorSet {
    pub forced: Vec<String>,
    pub candidate: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PredictorSetError {
    #[error("No predictors were given. At least one forced or candidate predictor is required.")]
    Empty,
    #[error("Predictor '{0}' is listed more than once.")]
    Duplicate(String),
    #[error("Predictor '{0}' is listed as both forced and candidate.")]
    ForcedAndCandidate(String),
    #[error("The outcome '{0}' cannot also be used as a predictor.")]
    OutcomeIsPredictor(String),
    #[error("Predictor '{0}' is not a column of the dataset.")]
    MissingColumn(String),
    #[error("The name '{0}' is reserved for the intercept.")]
    ReservedName(String),
}

impl PredictorSet {
    pub fn new(forced: Vec<String>, candidate: Vec<String>) -> Self {
        Self { forced, candidate }
    }

    /// All predictors, forced first, in the order they appear in the layout.
    pub fn all(&self) -> Vec<String> {
        self.forced.iter().chain(&self.candidate).cloned().collect()
    }

    /// Checks disjointness and uniqueness, independent of any dataset.
    pub fn validate(&self, outcome: &str) -> Result<(), PredictorSetError> {
        if self.forced.is_empty() && self.candidate.is_empty() {
            return Err(PredictorSetError::Empty);
        }
        let mut seen: AHashMap<&str, bool> = AHashMap::new();
        for (name, is_forced) in self
            .forced
            .iter()
            .map(|n| (n, true))
            .chain(self.candidate.iter().map(|n| (n, false)))
        {
            if name == outcome {
                return Err(PredictorSetError::OutcomeIsPredictor(name.clone()));
            }
            if name == INTERCEPT_NAME {
                return Err(PredictorSetError::ReservedName(name.clone()));
            }
            if let Some(previous) = seen.insert(name.as_str(), is_forced) {
                return Err(if previous != is_forced {
                    PredictorSetError::ForcedAndCandidate(name.clone())
                } else {
                    PredictorSetError::Duplicate(name.clone())
                });
            }
        }
        Ok(())
    }
}

/// Fixed dense ordering of the model parameters: intercept, forced, then candidates.
///
/// The name-to-index map is resolved once; all matrices in the crate use these indices.
#[derive(Debug, Clone)]
pub struct PredictorLayout {
    names: Vec<String>,
    num_forced: usize,
    index: AHashMap<String, usize>,
}

impl PredictorLayout {
    /// Builds the layout for a predictor set without checking it against a dataset.
    pub fn new(set: &PredictorSet) -> Self {
        let mut names = Vec::with_capacity(1 + set.forced.len() + set.candidate.len());
        names.push(INTERCEPT_NAME.to_string());
        names.extend(set.all());
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            num_forced: set.forced.len(),
            index,
        }
    }

    /// Validates `set` against `data` and builds the layout.
    pub fn for_dataset(set: &PredictorSet, data: &Dataset) -> Result<Self, PredictorSetError> {
        set.validate(data.outcome_name())?;
        for name in set.all() {
            if data.column_index(&name).is_none() {
                return Err(PredictorSetError::MissingColumn(name));
            }
        }
        Ok(Self::new(set))
    }

    /// Number of parameters, intercept included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Predictor names without the intercept, in layout order.
    pub fn predictor_names(&self) -> &[String] {
        &self.names[1..]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Layout indices of the forced predictors (never includes the intercept).
    pub fn forced_indices(&self) -> std::ops::Range<usize> {
        1..1 + self.num_forced
    }

    pub fn is_forced(&self, index: usize) -> bool {
        self.forced_indices().contains(&index)
    }
}

/// Summary statistics describing the quality of one least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// `n * ln(RSS / n) + 2 * edf`, the criterion used by backward elimination.
    pub aic: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub residual_se: f64,
    pub df_residual: usize,
}

/// The result of one regression fit in dense layout form.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    /// Shape: [layout.len()]. Zero for every parameter the fit did not retain.
    pub coefficients: Array1<f64>,
    /// Shape: [layout.len()]. Zero exactly where `coefficients` is structurally zero.
    pub std_errors: Array1<f64>,
    pub quality: FitQuality,
}

impl FittedModel {
    /// Expands a fit over a subset of the layout into dense form.
    ///
    /// `active[k]` is the layout index of the k-th entry of `coefficients`/`std_errors`.
    pub fn from_active(
        layout_len: usize,
        active: &[usize],
        coefficients: ArrayView1<f64>,
        std_errors: ArrayView1<f64>,
        quality: FitQuality,
    ) -> Self {
        let mut dense_coefficients = Array1::zeros(layout_len);
        let mut dense_std_errors = Array1::zeros(layout_len);
        for (k, &j) in active.iter().enumerate() {
            dense_coefficients[j] = coefficients[k];
            dense_std_errors[j] = std_errors[k];
        }
        Self {
            coefficients: dense_coefficients,
            std_errors: dense_std_errors,
            quality,
        }
    }

    /// Inclusion indicators in layout order: `true` where the coefficient is nonzero.
    pub fn inclusion(&self) -> Vec<bool> {
        self.coefficients.iter().map(|&b| b != 0.0).collect()
    }

    /// Names of the retained predictors, intercept excluded, in layout order.
    pub fn selected_predictors(&self, layout: &PredictorLayout) -> Vec<String> {
        layout
            .predictor_names()
            .iter()
            .zip(self.coefficients.iter().skip(1))
            .filter(|(_, b)| **b != 0.0)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn layout_orders_intercept_forced_candidates() {
        let set = PredictorSet::new(strings(&["age", "sex"]), strings(&["bmi", "chol", "bp"]));
        let layout = PredictorLayout::new(&set);
        assert_eq!(layout.len(), 6);
        assert_eq!(layout.names()[0], INTERCEPT_NAME);
        assert_eq!(layout.index_of("sex"), Some(2));
        assert_eq!(layout.index_of("bp"), Some(5));
        assert_eq!(layout.forced_indices(), 1..3);
        assert!(layout.is_forced(1));
        assert!(!layout.is_forced(0));
        assert!(!layout.is_forced(3));
    }

    #[test]
    fn validate_rejects_overlaps_and_duplicates() {
        let overlap = PredictorSet::new(strings(&["a"]), strings(&["b", "a"]));
        assert_eq!(
            overlap.validate("y"),
            Err(PredictorSetError::ForcedAndCandidate("a".into()))
        );
        let duplicate = PredictorSet::new(vec![], strings(&["b", "b"]));
        assert_eq!(
            duplicate.validate("y"),
            Err(PredictorSetError::Duplicate("b".into()))
        );
        let outcome = PredictorSet::new(vec![], strings(&["y"]));
        assert_eq!(
            outcome.validate("y"),
            Err(PredictorSetError::OutcomeIsPredictor("y".into()))
        );
        assert_eq!(
            PredictorSet::new(vec![], vec![]).validate("y"),
            Err(PredictorSetError::Empty)
        );
    }

    #[test]
    fn from_active_zero_fills_dropped_parameters() {
        let quality = FitQuality {
            aic: 1.0,
            r_squared: 0.5,
            adj_r_squared: 0.4,
            residual_se: 2.0,
            df_residual: 10,
        };
        let model = FittedModel::from_active(
            5,
            &[0, 3],
            array![1.5, -2.0].view(),
            array![0.1, 0.2].view(),
            quality,
        );
        assert_eq!(model.coefficients, array![1.5, 0.0, 0.0, -2.0, 0.0]);
        assert_eq!(model.std_errors, array![0.1, 0.0, 0.0, 0.2, 0.0]);
        assert_eq!(model.inclusion(), vec![true, false, false, true, false]);

        let layout = PredictorLayout::new(&PredictorSet::new(
            strings(&["a"]),
            strings(&["b", "c", "d"]),
        ));
        assert_eq!(model.selected_predictors(&layout), strings(&["c"]));
    }
}
