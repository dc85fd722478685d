//! # Inclusion Analyzer
//!
//! Everything in this module is derived from the boolean inclusion matrix of a
//! bootstrap ensemble (`true` where a coefficient is nonzero):
//!
//! - bootstrap inclusion frequency (BIF) per parameter,
//! - pairwise joint inclusion, compared with the expectation under independence and
//!   flagged by a chi-squared test,
//! - frequencies of whole model combinations,
//! - how often the model selected on the full data is reproduced exactly.
//!
//! Frequencies are percentages throughout. The independence expectation for a pair is
//! `BIF_a * BIF_b / 100`, i.e. the product of the two percentages scaled back once.

use crate::independence::chi_squared_test;
use crate::model::PredictorLayout;
use ahash::AHashMap;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};

/// Thresholds for the pairwise test and the combination table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InclusionSettings {
    /// Pairs with a p-value at or below this level are flagged.
    pub significance_level: f64,
    pub yates_correction: bool,
    /// Combinations are listed until their cumulative percentage exceeds this value.
    pub combination_cumulative_cap: f64,
    /// Hard limit on the number of listed combinations.
    pub combination_limit: usize,
}

impl Default for InclusionSettings {
    fn default() -> Self {
        Self {
            significance_level: 0.01,
            yates_correction: true,
            combination_cumulative_cap: 80.0,
            combination_limit: 20,
        }
    }
}

/// Percentage of bootstrap rows in which each column is included. Shape: [n_columns].
pub fn inclusion_frequencies(inclusion: ArrayView2<bool>) -> Array1<f64> {
    let rows = inclusion.nrows().max(1) as f64;
    inclusion
        .axis_iter(Axis(1))
        .map(|column| column.iter().filter(|&&v| v).count() as f64 * 100.0 / rows)
        .collect()
}

/// Joint inclusion percentage expected if two parameters were selected independently.
pub fn independence_expectation(frequency_a: f64, frequency_b: f64) -> f64 {
    frequency_a * frequency_b / 100.0
}

/// Outcome of the pairwise independence test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairFlag {
    /// Selected together significantly more often than expected.
    Positive,
    /// Selected together significantly less often than expected.
    Negative,
    NotSignificant,
    /// The test is undefined, typically because one parameter is always or never included.
    Undefined,
}

impl PairFlag {
    pub fn symbol(self) -> &'static str {
        match self {
            PairFlag::Positive => "+",
            PairFlag::Negative => "-",
            PairFlag::NotSignificant => "",
            PairFlag::Undefined => "NA",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairStatistic {
    /// Index into `PairwiseTable::names`; always less than `second`.
    pub first: usize,
    pub second: usize,
    pub joint_percent: f64,
    pub expected_percent: f64,
    pub p_value: Option<f64>,
    pub flag: PairFlag,
}

/// Pairwise co-inclusion over the non-intercept predictors.
#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseTable {
    pub names: Vec<String>,
    /// Symmetric joint inclusion percentages; the diagonal holds the BIF.
    pub joint: Array2<f64>,
    /// One entry per unordered pair, in row-major upper-triangle order.
    pub pairs: Vec<PairStatistic>,
}

impl PairwiseTable {
    /// Statistic of the unordered pair `{i, j}`; `None` on the diagonal or out of range.
    pub fn pair(&self, i: usize, j: usize) -> Option<&PairStatistic> {
        let (first, second) = if i < j { (i, j) } else { (j, i) };
        let k = self.names.len();
        if first == second || second >= k {
            return None;
        }
        // Pairs before row `first` of the upper triangle, then the offset within it.
        let position = first * (2 * k - first - 1) / 2 + (second - first - 1);
        self.pairs
            .get(position)
            .filter(|p| p.first == first && p.second == second)
    }

    /// Display form: joint percentage above the diagonal, test flag below, BIF on it.
    pub fn display_cell(&self, i: usize, j: usize) -> String {
        if i == j {
            return format!("{:.1}", self.joint[[i, i]]);
        }
        match self.pair(i, j) {
            Some(pair) if i < j => format!("{:.1}", pair.joint_percent),
            Some(pair) => pair.flag.symbol().to_string(),
            None => String::new(),
        }
    }
}

/// Builds the pairwise table from an inclusion matrix in layout order.
pub fn pairwise_table(
    inclusion: ArrayView2<bool>,
    layout: &PredictorLayout,
    settings: &InclusionSettings,
) -> PairwiseTable {
    let predictors = inclusion.slice(s![.., 1..]);
    let k = predictors.ncols();
    let rows = predictors.nrows().max(1) as f64;
    let frequencies = inclusion_frequencies(predictors);

    let mut joint = Array2::zeros((k, k));
    for i in 0..k {
        joint[[i, i]] = frequencies[i];
    }

    let mut pairs = Vec::with_capacity(k * k.saturating_sub(1) / 2);
    for (i, j) in (0..k).tuple_combinations() {
        let a = predictors.column(i);
        let b = predictors.column(j);
        let both = a.iter().zip(b.iter()).filter(|(x, y)| **x && **y).count();
        let joint_percent = both as f64 * 100.0 / rows;
        joint[[i, j]] = joint_percent;
        joint[[j, i]] = joint_percent;

        let expected_percent = independence_expectation(frequencies[i], frequencies[j]);
        let p_value = chi_squared_test(
            a.iter().copied(),
            b.iter().copied(),
            settings.yates_correction,
        )
        .ok();
        let flag = match p_value {
            None => PairFlag::Undefined,
            Some(p) if p > settings.significance_level => PairFlag::NotSignificant,
            Some(_) if joint_percent >= expected_percent => PairFlag::Positive,
            Some(_) => PairFlag::Negative,
        };
        pairs.push(PairStatistic {
            first: i,
            second: j,
            joint_percent,
            expected_percent,
            p_value,
            flag,
        });
    }

    PairwiseTable {
        names: layout.predictor_names().to_vec(),
        joint,
        pairs,
    }
}

/// One distinct set of retained predictors and how often the bootstrap produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCombination {
    /// Retained predictors (intercept excluded), in layout order.
    pub predictors: Vec<String>,
    pub count: usize,
    pub percent: f64,
    pub cumulative_percent: f64,
    pub is_selected_model: bool,
}

/// Frequencies of distinct inclusion patterns, most frequent first.
///
/// Ties are ordered by the bootstrap row in which the pattern first appeared. The list
/// stops after the entry whose cumulative percentage exceeds the cap, or at the limit.
/// `selected` is the inclusion vector of the full-data selected model, in layout order.
pub fn model_combinations(
    inclusion: ArrayView2<bool>,
    layout: &PredictorLayout,
    selected: &[bool],
    settings: &InclusionSettings,
) -> Vec<ModelCombination> {
    let total = inclusion.nrows();
    let mut groups: AHashMap<Vec<bool>, (usize, usize)> = AHashMap::new();
    for (row_index, row) in inclusion.axis_iter(Axis(0)).enumerate() {
        let pattern: Vec<bool> = row.iter().skip(1).copied().collect();
        groups
            .entry(pattern)
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, row_index));
    }

    let mut ordered: Vec<(Vec<bool>, usize, usize)> = groups
        .into_iter()
        .map(|(pattern, (count, first_row))| (pattern, count, first_row))
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let selected_pattern = selected.get(1..).unwrap_or(&[]);
    let mut cumulative = 0.0;
    let mut combinations = Vec::new();
    for (pattern, count, _) in ordered {
        let percent = count as f64 * 100.0 / total.max(1) as f64;
        cumulative += percent;
        combinations.push(ModelCombination {
            predictors: layout
                .predictor_names()
                .iter()
                .zip(&pattern)
                .filter(|(_, included)| **included)
                .map(|(name, _)| name.clone())
                .collect(),
            count,
            percent,
            cumulative_percent: cumulative,
            is_selected_model: pattern.as_slice() == selected_pattern,
        });
        if cumulative > settings.combination_cumulative_cap
            || combinations.len() >= settings.combination_limit
        {
            break;
        }
    }
    combinations
}

/// Percentage of bootstrap rows whose inclusion pattern equals `selected` exactly.
/// The intercept column is ignored.
pub fn reproduction_frequency(inclusion: ArrayView2<bool>, selected: &[bool]) -> f64 {
    let total = inclusion.nrows();
    if total == 0 {
        return 0.0;
    }
    let matches = inclusion
        .axis_iter(Axis(0))
        .filter(|row| {
            row.len() == selected.len()
                && row.iter().zip(selected).skip(1).all(|(a, b)| a == b)
        })
        .count();
    matches as f64 * 100.0 / total as f64
}
