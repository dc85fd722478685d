//! Pearson chi-squared test of independence for two binary indicator columns.

use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndependenceError {
    #[error("The two indicator columns have different lengths ({left} vs {right}).")]
    LengthMismatch { left: usize, right: usize },

    #[error(
        "The test is undefined: one indicator column has no variation, so the 2x2 table has an empty margin."
    )]
    Degenerate,
}

/// Observed counts of a 2x2 contingency table built from two indicator columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContingencyTable {
    /// `counts[a][b]` counts rows with first indicator `a` and second indicator `b`.
    pub counts: [[u64; 2]; 2],
}

impl ContingencyTable {
    pub fn from_indicators<A, B>(a: A, b: B) -> Result<Self, IndependenceError>
    where
        A: ExactSizeIterator<Item = bool>,
        B: ExactSizeIterator<Item = bool>,
    {
        if a.len() != b.len() {
            return Err(IndependenceError::LengthMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        let mut counts = [[0u64; 2]; 2];
        for (left, right) in a.zip(b) {
            counts[left as usize][right as usize] += 1;
        }
        Ok(Self { counts })
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    fn row_totals(&self) -> [u64; 2] {
        [
            self.counts[0][0] + self.counts[0][1],
            self.counts[1][0] + self.counts[1][1],
        ]
    }

    fn column_totals(&self) -> [u64; 2] {
        [
            self.counts[0][0] + self.counts[1][0],
            self.counts[0][1] + self.counts[1][1],
        ]
    }

    /// Pearson statistic, optionally with Yates' continuity correction.
    ///
    /// The correction is `min(0.5, |O - E|)`, so it never flips the sign of a deviation.
    pub fn chi_squared_statistic(&self, yates: bool) -> Result<f64, IndependenceError> {
        let rows = self.row_totals();
        let cols = self.column_totals();
        if rows.contains(&0) || cols.contains(&0) {
            return Err(IndependenceError::Degenerate);
        }
        let total = self.total() as f64;

        let mut expected = [[0.0f64; 2]; 2];
        let mut min_deviation = f64::INFINITY;
        for a in 0..2 {
            for b in 0..2 {
                expected[a][b] = rows[a] as f64 * cols[b] as f64 / total;
                let deviation = (self.counts[a][b] as f64 - expected[a][b]).abs();
                min_deviation = min_deviation.min(deviation);
            }
        }
        let correction = if yates { min_deviation.min(0.5) } else { 0.0 };

        let mut statistic = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                let deviation = (self.counts[a][b] as f64 - expected[a][b]).abs() - correction;
                statistic += deviation * deviation / expected[a][b];
            }
        }
        Ok(statistic)
    }
}

/// Upper-tail p-value of the chi-squared independence test between two indicator columns.
pub fn chi_squared_test<A, B>(a: A, b: B, yates: bool) -> Result<f64, IndependenceError>
where
    A: ExactSizeIterator<Item = bool>,
    B: ExactSizeIterator<Item = bool>,
{
    let table = ContingencyTable::from_indicators(a, b)?;
    let statistic = table.chi_squared_statistic(yates)?;
    // One degree of freedom is always a valid parameter.
    let distribution = match ChiSquared::new(1.0) {
        Ok(distribution) => distribution,
        Err(_) => return Err(IndependenceError::Degenerate),
    };
    Ok(distribution.sf(statistic))
}
