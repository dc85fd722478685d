//! Test fixtures for stability tests.
//!
//! Provides a builder for synthetic regression data with equicorrelated predictors,
//! so tests can dial in signal, noise and collinearity without repeating the setup.

use crate::data::Dataset;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Synthetic data: `y = intercept + x . beta + noise`.
#[derive(Clone)]
pub struct SyntheticData {
    pub y: Array1<f64>,
    /// Shape: [n_samples, n_predictors], columns named `x1`, `x2`, ...
    pub x: Array2<f64>,
    pub names: Vec<String>,
}

impl SyntheticData {
    pub fn dataset(&self) -> Dataset {
        let columns = self
            .names
            .iter()
            .enumerate()
            .map(|(j, name)| (name.clone(), self.x.column(j).to_owned()))
            .collect();
        Dataset::from_columns("y", self.y.clone(), columns)
            .expect("synthetic columns are finite and consistently sized")
    }
}

/// Builder for synthetic regression data with configurable properties.
pub struct SyntheticDataBuilder {
    n_samples: usize,
    coefficients: Vec<f64>,
    intercept: f64,
    noise_sd: f64,
    correlation: f64,
    seed: u64,
}

impl SyntheticDataBuilder {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            coefficients: vec![1.0, 0.5, 0.0],
            intercept: 1.0,
            noise_sd: 1.0,
            correlation: 0.3,
            seed: 42,
        }
    }

    /// One true coefficient per predictor; the length sets the number of predictors.
    pub fn with_coefficients(mut self, coefficients: &[f64]) -> Self {
        self.coefficients = coefficients.to_vec();
        self
    }

    pub fn with_intercept(mut self, intercept: f64) -> Self {
        self.intercept = intercept;
        self
    }

    pub fn with_noise_sd(mut self, noise_sd: f64) -> Self {
        self.noise_sd = noise_sd;
        self
    }

    /// Pairwise correlation between predictors, in `[0, 1)`.
    pub fn with_correlation(mut self, correlation: f64) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> SyntheticData {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let k = self.coefficients.len();
        let shared = self.correlation.sqrt();
        let own = (1.0 - self.correlation).sqrt();

        let mut x = Array2::zeros((self.n_samples, k));
        let mut y = Array1::zeros(self.n_samples);
        for i in 0..self.n_samples {
            let latent: f64 = rng.sample(StandardNormal);
            let mut linear = self.intercept;
            for j in 0..k {
                let e: f64 = rng.sample(StandardNormal);
                let value = shared * latent + own * e;
                x[[i, j]] = value;
                linear += self.coefficients[j] * value;
            }
            let noise: f64 = rng.sample(StandardNormal);
            y[i] = linear + self.noise_sd * noise;
        }

        SyntheticData {
            y,
            x,
            names: (1..=k).map(|j| format!("x{j}")).collect(),
        }
    }
}
