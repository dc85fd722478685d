//! # Bootstrap Driver
//!
//! Runs the model fitter on `B` bootstrap resamples and collects the dense coefficient
//! and standard-error vectors into two `[B, P]` matrices. Both matrices are allocated
//! before the loop; iteration `i` writes row `i` and nothing else, so the rows can be
//! filled in parallel without coordination.
//!
//! A fit error in any iteration aborts the whole run. Dropping the row instead would
//! shift every downstream frequency and percentile, so no partial ensemble is returned.
//! When several iterations fail, the lowest failing index is reported so the failure
//! can be reproduced from the run seed.

use crate::model::PredictorLayout;
use crate::ols::FitError;
use crate::resample::{bootstrap_indices, iteration_seed};
use crate::selection::ModelFitter;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("At least one bootstrap iteration is required.")]
    NoIterations,

    #[error("Bootstrap iteration {iteration} (iteration seed {iteration_seed}) failed: {source}")]
    Iteration {
        iteration: usize,
        iteration_seed: u64,
        #[source]
        source: FitError,
    },

    #[error("Failed to build a worker pool with {threads} threads: {message}")]
    ThreadPool { threads: usize, message: String },
}

/// How many resamples to draw and how to schedule them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSettings {
    pub iterations: usize,
    pub seed: u64,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

/// Per-iteration results of a bootstrap run. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapEnsemble {
    seed: u64,
    /// Shape: [iterations, layout.len()]. Zero marks a parameter the fit did not retain.
    estimates: Array2<f64>,
    /// Shape: [iterations, layout.len()].
    std_errors: Array2<f64>,
}

impl BootstrapEnsemble {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn iterations(&self) -> usize {
        self.estimates.nrows()
    }

    pub fn estimates(&self) -> ArrayView2<'_, f64> {
        self.estimates.view()
    }

    pub fn std_errors(&self) -> ArrayView2<'_, f64> {
        self.std_errors.view()
    }

    /// `true` where the estimate is nonzero, i.e. where the parameter was retained.
    pub fn inclusion_matrix(&self) -> Array2<bool> {
        self.estimates.mapv(|b| b != 0.0)
    }
}

/// Observer for reporting progress while bootstrap iterations complete.
///
/// Callbacks may arrive from several worker threads at once.
pub trait BootstrapProgressObserver: Sync {
    fn on_start(&self, total_iterations: usize) {
        let _ = total_iterations;
    }
    fn on_iteration_complete(&self) {}
    fn on_finish(&self) {}
}

#[derive(Default)]
pub struct NoopBootstrapProgress;

impl BootstrapProgressObserver for NoopBootstrapProgress {}

/// Runs `settings.iterations` fit-on-resample cycles.
///
/// `x` holds the predictors in layout order (see `ModelFitter`).
pub fn run_bootstrap<F, O>(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    layout: &PredictorLayout,
    fitter: &F,
    settings: &BootstrapSettings,
    progress: &O,
) -> Result<BootstrapEnsemble, BootstrapError>
where
    F: ModelFitter + ?Sized,
    O: BootstrapProgressObserver + ?Sized,
{
    if settings.iterations == 0 {
        return Err(BootstrapError::NoIterations);
    }

    log::info!(
        "Starting {} bootstrap iterations over {} rows and {} parameters (seed {}).",
        settings.iterations,
        y.len(),
        layout.len(),
        settings.seed
    );
    let started = Instant::now();
    progress.on_start(settings.iterations);

    let ensemble = match settings.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| BootstrapError::ThreadPool {
                    threads,
                    message: e.to_string(),
                })?;
            pool.install(|| fill_ensemble(y, x, layout, fitter, settings, progress))
        }
        None => fill_ensemble(y, x, layout, fitter, settings, progress),
    }?;

    progress.on_finish();
    log::info!(
        "Bootstrap finished in {:.2?} ({} iterations).",
        started.elapsed(),
        ensemble.iterations()
    );
    Ok(ensemble)
}

fn fill_ensemble<F, O>(
    y: ArrayView1<f64>,
    x: ArrayView2<f64>,
    layout: &PredictorLayout,
    fitter: &F,
    settings: &BootstrapSettings,
    progress: &O,
) -> Result<BootstrapEnsemble, BootstrapError>
where
    F: ModelFitter + ?Sized,
    O: BootstrapProgressObserver + ?Sized,
{
    let n = y.len();
    let mut estimates = Array2::zeros((settings.iterations, layout.len()));
    let mut std_errors = Array2::zeros((settings.iterations, layout.len()));

    let first_failure = estimates
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(std_errors.axis_iter_mut(Axis(0)).into_par_iter())
        .enumerate()
        .filter_map(|(iteration, (mut estimate_row, mut se_row))| {
            let indices = bootstrap_indices(n, settings.seed, iteration);
            let y_boot = y.select(Axis(0), &indices);
            let x_boot = x.select(Axis(0), &indices);
            let outcome = fitter.fit(y_boot.view(), x_boot.view(), layout);
            progress.on_iteration_complete();
            match outcome {
                Ok(model) => {
                    estimate_row.assign(&model.coefficients);
                    se_row.assign(&model.std_errors);
                    None
                }
                Err(source) => Some((iteration, source)),
            }
        })
        .min_by_key(|(iteration, _)| *iteration);

    if let Some((iteration, source)) = first_failure {
        return Err(BootstrapError::Iteration {
            iteration,
            iteration_seed: iteration_seed(settings.seed, iteration),
            source,
        });
    }

    Ok(BootstrapEnsemble {
        seed: settings.seed,
        estimates,
        std_errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FitQuality, FittedModel, PredictorSet};
    use crate::selection::{BackwardElimination, FullModel};
    use crate::test_fixtures::SyntheticDataBuilder;
    use ndarray::Array1;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn layout(forced: &[&str], candidate: &[&str]) -> PredictorLayout {
        PredictorLayout::new(&PredictorSet::new(
            forced.iter().map(|s| s.to_string()).collect(),
            candidate.iter().map(|s| s.to_string()).collect(),
        ))
    }

    fn settings(iterations: usize, seed: u64, threads: Option<usize>) -> BootstrapSettings {
        BootstrapSettings {
            iterations,
            seed,
            threads,
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        started: AtomicUsize,
        completed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl BootstrapProgressObserver for CountingProgress {
        fn on_start(&self, total_iterations: usize) {
            self.started.store(total_iterations, Ordering::SeqCst);
        }
        fn on_iteration_complete(&self) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_finish(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fails on any resample whose first outcome value is above a threshold.
    struct PickyFitter {
        threshold: f64,
    }

    impl ModelFitter for PickyFitter {
        fn fit(
            &self,
            y: ArrayView1<f64>,
            x: ArrayView2<f64>,
            layout: &PredictorLayout,
        ) -> Result<FittedModel, FitError> {
            if y[0] > self.threshold {
                return Err(FitError::SingularDesign { column: 1 });
            }
            let _ = x;
            Ok(FittedModel {
                coefficients: Array1::ones(layout.len()),
                std_errors: Array1::ones(layout.len()),
                quality: FitQuality {
                    aic: 0.0,
                    r_squared: 0.0,
                    adj_r_squared: 0.0,
                    residual_se: 1.0,
                    df_residual: 1,
                },
            })
        }
    }

    #[test]
    fn ensemble_is_dense_and_forced_columns_always_filled() {
        let data = SyntheticDataBuilder::new(50)
            .with_coefficients(&[1.0, 0.5, 0.2, 0.0, 0.0])
            .build();
        let layout = layout(&["x1", "x2"], &["x3", "x4", "x5"]);
        let progress = CountingProgress::default();
        let ensemble = run_bootstrap(
            data.y.view(),
            data.x.view(),
            &layout,
            &BackwardElimination::default(),
            &settings(40, 42, None),
            &progress,
        )
        .unwrap();

        assert_eq!(ensemble.estimates().dim(), (40, 6));
        assert_eq!(ensemble.std_errors().dim(), (40, 6));
        assert!(ensemble.estimates().iter().all(|v| v.is_finite()));
        for row in ensemble.estimates().rows() {
            assert_ne!(row[0], 0.0);
            assert_ne!(row[1], 0.0);
            assert_ne!(row[2], 0.0);
        }
        let inclusion = ensemble.inclusion_matrix();
        for (b, s) in ensemble.estimates().iter().zip(ensemble.std_errors().iter()) {
            assert_eq!(*b == 0.0, *s == 0.0);
        }
        assert_eq!(inclusion.dim(), (40, 6));

        assert_eq!(progress.started.load(Ordering::SeqCst), 40);
        assert_eq!(progress.completed.load(Ordering::SeqCst), 40);
        assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn results_do_not_depend_on_thread_count() {
        let data = SyntheticDataBuilder::new(40)
            .with_coefficients(&[0.7, 0.0, 0.3, 0.1])
            .with_correlation(0.6)
            .build();
        let layout = layout(&["x1"], &["x2", "x3", "x4"]);
        let fitter = BackwardElimination::default();
        let single = run_bootstrap(
            data.y.view(),
            data.x.view(),
            &layout,
            &fitter,
            &settings(30, 7, Some(1)),
            &NoopBootstrapProgress,
        )
        .unwrap();
        let pooled = run_bootstrap(
            data.y.view(),
            data.x.view(),
            &layout,
            &fitter,
            &settings(30, 7, Some(4)),
            &NoopBootstrapProgress,
        )
        .unwrap();
        assert_eq!(single, pooled);
        assert_eq!(single.seed(), 7);
    }

    #[test]
    fn full_model_fitter_includes_everything() {
        let data = SyntheticDataBuilder::new(30).build();
        let layout = layout(&[], &["x1", "x2", "x3"]);
        let ensemble = run_bootstrap(
            data.y.view(),
            data.x.view(),
            &layout,
            &FullModel,
            &settings(10, 1, None),
            &NoopBootstrapProgress,
        )
        .unwrap();
        assert!(ensemble.inclusion_matrix().iter().all(|&included| included));
    }

    #[test]
    fn lowest_failing_iteration_is_reported() {
        let n = 20;
        let y = Array1::from_iter((0..n).map(|i| i as f64));
        let x = Array2::zeros((n, 1));
        let layout = layout(&[], &["x1"]);
        let threshold = 9.5;
        let run = settings(25, 3, Some(3));

        let expected = (0..run.iterations)
            .find(|&i| bootstrap_indices(n, run.seed, i)[0] as f64 > threshold)
            .expect("some resample starts with a large row index");

        match run_bootstrap(
            y.view(),
            x.view(),
            &layout,
            &PickyFitter { threshold },
            &run,
            &NoopBootstrapProgress,
        ) {
            Err(BootstrapError::Iteration {
                iteration,
                iteration_seed: seed,
                ..
            }) => {
                assert_eq!(iteration, expected);
                assert_eq!(seed, iteration_seed(run.seed, expected));
            }
            other => panic!("Expected an iteration failure, got {:?}", other),
        }
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let data = SyntheticDataBuilder::new(20).build();
        let layout = layout(&[], &["x1", "x2", "x3"]);
        let result = run_bootstrap(
            data.y.view(),
            data.x.view(),
            &layout,
            &FullModel,
            &settings(0, 1, None),
            &NoopBootstrapProgress,
        );
        assert!(matches!(result, Err(BootstrapError::NoIterations)));
    }
}
