//! Nonparametric bootstrap resampling.
//!
//! Every bootstrap iteration owns an RNG seeded from the run seed and the iteration
//! index alone. The draw for iteration `i` is therefore the same whether iterations run
//! sequentially, in parallel, or in any completion order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GOLDEN_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed for iteration `iteration` of a run started with `seed` (SplitMix64 finaliser).
pub fn iteration_seed(seed: u64, iteration: usize) -> u64 {
    let mut z = seed ^ (iteration as u64).wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Draws `n` row indices uniformly from `0..n`, with replacement.
pub fn resample_indices(n: usize, seed: u64) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..n)).collect()
}

/// Resampled row indices for bootstrap iteration `iteration` of run `seed`.
pub fn bootstrap_indices(n: usize, seed: u64, iteration: usize) -> Vec<usize> {
    resample_indices(n, iteration_seed(seed, iteration))
}
