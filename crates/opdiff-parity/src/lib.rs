//! Differential test orchestration.
//!
//! Each [`OpCase`] declares input shapes, optionally the expected output
//! shapes, an op, and its attributes. [`OpTester`] materializes seeded inputs,
//! runs a [`Backend`](opdiff_core::Backend) under test and the reference
//! oracle on the same data, and compares the results. Every run owns its
//! tensors, so cases may run in parallel.

pub mod cases;
pub mod config;
pub mod tester;

pub use config::{DataRange, HarnessConfig};
pub use opdiff_conformance::{FP32_TOLERANCE, Tolerance, assert_allclose};
pub use tester::{CaseOutcome, OpCase, OpTester};

use serde::{Deserialize, Serialize};

/// Deterministic f32 data generation using a simple LCG.
///
/// Produces `n` values in roughly [-1, 1] from the given seed.
/// Not cryptographically random, just reproducible across platforms.
pub fn gen_data(n: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            // LCG: Numerical Recipes parameters
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            ((state >> 33) as f64 / (1u64 << 31) as f64 * 2.0 - 1.0) as f32
        })
        .collect()
}

/// Generate positive f32 data (variances, scales).
pub fn gen_positive_data(n: usize, seed: u64) -> Vec<f32> {
    gen_data(n, seed).iter().map(|x| x.abs() + 0.01).collect()
}

/// How an input tensor's values are generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputGen {
    /// `gen_data` scaled into the configured range.
    #[default]
    Uniform,
    /// `gen_positive_data`, ignoring the range.
    Positive,
}

impl InputGen {
    pub fn generate(self, n: usize, seed: u64, range: DataRange) -> Vec<f32> {
        match self {
            InputGen::Uniform => {
                let mid = (range.lo + range.hi) / 2.0;
                let half = (range.hi - range.lo) / 2.0;
                gen_data(n, seed).into_iter().map(|x| mid + x * half).collect()
            }
            InputGen::Positive => gen_positive_data(n, seed),
        }
    }
}
