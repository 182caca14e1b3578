//! Harness configuration: tolerance, seed, and input value range.

use opdiff_conformance::{FP32_TOLERANCE, Tolerance};
use opdiff_core::{OpdiffError, Result};
use serde::{Deserialize, Serialize};

pub const ENV_SEED: &str = "OPDIFF_SEED";
pub const ENV_ATOL: &str = "OPDIFF_ATOL";
pub const ENV_RTOL: &str = "OPDIFF_RTOL";

/// Closed interval generated input values are scaled into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    pub lo: f32,
    pub hi: f32,
}

impl Default for DataRange {
    fn default() -> Self {
        Self { lo: -1.0, hi: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub tolerance: Tolerance,
    /// Base seed; input `i` of a case is generated from `seed + i`.
    pub seed: u64,
    pub data: DataRange,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tolerance: FP32_TOLERANCE,
            seed: 0,
            data: DataRange::default(),
        }
    }
}

impl HarnessConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Defaults overlaid with `OPDIFF_SEED`, `OPDIFF_ATOL` and `OPDIFF_RTOL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup(ENV_SEED) {
            config.seed = parse(ENV_SEED, &v)?;
        }
        if let Some(v) = lookup(ENV_ATOL) {
            config.tolerance.atol = parse(ENV_ATOL, &v)?;
        }
        if let Some(v) = lookup(ENV_RTOL) {
            config.tolerance.rtol = parse(ENV_RTOL, &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let Tolerance { atol, rtol } = self.tolerance;
        if !(atol.is_finite() && rtol.is_finite() && atol >= 0.0 && rtol >= 0.0) {
            return Err(OpdiffError::Configuration(format!(
                "tolerances must be finite and non-negative, got atol={atol} rtol={rtol}"
            )));
        }
        if !(self.data.lo.is_finite() && self.data.hi.is_finite() && self.data.lo <= self.data.hi)
        {
            return Err(OpdiffError::Configuration(format!(
                "invalid data range [{}, {}]",
                self.data.lo, self.data.hi
            )));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| OpdiffError::Configuration(format!("{key}={value:?}: {e}")))
}
