//! Mismatch diagnostics carried by `OpdiffError::NumericMismatch`.

use serde::Serialize;

use crate::Shape;

/// One element's disagreement between actual and expected values.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Deviation {
    /// Multi-index into both tensors.
    pub coord: Vec<usize>,
    pub actual: f32,
    pub expected: f32,
    /// `|actual - expected|`.
    pub abs_diff: f32,
    /// `abs_diff / |expected|`; infinite when `expected` is zero and the values differ.
    pub rel_diff: f32,
}

/// Everything known about a failed comparison of one output tensor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MismatchReport {
    /// Position of the output among the op's outputs.
    pub output: usize,
    pub shape: Shape,
    pub atol: f32,
    pub rtol: f32,
    /// The element with the largest absolute deviation.
    pub max_abs: Deviation,
    /// The element with the largest relative deviation.
    pub max_rel: Deviation,
    /// Number of elements outside tolerance.
    pub violations: usize,
    pub total: usize,
    /// Mean of `|actual - expected|` over all elements.
    pub mean_abs: f64,
}

impl std::fmt::Display for Deviation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "at {:?}: actual={} expected={} abs_diff={} rel_diff={}",
            self.coord, self.actual, self.expected, self.abs_diff, self.rel_diff
        )
    }
}

impl std::fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "output {} {}: {}/{} elements outside atol={} rtol={}; mean abs error {:.3e}; max abs deviation {}; max rel deviation {}",
            self.output,
            self.shape,
            self.violations,
            self.total,
            self.atol,
            self.rtol,
            self.mean_abs,
            self.max_abs,
            self.max_rel
        )
    }
}
