//! Numeric comparison of backend outputs against the reference oracle.
//!
//! An element passes when `|actual - expected| <= atol + rtol * |expected|`.
//! NaN matches only NaN, and an infinity matches only the same infinity.
//! Failures carry the coordinate and values of the largest absolute and the
//! largest relative deviation, so a mismatch can be located without rerunning.
//!
//! The coordinate always reproduces the reported `actual` and `expected`
//! values, and `abs_diff` is `|actual - expected|` wherever that is a
//! number. Where it is NaN, `abs_diff` is 0 for a passing pair (NaN against
//! NaN, equal infinities) and `inf` for a failing one, so a NaN mismatch
//! ranks above every finite deviation.

use opdiff_core::{Deviation, MismatchReport, OpdiffError, Result, Shape, Tensor};
use serde::{Deserialize, Serialize};

/// Combined absolute and relative tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub atol: f32,
    pub rtol: f32,
}

/// Default tolerance for f32 ops.
pub const FP32_TOLERANCE: Tolerance = Tolerance {
    atol: 1e-5,
    rtol: 1e-5,
};

impl Tolerance {
    pub const fn new(atol: f32, rtol: f32) -> Self {
        Self { atol, rtol }
    }

    /// Whether `actual` is within tolerance of `expected`.
    pub fn accepts(&self, actual: f32, expected: f32) -> bool {
        if actual.is_nan() || expected.is_nan() {
            return actual.is_nan() && expected.is_nan();
        }
        if actual.is_infinite() || expected.is_infinite() {
            return actual == expected;
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        FP32_TOLERANCE
    }
}

/// Element-wise statistics of one actual/expected pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comparison {
    pub shape: Shape,
    pub tolerance: Tolerance,
    pub total: usize,
    pub violations: usize,
    pub mean_abs: f64,
    /// `None` only for empty tensors.
    pub max_abs: Option<Deviation>,
    pub max_rel: Option<Deviation>,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.violations == 0
    }

    /// The mismatch report for output `output`, if any element failed.
    pub fn into_report(self, output: usize) -> Option<MismatchReport> {
        if self.passed() {
            return None;
        }
        Some(MismatchReport {
            output,
            shape: self.shape,
            atol: self.tolerance.atol,
            rtol: self.tolerance.rtol,
            max_abs: self.max_abs?,
            max_rel: self.max_rel?,
            violations: self.violations,
            total: self.total,
            mean_abs: self.mean_abs,
        })
    }
}

fn deviation(shape: &Shape, i: usize, actual: f32, expected: f32, ok: bool) -> Deviation {
    let diff = (actual - expected).abs();
    // NaN arises from NaN inputs or equal infinities.
    let abs_diff = match (diff.is_nan(), ok) {
        (true, true) => 0.0,
        (true, false) => f32::INFINITY,
        (false, _) => diff,
    };
    let rel_diff = if abs_diff == 0.0 {
        0.0
    } else {
        let r = abs_diff / expected.abs();
        if r.is_nan() { f32::INFINITY } else { r }
    };
    Deviation {
        coord: shape.unravel(i),
        actual,
        expected,
        abs_diff,
        rel_diff,
    }
}

/// Compare `actual` against `expected` element by element.
///
/// Fails with `ShapeMismatch` (output 0) when the shapes differ; value
/// comparison never reconciles shapes.
pub fn compare(actual: &Tensor, expected: &Tensor, tol: Tolerance) -> Result<Comparison> {
    if actual.shape() != expected.shape() {
        return Err(OpdiffError::ShapeMismatch {
            output: 0,
            expected: expected.shape().clone(),
            got: actual.shape().clone(),
        });
    }
    let shape = expected.shape();
    let mut violations = 0usize;
    let mut sum_abs = 0.0f64;
    let mut max_abs: Option<Deviation> = None;
    let mut max_rel: Option<Deviation> = None;

    for (i, (&a, &e)) in actual.data().iter().zip(expected.data()).enumerate() {
        let ok = tol.accepts(a, e);
        if !ok {
            violations += 1;
        }
        let d = deviation(shape, i, a, e, ok);
        sum_abs += d.abs_diff as f64;
        if max_rel.as_ref().is_none_or(|m| d.rel_diff > m.rel_diff) {
            max_rel = Some(d.clone());
        }
        if max_abs.as_ref().is_none_or(|m| d.abs_diff > m.abs_diff) {
            max_abs = Some(d);
        }
    }

    let total = expected.numel();
    Ok(Comparison {
        shape: shape.clone(),
        tolerance: tol,
        total,
        violations,
        mean_abs: if total == 0 { 0.0 } else { sum_abs / total as f64 },
        max_abs,
        max_rel,
    })
}

/// Whether `actual` equals `expected` within `rtol`/`atol`, shapes included.
pub fn equal(actual: &Tensor, expected: &Tensor, rtol: f32, atol: f32) -> bool {
    let tol = Tolerance::new(atol, rtol);
    actual.shape() == expected.shape()
        && actual
            .data()
            .iter()
            .zip(expected.data())
            .all(|(&a, &e)| tol.accepts(a, e))
}

/// Compare output `output` and turn any failure into an `OpdiffError`.
pub fn check_allclose(
    actual: &Tensor,
    expected: &Tensor,
    tol: Tolerance,
    output: usize,
) -> Result<Comparison> {
    let cmp = compare(actual, expected, tol).map_err(|e| match e {
        OpdiffError::ShapeMismatch { expected, got, .. } => OpdiffError::ShapeMismatch {
            output,
            expected,
            got,
        },
        other => other,
    })?;
    match cmp.clone().into_report(output) {
        Some(report) => Err(OpdiffError::NumericMismatch(Box::new(report))),
        None => Ok(cmp),
    }
}

/// Assert two f32 slices are element-wise close, panicking with the worst
/// offending element.
pub fn assert_allclose(actual: &[f32], expected: &[f32], atol: f32, rtol: f32) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: actual={} expected={}",
        actual.len(),
        expected.len()
    );
    let tol = Tolerance::new(atol, rtol);
    let worst = actual
        .iter()
        .zip(expected)
        .enumerate()
        .filter(|&(_, (&a, &e))| !tol.accepts(a, e))
        .map(|(i, (&a, &e))| (i, a, e, (a - e).abs()))
        .max_by(|x, y| x.3.total_cmp(&y.3));
    if let Some((i, a, e, diff)) = worst {
        panic!(
            "mismatch at [{i}]: actual={a} expected={e} diff={diff} tol={}",
            atol + rtol * e.abs()
        );
    }
}
