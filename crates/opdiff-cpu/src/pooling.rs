//! Rank-generic pooling over 1, 2, or 3 spatial dimensions.
//!
//! The input is permuted to canonical `[N, C, spatial...]`, every output
//! position reduces the in-range part of its window, and the result is
//! permuted back to the declared layout. Padding is never materialized: it
//! cannot win a max, and it only contributes to the divisor of an inclusive
//! average.

use std::ops::Range;

use opdiff_core::layout::{from_canonical, to_canonical};
use opdiff_core::{OpdiffError, PoolAttrs, PoolType, Result, Shape, Tensor};
use opdiff_ops::PoolGeometry;
use smallvec::SmallVec;
use tracing::trace;

/// Pool a declared-layout `input` according to `attrs`.
pub fn pool(input: &Tensor, attrs: &PoolAttrs) -> Result<Tensor> {
    let geometry = PoolGeometry::new(input.shape(), attrs)?;
    let format = attrs.data_format();
    trace!(
        input = %input.shape(),
        output = %geometry.output_shape(),
        %format,
        pool_type = %attrs.pool_type(),
        "reference pool"
    );

    let x = to_canonical(input, format)?;
    let in_spatial = Shape::new(geometry.axes.iter().map(|g| g.input).collect::<Vec<_>>());
    let out_spatial = Shape::new(geometry.axes.iter().map(|g| g.output).collect::<Vec<_>>());
    let strides = in_spatial.strides();
    let plane_len = in_spatial.numel();
    let planes = geometry.batch * geometry.channels;

    let mut out = Vec::with_capacity(planes * out_spatial.numel());
    for p in 0..planes {
        let plane = &x.data()[p * plane_len..(p + 1) * plane_len];
        for o in 0..out_spatial.numel() {
            let pos = out_spatial.unravel(o);
            let window: SmallVec<[Range<usize>; 3]> = pos
                .iter()
                .zip(&geometry.axes)
                .map(|(&i, g)| g.valid(i))
                .collect();
            out.push(reduce_window(plane, &strides, &window, attrs)?);
        }
    }

    let canonical = Tensor::from_vec(out, geometry.canonical_output_shape())?;
    from_canonical(&canonical, format)
}

fn reduce_window(
    plane: &[f32],
    strides: &[usize],
    window: &[Range<usize>],
    attrs: &PoolAttrs,
) -> Result<f32> {
    match attrs.pool_type() {
        PoolType::Max => {
            let mut acc = f32::NEG_INFINITY;
            let mut count = 0usize;
            for_each_offset(window, strides, |i| {
                acc = acc.max(plane[i]);
                count += 1;
            });
            if count == 0 {
                return Err(empty_window(window));
            }
            Ok(acc)
        }
        PoolType::Avg => {
            let mut sum = 0.0f64;
            let mut count = 0usize;
            for_each_offset(window, strides, |i| {
                sum += plane[i] as f64;
                count += 1;
            });
            let divisor = if attrs.exclusive() {
                count
            } else {
                attrs.kernel_volume()
            };
            if divisor == 0 {
                return Err(empty_window(window));
            }
            Ok((sum / divisor as f64) as f32)
        }
    }
}

fn empty_window(window: &[Range<usize>]) -> OpdiffError {
    OpdiffError::Configuration(format!("pooling window {window:?} holds no input element"))
}

/// Visit the flat offset of every position in the box `window`, row-major.
fn for_each_offset(window: &[Range<usize>], strides: &[usize], mut visit: impl FnMut(usize)) {
    if window.iter().any(|r| r.is_empty()) {
        return;
    }
    let mut idx: SmallVec<[usize; 3]> = window.iter().map(|r| r.start).collect();
    loop {
        visit(idx.iter().zip(strides).map(|(i, s)| i * s).sum());
        let mut d = window.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < window[d].end {
                break;
            }
            idx[d] = window[d].start;
        }
    }
}
