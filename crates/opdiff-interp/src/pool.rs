//! Pooling the way a lowered kernel computes it: materialize a padded buffer
//! in the declared layout, then reduce a fixed set of taps per output.
//!
//! Ceil mode becomes extra trailing padding so every window lies fully
//! inside the buffer. Max pads with `-inf`, average pads with zero.

use opdiff_core::{OpdiffError, PoolAttrs, PoolType, Result, Shape, Tensor};
use opdiff_ops::{MAX_ELEMENTS, PoolGeometry};
use smallvec::SmallVec;

/// A compiled pooling kernel.
#[derive(Clone, Debug)]
pub struct PoolKernel {
    attrs: PoolAttrs,
}

impl PoolKernel {
    pub fn new(attrs: PoolAttrs) -> Self {
        Self { attrs }
    }

    pub fn run(&self, x: &Tensor) -> Result<Tensor> {
        let geometry = PoolGeometry::new(x.shape(), &self.attrs)
            .map_err(|e| OpdiffError::Compiler(format!("pool kernel: {e}")))?;
        let format = self.attrs.data_format();
        let spatial: SmallVec<[usize; 3]> = format.spatial_axes().collect();

        // Trailing pad so the last (ceil) window fits.
        let mut pads: SmallVec<[(usize, usize); 3]> = SmallVec::new();
        for g in &geometry.axes {
            let needed = (g.output - 1) * g.stride + g.kernel;
            let have = g.input + g.pad_before + g.pad_after;
            pads.push((g.pad_before, g.pad_after + needed.saturating_sub(have)));
        }

        let fill = match self.attrs.pool_type() {
            PoolType::Max => f32::NEG_INFINITY,
            PoolType::Avg => 0.0,
        };
        let padded = pad(x, &spatial, &pads, fill)?;
        let pstrides = padded.shape().strides();

        // Flat offsets of every kernel tap relative to the window origin.
        let mut taps = vec![0usize];
        for (d, &ax) in spatial.iter().enumerate() {
            let k = self.attrs.kernel_size()[d];
            let step = pstrides[ax];
            taps = taps
                .iter()
                .flat_map(|&t| (0..k).map(move |i| t + i * step))
                .collect();
        }

        let out_shape = geometry.output_shape();
        let mut out = Vec::with_capacity(out_shape.numel());
        for o in 0..out_shape.numel() {
            let idx = out_shape.unravel(o);
            let mut origin = 0usize;
            let mut real = 1usize;
            for (a, &i) in idx.iter().enumerate() {
                match spatial.iter().position(|&ax| ax == a) {
                    Some(d) => {
                        let g = &geometry.axes[d];
                        origin += i * g.stride * pstrides[a];
                        real *= g.valid(i).len();
                    }
                    None => origin += i * pstrides[a],
                }
            }
            let window = taps.iter().map(|&t| padded.data()[origin + t]);
            let value = match self.attrs.pool_type() {
                PoolType::Max => window.fold(f32::NEG_INFINITY, f32::max),
                PoolType::Avg => {
                    let sum: f32 = window.sum();
                    let divisor = if self.attrs.exclusive() { real } else { taps.len() };
                    if divisor == 0 {
                        return Err(OpdiffError::Compiler(format!(
                            "pool kernel: output {idx:?} has an empty window"
                        )));
                    }
                    sum / divisor as f32
                }
            };
            out.push(value);
        }
        Tensor::from_vec(out, out_shape)
    }
}

/// Copy `x` into a buffer grown by `pads[d] = (before, after)` along each
/// axis in `spatial`, filling the border with `fill`.
fn pad(x: &Tensor, spatial: &[usize], pads: &[(usize, usize)], fill: f32) -> Result<Tensor> {
    let mut dims = x.shape().dims().to_vec();
    for (&ax, &(before, after)) in spatial.iter().zip(pads) {
        dims[ax] = dims[ax]
            .checked_add(before)
            .and_then(|d| d.checked_add(after))
            .ok_or_else(|| too_large(x.shape(), pads))?;
    }
    let fits = dims
        .iter()
        .try_fold(1usize, |n, &d| n.checked_mul(d))
        .is_some_and(|n| n <= MAX_ELEMENTS);
    if !fits {
        return Err(too_large(x.shape(), pads));
    }
    let mut padded = Tensor::full(&Shape::new(dims), fill);
    let pstrides = padded.shape().strides();

    let data = padded.data_mut();
    for (flat, &v) in x.data().iter().enumerate() {
        let idx = x.shape().unravel(flat);
        let mut dst = 0usize;
        for (a, &i) in idx.iter().enumerate() {
            let shift = spatial
                .iter()
                .position(|&ax| ax == a)
                .map_or(0, |d| pads[d].0);
            dst += (i + shift) * pstrides[a];
        }
        data[dst] = v;
    }
    Ok(padded)
}

fn too_large(shape: &Shape, pads: &[(usize, usize)]) -> OpdiffError {
    OpdiffError::Compiler(format!(
        "pool kernel: padding {pads:?} of {shape} exceeds the addressable buffer size"
    ))
}
