//! Pooling window geometry.
//!
//! Output extents follow
//! `floor((in + pad_before + pad_after - kernel) / stride) + 1` (or `ceil` in
//! ceil mode). In ceil mode a final window starting at or past the padded
//! extent is dropped. Window `o` covers input positions
//! `[o * stride - pad_before, o * stride - pad_before + kernel)`, clipped to
//! `[0, in)` when reading.

use std::ops::Range;

use opdiff_core::{DataFormat, PoolAttrs, PoolType, Shape};
use smallvec::SmallVec;

use crate::ShapeError;

/// Number of output positions along one spatial axis, or None when the
/// padded extent cannot hold a single window or does not fit in `usize`.
pub fn pool_output_extent(
    input: usize,
    kernel: usize,
    stride: usize,
    pad_before: usize,
    pad_after: usize,
    ceil_mode: bool,
) -> Option<usize> {
    if kernel == 0 || stride == 0 {
        return None;
    }
    let padded = padded_extent(input, pad_before, pad_after)?;
    let span = padded.checked_sub(kernel)?;
    let mut out = if ceil_mode {
        span.div_ceil(stride) + 1
    } else {
        span / stride + 1
    };
    // (out - 1) * stride >= padded, without the multiply.
    if ceil_mode && out - 1 >= padded.div_ceil(stride) {
        out -= 1;
    }
    Some(out)
}

/// Window bounds are signed, so the padded extent must fit in `isize`.
fn padded_extent(input: usize, pad_before: usize, pad_after: usize) -> Option<usize> {
    input
        .checked_add(pad_before)?
        .checked_add(pad_after)
        .filter(|&p| p <= isize::MAX as usize)
}

/// Largest element count an f32 buffer can hold.
pub const MAX_ELEMENTS: usize = isize::MAX as usize / std::mem::size_of::<f32>();

/// Geometry of one pooled axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisGeometry {
    pub input: usize,
    pub kernel: usize,
    pub stride: usize,
    pub pad_before: usize,
    pub pad_after: usize,
    pub output: usize,
}

impl AxisGeometry {
    pub fn new(
        axis: usize,
        input: usize,
        kernel: usize,
        stride: usize,
        pad_before: usize,
        pad_after: usize,
        ceil_mode: bool,
    ) -> Result<Self, ShapeError> {
        let padded = padded_extent(input, pad_before, pad_after).ok_or_else(|| {
            ShapeError::Overflow(format!(
                "spatial axis {axis}: input {input} padded by ({pad_before}, {pad_after})"
            ))
        })?;
        let output = pool_output_extent(input, kernel, stride, pad_before, pad_after, ceil_mode)
            .ok_or(ShapeError::KernelTooLarge {
                axis,
                padded,
                kernel,
            })?;
        Ok(Self {
            input,
            kernel,
            stride,
            pad_before,
            pad_after,
            output,
        })
    }

    /// Window of output position `o` in input coordinates, before clipping.
    pub fn window(&self, o: usize) -> Range<isize> {
        let start = (o * self.stride) as isize - self.pad_before as isize;
        start..start + self.kernel as isize
    }

    /// In-range input positions covered by output position `o`.
    pub fn valid(&self, o: usize) -> Range<usize> {
        let w = self.window(o);
        let start = w.start.clamp(0, self.input as isize) as usize;
        let end = w.end.clamp(0, self.input as isize) as usize;
        start..end.max(start)
    }

    /// The first output position whose window holds no input element.
    pub fn first_empty_window(&self) -> Option<usize> {
        (0..self.output).find(|&o| self.valid(o).is_empty())
    }
}

/// Geometry of a full pooling invocation, in canonical `[N, C, spatial...]` terms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolGeometry {
    pub batch: usize,
    pub channels: usize,
    pub axes: SmallVec<[AxisGeometry; 3]>,
    pub format: DataFormat,
}

impl PoolGeometry {
    /// Resolve the geometry of pooling a declared-layout `input` with `attrs`.
    ///
    /// Fails when the input rank disagrees with `data_format`, when a padded
    /// extent is shorter than its kernel, or when a window would hold no input
    /// element for a reduction that cannot tolerate it (max, exclusive avg).
    pub fn new(input: &Shape, attrs: &PoolAttrs) -> Result<Self, ShapeError> {
        let format = attrs.data_format();
        if input.ndim() != format.ndim() {
            return Err(ShapeError::Rank {
                context: format!("data_format {format}"),
                expected: format.ndim(),
                got: input.clone(),
            });
        }
        let dims = input.dims();
        let mut axes = SmallVec::new();
        for (d, ax) in format.spatial_axes().enumerate() {
            axes.push(AxisGeometry::new(
                d,
                dims[ax],
                attrs.kernel_size()[d],
                attrs.stride_size()[d],
                attrs.pad_before(d),
                attrs.pad_after(d),
                attrs.ceil_mode(),
            )?);
        }
        let geometry = Self {
            batch: dims[0],
            channels: dims[format.channel_axis()],
            axes,
            format,
        };
        let volume = std::iter::once(geometry.channels)
            .chain(geometry.axes.iter().map(|g| g.output))
            .try_fold(geometry.batch, |n, d| n.checked_mul(d))
            .filter(|&n| n <= MAX_ELEMENTS);
        if volume.is_none() {
            return Err(ShapeError::Overflow(format!(
                "pooled output of {input} with data_format {format}"
            )));
        }

        let needs_input = attrs.pool_type() == PoolType::Max || attrs.exclusive();
        if needs_input {
            geometry.check_no_empty_windows()?;
        }
        Ok(geometry)
    }

    fn check_no_empty_windows(&self) -> Result<(), ShapeError> {
        for (axis, g) in self.axes.iter().enumerate() {
            if let Some(index) = g.first_empty_window() {
                let w = g.window(index);
                return Err(ShapeError::EmptyWindow {
                    axis,
                    index,
                    start: w.start,
                    end: w.end,
                    input: g.input,
                });
            }
        }
        Ok(())
    }

    pub fn spatial_rank(&self) -> usize {
        self.axes.len()
    }

    pub fn canonical_output_shape(&self) -> Shape {
        let mut dims = vec![self.batch, self.channels];
        dims.extend(self.axes.iter().map(|g| g.output));
        Shape::new(dims)
    }

    /// Output shape in the declared layout.
    pub fn output_shape(&self) -> Shape {
        self.canonical_output_shape()
            .permuted(self.format.from_canonical_perm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn attrs(
        pool_type: PoolType,
        k: &[usize],
        s: &[usize],
        p: &[usize],
        f: DataFormat,
    ) -> PoolAttrs {
        PoolAttrs::new(pool_type, k, s, p, f).unwrap()
    }

    #[test]
    fn test_floor_extent() {
        // [1,3,8], k=2, s=2, pad=[1,1]: (8+2-2)/2+1 = 5
        assert_eq!(pool_output_extent(8, 2, 2, 1, 1, false), Some(5));
        assert_eq!(pool_output_extent(8, 3, 2, 0, 0, false), Some(3));
    }

    #[test]
    fn test_ceil_extent() {
        // in=8, pads 4+5, k=2, s=3: ceil(15/3)+1 = 6
        assert_eq!(pool_output_extent(8, 2, 3, 4, 5, true), Some(6));
        assert_eq!(pool_output_extent(8, 2, 3, 4, 5, false), Some(6));
        // span 7: floor 7/2 = 3 -> 4; ceil -> 5
        assert_eq!(pool_output_extent(9, 2, 2, 0, 0, false), Some(4));
        assert_eq!(pool_output_extent(9, 2, 2, 0, 0, true), Some(5));
    }

    #[test]
    fn test_ceil_drops_window_starting_at_padded_extent() {
        // padded = 10, k=2, s=5: ceil(8/5)+1 = 3 windows, the last starting at 10.
        assert_eq!(pool_output_extent(10, 2, 5, 0, 0, true), Some(2));
        assert_eq!(pool_output_extent(6, 2, 5, 2, 2, true), Some(2));
    }

    #[test]
    fn test_kernel_larger_than_padded_extent() {
        assert_eq!(pool_output_extent(2, 4, 1, 0, 1, false), None);
        assert_eq!(pool_output_extent(2, 4, 1, 1, 1, false), Some(1));
    }

    #[test]
    fn test_valid_window_clipping() {
        let g = AxisGeometry::new(0, 8, 2, 2, 1, 1, false).unwrap();
        assert_eq!(g.window(0), -1..1);
        assert_eq!(g.valid(0), 0..1);
        assert_eq!(g.valid(1), 1..3);
        assert_eq!(g.valid(4), 7..8);
        assert_eq!(g.first_empty_window(), None);
    }

    #[test]
    fn test_empty_window_detected() {
        // pads [2, 3] with k=2: window 0 spans -2..0
        let g = AxisGeometry::new(0, 8, 2, 2, 2, 3, false).unwrap();
        assert_eq!(g.first_empty_window(), Some(0));
    }

    #[test]
    fn test_geometry_channel_last_output_shape() {
        let a = attrs(PoolType::Avg, &[2, 2], &[3, 3], &[2, 3, 4, 5], DataFormat::Nhwc)
            .with_ceil_mode(true)
            .with_exclusive(false);
        let g = PoolGeometry::new(&Shape::new(vec![1, 8, 8, 3]), &a).unwrap();
        assert_eq!(g.channels, 3);
        assert_eq!(g.canonical_output_shape(), Shape::new(vec![1, 3, 5, 6]));
        assert_eq!(g.output_shape(), Shape::new(vec![1, 5, 6, 3]));
    }

    #[test]
    fn test_each_boundary_padding_is_independent() {
        // Only the leading pad of H.
        let a = attrs(PoolType::Max, &[2, 2], &[1, 1], &[1, 0, 0, 0], DataFormat::Nchw);
        let g = PoolGeometry::new(&Shape::new(vec![1, 1, 4, 4]), &a).unwrap();
        assert_eq!(g.output_shape(), Shape::new(vec![1, 1, 4, 3]));
        // Only the leading pad of W.
        let a = attrs(PoolType::Max, &[2, 2], &[1, 1], &[0, 1, 0, 0], DataFormat::Nchw);
        let g = PoolGeometry::new(&Shape::new(vec![1, 1, 4, 4]), &a).unwrap();
        assert_eq!(g.output_shape(), Shape::new(vec![1, 1, 3, 4]));
        // Only the trailing pad of H.
        let a = attrs(PoolType::Max, &[2, 2], &[1, 1], &[0, 0, 1, 0], DataFormat::Nchw);
        let g = PoolGeometry::new(&Shape::new(vec![1, 1, 4, 4]), &a).unwrap();
        assert_eq!(g.output_shape(), Shape::new(vec![1, 1, 4, 3]));
        assert_eq!(g.axes[0].pad_after, 1);
        assert_eq!(g.axes[0].pad_before, 0);
        // Only the trailing pad of W.
        let a = attrs(PoolType::Max, &[2, 2], &[1, 1], &[0, 0, 0, 1], DataFormat::Nchw);
        let g = PoolGeometry::new(&Shape::new(vec![1, 1, 4, 4]), &a).unwrap();
        assert_eq!(g.output_shape(), Shape::new(vec![1, 1, 3, 4]));
        assert_eq!(g.axes[1].pad_after, 1);
    }

    #[test]
    fn test_empty_windows_rejected_for_max_and_exclusive_avg() {
        let shape = Shape::new(vec![1, 3, 8]);
        let max = attrs(PoolType::Max, &[2], &[2], &[2, 3], DataFormat::Ncw);
        assert!(matches!(
            PoolGeometry::new(&shape, &max),
            Err(ShapeError::EmptyWindow { index: 0, .. })
        ));
        let excl = attrs(PoolType::Avg, &[2], &[2], &[2, 3], DataFormat::Ncw);
        assert!(PoolGeometry::new(&shape, &excl).is_err());
        let incl = excl.with_exclusive(false);
        let g = PoolGeometry::new(&shape, &incl).unwrap();
        assert_eq!(g.output_shape(), Shape::new(vec![1, 3, 6]));
    }

    #[test]
    fn test_rank_mismatch() {
        let a = attrs(PoolType::Max, &[2], &[2], &[0, 0], DataFormat::Ncw);
        assert!(matches!(
            PoolGeometry::new(&Shape::new(vec![1, 3, 8, 8]), &a),
            Err(ShapeError::Rank { expected: 3, .. })
        ));
    }

    proptest! {
        /// The extent matches the floor/ceil formula and every window starts
        /// inside the padded extent.
        #[test]
        fn extent_matches_formula(
            input in 1usize..=16,
            kernel in 1usize..=5,
            stride in 1usize..=5,
            pb in 0usize..=4,
            pa in 0usize..=4,
            ceil in any::<bool>(),
        ) {
            let padded = input + pb + pa;
            let got = pool_output_extent(input, kernel, stride, pb, pa, ceil);
            if padded < kernel {
                prop_assert_eq!(got, None);
            } else {
                let out = got.unwrap();
                let span = padded - kernel;
                let floor = span / stride + 1;
                let ceiled = span.div_ceil(stride) + 1;
                if ceil {
                    prop_assert!(out == ceiled || out == ceiled - 1);
                    prop_assert!((out - 1) * stride < padded);
                } else {
                    prop_assert_eq!(out, floor);
                }
                prop_assert!(out >= 1);
            }
        }

        /// Geometry accepted for exclusive average never yields an empty window.
        #[test]
        fn exclusive_avg_windows_never_empty(
            input in 1usize..=12,
            kernel in 1usize..=4,
            stride in 1usize..=4,
            pb in 0usize..=4,
            pa in 0usize..=4,
            ceil in any::<bool>(),
        ) {
            let a = attrs(PoolType::Avg, &[kernel], &[stride], &[pb, pa], DataFormat::Ncw)
                .with_ceil_mode(ceil);
            if let Ok(g) = PoolGeometry::new(&Shape::new(vec![1, 1, input]), &a) {
                for o in 0..g.axes[0].output {
                    prop_assert!(!g.axes[0].valid(o).is_empty());
                }
            }
        }
    }
}
