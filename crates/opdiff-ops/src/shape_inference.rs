//! Shape inference for the supported ops.
//!
//! Given an `OpKind`, its attributes, and input shapes, computes the output
//! shapes. Output shape is a pure function of these; no tensor data is read,
//! so a malformed declaration is rejected before anything is materialized.

use opdiff_core::{AttributeSet, OpKind, OpdiffError, Shape};

use crate::PoolGeometry;

/// Error returned when shapes or attributes are incompatible for an op.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("shape mismatch: {0}")]
    Mismatch(String),

    #[error("{context} expects a rank-{expected} input, got {got}")]
    Rank {
        context: String,
        expected: usize,
        got: Shape,
    },

    #[error("spatial axis {axis}: padded extent {padded} is smaller than kernel {kernel}")]
    KernelTooLarge {
        axis: usize,
        padded: usize,
        kernel: usize,
    },

    #[error(
        "spatial axis {axis}: output position {index} covers {start}..{end}, outside input extent {input}"
    )]
    EmptyWindow {
        axis: usize,
        index: usize,
        start: isize,
        end: isize,
        input: usize,
    },

    #[error("{0}")]
    Attributes(String),

    #[error("{0} overflows the addressable extent")]
    Overflow(String),
}

impl From<ShapeError> for OpdiffError {
    fn from(e: ShapeError) -> Self {
        OpdiffError::Configuration(e.to_string())
    }
}

/// Infer the output shapes for `op` applied to `inputs` with `attrs`.
pub fn infer_shape(
    op: OpKind,
    attrs: &AttributeSet,
    inputs: &[&Shape],
) -> Result<Vec<Shape>, ShapeError> {
    attrs
        .validate_for(op)
        .map_err(|e| ShapeError::Attributes(e.to_string()))?;
    if inputs.len() != op.num_inputs() {
        return Err(ShapeError::Mismatch(format!(
            "{op} expects {} inputs, got {}",
            op.num_inputs(),
            inputs.len()
        )));
    }
    let x = inputs[0];

    match (op, attrs) {
        (OpKind::Pool1d | OpKind::Pool2d | OpKind::Pool3d, AttributeSet::Pool(pool)) => {
            Ok(vec![PoolGeometry::new(x, pool)?.output_shape()])
        }

        // Per-channel statistics broadcast over axis 1.
        (OpKind::BatchNorm, _) => {
            if x.ndim() < 2 {
                return Err(ShapeError::Rank {
                    context: op.to_string(),
                    expected: 2,
                    got: x.clone(),
                });
            }
            let channels = x.dims()[1];
            let stats = inputs[1];
            if stats.dims() != [4, channels] {
                return Err(ShapeError::Mismatch(format!(
                    "batchnorm statistics must be [4, {channels}] for input {x}, got {stats}"
                )));
            }
            Ok(vec![x.clone()])
        }

        // Activations preserve shape.
        (OpKind::Relu | OpKind::Relu6, _) => Ok(vec![x.clone()]),

        (op, attrs) => Err(ShapeError::Attributes(format!(
            "{op} does not accept {} attributes",
            attrs.family()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opdiff_core::bag::{
        DATA_FORMAT, EXCLUSIVE, KERNEL_SIZE, PADDING_SIZE, POOL_TYPE, STRIDE_SIZE,
    };
    use opdiff_core::{AttrBag, AttrValue, DataFormat, NormAttrs, PoolAttrs, PoolType};

    fn s(dims: &[usize]) -> Shape {
        Shape::new(dims.to_vec())
    }

    fn pool(
        pool_type: PoolType,
        k: &[usize],
        st: &[usize],
        p: &[usize],
        f: DataFormat,
    ) -> AttributeSet {
        PoolAttrs::new(pool_type, k, st, p, f).unwrap().into()
    }

    #[test]
    fn test_pool1d_ncw() {
        let a = pool(PoolType::Max, &[2], &[2], &[1, 1], DataFormat::Ncw);
        let out = infer_shape(OpKind::Pool1d, &a, &[&s(&[1, 3, 8])]).unwrap();
        assert_eq!(out, vec![s(&[1, 3, 5])]);
    }

    #[test]
    fn test_pool1d_nwc_ceil() {
        let a: AttributeSet = PoolAttrs::new(PoolType::Avg, &[2], &[3], &[4, 5], DataFormat::Nwc)
            .unwrap()
            .with_ceil_mode(true)
            .with_exclusive(false)
            .into();
        let out = infer_shape(OpKind::Pool1d, &a, &[&s(&[1, 8, 3])]).unwrap();
        assert_eq!(out, vec![s(&[1, 6, 3])]);
    }

    #[test]
    fn test_pool3d_ncdhw() {
        let a = pool(PoolType::Avg, &[2, 2, 2], &[2, 2, 2], &[1; 6], DataFormat::Ncdhw);
        let out = infer_shape(OpKind::Pool3d, &a, &[&s(&[1, 3, 8, 8, 8])]).unwrap();
        assert_eq!(out, vec![s(&[1, 3, 5, 5, 5])]);
    }

    #[test]
    fn test_pool_op_rank_disagrees_with_attrs() {
        let a = pool(PoolType::Max, &[2], &[2], &[1, 1], DataFormat::Ncw);
        let err = infer_shape(OpKind::Pool2d, &a, &[&s(&[1, 3, 8])]).unwrap_err();
        assert!(matches!(err, ShapeError::Attributes(_)));
        assert!(OpdiffError::from(err).is_configuration());
    }

    #[test]
    fn test_pool_input_rank_disagrees_with_format() {
        let a = pool(PoolType::Max, &[2, 2], &[2, 2], &[0; 4], DataFormat::Nhwc);
        assert!(infer_shape(OpKind::Pool2d, &a, &[&s(&[1, 8, 3])]).is_err());
    }

    #[test]
    fn test_batchnorm() {
        let a = AttributeSet::Norm(NormAttrs::default());
        let out = infer_shape(OpKind::BatchNorm, &a, &[&s(&[1, 3, 2, 2]), &s(&[4, 3])]).unwrap();
        assert_eq!(out, vec![s(&[1, 3, 2, 2])]);
        assert!(infer_shape(OpKind::BatchNorm, &a, &[&s(&[1, 3, 2, 2]), &s(&[4, 2])]).is_err());
        assert!(infer_shape(OpKind::BatchNorm, &a, &[&s(&[3]), &s(&[4, 3])]).is_err());
        assert!(infer_shape(OpKind::BatchNorm, &a, &[&s(&[1, 3, 2, 2])]).is_err());
    }

    #[test]
    fn test_activation_preserves_shape() {
        let out = infer_shape(OpKind::Relu6, &AttributeSet::Empty, &[&s(&[32, 32])]).unwrap();
        assert_eq!(out, vec![s(&[32, 32])]);
    }

    #[test]
    fn test_wrong_family() {
        let a = AttributeSet::Norm(NormAttrs::default());
        assert!(infer_shape(OpKind::Relu, &a, &[&s(&[4])]).is_err());
    }

    fn pool1d_bag(padding: Vec<i64>) -> AttrBag {
        let mut bag = AttrBag::new();
        bag.insert(KERNEL_SIZE.into(), AttrValue::Ints(vec![2]));
        bag.insert(STRIDE_SIZE.into(), AttrValue::Ints(vec![2]));
        bag.insert(PADDING_SIZE.into(), AttrValue::Ints(padding));
        bag.insert(POOL_TYPE.into(), AttrValue::Str("avg".into()));
        bag.insert(EXCLUSIVE.into(), AttrValue::Bool(false));
        bag.insert(DATA_FORMAT.into(), AttrValue::Str("NCW".into()));
        bag
    }

    #[test]
    fn test_huge_padding_is_a_configuration_error() {
        for padding in [vec![i64::MAX, i64::MAX], vec![i64::MAX, 0], vec![0, i64::MAX]] {
            let a = AttributeSet::from_bag(OpKind::Pool1d, &pool1d_bag(padding.clone())).unwrap();
            let err = infer_shape(OpKind::Pool1d, &a, &[&s(&[1, 1, 8])]).unwrap_err();
            assert!(matches!(err, ShapeError::Overflow(_)), "{padding:?}: {err}");
            assert!(OpdiffError::from(err).is_configuration());
        }
    }

    #[test]
    fn test_unaddressable_output_is_a_configuration_error() {
        // Each axis pools to 2^41 + 8 positions; their product overflows.
        let p = 1usize << 40;
        let a: AttributeSet =
            PoolAttrs::new(PoolType::Avg, &[1, 1, 1], &[1, 1, 1], &[p; 6], DataFormat::Ncdhw)
                .unwrap()
                .with_exclusive(false)
                .into();
        let err = infer_shape(OpKind::Pool3d, &a, &[&s(&[1, 1, 8, 8, 8])]).unwrap_err();
        assert!(matches!(err, ShapeError::Overflow(_)), "{err}");
    }
}
