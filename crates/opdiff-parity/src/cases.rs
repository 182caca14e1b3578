//! The built-in op-test declarations.
//!
//! Every case is constructed fresh on each call; nothing is shared between
//! declarations.

use opdiff_core::{
    AttributeSet, DataFormat, NormAttrs, OpKind, PoolAttrs, PoolType, Result, Shape,
};

use crate::{InputGen, OpCase};

fn shape(dims: &[usize]) -> Shape {
    Shape::new(dims.to_vec())
}

fn pool(
    pool_type: PoolType,
    kernel: &[usize],
    stride: &[usize],
    padding: &[usize],
    ceil_mode: bool,
    exclusive: bool,
    format: DataFormat,
) -> Result<PoolAttrs> {
    Ok(PoolAttrs::new(pool_type, kernel, stride, padding, format)?
        .with_ceil_mode(ceil_mode)
        .with_exclusive(exclusive))
}

/// Cases expected to pass against a correct backend.
pub fn op_nn_cases() -> Result<Vec<OpCase>> {
    use DataFormat::*;
    use PoolType::*;

    Ok(vec![
        OpCase::new("relu", OpKind::Relu, AttributeSet::Empty, vec![shape(&[32])])
            .with_outputs(vec![shape(&[32])]),
        OpCase::new(
            "relu6",
            OpKind::Relu6,
            AttributeSet::Empty,
            vec![shape(&[32, 32])],
        )
        .with_outputs(vec![shape(&[32, 32])]),
        OpCase::new(
            "pool1d",
            OpKind::Pool1d,
            pool(Max, &[2], &[2], &[1, 1], false, true, Ncw)?,
            vec![shape(&[1, 3, 8])],
        ),
        OpCase::new(
            "pool1d_avg_exclusive",
            OpKind::Pool1d,
            pool(Avg, &[3], &[2], &[1, 1], false, true, Ncw)?,
            vec![shape(&[1, 3, 8])],
        )
        .with_outputs(vec![shape(&[1, 3, 4])]),
        OpCase::new(
            "pool1d_2",
            OpKind::Pool1d,
            pool(Avg, &[2], &[3], &[4, 5], true, false, Nwc)?,
            vec![shape(&[1, 8, 3])],
        ),
        OpCase::new(
            "pool1d_ceil_drop",
            OpKind::Pool1d,
            pool(Avg, &[2], &[5], &[2, 2], true, false, Ncw)?,
            vec![shape(&[1, 3, 6])],
        )
        .with_outputs(vec![shape(&[1, 3, 2])]),
        OpCase::new(
            "pool2d",
            OpKind::Pool2d,
            pool(Max, &[2, 2], &[2, 2], &[1, 1, 1, 1], false, true, Nchw)?,
            vec![shape(&[1, 3, 8, 8])],
        ),
        OpCase::new(
            "pool2d_2",
            OpKind::Pool2d,
            pool(Avg, &[2, 2], &[3, 3], &[2, 3, 4, 5], true, false, Nhwc)?,
            vec![shape(&[1, 8, 8, 3])],
        ),
        OpCase::new(
            "pool3d_1",
            OpKind::Pool3d,
            pool(Avg, &[2, 2, 2], &[2, 2, 2], &[1; 6], false, true, Ncdhw)?,
            vec![shape(&[1, 3, 8, 8, 8])],
        ),
        OpCase::new(
            "pool3d_2",
            OpKind::Pool3d,
            pool(
                Avg,
                &[2, 2, 2],
                &[2, 2, 2],
                &[1, 2, 3, 4, 5, 6],
                true,
                false,
                Ndhwc,
            )?,
            vec![shape(&[1, 8, 8, 8, 3])],
        ),
        OpCase::new(
            "batchnorm",
            OpKind::BatchNorm,
            NormAttrs::default(),
            vec![shape(&[1, 3, 2, 2]), shape(&[4, 3])],
        )
        .with_outputs(vec![shape(&[1, 3, 2, 2])])
        .with_input_gen(vec![InputGen::Uniform, InputGen::Positive]),
    ])
}

/// Declarations whose padding leaves a window with no input element under a
/// reduction that needs one. The harness must reject them before running.
pub fn rejected_cases() -> Result<Vec<OpCase>> {
    use DataFormat::*;
    use PoolType::*;

    Ok(vec![
        OpCase::new(
            "pool1d_1",
            OpKind::Pool1d,
            pool(Avg, &[2], &[2], &[2, 3], false, true, Ncw)?,
            vec![shape(&[1, 3, 8])],
        ),
        OpCase::new(
            "pool2d_1",
            OpKind::Pool2d,
            pool(Avg, &[2, 2], &[2, 2], &[2, 3, 4, 5], false, true, Nchw)?,
            vec![shape(&[1, 3, 8, 8])],
        ),
        OpCase::new(
            "pool3d",
            OpKind::Pool3d,
            pool(
                Max,
                &[2, 2, 2],
                &[2, 2, 2],
                &[1, 2, 3, 4, 5, 6],
                false,
                true,
                Ncdhw,
            )?,
            vec![shape(&[2, 3, 8, 8, 8])],
        ),
    ])
}
