//! Typed attribute records, one variant per operator family.
//!
//! Records are validated when constructed and immutable afterwards, so a
//! malformed attribute combination fails before any tensor exists.

use serde::Serialize;
use smallvec::SmallVec;

use crate::{DataFormat, OpKind, OpdiffError, Result};

/// Default normalization epsilon.
pub const DEFAULT_EPSILON: f32 = 1e-5;

/// Pooling reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    Max,
    Avg,
}

impl PoolType {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolType::Max => "max",
            PoolType::Avg => "avg",
        }
    }
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PoolType {
    type Err = OpdiffError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(PoolType::Max),
            "avg" => Ok(PoolType::Avg),
            other => Err(OpdiffError::Configuration(format!(
                "unsupported pool_type {other:?}"
            ))),
        }
    }
}

/// Pooling attributes.
///
/// `padding_size` holds every leading pad followed by every trailing pad:
/// `[before_1, .., before_D, after_1, .., after_D]`. For 2-D that is
/// `[top, left, bottom, right]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolAttrs {
    kernel_size: SmallVec<[usize; 3]>,
    stride_size: SmallVec<[usize; 3]>,
    padding_size: SmallVec<[usize; 6]>,
    pool_type: PoolType,
    ceil_mode: bool,
    exclusive: bool,
    data_format: DataFormat,
}

impl PoolAttrs {
    /// Validate and build a pooling record with `ceil_mode = false` and
    /// `exclusive = true`.
    pub fn new(
        pool_type: PoolType,
        kernel_size: &[usize],
        stride_size: &[usize],
        padding_size: &[usize],
        data_format: DataFormat,
    ) -> Result<Self> {
        let rank = data_format.spatial_rank();
        if kernel_size.len() != rank {
            return Err(OpdiffError::Configuration(format!(
                "kernel_size {kernel_size:?} must have {rank} entries for data_format {data_format}"
            )));
        }
        if stride_size.len() != rank {
            return Err(OpdiffError::Configuration(format!(
                "stride_size {stride_size:?} must have {rank} entries for data_format {data_format}"
            )));
        }
        if padding_size.len() != 2 * rank {
            return Err(OpdiffError::Configuration(format!(
                "padding_size {padding_size:?} must have {} entries for data_format {data_format}",
                2 * rank
            )));
        }
        if kernel_size.contains(&0) {
            return Err(OpdiffError::Configuration(format!(
                "kernel_size {kernel_size:?} must be positive"
            )));
        }
        if stride_size.contains(&0) {
            return Err(OpdiffError::Configuration(format!(
                "stride_size {stride_size:?} must be positive"
            )));
        }
        Ok(Self {
            kernel_size: SmallVec::from_slice(kernel_size),
            stride_size: SmallVec::from_slice(stride_size),
            padding_size: SmallVec::from_slice(padding_size),
            pool_type,
            ceil_mode: false,
            exclusive: true,
            data_format,
        })
    }

    pub fn with_ceil_mode(mut self, ceil_mode: bool) -> Self {
        self.ceil_mode = ceil_mode;
        self
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn kernel_size(&self) -> &[usize] {
        &self.kernel_size
    }

    pub fn stride_size(&self) -> &[usize] {
        &self.stride_size
    }

    pub fn padding_size(&self) -> &[usize] {
        &self.padding_size
    }

    /// Leading padding of spatial axis `d`.
    pub fn pad_before(&self, d: usize) -> usize {
        self.padding_size[d]
    }

    /// Trailing padding of spatial axis `d`.
    pub fn pad_after(&self, d: usize) -> usize {
        self.padding_size[d + self.spatial_rank()]
    }

    pub fn pool_type(&self) -> PoolType {
        self.pool_type
    }

    pub fn ceil_mode(&self) -> bool {
        self.ceil_mode
    }

    pub fn exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn data_format(&self) -> DataFormat {
        self.data_format
    }

    pub fn spatial_rank(&self) -> usize {
        self.kernel_size.len()
    }

    /// Product of the kernel extents.
    pub fn kernel_volume(&self) -> usize {
        self.kernel_size.iter().product()
    }
}

/// Batch-normalization attributes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormAttrs {
    epsilon: f32,
}

impl NormAttrs {
    pub fn new(epsilon: f32) -> Result<Self> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(OpdiffError::Configuration(format!(
                "epsilon must be finite and non-negative, got {epsilon}"
            )));
        }
        Ok(Self { epsilon })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for NormAttrs {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// The declarative configuration of a single operator invocation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum AttributeSet {
    Pool(PoolAttrs),
    Norm(NormAttrs),
    /// Ops without attributes (activations).
    Empty,
}

impl AttributeSet {
    /// Check that this record belongs to `op`'s family and rank.
    pub fn validate_for(&self, op: OpKind) -> Result<()> {
        match (op, self) {
            (OpKind::Pool1d | OpKind::Pool2d | OpKind::Pool3d, AttributeSet::Pool(p)) => {
                let rank = op.pool_rank().unwrap_or_default();
                if p.spatial_rank() != rank {
                    return Err(OpdiffError::Configuration(format!(
                        "{op} requires a rank-{rank} data_format, got {}",
                        p.data_format()
                    )));
                }
                Ok(())
            }
            (OpKind::BatchNorm, AttributeSet::Norm(_)) => Ok(()),
            (OpKind::Relu | OpKind::Relu6, AttributeSet::Empty) => Ok(()),
            (op, attrs) => Err(OpdiffError::Configuration(format!(
                "{op} does not accept {} attributes",
                attrs.family()
            ))),
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            AttributeSet::Pool(_) => "pool",
            AttributeSet::Norm(_) => "norm",
            AttributeSet::Empty => "empty",
        }
    }

    pub fn as_pool(&self) -> Result<&PoolAttrs> {
        match self {
            AttributeSet::Pool(p) => Ok(p),
            other => Err(OpdiffError::Configuration(format!(
                "expected pool attributes, got {}",
                other.family()
            ))),
        }
    }

    pub fn as_norm(&self) -> Result<&NormAttrs> {
        match self {
            AttributeSet::Norm(n) => Ok(n),
            other => Err(OpdiffError::Configuration(format!(
                "expected norm attributes, got {}",
                other.family()
            ))),
        }
    }
}

impl From<PoolAttrs> for AttributeSet {
    fn from(p: PoolAttrs) -> Self {
        AttributeSet::Pool(p)
    }
}

impl From<NormAttrs> for AttributeSet {
    fn from(n: NormAttrs) -> Self {
        AttributeSet::Norm(n)
    }
}
