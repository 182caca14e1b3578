//! Operator names understood by the compiler contract.

use serde::{Deserialize, Serialize};

use crate::{OpdiffError, Result};

/// The set of operators the harness can drive and check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    // ── Pooling ─────────────────────────────────────────────────────────
    Pool1d,
    Pool2d,
    Pool3d,

    // ── Normalization ───────────────────────────────────────────────────
    /// Inference-mode batch normalization over axis 1 of an `[N, C, ...]` input.
    /// Inputs: `[x, stats]` where `stats = [mean; var; scale; bias]` is `[4, C]`.
    BatchNorm,

    // ── Activations ─────────────────────────────────────────────────────
    Relu,
    Relu6,
}

impl OpKind {
    pub const ALL: [OpKind; 6] = [
        OpKind::Pool1d,
        OpKind::Pool2d,
        OpKind::Pool3d,
        OpKind::BatchNorm,
        OpKind::Relu,
        OpKind::Relu6,
    ];

    /// The op name as the compiler spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Pool1d => "pool1d",
            OpKind::Pool2d => "pool2d",
            OpKind::Pool3d => "pool3d",
            OpKind::BatchNorm => "batchnorm",
            OpKind::Relu => "relu",
            OpKind::Relu6 => "relu6",
        }
    }

    /// Spatial rank for pooling ops.
    pub fn pool_rank(self) -> Option<usize> {
        match self {
            OpKind::Pool1d => Some(1),
            OpKind::Pool2d => Some(2),
            OpKind::Pool3d => Some(3),
            _ => None,
        }
    }

    /// Number of input tensors the op consumes.
    pub fn num_inputs(self) -> usize {
        match self {
            OpKind::BatchNorm => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpKind {
    type Err = OpdiffError;

    fn from_str(s: &str) -> Result<Self> {
        OpKind::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| OpdiffError::Configuration(format!("unknown op {s:?}")))
    }
}
