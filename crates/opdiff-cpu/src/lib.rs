//! Pure Rust reference oracle, the correctness baseline for differential testing.
//!
//! Every op is computed directly from tensor data and the typed attribute
//! record, with no padded buffers and no dependence on how a compiler would
//! lower it. It favors readability over speed.

pub mod elementwise;
pub mod norm;
pub mod pooling;

pub use elementwise::{relu, relu6};
pub use norm::batch_norm;
pub use pooling::pool;

use opdiff_core::backend::require_input;
use opdiff_core::{AttributeSet, Backend, OpKind, Result, Tensor};

/// Reference backend; wraps [`reference`] behind the compiler contract.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceBackend;

impl Backend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn compile_and_run(
        &self,
        op: OpKind,
        attrs: &AttributeSet,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        reference(op, attrs, inputs).map(|out| vec![out])
    }
}

/// Compute the expected output of `op` on `inputs`.
pub fn reference(op: OpKind, attrs: &AttributeSet, inputs: &[Tensor]) -> Result<Tensor> {
    attrs.validate_for(op)?;
    let x = require_input(op, inputs, 0)?;
    match op {
        OpKind::Pool1d | OpKind::Pool2d | OpKind::Pool3d => pool(x, attrs.as_pool()?),
        OpKind::BatchNorm => {
            let stats = require_input(op, inputs, 1)?;
            batch_norm(x, stats, attrs.as_norm()?)
        }
        OpKind::Relu => Ok(relu(x)),
        OpKind::Relu6 => Ok(relu6(x)),
    }
}
