//! Backend trait: the black-box compiler contract.
//!
//! A `Backend` takes an op name, its attributes, and materialized inputs, and
//! returns completed outputs. The operator under test and the reference
//! oracle both implement it, so the harness can drive either one.

use crate::{AttributeSet, OpKind, Result, Tensor};

/// Pluggable compile-and-run engine.
///
/// Calls are blocking: a backend that runs asynchronously internally must
/// wait for completion before returning. Implementations must not keep
/// state between calls that changes results.
pub trait Backend: Send + Sync {
    /// Short human-readable name used in logs and reports.
    fn name(&self) -> &str;

    /// Compile `op` with `attrs` and evaluate it on `inputs`.
    fn compile_and_run(
        &self,
        op: OpKind,
        attrs: &AttributeSet,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>>;
}

impl<B: Backend + ?Sized> Backend for &B {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compile_and_run(
        &self,
        op: OpKind,
        attrs: &AttributeSet,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        (**self).compile_and_run(op, attrs, inputs)
    }
}

/// Fetch input `idx`, or fail with an argument error naming the op.
pub fn require_input(op: OpKind, inputs: &[Tensor], idx: usize) -> Result<&Tensor> {
    inputs.get(idx).ok_or_else(|| {
        crate::OpdiffError::InvalidArgument(format!(
            "{op} expects {} inputs, got {}",
            op.num_inputs(),
            inputs.len()
        ))
    })
}
