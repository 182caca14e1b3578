//! Kernel interpreter, a stand-in for the compiled operator under test.
//!
//! `compile` turns an op and its attributes into a [`Kernel`]; `run` executes
//! it on materialized inputs. The arithmetic deliberately follows a lowered
//! kernel (padded buffers, fixed tap lists, fused per-channel affine) rather
//! than the reference oracle, so the two are independent implementations of
//! the same math.

pub mod pool;

pub use pool::PoolKernel;

use opdiff_core::backend::require_input;
use opdiff_core::{AttributeSet, Backend, OpKind, OpdiffError, Result, Tensor};
use tracing::debug;

/// An executable kernel for one op.
#[derive(Clone, Debug)]
pub enum Kernel {
    Pool(PoolKernel),
    BatchNorm { epsilon: f32 },
    Relu,
    Relu6,
}

/// Compile `op` with `attrs`.
///
/// Unsupported op/attribute pairings fail with [`OpdiffError::Compiler`].
pub fn compile(op: OpKind, attrs: &AttributeSet) -> Result<Kernel> {
    attrs
        .validate_for(op)
        .map_err(|e| OpdiffError::Compiler(format!("cannot compile {op}: {e}")))?;
    let kernel = match (op, attrs) {
        (OpKind::Pool1d | OpKind::Pool2d | OpKind::Pool3d, AttributeSet::Pool(p)) => {
            Kernel::Pool(PoolKernel::new(p.clone()))
        }
        (OpKind::BatchNorm, AttributeSet::Norm(n)) => Kernel::BatchNorm {
            epsilon: n.epsilon(),
        },
        (OpKind::Relu, _) => Kernel::Relu,
        (OpKind::Relu6, _) => Kernel::Relu6,
        (op, attrs) => {
            return Err(OpdiffError::Compiler(format!(
                "no kernel for {op} with {} attributes",
                attrs.family()
            )));
        }
    };
    debug!(%op, ?kernel, "compiled kernel");
    Ok(kernel)
}

impl Kernel {
    /// Number of input tensors the kernel reads.
    pub fn num_inputs(&self) -> usize {
        match self {
            Kernel::BatchNorm { .. } => 2,
            _ => 1,
        }
    }

    pub fn run(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if inputs.len() != self.num_inputs() {
            return Err(OpdiffError::Compiler(format!(
                "kernel expects {} inputs, got {}",
                self.num_inputs(),
                inputs.len()
            )));
        }
        let x = &inputs[0];
        let out = match self {
            Kernel::Pool(k) => k.run(x)?,
            Kernel::BatchNorm { epsilon } => batch_norm(x, &inputs[1], *epsilon)?,
            Kernel::Relu => unary(x, |v| if v > 0.0 { v } else { 0.0 }),
            Kernel::Relu6 => unary(x, |v| {
                if v < 0.0 {
                    0.0
                } else if v > 6.0 {
                    6.0
                } else {
                    v
                }
            }),
        };
        Ok(vec![out])
    }
}

fn unary(x: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let mut out = x.clone();
    for v in out.data_mut() {
        *v = f(*v);
    }
    out
}

/// Per-channel `x * a[c] + b[c]` with `a = scale / sqrt(var + eps)` and
/// `b = bias - mean * a`, channel on axis 1.
fn batch_norm(x: &Tensor, stats: &Tensor, epsilon: f32) -> Result<Tensor> {
    let dims = x.shape().dims();
    if dims.len() < 2 || stats.shape().dims() != [4, dims[1]] {
        return Err(OpdiffError::Compiler(format!(
            "batchnorm kernel: incompatible input {} and statistics {}",
            x.shape(),
            stats.shape()
        )));
    }
    let channels = dims[1];
    let stride = x.shape().strides()[1];
    let s = stats.data();
    let row = |r: usize, c: usize| s[r * channels + c];

    let (a, b): (Vec<f32>, Vec<f32>) = (0..channels)
        .map(|c| {
            let a = row(2, c) / (row(1, c) + epsilon).sqrt();
            (a, row(3, c) - row(0, c) * a)
        })
        .unzip();

    let data = x
        .data()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = (i / stride) % channels;
            v * a[c] + b[c]
        })
        .collect();
    Tensor::from_vec(data, x.shape().clone())
}

/// The interpreter as a compile-and-run backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct Interpreter;

impl Backend for Interpreter {
    fn name(&self) -> &str {
        "interp"
    }

    fn compile_and_run(
        &self,
        op: OpKind,
        attrs: &AttributeSet,
        inputs: &[Tensor],
    ) -> Result<Vec<Tensor>> {
        let kernel = compile(op, attrs)?;
        require_input(op, inputs, op.num_inputs() - 1)?;
        kernel.run(inputs)
    }
}
