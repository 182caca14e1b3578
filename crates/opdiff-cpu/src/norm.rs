//! Inference-mode batch normalization.
//!
//! `stats` stacks four per-channel rows: mean, variance, scale, bias. The
//! channel axis is always axis 1.

use opdiff_core::{AttributeSet, NormAttrs, OpKind, OpdiffError, Result, Tensor};

/// `(x - mean[c]) / sqrt(var[c] + eps) * scale[c] + bias[c]` for every channel `c`.
pub fn batch_norm(x: &Tensor, stats: &Tensor, attrs: &NormAttrs) -> Result<Tensor> {
    opdiff_ops::infer_shape(
        OpKind::BatchNorm,
        &AttributeSet::Norm(*attrs),
        &[x.shape(), stats.shape()],
    )?;

    let dims = x.shape().dims();
    let channels = dims[1];
    let inner: usize = dims[2..].iter().product();
    let eps = attrs.epsilon();
    let s = stats.data();
    let (mean, var, scale, bias) = (
        &s[..channels],
        &s[channels..2 * channels],
        &s[2 * channels..3 * channels],
        &s[3 * channels..],
    );

    let mut denom = Vec::with_capacity(channels);
    for c in 0..channels {
        let v = var[c] + eps;
        if v.is_nan() || v < 0.0 {
            return Err(OpdiffError::InvalidArgument(format!(
                "batchnorm channel {c}: variance + epsilon = {v} is negative"
            )));
        }
        denom.push(v.sqrt());
    }

    let mut out = x.clone();
    if inner == 0 {
        return Ok(out);
    }
    for (i, block) in out.data_mut().chunks_exact_mut(inner).enumerate() {
        let c = i % channels;
        for v in block {
            *v = (*v - mean[c]) / denom[c] * scale[c] + bias[c];
        }
    }
    Ok(out)
}
