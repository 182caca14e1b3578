//! Tensor type: an owned, shape-tagged buffer of f32 values.
//!
//! Tensors are created fresh for every test case and dropped after the
//! comparison. Nothing is shared between cases: cloning copies the buffer.

use crate::{OpdiffError, Result, Shape};

/// A dense row-major f32 tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

impl Tensor {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &Shape) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor filled with `value`.
    pub fn full(shape: &Shape, value: f32) -> Self {
        Self {
            shape: shape.clone(),
            data: vec![value; shape.numel()],
        }
    }

    /// Create a tensor from f32 data.
    pub fn from_f32(data: &[f32], shape: &Shape) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape.clone())
    }

    /// Create a tensor taking ownership of `data`.
    pub fn from_vec(data: Vec<f32>, shape: Shape) -> Result<Self> {
        let expected = shape.numel();
        if data.len() != expected {
            return Err(OpdiffError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                data.len(),
                shape,
                expected,
            )));
        }
        Ok(Self { shape, data })
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Get the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Element at a multi-index, or None if out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        self.shape.offset(index).map(|flat| self.data[flat])
    }

    // ── Shape manipulation ──────────────────────────────────────────────

    /// Permute axes: output axis `i` is input axis `perm[i]`.
    pub fn transpose(&self, perm: &[usize]) -> Result<Tensor> {
        let ndim = self.shape.ndim();
        if perm.len() != ndim {
            return Err(OpdiffError::InvalidArgument(format!(
                "transpose axes length {} must match ndim {ndim}",
                perm.len()
            )));
        }
        let mut seen = vec![false; ndim];
        for &ax in perm {
            if ax >= ndim || std::mem::replace(&mut seen[ax], true) {
                return Err(OpdiffError::InvalidArgument(format!(
                    "{perm:?} is not a permutation of {ndim} axes"
                )));
            }
        }
        if perm.iter().enumerate().all(|(i, &ax)| i == ax) {
            return Ok(self.clone());
        }

        let new_shape = self.shape.permuted(perm);
        let old_strides = self.shape.strides();
        // Stride in the source buffer for each output axis.
        let gather: Vec<usize> = perm.iter().map(|&ax| old_strides[ax]).collect();

        let mut data = Vec::with_capacity(self.data.len());
        let mut index = vec![0usize; ndim];
        for _ in 0..self.data.len() {
            let src: usize = index.iter().zip(&gather).map(|(i, s)| i * s).sum();
            data.push(self.data[src]);
            // Odometer increment over the new shape.
            for axis in (0..ndim).rev() {
                index[axis] += 1;
                if index[axis] < new_shape.0[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Ok(Tensor {
            shape: new_shape,
            data,
        })
    }
}
