//! Single-op differential test runner.
//!
//! A case runs in five steps, stopping at the first failure:
//!
//! 1. Validate the declaration and infer the expected output shapes. A bad
//!    declaration is a configuration error and no tensor is created.
//! 2. Materialize one tensor per input shape from the seeded generator.
//! 3. Run the backend under test. Any error it raises is reported as a
//!    compiler error.
//! 4. Run the reference oracle on the same inputs.
//! 5. Check output count and shapes, then compare values within tolerance.

use opdiff_conformance::{Comparison, Tolerance, check_allclose};
use opdiff_core::{AttributeSet, Backend, OpKind, OpdiffError, Result, Shape, Tensor};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{HarnessConfig, InputGen};

/// A declarative single-op test: input shapes, optional expected output
/// shapes, the op, and its attributes.
#[derive(Clone, Debug, Serialize)]
pub struct OpCase {
    pub name: String,
    pub op: OpKind,
    pub attrs: AttributeSet,
    pub inputs: Vec<Shape>,
    /// When `None`, the expected shapes are the oracle's output shapes.
    pub outputs: Option<Vec<Shape>>,
    /// Generator per input; inputs past the end use `InputGen::Uniform`.
    pub input_gen: Vec<InputGen>,
    /// Overrides the harness tolerance for this case.
    pub tolerance: Option<Tolerance>,
}

impl OpCase {
    pub fn new(
        name: impl Into<String>,
        op: OpKind,
        attrs: impl Into<AttributeSet>,
        inputs: Vec<Shape>,
    ) -> Self {
        Self {
            name: name.into(),
            op,
            attrs: attrs.into(),
            inputs,
            outputs: None,
            input_gen: Vec::new(),
            tolerance: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<Shape>) -> Self {
        self.outputs = Some(outputs);
        self
    }

    pub fn with_input_gen(mut self, input_gen: Vec<InputGen>) -> Self {
        self.input_gen = input_gen;
        self
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    fn gen_for(&self, input: usize) -> InputGen {
        self.input_gen.get(input).copied().unwrap_or_default()
    }

    /// Check the declaration and return the expected output shapes.
    pub fn expected_shapes(&self) -> Result<Vec<Shape>> {
        let inputs: Vec<&Shape> = self.inputs.iter().collect();
        let inferred = opdiff_ops::infer_shape(self.op, &self.attrs, &inputs)?;
        if let Some(declared) = &self.outputs {
            if *declared != inferred {
                return Err(OpdiffError::Configuration(format!(
                    "case {}: declared outputs {:?} disagree with inferred {:?}",
                    self.name, declared, inferred
                )));
            }
        }
        Ok(inferred)
    }
}

/// Result of a passing case.
#[derive(Clone, Debug, Serialize)]
pub struct CaseOutcome {
    pub name: String,
    pub op: OpKind,
    pub backend: String,
    pub seed: u64,
    pub outputs: Vec<Comparison>,
}

/// Drives one backend against the reference oracle.
pub struct OpTester<B> {
    backend: B,
    config: HarnessConfig,
}

impl<B: Backend> OpTester<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, HarnessConfig::default())
    }

    pub fn with_config(backend: B, config: HarnessConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Generate the inputs of `case` from the configured seed.
    pub fn materialize(&self, case: &OpCase) -> Result<Vec<Tensor>> {
        case.inputs
            .iter()
            .enumerate()
            .map(|(i, shape)| {
                let seed = self.config.seed.wrapping_add(i as u64);
                let data = case
                    .gen_for(i)
                    .generate(shape.numel(), seed, self.config.data);
                Tensor::from_vec(data, shape.clone())
            })
            .collect()
    }

    pub fn run(&self, case: &OpCase) -> Result<CaseOutcome> {
        let op = case.op;
        let seed = self.config.seed;
        let expected_shapes = case.expected_shapes()?;

        let inputs = self.materialize(case)?;
        debug!(case = %case.name, %op, seed, inputs = ?case.inputs, "inputs materialized");

        let actual = self
            .backend
            .compile_and_run(op, &case.attrs, &inputs)
            .map_err(|e| attribute_to_backend(self.backend.name(), e))?;
        debug!(case = %case.name, backend = self.backend.name(), outputs = actual.len(), "backend returned");

        let expected = vec![opdiff_cpu::reference(op, &case.attrs, &inputs)?];
        debug!(case = %case.name, shape = %expected[0].shape(), "oracle evaluated");

        if actual.len() != expected_shapes.len() {
            warn!(case = %case.name, expected = expected_shapes.len(), got = actual.len(), "output count mismatch");
            return Err(OpdiffError::OutputCount {
                expected: expected_shapes.len(),
                got: actual.len(),
            });
        }
        for (i, (out, shape)) in actual.iter().zip(&expected_shapes).enumerate() {
            if out.shape() != shape {
                warn!(case = %case.name, output = i, expected = %shape, got = %out.shape(), "shape mismatch");
                return Err(OpdiffError::ShapeMismatch {
                    output: i,
                    expected: shape.clone(),
                    got: out.shape().clone(),
                });
            }
        }

        let tol = case.tolerance.unwrap_or(self.config.tolerance);
        let comparisons = actual
            .iter()
            .zip(&expected)
            .enumerate()
            .map(|(i, (a, e))| check_allclose(a, e, tol, i))
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| warn!(case = %case.name, %op, seed, error = %e, "numeric mismatch"))?;
        debug!(case = %case.name, "passed");

        Ok(CaseOutcome {
            name: case.name.clone(),
            op,
            backend: self.backend.name().to_string(),
            seed,
            outputs: comparisons,
        })
    }
}

fn attribute_to_backend(backend: &str, e: OpdiffError) -> OpdiffError {
    match e {
        OpdiffError::Compiler(_) | OpdiffError::Backend { .. } => e,
        other => OpdiffError::Backend {
            backend: backend.to_string(),
            source: Box::new(other),
        },
    }
}
