//! Foundational types for differential testing of tensor-compiler operators.
//!
//! `opdiff-core` provides the owned `Tensor` and `Shape` types, the closed set
//! of `DataFormat` layouts with their axis-permutation table, the typed
//! `AttributeSet` records handed to both the operator under test and the
//! reference oracle, and the `Backend` trait that stands for the external
//! compiler contract.
//!
//! # Crates
//!
//! - `opdiff-ops`: output-shape inference and pooling window geometry
//! - `opdiff-cpu`: the pure Rust reference oracle
//! - `opdiff-conformance`: tolerance-based comparison with deviation reports
//! - `opdiff-parity`: the test orchestrator driving a backend against the oracle

pub mod attrs;
pub mod backend;
pub mod bag;
pub mod layout;
pub mod op;
pub mod report;
pub mod tensor;
pub mod types;

pub use attrs::{AttributeSet, NormAttrs, PoolAttrs, PoolType};
pub use backend::Backend;
pub use bag::{AttrBag, AttrValue};
pub use layout::DataFormat;
pub use op::OpKind;
pub use report::{Deviation, MismatchReport};
pub use tensor::Tensor;
pub use types::Shape;

pub type Result<T> = std::result::Result<T, OpdiffError>;

#[derive(thiserror::Error, Debug)]
pub enum OpdiffError {
    /// Malformed attribute set, unsupported layout or op/attribute pairing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Shape mismatch for output {output}: expected {expected}, got {got}")]
    ShapeMismatch {
        output: usize,
        expected: Shape,
        got: Shape,
    },

    #[error("Output count mismatch: expected {expected}, got {got}")]
    OutputCount { expected: usize, got: usize },

    #[error("Numeric mismatch: {0}")]
    NumericMismatch(Box<MismatchReport>),

    /// Raised by the backend under test; never produced by the harness itself.
    #[error("Compiler error: {0}")]
    Compiler(String),

    /// Any other error the backend under test returned, with its variant intact.
    #[error("Compiler error from backend {backend}: {source}")]
    Backend {
        backend: String,
        #[source]
        source: Box<OpdiffError>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl OpdiffError {
    /// Whether this error belongs to the configuration category.
    pub fn is_configuration(&self) -> bool {
        matches!(self, OpdiffError::Configuration(_))
    }

    /// Whether this error was raised by the backend under test.
    pub fn is_compiler(&self) -> bool {
        matches!(self, OpdiffError::Compiler(_) | OpdiffError::Backend { .. })
    }

    /// Whether this error reports an output shape or arity disagreement.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            OpdiffError::ShapeMismatch { .. } | OpdiffError::OutputCount { .. }
        )
    }
}
