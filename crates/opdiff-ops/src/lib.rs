//! Shape inference and pooling window geometry.

pub mod pool;
pub mod shape_inference;

pub use pool::{AxisGeometry, MAX_ELEMENTS, PoolGeometry, pool_output_extent};
pub use shape_inference::{ShapeError, infer_shape};
