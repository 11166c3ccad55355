//! Vector and matrix value types used by the camera and renderer.

mod matrix;
mod vector;

pub use matrix::{TransformationMatrix, SINGULAR_EPSILON};
pub use vector::{Vector3D, NORMALIZE_EPSILON};
