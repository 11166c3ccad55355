use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::MathError;

/// Magnitude below which a vector is treated as zero length.
pub const NORMALIZE_EPSILON: f32 = 1e-6;

/// Immutable three component vector.
///
/// Every operation returns a new value; nothing mutates in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3D {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Self) -> Self {
        Self::from(Vec3::from(self) + Vec3::from(other))
    }

    pub fn subtract(self, other: Self) -> Self {
        Self::from(Vec3::from(self) - Vec3::from(other))
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::from(Vec3::from(self) * factor)
    }

    pub fn dot(self, other: Self) -> f32 {
        Vec3::from(self).dot(Vec3::from(other))
    }

    pub fn cross(self, other: Self) -> Self {
        Self::from(Vec3::from(self).cross(Vec3::from(other)))
    }

    pub fn length(self) -> f32 {
        Vec3::from(self).length()
    }

    /// Returns the unit vector pointing in the same direction.
    ///
    /// Fails with [`MathError::DegenerateVector`] when the magnitude is below
    /// [`NORMALIZE_EPSILON`] or not finite.
    pub fn normalize(self) -> Result<Self, MathError> {
        let length = self.length();
        if !length.is_finite() || length < NORMALIZE_EPSILON {
            return Err(MathError::DegenerateVector);
        }
        Ok(self.scale(1.0 / length))
    }

    pub fn is_finite(self) -> bool {
        Vec3::from(self).is_finite()
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn approx_eq(self, other: Self, tolerance: f32) -> bool {
        Vec3::from(self).abs_diff_eq(Vec3::from(other), tolerance)
    }
}

impl From<Vec3> for Vector3D {
    fn from(value: Vec3) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<Vector3D> for Vec3 {
    fn from(value: Vector3D) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

impl From<[f32; 3]> for Vector3D {
    fn from(value: [f32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

impl fmt::Display for Vector3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}
