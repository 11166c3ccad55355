use std::f32::consts::PI;

use glam::{Mat4, Vec3};

use super::Vector3D;
use crate::error::MathError;

/// Determinant magnitude below which a matrix is considered singular.
pub const SINGULAR_EPSILON: f32 = 1e-8;

/// 4x4 affine transformation matrix.
///
/// Storage is column-major, matching `glam::Mat4` and the layout uploaded to
/// the GPU. Vectors are treated as column vectors, so `a.multiply(b)` applies
/// `b` first and then `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformationMatrix {
    inner: Mat4,
}

impl Default for TransformationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl TransformationMatrix {
    pub fn identity() -> Self {
        Self {
            inner: Mat4::IDENTITY,
        }
    }

    /// OpenGL style perspective projection mapping view depth to clip z in
    /// `[-1, 1]`.
    pub fn create_perspective(
        fov_radians: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Result<Self, MathError> {
        let finite = [fov_radians, aspect, near, far]
            .iter()
            .all(|value| value.is_finite());
        if !finite || near <= 0.0 || near >= far || aspect <= 0.0 {
            return Err(MathError::InvalidFrustum);
        }
        if fov_radians <= 0.0 || fov_radians >= PI {
            return Err(MathError::InvalidFrustum);
        }
        Ok(Self {
            inner: Mat4::perspective_rh_gl(fov_radians, aspect, near, far),
        })
    }

    /// Right handed view matrix looking from `eye` towards `target`.
    pub fn create_look_at(
        eye: Vector3D,
        target: Vector3D,
        up: Vector3D,
    ) -> Result<Self, MathError> {
        let forward = target
            .subtract(eye)
            .normalize()
            .map_err(|_| MathError::DegenerateBasis)?;
        // Collinear forward/up leaves no side axis.
        forward
            .cross(up)
            .normalize()
            .map_err(|_| MathError::DegenerateBasis)?;
        Ok(Self {
            inner: Mat4::look_at_rh(eye.into(), target.into(), up.into()),
        })
    }

    /// Rotation of `angle_radians` around `axis` passing through `pivot`.
    ///
    /// `axis` must already be unit length; it is not re-normalized here.
    pub fn create_rotation_around_point(
        angle_radians: f32,
        axis: Vector3D,
        pivot: Vector3D,
    ) -> Self {
        let pivot = Vec3::from(pivot);
        let to_origin = Mat4::from_translation(-pivot);
        let rotation = Mat4::from_axis_angle(axis.into(), angle_radians);
        let back = Mat4::from_translation(pivot);
        Self {
            inner: back * rotation * to_origin,
        }
    }

    pub fn create_translation(offset: Vector3D) -> Self {
        Self {
            inner: Mat4::from_translation(offset.into()),
        }
    }

    pub fn multiply(&self, other: &Self) -> Self {
        Self {
            inner: self.inner * other.inner,
        }
    }

    /// Applies the matrix to `point` as a homogeneous point with `w = 1`.
    /// The result is not divided by `w`.
    pub fn transform(&self, point: Vector3D) -> Vector3D {
        self.inner.transform_point3(point.into()).into()
    }

    /// Applies the matrix to `direction` with `w = 0`, ignoring translation.
    pub fn transform_direction(&self, direction: Vector3D) -> Vector3D {
        self.inner.transform_vector3(direction.into()).into()
    }

    pub fn determinant(&self) -> f32 {
        self.inner.determinant()
    }

    /// Fails with [`MathError::SingularMatrix`] when `|det| < SINGULAR_EPSILON`.
    pub fn inverse(&self) -> Result<Self, MathError> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
            return Err(MathError::SingularMatrix);
        }
        Ok(Self {
            inner: self.inner.inverse(),
        })
    }

    pub fn transpose(&self) -> Self {
        Self {
            inner: self.inner.transpose(),
        }
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.inner.abs_diff_eq(other.inner, tolerance)
    }

    /// Element at `row`, `col`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.inner.col(col)[row]
    }

    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        self.inner.to_cols_array_2d()
    }

    pub fn as_mat4(&self) -> Mat4 {
        self.inner
    }
}

impl From<Mat4> for TransformationMatrix {
    fn from(inner: Mat4) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn sample_matrix() -> TransformationMatrix {
        TransformationMatrix::from(Mat4::from_cols_array(&[
            2.0, 0.5, 0.0, 0.0, //
            0.0, 1.0, -1.0, 0.0, //
            1.0, 0.0, 3.0, 0.0, //
            4.0, -2.0, 1.0, 1.0,
        ]))
    }

    #[test]
    fn double_inverse_round_trips() {
        let m = sample_matrix();
        let back = m.inverse().unwrap().inverse().unwrap();
        assert!(back.approx_eq(&m, 1e-4));
        let product = m.multiply(&m.inverse().unwrap());
        assert!(product.approx_eq(&TransformationMatrix::identity(), 1e-5));
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let singular = TransformationMatrix::from(Mat4::from_cols_array(&[
            1.0, 2.0, 3.0, 0.0, //
            2.0, 4.0, 6.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]));
        assert_eq!(singular.inverse(), Err(MathError::SingularMatrix));
        let zero = TransformationMatrix::from(Mat4::ZERO);
        assert_eq!(zero.inverse(), Err(MathError::SingularMatrix));
    }

    #[test]
    fn look_at_maps_eye_to_origin() {
        let eyes = [
            Vector3D::new(0.0, 2.0, 10.0),
            Vector3D::new(-3.0, 1.5, 4.0),
            Vector3D::new(7.0, -2.0, -1.0),
        ];
        for eye in eyes {
            let view = TransformationMatrix::create_look_at(
                eye,
                Vector3D::new(0.5, 0.0, 0.0),
                Vector3D::UP,
            )
            .unwrap();
            assert!(view.transform(eye).approx_eq(Vector3D::ZERO, 1e-4));
        }
    }

    #[test]
    fn look_at_target_lies_on_negative_z() {
        let view = TransformationMatrix::create_look_at(
            Vector3D::new(0.0, 0.0, 5.0),
            Vector3D::ZERO,
            Vector3D::UP,
        )
        .unwrap();
        let target = view.transform(Vector3D::ZERO);
        assert!(target.approx_eq(Vector3D::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn look_at_rejects_collinear_up() {
        let result = TransformationMatrix::create_look_at(
            Vector3D::new(0.0, 5.0, 0.0),
            Vector3D::ZERO,
            Vector3D::UP,
        );
        assert_eq!(result, Err(MathError::DegenerateBasis));
        let same_point =
            TransformationMatrix::create_look_at(Vector3D::ZERO, Vector3D::ZERO, Vector3D::UP);
        assert_eq!(same_point, Err(MathError::DegenerateBasis));
    }

    #[test]
    fn perspective_validates_frustum() {
        assert!(TransformationMatrix::create_perspective(0.8, 1.5, 0.1, 500.0).is_ok());
        assert_eq!(
            TransformationMatrix::create_perspective(0.8, 1.5, 0.0, 500.0),
            Err(MathError::InvalidFrustum)
        );
        assert_eq!(
            TransformationMatrix::create_perspective(0.8, 1.5, 10.0, 10.0),
            Err(MathError::InvalidFrustum)
        );
        assert_eq!(
            TransformationMatrix::create_perspective(0.8, 0.0, 0.1, 10.0),
            Err(MathError::InvalidFrustum)
        );
    }

    #[test]
    fn perspective_maps_near_and_far_planes() {
        let p = TransformationMatrix::create_perspective(PI / 4.0, 1.0, 0.1, 500.0).unwrap();
        let near = p.as_mat4() * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = p.as_mat4() * Vec4::new(0.0, 0.0, -500.0, 1.0);
        assert!((near.z / near.w + 1.0).abs() < 1e-4);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rotation_around_point_keeps_pivot_fixed() {
        let pivot = Vector3D::new(1.0, 2.0, 3.0);
        let rotation =
            TransformationMatrix::create_rotation_around_point(PI / 2.0, Vector3D::UP, pivot);
        assert!(rotation.transform(pivot).approx_eq(pivot, 1e-5));
        let rotated = rotation.transform(Vector3D::new(2.0, 2.0, 3.0));
        assert!(rotated.approx_eq(Vector3D::new(1.0, 2.0, 2.0), 1e-5));
    }

    #[test]
    fn directions_ignore_translation() {
        let translation = TransformationMatrix::create_translation(Vector3D::new(5.0, 0.0, 0.0));
        let direction = Vector3D::new(0.0, 1.0, 0.0);
        assert_eq!(translation.transform_direction(direction), direction);
        assert_eq!(
            translation.transform(direction),
            Vector3D::new(5.0, 1.0, 0.0)
        );
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let m = sample_matrix();
        let t = m.transpose();
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(m.get(row, col), t.get(col, row));
            }
        }
    }
}
