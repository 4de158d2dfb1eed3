//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. Everything here is value-typed: functions take
//! vectors and return fresh matrices, nothing is mutated through a shared
//! reference.
//!
//! Matrices follow the GL convention (right-handed, clip-space depth in
//! `[-1, 1]`). The wgpu backend's shaders remap depth to `[0, 1]` after the
//! projection, so the same matrices drive both devices.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use crate::error::{FjordError, Result};

/// World transform of an entity: position, Euler rotation in degrees, and a
/// uniform scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Rotation around X, Y and Z in degrees, applied in that order.
    pub rotation: Vec3,
    pub scale: f32,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: 1.0,
    };

    /// Create a transform at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rx: f32, ry: f32, rz: f32) -> Self {
        self.rotation = Vec3::new(rx, ry, rz);
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Translate, then rotate X, Y, Z, then scale.
    pub fn matrix(&self) -> Mat4 {
        transformation_matrix(self.position, self.rotation, self.scale)
    }

    /// False if any component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Model matrix: `T * Rx * Ry * Rz * S`, rotations in degrees.
pub fn transformation_matrix(translation: Vec3, rotation_deg: Vec3, scale: f32) -> Mat4 {
    Mat4::from_translation(translation)
        * Mat4::from_rotation_x(rotation_deg.x.to_radians())
        * Mat4::from_rotation_y(rotation_deg.y.to_radians())
        * Mat4::from_rotation_z(rotation_deg.z.to_radians())
        * Mat4::from_scale(Vec3::splat(scale))
}

/// 2D overlay matrix: translate in the XY plane, then scale X and Y.
pub fn gui_transformation_matrix(translation: Vec2, scale: Vec2) -> Mat4 {
    Mat4::from_translation(translation.extend(0.0)) * Mat4::from_scale(scale.extend(1.0))
}

/// Perspective parameters, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_deg: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    /// Build a projection for a `width` x `height` viewport.
    ///
    /// Fails on a non-positive viewport, field of view or aspect ratio, or
    /// when `far <= near`.
    pub fn new(width: f32, height: f32, fov_deg: f32, near: f32, far: f32) -> Result<Self> {
        if width <= 0.0 || height <= 0.0 || fov_deg <= 0.0 || far <= near {
            return Err(FjordError::Projection(format!(
                "width={width} height={height} fov={fov_deg} near={near} far={far}"
            )));
        }
        let aspect = width / height;
        if !(aspect > 0.0) || !aspect.is_finite() {
            return Err(FjordError::Projection(format!("aspect ratio {aspect}")));
        }
        Ok(Self {
            fov_deg,
            aspect,
            near,
            far,
        })
    }

    /// GL-style perspective matrix (`m23 = -1`, `m33 = 0`).
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_deg.to_radians(), self.aspect, self.near, self.far)
    }
}

/// Interpolate the height at `pos` over the triangle `p1, p2, p3`.
///
/// Points are `(x, height, z)` and `pos` is `(x, z)`. Returns NaN when the
/// triangle is degenerate or `pos` lies outside it.
pub fn barycentric(p1: Vec3, p2: Vec3, p3: Vec3, pos: Vec2) -> f32 {
    const DEGENERATE: f32 = 1e-6;
    const TOLERANCE: f32 = 1e-5;

    let det = (p2.z - p3.z) * (p1.x - p3.x) + (p3.x - p2.x) * (p1.z - p3.z);
    if det.abs() < DEGENERATE {
        return f32::NAN;
    }
    let l1 = ((p2.z - p3.z) * (pos.x - p3.x) + (p3.x - p2.x) * (pos.y - p3.z)) / det;
    let l2 = ((p3.z - p1.z) * (pos.x - p3.x) + (p1.x - p3.x) * (pos.y - p3.z)) / det;
    let l3 = 1.0 - l1 - l2;

    let inside = |l: f32| (-TOLERANCE..=1.0 + TOLERANCE).contains(&l);
    if !(inside(l1) && inside(l2) && inside(l3)) {
        return f32::NAN;
    }
    l1 * p1.y + l2 * p2.y + l3 * p3.y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn transform_applies_scale_before_translation() {
        let m = Transform::from_xyz(10.0, 0.0, 0.0).with_scale(2.0).matrix();
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!(approx(p.x, 12.0));
    }

    #[test]
    fn transform_rotates_x_before_y() {
        // Rx(90) * Ry(90) applied to +Z: Ry maps +Z to +X, Rx leaves +X alone.
        let m = transformation_matrix(Vec3::ZERO, Vec3::new(90.0, 90.0, 0.0), 1.0);
        let p = m.transform_vector3(Vec3::Z);
        assert!(approx(p.x, 1.0) && approx(p.y, 0.0) && approx(p.z, 0.0));
    }

    #[test]
    fn non_finite_transform_is_detected() {
        let t = Transform::from_xyz(f32::NAN, 0.0, 0.0);
        assert!(!t.is_finite());
        assert!(Transform::IDENTITY.is_finite());
    }

    #[test]
    fn projection_terms_match_gl_layout() {
        let p = Projection::new(1280.0, 720.0, 70.0, 0.1, 1000.0).unwrap();
        let m = p.matrix();
        let y_scale = 1.0 / (35.0f32).to_radians().tan();
        let length = 1000.0 - 0.1;
        assert!(approx(m.col(0).x, y_scale / (1280.0 / 720.0)));
        assert!(approx(m.col(1).y, y_scale));
        assert!(approx(m.col(2).z, -(1000.0 + 0.1) / length));
        assert_eq!(m.col(2).w, -1.0);
        assert!(approx(m.col(3).z, -(2.0 * 0.1 * 1000.0) / length));
        assert_eq!(m.col(3).w, 0.0);
    }

    #[test]
    fn projection_rejects_bad_parameters() {
        assert!(Projection::new(0.0, 720.0, 70.0, 0.1, 1000.0).is_err());
        assert!(Projection::new(1280.0, 720.0, 0.0, 0.1, 1000.0).is_err());
        assert!(Projection::new(1280.0, 720.0, 70.0, 10.0, 10.0).is_err());
    }

    #[test]
    fn barycentric_corner_returns_corner_height() {
        let h = barycentric(
            Vec3::new(0.0, 7.0, 0.0),
            Vec3::new(1.0, 3.0, 0.0),
            Vec3::new(0.0, 5.0, 1.0),
            Vec2::ZERO,
        );
        assert_eq!(h, 7.0);
    }

    #[test]
    fn barycentric_degenerate_triangle_is_nan() {
        let h = barycentric(Vec3::ZERO, Vec3::X, Vec3::new(2.0, 0.0, 0.0), Vec2::ZERO);
        assert!(h.is_nan());
    }

    #[test]
    fn barycentric_outside_triangle_is_nan() {
        let h = barycentric(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec2::new(0.9, 0.9),
        );
        assert!(h.is_nan());
    }

    #[test]
    fn gui_matrix_scales_then_translates() {
        let m = gui_transformation_matrix(Vec2::new(0.5, -0.5), Vec2::new(0.25, 0.5));
        let p = m.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!(approx(p.x, 0.75) && approx(p.y, 0.0));
    }
}
