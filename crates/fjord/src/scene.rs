//! Per-frame scene state the application hands to the compositor:
//! entities, lights and the camera.

use std::rc::Rc;

use crate::math::{Mat4, Transform, Vec2, Vec3};
use crate::model::TexturedModel;

/// Most lights any program receives. Extra lights are ignored.
pub const MAX_LIGHTS: usize = 4;

/// A drawable instance of a shared model.
#[derive(Debug, Clone)]
pub struct Entity {
    /// `None` marks a placeholder the compositor will skip.
    pub model: Option<Rc<TexturedModel>>,
    pub transform: Transform,
    /// Cell of the model's texture atlas, row-major.
    pub texture_index: u32,
}

impl Entity {
    pub fn new(model: Rc<TexturedModel>, transform: Transform) -> Self {
        Self {
            model: Some(model),
            transform,
            texture_index: 0,
        }
    }

    pub fn with_texture_index(mut self, index: u32) -> Self {
        self.texture_index = index;
        self
    }

    /// Add to the rotation, keeping each angle in `[0, 360)`.
    pub fn increase_rotation(&mut self, dx: f32, dy: f32, dz: f32) {
        let r = self.transform.rotation + Vec3::new(dx, dy, dz);
        self.transform.rotation = Vec3::new(
            r.x.rem_euclid(360.0),
            r.y.rem_euclid(360.0),
            r.z.rem_euclid(360.0),
        );
    }

    fn rows(&self) -> u32 {
        self.model
            .as_ref()
            .map(|m| m.texture.number_of_rows.max(1))
            .unwrap_or(1)
    }

    pub fn texture_x_offset(&self) -> f32 {
        let rows = self.rows();
        (self.texture_index % rows) as f32 / rows as f32
    }

    pub fn texture_y_offset(&self) -> f32 {
        let rows = self.rows();
        (self.texture_index / rows) as f32 / rows as f32
    }

    pub fn texture_offset(&self) -> Vec2 {
        Vec2::new(self.texture_x_offset(), self.texture_y_offset())
    }

    /// Whether the entity can contribute a draw call at all.
    pub fn is_drawable(&self) -> bool {
        self.model.is_some() && self.transform.is_finite()
    }
}

/// A point light with distance attenuation `constant + linear·d + quadratic·d²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub colour: Vec3,
    pub attenuation: Vec3,
}

impl Light {
    /// A light with no falloff.
    pub fn new(position: Vec3, colour: Vec3) -> Self {
        Self {
            position,
            colour,
            attenuation: Vec3::new(1.0, 0.0, 0.0),
        }
    }

    pub fn with_attenuation(mut self, attenuation: Vec3) -> Self {
        self.attenuation = attenuation;
        self
    }

    /// What an unused light slot holds: black, at the origin, no falloff.
    pub const UNUSED: Light = Light {
        position: Vec3::ZERO,
        colour: Vec3::ZERO,
        attenuation: Vec3::new(1.0, 0.0, 0.0),
    };
}

/// First-person camera. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Camera {
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// Saved camera state from [`Camera::mirror_about`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorRestore {
    y: f32,
    pitch: f32,
}

impl Camera {
    pub fn new(position: Vec3, pitch: f32, yaw: f32) -> Self {
        Self {
            position,
            pitch,
            yaw,
            roll: 0.0,
        }
    }

    /// Pitch around X, then yaw around Y, then move the world by `-position`.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(self.pitch.to_radians())
            * Mat4::from_rotation_y(self.yaw.to_radians())
            * Mat4::from_translation(-self.position)
    }

    pub fn invert_pitch(&mut self) {
        self.pitch = -self.pitch;
    }

    /// Move below a horizontal mirror at `water_height` and look back up:
    /// `y -= 2(y - h)`, pitch inverted.
    ///
    /// The returned token restores the exact prior state, bit for bit.
    pub fn mirror_about(&mut self, water_height: f32) -> MirrorRestore {
        let saved = MirrorRestore {
            y: self.position.y,
            pitch: self.pitch,
        };
        let distance = 2.0 * (self.position.y - water_height);
        self.position.y -= distance;
        self.invert_pitch();
        saved
    }

    pub fn restore(&mut self, saved: MirrorRestore) {
        self.position.y = saved.y;
        self.pitch = saved.pitch;
    }

    /// A mirrored copy for the reflection pass. `self` is left untouched.
    pub fn reflected(&self, water_height: f32) -> Camera {
        let mut copy = *self;
        copy.mirror_about(water_height);
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{MeshHandle, TextureHandle};
    use crate::model::{ModelTexture, RawModel};

    fn model(rows: u32) -> Rc<TexturedModel> {
        Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(1),
                vertex_count: 3,
            },
            ModelTexture::new(TextureHandle(2)).with_rows(rows),
        ))
    }

    #[test]
    fn atlas_offsets_follow_index() {
        let e = Entity::new(model(2), Transform::IDENTITY).with_texture_index(3);
        assert_eq!(e.texture_offset(), Vec2::new(0.5, 0.5));
        let e = Entity::new(model(4), Transform::IDENTITY).with_texture_index(6);
        assert_eq!(e.texture_offset(), Vec2::new(0.5, 0.25));
    }

    #[test]
    fn rotation_wraps_into_range() {
        let mut e = Entity::new(model(1), Transform::IDENTITY.with_rotation(0.0, 359.5, 0.0));
        e.increase_rotation(0.0, 1.0, -10.0);
        assert!((e.transform.rotation.y - 0.5).abs() < 1e-4);
        assert!((e.transform.rotation.z - 350.0).abs() < 1e-4);
    }

    #[test]
    fn placeholder_entity_is_not_drawable() {
        let e = Entity {
            model: None,
            transform: Transform::IDENTITY,
            texture_index: 0,
        };
        assert!(!e.is_drawable());
    }

    #[test]
    fn mirror_round_trip_is_bit_identical() {
        let samples = [
            (0.1f32, 17.3f32, 0.0f32),
            (123.456, -33.3, 2.5),
            (-7.77, 89.99, -1.0e-3),
            (1.0e6, 0.123, 1.0e6 - 0.5),
            (3.0e-7, -0.0, 42.0),
        ];
        for (y, pitch, h) in samples {
            let mut cam = Camera::new(Vec3::new(5.0, y, -9.0), pitch, 30.0);
            let before = cam;
            let saved = cam.mirror_about(h);
            assert_eq!(cam.pitch, -pitch);
            cam.restore(saved);
            assert_eq!(cam.position.y.to_bits(), before.position.y.to_bits());
            assert_eq!(cam.pitch.to_bits(), before.pitch.to_bits());
        }
    }

    #[test]
    fn reflected_camera_sits_below_the_water() {
        let cam = Camera::new(Vec3::new(0.0, 10.0, 0.0), 20.0, 0.0);
        let mirrored = cam.reflected(4.0);
        assert_eq!(mirrored.position.y, -2.0);
        assert_eq!(mirrored.pitch, -20.0);
        assert_eq!(cam.position.y, 10.0);
    }

    #[test]
    fn view_matrix_moves_world_opposite_to_camera() {
        let cam = Camera::new(Vec3::new(1.0, 2.0, 3.0), 0.0, 0.0);
        let p = cam.view_matrix().transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.length() < 1e-6);
    }
}
