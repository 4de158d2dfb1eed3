use crate::math::{Vec2, Vec3};

use super::texture::ParticleTexture;

/// Downward acceleration, scaled per particle by its gravity effect.
pub const GRAVITY: f32 = -50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    texture: ParticleTexture,
    position: Vec3,
    velocity: Vec3,
    gravity_effect: f32,
    life_length: f32,
    rotation: f32,
    scale: f32,
    elapsed: f32,
    offset1: Vec2,
    offset2: Vec2,
    blend: f32,
    distance: f32,
}

impl Particle {
    pub fn new(
        texture: ParticleTexture,
        position: Vec3,
        velocity: Vec3,
        gravity_effect: f32,
        life_length: f32,
        rotation: f32,
        scale: f32,
    ) -> Self {
        Self {
            texture,
            position,
            velocity,
            gravity_effect,
            life_length,
            rotation,
            scale,
            elapsed: 0.0,
            offset1: Vec2::ZERO,
            offset2: Vec2::ZERO,
            blend: 0.0,
            distance: 0.0,
        }
    }

    pub fn texture(&self) -> &ParticleTexture {
        &self.texture
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Roll around the view axis, in degrees.
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn life_length(&self) -> f32 {
        self.life_length
    }

    /// Atlas cells for the current and next stage.
    pub fn offsets(&self) -> (Vec2, Vec2) {
        (self.offset1, self.offset2)
    }

    /// How far into the current stage, in `[0, 1)`.
    pub fn blend(&self) -> f32 {
        self.blend
    }

    /// Squared distance to the camera as of the last update.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Step physics and the atlas animation. Returns whether the particle
    /// is still alive.
    pub(crate) fn update(&mut self, camera_position: Vec3, dt: f32) -> bool {
        self.velocity.y += GRAVITY * self.gravity_effect * dt;
        self.position += self.velocity * dt;
        self.update_texture_coord_info();
        self.distance = (camera_position - self.position).length_squared();
        self.elapsed += dt;
        self.elapsed < self.life_length
    }

    fn update_texture_coord_info(&mut self) {
        let life_factor = self.elapsed / self.life_length;
        let stage_count = self.texture.stage_count();
        let progression = life_factor * stage_count as f32;
        let index1 = (progression.floor() as u32).min(stage_count - 1);
        let index2 = if index1 < stage_count - 1 { index1 + 1 } else { index1 };
        self.blend = progression % 1.0;
        self.offset1 = self.texture.offset(index1);
        self.offset2 = self.texture.offset(index2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureHandle;

    fn particle(rows: u32, life: f32) -> Particle {
        Particle::new(
            ParticleTexture::new(TextureHandle(1), rows),
            Vec3::ZERO,
            Vec3::new(0.0, 10.0, 0.0),
            1.0,
            life,
            0.0,
            1.0,
        )
    }

    #[test]
    fn lives_until_elapsed_reaches_life_length() {
        let mut p = particle(1, 2.0);
        for _ in 0..3 {
            assert!(p.update(Vec3::ZERO, 0.5));
        }
        assert!(!p.update(Vec3::ZERO, 0.5));
    }

    #[test]
    fn gravity_pulls_velocity_down() {
        let mut p = particle(1, 10.0);
        p.update(Vec3::new(0.0, 0.0, 10.0), 0.1);
        assert!((p.velocity().y - 5.0).abs() < 1e-5);
        assert!((p.position().y - 0.5).abs() < 1e-5);
        assert!((p.distance() - (0.25 + 100.0)).abs() < 1e-4);
    }

    #[test]
    fn atlas_stages_follow_life() {
        let mut p = particle(2, 4.0);
        p.elapsed = 1.5;
        p.update_texture_coord_info();
        // progression 1.5 of 4 stages
        assert_eq!(p.offsets(), (Vec2::new(0.5, 0.0), Vec2::new(0.0, 0.5)));
        assert!((p.blend() - 0.5).abs() < 1e-6);

        p.elapsed = 3.9;
        p.update_texture_coord_info();
        assert_eq!(p.offsets(), (Vec2::new(0.5, 0.5), Vec2::new(0.5, 0.5)));
    }
}
