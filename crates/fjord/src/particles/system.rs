//! Particle emitters.
//!
//! A [`ParticleSystem`] emits `pps` particles per second on average. Each
//! step emits `floor(pps * dt)` particles plus one more with probability
//! `fract(pps * dt)`, so the long-run count converges on `pps * T` even when
//! a single step covers less than one particle.
//!
//! Every per-particle value is drawn as `average + (r - 0.5) * 2 * error`.
//! Directions are uniform on the unit sphere, or uniform within a cone when
//! [`set_direction`](ParticleSystem::set_direction) was called.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::math::{Quat, Vec3};

use super::particle::Particle;
use super::registry::ParticleRegistry;
use super::texture::ParticleTexture;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cone {
    /// Unit axis.
    axis: Vec3,
    /// Half-angle in radians.
    angle: f32,
}

#[derive(Debug, Clone)]
pub struct ParticleSystem {
    texture: ParticleTexture,
    pps: f32,
    average_speed: f32,
    gravity_complement: f32,
    average_life_length: f32,
    average_scale: f32,
    speed_error: f32,
    life_error: f32,
    scale_error: f32,
    random_rotation: bool,
    cone: Option<Cone>,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(
        texture: ParticleTexture,
        pps: f32,
        speed: f32,
        gravity_complement: f32,
        life_length: f32,
        scale: f32,
    ) -> Self {
        Self {
            texture,
            pps,
            average_speed: speed,
            gravity_complement,
            average_life_length: life_length,
            average_scale: scale,
            speed_error: 0.0,
            life_error: 0.0,
            scale_error: 0.0,
            random_rotation: false,
            cone: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed random stream, for reproducible emission.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Emit within a cone around `direction`. `deviation` is a fraction of
    /// π: 0 emits exactly along the axis, 1 covers the whole sphere.
    pub fn set_direction(&mut self, direction: Vec3, deviation: f32) {
        let axis = direction.normalize_or_zero();
        if axis == Vec3::ZERO {
            log::warn!("particle direction {direction} has no length; emitting in all directions");
            self.cone = None;
            return;
        }
        self.cone = Some(Cone {
            axis,
            angle: deviation * PI,
        });
    }

    pub fn randomize_rotation(&mut self) {
        self.random_rotation = true;
    }

    /// Speed spread as a fraction of the average speed.
    pub fn set_speed_error(&mut self, error: f32) {
        self.speed_error = error * self.average_speed;
    }

    pub fn set_life_error(&mut self, error: f32) {
        self.life_error = error * self.average_life_length;
    }

    pub fn set_scale_error(&mut self, error: f32) {
        self.scale_error = error * self.average_scale;
    }

    pub fn texture(&self) -> &ParticleTexture {
        &self.texture
    }

    /// Emit this step's particles at `center` into `particles`. Returns how
    /// many were emitted.
    pub fn generate_particles(&mut self, center: Vec3, dt: f32, particles: &mut ParticleRegistry) -> usize {
        let to_create = self.pps * dt;
        let mut count = to_create.floor() as usize;
        if self.rng.r#gen::<f32>() < to_create % 1.0 {
            count += 1;
        }
        for _ in 0..count {
            let particle = self.emit_particle(center);
            particles.add_particle(particle);
        }
        count
    }

    fn emit_particle(&mut self, center: Vec3) -> Particle {
        let direction = match self.cone {
            Some(cone) => self.random_unit_vector_within_cone(cone),
            None => self.random_unit_vector(),
        };
        let velocity = direction.normalize_or_zero() * self.generate_value(self.average_speed, self.speed_error);
        let scale = self.generate_value(self.average_scale, self.scale_error);
        let life_length = self.generate_value(self.average_life_length, self.life_error);
        let rotation = self.generate_rotation();
        Particle::new(
            self.texture,
            center,
            velocity,
            self.gravity_complement,
            life_length,
            rotation,
            scale,
        )
    }

    fn generate_value(&mut self, average: f32, error_margin: f32) -> f32 {
        average + (self.rng.r#gen::<f32>() - 0.5) * 2.0 * error_margin
    }

    fn generate_rotation(&mut self) -> f32 {
        if self.random_rotation {
            self.rng.r#gen::<f32>() * 360.0
        } else {
            0.0
        }
    }

    fn random_unit_vector_within_cone(&mut self, cone: Cone) -> Vec3 {
        let cos_angle = cone.angle.cos();
        let theta = self.rng.r#gen::<f32>() * 2.0 * PI;
        let z = cos_angle + self.rng.r#gen::<f32>() * (1.0 - cos_angle);
        let root = (1.0 - z * z).max(0.0).sqrt();
        let sample = Vec3::new(root * theta.cos(), root * theta.sin(), z);

        let axis = cone.axis;
        if axis.x != 0.0 || axis.y != 0.0 {
            Quat::from_rotation_arc(Vec3::Z, axis) * sample
        } else if axis.z < 0.0 {
            Vec3::new(sample.x, sample.y, -sample.z)
        } else {
            sample
        }
    }

    fn random_unit_vector(&mut self) -> Vec3 {
        let theta = self.rng.r#gen::<f32>() * 2.0 * PI;
        let z = self.rng.r#gen::<f32>() * 2.0 - 1.0;
        let root = (1.0 - z * z).sqrt();
        Vec3::new(root * theta.cos(), root * theta.sin(), z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureHandle;

    fn system(pps: f32) -> ParticleSystem {
        ParticleSystem::new(ParticleTexture::new(TextureHandle(1), 1), pps, 10.0, 0.0, 100.0, 1.0).with_seed(7)
    }

    #[test]
    fn emission_converges_on_rate() {
        let mut system = system(200.0);
        let mut particles = ParticleRegistry::new();
        let dt = 1.0 / 60.0;
        let steps = 600;
        let emitted: usize = (0..steps)
            .map(|_| system.generate_particles(Vec3::ZERO, dt, &mut particles))
            .sum();
        assert!(emitted.abs_diff(2000) <= steps, "emitted {emitted}");
        assert_eq!(particles.particle_count(), emitted);
    }

    #[test]
    fn fractional_rate_still_emits() {
        let mut system = system(1.0);
        let mut particles = ParticleRegistry::new();
        let emitted: usize = (0..6000)
            .map(|_| system.generate_particles(Vec3::ZERO, 1.0 / 60.0, &mut particles))
            .sum();
        assert!((50..=150).contains(&emitted), "emitted {emitted}");
    }

    #[test]
    fn zero_angle_cone_emits_along_axis() {
        let mut system = system(0.0);
        let axis = Vec3::new(1.0, 2.0, -0.5).normalize();
        system.set_direction(Vec3::new(1.0, 2.0, -0.5), 0.0);
        let cone = system.cone.unwrap();
        for _ in 0..100 {
            let v = system.random_unit_vector_within_cone(cone);
            assert!((v - axis).length() < 1e-4, "{v} vs {axis}");
        }

        system.set_direction(Vec3::NEG_Z, 0.0);
        let cone = system.cone.unwrap();
        assert!((system.random_unit_vector_within_cone(cone) - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn full_cone_covers_the_sphere() {
        let mut system = system(0.0);
        system.set_direction(Vec3::Y, 1.0);
        let cone = system.cone.unwrap();
        let mut octants = [0usize; 8];
        let (mut above, mut below) = (0, 0);
        for _ in 0..4000 {
            let v = system.random_unit_vector_within_cone(cone);
            assert!((v.length() - 1.0).abs() < 1e-4);
            if v.dot(Vec3::Y) > 0.0 {
                above += 1;
            } else {
                below += 1;
            }
            let i = (v.x > 0.0) as usize | ((v.y > 0.0) as usize) << 1 | ((v.z > 0.0) as usize) << 2;
            octants[i] += 1;
        }
        assert!(above > 1000 && below > 1000);
        assert!(octants.iter().all(|&n| n > 0), "{octants:?}");
    }

    #[test]
    fn values_stay_within_error_margin() {
        let mut system = system(0.0);
        system.set_speed_error(0.5);
        system.set_life_error(0.25);
        system.randomize_rotation();
        for _ in 0..500 {
            let p = system.emit_particle(Vec3::ONE);
            let speed = p.velocity().length();
            assert!((5.0 - 1e-3..=15.0 + 1e-3).contains(&speed));
            assert!((75.0..=125.0).contains(&p.life_length()));
            assert!((0.0..360.0).contains(&p.rotation()));
            assert_eq!(p.position(), Vec3::ONE);
        }
    }

    #[test]
    fn zero_direction_falls_back_to_sphere() {
        let mut system = system(0.0);
        system.set_direction(Vec3::ZERO, 0.1);
        assert!(system.cone.is_none());
    }
}
