//! Live particles, bucketed by texture so each atlas is bound once.

use crate::math::Vec3;

use super::particle::Particle;
use super::texture::ParticleTexture;

#[derive(Debug, Default)]
pub struct ParticleRegistry {
    buckets: Vec<(ParticleTexture, Vec<Particle>)>,
}

impl ParticleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_particle(&mut self, particle: Particle) {
        let texture = *particle.texture();
        match self.buckets.iter_mut().find(|(t, _)| *t == texture) {
            Some((_, list)) => list.push(particle),
            None => self.buckets.push((texture, vec![particle])),
        }
    }

    /// Step every particle, drop the dead ones (and any bucket left empty),
    /// then order each bucket back to front.
    pub fn update(&mut self, camera_position: Vec3, dt: f32) {
        for (_, list) in &mut self.buckets {
            list.retain_mut(|p| p.update(camera_position, dt));
            sort_high_to_low(list);
        }
        self.buckets.retain(|(_, list)| !list.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticleTexture, &[Particle])> {
        self.buckets.iter().map(|(t, list)| (t, list.as_slice()))
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn particle_count(&self) -> usize {
        self.buckets.iter().map(|(_, list)| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Insertion sort by descending camera distance. Order barely changes from
/// one frame to the next, so this stays close to linear.
pub(crate) fn sort_high_to_low(list: &mut [Particle]) {
    for i in 1..list.len() {
        let mut j = i;
        while j > 0 && list[j - 1].distance() < list[j].distance() {
            list.swap(j - 1, j);
            j -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureHandle;

    fn smoke() -> ParticleTexture {
        ParticleTexture::new(TextureHandle(1), 4)
    }

    fn fire() -> ParticleTexture {
        ParticleTexture::new(TextureHandle(2), 8).with_additive(true)
    }

    fn at(texture: ParticleTexture, z: f32, life: f32) -> Particle {
        Particle::new(texture, Vec3::new(0.0, 0.0, z), Vec3::ZERO, 0.0, life, 0.0, 1.0)
    }

    #[test]
    fn buckets_are_sorted_back_to_front() {
        let mut registry = ParticleRegistry::new();
        for z in [5.0, 1.0, 9.0, 3.0] {
            registry.add_particle(at(smoke(), z, 10.0));
        }
        // Camera at the origin: squared distances are 25, 1, 81, 9.
        registry.update(Vec3::ZERO, 0.0);
        let (_, list) = registry.iter().next().unwrap();
        let order: Vec<f32> = list.iter().map(|p| p.position().z).collect();
        assert_eq!(order, [9.0, 5.0, 3.0, 1.0]);
    }

    #[test]
    fn dead_particles_and_empty_buckets_go_away() {
        let mut registry = ParticleRegistry::new();
        registry.add_particle(at(smoke(), 0.0, 2.0));
        registry.add_particle(at(fire(), 0.0, 0.5));
        registry.add_particle(at(fire(), 1.0, 2.0));
        assert_eq!(registry.bucket_count(), 2);

        registry.update(Vec3::ZERO, 0.5);
        assert_eq!(registry.particle_count(), 2);
        assert_eq!(registry.bucket_count(), 2);

        for _ in 0..3 {
            registry.update(Vec3::ZERO, 0.5);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn sort_handles_ties_and_empty() {
        let mut empty: Vec<Particle> = Vec::new();
        sort_high_to_low(&mut empty);
        let mut registry = ParticleRegistry::new();
        registry.add_particle(at(smoke(), 2.0, 10.0));
        registry.add_particle(at(smoke(), -2.0, 10.0));
        registry.update(Vec3::ZERO, 0.0);
        assert_eq!(registry.particle_count(), 2);
    }
}
