//! Particles: emitters, simulation, and instanced billboard rendering.
//!
//! A [`ParticleSystem`](system::ParticleSystem) emits into a
//! [`ParticleRegistry`](registry::ParticleRegistry), which the compositor owns
//! and steps once per frame. The [`ParticleRenderer`](renderer::ParticleRenderer)
//! draws each texture bucket with a single instanced draw.

pub mod particle;
pub mod registry;
pub mod renderer;
pub mod system;
pub mod texture;
