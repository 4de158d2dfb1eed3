//! # Fjord: a multi-pass forward renderer
//!
//! Fjord draws lit, fogged 3D scenes in a fixed sequence of passes: planar
//! water reflection and refraction into offscreen targets, the main scene
//! (entities, normal-mapped entities, terrain, skybox), the water surface,
//! instanced particles, optional post-processing, then GUI quads and text.
//!
//! Renderers talk to the GPU through the [`RenderDevice`](gpu::RenderDevice)
//! trait. [`WgpuDevice`](gpu::wgpu_device::WgpuDevice) draws with wgpu;
//! [`RecordingDevice`](gpu::recording::RecordingDevice) records commands
//! and is what the tests run against.
//!
//! Start with `use fjord::prelude::*`, implement [`Scene`](app::Scene) around
//! a [`MasterRenderer`](render::master::MasterRenderer), and hand it to
//! [`App::run`](app::App::run).

pub mod app;
pub mod batch;
pub mod config;
pub mod error;
pub mod fbo;
pub mod gpu;
pub mod input;
pub mod math;
pub mod model;
pub mod particles;
pub mod prelude;
pub mod registry;
pub mod render;
pub mod scene;
pub mod shader;
pub mod terrain;
pub mod time;
pub mod water;

#[cfg(feature = "diagnostics")]
pub mod diag;

pub use error::{FjordError, Result};
