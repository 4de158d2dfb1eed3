//! Pass renderers and the compositor that sequences them.
//!
//! Every renderer owns one [`ShaderProgram`](crate::shader::ShaderProgram),
//! uploads its per-program constants (projection, texture units) once at
//! construction, and draws through `&mut dyn RenderDevice`. The
//! [`MasterRenderer`](master::MasterRenderer) decides when each one runs.

pub mod entity;
pub mod gui;
pub mod master;
pub mod normal_map;
pub mod post;
pub mod skybox;
pub mod terrain;
pub mod text;

use crate::gpu::{Capability, RenderDevice};
use crate::math::{Mat4, Vec3, Vec4};
use crate::scene::{Camera, Light};
use crate::shader::{self, ShaderProgram};

/// Clip plane that keeps everything: the main pass uses it so the lit
/// programs can always read a plane.
pub const NO_CLIP: Vec4 = Vec4::new(0.0, -1.0, 0.0, 100_000.0);

/// Per-pass inputs shared by the lit scene programs.
#[derive(Debug, Clone, Copy)]
pub struct SceneUniforms<'a> {
    pub lights: &'a [Light],
    pub camera: &'a Camera,
    pub clip_plane: Vec4,
    pub sky_colour: Vec3,
    pub fog_density: f32,
    pub fog_gradient: f32,
}

impl SceneUniforms<'_> {
    pub fn view_matrix(&self) -> Mat4 {
        self.camera.view_matrix()
    }
}

/// Upload plane, sky colour, lights, view and fog. With `eye_space_lights`,
/// light positions are moved into view space first.
pub(crate) fn load_scene_uniforms(
    program: &ShaderProgram,
    device: &mut dyn RenderDevice,
    scene: &SceneUniforms<'_>,
    eye_space_lights: bool,
) {
    let view = scene.view_matrix();
    program.set(device, "plane", scene.clip_plane);
    program.set(device, "sky_colour", scene.sky_colour);
    shader::load_lights(program, device, scene.lights, eye_space_lights.then_some(view));
    program.set(device, "view_matrix", view);
    program.set(device, "density", scene.fog_density);
    program.set(device, "gradient", scene.fog_gradient);
}

/// Cull back faces, if the device can.
pub fn enable_culling(device: &mut dyn RenderDevice) {
    if !device.is_supported(Capability::CullFace) {
        log::warn!("face culling is not supported by this device");
        return;
    }
    device.enable(Capability::CullFace);
}

pub fn disable_culling(device: &mut dyn RenderDevice) {
    if !device.is_supported(Capability::CullFace) {
        log::warn!("face culling is not supported by this device");
        return;
    }
    device.disable(Capability::CullFace);
}
