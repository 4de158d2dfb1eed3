//! Instanced particle rendering.
//!
//! All particles of one texture go out in a single instanced draw. Their
//! per-instance data is packed into one shared buffer, 21 floats each:
//!
//! ```text
//! 0..16   model-view matrix, column-major   (attributes 1 to 4)
//! 16..20  atlas offset 1 (xy), offset 2 (xy) (attribute 5)
//! 20      blend between the two stages       (attribute 6)
//! ```

use crate::error::Result;
use crate::gpu::{
    BlendFactor, BufferHandle, Capability, Primitive, ProgramSource, RenderDevice, TextureKind,
    UniformKind,
};
use crate::math::{Mat3, Mat4, Vec3};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::scene::Camera;
use crate::shader::ShaderProgram;

use super::particle::Particle;
use super::registry::ParticleRegistry;

/// Most particles drawn per texture per frame.
pub const MAX_INSTANCES: usize = 10_000;
/// Floats per instance.
pub const INSTANCE_DATA_LENGTH: usize = 21;

const QUAD: [f32; 8] = [-0.5, 0.5, -0.5, -0.5, 0.5, 0.5, 0.5, -0.5];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "particle",
    wgsl: include_str!("../shaders/particle.wgsl"),
    attributes: &[
        (0, "position"),
        (1, "model_view0"),
        (2, "model_view1"),
        (3, "model_view2"),
        (4, "model_view3"),
        (5, "tex_offsets"),
        (6, "blend_factor"),
    ],
    uniforms: &[
        ("projection_matrix", UniformKind::Mat4),
        ("number_of_rows", UniformKind::Float),
        ("number_of_columns", UniformKind::Float),
    ],
    textures: &[("particle_texture", TextureKind::D2)],
};

pub struct ParticleRenderer {
    shader: ShaderProgram,
    quad: RawModel,
    vbo: BufferHandle,
    scratch: Vec<f32>,
}

impl ParticleRenderer {
    pub fn new(device: &mut dyn RenderDevice, registry: &mut ResourceRegistry, projection: Mat4) -> Result<Self> {
        let quad = registry.load_positions(device, &QUAD, 2);
        let vbo = registry.create_empty_vbo(device, INSTANCE_DATA_LENGTH * MAX_INSTANCES);
        let stride = INSTANCE_DATA_LENGTH as u32;
        for (location, offset) in [(1, 0), (2, 4), (3, 8), (4, 12), (5, 16)] {
            registry.add_instanced_attribute(device, quad.mesh, vbo, location, 4, stride, offset);
        }
        registry.add_instanced_attribute(device, quad.mesh, vbo, 6, 1, stride, 20);

        let shader = ShaderProgram::compile(device, &SOURCE)?;
        shader.start(device);
        shader.set(device, "projection_matrix", projection);
        shader.stop(device);
        Ok(Self {
            shader,
            quad,
            vbo,
            scratch: Vec::with_capacity(INSTANCE_DATA_LENGTH * MAX_INSTANCES),
        })
    }

    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }

    /// Draw every bucket back to front. Depth writes are off for the pass so
    /// overlapping particles blend instead of occluding each other.
    pub fn render(&mut self, device: &mut dyn RenderDevice, particles: &ParticleRegistry, camera: &Camera) {
        if particles.is_empty() {
            return;
        }
        let view = camera.view_matrix();
        self.prepare(device);
        for (texture, list) in particles.iter() {
            device.bind_texture(0, Some(texture.texture));
            if texture.additive {
                device.blend_func(BlendFactor::SrcAlpha, BlendFactor::One);
            } else {
                device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
            }
            self.shader.set(device, "number_of_rows", texture.rows as f32);
            self.shader.set(device, "number_of_columns", texture.cols as f32);

            if list.len() > MAX_INSTANCES {
                log::debug!("{} particles for one texture, drawing the nearest {MAX_INSTANCES}", list.len());
            }
            // Buckets run far to near; the overflow is cut from the far end.
            let drawn = list.len().min(MAX_INSTANCES);
            self.scratch.clear();
            for particle in &list[list.len() - drawn..] {
                pack_instance(&view, particle, &mut self.scratch);
            }
            device.update_buffer(self.vbo, &self.scratch);
            device.draw_arrays_instanced(Primitive::TriangleStrip, 0, self.quad.vertex_count, drawn as u32);
        }
        self.finish(device);
    }

    fn prepare(&self, device: &mut dyn RenderDevice) {
        self.shader.start(device);
        device.bind_mesh(Some(self.quad.mesh));
        for location in 0..=6 {
            device.enable_attribute(location);
        }
        device.enable(Capability::Blend);
        device.depth_mask(false);
    }

    fn finish(&self, device: &mut dyn RenderDevice) {
        device.depth_mask(true);
        device.disable(Capability::Blend);
        for location in 0..=6 {
            device.disable_attribute(location);
        }
        device.bind_mesh(None);
        self.shader.stop(device);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

/// Model-view matrix of a camera-facing quad.
///
/// The model's rotation is the transpose of the view's, so the two cancel in
/// model-view and the quad faces the camera. Roll and scale are then applied
/// in view space.
pub fn billboard_model_view(view: &Mat4, position: Vec3, rotation_deg: f32, scale: f32) -> Mat4 {
    let facing = Mat3::from_mat4(*view).transpose();
    let model = Mat4::from_translation(position)
        * Mat4::from_mat3(facing)
        * Mat4::from_rotation_z(rotation_deg.to_radians())
        * Mat4::from_scale(Vec3::splat(scale));
    *view * model
}

/// Append one particle's [`INSTANCE_DATA_LENGTH`] floats.
pub(crate) fn pack_instance(view: &Mat4, particle: &Particle, out: &mut Vec<f32>) {
    let model_view = billboard_model_view(view, particle.position(), particle.rotation(), particle.scale());
    out.extend_from_slice(&model_view.to_cols_array());
    let (offset1, offset2) = particle.offsets();
    out.extend_from_slice(&[offset1.x, offset1.y, offset2.x, offset2.y, particle.blend()]);
}
