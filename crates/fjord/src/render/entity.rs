//! Batched entity pass.
//!
//! For each model in the [`BatchMap`]: bind the mesh and texture and upload
//! the material once, then upload a transform and atlas offset and draw once
//! per instance.

use crate::batch::{Batch, BatchMap};
use crate::error::Result;
use crate::gpu::{Primitive, ProgramSource, RenderDevice, TextureKind, UniformKind};
use crate::math::Mat4;
use crate::shader::ShaderProgram;

use super::{disable_culling, enable_culling, load_scene_uniforms, SceneUniforms};

const ATTRIBUTES: [u32; 3] = [0, 1, 2];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "entity",
    wgsl: include_str!("../shaders/entity.wgsl"),
    attributes: &[(0, "position"), (1, "texture_coordinates"), (2, "normal")],
    uniforms: &[
        ("transformation_matrix", UniformKind::Mat4),
        ("projection_matrix", UniformKind::Mat4),
        ("view_matrix", UniformKind::Mat4),
        ("plane", UniformKind::Vec4),
        ("light_position0", UniformKind::Vec3),
        ("light_colour0", UniformKind::Vec3),
        ("attenuation0", UniformKind::Vec3),
        ("light_position1", UniformKind::Vec3),
        ("light_colour1", UniformKind::Vec3),
        ("attenuation1", UniformKind::Vec3),
        ("light_position2", UniformKind::Vec3),
        ("light_colour2", UniformKind::Vec3),
        ("attenuation2", UniformKind::Vec3),
        ("light_position3", UniformKind::Vec3),
        ("light_colour3", UniformKind::Vec3),
        ("attenuation3", UniformKind::Vec3),
        ("sky_colour", UniformKind::Vec3),
        ("shine_damper", UniformKind::Float),
        ("reflectivity", UniformKind::Float),
        ("use_fake_lighting", UniformKind::Float),
        ("number_of_rows", UniformKind::Float),
        ("density", UniformKind::Float),
        ("offset", UniformKind::Vec2),
        ("gradient", UniformKind::Float),
    ],
    textures: &[("texture_sampler", TextureKind::D2)],
};

pub struct EntityRenderer {
    shader: ShaderProgram,
}

impl EntityRenderer {
    pub fn new(device: &mut dyn RenderDevice, projection: Mat4) -> Result<Self> {
        let shader = ShaderProgram::compile(device, &SOURCE)?;
        shader.start(device);
        shader.set(device, "projection_matrix", projection);
        shader.stop(device);
        Ok(Self { shader })
    }

    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }

    /// Start the program and load the per-pass uniforms.
    pub fn begin(&self, device: &mut dyn RenderDevice, scene: &SceneUniforms<'_>) {
        self.shader.start(device);
        load_scene_uniforms(&self.shader, device, scene, false);
    }

    /// Draw every batch. Must run between [`begin`](Self::begin) and
    /// [`end`](Self::end).
    pub fn render(&self, device: &mut dyn RenderDevice, batches: &BatchMap) {
        for batch in batches.iter() {
            self.prepare_textured_model(device, batch);
            for entity in &batch.entities {
                self.shader
                    .set(device, "transformation_matrix", entity.transform.matrix());
                self.shader.set(device, "offset", entity.texture_offset());
                device.draw_elements(Primitive::Triangles, batch.model.raw.vertex_count);
            }
            self.unbind_textured_model(device);
        }
    }

    pub fn end(&self, device: &mut dyn RenderDevice) {
        self.shader.stop(device);
    }

    fn prepare_textured_model(&self, device: &mut dyn RenderDevice, batch: &Batch) {
        let texture = &batch.model.texture;
        device.bind_mesh(Some(batch.model.raw.mesh));
        for location in ATTRIBUTES {
            device.enable_attribute(location);
        }
        self.shader
            .set(device, "number_of_rows", texture.number_of_rows as f32);
        if texture.has_transparency {
            disable_culling(device);
        }
        self.shader
            .set_flag(device, "use_fake_lighting", texture.use_fake_lighting);
        self.shader.set(device, "shine_damper", texture.shine_damper);
        self.shader.set(device, "reflectivity", texture.reflectivity);
        device.bind_texture(0, Some(texture.texture));
    }

    fn unbind_textured_model(&self, device: &mut dyn RenderDevice) {
        enable_culling(device);
        for location in ATTRIBUTES {
            device.disable_attribute(location);
        }
        device.bind_mesh(None);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};
    use crate::gpu::{Capability, MeshHandle, TextureHandle};
    use crate::math::{Transform, Vec3, Vec4};
    use crate::model::{ModelTexture, RawModel, TexturedModel};
    use crate::scene::{Camera, Entity, Light};

    fn model(id: u32, transparent: bool) -> Rc<TexturedModel> {
        Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(100 + id),
                vertex_count: 36,
            },
            ModelTexture::new(TextureHandle(200 + id)).with_transparency(transparent),
        ))
    }

    fn draw(device: &mut RecordingDevice, batches: &BatchMap) -> EntityRenderer {
        let renderer = EntityRenderer::new(device, Mat4::IDENTITY).unwrap();
        let camera = Camera::default();
        let lights = [Light::new(Vec3::Y * 100.0, Vec3::ONE)];
        let scene = SceneUniforms {
            lights: &lights,
            camera: &camera,
            clip_plane: Vec4::ZERO,
            sky_colour: Vec3::ZERO,
            fog_density: 0.0035,
            fog_gradient: 5.0,
        };
        device.begin_frame();
        renderer.begin(device, &scene);
        renderer.render(device, batches);
        renderer.end(device);
        renderer
    }

    #[test]
    fn binds_scale_with_models_draws_with_instances() {
        let models: Vec<_> = (0..3).map(|i| model(i, false)).collect();
        let mut batches = BatchMap::new();
        for i in 0..10 {
            let m = &models[i % 3];
            batches.push(&Entity::new(Rc::clone(m), Transform::from_xyz(i as f32, 0.0, 0.0)));
        }
        let mut device = RecordingDevice::new(640, 480);
        draw(&mut device, &batches);

        let stats = device.frame_stats();
        assert_eq!(stats.mesh_binds, 3);
        assert_eq!(stats.texture_binds, 3);
        assert_eq!(stats.draw_calls, 10);
        let shine_uploads = device.count(
            |c| matches!(c, Command::SetUniform { name, .. } if name == "shine_damper"),
        );
        assert_eq!(shine_uploads, 3);
    }

    #[test]
    fn draws_follow_key_major_order() {
        let a = model(1, false);
        let b = model(2, false);
        let mut batches = BatchMap::new();
        batches.push(&Entity::new(Rc::clone(&a), Transform::IDENTITY));
        batches.push(&Entity::new(Rc::clone(&b), Transform::IDENTITY));
        batches.push(&Entity::new(Rc::clone(&a), Transform::IDENTITY));
        let mut device = RecordingDevice::new(640, 480);
        draw(&mut device, &batches);

        let binds: Vec<_> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindMesh(Some(m)) => Some(*m),
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![a.raw.mesh, b.raw.mesh]);
    }

    #[test]
    fn transparent_models_draw_without_culling() {
        let mut batches = BatchMap::new();
        batches.push(&Entity::new(model(1, true), Transform::IDENTITY));
        let mut device = RecordingDevice::new(640, 480);
        draw(&mut device, &batches);

        let commands = device.commands();
        let disable = commands
            .iter()
            .position(|c| *c == Command::Disable(Capability::CullFace))
            .unwrap();
        let draw = commands
            .iter()
            .position(|c| matches!(c, Command::DrawElements { .. }))
            .unwrap();
        assert!(disable < draw);
        assert!(device.is_enabled(Capability::CullFace));
    }

    #[test]
    fn projection_is_uploaded_once_at_construction() {
        let mut device = RecordingDevice::new(640, 480);
        let projection = Mat4::from_scale(Vec3::splat(2.0));
        let renderer = EntityRenderer::new(&mut device, projection).unwrap();
        assert_eq!(
            device.uniform(renderer.shader().handle(), "projection_matrix"),
            Some(projection.into())
        );
    }
}
