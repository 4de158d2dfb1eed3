//! Batched pass for entities with a tangent stream and a normal map.
//!
//! Same key-major shape as the entity pass. The differences are the fourth
//! attribute, the normal map on unit 1 and eye-space lights.

use crate::batch::{Batch, BatchMap};
use crate::error::Result;
use crate::gpu::{Primitive, ProgramSource, RenderDevice, TextureKind, UniformKind};
use crate::math::Mat4;
use crate::shader::ShaderProgram;

use super::{disable_culling, enable_culling, load_scene_uniforms, SceneUniforms};

const ATTRIBUTES: [u32; 4] = [0, 1, 2, 3];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "normal_map",
    wgsl: include_str!("../shaders/normal_map.wgsl"),
    attributes: &[
        (0, "position"),
        (1, "texture_coordinates"),
        (2, "normal"),
        (3, "tangent"),
    ],
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
        ("number_of_rows", UniformKind::Float),
        ("density", UniformKind::Float),
        ("offset", UniformKind::Vec2),
        ("gradient", UniformKind::Float),
    ],
    textures: &[
        ("model_texture", TextureKind::D2),
        ("normal_map", TextureKind::D2),
    ],
};

pub struct NormalMapRenderer {
    shader: ShaderProgram,
}

impl NormalMapRenderer {
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

    /// Run the whole pass: start, load scene uniforms, draw, stop.
    pub fn render(&self, device: &mut dyn RenderDevice, batches: &BatchMap, scene: &SceneUniforms<'_>) {
        self.shader.start(device);
        load_scene_uniforms(&self.shader, device, scene, true);
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
        self.shader.set(device, "shine_damper", texture.shine_damper);
        self.shader.set(device, "reflectivity", texture.reflectivity);
        device.bind_texture(0, Some(texture.texture));
        device.bind_texture(1, texture.normal_map);
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
    use crate::gpu::{MeshHandle, TextureHandle, UniformValue};
    use crate::math::{Transform, Vec3, Vec4};
    use crate::model::{ModelTexture, RawModel, TexturedModel};
    use crate::scene::{Camera, Entity, Light};

    #[test]
    fn binds_normal_map_and_eye_space_lights() {
        let model = Rc::new(TexturedModel::new(
            RawModel {
                mesh: MeshHandle(10),
                vertex_count: 6,
            },
            ModelTexture::new(TextureHandle(20)).with_normal_map(TextureHandle(21)),
        ));
        let mut batches = BatchMap::new();
        batches.push(&Entity::new(Rc::clone(&model), Transform::IDENTITY));
        batches.push(&Entity::new(model, Transform::from_xyz(5.0, 0.0, 0.0)));

        let mut device = RecordingDevice::new(640, 480);
        let renderer = NormalMapRenderer::new(&mut device, Mat4::IDENTITY).unwrap();
        let camera = Camera::new(Vec3::new(0.0, 10.0, 0.0), 0.0, 0.0);
        let lights = [Light::new(Vec3::new(0.0, 10.0, -3.0), Vec3::ONE)];
        let scene = SceneUniforms {
            lights: &lights,
            camera: &camera,
            clip_plane: Vec4::ZERO,
            sky_colour: Vec3::ZERO,
            fog_density: 0.0,
            fog_gradient: 1.0,
        };
        renderer.render(&mut device, &batches, &scene);

        assert!(device.commands().contains(&Command::BindTexture {
            unit: 1,
            texture: Some(TextureHandle(21)),
        }));
        assert_eq!(
            device.count(|c| matches!(c, Command::EnableAttribute(3))),
            1
        );
        assert_eq!(
            device.uniform(renderer.shader().handle(), "light_position0"),
            Some(UniformValue::Vec3(Vec3::new(0.0, 0.0, -3.0)))
        );
        assert_eq!(device.frame_stats().draw_calls, 2);
    }
}
