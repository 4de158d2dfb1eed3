//! Terrain pass: one draw per tile, five textures per tile.

use crate::error::Result;
use crate::gpu::{Primitive, ProgramSource, RenderDevice, TextureKind, UniformKind};
use crate::math::{transformation_matrix, Mat4, Vec3};
use crate::shader::ShaderProgram;
use crate::terrain::Terrain;

use super::{load_scene_uniforms, SceneUniforms};

const ATTRIBUTES: [u32; 3] = [0, 1, 2];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "terrain",
    wgsl: include_str!("../shaders/terrain.wgsl"),
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
        ("density", UniformKind::Float),
        ("gradient", UniformKind::Float),
    ],
    textures: &[
        ("background_texture", TextureKind::D2),
        ("r_texture", TextureKind::D2),
        ("g_texture", TextureKind::D2),
        ("b_texture", TextureKind::D2),
        ("blend_map", TextureKind::D2),
    ],
};

pub struct TerrainRenderer {
    shader: ShaderProgram,
}

impl TerrainRenderer {
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

    pub fn render(&self, device: &mut dyn RenderDevice, terrains: &[Terrain], scene: &SceneUniforms<'_>) {
        self.shader.start(device);
        load_scene_uniforms(&self.shader, device, scene, false);
        for terrain in terrains {
            device.bind_mesh(Some(terrain.model.mesh));
            for location in ATTRIBUTES {
                device.enable_attribute(location);
            }
            let pack = &terrain.textures;
            for (unit, texture) in [pack.background, pack.r, pack.g, pack.b, terrain.blend_map]
                .into_iter()
                .enumerate()
            {
                device.bind_texture(unit as u32, Some(texture));
            }
            self.shader.set(device, "shine_damper", 1.0);
            self.shader.set(device, "reflectivity", 0.0);
            let model = transformation_matrix(Vec3::new(terrain.x, 0.0, terrain.z), Vec3::ZERO, 1.0);
            self.shader.set(device, "transformation_matrix", model);
            device.draw_elements(Primitive::Triangles, terrain.model.vertex_count);

            for location in ATTRIBUTES {
                device.disable_attribute(location);
            }
            device.bind_mesh(None);
        }
        self.shader.stop(device);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};
    use crate::gpu::{TextureHandle, UniformValue};
    use crate::math::Vec4;
    use crate::registry::ResourceRegistry;
    use crate::scene::Camera;
    use crate::terrain::{HeightGrid, TerrainTexturePack, SIZE};

    #[test]
    fn one_draw_and_five_textures_per_tile() {
        let mut device = RecordingDevice::new(640, 480);
        let mut registry = ResourceRegistry::new();
        let pack = TerrainTexturePack {
            background: TextureHandle(1),
            r: TextureHandle(2),
            g: TextureHandle(3),
            b: TextureHandle(4),
        };
        let terrains: Vec<_> = (0..2)
            .map(|gx| {
                Terrain::new(gx, -1, HeightGrid::flat(4, 0.0), &mut registry, &mut device, pack, TextureHandle(5))
            })
            .collect();
        let renderer = TerrainRenderer::new(&mut device, Mat4::IDENTITY).unwrap();
        let camera = Camera::default();
        let scene = SceneUniforms {
            lights: &[],
            camera: &camera,
            clip_plane: Vec4::ZERO,
            sky_colour: Vec3::ZERO,
            fog_density: 0.0,
            fog_gradient: 1.0,
        };
        device.begin_frame();
        renderer.render(&mut device, &terrains, &scene);

        let stats = device.frame_stats();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.texture_binds, 10);
        assert!(device.commands().contains(&Command::BindTexture {
            unit: 4,
            texture: Some(TextureHandle(5)),
        }));
        let expected = Mat4::from_translation(Vec3::new(SIZE, 0.0, -SIZE));
        assert_eq!(
            device.uniform(renderer.shader().handle(), "transformation_matrix"),
            Some(UniformValue::Mat4(expected))
        );
    }
}
