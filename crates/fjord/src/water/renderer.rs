//! Draws water tiles in the main pass, sampling the offscreen targets.

use crate::error::Result;
use crate::gpu::{
    BlendFactor, Capability, Primitive, ProgramSource, RenderDevice, TextureHandle, TextureKind,
    UniformKind,
};
use crate::math::{Mat4, Vec3};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::scene::{Camera, Light};
use crate::shader::ShaderProgram;

use super::framebuffers::WaterFrameBuffers;
use super::tile::WaterTile;

/// Ripple phase advance per second.
pub const WAVE_SPEED: f32 = 0.03;

/// Two triangles covering `[-1, 1]` in x and z; y comes from the model matrix.
const QUAD: [f32; 12] = [-1.0, -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "water",
    wgsl: include_str!("../shaders/water.wgsl"),
    attributes: &[(0, "position")],
    uniforms: &[
        ("projection_matrix", UniformKind::Mat4),
        ("view_matrix", UniformKind::Mat4),
        ("model_matrix", UniformKind::Mat4),
        ("camera_position", UniformKind::Vec3),
        ("move_factor", UniformKind::Float),
        ("light_position", UniformKind::Vec3),
        ("near", UniformKind::Float),
        ("light_colour", UniformKind::Vec3),
        ("far", UniformKind::Float),
    ],
    textures: &[
        ("reflection_texture", TextureKind::D2),
        ("refraction_texture", TextureKind::D2),
        ("dudv_map", TextureKind::D2),
        ("normal_map", TextureKind::D2),
        ("depth_map", TextureKind::Depth),
    ],
};

pub struct WaterRenderer {
    shader: ShaderProgram,
    quad: RawModel,
    dudv: TextureHandle,
    normal_map: TextureHandle,
    wave_speed: f32,
    move_factor: f32,
}

impl WaterRenderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &mut dyn RenderDevice,
        registry: &mut ResourceRegistry,
        projection: Mat4,
        near: f32,
        far: f32,
        wave_speed: f32,
        dudv: TextureHandle,
        normal_map: TextureHandle,
    ) -> Result<Self> {
        let quad = registry.load_positions(device, &QUAD, 2);
        let shader = ShaderProgram::compile(device, &SOURCE)?;
        shader.start(device);
        shader.set(device, "projection_matrix", projection);
        shader.set(device, "near", near);
        shader.set(device, "far", far);
        shader.stop(device);
        Ok(Self {
            shader,
            quad,
            dudv,
            normal_map,
            wave_speed,
            move_factor: 0.0,
        })
    }

    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }

    pub fn move_factor(&self) -> f32 {
        self.move_factor
    }

    /// Advance the ripple phase, wrapping into `[0, 1)`.
    pub fn update(&mut self, dt: f32) {
        self.move_factor = (self.move_factor + self.wave_speed * dt) % 1.0;
    }

    pub fn render(
        &self,
        device: &mut dyn RenderDevice,
        tiles: &[WaterTile],
        camera: &Camera,
        sun: &Light,
        buffers: &WaterFrameBuffers,
    ) {
        if tiles.is_empty() {
            return;
        }
        self.prepare(device, camera, sun, buffers);
        for tile in tiles {
            self.shader.set(device, "model_matrix", tile.model_matrix());
            device.draw_arrays(Primitive::Triangles, 0, self.quad.vertex_count);
        }
        self.unbind(device);
    }

    fn prepare(&self, device: &mut dyn RenderDevice, camera: &Camera, sun: &Light, buffers: &WaterFrameBuffers) {
        self.shader.start(device);
        self.shader.set(device, "view_matrix", camera.view_matrix());
        self.shader.set(device, "camera_position", camera.position);
        self.shader.set(device, "move_factor", self.move_factor);
        self.shader.set(device, "light_position", sun.position);
        self.shader.set(device, "light_colour", sun.colour);
        device.bind_mesh(Some(self.quad.mesh));
        device.enable_attribute(0);
        device.bind_texture(0, buffers.reflection_texture());
        device.bind_texture(1, buffers.refraction_texture());
        device.bind_texture(2, Some(self.dudv));
        device.bind_texture(3, Some(self.normal_map));
        device.bind_texture(4, buffers.refraction_depth_texture());
        device.enable(Capability::Blend);
        device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
    }

    fn unbind(&self, device: &mut dyn RenderDevice) {
        device.disable_attribute(0);
        device.bind_mesh(None);
        device.disable(Capability::Blend);
        self.shader.stop(device);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

/// The light water reflects: the first scene light, or a dim white sun
/// overhead when there are none.
pub fn sun(lights: &[Light]) -> Light {
    lights
        .first()
        .copied()
        .unwrap_or_else(|| Light::new(Vec3::new(0.0, 10_000.0, 0.0), Vec3::splat(0.4)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::gpu::UniformValue;
    use crate::gpu::recording::{Command, RecordingDevice};

    fn setup(device: &mut RecordingDevice) -> (WaterRenderer, WaterFrameBuffers) {
        let mut registry = ResourceRegistry::new();
        let renderer = WaterRenderer::new(
            device,
            &mut registry,
            Mat4::IDENTITY,
            0.1,
            1000.0,
            WAVE_SPEED,
            TextureHandle(900),
            TextureHandle(901),
        )
        .unwrap();
        let buffers = WaterFrameBuffers::new(device, &RendererConfig::default());
        (renderer, buffers)
    }

    #[test]
    fn move_factor_wraps() {
        let mut device = RecordingDevice::new(1280, 720);
        let (mut renderer, _) = setup(&mut device);
        renderer.update(10.0);
        assert!((renderer.move_factor() - 0.3).abs() < 1e-6);
        renderer.update(30.0);
        assert!((renderer.move_factor() - 0.2).abs() < 1e-5);
        assert!(renderer.move_factor() < 1.0);
    }

    #[test]
    fn five_texture_units_and_one_draw_per_tile() {
        let mut device = RecordingDevice::new(1280, 720);
        let (renderer, buffers) = setup(&mut device);
        let tiles = [WaterTile::new(0.0, 0.0, 0.0), WaterTile::new(120.0, 0.0, 0.0)];
        device.begin_frame();
        device.clear_commands();
        renderer.render(&mut device, &tiles, &Camera::default(), &sun(&[]), &buffers);

        let units: Vec<u32> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::BindTexture { unit, .. } => Some(*unit),
                _ => None,
            })
            .collect();
        assert_eq!(units, [0, 1, 2, 3, 4]);
        assert!(device.commands().contains(&Command::BindTexture {
            unit: 4,
            texture: buffers.refraction_depth_texture()
        }));
        assert!(device.commands().contains(&Command::BlendFunc(
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha
        )));
        assert_eq!(device.frame_stats().draw_calls, 2);
        assert_eq!(device.frame_stats().vertices, 12);
        assert!(!device.is_enabled(Capability::Blend));

        let program = device.program_named("water").unwrap();
        assert_eq!(
            device.uniform(program, "model_matrix"),
            Some(UniformValue::Mat4(tiles[1].model_matrix()))
        );
    }

    #[test]
    fn no_tiles_no_draws() {
        let mut device = RecordingDevice::new(1280, 720);
        let (renderer, buffers) = setup(&mut device);
        device.begin_frame();
        renderer.render(&mut device, &[], &Camera::default(), &sun(&[]), &buffers);
        assert_eq!(device.frame_stats(), Default::default());
    }
}
