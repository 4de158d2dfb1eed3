//! Skybox pass with a day/night cycle.
//!
//! The cycle clock advances by `dt * 1000` per frame and wraps at
//! [`DAY_LENGTH`]. Each phase picks the two cube maps to sample and how far
//! to blend between them:
//!
//! ```text
//! 0      5000     8000                21000    24000
//! |night |  dawn  |        day         |  dusk  |
//!  N / N   N -> D          D / D         D -> N
//! ```
//!
//! The sky also turns slowly around the Y axis.

use crate::error::Result;
use crate::gpu::{
    Primitive, ProgramSource, RenderDevice, TextureHandle, TextureKind, UniformKind,
};
use crate::math::{Mat4, Vec3, Vec4};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::scene::Camera;
use crate::shader::ShaderProgram;

const SIZE: f32 = 500.0;

pub const DAY_LENGTH: f32 = 24_000.0;
const DAWN_START: f32 = 5_000.0;
const DAY_START: f32 = 8_000.0;
const DUSK_START: f32 = 21_000.0;

/// Degrees per second.
const ROTATE_SPEED: f32 = 1.0;

#[rustfmt::skip]
const VERTICES: [f32; 108] = [
    -SIZE,  SIZE, -SIZE,  -SIZE, -SIZE, -SIZE,   SIZE, -SIZE, -SIZE,
     SIZE, -SIZE, -SIZE,   SIZE,  SIZE, -SIZE,  -SIZE,  SIZE, -SIZE,

    -SIZE, -SIZE,  SIZE,  -SIZE, -SIZE, -SIZE,  -SIZE,  SIZE, -SIZE,
    -SIZE,  SIZE, -SIZE,  -SIZE,  SIZE,  SIZE,  -SIZE, -SIZE,  SIZE,

     SIZE, -SIZE, -SIZE,   SIZE, -SIZE,  SIZE,   SIZE,  SIZE,  SIZE,
     SIZE,  SIZE,  SIZE,   SIZE,  SIZE, -SIZE,   SIZE, -SIZE, -SIZE,

    -SIZE, -SIZE,  SIZE,  -SIZE,  SIZE,  SIZE,   SIZE,  SIZE,  SIZE,
     SIZE,  SIZE,  SIZE,   SIZE, -SIZE,  SIZE,  -SIZE, -SIZE,  SIZE,

    -SIZE,  SIZE, -SIZE,   SIZE,  SIZE, -SIZE,   SIZE,  SIZE,  SIZE,
     SIZE,  SIZE,  SIZE,  -SIZE,  SIZE,  SIZE,  -SIZE,  SIZE, -SIZE,

    -SIZE, -SIZE, -SIZE,  -SIZE, -SIZE,  SIZE,   SIZE, -SIZE, -SIZE,
     SIZE, -SIZE, -SIZE,  -SIZE, -SIZE,  SIZE,   SIZE, -SIZE,  SIZE,
];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "skybox",
    wgsl: include_str!("../shaders/skybox.wgsl"),
    attributes: &[(0, "position")],
    uniforms: &[
        ("projection_matrix", UniformKind::Mat4),
        ("view_matrix", UniformKind::Mat4),
        ("fog_colour", UniformKind::Vec3),
        ("blend_factor", UniformKind::Float),
    ],
    textures: &[("cube_map", TextureKind::Cube), ("cube_map2", TextureKind::Cube)],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkyPhase {
    Night,
    Dawn,
    Day,
    Dusk,
}

/// Phase and clamped blend factor at cycle time `time`.
pub fn day_cycle(time: f32) -> (SkyPhase, f32) {
    let (phase, start, end) = if time < DAWN_START {
        (SkyPhase::Night, 0.0, DAWN_START)
    } else if time < DAY_START {
        (SkyPhase::Dawn, DAWN_START, DAY_START)
    } else if time < DUSK_START {
        (SkyPhase::Day, DAY_START, DUSK_START)
    } else {
        (SkyPhase::Dusk, DUSK_START, DAY_LENGTH)
    };
    let blend = ((time - start) / (end - start)).clamp(0.0, 1.0);
    (phase, blend)
}

pub struct SkyboxRenderer {
    shader: ShaderProgram,
    cube: RawModel,
    day: TextureHandle,
    night: TextureHandle,
    time: f32,
    rotation: f32,
}

impl SkyboxRenderer {
    pub fn new(
        device: &mut dyn RenderDevice,
        registry: &mut ResourceRegistry,
        projection: Mat4,
        day: TextureHandle,
        night: TextureHandle,
    ) -> Result<Self> {
        let cube = registry.load_positions(device, &VERTICES, 3);
        let shader = ShaderProgram::compile(device, &SOURCE)?;
        shader.start(device);
        shader.set(device, "projection_matrix", projection);
        shader.stop(device);
        Ok(Self {
            shader,
            cube,
            day,
            night,
            time: 0.0,
            rotation: 0.0,
        })
    }

    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }

    /// Cycle time in `[0, DAY_LENGTH)`.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = time.rem_euclid(DAY_LENGTH);
    }

    /// Advance the cycle clock and the sky rotation. Called once per frame.
    pub fn update(&mut self, dt: f32) {
        self.time = (self.time + dt * 1000.0) % DAY_LENGTH;
        self.rotation = (self.rotation + ROTATE_SPEED * dt) % 360.0;
    }

    /// Cube maps for units 0 and 1 plus the blend between them.
    pub fn textures(&self) -> (TextureHandle, TextureHandle, f32) {
        let (phase, blend) = day_cycle(self.time);
        let (first, second) = match phase {
            SkyPhase::Night => (self.night, self.night),
            SkyPhase::Dawn => (self.night, self.day),
            SkyPhase::Day => (self.day, self.day),
            SkyPhase::Dusk => (self.day, self.night),
        };
        (first, second, blend)
    }

    /// The camera's view with translation removed, turned by the sky rotation.
    pub fn view_matrix(&self, camera: &Camera) -> Mat4 {
        let mut view = camera.view_matrix();
        view.w_axis = Vec4::W;
        view * Mat4::from_axis_angle(Vec3::Y, self.rotation.to_radians())
    }

    pub fn render(&self, device: &mut dyn RenderDevice, camera: &Camera, fog_colour: Vec3) {
        self.shader.start(device);
        self.shader.set(device, "view_matrix", self.view_matrix(camera));
        self.shader.set(device, "fog_colour", fog_colour);
        device.bind_mesh(Some(self.cube.mesh));
        device.enable_attribute(0);

        let (first, second, blend) = self.textures();
        device.bind_texture(0, Some(first));
        device.bind_texture(1, Some(second));
        self.shader.set(device, "blend_factor", blend);
        device.draw_arrays(Primitive::Triangles, 0, self.cube.vertex_count);

        device.disable_attribute(0);
        device.bind_mesh(None);
        self.shader.stop(device);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    fn skybox() -> (RecordingDevice, SkyboxRenderer) {
        let mut device = RecordingDevice::new(640, 480);
        let mut registry = ResourceRegistry::new();
        let sky = SkyboxRenderer::new(
            &mut device,
            &mut registry,
            Mat4::IDENTITY,
            TextureHandle(1),
            TextureHandle(2),
        )
        .unwrap();
        (device, sky)
    }

    #[test]
    fn cycle_phases_and_blend() {
        assert_eq!(day_cycle(0.0), (SkyPhase::Night, 0.0));
        assert_eq!(day_cycle(6_500.0), (SkyPhase::Dawn, 0.5));
        assert_eq!(day_cycle(8_000.0), (SkyPhase::Day, 0.0));
        assert_eq!(day_cycle(22_500.0), (SkyPhase::Dusk, 0.5));
    }

    #[test]
    fn clock_wraps_at_day_length() {
        let (_, mut sky) = skybox();
        sky.set_time(23_900.0);
        sky.update(0.2);
        assert!((sky.time() - 100.0).abs() < 1e-2);
    }

    #[test]
    fn dawn_blends_night_into_day() {
        let (_, mut sky) = skybox();
        sky.set_time(6_000.0);
        let (first, second, blend) = sky.textures();
        assert_eq!((first, second), (TextureHandle(2), TextureHandle(1)));
        assert!((blend - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn view_has_no_translation() {
        let (_, sky) = skybox();
        let camera = Camera::new(Vec3::new(10.0, 20.0, 30.0), 15.0, 40.0);
        let view = sky.view_matrix(&camera);
        assert_eq!(view.w_axis, Vec4::W);
    }

    #[test]
    fn draws_the_whole_cube() {
        let (mut device, sky) = skybox();
        sky.render(&mut device, &Camera::default(), Vec3::ZERO);
        assert_eq!(device.frame_stats().vertices, 36);
        assert_eq!(device.frame_stats().texture_binds, 2);
    }
}
