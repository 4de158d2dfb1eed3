//! Post-processing: the main pass renders into an offscreen target, then a
//! fullscreen quad runs the contrast program to put it on screen.

use crate::error::Result;
use crate::fbo::{self, DepthAttachment, Fbo};
use crate::gpu::{Capability, Primitive, ProgramSource, RenderDevice, TextureKind, UniformKind};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::shader::ShaderProgram;

const QUAD: [f32; 8] = [-1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "contrast",
    wgsl: include_str!("../shaders/contrast.wgsl"),
    attributes: &[(0, "position")],
    uniforms: &[("contrast", UniformKind::Float)],
    textures: &[("colour_texture", TextureKind::D2)],
};

pub struct PostProcessing {
    shader: ShaderProgram,
    quad: RawModel,
    scene: Fbo,
}

impl PostProcessing {
    /// `width` x `height` is the display size the scene target matches.
    pub fn new(
        device: &mut dyn RenderDevice,
        registry: &mut ResourceRegistry,
        width: u32,
        height: u32,
        contrast: f32,
    ) -> Result<Self> {
        let quad = registry.load_positions(device, &QUAD, 2);
        let shader = ShaderProgram::compile(device, &SOURCE)?;
        shader.start(device);
        shader.set(device, "contrast", contrast);
        shader.stop(device);
        let scene = Fbo::new(device, "post scene", width, height, DepthAttachment::Buffer);
        Ok(Self { shader, quad, scene })
    }

    /// Direct the main pass into the offscreen scene target.
    pub fn bind_scene(&self, device: &mut dyn RenderDevice) {
        self.scene.bind(device);
    }

    pub fn set_contrast(&self, device: &mut dyn RenderDevice, contrast: f32) {
        self.shader.start(device);
        self.shader.set(device, "contrast", contrast);
        self.shader.stop(device);
    }

    /// Recreate the scene target after the display changed size.
    pub fn resize(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) {
        if self.scene.size() == (width, height) {
            return;
        }
        self.scene.clean_up(device);
        self.scene = Fbo::new(device, "post scene", width, height, DepthAttachment::Buffer);
    }

    /// Draw the offscreen scene onto the default framebuffer.
    pub fn do_post_processing(&self, device: &mut dyn RenderDevice) {
        fbo::bind_default(device);
        self.shader.start(device);
        device.bind_mesh(Some(self.quad.mesh));
        device.enable_attribute(0);
        device.disable(Capability::DepthTest);
        device.bind_texture(0, self.scene.colour_texture());
        device.draw_arrays(Primitive::TriangleStrip, 0, self.quad.vertex_count);
        device.enable(Capability::DepthTest);
        device.disable_attribute(0);
        device.bind_mesh(None);
        self.shader.stop(device);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.scene.clean_up(device);
        self.shader.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};
    use crate::gpu::UniformValue;

    #[test]
    fn composites_scene_texture_to_the_screen() {
        let mut device = RecordingDevice::new(1280, 720);
        let mut registry = ResourceRegistry::new();
        let post = PostProcessing::new(&mut device, &mut registry, 1280, 720, 0.3).unwrap();
        let program = device.program_named("contrast").unwrap();
        assert_eq!(device.uniform(program, "contrast"), Some(UniformValue::Float(0.3)));

        device.clear_commands();
        post.do_post_processing(&mut device);
        let commands = device.commands();
        assert_eq!(
            commands[0],
            Command::BindTarget {
                target: None,
                width: 1280,
                height: 720
            }
        );
        assert!(commands.contains(&Command::BindTexture {
            unit: 0,
            texture: post.scene.colour_texture()
        }));
        assert_eq!(device.frame_stats().draw_calls, 1);
        assert!(device.is_enabled(Capability::DepthTest));
    }

    #[test]
    fn resize_replaces_the_target_only_when_needed() {
        let mut device = RecordingDevice::new(1280, 720);
        let mut registry = ResourceRegistry::new();
        let mut post = PostProcessing::new(&mut device, &mut registry, 1280, 720, 0.3).unwrap();
        let before = post.scene.target();
        post.resize(&mut device, 1280, 720);
        assert_eq!(post.scene.target(), before);
        post.resize(&mut device, 800, 600);
        assert_ne!(post.scene.target(), before);
        assert_eq!(post.scene.size(), (800, 600));
    }
}
