//! Textured screen-space quads drawn over the scene.

use crate::error::Result;
use crate::gpu::{
    BlendFactor, Capability, Primitive, ProgramSource, RenderDevice, TextureHandle, TextureKind,
    UniformKind,
};
use crate::math::{gui_transformation_matrix, Vec2};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::shader::ShaderProgram;

const QUAD: [f32; 8] = [-1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0];

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "gui",
    wgsl: include_str!("../shaders/gui.wgsl"),
    attributes: &[(0, "position")],
    uniforms: &[("transformation_matrix", UniformKind::Mat4)],
    textures: &[("gui_texture", TextureKind::D2)],
};

/// A texture placed in normalized device coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuiTexture {
    pub texture: TextureHandle,
    /// Centre, with the screen spanning `[-1, 1]` on both axes.
    pub position: Vec2,
    /// Half-extent in the same units.
    pub scale: Vec2,
}

impl GuiTexture {
    pub fn new(texture: TextureHandle, position: Vec2, scale: Vec2) -> Self {
        Self {
            texture,
            position,
            scale,
        }
    }
}

pub struct GuiRenderer {
    shader: ShaderProgram,
    quad: RawModel,
}

impl GuiRenderer {
    pub fn new(device: &mut dyn RenderDevice, registry: &mut ResourceRegistry) -> Result<Self> {
        let quad = registry.load_positions(device, &QUAD, 2);
        let shader = ShaderProgram::compile(device, &SOURCE)?;
        Ok(Self { shader, quad })
    }

    pub fn render(&self, device: &mut dyn RenderDevice, guis: &[GuiTexture]) {
        if guis.is_empty() {
            return;
        }
        self.shader.start(device);
        device.bind_mesh(Some(self.quad.mesh));
        device.enable_attribute(0);
        device.enable(Capability::Blend);
        device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        device.disable(Capability::DepthTest);
        for gui in guis {
            device.bind_texture(0, Some(gui.texture));
            let matrix = gui_transformation_matrix(gui.position, gui.scale);
            self.shader.set(device, "transformation_matrix", matrix);
            device.draw_arrays(Primitive::TriangleStrip, 0, self.quad.vertex_count);
        }
        device.enable(Capability::DepthTest);
        device.disable(Capability::Blend);
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

    #[test]
    fn draws_each_quad_as_a_strip_and_restores_state() {
        let mut device = RecordingDevice::new(640, 480);
        let mut registry = ResourceRegistry::new();
        let renderer = GuiRenderer::new(&mut device, &mut registry).unwrap();
        let guis = [
            GuiTexture::new(TextureHandle(1), Vec2::new(-0.5, 0.5), Vec2::splat(0.25)),
            GuiTexture::new(TextureHandle(2), Vec2::ZERO, Vec2::splat(0.1)),
        ];
        device.enable(Capability::DepthTest);
        renderer.render(&mut device, &guis);

        assert_eq!(device.frame_stats().draw_calls, 2);
        assert_eq!(device.frame_stats().vertices, 8);
        assert!(device.is_enabled(Capability::DepthTest));
        assert!(!device.is_enabled(Capability::Blend));
    }
}
