//! The two offscreen targets water samples from.

use crate::config::RendererConfig;
use crate::fbo::{DepthAttachment, Fbo};
use crate::gpu::{RenderDevice, TextureHandle};

/// Reflection (colour plus depth buffer) and refraction (colour plus a
/// sampleable depth texture, used for soft shore edges).
#[derive(Debug)]
pub struct WaterFrameBuffers {
    reflection: Fbo,
    refraction: Fbo,
}

impl WaterFrameBuffers {
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> Self {
        let [rw, rh] = config.reflection_size;
        let [fw, fh] = config.refraction_size;
        Self {
            reflection: Fbo::new(device, "water reflection", rw, rh, DepthAttachment::Buffer),
            refraction: Fbo::new(device, "water refraction", fw, fh, DepthAttachment::Texture),
        }
    }

    pub fn reflection(&self) -> &Fbo {
        &self.reflection
    }

    pub fn refraction(&self) -> &Fbo {
        &self.refraction
    }

    pub fn reflection_texture(&self) -> Option<TextureHandle> {
        self.reflection.colour_texture()
    }

    pub fn refraction_texture(&self) -> Option<TextureHandle> {
        self.refraction.colour_texture()
    }

    pub fn refraction_depth_texture(&self) -> Option<TextureHandle> {
        self.refraction.depth_texture()
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.reflection.clean_up(device);
        self.refraction.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::Attachment;
    use crate::gpu::recording::RecordingDevice;

    #[test]
    fn default_sizes_and_attachments() {
        let mut device = RecordingDevice::new(1280, 720);
        let buffers = WaterFrameBuffers::new(&mut device, &RendererConfig::default());
        assert_eq!(buffers.reflection().size(), (320, 180));
        assert_eq!(buffers.refraction().size(), (1280, 720));
        assert!(buffers.refraction_depth_texture().is_some());
        assert!(buffers.reflection().depth_texture().is_none());
    }

    #[test]
    fn broken_depth_texture_leaves_a_blank_target() {
        let mut device = RecordingDevice::new(1280, 720);
        device.fail_attachment(Attachment::DepthTexture);
        let buffers = WaterFrameBuffers::new(&mut device, &RendererConfig::default());
        assert!(buffers.reflection_texture().is_some());
        assert!(device.check_error().is_none());
    }
}
