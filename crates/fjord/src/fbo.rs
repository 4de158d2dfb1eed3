//! Offscreen framebuffers.

use crate::gpu::{Attachment, RenderDevice, TargetHandle, TextureHandle};

/// Which depth attachment a framebuffer carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthAttachment {
    /// Depth storage for depth testing only.
    Buffer,
    /// Depth that later passes can sample.
    Texture,
}

/// An offscreen target with a colour texture and one depth attachment.
///
/// Attachment failures never abort: each one is checked right after it is
/// made and logged, and the target is left blank.
#[derive(Debug)]
pub struct Fbo {
    target: TargetHandle,
    width: u32,
    height: u32,
    colour: Option<TextureHandle>,
    depth_texture: Option<TextureHandle>,
}

impl Fbo {
    pub fn new(device: &mut dyn RenderDevice, label: &str, width: u32, height: u32, depth: DepthAttachment) -> Self {
        let target = device.create_render_target(width, height);
        let colour = attach_checked(device, label, target, Attachment::ColourTexture);
        let depth_texture = match depth {
            DepthAttachment::Buffer => {
                attach_checked(device, label, target, Attachment::DepthBuffer);
                None
            }
            DepthAttachment::Texture => attach_checked(device, label, target, Attachment::DepthTexture),
        };
        log::info!("Created framebuffer '{label}' ({width}x{height}, {depth:?} depth)");
        Self {
            target,
            width,
            height,
            colour,
            depth_texture,
        }
    }

    /// Direct rendering here with a viewport covering the whole target.
    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.bind_target(Some(self.target), self.width, self.height);
    }

    pub fn target(&self) -> TargetHandle {
        self.target
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn colour_texture(&self) -> Option<TextureHandle> {
        self.colour
    }

    pub fn depth_texture(&self) -> Option<TextureHandle> {
        self.depth_texture
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        if let Some(texture) = self.colour {
            device.delete_texture(texture);
        }
        if let Some(texture) = self.depth_texture {
            device.delete_texture(texture);
        }
        device.delete_target(self.target);
    }
}

/// Return rendering to the default framebuffer at display size.
pub fn bind_default(device: &mut dyn RenderDevice) {
    let (width, height) = device.viewport_size();
    device.bind_target(None, width, height);
}

fn attach_checked(
    device: &mut dyn RenderDevice,
    label: &str,
    target: TargetHandle,
    attachment: Attachment,
) -> Option<TextureHandle> {
    let texture = device.attach(target, attachment);
    while let Some(err) = device.check_error() {
        log::error!("framebuffer '{label}': {} attachment failed: {err}", attachment_name(attachment));
    }
    texture
}

fn attachment_name(attachment: Attachment) -> &'static str {
    match attachment {
        Attachment::ColourTexture => "colour texture",
        Attachment::DepthTexture => "depth texture",
        Attachment::DepthBuffer => "depth buffer",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{Command, RecordingDevice};

    #[test]
    fn attachment_order_follows_depth_kind() {
        let mut device = RecordingDevice::new(800, 600);
        let fbo = Fbo::new(&mut device, "refraction", 1280, 720, DepthAttachment::Texture);
        let attached: Vec<Attachment> = device
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::Attach { attachment, .. } => Some(*attachment),
                _ => None,
            })
            .collect();
        assert_eq!(attached, [Attachment::ColourTexture, Attachment::DepthTexture]);
        assert!(fbo.colour_texture().is_some());
        assert!(fbo.depth_texture().is_some());
    }

    #[test]
    fn failed_attachment_is_drained_not_fatal() {
        let mut device = RecordingDevice::new(800, 600);
        device.fail_attachment(Attachment::DepthBuffer);
        let fbo = Fbo::new(&mut device, "reflection", 320, 180, DepthAttachment::Buffer);
        assert!(device.check_error().is_none());
        assert!(fbo.depth_texture().is_none());
        assert_eq!(fbo.size(), (320, 180));
    }

    #[test]
    fn clean_up_releases_target_and_textures() {
        let mut device = RecordingDevice::new(800, 600);
        let fbo = Fbo::new(&mut device, "scene", 64, 64, DepthAttachment::Texture);
        assert_eq!(device.live_resource_count(), 3);
        fbo.clean_up(&mut device);
        assert_eq!(device.live_resource_count(), 0);
    }
}
