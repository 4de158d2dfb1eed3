//! Water: two extra scene passes into offscreen targets, then a textured,
//! distorted quad per tile in the main pass.
//!
//! Per frame the compositor asks [`offscreen_passes`] what to render before
//! the main pass:
//!
//! 1. **Reflection.** The camera is mirrored below the water plane
//!    (`y -= 2(y - h)`, pitch inverted) and the scene is drawn with everything
//!    below `h - 1` clipped away.
//! 2. **Refraction.** The real camera, with everything above `h` clipped.
//!
//! Mirroring works on a copy, so the caller's camera never changes. The first
//! tile's height drives both passes; with no tiles there is nothing to do.

pub mod framebuffers;
pub mod renderer;
pub mod tile;

use crate::gpu::{RenderDevice, TargetHandle};
use crate::math::Vec4;
use crate::scene::Camera;

use framebuffers::WaterFrameBuffers;
use tile::WaterTile;

/// Keeps geometry above `height - 1`. The 1-unit overlap hides the seam
/// where the reflection meets the shore.
pub fn reflection_clip_plane(height: f32) -> Vec4 {
    Vec4::new(0.0, 1.0, 0.0, -height + 1.0)
}

/// Keeps geometry below `height`.
pub fn refraction_clip_plane(height: f32) -> Vec4 {
    Vec4::new(0.0, -1.0, 0.0, height)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterPass {
    Reflection,
    Refraction,
}

/// One offscreen scene render: where to draw, from where, and what to clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffscreenPass {
    pub kind: WaterPass,
    pub target: TargetHandle,
    pub width: u32,
    pub height: u32,
    pub camera: Camera,
    pub clip_plane: Vec4,
}

impl OffscreenPass {
    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.bind_target(Some(self.target), self.width, self.height);
    }
}

/// The reflection and refraction passes for this frame, in that order.
pub fn offscreen_passes(
    buffers: &WaterFrameBuffers,
    tiles: &[WaterTile],
    camera: &Camera,
) -> Option<[OffscreenPass; 2]> {
    let height = tiles.first()?.height;
    let (rw, rh) = buffers.reflection().size();
    let (fw, fh) = buffers.refraction().size();
    Some([
        OffscreenPass {
            kind: WaterPass::Reflection,
            target: buffers.reflection().target(),
            width: rw,
            height: rh,
            camera: camera.reflected(height),
            clip_plane: reflection_clip_plane(height),
        },
        OffscreenPass {
            kind: WaterPass::Refraction,
            target: buffers.refraction().target(),
            width: fw,
            height: fh,
            camera: *camera,
            clip_plane: refraction_clip_plane(height),
        },
    ])
}
