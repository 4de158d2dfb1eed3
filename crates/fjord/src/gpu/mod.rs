//! The render device: an immediate-mode command interface between the pass
//! renderers and a graphics backend.
//!
//! Renderers speak a small GL-shaped vocabulary (bind a mesh, enable its
//! attributes, bind texture units, set uniforms, draw) through
//! [`RenderDevice`]. Two backends implement it:
//!
//! - [`RecordingDevice`](recording::RecordingDevice) keeps a command log and
//!   counters. It needs no GPU and is what the tests drive.
//! - [`WgpuDevice`](wgpu_device::WgpuDevice) records the same commands during
//!   a frame and replays them onto wgpu render passes in
//!   [`end_frame`](RenderDevice::end_frame).
//!
//! ## State model
//!
//! Like GL, the device is a state machine. Capabilities, blend function,
//! depth mask, the bound mesh, enabled attributes and texture units stay set
//! until changed. Draw calls snapshot the current state. Uniforms are stored
//! per program and keep their values across frames, so per-program constants
//! (projection, texture unit layout) only need to be uploaded once.

pub mod context;
pub mod recording;
pub mod uniforms;
pub mod wgpu_device;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::Result;

/// Handle to a vertex-array equivalent: a set of per-attribute vertex
/// buffers plus an optional index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u32);

/// Handle to a dynamic per-instance float buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub(crate) u32);

/// Handle to a 2D texture, cube map, or depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u32);

/// Handle to an offscreen framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(pub(crate) u32);

/// A resolved uniform slot inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub(crate) program: ProgramHandle,
    pub(crate) index: u32,
}

/// One per-vertex attribute stream.
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute<'a> {
    pub location: u32,
    /// Floats per vertex (1 to 4).
    pub components: u32,
    pub data: &'a [f32],
}

#[derive(Debug, Clone, Copy)]
pub struct MeshDesc<'a> {
    pub label: &'a str,
    pub attributes: &'a [VertexAttribute<'a>],
    pub indices: Option<&'a [u32]>,
}

impl MeshDesc<'_> {
    /// Number of elements a draw of the whole mesh covers.
    pub fn element_count(&self) -> u32 {
        match self.indices {
            Some(indices) => indices.len() as u32,
            None => self
                .attributes
                .first()
                .map(|a| a.data.len() as u32 / a.components.max(1))
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

/// RGBA8 texture upload.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub rgba: &'a [u8],
    pub filter: Filter,
    pub mipmaps: bool,
    /// Mip level bias. Backends without sampler LOD bias ignore it.
    pub lod_bias: f32,
}

/// Six square RGBA8 faces, ordered right, left, top, bottom, back, front.
#[derive(Debug, Clone, Copy)]
pub struct CubeMapDesc<'a> {
    pub label: &'a str,
    pub size: u32,
    pub faces: [&'a [u8]; 6],
}

/// Framebuffer attachments an offscreen target can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Sampleable colour texture.
    ColourTexture,
    /// Sampleable depth texture.
    DepthTexture,
    /// Depth storage that is never sampled.
    DepthBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CullFace,
    DepthTest,
    Blend,
    /// User clip plane. Shaders read the plane from their `plane` uniform.
    ClipDistance0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    /// Booleans travel as 0.0 / 1.0 floats.
    pub fn flag(value: bool) -> Self {
        UniformValue::Float(if value { 1.0 } else { 0.0 })
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        UniformValue::Mat4(v)
    }
}

/// How a program samples a texture unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    Cube,
    Depth,
}

/// Everything a backend needs to build one shader program.
///
/// `uniforms` lists the fields of the program's uniform block in declaration
/// order; `textures` lists texture units starting at unit 0.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource {
    pub name: &'static str,
    pub wgsl: &'static str,
    pub attributes: &'static [(u32, &'static str)],
    pub uniforms: &'static [(&'static str, UniformKind)],
    pub textures: &'static [(&'static str, TextureKind)],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFlags {
    pub colour: bool,
    pub depth: bool,
}

impl ClearFlags {
    pub const ALL: Self = Self {
        colour: true,
        depth: true,
    };
}

/// Counters for one frame. Both backends fill these the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub instanced_draws: u32,
    pub instances: u32,
    pub vertices: u32,
    pub mesh_binds: u32,
    pub texture_binds: u32,
    pub program_binds: u32,
    pub target_binds: u32,
    pub buffer_uploads: u32,
}

impl FrameStats {
    /// Counter-wise difference, for measuring one pass inside a frame.
    pub fn since(&self, earlier: &FrameStats) -> FrameStats {
        FrameStats {
            draw_calls: self.draw_calls - earlier.draw_calls,
            instanced_draws: self.instanced_draws - earlier.instanced_draws,
            instances: self.instances - earlier.instances,
            vertices: self.vertices - earlier.vertices,
            mesh_binds: self.mesh_binds - earlier.mesh_binds,
            texture_binds: self.texture_binds - earlier.texture_binds,
            program_binds: self.program_binds - earlier.program_binds,
            target_binds: self.target_binds - earlier.target_binds,
            buffer_uploads: self.buffer_uploads - earlier.buffer_uploads,
        }
    }
}

/// The immediate-mode command interface every pass renderer draws through.
pub trait RenderDevice {
    // ── Resources ───────────────────────────────────────────────────────

    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshHandle;

    /// Allocate a dynamic buffer holding up to `float_capacity` floats.
    fn create_instance_buffer(&mut self, float_capacity: usize) -> BufferHandle;

    /// Feed `components` floats per instance from `buffer` into attribute
    /// `location` of `mesh`, reading at `offset` within each `stride`
    /// (both in floats).
    fn add_instanced_attribute(
        &mut self,
        mesh: MeshHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
        stride: u32,
        offset: u32,
    );

    /// Replace the contents of an instance buffer. Draws issued after this
    /// call read the new data; earlier draws keep what they saw.
    fn update_buffer(&mut self, buffer: BufferHandle, data: &[f32]);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureHandle;
    fn create_cube_map(&mut self, desc: &CubeMapDesc<'_>) -> TextureHandle;

    /// Create an empty offscreen framebuffer.
    fn create_render_target(&mut self, width: u32, height: u32) -> TargetHandle;

    /// Add an attachment to a target. Sampleable attachments return their
    /// texture. Failures are reported through [`check_error`](Self::check_error).
    fn attach(&mut self, target: TargetHandle, attachment: Attachment) -> Option<TextureHandle>;

    /// Pop the oldest pending device error, if any.
    fn check_error(&mut self) -> Option<String>;

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle>;

    /// Bind a vertex input name to an attribute slot.
    fn bind_attribute(&mut self, program: ProgramHandle, location: u32, name: &str);

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn delete_mesh(&mut self, mesh: MeshHandle);
    fn delete_buffer(&mut self, buffer: BufferHandle);
    fn delete_texture(&mut self, texture: TextureHandle);
    fn delete_program(&mut self, program: ProgramHandle);
    fn delete_target(&mut self, target: TargetHandle);

    // ── State ───────────────────────────────────────────────────────────

    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// Store a uniform value into the program that owns `location`.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Direct rendering to `target` (`None` is the default framebuffer) with
    /// a `width` x `height` viewport.
    fn bind_target(&mut self, target: Option<TargetHandle>, width: u32, height: u32);

    fn clear(&mut self, colour: Vec4, flags: ClearFlags);

    fn is_supported(&self, capability: Capability) -> bool;
    fn enable(&mut self, capability: Capability);
    fn disable(&mut self, capability: Capability);
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);
    fn depth_mask(&mut self, write: bool);

    /// Bind a mesh (`None` unbinds).
    fn bind_mesh(&mut self, mesh: Option<MeshHandle>);
    fn enable_attribute(&mut self, location: u32);
    fn disable_attribute(&mut self, location: u32);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    // ── Draws ───────────────────────────────────────────────────────────

    fn draw_elements(&mut self, primitive: Primitive, count: u32);
    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32);
    fn draw_arrays_instanced(&mut self, primitive: Primitive, first: u32, count: u32, instances: u32);

    // ── Frame ───────────────────────────────────────────────────────────

    fn begin_frame(&mut self);

    /// Finish the frame: submit and present where the backend has a surface.
    fn end_frame(&mut self) -> Result<()>;

    /// Counters accumulated since [`begin_frame`](Self::begin_frame).
    fn frame_stats(&self) -> FrameStats;

    /// Size of the default framebuffer.
    fn viewport_size(&self) -> (u32, u32);
}
