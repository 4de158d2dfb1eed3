//! # wgpu backend
//!
//! [`WgpuDevice`] gives the pass renderers GL-style immediate-mode calls on
//! top of wgpu. During a frame nothing reaches the GPU: every draw snapshots
//! the state it needs and is appended to the current pass record. At
//! [`end_frame`](RenderDevice::end_frame) the records are replayed into
//! render passes, submitted, and the surface is presented.
//!
//! ## Snapshots
//!
//! - **Uniforms.** Each program keeps its uniform block on the CPU. A draw
//!   copies the block into a per-frame arena at a 256-byte aligned offset and
//!   binds group 0 with that dynamic offset. Consecutive draws with no
//!   uniform change share one copy.
//! - **Instance data.** [`update_buffer`](RenderDevice::update_buffer)
//!   appends to a per-frame instance arena, so draws issued before and after
//!   an update each see their own data.
//! - **Fixed-function state.** Cull mode, depth test and write, blending,
//!   topology, target formats and the vertex layout form a [`PipelineKey`].
//!   Pipelines are built on first use and cached.
//!
//! ## Passes
//!
//! [`bind_target`](RenderDevice::bind_target) starts a new pass record.
//! A [`clear`](RenderDevice::clear) before the first draw becomes the pass
//! load op; a clear after draws starts another pass on the same target.
//!
//! Clip planes are evaluated in the shaders from their `plane` uniform. With
//! [`Capability::ClipDistance0`] disabled the snapshot carries a zero plane,
//! which keeps every fragment.

use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec4;
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::uniforms::{UniformLayout, align_up};
use super::{
    Attachment, BlendFactor, BufferHandle, Capability, ClearFlags, CubeMapDesc, Filter, FrameStats,
    MeshDesc, MeshHandle, Primitive, ProgramHandle, ProgramSource, RenderDevice, TargetHandle,
    TextureDesc, TextureHandle, TextureKind, UniformLocation, UniformValue,
};
use crate::error::{FjordError, Result};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const INITIAL_UNIFORM_ARENA: u64 = 64 * 1024;
const INITIAL_INSTANCE_ARENA: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SamplerKind {
    RepeatLinear,
    RepeatNearest,
    ClampLinear,
    ClampNearest,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    kind: TextureKind,
    sampler: SamplerKind,
}

enum TargetDepth {
    Texture(TextureHandle),
    Buffer {
        _texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

struct GpuTarget {
    width: u32,
    height: u32,
    colour: Option<TextureHandle>,
    depth: Option<TargetDepth>,
}

#[derive(Debug, Clone, Copy)]
struct InstancedAttribute {
    location: u32,
    buffer: BufferHandle,
    components: u32,
    stride: u32,
    offset: u32,
}

struct GpuMesh {
    attributes: HashMap<u32, (wgpu::Buffer, u32)>,
    index: Option<wgpu::Buffer>,
    instanced: Vec<InstancedAttribute>,
}

struct InstanceBuffer {
    capacity: usize,
    data: Vec<f32>,
    /// Byte offset of `data` in this frame's instance arena, once a draw
    /// has used it.
    frame_offset: Option<u64>,
}

struct GpuProgram {
    source: ProgramSource,
    module: wgpu::ShaderModule,
    layout: UniformLayout,
    uniform_group_layout: wgpu::BindGroupLayout,
    texture_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    block: Vec<u8>,
    frame_offset: Option<u32>,
    plane: Option<usize>,
}

/// One vertex buffer slot of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct VertexSlot {
    location: u32,
    components: u32,
    /// In floats.
    stride: u32,
    /// In floats.
    offset: u32,
    instanced: bool,
}

/// Everything that selects a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramHandle,
    colour: Option<wgpu::TextureFormat>,
    depth: bool,
    cull: bool,
    depth_test: bool,
    depth_write: bool,
    blend: Option<(BlendFactor, BlendFactor)>,
    primitive: Primitive,
    vertex: Vec<VertexSlot>,
}

type TextureKey = (ProgramHandle, Vec<Option<TextureHandle>>);

#[derive(Debug, Clone, Copy)]
enum VertexBinding {
    Mesh { mesh: MeshHandle, location: u32 },
    Instance { offset: u64 },
}

#[derive(Debug, Clone, Copy)]
enum DrawCall {
    Elements { mesh: MeshHandle, count: u32 },
    Arrays { first: u32, count: u32 },
    Instanced { first: u32, count: u32, instances: u32 },
}

struct DrawRecord {
    pipeline: usize,
    program: ProgramHandle,
    uniform_offset: u32,
    textures: TextureKey,
    vertex: Vec<VertexBinding>,
    call: DrawCall,
}

struct PassRecord {
    target: Option<TargetHandle>,
    viewport: (u32, u32),
    clear_colour: Option<Vec4>,
    clear_depth: bool,
    draws: Vec<DrawRecord>,
}

impl PassRecord {
    fn new(target: Option<TargetHandle>, viewport: (u32, u32)) -> Self {
        Self {
            target,
            viewport,
            clear_colour: None,
            clear_depth: false,
            draws: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.draws.is_empty() && self.clear_colour.is_none() && !self.clear_depth
    }
}

struct DrawState {
    program: Option<ProgramHandle>,
    target: Option<TargetHandle>,
    enabled: HashSet<Capability>,
    blend: (BlendFactor, BlendFactor),
    depth_write: bool,
    mesh: Option<MeshHandle>,
    attributes: HashSet<u32>,
    textures: HashMap<u32, TextureHandle>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            program: None,
            target: None,
            enabled: HashSet::new(),
            blend: (BlendFactor::One, BlendFactor::Zero),
            depth_write: true,
            mesh: None,
            attributes: HashSet::new(),
            textures: HashMap::new(),
        }
    }
}

/// Growable GPU buffer that receives one arena per frame.
struct ArenaBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    buffer: wgpu::Buffer,
    capacity: u64,
}

impl ArenaBuffer {
    fn new(device: &wgpu::Device, label: &'static str, usage: wgpu::BufferUsages, capacity: u64) -> Self {
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity,
            usage,
            mapped_at_creation: false,
        });
        Self {
            label,
            usage,
            buffer,
            capacity,
        }
    }

    /// Make room for `needed` bytes. Returns true when the buffer was replaced.
    fn ensure(&mut self, device: &wgpu::Device, needed: u64) -> bool {
        if needed <= self.capacity {
            return false;
        }
        let capacity = needed.next_power_of_two();
        log::debug!("growing {} to {capacity} bytes", self.label);
        *self = Self::new(device, self.label, self.usage, capacity);
        true
    }
}

/// A [`RenderDevice`] that draws with wgpu.
pub struct WgpuDevice {
    gpu: GpuContext,
    uniform_align: usize,
    next_id: u32,
    stats: FrameStats,
    errors: VecDeque<String>,

    meshes: HashMap<MeshHandle, GpuMesh>,
    buffers: HashMap<BufferHandle, InstanceBuffer>,
    textures: HashMap<TextureHandle, GpuTexture>,
    targets: HashMap<TargetHandle, GpuTarget>,
    programs: HashMap<ProgramHandle, GpuProgram>,

    samplers: HashMap<SamplerKind, wgpu::Sampler>,
    fallback: HashMap<TextureKind, GpuTexture>,
    default_depth: Option<(wgpu::Texture, wgpu::TextureView, (u32, u32))>,

    pipeline_index: HashMap<PipelineKey, usize>,
    pipelines: Vec<Option<wgpu::RenderPipeline>>,
    uniform_groups: HashMap<ProgramHandle, wgpu::BindGroup>,
    texture_groups: HashMap<TextureKey, wgpu::BindGroup>,

    state: DrawState,
    passes: Vec<PassRecord>,
    uniform_arena: Vec<u8>,
    instance_arena: Vec<f32>,
    uniform_buffer: ArenaBuffer,
    instance_buffer: ArenaBuffer,
}

impl WgpuDevice {
    pub fn new(gpu: GpuContext) -> Self {
        let device = &gpu.device;
        let uniform_align = device.limits().min_uniform_buffer_offset_alignment as usize;

        let samplers = [
            SamplerKind::RepeatLinear,
            SamplerKind::RepeatNearest,
            SamplerKind::ClampLinear,
            SamplerKind::ClampNearest,
        ]
        .into_iter()
        .map(|kind| (kind, create_sampler(device, kind)))
        .collect();

        let fallback = [
            (TextureKind::D2, fallback_texture(&gpu, TextureKind::D2)),
            (TextureKind::Cube, fallback_texture(&gpu, TextureKind::Cube)),
            (TextureKind::Depth, fallback_texture(&gpu, TextureKind::Depth)),
        ]
        .into_iter()
        .collect();

        let uniform_buffer = ArenaBuffer::new(
            device,
            "fjord uniform arena",
            wgpu::BufferUsages::UNIFORM,
            INITIAL_UNIFORM_ARENA,
        );
        let instance_buffer = ArenaBuffer::new(
            device,
            "fjord instance arena",
            wgpu::BufferUsages::VERTEX,
            INITIAL_INSTANCE_ARENA,
        );
        let viewport = gpu.surface_size();

        Self {
            gpu,
            uniform_align,
            next_id: 1,
            stats: FrameStats::default(),
            errors: VecDeque::new(),
            meshes: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            samplers,
            fallback,
            default_depth: None,
            pipeline_index: HashMap::new(),
            pipelines: Vec::new(),
            uniform_groups: HashMap::new(),
            texture_groups: HashMap::new(),
            state: DrawState::default(),
            passes: vec![PassRecord::new(None, viewport)],
            uniform_arena: Vec::new(),
            instance_arena: Vec::new(),
            uniform_buffer,
            instance_buffer,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.gpu
    }

    /// Follow a window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn error(&mut self, message: String) {
        log::debug!("device error: {message}");
        self.errors.push_back(message);
    }

    fn current_pass(&mut self) -> &mut PassRecord {
        if self.passes.is_empty() {
            let viewport = self.gpu.surface_size();
            self.passes.push(PassRecord::new(self.state.target, viewport));
        }
        let last = self.passes.len() - 1;
        &mut self.passes[last]
    }

    fn insert_texture(&mut self, texture: GpuTexture) -> TextureHandle {
        let handle = TextureHandle(self.next());
        self.textures.insert(handle, texture);
        handle
    }

    fn target_formats(&self) -> (Option<wgpu::TextureFormat>, bool) {
        match self.state.target {
            None => (Some(self.gpu.surface_format()), true),
            Some(target) => match self.targets.get(&target) {
                Some(t) => (t.colour.map(|_| self.gpu.surface_format()), t.depth.is_some()),
                None => (None, false),
            },
        }
    }

    // ── Draw capture ────────────────────────────────────────────────────

    fn capture_draw(&mut self, primitive: Primitive, call: DrawCall) {
        let Some(program) = self.state.program else {
            self.error("draw with no program in use".into());
            return;
        };
        let Some(mesh) = self.state.mesh else {
            self.error("draw with no mesh bound".into());
            return;
        };

        let (slots, sources) = match self.vertex_plan(program, mesh) {
            Ok(plan) => plan,
            Err(message) => {
                self.error(message);
                return;
            }
        };
        let mut vertex = Vec::with_capacity(sources.len());
        for source in sources {
            match source {
                Ok(location) => vertex.push(VertexBinding::Mesh { mesh, location }),
                Err(buffer) => match self.instance_offset(buffer) {
                    Some(offset) => vertex.push(VertexBinding::Instance { offset }),
                    None => {
                        self.error(format!("instanced draw reads deleted buffer {buffer:?}"));
                        return;
                    }
                },
            }
        }

        let (colour, depth) = self.target_formats();
        let enabled = &self.state.enabled;
        let key = PipelineKey {
            program,
            colour,
            depth,
            cull: enabled.contains(&Capability::CullFace),
            depth_test: enabled.contains(&Capability::DepthTest),
            depth_write: self.state.depth_write,
            blend: enabled.contains(&Capability::Blend).then_some(self.state.blend),
            primitive,
            vertex: slots,
        };
        let pipeline = self.pipeline(key);

        let Some(uniform_offset) = self.snapshot_uniforms(program) else {
            return;
        };
        let texture_count = self
            .programs
            .get(&program)
            .map(|p| p.source.textures.len())
            .unwrap_or(0);
        let textures = (0..texture_count as u32)
            .map(|unit| self.state.textures.get(&unit).copied())
            .collect();

        self.current_pass().draws.push(DrawRecord {
            pipeline,
            program,
            uniform_offset,
            textures: (program, textures),
            vertex,
            call,
        });
    }

    /// Vertex slots for `program` reading from `mesh`: the program's declared
    /// attributes that are enabled and present on the mesh. Each source is a
    /// mesh attribute location (`Ok`) or an instance buffer (`Err`).
    #[allow(clippy::type_complexity)]
    fn vertex_plan(
        &self,
        program: ProgramHandle,
        mesh: MeshHandle,
    ) -> std::result::Result<(Vec<VertexSlot>, Vec<std::result::Result<u32, BufferHandle>>), String> {
        let p = self
            .programs
            .get(&program)
            .ok_or_else(|| format!("draw with deleted program {program:?}"))?;
        let m = self
            .meshes
            .get(&mesh)
            .ok_or_else(|| format!("draw with deleted mesh {mesh:?}"))?;

        let mut slots = Vec::new();
        let mut sources = Vec::new();
        for &(location, _) in p.source.attributes {
            if !self.state.attributes.contains(&location) {
                continue;
            }
            if let Some((_, components)) = m.attributes.get(&location) {
                slots.push(VertexSlot {
                    location,
                    components: *components,
                    stride: *components,
                    offset: 0,
                    instanced: false,
                });
                sources.push(Ok(location));
            } else if let Some(attr) = m.instanced.iter().find(|a| a.location == location) {
                slots.push(VertexSlot {
                    location,
                    components: attr.components,
                    stride: attr.stride,
                    offset: attr.offset,
                    instanced: true,
                });
                sources.push(Err(attr.buffer));
            }
        }
        Ok((slots, sources))
    }

    fn instance_offset(&mut self, buffer: BufferHandle) -> Option<u64> {
        let stored = self.buffers.get_mut(&buffer)?;
        if let Some(offset) = stored.frame_offset {
            return Some(offset);
        }
        let offset = (self.instance_arena.len() * 4) as u64;
        self.instance_arena.extend_from_slice(&stored.data);
        stored.frame_offset = Some(offset);
        Some(offset)
    }

    fn snapshot_uniforms(&mut self, program: ProgramHandle) -> Option<u32> {
        let clip = self.state.enabled.contains(&Capability::ClipDistance0);
        let align = self.uniform_align;
        let p = self.programs.get_mut(&program)?;
        if let (false, Some(plane)) = (clip, p.plane) {
            let mut block = p.block.clone();
            p.layout.write(&mut block, plane, &UniformValue::Vec4(Vec4::ZERO));
            return Some(push_aligned(&mut self.uniform_arena, &block, align));
        }
        if let Some(offset) = p.frame_offset {
            return Some(offset);
        }
        let offset = push_aligned(&mut self.uniform_arena, &p.block, align);
        p.frame_offset = Some(offset);
        Some(offset)
    }

    fn pipeline(&mut self, key: PipelineKey) -> usize {
        if let Some(&index) = self.pipeline_index.get(&key) {
            return index;
        }
        let built = self.build_pipeline(&key);
        if let Err(message) = &built {
            self.error(message.clone());
        }
        let index = self.pipelines.len();
        self.pipelines.push(built.ok());
        self.pipeline_index.insert(key, index);
        index
    }

    fn build_pipeline(&self, key: &PipelineKey) -> std::result::Result<wgpu::RenderPipeline, String> {
        let program = self
            .programs
            .get(&key.program)
            .ok_or_else(|| format!("pipeline for deleted program {:?}", key.program))?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
            .vertex
            .iter()
            .map(|slot| {
                [wgpu::VertexAttribute {
                    format: vertex_format(slot.components),
                    offset: slot.offset as u64 * 4,
                    shader_location: slot.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
            .vertex
            .iter()
            .zip(&attributes)
            .map(|(slot, attribute)| wgpu::VertexBufferLayout {
                array_stride: slot.stride as u64 * 4,
                step_mode: if slot.instanced {
                    wgpu::VertexStepMode::Instance
                } else {
                    wgpu::VertexStepMode::Vertex
                },
                attributes: attribute,
            })
            .collect();

        let colour_target = key.colour.map(|format| wgpu::ColorTargetState {
            format,
            blend: key.blend.map(|(src, dst)| {
                let component = wgpu::BlendComponent {
                    src_factor: blend_factor(src),
                    dst_factor: blend_factor(dst),
                    operation: wgpu::BlendOperation::Add,
                };
                wgpu::BlendState {
                    color: component,
                    alpha: component,
                }
            }),
            write_mask: wgpu::ColorWrites::ALL,
        });
        let targets: &[Option<wgpu::ColorTargetState>] = if colour_target.is_some() {
            std::slice::from_ref(&colour_target)
        } else {
            &[]
        };

        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.source.name),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.module,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.module,
                entry_point: Some("fs_main"),
                targets,
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: match key.primitive {
                    Primitive::Triangles => wgpu::PrimitiveTopology::TriangleList,
                    Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
                },
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: key.cull.then_some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: key.depth.then(|| wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: key.depth_test && key.depth_write,
                depth_compare: if key.depth_test {
                    wgpu::CompareFunction::Less
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(format!("pipeline for '{}' failed: {err}", program.source.name)),
            None => {
                log::debug!(
                    "built pipeline '{}' ({} vertex slots, blend {:?}, cull {})",
                    program.source.name,
                    key.vertex.len(),
                    key.blend,
                    key.cull
                );
                Ok(pipeline)
            }
        }
    }

    // ── Replay ──────────────────────────────────────────────────────────

    fn upload_arenas(&mut self) {
        let device = &self.gpu.device;
        let uniform_bytes = align_up(self.uniform_arena.len().max(1), 4) as u64;
        if self.uniform_buffer.ensure(device, uniform_bytes) {
            self.uniform_groups.clear();
        }
        if !self.uniform_arena.is_empty() {
            self.gpu
                .queue
                .write_buffer(&self.uniform_buffer.buffer, 0, &self.uniform_arena);
        }
        let instance_bytes = (self.instance_arena.len() * 4) as u64;
        self.instance_buffer.ensure(device, instance_bytes);
        if !self.instance_arena.is_empty() {
            self.gpu.queue.write_buffer(
                &self.instance_buffer.buffer,
                0,
                bytemuck::cast_slice(&self.instance_arena),
            );
        }
    }

    fn prepare_bind_groups(&mut self) {
        let mut programs = HashSet::new();
        let mut texture_keys = Vec::new();
        for pass in &self.passes {
            for draw in &pass.draws {
                programs.insert(draw.program);
                if !self.texture_groups.contains_key(&draw.textures) {
                    texture_keys.push(draw.textures.clone());
                }
            }
        }

        for program in programs {
            if self.uniform_groups.contains_key(&program) {
                continue;
            }
            let Some(p) = self.programs.get(&program) else { continue };
            let group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(p.source.name),
                layout: &p.uniform_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer.buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(p.layout.size() as u64),
                    }),
                }],
            });
            self.uniform_groups.insert(program, group);
        }

        for key in texture_keys {
            if self.texture_groups.contains_key(&key) {
                continue;
            }
            let Some(group) = self.texture_group(&key) else { continue };
            self.texture_groups.insert(key, group);
        }
    }

    fn texture_group(&self, key: &TextureKey) -> Option<wgpu::BindGroup> {
        let p = self.programs.get(&key.0)?;
        let mut entries = Vec::with_capacity(p.source.textures.len() * 2);
        for (unit, (_, kind)) in p.source.textures.iter().enumerate() {
            let bound = key
                .1
                .get(unit)
                .copied()
                .flatten()
                .and_then(|t| self.textures.get(&t))
                .filter(|t| t.kind == *kind);
            let texture = match bound {
                Some(texture) => texture,
                None => self.fallback.get(kind)?,
            };
            let sampler = match kind {
                TextureKind::Depth => SamplerKind::ClampNearest,
                _ => texture.sampler,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: unit as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(self.samplers.get(&sampler)?),
            });
        }
        Some(self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(p.source.name),
            layout: &p.texture_group_layout,
            entries: &entries,
        }))
    }

    fn ensure_default_depth(&mut self) {
        let size = self.gpu.surface_size();
        if matches!(&self.default_depth, Some((_, _, s)) if *s == size) {
            return;
        }
        let (texture, view) = create_depth_texture(&self.gpu.device, "default depth", size.0, size.1, false);
        self.default_depth = Some((texture, view, size));
    }

    fn replay(&self, encoder: &mut wgpu::CommandEncoder, surface: &wgpu::TextureView) -> Vec<String> {
        let mut errors = Vec::new();
        let default_depth = self.default_depth.as_ref().map(|(_, view, _)| view);

        for pass in &self.passes {
            if pass.is_empty() {
                continue;
            }
            let (colour_view, depth_view, size) = match pass.target {
                None => (Some(surface), default_depth, self.gpu.surface_size()),
                Some(handle) => {
                    let Some(target) = self.targets.get(&handle) else {
                        errors.push(format!("pass targets deleted framebuffer {handle:?}"));
                        continue;
                    };
                    let colour = target
                        .colour
                        .and_then(|c| self.textures.get(&c))
                        .map(|t| &t.view);
                    let depth = match &target.depth {
                        Some(TargetDepth::Texture(t)) => self.textures.get(t).map(|t| &t.view),
                        Some(TargetDepth::Buffer { view, .. }) => Some(view),
                        None => None,
                    };
                    (colour, depth, (target.width, target.height))
                }
            };

            let colour_attachment = colour_view.map(|view| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: match pass.clear_colour {
                        Some(c) => wgpu::LoadOp::Clear(wgpu::Color {
                            r: c.x as f64,
                            g: c.y as f64,
                            b: c.z as f64,
                            a: c.w as f64,
                        }),
                        None => wgpu::LoadOp::Load,
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            });
            let colour_attachments: &[Option<wgpu::RenderPassColorAttachment<'_>>] =
                if colour_attachment.is_some() {
                    std::slice::from_ref(&colour_attachment)
                } else {
                    &[]
                };

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fjord pass"),
                color_attachments: colour_attachments,
                depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: if pass.clear_depth {
                            wgpu::LoadOp::Clear(1.0)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let width = pass.viewport.0.min(size.0).max(1);
            let height = pass.viewport.1.min(size.1).max(1);
            rpass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);

            for draw in &pass.draws {
                let Some(Some(pipeline)) = self.pipelines.get(draw.pipeline) else {
                    continue;
                };
                let (Some(uniforms), Some(textures)) = (
                    self.uniform_groups.get(&draw.program),
                    self.texture_groups.get(&draw.textures),
                ) else {
                    continue;
                };

                let mut slices = Vec::with_capacity(draw.vertex.len());
                for binding in &draw.vertex {
                    let slice = match binding {
                        VertexBinding::Mesh { mesh, location } => self
                            .meshes
                            .get(mesh)
                            .and_then(|m| m.attributes.get(location))
                            .map(|(buffer, _)| buffer.slice(..)),
                        VertexBinding::Instance { offset } => Some(self.instance_buffer.buffer.slice(*offset..)),
                    };
                    slices.push(slice);
                }
                if slices.iter().any(Option::is_none) {
                    errors.push(format!("draw skipped: a vertex source of program {:?} was deleted", draw.program));
                    continue;
                }

                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
                rpass.set_bind_group(1, textures, &[]);
                for (slot, slice) in slices.into_iter().flatten().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, slice);
                }
                match draw.call {
                    DrawCall::Elements { mesh, count } => {
                        let Some(index) = self.meshes.get(&mesh).and_then(|m| m.index.as_ref()) else {
                            errors.push(format!("indexed draw on mesh {mesh:?} with no indices"));
                            continue;
                        };
                        rpass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(0..count, 0, 0..1);
                    }
                    DrawCall::Arrays { first, count } => rpass.draw(first..first + count, 0..1),
                    DrawCall::Instanced {
                        first,
                        count,
                        instances,
                    } => rpass.draw(first..first + count, 0..instances),
                }
            }
        }
        errors
    }

    fn reset_frame(&mut self) {
        let viewport = match self.state.target {
            None => self.gpu.surface_size(),
            Some(target) => self
                .targets
                .get(&target)
                .map(|t| (t.width, t.height))
                .unwrap_or((1, 1)),
        };
        self.passes.clear();
        self.passes.push(PassRecord::new(self.state.target, viewport));
        self.uniform_arena.clear();
        self.instance_arena.clear();
        for program in self.programs.values_mut() {
            program.frame_offset = None;
        }
        for buffer in self.buffers.values_mut() {
            buffer.frame_offset = None;
        }
    }
}

impl RenderDevice for WgpuDevice {
    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshHandle {
        let device = &self.gpu.device;
        let mut attributes = HashMap::new();
        for attribute in desc.attributes {
            if attribute.data.is_empty() {
                continue;
            }
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: bytemuck::cast_slice(attribute.data),
                usage: wgpu::BufferUsages::VERTEX,
            });
            attributes.insert(attribute.location, (buffer, attribute.components));
        }
        let index = desc.indices.filter(|i| !i.is_empty()).map(|indices| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(desc.label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            })
        });
        let mesh = MeshHandle(self.next());
        self.meshes.insert(
            mesh,
            GpuMesh {
                attributes,
                index,
                instanced: Vec::new(),
            },
        );
        log::trace!("mesh '{}' -> {:?}", desc.label, mesh);
        mesh
    }

    fn create_instance_buffer(&mut self, float_capacity: usize) -> BufferHandle {
        let buffer = BufferHandle(self.next());
        self.buffers.insert(
            buffer,
            InstanceBuffer {
                capacity: float_capacity,
                data: Vec::with_capacity(float_capacity),
                frame_offset: None,
            },
        );
        buffer
    }

    fn add_instanced_attribute(
        &mut self,
        mesh: MeshHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
        stride: u32,
        offset: u32,
    ) {
        let Some(m) = self.meshes.get_mut(&mesh) else {
            self.error(format!("instanced attribute on deleted mesh {mesh:?}"));
            return;
        };
        m.instanced.retain(|a| a.location != location);
        m.instanced.push(InstancedAttribute {
            location,
            buffer,
            components,
            stride,
            offset,
        });
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[f32]) {
        self.stats.buffer_uploads += 1;
        let Some(stored) = self.buffers.get_mut(&buffer) else {
            self.error(format!("update of deleted buffer {buffer:?}"));
            return;
        };
        let len = data.len().min(stored.capacity);
        stored.data.clear();
        stored.data.extend_from_slice(&data[..len]);
        stored.frame_offset = None;
        if len < data.len() {
            let message = format!(
                "buffer {buffer:?} holds {} floats, {} uploaded",
                stored.capacity,
                data.len()
            );
            self.error(message);
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> TextureHandle {
        let expected = desc.width as usize * desc.height as usize * 4;
        if desc.width == 0 || desc.height == 0 || desc.rgba.len() != expected {
            self.error(format!(
                "texture '{}': {} bytes for {}x{}",
                desc.label,
                desc.rgba.len(),
                desc.width,
                desc.height
            ));
            let texture = fallback_texture(&self.gpu, TextureKind::D2);
            return self.insert_texture(texture);
        }

        let (mip_level_count, data) = if desc.mipmaps {
            mip_chain(desc.width, desc.height, desc.rgba)
        } else {
            (1, desc.rgba.to_vec())
        };
        let texture = self.gpu.device.create_texture_with_data(
            &self.gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = match desc.filter {
            Filter::Linear => SamplerKind::RepeatLinear,
            Filter::Nearest => SamplerKind::RepeatNearest,
        };
        self.insert_texture(GpuTexture {
            _texture: texture,
            view,
            kind: TextureKind::D2,
            sampler,
        })
    }

    fn create_cube_map(&mut self, desc: &CubeMapDesc<'_>) -> TextureHandle {
        let face_bytes = desc.size as usize * desc.size as usize * 4;
        if desc.size == 0 || desc.faces.iter().any(|f| f.len() != face_bytes) {
            self.error(format!("cube map '{}': faces are not {1}x{1} RGBA", desc.label, desc.size));
            let texture = fallback_texture(&self.gpu, TextureKind::Cube);
            return self.insert_texture(texture);
        }
        let data = desc.faces.concat();
        let texture = self.gpu.device.create_texture_with_data(
            &self.gpu.queue,
            &wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.size,
                    height: desc.size,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &data,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        self.insert_texture(GpuTexture {
            _texture: texture,
            view,
            kind: TextureKind::Cube,
            sampler: SamplerKind::ClampLinear,
        })
    }

    fn create_render_target(&mut self, width: u32, height: u32) -> TargetHandle {
        let target = TargetHandle(self.next());
        self.targets.insert(
            target,
            GpuTarget {
                width: width.max(1),
                height: height.max(1),
                colour: None,
                depth: None,
            },
        );
        target
    }

    fn attach(&mut self, target: TargetHandle, attachment: Attachment) -> Option<TextureHandle> {
        let Some(t) = self.targets.get(&target) else {
            self.error(format!("attachment {attachment:?} on deleted framebuffer {target:?}"));
            return None;
        };
        let (width, height) = (t.width, t.height);
        let occupied = match attachment {
            Attachment::ColourTexture => t.colour.is_some(),
            Attachment::DepthTexture | Attachment::DepthBuffer => t.depth.is_some(),
        };
        if occupied {
            self.error(format!("framebuffer {target:?} already has a {attachment:?}"));
            return None;
        }

        let device = &self.gpu.device;
        match attachment {
            Attachment::ColourTexture => {
                let texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("colour attachment"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.gpu.surface_format(),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                let handle = self.insert_texture(GpuTexture {
                    _texture: texture,
                    view,
                    kind: TextureKind::D2,
                    sampler: SamplerKind::ClampLinear,
                });
                if let Some(t) = self.targets.get_mut(&target) {
                    t.colour = Some(handle);
                }
                Some(handle)
            }
            Attachment::DepthTexture => {
                let (texture, view) = create_depth_texture(device, "depth attachment", width, height, true);
                let handle = self.insert_texture(GpuTexture {
                    _texture: texture,
                    view,
                    kind: TextureKind::Depth,
                    sampler: SamplerKind::ClampNearest,
                });
                if let Some(t) = self.targets.get_mut(&target) {
                    t.depth = Some(TargetDepth::Texture(handle));
                }
                Some(handle)
            }
            Attachment::DepthBuffer => {
                let (texture, view) = create_depth_texture(device, "depth buffer", width, height, false);
                if let Some(t) = self.targets.get_mut(&target) {
                    t.depth = Some(TargetDepth::Buffer {
                        _texture: texture,
                        view,
                    });
                }
                None
            }
        }
    }

    fn check_error(&mut self) -> Option<String> {
        self.errors.pop_front()
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(source.name),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FjordError::Shader {
                program: source.name.to_string(),
                reason: err.to_string(),
            });
        }

        let layout = UniformLayout::new(source.uniforms);
        let uniform_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(source.name),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(layout.size() as u64),
                },
                count: None,
            }],
        });
        let texture_entries: Vec<wgpu::BindGroupLayoutEntry> = source
            .textures
            .iter()
            .enumerate()
            .flat_map(|(unit, (_, kind))| texture_layout_entries(unit as u32, *kind))
            .collect();
        let texture_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(source.name),
            entries: &texture_entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(source.name),
            bind_group_layouts: &[&uniform_group_layout, &texture_group_layout],
            push_constant_ranges: &[],
        });

        let plane = source.uniforms.iter().position(|(name, _)| *name == "plane");
        let program = ProgramHandle(self.next());
        self.programs.insert(
            program,
            GpuProgram {
                source: *source,
                module,
                block: vec![0; layout.size()],
                layout,
                uniform_group_layout,
                texture_group_layout,
                pipeline_layout,
                frame_offset: None,
                plane,
            },
        );
        Ok(program)
    }

    fn bind_attribute(&mut self, program: ProgramHandle, location: u32, name: &str) {
        let Some(p) = self.programs.get(&program) else { return };
        let declared = p.source.attributes.iter().any(|(l, n)| *l == location && *n == name);
        if !declared {
            log::warn!(
                "program '{}' declares no attribute '{name}' at location {location}",
                p.source.name
            );
        }
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(&program)?;
        let index = p.source.uniforms.iter().position(|(n, _)| *n == name)?;
        Some(UniformLocation {
            program,
            index: index as u32,
        })
    }

    fn delete_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh);
        if self.state.mesh == Some(mesh) {
            self.state.mesh = None;
        }
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.texture_groups
            .retain(|(_, units), _| !units.contains(&Some(texture)));
        self.state.textures.retain(|_, t| *t != texture);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.uniform_groups.remove(&program);
        self.texture_groups.retain(|(p, _), _| *p != program);
        for (key, index) in &self.pipeline_index {
            if key.program == program {
                self.pipelines[*index] = None;
            }
        }
        self.pipeline_index.retain(|key, _| key.program != program);
        if self.state.program == Some(program) {
            self.state.program = None;
        }
    }

    fn delete_target(&mut self, target: TargetHandle) {
        self.targets.remove(&target);
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if program.is_some() {
            self.stats.program_binds += 1;
        }
        self.state.program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(p) = self.programs.get_mut(&location.program) else {
            return;
        };
        if p.layout.write(&mut p.block, location.index as usize, &value) {
            p.frame_offset = None;
        } else {
            let message = format!(
                "program '{}': uniform {} does not take a {:?}",
                p.source.name,
                location.index,
                value.kind()
            );
            self.error(message);
        }
    }

    fn bind_target(&mut self, target: Option<TargetHandle>, width: u32, height: u32) {
        self.stats.target_binds += 1;
        self.state.target = target;
        if self.passes.last().is_some_and(PassRecord::is_empty) {
            self.passes.pop();
        }
        self.passes.push(PassRecord::new(target, (width, height)));
    }

    fn clear(&mut self, colour: Vec4, flags: ClearFlags) {
        let target = self.state.target;
        let pass = self.current_pass();
        if !pass.draws.is_empty() {
            let viewport = pass.viewport;
            self.passes.push(PassRecord::new(target, viewport));
        }
        let pass = self.current_pass();
        if flags.colour {
            pass.clear_colour = Some(colour);
        }
        if flags.depth {
            pass.clear_depth = true;
        }
    }

    fn is_supported(&self, _capability: Capability) -> bool {
        true
    }

    fn enable(&mut self, capability: Capability) {
        self.state.enabled.insert(capability);
    }

    fn disable(&mut self, capability: Capability) {
        self.state.enabled.remove(&capability);
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.state.blend = (src, dst);
    }

    fn depth_mask(&mut self, write: bool) {
        self.state.depth_write = write;
    }

    fn bind_mesh(&mut self, mesh: Option<MeshHandle>) {
        if mesh.is_some() {
            self.stats.mesh_binds += 1;
        }
        self.state.mesh = mesh;
    }

    fn enable_attribute(&mut self, location: u32) {
        self.state.attributes.insert(location);
    }

    fn disable_attribute(&mut self, location: u32) {
        self.state.attributes.remove(&location);
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        match texture {
            Some(texture) => {
                self.stats.texture_binds += 1;
                self.state.textures.insert(unit, texture);
            }
            None => {
                self.state.textures.remove(&unit);
            }
        }
    }

    fn draw_elements(&mut self, primitive: Primitive, count: u32) {
        self.stats.draw_calls += 1;
        self.stats.vertices += count;
        let Some(mesh) = self.state.mesh else {
            self.error("indexed draw with no mesh bound".into());
            return;
        };
        if count > 0 {
            self.capture_draw(primitive, DrawCall::Elements { mesh, count });
        }
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        self.stats.draw_calls += 1;
        self.stats.vertices += count;
        if count > 0 {
            self.capture_draw(primitive, DrawCall::Arrays { first, count });
        }
    }

    fn draw_arrays_instanced(&mut self, primitive: Primitive, first: u32, count: u32, instances: u32) {
        self.stats.draw_calls += 1;
        self.stats.instanced_draws += 1;
        self.stats.instances += instances;
        self.stats.vertices += count * instances;
        if count > 0 && instances > 0 {
            self.capture_draw(
                primitive,
                DrawCall::Instanced {
                    first,
                    count,
                    instances,
                },
            );
        }
    }

    fn begin_frame(&mut self) {
        self.stats = FrameStats::default();
        self.reset_frame();
    }

    fn end_frame(&mut self) -> Result<()> {
        let output = match self.gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring and dropping this frame");
                self.gpu.reconfigure();
                self.reset_frame();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out, dropping this frame");
                self.reset_frame();
                return Ok(());
            }
            Err(e) => {
                self.reset_frame();
                return Err(FjordError::Surface(e.to_string()));
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.upload_arenas();
        self.prepare_bind_groups();
        self.ensure_default_depth();

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fjord frame encoder"),
            });
        let errors = self.replay(&mut encoder, &view);
        for message in errors {
            self.error(message);
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.reset_frame();
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.gpu.surface_size()
    }
}

/// Append `block` at the next multiple of `align` and return its offset.
fn push_aligned(arena: &mut Vec<u8>, block: &[u8], align: usize) -> u32 {
    let offset = align_up(arena.len(), align);
    arena.resize(offset, 0);
    arena.extend_from_slice(block);
    offset as u32
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn texture_layout_entries(unit: u32, kind: TextureKind) -> [wgpu::BindGroupLayoutEntry; 2] {
    let (sample_type, view_dimension, sampler) = match kind {
        TextureKind::D2 => (
            wgpu::TextureSampleType::Float { filterable: true },
            wgpu::TextureViewDimension::D2,
            wgpu::SamplerBindingType::Filtering,
        ),
        TextureKind::Cube => (
            wgpu::TextureSampleType::Float { filterable: true },
            wgpu::TextureViewDimension::Cube,
            wgpu::SamplerBindingType::Filtering,
        ),
        TextureKind::Depth => (
            wgpu::TextureSampleType::Depth,
            wgpu::TextureViewDimension::D2,
            wgpu::SamplerBindingType::NonFiltering,
        ),
    };
    [
        wgpu::BindGroupLayoutEntry {
            binding: unit * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension,
                sample_type,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: unit * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler),
            count: None,
        },
    ]
}

fn create_sampler(device: &wgpu::Device, kind: SamplerKind) -> wgpu::Sampler {
    let (address_mode, filter) = match kind {
        SamplerKind::RepeatLinear => (wgpu::AddressMode::Repeat, wgpu::FilterMode::Linear),
        SamplerKind::RepeatNearest => (wgpu::AddressMode::Repeat, wgpu::FilterMode::Nearest),
        SamplerKind::ClampLinear => (wgpu::AddressMode::ClampToEdge, wgpu::FilterMode::Linear),
        SamplerKind::ClampNearest => (wgpu::AddressMode::ClampToEdge, wgpu::FilterMode::Nearest),
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("fjord sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: filter,
        ..Default::default()
    })
}

fn create_depth_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    sampled: bool,
) -> (wgpu::Texture, wgpu::TextureView) {
    let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
    if sampled {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Stand-in bound to texture units with nothing (or the wrong kind) bound:
/// opaque white for colour and cube units, zero for depth.
fn fallback_texture(gpu: &GpuContext, kind: TextureKind) -> GpuTexture {
    match kind {
        TextureKind::D2 | TextureKind::Cube => {
            let layers = if kind == TextureKind::Cube { 6 } else { 1 };
            let texture = gpu.device.create_texture_with_data(
                &gpu.queue,
                &wgpu::TextureDescriptor {
                    label: Some("fallback white"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: layers,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: TEXTURE_FORMAT,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                &vec![255u8; 4 * layers as usize],
            );
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(if kind == TextureKind::Cube {
                    wgpu::TextureViewDimension::Cube
                } else {
                    wgpu::TextureViewDimension::D2
                }),
                ..Default::default()
            });
            GpuTexture {
                _texture: texture,
                view,
                kind,
                sampler: SamplerKind::ClampLinear,
            }
        }
        TextureKind::Depth => {
            let (texture, view) = create_depth_texture(&gpu.device, "fallback depth", 1, 1, true);
            GpuTexture {
                _texture: texture,
                view,
                kind,
                sampler: SamplerKind::ClampNearest,
            }
        }
    }
}

/// Level count and tightly packed RGBA8 data for a full mip chain, largest
/// level first.
fn mip_chain(width: u32, height: u32, rgba: &[u8]) -> (u32, Vec<u8>) {
    let mut data = rgba.to_vec();
    let Some(mut level) = image::RgbaImage::from_raw(width, height, rgba.to_vec()) else {
        return (1, data);
    };
    let levels = 32 - width.max(height).leading_zeros();
    for _ in 1..levels {
        let w = (level.width() / 2).max(1);
        let h = (level.height() / 2).max(1);
        level = image::imageops::resize(&level, w, h, image::imageops::FilterType::Triangle);
        data.extend_from_slice(level.as_raw());
    }
    (levels, data)
}
