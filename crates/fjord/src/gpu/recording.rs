//! Headless device that records every command.
//!
//! [`RecordingDevice`] allocates handles, remembers uniform values and device
//! state, and appends a [`Command`] per call. Tests inspect the log to check
//! ordering and binding properties; [`FrameStats`] comes for free.
//!
//! Failure injection covers the paths a real GPU rarely exercises:
//! [`fail_attachment`](RecordingDevice::fail_attachment) makes an attachment
//! report an error, and [`without_capability`](RecordingDevice::without_capability)
//! marks a capability as unsupported.

use std::collections::{HashMap, HashSet, VecDeque};

use glam::Vec4;

use super::{
    Attachment, BlendFactor, BufferHandle, Capability, ClearFlags, CubeMapDesc, FrameStats,
    MeshDesc, MeshHandle, Primitive, ProgramHandle, ProgramSource, RenderDevice, TargetHandle,
    TextureDesc, TextureHandle, UniformLocation, UniformValue,
};
use crate::error::{FjordError, Result};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateMesh(MeshHandle),
    CreateBuffer(BufferHandle),
    AddInstancedAttribute { mesh: MeshHandle, buffer: BufferHandle, location: u32 },
    UpdateBuffer { buffer: BufferHandle, floats: usize },
    CreateTexture(TextureHandle),
    CreateTarget(TargetHandle),
    Attach { target: TargetHandle, attachment: Attachment },
    CreateProgram(ProgramHandle),
    BindAttribute { program: ProgramHandle, location: u32 },
    Delete,
    UseProgram(Option<ProgramHandle>),
    SetUniform { program: ProgramHandle, name: String, value: UniformValue },
    BindTarget { target: Option<TargetHandle>, width: u32, height: u32 },
    Clear { colour: Vec4, flags: ClearFlags },
    Enable(Capability),
    Disable(Capability),
    BlendFunc(BlendFactor, BlendFactor),
    DepthMask(bool),
    BindMesh(Option<MeshHandle>),
    EnableAttribute(u32),
    DisableAttribute(u32),
    BindTexture { unit: u32, texture: Option<TextureHandle> },
    DrawElements { primitive: Primitive, count: u32 },
    DrawArrays { primitive: Primitive, first: u32, count: u32 },
    DrawArraysInstanced { primitive: Primitive, count: u32, instances: u32 },
    BeginFrame,
    EndFrame,
}

struct RecordedProgram {
    name: String,
    uniforms: Vec<String>,
    values: HashMap<u32, UniformValue>,
}

/// A [`RenderDevice`] with no GPU behind it.
pub struct RecordingDevice {
    commands: Vec<Command>,
    stats: FrameStats,
    next_id: u32,
    viewport: (u32, u32),
    programs: HashMap<ProgramHandle, RecordedProgram>,
    buffers: HashMap<BufferHandle, Vec<f32>>,
    live_meshes: HashSet<MeshHandle>,
    live_textures: HashSet<TextureHandle>,
    live_targets: HashSet<TargetHandle>,
    enabled: HashSet<Capability>,
    unsupported: HashSet<Capability>,
    failing: HashSet<Attachment>,
    errors: VecDeque<String>,
    bound_mesh: Option<MeshHandle>,
    enabled_attributes: HashSet<u32>,
    depth_write: bool,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            stats: FrameStats::default(),
            next_id: 1,
            viewport: (width, height),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            live_meshes: HashSet::new(),
            live_textures: HashSet::new(),
            live_targets: HashSet::new(),
            enabled: HashSet::new(),
            unsupported: HashSet::new(),
            failing: HashSet::new(),
            errors: VecDeque::new(),
            bound_mesh: None,
            enabled_attributes: HashSet::new(),
            depth_write: true,
        }
    }

    /// Report `capability` as unsupported from now on.
    pub fn without_capability(mut self, capability: Capability) -> Self {
        self.unsupported.insert(capability);
        self
    }

    /// Make every future `attach` of this kind queue an error.
    pub fn fail_attachment(&mut self, attachment: Attachment) {
        self.failing.insert(attachment);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Count recorded commands matching a predicate.
    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| pred(c)).count()
    }

    /// Last value stored for a named uniform of `program`.
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        let p = self.programs.get(&program)?;
        let index = p.uniforms.iter().position(|u| u == name)?;
        p.values.get(&(index as u32)).copied()
    }

    pub fn program_named(&self, name: &str) -> Option<ProgramHandle> {
        self.programs
            .iter()
            .find(|(_, p)| p.name == name)
            .map(|(handle, _)| *handle)
    }

    /// Last data uploaded to an instance buffer.
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[f32]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn live_resource_count(&self) -> usize {
        self.live_meshes.len()
            + self.live_textures.len()
            + self.live_targets.len()
            + self.buffers.len()
            + self.programs.len()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl RenderDevice for RecordingDevice {
    fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> MeshHandle {
        let mesh = MeshHandle(self.next());
        self.live_meshes.insert(mesh);
        log::trace!("mesh '{}' -> {:?}", desc.label, mesh);
        self.commands.push(Command::CreateMesh(mesh));
        mesh
    }

    fn create_instance_buffer(&mut self, float_capacity: usize) -> BufferHandle {
        let buffer = BufferHandle(self.next());
        self.buffers.insert(buffer, Vec::with_capacity(float_capacity));
        self.commands.push(Command::CreateBuffer(buffer));
        buffer
    }

    fn add_instanced_attribute(
        &mut self,
        mesh: MeshHandle,
        buffer: BufferHandle,
        location: u32,
        _components: u32,
        _stride: u32,
        _offset: u32,
    ) {
        self.commands.push(Command::AddInstancedAttribute {
            mesh,
            buffer,
            location,
        });
    }

    fn update_buffer(&mut self, buffer: BufferHandle, data: &[f32]) {
        if let Some(stored) = self.buffers.get_mut(&buffer) {
            stored.clear();
            stored.extend_from_slice(data);
        }
        self.stats.buffer_uploads += 1;
        self.commands.push(Command::UpdateBuffer {
            buffer,
            floats: data.len(),
        });
    }

    fn create_texture(&mut self, _desc: &TextureDesc<'_>) -> TextureHandle {
        let texture = TextureHandle(self.next());
        self.live_textures.insert(texture);
        self.commands.push(Command::CreateTexture(texture));
        texture
    }

    fn create_cube_map(&mut self, _desc: &CubeMapDesc<'_>) -> TextureHandle {
        let texture = TextureHandle(self.next());
        self.live_textures.insert(texture);
        self.commands.push(Command::CreateTexture(texture));
        texture
    }

    fn create_render_target(&mut self, _width: u32, _height: u32) -> TargetHandle {
        let target = TargetHandle(self.next());
        self.live_targets.insert(target);
        self.commands.push(Command::CreateTarget(target));
        target
    }

    fn attach(&mut self, target: TargetHandle, attachment: Attachment) -> Option<TextureHandle> {
        self.commands.push(Command::Attach { target, attachment });
        if self.failing.contains(&attachment) {
            self.errors
                .push_back(format!("incomplete attachment {attachment:?} on {target:?}"));
        }
        match attachment {
            Attachment::DepthBuffer => None,
            Attachment::ColourTexture | Attachment::DepthTexture => {
                let texture = TextureHandle(self.next());
                self.live_textures.insert(texture);
                Some(texture)
            }
        }
    }

    fn check_error(&mut self) -> Option<String> {
        self.errors.pop_front()
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle> {
        if source.wgsl.trim().is_empty() {
            return Err(FjordError::Shader {
                program: source.name.to_string(),
                reason: "empty source".into(),
            });
        }
        let program = ProgramHandle(self.next());
        self.programs.insert(
            program,
            RecordedProgram {
                name: source.name.to_string(),
                uniforms: source.uniforms.iter().map(|(n, _)| n.to_string()).collect(),
                values: HashMap::new(),
            },
        );
        self.commands.push(Command::CreateProgram(program));
        Ok(program)
    }

    fn bind_attribute(&mut self, program: ProgramHandle, location: u32, _name: &str) {
        self.commands
            .push(Command::BindAttribute { program, location });
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(&program)?;
        let index = p.uniforms.iter().position(|u| u == name)?;
        Some(UniformLocation {
            program,
            index: index as u32,
        })
    }

    fn delete_mesh(&mut self, mesh: MeshHandle) {
        self.live_meshes.remove(&mesh);
        self.commands.push(Command::Delete);
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.commands.push(Command::Delete);
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.live_textures.remove(&texture);
        self.commands.push(Command::Delete);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.commands.push(Command::Delete);
    }

    fn delete_target(&mut self, target: TargetHandle) {
        self.live_targets.remove(&target);
        self.commands.push(Command::Delete);
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        if program.is_some() {
            self.stats.program_binds += 1;
        }
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(p) = self.programs.get_mut(&location.program) else {
            return;
        };
        let Some(name) = p.uniforms.get(location.index as usize).cloned() else {
            return;
        };
        p.values.insert(location.index, value);
        self.commands.push(Command::SetUniform {
            program: location.program,
            name,
            value,
        });
    }

    fn bind_target(&mut self, target: Option<TargetHandle>, width: u32, height: u32) {
        self.stats.target_binds += 1;
        self.commands.push(Command::BindTarget {
            target,
            width,
            height,
        });
    }

    fn clear(&mut self, colour: Vec4, flags: ClearFlags) {
        self.commands.push(Command::Clear { colour, flags });
    }

    fn is_supported(&self, capability: Capability) -> bool {
        !self.unsupported.contains(&capability)
    }

    fn enable(&mut self, capability: Capability) {
        self.enabled.insert(capability);
        self.commands.push(Command::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.enabled.remove(&capability);
        self.commands.push(Command::Disable(capability));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.commands.push(Command::BlendFunc(src, dst));
    }

    fn depth_mask(&mut self, write: bool) {
        self.depth_write = write;
        self.commands.push(Command::DepthMask(write));
    }

    fn bind_mesh(&mut self, mesh: Option<MeshHandle>) {
        if mesh.is_some() {
            self.stats.mesh_binds += 1;
        }
        self.bound_mesh = mesh;
        self.commands.push(Command::BindMesh(mesh));
    }

    fn enable_attribute(&mut self, location: u32) {
        self.enabled_attributes.insert(location);
        self.commands.push(Command::EnableAttribute(location));
    }

    fn disable_attribute(&mut self, location: u32) {
        self.enabled_attributes.remove(&location);
        self.commands.push(Command::DisableAttribute(location));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if texture.is_some() {
            self.stats.texture_binds += 1;
        }
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn draw_elements(&mut self, primitive: Primitive, count: u32) {
        self.stats.draw_calls += 1;
        self.stats.vertices += count;
        self.commands
            .push(Command::DrawElements { primitive, count });
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: u32, count: u32) {
        self.stats.draw_calls += 1;
        self.stats.vertices += count;
        self.commands.push(Command::DrawArrays {
            primitive,
            first,
            count,
        });
    }

    fn draw_arrays_instanced(&mut self, primitive: Primitive, _first: u32, count: u32, instances: u32) {
        self.stats.draw_calls += 1;
        self.stats.instanced_draws += 1;
        self.stats.instances += instances;
        self.stats.vertices += count * instances;
        self.commands.push(Command::DrawArraysInstanced {
            primitive,
            count,
            instances,
        });
    }

    fn begin_frame(&mut self) {
        self.stats = FrameStats::default();
        self.commands.push(Command::BeginFrame);
    }

    fn end_frame(&mut self) -> Result<()> {
        self.commands.push(Command::EndFrame);
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.stats
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }
}
