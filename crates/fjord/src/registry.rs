//! # Resource Registry: Every GPU Allocation in One Place
//!
//! Renderers never create GPU resources on their own. They ask the
//! [`ResourceRegistry`], which forwards to the device and remembers the
//! handle. At shutdown a single [`clean_up`](ResourceRegistry::clean_up)
//! releases everything in reverse kind order (meshes, buffers, textures).
//!
//! ## Attribute slots
//!
//! Mesh loaders fix the attribute layout every entity program expects:
//!
//! ```text
//! slot 0  position  (3 floats, 2 for GUI and text)
//! slot 1  uv        (2 floats)
//! slot 2  normal    (3 floats)
//! slot 3  tangent   (3 floats, normal-mapped meshes only)
//! ```
//!
//! ## Textures from disk
//!
//! File textures go through `image`, are converted to RGBA8 and uploaded with
//! mipmaps. Paths are deduplicated: loading the same file twice returns the
//! same handle. A file that cannot be decoded is an [`FjordError::Asset`];
//! [`load_texture_or_exit`](ResourceRegistry::load_texture_or_exit) turns that
//! into a logged, fatal exit for start-up code with no sensible fallback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{FjordError, Result};
use crate::gpu::{
    BufferHandle, CubeMapDesc, Filter, MeshDesc, MeshHandle, RenderDevice, TextureDesc,
    TextureHandle, VertexAttribute,
};
use crate::model::RawModel;

/// Mip bias for file textures, sharpening distant surfaces.
const TEXTURE_LOD_BIAS: f32 = -2.4;

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    meshes: Vec<MeshHandle>,
    buffers: Vec<BufferHandle>,
    textures: Vec<TextureHandle>,
    path_cache: HashMap<PathBuf, TextureHandle>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn mesh(
        &mut self,
        device: &mut dyn RenderDevice,
        label: &str,
        attributes: &[VertexAttribute<'_>],
        indices: Option<&[u32]>,
    ) -> RawModel {
        let desc = MeshDesc {
            label,
            attributes,
            indices,
        };
        let mesh = device.create_mesh(&desc);
        self.meshes.push(mesh);
        RawModel {
            mesh,
            vertex_count: desc.element_count(),
        }
    }

    /// Indexed mesh with positions, uvs and normals in slots 0 to 2.
    pub fn load_to_vao(
        &mut self,
        device: &mut dyn RenderDevice,
        positions: &[f32],
        uvs: &[f32],
        normals: &[f32],
        indices: &[u32],
    ) -> RawModel {
        self.mesh(
            device,
            "model",
            &[
                VertexAttribute { location: 0, components: 3, data: positions },
                VertexAttribute { location: 1, components: 2, data: uvs },
                VertexAttribute { location: 2, components: 3, data: normals },
            ],
            Some(indices),
        )
    }

    /// Like [`load_to_vao`](Self::load_to_vao) plus tangents in slot 3.
    pub fn load_to_vao_tangents(
        &mut self,
        device: &mut dyn RenderDevice,
        positions: &[f32],
        uvs: &[f32],
        normals: &[f32],
        tangents: &[f32],
        indices: &[u32],
    ) -> RawModel {
        self.mesh(
            device,
            "normal mapped model",
            &[
                VertexAttribute { location: 0, components: 3, data: positions },
                VertexAttribute { location: 1, components: 2, data: uvs },
                VertexAttribute { location: 2, components: 3, data: normals },
                VertexAttribute { location: 3, components: 3, data: tangents },
            ],
            Some(indices),
        )
    }

    /// Non-indexed positions-only mesh with `dimensions` floats per vertex.
    pub fn load_positions(
        &mut self,
        device: &mut dyn RenderDevice,
        positions: &[f32],
        dimensions: u32,
    ) -> RawModel {
        self.mesh(
            device,
            "positions",
            &[VertexAttribute { location: 0, components: dimensions, data: positions }],
            None,
        )
    }

    /// Non-indexed 2D positions plus uvs, as produced by glyph layout.
    pub fn load_text_mesh(
        &mut self,
        device: &mut dyn RenderDevice,
        positions: &[f32],
        uvs: &[f32],
    ) -> RawModel {
        self.mesh(
            device,
            "text",
            &[
                VertexAttribute { location: 0, components: 2, data: positions },
                VertexAttribute { location: 1, components: 2, data: uvs },
            ],
            None,
        )
    }

    /// A streaming buffer for per-instance data.
    pub fn create_empty_vbo(&mut self, device: &mut dyn RenderDevice, float_count: usize) -> BufferHandle {
        let buffer = device.create_instance_buffer(float_count);
        self.buffers.push(buffer);
        buffer
    }

    /// Feed `components` floats per instance to `location`; `stride` and
    /// `offset` are in floats.
    pub fn add_instanced_attribute(
        &self,
        device: &mut dyn RenderDevice,
        mesh: MeshHandle,
        buffer: BufferHandle,
        location: u32,
        components: u32,
        stride: u32,
        offset: u32,
    ) {
        device.add_instanced_attribute(mesh, buffer, location, components, stride, offset);
    }

    /// Upload raw RGBA8 pixels.
    pub fn load_texture_rgba8(
        &mut self,
        device: &mut dyn RenderDevice,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
        filter: Filter,
        mipmaps: bool,
    ) -> TextureHandle {
        let texture = device.create_texture(&TextureDesc {
            label,
            width,
            height,
            rgba,
            filter,
            mipmaps,
            lod_bias: if mipmaps { TEXTURE_LOD_BIAS } else { 0.0 },
        });
        self.textures.push(texture);
        texture
    }

    /// Decode an image file and upload it with mipmaps.
    pub fn load_texture(&mut self, device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> Result<TextureHandle> {
        let path = path.as_ref();
        if let Some(&handle) = self.path_cache.get(path) {
            return Ok(handle);
        }
        let img = image::open(path)
            .map_err(|e| FjordError::Asset {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgba8();
        let (width, height) = img.dimensions();
        let label = path.display().to_string();
        let handle =
            self.load_texture_rgba8(device, &label, width, height, img.as_raw(), Filter::Linear, true);
        self.path_cache.insert(path.to_path_buf(), handle);
        log::info!("Loaded texture '{label}' ({width}x{height})");
        Ok(handle)
    }

    /// [`load_texture`](Self::load_texture), but a failure is fatal: the
    /// error is logged and the process exits with status 1.
    pub fn load_texture_or_exit(&mut self, device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> TextureHandle {
        match self.load_texture(device, path) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        }
    }

    /// Upload six RGBA8 faces (right, left, top, bottom, back, front).
    pub fn load_cube_map_rgba8(
        &mut self,
        device: &mut dyn RenderDevice,
        label: &str,
        size: u32,
        faces: [&[u8]; 6],
    ) -> TextureHandle {
        let texture = device.create_cube_map(&CubeMapDesc { label, size, faces });
        self.textures.push(texture);
        texture
    }

    /// Decode six square image files into a cube map. All faces must share
    /// one size.
    pub fn load_cube_map<P: AsRef<Path>>(
        &mut self,
        device: &mut dyn RenderDevice,
        paths: &[P; 6],
    ) -> Result<TextureHandle> {
        let mut faces = Vec::with_capacity(6);
        let mut size = None;
        for path in paths {
            let path = path.as_ref();
            let img = image::open(path)
                .map_err(|e| FjordError::Asset {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
                .to_rgba8();
            let (w, h) = img.dimensions();
            if w != h || size.is_some_and(|s| s != w) {
                return Err(FjordError::Asset {
                    path: path.to_path_buf(),
                    reason: format!("cube face is {w}x{h}, faces must be square and equal"),
                });
            }
            size = Some(w);
            faces.push(img.into_raw());
        }
        let label = paths[0].as_ref().display().to_string();
        let faces: [&[u8]; 6] = std::array::from_fn(|i| faces[i].as_slice());
        Ok(self.load_cube_map_rgba8(device, &label, size.unwrap_or(0), faces))
    }

    /// Delete one mesh before shutdown. Unknown handles are ignored.
    pub fn release_mesh(&mut self, device: &mut dyn RenderDevice, mesh: MeshHandle) {
        if let Some(i) = self.meshes.iter().position(|m| *m == mesh) {
            self.meshes.swap_remove(i);
            device.delete_mesh(mesh);
        }
    }

    /// Number of live allocations (meshes, buffers, textures).
    pub fn allocation_count(&self) -> usize {
        self.meshes.len() + self.buffers.len() + self.textures.len()
    }

    /// Release every tracked allocation.
    pub fn clean_up(&mut self, device: &mut dyn RenderDevice) {
        log::info!(
            "Releasing {} meshes, {} buffers, {} textures",
            self.meshes.len(),
            self.buffers.len(),
            self.textures.len()
        );
        for mesh in self.meshes.drain(..) {
            device.delete_mesh(mesh);
        }
        for buffer in self.buffers.drain(..) {
            device.delete_buffer(buffer);
        }
        for texture in self.textures.drain(..) {
            device.delete_texture(texture);
        }
        self.path_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    #[test]
    fn indexed_mesh_counts_indices() {
        let mut device = RecordingDevice::new(64, 64);
        let mut registry = ResourceRegistry::new();
        let positions = [0.0f32; 12];
        let uvs = [0.0f32; 8];
        let normals = [0.0f32; 12];
        let model = registry.load_to_vao(&mut device, &positions, &uvs, &normals, &[0, 1, 2, 2, 1, 3]);
        assert_eq!(model.vertex_count, 6);
    }

    #[test]
    fn positions_mesh_counts_vertices() {
        let mut device = RecordingDevice::new(64, 64);
        let mut registry = ResourceRegistry::new();
        let quad = [-1.0f32, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0];
        assert_eq!(registry.load_positions(&mut device, &quad, 2).vertex_count, 4);
    }

    #[test]
    fn missing_texture_is_an_asset_error() {
        let mut device = RecordingDevice::new(64, 64);
        let mut registry = ResourceRegistry::new();
        let err = registry
            .load_texture(&mut device, "does/not/exist.png")
            .unwrap_err();
        assert!(matches!(err, FjordError::Asset { .. }));
        assert_eq!(registry.allocation_count(), 0);
    }

    #[test]
    fn clean_up_releases_everything() {
        let mut device = RecordingDevice::new(64, 64);
        let mut registry = ResourceRegistry::new();
        registry.load_positions(&mut device, &[0.0; 6], 2);
        registry.create_empty_vbo(&mut device, 64);
        registry.load_texture_rgba8(&mut device, "white", 1, 1, &[255; 4], Filter::Nearest, false);
        registry.load_cube_map_rgba8(&mut device, "sky", 1, [&[0u8; 4][..]; 6]);
        assert_eq!(registry.allocation_count(), 4);
        assert_eq!(device.live_resource_count(), 4);

        registry.clean_up(&mut device);
        assert_eq!(registry.allocation_count(), 0);
        assert_eq!(device.live_resource_count(), 0);
    }
}
