//! Meshes and materials.
//!
//! A [`TexturedModel`] pairs a [`RawModel`] (mesh handle plus element count)
//! with a [`ModelTexture`] (texture plus shading parameters). Entities share
//! one model through an `Rc`, and the batch map groups entities by that
//! shared allocation.

use crate::gpu::{MeshHandle, TextureHandle};

/// A mesh uploaded through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawModel {
    pub mesh: MeshHandle,
    /// Index count for indexed meshes, vertex count otherwise.
    pub vertex_count: u32,
}

/// Texture plus the shading parameters the entity programs read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelTexture {
    pub texture: TextureHandle,
    pub normal_map: Option<TextureHandle>,
    pub shine_damper: f32,
    pub reflectivity: f32,
    /// Draw with back-face culling off.
    pub has_transparency: bool,
    /// Light as if every normal pointed up.
    pub use_fake_lighting: bool,
    /// Rows (and columns) of a square texture atlas.
    pub number_of_rows: u32,
}

impl ModelTexture {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            normal_map: None,
            shine_damper: 1.0,
            reflectivity: 0.0,
            has_transparency: false,
            use_fake_lighting: false,
            number_of_rows: 1,
        }
    }

    pub fn with_normal_map(mut self, normal_map: TextureHandle) -> Self {
        self.normal_map = Some(normal_map);
        self
    }

    pub fn with_shine(mut self, shine_damper: f32, reflectivity: f32) -> Self {
        self.shine_damper = shine_damper;
        self.reflectivity = reflectivity;
        self
    }

    pub fn with_transparency(mut self, has_transparency: bool) -> Self {
        self.has_transparency = has_transparency;
        self
    }

    pub fn with_fake_lighting(mut self, use_fake_lighting: bool) -> Self {
        self.use_fake_lighting = use_fake_lighting;
        self
    }

    pub fn with_rows(mut self, number_of_rows: u32) -> Self {
        self.number_of_rows = number_of_rows.max(1);
        self
    }
}

/// The batching key: one mesh drawn with one material.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedModel {
    pub raw: RawModel,
    pub texture: ModelTexture,
}

impl TexturedModel {
    pub fn new(raw: RawModel, texture: ModelTexture) -> Self {
        Self { raw, texture }
    }
}
