//! Distance-field text.
//!
//! Glyph layout happens outside this crate: callers hand over a laid-out
//! [`TextMeshData`] with each [`GuiText`]. The [`TextRegistry`] uploads the
//! mesh and files the text under its font so the [`FontRenderer`] binds each
//! atlas once.

use crate::error::Result;
use crate::gpu::{
    BlendFactor, Capability, Primitive, ProgramSource, RenderDevice, TextureHandle, TextureKind,
    UniformKind,
};
use crate::math::{Vec2, Vec3};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;
use crate::shader::ShaderProgram;

pub(crate) const SOURCE: ProgramSource = ProgramSource {
    name: "font",
    wgsl: include_str!("../shaders/font.wgsl"),
    attributes: &[(0, "position"), (1, "texture_coords")],
    uniforms: &[
        ("colour", UniformKind::Vec3),
        ("width", UniformKind::Float),
        ("outline_colour", UniformKind::Vec3),
        ("edge", UniformKind::Float),
        ("translation", UniformKind::Vec2),
        ("offset", UniformKind::Vec2),
        ("border_width", UniformKind::Float),
        ("border_edge", UniformKind::Float),
    ],
    textures: &[("font_atlas", TextureKind::D2)],
};

/// A font is identified by its distance-field atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontType {
    pub atlas: TextureHandle,
}

impl FontType {
    pub fn new(atlas: TextureHandle) -> Self {
        Self { atlas }
    }
}

/// Laid-out glyph quads: 2D positions and atlas uvs, six vertices per glyph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMeshData {
    pub positions: Vec<f32>,
    pub uvs: Vec<f32>,
}

impl TextMeshData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 2
    }
}

/// One piece of on-screen text and its styling.
#[derive(Debug, Clone, PartialEq)]
pub struct GuiText {
    pub text: String,
    pub font: FontType,
    pub font_size: f32,
    /// Top-left corner in screen units, `(0, 0)` to `(1, 1)`.
    pub position: Vec2,
    pub max_line_length: f32,
    pub centered: bool,
    pub colour: Vec3,
    pub width: f32,
    pub edge: f32,
    pub border_width: f32,
    pub border_edge: f32,
    /// Outline sample offset in atlas space; non-zero gives a drop shadow.
    pub offset: Vec2,
    pub outline_colour: Vec3,
    mesh: Option<RawModel>,
}

impl GuiText {
    pub fn new(text: impl Into<String>, font_size: f32, font: FontType, position: Vec2) -> Self {
        Self {
            text: text.into(),
            font,
            font_size,
            position,
            max_line_length: 1.0,
            centered: false,
            colour: Vec3::ZERO,
            width: 0.5,
            edge: 0.1,
            border_width: 0.0,
            border_edge: 0.01,
            offset: Vec2::ZERO,
            outline_colour: Vec3::ZERO,
            mesh: None,
        }
    }

    pub fn with_colour(mut self, colour: Vec3) -> Self {
        self.colour = colour;
        self
    }

    pub fn with_line(mut self, max_line_length: f32, centered: bool) -> Self {
        self.max_line_length = max_line_length;
        self.centered = centered;
        self
    }

    pub fn with_glyph_edge(mut self, width: f32, edge: f32) -> Self {
        self.width = width;
        self.edge = edge;
        self
    }

    pub fn with_outline(mut self, border_width: f32, border_edge: f32, colour: Vec3) -> Self {
        self.border_width = border_width;
        self.border_edge = border_edge;
        self.outline_colour = colour;
        self
    }

    pub fn with_shadow_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    /// The uploaded mesh, once the text is registered.
    pub fn mesh(&self) -> Option<RawModel> {
        self.mesh
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextId(u32);

/// Registered texts, grouped by font in first-use order.
#[derive(Debug, Default)]
pub struct TextRegistry {
    next_id: u32,
    fonts: Vec<(FontType, Vec<(TextId, GuiText)>)>,
}

impl TextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload `mesh` for `text` and start drawing it.
    pub fn load_text(
        &mut self,
        mut text: GuiText,
        mesh: &TextMeshData,
        registry: &mut ResourceRegistry,
        device: &mut dyn RenderDevice,
    ) -> TextId {
        text.mesh = Some(registry.load_text_mesh(device, &mesh.positions, &mesh.uvs));
        let id = TextId(self.next_id);
        self.next_id += 1;

        let font = text.font;
        match self.fonts.iter_mut().find(|(f, _)| *f == font) {
            Some((_, texts)) => texts.push((id, text)),
            None => self.fonts.push((font, vec![(id, text)])),
        }
        id
    }

    /// Stop drawing a text and release its mesh. A font with no texts left
    /// is dropped.
    pub fn remove_text(
        &mut self,
        id: TextId,
        registry: &mut ResourceRegistry,
        device: &mut dyn RenderDevice,
    ) -> Option<GuiText> {
        let font_index = self
            .fonts
            .iter()
            .position(|(_, texts)| texts.iter().any(|(t, _)| *t == id))?;
        let texts = &mut self.fonts[font_index].1;
        let text_index = texts.iter().position(|(t, _)| *t == id)?;
        let (_, text) = texts.remove(text_index);
        if texts.is_empty() {
            self.fonts.remove(font_index);
        }
        if let Some(mesh) = text.mesh {
            registry.release_mesh(device, mesh.mesh);
        }
        Some(text)
    }

    pub fn get_mut(&mut self, id: TextId) -> Option<&mut GuiText> {
        self.fonts
            .iter_mut()
            .flat_map(|(_, texts)| texts.iter_mut())
            .find(|(t, _)| *t == id)
            .map(|(_, text)| text)
    }

    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }

    pub fn text_count(&self) -> usize {
        self.fonts.iter().map(|(_, texts)| texts.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FontType, impl Iterator<Item = &GuiText>)> {
        self.fonts
            .iter()
            .map(|(font, texts)| (font, texts.iter().map(|(_, text)| text)))
    }
}

pub struct FontRenderer {
    shader: ShaderProgram,
}

impl FontRenderer {
    pub fn new(device: &mut dyn RenderDevice) -> Result<Self> {
        Ok(Self {
            shader: ShaderProgram::compile(device, &SOURCE)?,
        })
    }

    pub fn render(&self, device: &mut dyn RenderDevice, texts: &TextRegistry) {
        if texts.font_count() == 0 {
            return;
        }
        device.enable(Capability::Blend);
        device.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
        device.disable(Capability::DepthTest);
        self.shader.start(device);

        for (font, font_texts) in texts.iter() {
            device.bind_texture(0, Some(font.atlas));
            for text in font_texts {
                self.render_text(device, text);
            }
        }

        self.shader.stop(device);
        device.disable(Capability::Blend);
        device.enable(Capability::DepthTest);
    }

    fn render_text(&self, device: &mut dyn RenderDevice, text: &GuiText) {
        let Some(mesh) = text.mesh else {
            return;
        };
        device.bind_mesh(Some(mesh.mesh));
        device.enable_attribute(0);
        device.enable_attribute(1);
        self.shader.set(device, "colour", text.colour);
        self.shader.set(device, "translation", text.position);
        self.shader.set(device, "width", text.width);
        self.shader.set(device, "edge", text.edge);
        self.shader.set(device, "border_width", text.border_width);
        self.shader.set(device, "border_edge", text.border_edge);
        self.shader.set(device, "offset", text.offset);
        self.shader.set(device, "outline_colour", text.outline_colour);
        device.draw_arrays(Primitive::Triangles, 0, mesh.vertex_count);
        device.disable_attribute(0);
        device.disable_attribute(1);
        device.bind_mesh(None);
    }

    pub fn clean_up(&self, device: &mut dyn RenderDevice) {
        self.shader.clean_up(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    fn glyphs(n: usize) -> TextMeshData {
        TextMeshData {
            positions: vec![0.0; n * 12],
            uvs: vec![0.0; n * 12],
        }
    }

    #[test]
    fn texts_group_by_font_and_empty_fonts_are_dropped() {
        let mut device = RecordingDevice::new(640, 480);
        let mut registry = ResourceRegistry::new();
        let mut texts = TextRegistry::new();
        let arial = FontType::new(TextureHandle(1));
        let mono = FontType::new(TextureHandle(2));

        let a = texts.load_text(GuiText::new("fps", 1.0, arial, Vec2::ZERO), &glyphs(3), &mut registry, &mut device);
        let b = texts.load_text(GuiText::new("hp", 1.0, mono, Vec2::ZERO), &glyphs(2), &mut registry, &mut device);
        texts.load_text(GuiText::new("score", 1.0, arial, Vec2::ZERO), &glyphs(5), &mut registry, &mut device);
        assert_eq!(texts.font_count(), 2);
        assert_eq!(texts.text_count(), 3);

        let removed = texts.remove_text(b, &mut registry, &mut device).unwrap();
        assert_eq!(removed.text, "hp");
        assert_eq!(texts.font_count(), 1);
        assert!(texts.remove_text(b, &mut registry, &mut device).is_none());
        assert_eq!(registry.allocation_count(), 2);

        texts.get_mut(a).unwrap().colour = Vec3::ONE;
        let first = texts.iter().next().unwrap().1.next().unwrap();
        assert_eq!(first.colour, Vec3::ONE);
    }

    #[test]
    fn one_atlas_bind_per_font() {
        let mut device = RecordingDevice::new(640, 480);
        let mut registry = ResourceRegistry::new();
        let mut texts = TextRegistry::new();
        let font = FontType::new(TextureHandle(1));
        for word in ["a", "bb", "ccc"] {
            let text = GuiText::new(word, 1.0, font, Vec2::ZERO);
            texts.load_text(text, &glyphs(word.len()), &mut registry, &mut device);
        }
        let renderer = FontRenderer::new(&mut device).unwrap();
        device.begin_frame();
        renderer.render(&mut device, &texts);

        let stats = device.frame_stats();
        assert_eq!(stats.texture_binds, 1);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(stats.vertices, 36);
    }
}
