use crate::gpu::TextureHandle;
use crate::math::Vec2;

/// A particle texture atlas. Stages run row-major through `rows x cols`
/// cells over a particle's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleTexture {
    pub texture: TextureHandle,
    pub rows: u32,
    pub cols: u32,
    /// Blend with `(SRC_ALPHA, ONE)` instead of regular alpha blending.
    pub additive: bool,
}

impl ParticleTexture {
    /// A square atlas with `rows` rows and columns.
    pub fn new(texture: TextureHandle, rows: u32) -> Self {
        let rows = rows.max(1);
        Self {
            texture,
            rows,
            cols: rows,
            additive: false,
        }
    }

    pub fn with_columns(mut self, cols: u32) -> Self {
        self.cols = cols.max(1);
        self
    }

    pub fn with_additive(mut self, additive: bool) -> Self {
        self.additive = additive;
        self
    }

    pub fn stage_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Top-left uv of atlas cell `index`.
    pub fn offset(&self, index: u32) -> Vec2 {
        let column = index % self.cols;
        let row = index / self.cols;
        Vec2::new(column as f32 / self.cols as f32, row as f32 / self.rows as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_walk_rows() {
        let atlas = ParticleTexture::new(TextureHandle(1), 4);
        assert_eq!(atlas.stage_count(), 16);
        assert_eq!(atlas.offset(0), Vec2::ZERO);
        assert_eq!(atlas.offset(5), Vec2::new(0.25, 0.25));
        assert_eq!(atlas.offset(15), Vec2::new(0.75, 0.75));
    }

    #[test]
    fn rectangular_atlas() {
        let atlas = ParticleTexture::new(TextureHandle(1), 2).with_columns(4);
        assert_eq!(atlas.stage_count(), 8);
        assert_eq!(atlas.offset(5), Vec2::new(0.25, 0.5));
    }
}
