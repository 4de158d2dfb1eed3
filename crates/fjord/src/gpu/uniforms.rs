//! Uniform block layout.
//!
//! Programs declare their uniforms as an ordered list of `(name, kind)`.
//! The WGSL side declares a struct with the same fields in the same order,
//! and [`UniformLayout`] computes where each field lands under WGSL's
//! uniform address-space rules:
//!
//! | kind  | align | size |
//! |-------|-------|------|
//! | f32   | 4     | 4    |
//! | vec2  | 8     | 8    |
//! | vec3  | 16    | 12   |
//! | vec4  | 16    | 16   |
//! | mat4  | 16    | 64   |
//!
//! A vec3 followed by an f32 shares one 16-byte slot, exactly as in WGSL.
//! The struct size is rounded up to 16.

use super::{UniformKind, UniformValue};

fn align_and_size(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
        UniformKind::Mat4 => (16, 64),
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
pub(crate) fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Byte offsets of each declared uniform plus the padded block size.
#[derive(Debug, Clone)]
pub(crate) struct UniformLayout {
    fields: Vec<(UniformKind, usize)>,
    size: usize,
}

impl UniformLayout {
    pub fn new(uniforms: &[(&str, UniformKind)]) -> Self {
        let mut offset = 0;
        let mut fields = Vec::with_capacity(uniforms.len());
        for (_, kind) in uniforms {
            let (align, size) = align_and_size(*kind);
            offset = align_up(offset, align);
            fields.push((*kind, offset));
            offset += size;
        }
        // An empty block still needs a bindable size.
        let size = align_up(offset.max(16), 16);
        Self { fields, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Write `value` into `block` at field `index`. Returns false on a kind
    /// mismatch or an unknown index.
    pub fn write(&self, block: &mut [u8], index: usize, value: &UniformValue) -> bool {
        let Some(&(kind, offset)) = self.fields.get(index) else {
            return false;
        };
        if kind != value.kind() {
            return false;
        }
        match value {
            UniformValue::Float(v) => put(block, offset, &[*v]),
            UniformValue::Vec2(v) => put(block, offset, &v.to_array()),
            UniformValue::Vec3(v) => put(block, offset, &v.to_array()),
            UniformValue::Vec4(v) => put(block, offset, &v.to_array()),
            UniformValue::Mat4(m) => put(block, offset, &m.to_cols_array()),
        }
        true
    }
}

fn put(block: &mut [u8], offset: usize, floats: &[f32]) {
    let bytes: &[u8] = bytemuck::cast_slice(floats);
    block[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn offset(layout: &UniformLayout, index: usize) -> Option<usize> {
        layout.fields.get(index).map(|(_, offset)| *offset)
    }

    #[test]
    fn vec3_then_float_share_a_slot() {
        let layout = UniformLayout::new(&[
            ("m", UniformKind::Mat4),
            ("colour", UniformKind::Vec3),
            ("shine", UniformKind::Float),
            ("offset", UniformKind::Vec2),
        ]);
        assert_eq!(offset(&layout, 0), Some(0));
        assert_eq!(offset(&layout, 1), Some(64));
        assert_eq!(offset(&layout, 2), Some(76));
        assert_eq!(offset(&layout, 3), Some(80));
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn float_before_vec3_pads_to_sixteen() {
        let layout = UniformLayout::new(&[("a", UniformKind::Float), ("b", UniformKind::Vec3)]);
        assert_eq!(offset(&layout, 1), Some(16));
        assert_eq!(layout.size(), 32);
    }

    #[test]
    fn write_checks_kind() {
        let layout = UniformLayout::new(&[("m", UniformKind::Mat4), ("v", UniformKind::Vec3)]);
        let mut block = vec![0u8; layout.size()];
        assert!(layout.write(&mut block, 1, &UniformValue::Vec3(Vec3::new(1.0, 2.0, 3.0))));
        assert!(!layout.write(&mut block, 0, &UniformValue::Float(1.0)));
        assert!(layout.write(&mut block, 0, &UniformValue::Mat4(Mat4::IDENTITY)));
        let floats: Vec<f32> = block
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(&floats[16..19], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[0], 1.0);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }
}
