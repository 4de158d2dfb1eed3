use crate::math::{Mat4, Vec3, transformation_matrix};

/// Half the side length of a water tile in world units.
pub const TILE_SIZE: f32 = 60.0;

/// A flat square of water centred on `(x, z)` at `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterTile {
    pub x: f32,
    pub z: f32,
    pub height: f32,
}

impl WaterTile {
    pub fn new(x: f32, z: f32, height: f32) -> Self {
        Self { x, z, height }
    }

    pub fn model_matrix(&self) -> Mat4 {
        transformation_matrix(Vec3::new(self.x, self.height, self.z), Vec3::ZERO, TILE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_matrix_places_and_scales_the_quad() {
        let tile = WaterTile::new(75.0, -75.0, 2.0);
        let corner = tile.model_matrix().transform_point3(Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(corner, Vec3::new(135.0, 2.0, -135.0));
    }
}
