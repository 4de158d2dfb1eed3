//! Terrain tiles: a square height grid turned into an indexed mesh, plus the
//! height query gameplay uses to keep things on the ground.
//!
//! Heights come from a collaborator through [`HeightGrid`]; this module only
//! meshes and samples them.

use std::rc::Rc;

use crate::gpu::{RenderDevice, TextureHandle};
use crate::math::{barycentric, Vec2, Vec3};
use crate::model::RawModel;
use crate::registry::ResourceRegistry;

/// Side length of one terrain tile in world units.
pub const SIZE: f32 = 1500.0;

/// Default grid resolution along each side.
pub const VERTEX_COUNT: usize = 128;

/// Square grid of heights, indexed `[x][z]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    n: usize,
    heights: Vec<f32>,
}

impl HeightGrid {
    /// Sample `f(x, z)` at every grid point. `n` is clamped to at least 2.
    pub fn from_fn(n: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let n = n.max(2);
        let mut heights = Vec::with_capacity(n * n);
        for x in 0..n {
            for z in 0..n {
                heights.push(f(x, z));
            }
        }
        Self { n, heights }
    }

    pub fn flat(n: usize, height: f32) -> Self {
        Self::from_fn(n, |_, _| height)
    }

    /// Vertices along one side.
    pub fn size(&self) -> usize {
        self.n
    }

    pub fn get(&self, x: usize, z: usize) -> f32 {
        self.heights[x * self.n + z]
    }

    /// Height at a possibly out-of-range index, clamped to the edge.
    fn clamped(&self, x: isize, z: isize) -> f32 {
        let last = self.n as isize - 1;
        self.get(x.clamp(0, last) as usize, z.clamp(0, last) as usize)
    }

    fn normal(&self, x: usize, z: usize) -> Vec3 {
        let (x, z) = (x as isize, z as isize);
        let left = self.clamped(x - 1, z);
        let right = self.clamped(x + 1, z);
        let down = self.clamped(x, z - 1);
        let up = self.clamped(x, z + 1);
        Vec3::new(left - right, 2.0, down - up).normalize()
    }
}

/// The four blended ground textures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainTexturePack {
    pub background: TextureHandle,
    pub r: TextureHandle,
    pub g: TextureHandle,
    pub b: TextureHandle,
}

/// One `SIZE` x `SIZE` tile placed at a grid cell. Clones share the
/// height grid.
#[derive(Debug, Clone)]
pub struct Terrain {
    pub x: f32,
    pub z: f32,
    pub model: RawModel,
    pub textures: TerrainTexturePack,
    pub blend_map: TextureHandle,
    heights: Rc<HeightGrid>,
}

/// Vertex streams and indices for a height grid.
#[derive(Debug, Clone, Default)]
pub(crate) struct TerrainMesh {
    pub positions: Vec<f32>,
    pub uvs: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
}

pub(crate) fn generate_mesh(heights: &HeightGrid) -> TerrainMesh {
    let n = heights.size();
    let last = (n - 1) as f32;
    let count = n * n;
    let mut mesh = TerrainMesh {
        positions: Vec::with_capacity(count * 3),
        uvs: Vec::with_capacity(count * 2),
        normals: Vec::with_capacity(count * 3),
        indices: Vec::with_capacity(6 * (n - 1) * (n - 1)),
    };

    // Row i runs along z, column j along x.
    for i in 0..n {
        for j in 0..n {
            mesh.positions.extend_from_slice(&[
                j as f32 / last * SIZE,
                heights.get(j, i),
                i as f32 / last * SIZE,
            ]);
            mesh.normals.extend_from_slice(&heights.normal(j, i).to_array());
            mesh.uvs.extend_from_slice(&[j as f32 / last, i as f32 / last]);
        }
    }

    let n = n as u32;
    for gz in 0..n - 1 {
        for gx in 0..n - 1 {
            let top_left = gz * n + gx;
            let top_right = top_left + 1;
            let bottom_left = (gz + 1) * n + gx;
            let bottom_right = bottom_left + 1;
            mesh.indices.extend_from_slice(&[
                top_left,
                bottom_left,
                top_right,
                top_right,
                bottom_left,
                bottom_right,
            ]);
        }
    }
    mesh
}

impl Terrain {
    /// Mesh `heights` and upload it as the tile at `(grid_x, grid_z)`.
    pub fn new(
        grid_x: i32,
        grid_z: i32,
        heights: HeightGrid,
        registry: &mut ResourceRegistry,
        device: &mut dyn RenderDevice,
        textures: TerrainTexturePack,
        blend_map: TextureHandle,
    ) -> Self {
        let mesh = generate_mesh(&heights);
        let model = registry.load_to_vao(device, &mesh.positions, &mesh.uvs, &mesh.normals, &mesh.indices);
        log::info!(
            "Terrain ({grid_x}, {grid_z}): {}x{} grid, {} indices",
            heights.size(),
            heights.size(),
            model.vertex_count
        );
        Self {
            x: grid_x as f32 * SIZE,
            z: grid_z as f32 * SIZE,
            model,
            textures,
            blend_map,
            heights: Rc::new(heights),
        }
    }

    pub fn heights(&self) -> &HeightGrid {
        &self.heights
    }

    /// Ground height under a world position; 0 off the tile.
    pub fn height_at(&self, world_x: f32, world_z: f32) -> f32 {
        let local_x = world_x - self.x;
        let local_z = world_z - self.z;
        let n = self.heights.size();
        let square = SIZE / (n - 1) as f32;

        let fx = grid_coordinate(local_x / square);
        let fz = grid_coordinate(local_z / square);
        let (gx, gz) = (fx.floor(), fz.floor());
        let limit = (n - 1) as f32;
        if !(gx >= 0.0 && gz >= 0.0 && gx < limit && gz < limit) {
            return 0.0;
        }
        // Cell and in-cell fraction come from the same quotient.
        let (xc, zc) = (fx - gx, fz - gz);
        let (gx, gz) = (gx as usize, gz as usize);

        let h = |x: usize, z: usize| self.heights.get(x, z);
        let pos = Vec2::new(xc, zc);
        if xc <= 1.0 - zc {
            barycentric(
                Vec3::new(0.0, h(gx, gz), 0.0),
                Vec3::new(1.0, h(gx + 1, gz), 0.0),
                Vec3::new(0.0, h(gx, gz + 1), 1.0),
                pos,
            )
        } else {
            barycentric(
                Vec3::new(1.0, h(gx + 1, gz), 0.0),
                Vec3::new(1.0, h(gx + 1, gz + 1), 1.0),
                Vec3::new(0.0, h(gx, gz + 1), 1.0),
                pos,
            )
        }
    }
}

/// Grid-space coordinate, snapped onto a grid line when rounding put it
/// within a hair of one, so vertex queries hit the vertex exactly.
fn grid_coordinate(q: f32) -> f32 {
    const SNAP: f32 = 1e-4;
    let nearest = q.round();
    if (q - nearest).abs() < SNAP { nearest } else { q }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    fn ramp(n: usize) -> HeightGrid {
        HeightGrid::from_fn(n, |x, z| (x * 3 + z) as f32)
    }

    fn terrain(heights: HeightGrid, grid_x: i32, grid_z: i32) -> Terrain {
        let mut device = RecordingDevice::new(64, 64);
        let mut registry = ResourceRegistry::new();
        let t = TextureHandle(0);
        let pack = TerrainTexturePack {
            background: t,
            r: t,
            g: t,
            b: t,
        };
        Terrain::new(grid_x, grid_z, heights, &mut registry, &mut device, pack, t)
    }

    #[test]
    fn mesh_has_expected_sizes_and_winding() {
        let mesh = generate_mesh(&ramp(4));
        assert_eq!(mesh.positions.len(), 16 * 3);
        assert_eq!(mesh.uvs.len(), 16 * 2);
        assert_eq!(mesh.indices.len(), 6 * 9);
        assert_eq!(&mesh.indices[..6], &[0, 4, 1, 1, 4, 5]);
        // vertex (j=1, i=0): x along j, height from heights[1][0]
        assert!((mesh.positions[3] - SIZE / 3.0).abs() < 1e-3);
        assert_eq!(&mesh.positions[4..6], &[3.0, 0.0]);
    }

    #[test]
    fn flat_grid_normals_point_up() {
        let mesh = generate_mesh(&HeightGrid::flat(3, 7.0));
        for n in mesh.normals.chunks_exact(3) {
            assert_eq!(n, &[0.0, 1.0, 0.0]);
        }
    }

    #[test]
    fn height_at_grid_vertex_matches_stored_height() {
        let t = terrain(ramp(16), 0, 0);
        let square = SIZE / 15.0;
        for (x, z) in [(0usize, 0usize), (3, 7), (10, 2), (14, 14)] {
            let h = t.height_at(x as f32 * square, z as f32 * square);
            assert_eq!(h, t.heights().get(x, z), "({x},{z})");
        }
    }

    #[test]
    fn every_vertex_of_the_default_grid_is_exact() {
        // Non-linear heights so a neighbouring vertex can never match by accident.
        let heights = HeightGrid::from_fn(VERTEX_COUNT, |x, z| {
            let (x, z) = (x as f32, z as f32);
            (x * 0.37).sin() * 40.0 + (z * 0.11).cos() * 25.0 + x * z * 0.01
        });
        let t = terrain(heights, 1, 2);
        let square = SIZE / (VERTEX_COUNT - 1) as f32;
        // The far row and column lie on the tile's closing edge, which reads as off-tile.
        for x in 0..VERTEX_COUNT - 1 {
            for z in 0..VERTEX_COUNT - 1 {
                let world_x = t.x + x as f32 * square;
                let world_z = t.z + z as f32 * square;
                assert_eq!(t.height_at(world_x, world_z), t.heights().get(x, z), "({x},{z})");
            }
        }
    }

    #[test]
    fn vertex_query_at_a_mesh_position_is_exact() {
        let t = terrain(HeightGrid::from_fn(VERTEX_COUNT, |x, _| x as f32 * 10.0), 0, 0);
        let last = (VERTEX_COUNT - 1) as f32;
        for x in [9usize, 13, 64, 126] {
            // The mesh places vertex x at x / last * SIZE.
            assert_eq!(t.height_at(x as f32 / last * SIZE, 0.0), x as f32 * 10.0);
        }
    }

    #[test]
    fn height_interpolates_inside_a_cell() {
        let t = terrain(HeightGrid::from_fn(8, |x, _| x as f32 * 2.0), 0, 0);
        let square = SIZE / 7.0;
        let h = t.height_at(2.5 * square, 1.25 * square);
        assert!((h - 5.0).abs() < 1e-3);
    }

    #[test]
    fn height_outside_the_tile_is_zero() {
        let t = terrain(HeightGrid::flat(8, 9.0), 1, 0);
        assert_eq!(t.height_at(10.0, 10.0), 0.0);
        assert_eq!(t.height_at(SIZE + 10.0, -1.0), 0.0);
        assert_eq!(t.height_at(2.0 * SIZE + 1.0, 10.0), 0.0);
        assert_eq!(t.height_at(SIZE + 10.0, 10.0), 9.0);
    }
}
