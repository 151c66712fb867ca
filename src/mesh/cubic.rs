//! Face-culling cube mesher for colour volumes

use crate::core::types::IVec3;
use crate::math::Region;
use crate::mesh::{ColoredCubesVertex, Mesh};
use crate::voxel::{Color, VoxelBlock};

const INITIAL_VERTEX_CAPACITY: usize = 4096;
const INITIAL_INDEX_CAPACITY: usize = 6144;

// Neighbour offset and the face emitted towards it
const FACES: [([i32; 3], [[f32; 3]; 4]); 6] = [
    ([1, 0, 0], [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]]),
    ([-1, 0, 0], [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]),
    ([0, 1, 0], [[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]]),
    ([0, -1, 0], [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]]),
    ([0, 0, 1], [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
    ([0, 0, -1], [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
];

/// Emit one quad per solid voxel face that borders empty space.
///
/// Voxels are unit cubes centred on integer coordinates. At `height > 0`
/// every sample stands for a cube of side `2^height`. Faces towards
/// neighbouring nodes are emitted by the node owning the solid voxel.
pub fn extract_cubic_mesh(
    block: &VoxelBlock<Color>,
    region: &Region,
    _height: u8,
) -> Mesh<ColoredCubesVertex> {
    let mut mesh = Mesh::with_capacity(INITIAL_VERTEX_CAPACITY, INITIAL_INDEX_CAPACITY);
    let step = block.step() as f32;
    let dims = block.dims();
    debug_assert_eq!(block.origin() + IVec3::splat(block.step()), region.lower());

    for k in 1..dims.z - 1 {
        for j in 1..dims.y - 1 {
            for i in 1..dims.x - 1 {
                let voxel = block.get(i, j, k);
                if !voxel.is_solid() {
                    continue;
                }

                // Block sample 1 sits on the node's lower corner
                let base = [
                    (i - 1) as f32 * step - 0.5,
                    (j - 1) as f32 * step - 0.5,
                    (k - 1) as f32 * step - 0.5,
                ];

                for (dir, corners) in FACES.iter() {
                    if block.get(i + dir[0], j + dir[1], k + dir[2]).is_solid() {
                        continue;
                    }
                    emit_face(&mut mesh, base, step, corners, voxel);
                }
            }
        }
    }

    mesh
}

#[inline]
fn emit_face(
    mesh: &mut Mesh<ColoredCubesVertex>,
    base: [f32; 3],
    step: f32,
    corners: &[[f32; 3]; 4],
    voxel: Color,
) {
    let first = mesh.vertices.len() as u32;
    for corner in corners {
        mesh.vertices.push(ColoredCubesVertex {
            position: [
                base[0] + corner[0] * step,
                base[1] + corner[1] * step,
                base[2] + corner[2] * step,
            ],
            color: voxel.to_bits(),
        });
    }
    mesh.indices
        .extend_from_slice(&[first, first + 1, first + 2, first, first + 2, first + 3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec3;

    fn block_with(region: &Region, height: u8, solid: impl Fn(IVec3) -> bool) -> VoxelBlock<Color> {
        let fp = VoxelBlock::<Color>::footprint(region, height);
        VoxelBlock::from_fn(fp, |p| {
            Ok::<_, ()>(if solid(p) { Color::rgb(255, 0, 0) } else { Color::EMPTY })
        })
        .unwrap()
    }

    fn face_normal(mesh: &Mesh<ColoredCubesVertex>, tri: usize) -> Vec3 {
        let idx = &mesh.indices[tri * 3..tri * 3 + 3];
        let p = |n: u32| Vec3::from(mesh.vertices[n as usize].position);
        (p(idx[1]) - p(idx[0])).cross(p(idx[2]) - p(idx[0])).normalize()
    }

    #[test]
    fn test_empty_region_has_no_geometry() {
        let region = Region::from_coords(0, 0, 0, 7, 7, 7);
        let mesh = extract_cubic_mesh(&block_with(&region, 0, |_| false), &region, 0);
        assert!(!mesh.has_geometry());
    }

    #[test]
    fn test_single_voxel_has_six_outward_faces() {
        let region = Region::from_coords(0, 0, 0, 7, 7, 7);
        let block = block_with(&region, 0, |p| p == IVec3::new(3, 3, 3));
        let mesh = extract_cubic_mesh(&block, &region, 0);

        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);

        let centre = Vec3::splat(3.0);
        for tri in 0..mesh.triangle_count() {
            let n = face_normal(&mesh, tri);
            let p = Vec3::from(mesh.vertices[mesh.indices[tri * 3] as usize].position);
            assert!(n.dot(p - centre) > 0.0, "triangle {} faces inward", tri);
        }
    }

    #[test]
    fn test_adjacent_voxels_share_no_inner_face() {
        let region = Region::from_coords(0, 0, 0, 7, 7, 7);
        let block = block_with(&region, 0, |p| p == IVec3::new(1, 1, 1) || p == IVec3::new(2, 1, 1));
        let mesh = extract_cubic_mesh(&block, &region, 0);
        assert_eq!(mesh.triangle_count(), 20);
    }

    #[test]
    fn test_positions_relative_to_node() {
        let region = Region::from_coords(32, 0, 0, 63, 31, 31);
        let block = block_with(&region, 0, |p| p == IVec3::new(32, 0, 0));
        let mesh = extract_cubic_mesh(&block, &region, 0);
        let min = mesh
            .vertices
            .iter()
            .fold(Vec3::splat(f32::MAX), |m, v| m.min(Vec3::from(v.position)));
        assert_eq!(min, Vec3::splat(-0.5));
    }

    #[test]
    fn test_neighbour_outside_node_hides_face() {
        let region = Region::from_coords(0, 0, 0, 7, 7, 7);
        let block = block_with(&region, 0, |p| p == IVec3::new(7, 0, 0) || p == IVec3::new(8, 0, 0));
        let mesh = extract_cubic_mesh(&block, &region, 0);
        // Only the voxel inside the node is meshed and its +X face is hidden
        assert_eq!(mesh.triangle_count(), 10);
    }

    #[test]
    fn test_downsampled_cube_scales() {
        let region = Region::from_coords(0, 0, 0, 15, 15, 15);
        let block = block_with(&region, 1, |p| p == IVec3::ZERO);
        let mesh = extract_cubic_mesh(&block, &region, 1);
        assert_eq!(mesh.triangle_count(), 12);
        let max = mesh
            .vertices
            .iter()
            .fold(Vec3::splat(f32::MIN), |m, v| m.max(Vec3::from(v.position)));
        assert_eq!(max, Vec3::splat(1.5));
    }
}
