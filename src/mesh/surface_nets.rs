//! Naive surface nets mesher for material-blend volumes
//!
//! One vertex per cell whose corners straddle the surface, placed at the
//! centroid of the edge crossings. One quad per sample edge that crosses the
//! surface, joining the four cells around that edge. A node owns the edges
//! that start inside it, which keeps neighbouring nodes from emitting the
//! same quad twice.

use crate::core::types::{IVec3, Vec3};
use crate::math::Region;
use crate::mesh::{Mesh, TerrainVertex};
use crate::voxel::{MaterialSet, VoxelBlock, MATERIAL_COUNT};

const NO_VERTEX: u32 = u32::MAX;

/// Cell corner offsets, bit 0 = x, bit 1 = y, bit 2 = z
const CORNERS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

/// The twelve cell edges as corner index pairs
const EDGES: [(usize, usize); 12] = [
    (0, 1), (2, 3), (4, 5), (6, 7),
    (0, 2), (1, 3), (4, 6), (5, 7),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

const AXES: [IVec3; 3] = [IVec3::X, IVec3::Y, IVec3::Z];

/// Extract a smooth surface where summed material weight crosses
/// [`MaterialSet::SURFACE_THRESHOLD`].
pub fn extract_surface_nets_mesh(
    block: &VoxelBlock<MaterialSet>,
    region: &Region,
    _height: u8,
) -> Mesh<TerrainVertex> {
    debug_assert_eq!(block.origin() + IVec3::splat(block.step()), region.lower());

    let mut mesh = Mesh::default();
    // Cells are indexed by their lower sample; sample 1 is the node's lower corner
    let cells = block.dims() - IVec3::ONE;
    let mut cell_vertices = vec![NO_VERTEX; (cells.x * cells.y * cells.z) as usize];
    let cell_index = |c: IVec3| (c.x + cells.x * (c.y + cells.y * c.z)) as usize;

    for z in 0..cells.z {
        for y in 0..cells.y {
            for x in 0..cells.x {
                let cell = IVec3::new(x, y, z);
                if let Some(vertex) = cell_vertex(block, cell) {
                    cell_vertices[cell_index(cell)] = mesh.vertices.len() as u32;
                    mesh.vertices.push(vertex);
                }
            }
        }
    }

    let owned = cells - IVec3::ONE;
    for (axis, &dir) in AXES.iter().enumerate() {
        let b = AXES[(axis + 1) % 3];
        let c = AXES[(axis + 2) % 3];

        for z in 1..=owned.z {
            for y in 1..=owned.y {
                for x in 1..=owned.x {
                    let p = IVec3::new(x, y, z);
                    let lower_solid = sample(block, p).is_solid();
                    if lower_solid == sample(block, p + dir).is_solid() {
                        continue;
                    }

                    let quad = [p - b - c, p - c, p, p - b].map(|q| cell_vertices[cell_index(q)]);
                    if quad.contains(&NO_VERTEX) {
                        continue;
                    }

                    // Counter-clockwise around +axis when the solid side is below
                    let [v0, v1, v2, v3] = if lower_solid {
                        quad
                    } else {
                        [quad[3], quad[2], quad[1], quad[0]]
                    };
                    mesh.indices.extend_from_slice(&[v0, v1, v2, v0, v2, v3]);
                }
            }
        }
    }

    mesh
}

fn sample(block: &VoxelBlock<MaterialSet>, p: IVec3) -> MaterialSet {
    block.get(p.x, p.y, p.z)
}

/// Vertex for the cell with lower sample `cell`, if the surface passes through it
fn cell_vertex(block: &VoxelBlock<MaterialSet>, cell: IVec3) -> Option<TerrainVertex> {
    let corners = CORNERS.map(|offset| sample(block, cell + offset));
    let density = corners.map(|c| c.density() as f32);
    let threshold = MaterialSet::SURFACE_THRESHOLD as f32;

    let solid_count = corners.iter().filter(|c| c.is_solid()).count();
    if solid_count == 0 || solid_count == 8 {
        return None;
    }

    let mut sum = Vec3::ZERO;
    let mut crossings = 0;
    for &(a, b) in EDGES.iter() {
        if corners[a].is_solid() == corners[b].is_solid() {
            continue;
        }
        let t = (threshold - density[a]) / (density[b] - density[a]);
        sum += CORNERS[a].as_vec3().lerp(CORNERS[b].as_vec3(), t);
        crossings += 1;
    }
    let local = sum / crossings as f32;

    let mut gradient = Vec3::ZERO;
    for (i, offset) in CORNERS.iter().enumerate() {
        let sign = offset.as_vec3() * 2.0 - Vec3::ONE;
        gradient += sign * density[i];
    }
    // Density grows towards the inside, so the outward normal points down the gradient
    let normal = (-gradient).try_normalize().unwrap_or(Vec3::Y);

    let mut materials = [0u8; MATERIAL_COUNT];
    for (channel, out) in materials.iter_mut().enumerate() {
        let total: u32 = corners.iter().map(|c| c.material(channel) as u32).sum();
        *out = (total / 8) as u8;
    }

    let step = block.step() as f32;
    let position = ((cell - IVec3::ONE).as_vec3() + local) * step;

    Some(TerrainVertex {
        position: position.to_array(),
        normal: normal.to_array(),
        materials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(region: &Region, height: u8, f: impl Fn(IVec3) -> MaterialSet) -> VoxelBlock<MaterialSet> {
        let fp = VoxelBlock::<MaterialSet>::footprint(region, height);
        VoxelBlock::from_fn(fp, |p| Ok::<_, ()>(f(p))).unwrap()
    }

    fn ground(p: IVec3) -> MaterialSet {
        if p.y <= 3 {
            MaterialSet::from_weights([255, 0, 0, 0, 0, 0, 0, 0])
        } else {
            MaterialSet::EMPTY
        }
    }

    #[test]
    fn test_empty_and_full_have_no_geometry() {
        let region = Region::from_coords(0, 0, 0, 8, 8, 8);
        let empty = extract_surface_nets_mesh(&block_with(&region, 0, |_| MaterialSet::EMPTY), &region, 0);
        assert!(!empty.has_geometry());

        let full = MaterialSet::from_weights([255; MATERIAL_COUNT]);
        let full = extract_surface_nets_mesh(&block_with(&region, 0, |_| full), &region, 0);
        assert!(!full.has_geometry());
    }

    #[test]
    fn test_flat_ground() {
        let region = Region::from_coords(0, 0, 0, 8, 8, 8);
        let mesh = extract_surface_nets_mesh(&block_with(&region, 0, ground), &region, 0);

        // One quad per owned y edge crossing the surface
        assert_eq!(mesh.triangle_count(), 8 * 8 * 2);

        for v in &mesh.vertices {
            assert!((v.position[1] - 3.5).abs() < 0.01, "vertex at {:?}", v.position);
            assert!(Vec3::from(v.normal).dot(Vec3::Y) > 0.99);
            assert_eq!(v.materials[0], 127);
        }

        for tri in mesh.indices.chunks(3) {
            let p = |n: u32| Vec3::from(mesh.vertices[n as usize].position);
            let n = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(n.y > 0.0, "triangle faces down");
        }
    }

    #[test]
    fn test_flat_ground_downsampled() {
        let region = Region::from_coords(0, 0, 0, 16, 16, 16);
        let mesh = extract_surface_nets_mesh(&block_with(&region, 1, ground), &region, 1);
        assert_eq!(mesh.triangle_count(), 8 * 8 * 2);
        for v in &mesh.vertices {
            assert!(v.position[1] > 2.0 && v.position[1] < 4.0);
        }
    }

    #[test]
    fn test_neighbouring_nodes_do_not_overlap() {
        let left = Region::from_coords(0, 0, 0, 8, 8, 8);
        let right = Region::from_coords(8, 0, 0, 16, 8, 8);
        let a = extract_surface_nets_mesh(&block_with(&left, 0, ground), &left, 0);
        let b = extract_surface_nets_mesh(&block_with(&right, 0, ground), &right, 0);
        let whole = Region::from_coords(0, 0, 0, 16, 8, 8);
        let c = extract_surface_nets_mesh(&block_with(&whole, 0, ground), &whole, 0);
        assert_eq!(a.triangle_count() + b.triangle_count(), c.triangle_count());
    }
}
