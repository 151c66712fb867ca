//! Voxel payload types and the trait tying them to storage and meshing

use std::fmt::Debug;

use bytemuck::Pod;

use crate::math::Region;
use crate::mesh::{self, ColoredCubesVertex, Mesh, TerrainVertex};
use crate::streaming::paged_grid::VOXELS_PER_CHUNK;
use crate::voxel::block::VoxelBlock;
use crate::voxel::color::Color;
use crate::voxel::material_set::MaterialSet;

/// Tag identifying which payload a volume stores
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoxelKind {
    /// [`Color`] voxels meshed as cubes
    Color,
    /// [`MaterialSet`] voxels meshed as a smooth surface
    MaterialBlend,
}

/// How octree node regions relate to voxel samples
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OctreeBounds {
    /// Node regions cover whole voxels
    BoundVoxels,
    /// Node regions cover the cells between voxel samples
    BoundCells,
}

impl VoxelKind {
    /// Tag persisted in the chunk store's `VoxelType` property
    pub fn type_tag(self) -> &'static str {
        match self {
            VoxelKind::Color => "Color",
            VoxelKind::MaterialBlend => "MaterialSet",
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "Color" => Some(VoxelKind::Color),
            "MaterialSet" => Some(VoxelKind::MaterialBlend),
            _ => None,
        }
    }

    /// Size of one voxel in bytes
    pub fn voxel_size(self) -> usize {
        match self {
            VoxelKind::Color => size_of::<Color>(),
            VoxelKind::MaterialBlend => size_of::<MaterialSet>(),
        }
    }

    /// Size of one decompressed chunk blob in bytes
    pub fn chunk_byte_size(self) -> usize {
        VOXELS_PER_CHUNK * self.voxel_size()
    }

    pub fn octree_bounds(self) -> OctreeBounds {
        match self {
            VoxelKind::Color => OctreeBounds::BoundVoxels,
            VoxelKind::MaterialBlend => OctreeBounds::BoundCells,
        }
    }
}

/// A voxel payload that can be paged to disk and turned into a mesh.
///
/// The zeroed value (from [`bytemuck::Zeroable`]) is the default for voxels
/// that were never written.
pub trait Voxel: Pod + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Vertex produced by this payload's mesh extractor
    type Vertex: Pod + Debug + Send + Sync;

    const KIND: VoxelKind;

    /// Size of one decompressed chunk blob in bytes
    fn chunk_byte_size() -> usize {
        Self::KIND.chunk_byte_size()
    }

    /// Build the mesh for `region` at LOD `height` from a block sampled with
    /// [`VoxelBlock::footprint`]. Vertex positions are relative to
    /// `region.lower()`.
    fn extract_mesh(block: &VoxelBlock<Self>, region: &Region, height: u8) -> Mesh<Self::Vertex>;
}

impl Voxel for Color {
    type Vertex = ColoredCubesVertex;

    const KIND: VoxelKind = VoxelKind::Color;

    fn extract_mesh(block: &VoxelBlock<Self>, region: &Region, height: u8) -> Mesh<Self::Vertex> {
        mesh::cubic::extract_cubic_mesh(block, region, height)
    }
}

impl Voxel for MaterialSet {
    type Vertex = TerrainVertex;

    const KIND: VoxelKind = VoxelKind::MaterialBlend;

    fn extract_mesh(block: &VoxelBlock<Self>, region: &Region, height: u8) -> Mesh<Self::Vertex> {
        mesh::surface_nets::extract_surface_nets_mesh(block, region, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_byte_sizes() {
        assert_eq!(VoxelKind::Color.chunk_byte_size(), 131_072);
        assert_eq!(VoxelKind::MaterialBlend.chunk_byte_size(), 262_144);
        assert_eq!(Color::chunk_byte_size(), 131_072);
        assert_eq!(MaterialSet::chunk_byte_size(), 262_144);
    }

    #[test]
    fn test_type_tags() {
        for kind in [VoxelKind::Color, VoxelKind::MaterialBlend] {
            assert_eq!(VoxelKind::from_type_tag(kind.type_tag()), Some(kind));
        }
        assert_eq!(VoxelKind::from_type_tag("Colour"), None);
    }

    #[test]
    fn test_defaults_are_zero() {
        assert_eq!(Color::default().to_bits(), 0);
        assert_eq!(MaterialSet::default().to_bits(), 0);
    }
}
