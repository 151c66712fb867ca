//! Mesh buffers handed back to the host renderer
//!
//! Both extractors emit indexed triangle lists with counter-clockwise front
//! faces. Vertex positions are relative to the lower corner of the octree
//! node the mesh belongs to.

pub mod cubic;
pub mod surface_nets;

use bytemuck::{Pod, Zeroable};

use crate::voxel::MATERIAL_COUNT;

/// Vertex for colour volumes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredCubesVertex {
    pub position: [f32; 3],
    /// Packed [`crate::voxel::Color`] bits
    pub color: u32,
}

/// Vertex for material-blend volumes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub materials: [u8; MATERIAL_COUNT],
}

/// Owned vertex and index buffers for one octree node
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh<T> {
    pub vertices: Vec<T>,
    pub indices: Vec<u32>,
}

impl<T> Default for Mesh<T> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }
}

impl<T: Pod> Mesh<T> {
    /// Create with pre-allocated capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            indices: Vec::with_capacity(index_count),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True if there is at least one triangle to draw
    pub fn has_geometry(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    /// Raw vertex bytes, ready for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}
