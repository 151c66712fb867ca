//! Voxtree - A sparse, out-of-core voxel volume engine with LOD meshing

pub mod core;
pub mod math;
pub mod voxel;
pub mod mesh;
pub mod streaming;
pub mod task;
pub mod octree;
pub mod volume;

pub use volume::Volume;
