//! Voxel payload types

pub mod color;
pub mod material_set;
pub mod kind;
pub mod block;

pub use color::Color;
pub use material_set::{MaterialSet, MATERIAL_COUNT};
pub use kind::{OctreeBounds, Voxel, VoxelKind};
pub use block::{Footprint, VoxelBlock};
