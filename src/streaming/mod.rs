//! Chunk paging and persistent storage

pub mod cache;
pub mod disk_io;
pub mod region_key;
pub mod paged_grid;
pub mod chunk_store;

pub use cache::ChunkCache;
pub use chunk_store::{ChunkStore, WritePermission};
pub use disk_io::{compress_chunk, decompress_chunk};
pub use paged_grid::{
    PagedGrid, Pager, VoxelSource,
    CHUNK_SIDE_LENGTH, VOXELS_PER_CHUNK,
};
pub use region_key::region_to_key;
