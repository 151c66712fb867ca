//! Unbounded voxel grid backed by fixed-size chunks that are paged in and
//! out of a [`Pager`] on demand.


use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::morton::encode_morton_3d;
use crate::math::Region;
use crate::streaming::cache::ChunkCache;
use crate::voxel::{Footprint, Voxel, VoxelBlock};

/// log2 of the chunk side length
pub const CHUNK_SIDE_POWER: u32 = 5;
/// Chunk side length in voxels
pub const CHUNK_SIDE_LENGTH: u32 = 1 << CHUNK_SIDE_POWER;
/// Voxels in one chunk
pub const VOXELS_PER_CHUNK: usize = 1 << (3 * CHUNK_SIDE_POWER);

const LOCAL_MASK: i32 = CHUNK_SIDE_LENGTH as i32 - 1;

/// Backing storage for a [`PagedGrid`].
///
/// Chunk buffers are in Morton order (see [`crate::math::morton`]) and hold
/// exactly [`VOXELS_PER_CHUNK`] voxels.
pub trait Pager<V: Voxel> {
    /// Fill `chunk` with the stored data for `region`. Leave it untouched
    /// (zeroed) if nothing has been stored for that region.
    fn page_in(&mut self, region: &Region, chunk: &mut [V]) -> Result<()>;

    /// Store a modified chunk.
    fn page_out(&mut self, region: &Region, chunk: &[V]) -> Result<()>;
}

/// Read access to voxel data used by mesh extraction
pub trait VoxelSource<V: Voxel> {
    fn voxel(&mut self, position: IVec3) -> Result<V>;

    /// Copy the samples described by `footprint` into a dense block
    fn sample_block(&mut self, footprint: Footprint) -> Result<VoxelBlock<V>> {
        VoxelBlock::from_fn(footprint, |p| self.voxel(p))
    }
}

struct Chunk<V> {
    /// Morton-ordered voxels
    data: Vec<V>,
    /// Written since it was paged in
    modified: bool,
}

/// Paged voxel grid with an LRU cache of resident chunks
pub struct PagedGrid<V: Voxel, P: Pager<V>> {
    pager: P,
    cache: ChunkCache<Chunk<V>>,
}

impl<V: Voxel, P: Pager<V>> PagedGrid<V, P> {
    /// Create a grid that keeps roughly `budget_bytes` of chunk data resident
    pub fn new(pager: P, budget_bytes: usize) -> Self {
        let max_chunks = (budget_bytes / V::chunk_byte_size()).max(1);
        log::debug!(
            "Paged grid for {:?} voxels: {} resident chunks",
            V::KIND,
            max_chunks
        );
        Self {
            pager,
            cache: ChunkCache::new(max_chunks),
        }
    }

    pub fn pager(&self) -> &P {
        &self.pager
    }

    pub fn pager_mut(&mut self) -> &mut P {
        &mut self.pager
    }

    /// Number of chunks currently in memory
    pub fn resident_chunk_count(&self) -> usize {
        self.cache.len()
    }

    /// Read a voxel, paging its chunk in if needed
    pub fn voxel(&mut self, position: IVec3) -> Result<V> {
        let chunk = self.chunk_mut(chunk_coord(position))?;
        Ok(chunk.data[local_index(position)])
    }

    /// Write a voxel, paging its chunk in if needed
    pub fn set_voxel(&mut self, position: IVec3, value: V) -> Result<()> {
        let chunk = self.chunk_mut(chunk_coord(position))?;
        chunk.data[local_index(position)] = value;
        chunk.modified = true;
        Ok(())
    }

    /// Page out every modified chunk and drop all chunks from memory.
    ///
    /// Every chunk is attempted; the first failure is returned.
    pub fn flush_all(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut written = 0;
        for (coord, chunk) in self.cache.drain() {
            if !chunk.modified {
                continue;
            }
            match self.pager.page_out(&chunk_region(coord), &chunk.data) {
                Ok(()) => written += 1,
                Err(e) => {
                    log::error!("Failed to page out chunk {:?}: {}", coord, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        log::debug!("Flushed paged grid, {} chunks written", written);
        first_error.map_or(Ok(()), Err)
    }

    fn chunk_mut(&mut self, coord: IVec3) -> Result<&mut Chunk<V>> {
        if !self.cache.contains(coord) {
            let region = chunk_region(coord);
            let mut data = vec![V::zeroed(); VOXELS_PER_CHUNK];
            // A chunk that fails to page in is not kept, so the next access retries
            self.pager.page_in(&region, &mut data)?;
            log::trace!("Paged in chunk {:?}", coord);

            if let Some((evicted_coord, evicted)) = self.cache.insert(coord, Chunk { data, modified: false }) {
                if evicted.modified {
                    self.pager.page_out(&chunk_region(evicted_coord), &evicted.data)?;
                    log::trace!("Evicted modified chunk {:?}", evicted_coord);
                }
            }
        }

        self.cache
            .get_mut(coord)
            .ok_or_else(|| Error::runtime(format!("chunk {:?} missing after page-in", coord)))
    }
}

impl<V: Voxel, P: Pager<V>> VoxelSource<V> for PagedGrid<V, P> {
    fn voxel(&mut self, position: IVec3) -> Result<V> {
        PagedGrid::voxel(self, position)
    }
}

/// Coordinate of the chunk containing `position`
pub fn chunk_coord(position: IVec3) -> IVec3 {
    position >> CHUNK_SIDE_POWER as i32
}

/// Voxel region covered by the chunk at `coord`
pub fn chunk_region(coord: IVec3) -> Region {
    let lower = coord * CHUNK_SIDE_LENGTH as i32;
    Region::new(lower, lower + IVec3::splat(LOCAL_MASK))
}

fn local_index(position: IVec3) -> usize {
    let local = position & IVec3::splat(LOCAL_MASK);
    encode_morton_3d(local.x as u32, local.y as u32, local.z as u32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::Color;
    use std::collections::HashMap;

    /// Pager keeping chunks in a map, counting calls
    #[derive(Default)]
    struct MemoryPager {
        stored: HashMap<IVec3, Vec<Color>>,
        page_ins: usize,
        page_outs: usize,
        fail_at: Option<IVec3>,
    }

    impl Pager<Color> for MemoryPager {
        fn page_in(&mut self, region: &Region, chunk: &mut [Color]) -> Result<()> {
            self.page_ins += 1;
            if self.fail_at == Some(region.lower()) {
                return Err(Error::Compression("corrupt".into()));
            }
            if let Some(data) = self.stored.get(&region.lower()) {
                chunk.copy_from_slice(data);
            }
            Ok(())
        }

        fn page_out(&mut self, region: &Region, chunk: &[Color]) -> Result<()> {
            self.page_outs += 1;
            self.stored.insert(region.lower(), chunk.to_vec());
            Ok(())
        }
    }

    const CHUNK_BYTES: usize = VOXELS_PER_CHUNK * 4;

    #[test]
    fn test_chunk_coord_negative() {
        assert_eq!(chunk_coord(IVec3::new(0, 31, 32)), IVec3::new(0, 0, 1));
        assert_eq!(chunk_coord(IVec3::new(-1, -32, -33)), IVec3::new(-1, -1, -2));
        assert_eq!(chunk_region(IVec3::new(-1, 0, 0)), Region::from_coords(-32, 0, 0, -1, 31, 31));
    }

    #[test]
    fn test_unwritten_reads_default() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 4);
        assert_eq!(grid.voxel(IVec3::new(-100, 5, 1000)).unwrap(), Color::EMPTY);
    }

    #[test]
    fn test_set_get() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 4);
        let c = Color::rgb(10, 20, 30);
        grid.set_voxel(IVec3::new(-3, 40, 7), c).unwrap();
        assert_eq!(grid.voxel(IVec3::new(-3, 40, 7)).unwrap(), c);
        assert_eq!(grid.voxel(IVec3::new(-4, 40, 7)).unwrap(), Color::EMPTY);
    }

    #[test]
    fn test_eviction_pages_out_modified() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 2);
        let c = Color::rgb(255, 0, 0);
        grid.set_voxel(IVec3::new(1, 1, 1), c).unwrap();
        grid.voxel(IVec3::new(100, 0, 0)).unwrap();
        grid.voxel(IVec3::new(200, 0, 0)).unwrap();

        assert_eq!(grid.resident_chunk_count(), 2);
        assert_eq!(grid.pager().page_outs, 1);

        // Paged back in from the pager
        assert_eq!(grid.voxel(IVec3::new(1, 1, 1)).unwrap(), c);
    }

    #[test]
    fn test_unmodified_chunks_not_paged_out() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 8);
        grid.voxel(IVec3::ZERO).unwrap();
        grid.voxel(IVec3::splat(40)).unwrap();
        grid.flush_all().unwrap();
        assert_eq!(grid.pager().page_outs, 0);
        assert_eq!(grid.resident_chunk_count(), 0);
    }

    #[test]
    fn test_flush_writes_and_drops() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 8);
        grid.set_voxel(IVec3::new(5, 5, 5), Color::rgb(1, 2, 3)).unwrap();
        grid.flush_all().unwrap();
        assert_eq!(grid.pager().page_outs, 1);

        let ins = grid.pager().page_ins;
        grid.voxel(IVec3::new(5, 5, 5)).unwrap();
        assert_eq!(grid.pager().page_ins, ins + 1);
    }

    #[test]
    fn test_failed_page_in_is_not_cached() {
        let pager = MemoryPager { fail_at: Some(IVec3::ZERO), ..Default::default() };
        let mut grid = PagedGrid::new(pager, CHUNK_BYTES * 8);

        assert!(matches!(grid.voxel(IVec3::new(1, 1, 1)), Err(Error::Compression(_))));
        assert_eq!(grid.resident_chunk_count(), 0);

        // Sibling chunks are unaffected
        grid.set_voxel(IVec3::new(32, 0, 0), Color::rgb(9, 9, 9)).unwrap();
        assert_eq!(grid.voxel(IVec3::new(32, 0, 0)).unwrap(), Color::rgb(9, 9, 9));
    }

    #[test]
    fn test_sample_block() {
        let mut grid = PagedGrid::new(MemoryPager::default(), CHUNK_BYTES * 8);
        grid.set_voxel(IVec3::new(2, 0, 0), Color::rgb(50, 50, 50)).unwrap();
        let block = grid
            .sample_block(Footprint { origin: IVec3::ZERO, dims: IVec3::new(4, 1, 1), step: 1 })
            .unwrap();
        assert_eq!(block.get(2, 0, 0), Color::rgb(50, 50, 50));
        assert_eq!(block.get(1, 0, 0), Color::EMPTY);
    }
}
