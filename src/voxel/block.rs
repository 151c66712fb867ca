//! Dense, optionally downsampled copy of a box of voxels

use crate::core::types::IVec3;
use crate::math::Region;
use crate::voxel::kind::{OctreeBounds, Voxel};

/// Dense block of voxels read from the paged grid for one extraction.
///
/// Sample `(i, j, k)` holds the voxel at `origin + (i, j, k) * step`.
#[derive(Clone, Debug)]
pub struct VoxelBlock<V> {
    origin: IVec3,
    dims: IVec3,
    step: i32,
    data: Vec<V>,
}

/// Which samples an extractor needs for one node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footprint {
    pub origin: IVec3,
    pub dims: IVec3,
    pub step: i32,
}

impl<V: Voxel> VoxelBlock<V> {
    /// Samples needed to mesh `region` at LOD `height`: every `2^height`-th
    /// voxel, plus one sample of margin on each side.
    pub fn footprint(region: &Region, height: u8) -> Footprint {
        let step = 1i32 << height;
        let side = match V::KIND.octree_bounds() {
            OctreeBounds::BoundVoxels => region.dimensions_in_voxels(),
            OctreeBounds::BoundCells => region.dimensions_in_cells(),
        };
        let samples = (side / step).max(IVec3::ONE);
        Footprint {
            origin: region.lower() - IVec3::splat(step),
            dims: samples + IVec3::splat(2),
            step,
        }
    }

    /// Build a block by calling `sample` for every position in `footprint`
    pub fn from_fn<E>(
        footprint: Footprint,
        mut sample: impl FnMut(IVec3) -> Result<V, E>,
    ) -> Result<Self, E> {
        let dims = footprint.dims;
        let mut data = Vec::with_capacity((dims.x * dims.y * dims.z) as usize);
        for k in 0..dims.z {
            for j in 0..dims.y {
                for i in 0..dims.x {
                    data.push(sample(footprint.origin + IVec3::new(i, j, k) * footprint.step)?);
                }
            }
        }
        Ok(Self {
            origin: footprint.origin,
            dims,
            step: footprint.step,
            data,
        })
    }

    pub fn origin(&self) -> IVec3 {
        self.origin
    }

    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Sample at block index `(i, j, k)`; outside the block reads as default
    pub fn get(&self, i: i32, j: i32, k: i32) -> V {
        if i < 0 || j < 0 || k < 0 || i >= self.dims.x || j >= self.dims.y || k >= self.dims.z {
            return V::default();
        }
        self.data[(i + self.dims.x * (j + self.dims.y * k)) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{Color, MaterialSet};

    #[test]
    fn test_footprint_voxel_bound() {
        let region = Region::from_coords(0, 0, 0, 31, 31, 31);
        let fp = VoxelBlock::<Color>::footprint(&region, 0);
        assert_eq!(fp.origin, IVec3::splat(-1));
        assert_eq!(fp.dims, IVec3::splat(34));
        assert_eq!(fp.step, 1);

        let region = Region::from_coords(0, 0, 0, 63, 63, 63);
        let fp = VoxelBlock::<Color>::footprint(&region, 1);
        assert_eq!(fp.origin, IVec3::splat(-2));
        assert_eq!(fp.dims, IVec3::splat(34));
    }

    #[test]
    fn test_footprint_cell_bound() {
        let region = Region::from_coords(-1, -1, -1, 31, 31, 31);
        let fp = VoxelBlock::<MaterialSet>::footprint(&region, 0);
        assert_eq!(fp.origin, IVec3::splat(-2));
        assert_eq!(fp.dims, IVec3::splat(34));
    }

    #[test]
    fn test_from_fn_and_get() {
        let fp = Footprint { origin: IVec3::new(10, 0, 0), dims: IVec3::new(3, 2, 2), step: 2 };
        let block = VoxelBlock::<Color>::from_fn(fp, |p| {
            Ok::<_, ()>(Color::from_bits(p.x as u32 + 100 * p.y as u32 + 10_000 * p.z as u32))
        })
        .unwrap();

        assert_eq!(block.get(0, 0, 0).to_bits(), 10);
        assert_eq!(block.get(2, 1, 1).to_bits(), 14 + 200 + 20_000);
        assert_eq!(block.get(3, 0, 0), Color::EMPTY);
        assert_eq!(block.get(-1, 0, 0), Color::EMPTY);
    }
}
