//! Integer axis-aligned voxel region

use crate::core::types::{IVec3, Vec3};

/// Axis-aligned box of voxel coordinates. Both corners are inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    lower: IVec3,
    upper: IVec3,
}

impl Region {
    /// Create region from lower and upper corners (inclusive)
    pub const fn new(lower: IVec3, upper: IVec3) -> Self {
        Self { lower, upper }
    }

    /// Create region from individual corner coordinates
    pub const fn from_coords(
        lower_x: i32, lower_y: i32, lower_z: i32,
        upper_x: i32, upper_y: i32, upper_z: i32,
    ) -> Self {
        Self::new(
            IVec3::new(lower_x, lower_y, lower_z),
            IVec3::new(upper_x, upper_y, upper_z),
        )
    }

    pub fn lower(&self) -> IVec3 {
        self.lower
    }

    pub fn upper(&self) -> IVec3 {
        self.upper
    }

    /// True if lower <= upper on every axis
    pub fn is_valid(&self) -> bool {
        self.lower.cmple(self.upper).all()
    }

    /// Size in voxels along each axis (`upper - lower + 1`)
    pub fn dimensions_in_voxels(&self) -> IVec3 {
        self.upper - self.lower + IVec3::ONE
    }

    /// Size in cells along each axis (`upper - lower`).
    /// A cell is the space between eight neighbouring voxel samples.
    pub fn dimensions_in_cells(&self) -> IVec3 {
        self.upper - self.lower
    }

    pub fn width_in_voxels(&self) -> i32 {
        self.dimensions_in_voxels().x
    }

    pub fn height_in_voxels(&self) -> i32 {
        self.dimensions_in_voxels().y
    }

    pub fn depth_in_voxels(&self) -> i32 {
        self.dimensions_in_voxels().z
    }

    /// Number of voxels covered by the region
    pub fn voxel_count(&self) -> usize {
        let d = self.dimensions_in_voxels();
        d.x as usize * d.y as usize * d.z as usize
    }

    /// Integer centre (rounds toward zero)
    pub fn centre(&self) -> IVec3 {
        (self.lower + self.upper) / 2
    }

    /// Length of the lower-to-upper diagonal
    pub fn diagonal_length(&self) -> f32 {
        (self.upper - self.lower).as_vec3().length()
    }

    /// Check if point is inside the region
    pub fn contains_point(&self, p: IVec3) -> bool {
        p.cmpge(self.lower).all() && p.cmple(self.upper).all()
    }

    /// Check if point is inside the region, in continuous space
    pub fn contains_point_f(&self, p: Vec3) -> bool {
        p.cmpge(self.lower.as_vec3()).all() && p.cmple(self.upper.as_vec3()).all()
    }

    /// Check if `other` lies entirely inside this region
    pub fn contains_region(&self, other: &Region) -> bool {
        self.contains_point(other.lower) && self.contains_point(other.upper)
    }

    /// Check if two regions share at least one voxel
    pub fn intersects(&self, other: &Region) -> bool {
        self.lower.cmple(other.upper).all() && self.upper.cmpge(other.lower).all()
    }

    /// Region grown by `amount` on every side
    pub fn grown(&self, amount: i32) -> Region {
        self.grown_by(IVec3::splat(amount), IVec3::splat(amount))
    }

    /// Region with `lower` moved down by `lower_amount` and `upper` moved up by `upper_amount`
    pub fn grown_by(&self, lower_amount: IVec3, upper_amount: IVec3) -> Region {
        Region::new(self.lower - lower_amount, self.upper + upper_amount)
    }

    /// Region shrunk by `amount` on every side. May become invalid.
    pub fn shrunk(&self, amount: i32) -> Region {
        self.grown(-amount)
    }

    /// Region translated by `offset`
    pub fn translated(&self, offset: IVec3) -> Region {
        Region::new(self.lower + offset, self.upper + offset)
    }

    /// Overlap of two regions, if any
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let r = Region::new(self.lower.max(other.lower), self.upper.min(other.upper));
        r.is_valid().then_some(r)
    }

    /// Iterate every voxel coordinate in x-fastest order
    pub fn iter(&self) -> impl Iterator<Item = IVec3> + use<> {
        let (lower, upper) = (self.lower, self.upper);
        (lower.z..=upper.z).flat_map(move |z| {
            (lower.y..=upper.y).flat_map(move |y| (lower.x..=upper.x).map(move |x| IVec3::new(x, y, z)))
        })
    }
}
