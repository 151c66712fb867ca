//! Per-voxel blend of up to eight material weights

use bytemuck::{Pod, Zeroable};

/// Number of material channels per voxel
pub const MATERIAL_COUNT: usize = 8;

/// Largest weight a single channel can hold
pub const MAX_MATERIAL_VALUE: u8 = u8::MAX;

/// Eight 8-bit material weights packed in a `u64`, channel 0 in the low byte.
///
/// The surface lies where the summed weight crosses half of
/// [`MAX_MATERIAL_VALUE`].
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MaterialSet(u64);

impl MaterialSet {
    pub const EMPTY: MaterialSet = MaterialSet(0);

    /// Summed weight above which a sample counts as inside the surface
    pub const SURFACE_THRESHOLD: u32 = MAX_MATERIAL_VALUE as u32 / 2;

    pub fn from_weights(weights: [u8; MATERIAL_COUNT]) -> Self {
        Self(u64::from_le_bytes(weights))
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    pub fn weights(self) -> [u8; MATERIAL_COUNT] {
        self.0.to_le_bytes()
    }

    /// Weight of one material. Out of range indices read as zero.
    pub fn material(self, index: usize) -> u8 {
        if index >= MATERIAL_COUNT {
            return 0;
        }
        (self.0 >> (index * 8)) as u8
    }

    /// Set the weight of one material. Out of range indices are ignored.
    pub fn set_material(&mut self, index: usize, value: u8) {
        if index >= MATERIAL_COUNT {
            log::warn!("material index {} out of range", index);
            return;
        }
        let shift = index * 8;
        self.0 = (self.0 & !(0xFFu64 << shift)) | ((value as u64) << shift);
    }

    /// Sum of all weights
    pub fn density(self) -> u32 {
        self.weights().iter().map(|&w| w as u32).sum()
    }

    pub fn is_solid(self) -> bool {
        self.density() > Self::SURFACE_THRESHOLD
    }
}
