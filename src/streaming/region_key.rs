//! 64-bit keys for chunk regions in the chunk store
//!
//! Each lower-corner coordinate is folded so its sign bit ends up in bit 0
//! (small negative and small positive values both stay small), then the three
//! 21-bit results are packed as `x << 42 | y << 21 | z`. The packing is part
//! of the persisted file format.

use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::Region;

const BITS_PER_AXIS: u32 = 21;
const AXIS_MASK: u64 = (1 << BITS_PER_AXIS) - 1;

/// Smallest coordinate a chunk's lower corner may have
pub const MIN_KEY_COORD: i32 = -(1 << (BITS_PER_AXIS - 1));
/// Largest coordinate a chunk's lower corner may have
pub const MAX_KEY_COORD: i32 = (1 << (BITS_PER_AXIS - 1)) - 1;

/// Move the sign bit into bit 0
fn fold(v: i32) -> u64 {
    ((v << 1) ^ (v >> 31)) as u32 as u64
}

fn unfold(bits: u64) -> i32 {
    let bits = bits as u32;
    ((bits >> 1) as i32) ^ -((bits & 1) as i32)
}

/// Key for the chunk whose lower corner is `region.lower()`
pub fn region_to_key(region: &Region) -> Result<u64> {
    let lower = region.lower();
    if lower.cmplt(IVec3::splat(MIN_KEY_COORD)).any() || lower.cmpgt(IVec3::splat(MAX_KEY_COORD)).any() {
        return Err(Error::invalid_argument(format!(
            "chunk at {:?} is outside the addressable range",
            lower
        )));
    }
    Ok(fold(lower.x) << (2 * BITS_PER_AXIS) | fold(lower.y) << BITS_PER_AXIS | fold(lower.z))
}

/// Lower corner encoded in `key`
pub fn key_to_lower_corner(key: u64) -> IVec3 {
    IVec3::new(
        unfold((key >> (2 * BITS_PER_AXIS)) & AXIS_MASK),
        unfold((key >> BITS_PER_AXIS) & AXIS_MASK),
        unfold(key & AXIS_MASK),
    )
}
