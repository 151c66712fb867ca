//! Morton encoding (Z-order curve) for chunk-local voxel ordering
//!
//! Chunks are stored on disk in plain linear order (x fastest, then y, then z)
//! and kept in memory in Morton order so that neighbouring voxels in all three
//! axes tend to share cache lines.

/// Spread bits of a 21-bit integer into every third bit of a 64-bit integer
fn spread_bits(x: u32) -> u64 {
    let mut x = x as u64 & 0x1fffff;
    x = (x | (x << 32)) & 0x1f00000000ffff;
    x = (x | (x << 16)) & 0x1f0000ff0000ff;
    x = (x | (x << 8)) & 0x100f00f00f00f00f;
    x = (x | (x << 4)) & 0x10c30c30c30c30c3;
    x = (x | (x << 2)) & 0x1249249249249249;
    x
}

/// Compact every third bit of a 64-bit integer into a 21-bit integer
fn compact_bits(x: u64) -> u32 {
    let mut x = x & 0x1249249249249249;
    x = (x | (x >> 2)) & 0x10c30c30c30c30c3;
    x = (x | (x >> 4)) & 0x100f00f00f00f00f;
    x = (x | (x >> 8)) & 0x1f0000ff0000ff;
    x = (x | (x >> 16)) & 0x1f00000000ffff;
    x = (x | (x >> 32)) & 0x1fffff;
    x as u32
}

/// Encode 3D coordinates into a Morton code. Each coordinate uses at most 21 bits.
pub fn encode_morton_3d(x: u32, y: u32, z: u32) -> u64 {
    spread_bits(x) | (spread_bits(y) << 1) | (spread_bits(z) << 2)
}

/// Decode a Morton code back to 3D coordinates
pub fn decode_morton_3d(code: u64) -> (u32, u32, u32) {
    (
        compact_bits(code),
        compact_bits(code >> 1),
        compact_bits(code >> 2),
    )
}

/// Linear index of a voxel inside a cube of side `side` (x fastest)
#[inline]
pub fn linear_index(x: u32, y: u32, z: u32, side: u32) -> usize {
    (x + y * side + z * side * side) as usize
}

/// Reorder a linear (x-fastest) cube of side `side` into Morton order.
///
/// `side` must be a power of two and both slices must hold `side^3` items.
pub fn linear_to_morton<T: Copy>(linear: &[T], morton: &mut [T], side: u32) {
    debug_assert!(side.is_power_of_two());
    debug_assert_eq!(linear.len(), morton.len());
    for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                morton[encode_morton_3d(x, y, z) as usize] = linear[linear_index(x, y, z, side)];
            }
        }
    }
}

/// Reorder a Morton-ordered cube of side `side` back into linear order.
pub fn morton_to_linear<T: Copy>(morton: &[T], linear: &mut [T], side: u32) {
    debug_assert!(side.is_power_of_two());
    debug_assert_eq!(linear.len(), morton.len());
    for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                linear[linear_index(x, y, z, side)] = morton[encode_morton_3d(x, y, z) as usize];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for x in [0, 1, 10, 100, 1023] {
            for y in [0, 1, 10, 100, 1023] {
                for z in [0, 1, 10, 100, 1023] {
                    let code = encode_morton_3d(x, y, z);
                    assert_eq!((x, y, z), decode_morton_3d(code), "Failed for ({}, {}, {})", x, y, z);
                }
            }
        }
    }

    #[test]
    fn test_ordering() {
        assert_eq!(encode_morton_3d(0, 0, 0), 0);
        assert_eq!(encode_morton_3d(1, 0, 0), 1);
        assert_eq!(encode_morton_3d(0, 1, 0), 2);
        assert_eq!(encode_morton_3d(0, 0, 1), 4);
        assert_eq!(encode_morton_3d(1, 1, 1), 7);
    }

    #[test]
    fn test_cube_reorder_is_permutation() {
        let side = 8u32;
        let linear: Vec<u32> = (0..side * side * side).collect();
        let mut morton = vec![0u32; linear.len()];
        linear_to_morton(&linear, &mut morton, side);

        // First 8 Morton entries are the 2x2x2 corner block
        let corner: Vec<u32> = morton[..8].to_vec();
        assert_eq!(corner, vec![0, 1, 8, 9, 64, 65, 72, 73]);

        let mut back = vec![0u32; linear.len()];
        morton_to_linear(&morton, &mut back, side);
        assert_eq!(back, linear);
    }
}
