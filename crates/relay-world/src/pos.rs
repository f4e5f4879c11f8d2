//! Chunk-grid and block positions, and dimensions.

use serde::{Deserialize, Serialize};

/// Identifies a chunk column on the chunk grid.
///
/// One chunk spans 16 blocks on each horizontal axis, so a block coordinate
/// maps to its chunk by an arithmetic shift of 4.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the block at `(x, z)`.
    pub fn from_block(x: i32, z: i32) -> Self {
        Self { x: x >> 4, z: z >> 4 }
    }

    /// Integer distance on the chunk grid: `isqrt(dx² + dz²)`.
    pub fn distance(self, other: ChunkPos) -> u64 {
        planar_distance(
            i64::from(self.x) - i64::from(other.x),
            i64::from(self.z) - i64::from(other.z),
        )
    }
}

/// `isqrt(dx² + dz²)`, exact for any pair of `i32` coordinate differences.
pub fn planar_distance(dx: i64, dz: i64) -> u64 {
    let dx = u128::from(dx.unsigned_abs());
    let dz = u128::from(dz.unsigned_abs());
    // Both deltas are below 2^33, so the root fits in a u64.
    (dx * dx + dz * dz).isqrt() as u64
}

/// A block coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a floating-point position (truncated toward zero).
    pub fn from_vec(v: [f32; 3]) -> Self {
        Self {
            x: v[0] as i32,
            y: v[1] as i32,
            z: v[2] as i32,
        }
    }

    pub fn chunk(self) -> ChunkPos {
        ChunkPos::from_block(self.x, self.z)
    }
}

impl From<[i32; 3]> for BlockPos {
    fn from(v: [i32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// The three vanilla dimensions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    #[default]
    Overworld,
    Nether,
    End,
}

impl Dimension {
    pub fn id(self) -> i32 {
        match self {
            Dimension::Overworld => 0,
            Dimension::Nether => 1,
            Dimension::End => 2,
        }
    }

    /// Unknown ids map to `None`.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Dimension::Overworld),
            1 => Some(Dimension::Nether),
            2 => Some(Dimension::End),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_blocks_round_down_to_chunk() {
        assert_eq!(ChunkPos::from_block(-1, -16), ChunkPos::new(-1, -1));
        assert_eq!(ChunkPos::from_block(-17, 15), ChunkPos::new(-2, 0));
        assert_eq!(ChunkPos::from_block(31, 32), ChunkPos::new(1, 2));
    }

    #[test]
    fn test_distance_is_integer_sqrt() {
        let origin = ChunkPos::new(0, 0);
        assert_eq!(origin.distance(ChunkPos::new(3, 4)), 5);
        // sqrt(8) = 2.83 floors to 2
        assert_eq!(origin.distance(ChunkPos::new(2, 2)), 2);
        assert_eq!(ChunkPos::new(-5, 0).distance(ChunkPos::new(5, 0)), 10);
    }

    #[test]
    fn test_distance_at_coordinate_limits() {
        let min = ChunkPos::new(i32::MIN, i32::MIN);
        let max = ChunkPos::new(i32::MAX, i32::MAX);
        // Span of 2^32 - 1 on both axes: root of 2 * (2^32 - 1)^2.
        assert_eq!(min.distance(max), 6_074_000_998);
        assert_eq!(max.distance(min), min.distance(max));
        assert_eq!(ChunkPos::new(i32::MIN, 0).distance(ChunkPos::new(0, 0)), 1 << 31);
        assert_eq!(planar_distance(i64::from(i32::MIN), 0), 1 << 31);
    }

    #[test]
    fn test_dimension_ids() {
        for dim in [Dimension::Overworld, Dimension::Nether, Dimension::End] {
            assert_eq!(Dimension::from_id(dim.id()), Some(dim));
        }
        assert_eq!(Dimension::from_id(7), None);
    }
}
