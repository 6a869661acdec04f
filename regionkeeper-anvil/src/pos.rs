//! Chunk and region coordinates.
//!
//! A region groups 32x32 chunks. Chunk coordinates map to their region by an
//! arithmetic shift, so negative chunks land in negative regions
//! (chunk -1 is in region -1, not region 0).

use std::fmt;

use crate::{CHUNKS_PER_REGION, REGION_SHIFT, REGION_SIZE};

/// Coordinates for a chunk in the world.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Region containing this chunk.
    #[inline]
    pub fn region(&self) -> RegionPos {
        RegionPos::new(self.x >> REGION_SHIFT, self.z >> REGION_SHIFT)
    }

    /// Local coordinates inside the region (0-31 on both axes).
    #[inline]
    pub fn local(&self) -> (i32, i32) {
        (self.x & (REGION_SIZE - 1), self.z & (REGION_SIZE - 1))
    }

    /// Linear index of this chunk in the region header (0-1023).
    #[inline]
    pub fn slot(&self) -> usize {
        let (local_x, local_z) = self.local();
        (local_x + local_z * REGION_SIZE) as usize
    }

    /// Name of the sidecar file holding this chunk when it is too large for
    /// the region file (e.g. "c.5.-40.mcc").
    pub fn external_filename(&self) -> String {
        format!("c.{}.{}.mcc", self.x, self.z)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Region file coordinates (parsed from filename like "r.0.-1.mca").
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Parse region position from filename (e.g., "r.0.-1.mca").
    pub fn from_filename(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }

    pub fn filename(&self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }

    /// Convert local chunk coordinates to world chunk coordinates.
    pub fn local_to_world(&self, local_x: i32, local_z: i32) -> ChunkPos {
        ChunkPos::new(
            (self.x << REGION_SHIFT) + local_x,
            (self.z << REGION_SHIFT) + local_z,
        )
    }

    /// World position of the chunk stored in header slot `slot`.
    pub fn chunk_at(&self, slot: usize) -> ChunkPos {
        let local_x = (slot % REGION_SIZE as usize) as i32;
        let local_z = (slot / REGION_SIZE as usize) as i32;
        self.local_to_world(local_x, local_z)
    }

    /// Every chunk of the region, in header slot order.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        (0..CHUNKS_PER_REGION).map(move |slot| self.chunk_at(slot))
    }
}

impl fmt::Display for RegionPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r.{}.{}", self.x, self.z)
    }
}
