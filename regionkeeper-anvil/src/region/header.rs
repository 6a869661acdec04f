//! Region file header.
//!
//! The header consists of two tables:
//! - Location table: where each chunk is stored
//! - Timestamp table: when each chunk was last saved

use crate::{CHUNKS_PER_REGION, HEADER_BYTES, SECTOR_BYTES};

/// Largest sector offset a location entry can hold (24 bits).
pub const MAX_SECTOR_OFFSET: u32 = 0x00FF_FFFF;

/// Where a chunk lives in the file, in whole sectors.
///
/// Minecraft stores: [Offset:3 bytes][Count:1 byte] (Big Endian)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkLocation {
    pub sector: u32,
    pub count: u8,
}

impl ChunkLocation {
    pub fn new(sector: u32, count: u8) -> Self {
        Self { sector, count }
    }

    pub fn from_bytes(entry: [u8; 4]) -> Self {
        let packed = u32::from_be_bytes(entry);
        Self {
            sector: packed >> 8,
            count: (packed & 0xFF) as u8,
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        ((self.sector << 8) | u32::from(self.count)).to_be_bytes()
    }

    /// A zero offset or zero count means the slot is empty.
    pub fn is_present(&self) -> bool {
        self.sector != 0 && self.count != 0
    }

    /// Byte offset of the chunk record.
    pub fn byte_offset(&self) -> u64 {
        u64::from(self.sector) * SECTOR_BYTES
    }
}

/// In-memory copy of the 8 KiB header (location table + timestamp table).
#[derive(Debug, Clone)]
pub struct Header {
    locations: Vec<ChunkLocation>,
    timestamps: Vec<i32>,
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

impl Header {
    /// Empty header: no chunks present.
    pub fn new() -> Self {
        Self {
            locations: vec![ChunkLocation::default(); CHUNKS_PER_REGION],
            timestamps: vec![0; CHUNKS_PER_REGION],
        }
    }

    /// Decode both tables from the first 8192 bytes of a region file.
    pub fn parse(bytes: &[u8; HEADER_BYTES as usize]) -> Self {
        let (location_table, timestamp_table) = bytes.split_at(HEADER_BYTES as usize / 2);

        let locations = location_table
            .chunks_exact(4)
            .map(|entry| ChunkLocation::from_bytes([entry[0], entry[1], entry[2], entry[3]]))
            .collect();
        let timestamps = timestamp_table
            .chunks_exact(4)
            .map(|entry| i32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]))
            .collect();

        Self { locations, timestamps }
    }

    /// Encode the full header.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(HEADER_BYTES as usize);
        for location in &self.locations {
            header.extend_from_slice(&location.to_bytes());
        }
        for timestamp in &self.timestamps {
            header.extend_from_slice(&timestamp.to_be_bytes());
        }
        header
    }

    pub fn location(&self, slot: usize) -> ChunkLocation {
        self.locations[slot]
    }

    pub fn timestamp(&self, slot: usize) -> i32 {
        self.timestamps[slot]
    }

    pub fn set(&mut self, slot: usize, location: ChunkLocation, timestamp: i32) {
        self.locations[slot] = location;
        self.timestamps[slot] = timestamp;
    }

    pub fn clear(&mut self, slot: usize) {
        self.set(slot, ChunkLocation::default(), 0);
    }

    /// Slots with a chunk present, in ascending order.
    pub fn present_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, location)| location.is_present())
            .map(|(slot, _)| slot)
    }

    /// File offset of a slot's location entry.
    #[inline]
    pub fn location_entry_offset(slot: usize) -> u64 {
        slot as u64 * 4
    }

    /// File offset of a slot's timestamp entry.
    #[inline]
    pub fn timestamp_entry_offset(slot: usize) -> u64 {
        SECTOR_BYTES + slot as u64 * 4
    }
}
