//! Minecraft Anvil region file format (.mca).
//!
//! Region files contain 32x32 chunks in a specific binary format:
//! - Bytes 0-4095: Location table (1024 entries × 4 bytes)
//! - Bytes 4096-8191: Timestamp table (1024 entries × 4 bytes)
//! - Bytes 8192+: Chunk data (variable size sectors)
//!
//! Each chunk record is `[Length: 4][Type: 1][Data...]`, where the length
//! counts the type byte plus data. Chunks too large for the one-byte sector
//! count are kept in a `c.x.z.mcc` file next to the region, with only the
//! 5-byte record header left in the region itself.

pub mod chunk;
pub mod compression;
pub mod error;
pub mod pos;
pub mod region;
pub mod space;

pub use chunk::ChunkData;
pub use compression::Compression;
pub use error::{RegionError, Result};
pub use pos::{ChunkPos, RegionPos};
pub use region::{ChunkLocation, RegionFile, RegionOptions};
pub use space::{Space, SpaceList};

pub const SECTOR_BYTES: u64 = 4096; // minecraft uses 4096 bytes per sector
pub const HEADER_BYTES: u64 = 8192; // header is 8192 bytes (2 sectors 8kb)
pub const HEADER_SECTORS: usize = 2;

/// Number of chunks per region dimension.
pub const REGION_SIZE: i32 = 32;
/// log2(REGION_SIZE), chunk -> region is an arithmetic shift.
pub const REGION_SHIFT: u32 = 5;
pub const CHUNKS_PER_REGION: usize = (REGION_SIZE * REGION_SIZE) as usize;

/// Length field plus compression type byte in front of every chunk record.
pub const RECORD_HEADER_BYTES: u64 = 5;
/// High bit of the compression byte: payload lives in the external file.
pub const EXTERNAL_FLAG: u8 = 0x80;
/// A chunk needing this many sectors cannot be described by the one-byte
/// sector count and goes to an external file instead.
pub const EXTERNAL_SECTOR_THRESHOLD: u64 = 256;
