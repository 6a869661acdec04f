//! Error type shared by the region engine and the store built on top of it.

use thiserror::Error;

use crate::pos::{ChunkPos, RegionPos};

pub type Result<T> = std::result::Result<T, RegionError>;

#[derive(Debug, Error)]
pub enum RegionError {
    /// The region file or the store owning it has been closed.
    #[error("region store is closed")]
    Closed,

    /// On-disk header or record fields disagree with the data actually present.
    #[error("malformed region data: {0}")]
    Format(String),

    #[error("unsupported compression type: {0}")]
    UnsupportedCompression(u8),

    /// A compressed stream could not be decoded or re-framed.
    #[error("compression error: {0}")]
    Compression(String),

    /// No free run of sectors is addressable by a 24-bit sector offset.
    #[error("region file is full, cannot place {0} sectors")]
    RegionFull(usize),

    /// A chunk was handed to the region file that does not hold it.
    #[error("chunk {chunk} does not belong to region {region}")]
    WrongRegion { chunk: ChunkPos, region: RegionPos },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
