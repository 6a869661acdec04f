//! Chunk payloads as stored in a region file.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::compression::{self, Compression};
use crate::error::Result;

/// An opaque chunk payload: the bytes exactly as they sit on disk, the
/// compression tag they were written with, and the edit time recorded in the
/// region header.
///
/// Timestamps are signed 32-bit seconds since the epoch, like the header
/// table itself, so they wrap in 2038.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    data: Vec<u8>,
    compression: Compression,
    timestamp: i32,
}

impl ChunkData {
    /// Wrap already-compressed bytes, detecting the scheme and stamping the
    /// current time.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(data, now())
    }

    pub fn with_timestamp(data: impl Into<Vec<u8>>, timestamp: i32) -> Self {
        let data = data.into();
        let compression = Compression::detect(&data);
        Self { data, compression, timestamp }
    }

    pub fn with_compression(data: impl Into<Vec<u8>>, compression: Compression, timestamp: i32) -> Self {
        Self {
            data: data.into(),
            compression,
            timestamp,
        }
    }

    /// Compress plain bytes and wrap the result.
    pub fn compress(plain: &[u8], compression: Compression, timestamp: i32) -> Result<Self> {
        let data = compression::encode(plain, compression)?;
        Ok(Self::with_compression(data, compression, timestamp))
    }

    /// Raw bytes as stored, still compressed.
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw_data(self) -> Vec<u8> {
        self.data
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decompressed payload.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        compression::decode(&self.data, self.compression)
    }
}

/// Current time as a header timestamp.
pub fn now() -> i32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i32)
        .unwrap_or(0)
}
