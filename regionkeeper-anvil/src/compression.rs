//! Compression schemes used by chunk payloads.
//!
//! Same IDs as vanilla Minecraft: GZip (1), ZLib (2), None (3), LZ4 (4).
//! The region engine never looks inside a payload; these helpers are for
//! callers that want the decoded bytes or need to re-frame a payload.

use std::io::{Read, Write};

use flate2::Compression as ZlibCompression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::error::{RegionError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const GZIP_HEADER_LEN: usize = 10;
const GZIP_TRAILER_LEN: usize = 8;
/// FLG byte of a gzip member carrying only an original file name.
const GZIP_FLAG_FNAME: u8 = 0x08;
/// CMF/FLG pair for deflate, 32K window, default compression level.
const ZLIB_HEADER: [u8; 2] = [0x78, 0x9C];

/// Compression type tag stored in the low 7 bits of a chunk record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Gzip,
    Zlib,
    None,
    Lz4,
    /// A tag this crate cannot decode. Kept so such chunks can still be
    /// copied around byte for byte.
    Unknown(u8),
}

impl Compression {
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Compression::Gzip,
            2 => Compression::Zlib,
            3 => Compression::None,
            4 => Compression::Lz4,
            other => Compression::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Compression::Gzip => 1,
            Compression::Zlib => 2,
            Compression::None => 3,
            Compression::Lz4 => 4,
            Compression::Unknown(id) => *id,
        }
    }

    /// Guess the scheme from the leading bytes of a payload.
    ///
    /// `1F 8B` is gzip, a well-formed zlib CMF/FLG pair is zlib, anything
    /// else (including an empty payload) is treated as uncompressed.
    pub fn detect(data: &[u8]) -> Self {
        match data {
            [a, b, ..] if [*a, *b] == GZIP_MAGIC => Compression::Gzip,
            [cmf, flg, ..] if is_zlib_header(*cmf, *flg) => Compression::Zlib,
            _ => Compression::None,
        }
    }
}

fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    let deflate = cmf & 0x0F == 8;
    let window_ok = cmf >> 4 <= 7;
    let check_ok = ((u16::from(cmf) << 8) | u16::from(flg)) % 31 == 0;
    deflate && window_ok && check_ok
}

fn stream_error(scheme: &str) -> impl FnOnce(std::io::Error) -> RegionError + '_ {
    move |e| RegionError::Compression(format!("{} stream: {}", scheme, e))
}

/// Decompress a payload according to its stored compression type.
pub fn decode(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    match compression {
        Compression::Gzip => {
            GzDecoder::new(data)
                .read_to_end(&mut decompressed)
                .map_err(stream_error("gzip"))?;
        }
        Compression::Zlib => {
            ZlibDecoder::new(data)
                .read_to_end(&mut decompressed)
                .map_err(stream_error("zlib"))?;
        }
        Compression::None => decompressed.extend_from_slice(data),
        Compression::Lz4 => {
            // Java LZ4BlockOutputStream framing, as written by modern servers
            lz4_java_wrc::Lz4BlockInput::new(data)
                .read_to_end(&mut decompressed)
                .map_err(stream_error("lz4"))?;
        }
        Compression::Unknown(id) => return Err(RegionError::UnsupportedCompression(id)),
    }
    Ok(decompressed)
}

/// Compress plain bytes with the given scheme.
///
/// Only gzip, zlib and uncompressed payloads can be produced.
pub fn encode(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), ZlibCompression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Compression::Zlib => zlib_compress(data),
        Compression::None => Ok(data.to_vec()),
        other => Err(RegionError::UnsupportedCompression(other.id())),
    }
}

/// Standard zlib stream at the default compression level.
pub fn zlib_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibCompression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Re-frame a gzip member as a zlib stream without recompressing.
///
/// Both formats wrap the same raw deflate body, so only the framing changes:
/// the gzip header and CRC trailer are replaced by a zlib header and the
/// Adler-32 of the uncompressed content. Members carrying anything other
/// than an optional file name (FEXTRA, FCOMMENT, FHCRC) are rejected.
pub fn gzip_to_zlib(data: &[u8]) -> Result<Vec<u8>> {
    // Decoding validates the member and yields the content to checksum
    let content = decode(data, Compression::Gzip)?;
    let checksum = adler2::adler32_slice(&content);

    if data.len() < GZIP_HEADER_LEN + GZIP_TRAILER_LEN {
        return Err(RegionError::Compression("gzip member too short".to_string()));
    }

    let body_start = match data[3] {
        0 => GZIP_HEADER_LEN,
        GZIP_FLAG_FNAME => data[GZIP_HEADER_LEN..]
            .iter()
            .position(|&b| b == 0)
            .map(|nul| GZIP_HEADER_LEN + nul + 1)
            .ok_or_else(|| {
                RegionError::Compression("unterminated file name in gzip header".to_string())
            })?,
        flags => {
            return Err(RegionError::Compression(format!(
                "unsupported gzip flags {:#04x}",
                flags
            )));
        }
    };
    let body_end = data.len() - GZIP_TRAILER_LEN;
    if body_start > body_end {
        return Err(RegionError::Compression("gzip header overruns member".to_string()));
    }

    let mut zlib = Vec::with_capacity(body_end - body_start + ZLIB_HEADER.len() + 4);
    zlib.extend_from_slice(&ZLIB_HEADER);
    zlib.extend_from_slice(&data[body_start..body_end]);
    zlib.extend_from_slice(&checksum.to_be_bytes());
    Ok(zlib)
}
