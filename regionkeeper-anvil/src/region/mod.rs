//! Read/write engine for a single region file.
//!
//! The engine keeps the header tables and a sector usage bitmap in memory,
//! and writes every header change through to disk immediately. Sectors are
//! handed out first-fit from the start of the file.

mod header;
mod sectors;

pub use header::{ChunkLocation, Header, MAX_SECTOR_OFFSET};
pub use sectors::SectorMap;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::chunk::ChunkData;
use crate::compression::Compression;
use crate::error::{RegionError, Result};
use crate::pos::{ChunkPos, RegionPos};
use crate::space::{Space, SpaceList};
use crate::{
    EXTERNAL_FLAG, EXTERNAL_SECTOR_THRESHOLD, HEADER_BYTES, HEADER_SECTORS, RECORD_HEADER_BYTES,
    SECTOR_BYTES,
};

/// Per-file behaviour switches.
#[derive(Debug, Clone, Copy)]
pub struct RegionOptions {
    /// fsync file data after every write, delete and free-space erase.
    pub sync_writes: bool,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

/// An open region file.
///
/// Not safe for concurrent use: callers must serialize access to a region.
/// Once closed, every operation fails with [`RegionError::Closed`].
pub struct RegionFile {
    pos: RegionPos,
    dir: PathBuf,
    path: PathBuf,
    /// `None` once closed.
    file: Option<File>,
    header: Header,
    sectors: SectorMap,
    options: RegionOptions,
}

impl RegionFile {
    /// Path of the region file for `pos` inside `dir`.
    pub fn path_for(dir: &Path, pos: RegionPos) -> PathBuf {
        dir.join(pos.filename())
    }

    /// Open the region file for `pos` inside `dir`, creating it with an empty
    /// header if it is missing or shorter than the header.
    pub fn open(dir: impl AsRef<Path>, pos: RegionPos, options: RegionOptions) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = Self::path_for(&dir, pos);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut sectors = SectorMap::new();
        sectors.set_used(0, HEADER_SECTORS, true);

        let header = if file.metadata()?.len() < HEADER_BYTES {
            let header = Header::new();
            file.set_len(HEADER_BYTES)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&header.encode())?;
            debug!("Initialized empty region file {}", path.display());
            header
        } else {
            let mut bytes = [0u8; HEADER_BYTES as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut bytes)?;
            let header = Header::parse(&bytes);
            for slot in header.present_slots() {
                let location = header.location(slot);
                if is_live_range(location) {
                    sectors.set_used(location.sector as usize, location.count as usize, true);
                } else {
                    warn!(
                        "Slot {} of {} points into the header (sector {})",
                        slot,
                        path.display(),
                        location.sector
                    );
                }
            }
            debug!(
                "Opened region file {} ({} chunks)",
                path.display(),
                header.present_slots().count()
            );
            header
        };

        Ok(Self {
            pos,
            dir,
            path,
            file: Some(file),
            header,
            sectors,
            options,
        })
    }

    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn check_region(&self, chunk: ChunkPos) -> Result<()> {
        if chunk.region() != self.pos {
            return Err(RegionError::WrongRegion {
                chunk,
                region: self.pos,
            });
        }
        Ok(())
    }

    /// Sidecar file for a chunk stored externally.
    pub fn external_path(&self, chunk: ChunkPos) -> PathBuf {
        self.dir.join(chunk.external_filename())
    }

    /// Number of chunks present.
    pub fn len(&self) -> usize {
        self.header.present_slots().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, chunk: ChunkPos) -> bool {
        self.location(chunk).is_present()
    }

    pub fn location(&self, chunk: ChunkPos) -> ChunkLocation {
        self.header.location(chunk.slot())
    }

    /// Recorded edit time of a chunk, 0 if absent.
    pub fn timestamp(&self, chunk: ChunkPos) -> i32 {
        self.header.timestamp(chunk.slot())
    }

    /// Number of sectors in use, header included.
    pub fn used_sectors(&self) -> usize {
        self.sectors.used_count()
    }

    pub fn file_len(&self) -> Result<u64> {
        let file = self.file.as_ref().ok_or(RegionError::Closed)?;
        Ok(file.metadata()?.len())
    }

    /// Read a chunk, `None` if it is not present.
    pub fn read(&mut self, chunk: ChunkPos) -> Result<Option<ChunkData>> {
        self.check_region(chunk)?;
        let external_path = self.external_path(chunk);
        let file = self.file.as_mut().ok_or(RegionError::Closed)?;

        let slot = chunk.slot();
        let location = self.header.location(slot);
        if !location.is_present() {
            return Ok(None);
        }
        if !is_live_range(location) {
            return Err(RegionError::Format(format!(
                "chunk {} points into the header at sector {}",
                chunk, location.sector
            )));
        }

        file.seek(SeekFrom::Start(location.byte_offset()))?;
        let mut record_header = [0u8; RECORD_HEADER_BYTES as usize];
        read_record(file, &mut record_header, chunk)?;

        let length = u32::from_be_bytes([
            record_header[0],
            record_header[1],
            record_header[2],
            record_header[3],
        ]) as u64;
        let flags = record_header[4];
        let compression = Compression::from_id(flags & !EXTERNAL_FLAG);

        if length == 0 {
            return Err(RegionError::Format(format!(
                "chunk {} has a zero-length record",
                chunk
            )));
        }

        let data = if flags & EXTERNAL_FLAG != 0 {
            match fs::read(&external_path) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(RegionError::Format(format!(
                        "chunk {} is marked external but {} is missing",
                        chunk,
                        external_path.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            let allocated = u64::from(location.count) * SECTOR_BYTES;
            if length + 4 > allocated {
                return Err(RegionError::Format(format!(
                    "chunk {} declares {} bytes but only {} sectors are allocated",
                    chunk, length, location.count
                )));
            }
            let mut data = vec![0u8; (length - 1) as usize];
            read_record(file, &mut data, chunk)?;
            data
        };

        Ok(Some(ChunkData::with_compression(
            data,
            compression,
            self.header.timestamp(slot),
        )))
    }

    /// Write a chunk, or delete it when `data` is `None`.
    pub fn write(&mut self, chunk: ChunkPos, data: Option<&ChunkData>) -> Result<()> {
        match data {
            Some(data) => self.store(chunk, data),
            None => self.delete(chunk),
        }
    }

    /// Remove a chunk, freeing its sectors and any external file.
    pub fn delete(&mut self, chunk: ChunkPos) -> Result<()> {
        self.check_region(chunk)?;
        let external_path = self.external_path(chunk);
        let file = self.file.as_mut().ok_or(RegionError::Closed)?;

        let slot = chunk.slot();
        release(&self.header, &mut self.sectors, slot);
        self.header.clear(slot);

        write_at(file, Header::location_entry_offset(slot), &[0; 4])?;
        write_at(file, Header::timestamp_entry_offset(slot), &[0; 4])?;
        remove_if_exists(&external_path)?;

        if self.options.sync_writes {
            file.sync_data()?;
        }
        debug!("Deleted chunk {} from {}", chunk, self.pos);
        Ok(())
    }

    fn store(&mut self, chunk: ChunkPos, data: &ChunkData) -> Result<()> {
        self.check_region(chunk)?;
        let tag = data.compression().id();
        if tag & EXTERNAL_FLAG != 0 {
            return Err(RegionError::UnsupportedCompression(tag));
        }

        let external_path = self.external_path(chunk);
        let file = self.file.as_mut().ok_or(RegionError::Closed)?;

        let payload = data.raw_data();
        let body_len = payload.len() as u64 + RECORD_HEADER_BYTES;
        let external = is_external(payload.len());
        let count = if external {
            1
        } else {
            body_len.div_ceil(SECTOR_BYTES) as usize
        };

        // Free first, so a rewrite may land on its own old sectors
        let slot = chunk.slot();
        let old = self.header.location(slot);
        release(&self.header, &mut self.sectors, slot);
        let sector = self.sectors.find_free(count);
        if sector > MAX_SECTOR_OFFSET as usize {
            if is_live_range(old) {
                self.sectors.set_used(old.sector as usize, old.count as usize, true);
            }
            return Err(RegionError::RegionFull(count));
        }
        self.sectors.set_used(sector, count, true);

        let offset = sector as u64 * SECTOR_BYTES;
        if file.metadata()?.len() < offset {
            file.set_len(offset)?;
        }
        file.seek(SeekFrom::Start(offset))?;

        if external {
            let mut stub = [0u8; RECORD_HEADER_BYTES as usize];
            stub[..4].copy_from_slice(&1u32.to_be_bytes());
            stub[4] = EXTERNAL_FLAG | tag;
            file.write_all(&stub)?;
            fs::write(&external_path, payload)?;
        } else {
            remove_if_exists(&external_path)?;
            let mut record = Vec::with_capacity(body_len as usize);
            record.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
            record.push(tag);
            record.extend_from_slice(payload);
            file.write_all(&record)?;
        }

        // Keep the file a whole number of sectors
        let len = file.metadata()?.len();
        if len % SECTOR_BYTES != 0 {
            file.set_len(len.next_multiple_of(SECTOR_BYTES))?;
        }

        let location = ChunkLocation::new(sector as u32, count as u8);
        self.header.set(slot, location, data.timestamp());
        write_at(file, Header::location_entry_offset(slot), &location.to_bytes())?;
        write_at(
            file,
            Header::timestamp_entry_offset(slot),
            &data.timestamp().to_be_bytes(),
        )?;

        if self.options.sync_writes {
            file.sync_data()?;
        }
        debug!(
            "Wrote chunk {} to {} at sector {} ({} sectors{})",
            chunk,
            self.pos,
            sector,
            count,
            if external { ", external" } else { "" }
        );
        Ok(())
    }

    /// Every chunk position of this region in header order, optionally only
    /// the ones present.
    pub fn chunks(&self, only_existing: bool) -> Result<Vec<ChunkPos>> {
        if self.is_closed() {
            return Err(RegionError::Closed);
        }
        Ok(self
            .pos
            .chunks()
            .filter(|chunk| !only_existing || self.contains(*chunk))
            .collect())
    }

    /// Zero every byte not covered by the header or a chunk record, and cut
    /// the file back to the sector after the last record.
    ///
    /// Live chunks are never moved; see the store's compaction for that.
    pub fn erase_free_space(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(RegionError::Closed)?;

        let mut used = SpaceList::new();
        used.add(Space::bounded(0, HEADER_BYTES));
        for slot in self.header.present_slots() {
            let location = self.header.location(slot);
            if !is_live_range(location) {
                continue;
            }
            let start = location.byte_offset();
            file.seek(SeekFrom::Start(start))?;
            let mut length = [0u8; 4];
            read_record(file, &mut length, self.pos.chunk_at(slot))?;
            // The length field itself is part of the record
            used.add(Space::bounded(start, u64::from(u32::from_be_bytes(length)) + 4));
        }

        let before = file.metadata()?.len();
        for space in used.flip().iter() {
            match space {
                Space::OpenEnded { offset } => {
                    let end = offset.next_multiple_of(SECTOR_BYTES);
                    file.set_len(end)?;
                    zero_fill(file, offset, end - offset)?;
                }
                Space::Bounded { offset, length } => zero_fill(file, offset, length)?,
            }
        }
        let after = file.metadata()?.len();

        if self.options.sync_writes {
            file.sync_data()?;
        }
        info!(
            "Erased free space in {}: {} -> {} bytes",
            self.pos, before, after
        );
        Ok(())
    }

    /// Flush and release the file handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            debug!("Closing region file {}", self.path.display());
            file.sync_all()?;
        }
        Ok(())
    }
}

/// A present entry whose sectors lie past the header. Anything else is
/// never marked in the sector map.
fn is_live_range(location: ChunkLocation) -> bool {
    location.is_present() && location.sector as usize >= HEADER_SECTORS
}

/// Free the sectors of `slot`, keeping the header and any sector another live
/// slot still covers marked used.
fn release(header: &Header, sectors: &mut SectorMap, slot: usize) {
    let old = header.location(slot);
    if !is_live_range(old) {
        return;
    }
    let start = old.sector as usize;
    let end = start + old.count as usize;
    sectors.set_used(start, old.count as usize, false);

    for other in header.present_slots().filter(|other| *other != slot) {
        let location = header.location(other);
        let other_start = location.sector as usize;
        let other_end = other_start + location.count as usize;
        if is_live_range(location) && other_start < end && start < other_end {
            sectors.set_used(other_start, location.count as usize, true);
        }
    }
}

/// Whether a payload of `len` bytes is kept in an external file.
pub fn is_external(len: usize) -> bool {
    (len as u64 + RECORD_HEADER_BYTES).div_ceil(SECTOR_BYTES) >= EXTERNAL_SECTOR_THRESHOLD
}

/// `read_exact`, with running off the end of the file reported as a
/// malformed record rather than a plain I/O error.
fn read_record(file: &mut File, buf: &mut [u8], chunk: ChunkPos) -> Result<()> {
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            RegionError::Format(format!("record for chunk {} runs past end of file", chunk))
        } else {
            RegionError::Io(e)
        }
    })
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

fn zero_fill(file: &mut File, offset: u64, length: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    io::copy(&mut io::repeat(0).take(length), file)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests;
