//! A directory of region files behind a bounded cache of open handles.
//!
//! `RegionStore` maps chunk coordinates to the region file that holds them,
//! opening files on demand and closing the least recently used one when the
//! cache is full. It also carries the maintenance passes that work across
//! whole files: listing, free-space erasure and compaction.

pub mod config;

pub use config::{StoreConfig, DEFAULT_MAX_OPEN_REGIONS};

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use lru::LruCache;

use regionkeeper_anvil::region::is_external;
use regionkeeper_anvil::{
    ChunkData, ChunkPos, RegionError, RegionFile, RegionOptions, RegionPos, Result,
};
use regionkeeper_stats::StoreStats;

/// Not safe for concurrent use; wrap in a `Mutex` to share across threads.
pub struct RegionStore {
    config: StoreConfig,
    cache: LruCache<RegionPos, RegionFile>,
    stats: Arc<StoreStats>,
    closed: bool,
}

impl RegionStore {
    /// Open a store over `root` with default settings.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(StoreConfig::new(root.as_ref()))
    }

    pub fn with_config(config: StoreConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_open_regions).ok_or_else(|| {
            RegionError::InvalidConfig("max_open_regions must be at least 1".to_string())
        })?;
        fs::create_dir_all(&config.root)?;
        info!(
            "Opened region store at {} (cache {} files)",
            config.root.display(),
            capacity
        );

        Ok(Self {
            config,
            cache: LruCache::new(capacity),
            stats: Arc::new(StoreStats::new()),
            closed: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Regions currently open, most recently used first.
    pub fn open_regions(&self) -> Vec<RegionPos> {
        self.cache.iter().map(|(pos, _)| *pos).collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(RegionError::Closed);
        }
        Ok(())
    }

    fn region_options(&self) -> RegionOptions {
        RegionOptions {
            sync_writes: self.config.sync_writes,
        }
    }

    /// The engine for `pos`, promoted to most recently used.
    ///
    /// Returns `None` when `create` is false and no file exists for the
    /// region; nothing is created on disk in that case.
    pub fn region(&mut self, pos: RegionPos, create: bool) -> Result<Option<&mut RegionFile>> {
        self.ensure_open()?;
        if !create
            && !self.cache.contains(&pos)
            && !RegionFile::path_for(&self.config.root, pos).exists()
        {
            self.stats.record_cache_miss();
            return Ok(None);
        }
        self.cached(pos).map(Some)
    }

    fn cached(&mut self, pos: RegionPos) -> Result<&mut RegionFile> {
        self.ensure_open()?;
        if self.cache.contains(&pos) {
            self.stats.record_cache_hit();
        } else {
            self.stats.record_cache_miss();
            let region = RegionFile::open(&self.config.root, pos, self.region_options())?;
            self.stats.record_region_opened();

            // `pos` was not cached, so anything handed back is an eviction
            if let Some((evicted_pos, mut evicted)) = self.cache.push(pos, region) {
                debug!("Evicting region {} from cache", evicted_pos);
                self.stats.record_eviction();
                evicted.close()?;
            }
        }

        match self.cache.get_mut(&pos) {
            Some(region) if !region.is_closed() => Ok(region),
            _ => Err(RegionError::Closed),
        }
    }

    /// Read a chunk, `None` if it (or its whole region) does not exist.
    pub fn read(&mut self, chunk: ChunkPos) -> Result<Option<ChunkData>> {
        let start = Instant::now();
        let data = match self.region(chunk.region(), false)? {
            Some(region) => region.read(chunk)?,
            None => None,
        };
        self.stats
            .record_read(start.elapsed(), data.as_ref().map(ChunkData::len));
        Ok(data)
    }

    /// Write a chunk, creating its region file if needed. `None` deletes.
    pub fn write(&mut self, chunk: ChunkPos, data: Option<ChunkData>) -> Result<()> {
        let Some(data) = data else {
            return self.delete(chunk);
        };

        let start = Instant::now();
        self.cached(chunk.region())?.write(chunk, Some(&data))?;
        self.stats
            .record_write(start.elapsed(), data.len(), is_external(data.len()));
        Ok(())
    }

    /// Remove a chunk. Deleting from a region with no file is a no-op.
    pub fn delete(&mut self, chunk: ChunkPos) -> Result<()> {
        if let Some(region) = self.region(chunk.region(), false)? {
            region.delete(chunk)?;
            self.stats.record_delete();
        }
        Ok(())
    }

    /// Every region file in the root directory, sorted by position.
    pub fn regions(&self) -> Result<Vec<RegionPos>> {
        self.ensure_open()?;
        let mut regions = Vec::new();
        for entry in fs::read_dir(&self.config.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(RegionPos::from_filename) {
                Some(pos) => regions.push(pos),
                None => debug!("Skipping {:?}: not a region file", name),
            }
        }
        regions.sort();
        Ok(regions)
    }

    /// Chunk positions of a region, optionally only the ones present.
    ///
    /// Asking for every position creates the region file, as opening a
    /// region for writing would.
    pub fn chunks(&mut self, pos: RegionPos, only_existing: bool) -> Result<Vec<ChunkPos>> {
        match self.region(pos, !only_existing)? {
            Some(region) => region.chunks(only_existing),
            None => Ok(Vec::new()),
        }
    }

    pub fn erase_free_space(&mut self, pos: RegionPos) -> Result<()> {
        if let Some(region) = self.region(pos, false)? {
            region.erase_free_space()?;
        }
        Ok(())
    }

    pub fn erase_free_space_all(&mut self) -> Result<()> {
        for pos in self.regions()? {
            self.erase_free_space(pos)?;
        }
        Ok(())
    }

    /// Repack a region so its chunks sit back to back after the header.
    ///
    /// Every chunk is held in memory while the file is rewritten. A failure
    /// part way through can lose the chunks not yet written back.
    pub fn compact(&mut self, pos: RegionPos) -> Result<()> {
        let Some(region) = self.region(pos, false)? else {
            return Ok(());
        };
        let before = region.file_len()?;

        let mut chunks = Vec::new();
        for chunk in region.chunks(true)? {
            if let Some(data) = region.read(chunk)? {
                chunks.push((chunk, data));
            }
        }
        for (chunk, _) in &chunks {
            region.delete(*chunk)?;
        }
        region.erase_free_space()?;
        for (chunk, data) in &chunks {
            region.write(*chunk, Some(data))?;
        }

        let after = region.file_len()?;
        self.stats.record_compaction(before, after);
        info!(
            "Compacted {} ({} chunks): {} -> {} bytes",
            pos,
            chunks.len(),
            before,
            after
        );
        Ok(())
    }

    pub fn compact_all(&mut self) -> Result<()> {
        for pos in self.regions()? {
            self.compact(pos)?;
        }
        Ok(())
    }

    /// Close every open region. Later calls fail with `Closed`; closing
    /// again is a no-op.
    ///
    /// Returns the first close failure, after still attempting the rest.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        while let Some((pos, mut region)) = self.cache.pop_lru() {
            if let Err(e) = region.close() {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!("Failed to close region {}: {}", pos, e);
                }
            }
        }
        info!("Closed region store at {}", self.config.root.display());

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for RegionStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close region store: {}", e);
        }
    }
}
