//! Configuration for a region store.

use std::path::PathBuf;

/// Number of region files kept open when nothing else is configured.
pub const DEFAULT_MAX_OPEN_REGIONS: usize = 64;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the `r.x.z.mca` files and their `c.x.z.mcc` overflow files.
    pub root: PathBuf,

    /// Capacity of the open-file cache. Must be at least 1.
    pub max_open_regions: usize,

    /// fsync after every write, delete and free-space erase.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("region"),
            max_open_regions: DEFAULT_MAX_OPEN_REGIONS,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn max_open_regions(mut self, count: usize) -> Self {
        self.max_open_regions = count;
        self
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}
