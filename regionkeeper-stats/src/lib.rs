use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct StoreStats {
    // Chunk I/O
    pub total_chunks_read: AtomicUsize,
    pub total_chunks_missing: AtomicUsize,
    pub total_bytes_read: AtomicU64,
    pub total_read_time_us: AtomicU64,
    pub total_chunks_written: AtomicUsize,
    pub total_external_writes: AtomicUsize,
    pub total_bytes_written: AtomicU64,
    pub total_write_time_us: AtomicU64,
    pub total_chunks_deleted: AtomicUsize,

    // Region cache
    pub total_cache_hits: AtomicUsize,
    /// Lookups not served from the cache, including ones for regions with
    /// no file on disk.
    pub total_cache_misses: AtomicUsize,
    /// Region files actually opened (or created) after a miss.
    pub total_regions_opened: AtomicUsize,
    pub total_evictions: AtomicUsize,

    // Maintenance
    pub total_compactions: AtomicUsize,
    pub total_bytes_reclaimed: AtomicU64,

    // Session
    pub start_time: Option<Instant>,
}

impl StoreStats {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// `bytes` is `None` when the chunk was not present.
    pub fn record_read(&self, duration: Duration, bytes: Option<usize>) {
        match bytes {
            Some(bytes) => {
                self.total_chunks_read.fetch_add(1, Ordering::Relaxed);
                self.total_bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
            }
            None => {
                self.total_chunks_missing.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.total_read_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_write(&self, duration: Duration, bytes: usize, external: bool) {
        self.total_chunks_written.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        if external {
            self.total_external_writes.fetch_add(1, Ordering::Relaxed);
        }
        self.total_write_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.total_chunks_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.total_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.total_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_region_opened(&self) {
        self.total_regions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.total_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// `before`/`after` are the region file sizes around the compaction.
    pub fn record_compaction(&self, before: u64, after: u64) {
        self.total_compactions.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_reclaimed
            .fetch_add(before.saturating_sub(after), Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let uptime = self.start_time.unwrap_or_else(Instant::now).elapsed();

        let read = self.total_chunks_read.load(Ordering::Relaxed);
        let missing = self.total_chunks_missing.load(Ordering::Relaxed);
        let bytes_read = self.total_bytes_read.load(Ordering::Relaxed);
        let read_time = self.total_read_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let read_calls = read + missing;
        let read_avg = if read_calls > 0 { read_time / read_calls as f64 } else { 0.0 };

        let written = self.total_chunks_written.load(Ordering::Relaxed);
        let external = self.total_external_writes.load(Ordering::Relaxed);
        let bytes_written = self.total_bytes_written.load(Ordering::Relaxed);
        let write_time = self.total_write_time_us.load(Ordering::Relaxed) as f64 / 1000.0; // ms
        let write_avg = if written > 0 { write_time / written as f64 } else { 0.0 };
        let deleted = self.total_chunks_deleted.load(Ordering::Relaxed);

        // Cache stats
        let hits = self.total_cache_hits.load(Ordering::Relaxed);
        let misses = self.total_cache_misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests > 0 { (hits as f64 / total_requests as f64) * 100.0 } else { 0.0 };
        let opened = self.total_regions_opened.load(Ordering::Relaxed);
        let evictions = self.total_evictions.load(Ordering::Relaxed);

        let compactions = self.total_compactions.load(Ordering::Relaxed);
        let reclaimed = self.total_bytes_reclaimed.load(Ordering::Relaxed);

        format!(
            "RegionKeeper Statistics\n\
             =======================\n\
             Session Duration: {:.2?}\n\n\
             [Read]\n\
             Chunks Read: {}\n\
             Chunks Missing: {}\n\
             Bytes Read: {}\n\
             Avg Time: {:.3} ms/call\n\n\
             [Write]\n\
             Chunks Written: {}\n\
               - External: {}\n\
             Bytes Written: {}\n\
             Avg Time: {:.3} ms/chunk\n\
             Chunks Deleted: {}\n\n\
             [Region Cache]\n\
             Hits: {}\n\
             Misses: {}\n\
             Hit Rate: {:.1}%\n\
             Regions Opened: {}\n\
             Evictions: {}\n\n\
             [Maintenance]\n\
             Compactions: {}\n\
             Bytes Reclaimed: {}\n",
            uptime,
            read, missing, bytes_read, read_avg,
            written, external, bytes_written, write_avg, deleted,
            hits, misses, hit_rate, opened, evictions,
            compactions, reclaimed
        )
    }
}
