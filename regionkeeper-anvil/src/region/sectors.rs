//! Sector usage bitmap for a region file.
//!
//! One bit per 4 KiB sector, 1 = in use. The map grows on demand; any sector
//! past the end is free.

#[derive(Debug, Clone, Default)]
pub struct SectorMap {
    /// Bitmap words (each word = 64 sectors)
    words: Vec<u64>,
}

impl SectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, sector: usize) -> bool {
        self.words
            .get(sector / 64)
            .is_some_and(|word| word & (1u64 << (sector % 64)) != 0)
    }

    /// Mark `count` sectors starting at `start`.
    pub fn set_used(&mut self, start: usize, count: usize, used: bool) {
        if count == 0 {
            return;
        }
        let needed_words = (start + count).div_ceil(64);
        if self.words.len() < needed_words {
            self.words.resize(needed_words, 0);
        }
        for sector in start..start + count {
            let bit = 1u64 << (sector % 64);
            if used {
                self.words[sector / 64] |= bit;
            } else {
                self.words[sector / 64] &= !bit;
            }
        }
    }

    /// First-fit search for `count` consecutive free sectors, scanning from
    /// sector 0. Always succeeds since the map is unbounded.
    pub fn find_free(&self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let mut run_start = 0;
        let mut run_len = 0;
        let mut sector = 0;
        loop {
            if self.is_used(sector) {
                run_len = 0;
            } else {
                if run_len == 0 {
                    run_start = sector;
                }
                run_len += 1;
                if run_len >= count {
                    return run_start;
                }
            }
            sector += 1;
        }
    }

    /// Number of sectors currently marked used.
    pub fn used_count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}
