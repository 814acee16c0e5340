//! Cache hit statistics.

/// Sliding-window hit/miss statistics.
///
/// Samples are recorded in a fixed-size circular window so the ratio tracks
/// recent behavior instead of the whole process lifetime. Cumulative
/// counters are kept alongside.
#[derive(Debug, Clone)]
pub struct CacheStatistics {
    window: Vec<bool>,
    next: usize,
    filled: usize,
    total_hits: u64,
    total_misses: u64,
}

/// Number of samples the ratio window holds.
const WINDOW_SIZE: usize = 500;

impl CacheStatistics {
    pub fn new() -> Self {
        Self::with_window(WINDOW_SIZE)
    }

    pub fn with_window(size: usize) -> Self {
        Self { window: vec![false; size.max(1)], next: 0, filled: 0, total_hits: 0, total_misses: 0 }
    }

    pub fn record_hit(&mut self) {
        self.total_hits += 1;
        self.push(true);
    }

    pub fn record_miss(&mut self) {
        self.total_misses += 1;
        self.push(false);
    }

    fn push(&mut self, hit: bool) {
        self.window[self.next] = hit;
        self.next = (self.next + 1) % self.window.len();
        self.filled = (self.filled + 1).min(self.window.len());
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn total_misses(&self) -> u64 {
        self.total_misses
    }

    /// Hit rate over the window as a percentage: `hits / (hits + misses)`,
    /// 100 when only hits were sampled, 0 when only misses.
    pub fn hit_ratio_percent(&self) -> u32 {
        if self.filled == 0 {
            return 0;
        }
        let hits = self.window[..self.filled].iter().filter(|h| **h).count();
        (hits * 100 / self.filled) as u32
    }
}

impl Default for CacheStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero() {
        assert_eq!(CacheStatistics::new().hit_ratio_percent(), 0);
    }

    #[test]
    fn all_hits_caps_at_hundred() {
        let mut stats = CacheStatistics::with_window(10);
        for _ in 0..5 {
            stats.record_hit();
        }
        assert_eq!(stats.hit_ratio_percent(), 100);
    }

    #[test]
    fn all_misses_reports_zero() {
        let mut stats = CacheStatistics::with_window(10);
        for _ in 0..5 {
            stats.record_miss();
        }
        assert_eq!(stats.hit_ratio_percent(), 0);
    }

    #[test]
    fn mixed_ratio_is_conventional_fraction() {
        let mut stats = CacheStatistics::with_window(10);
        for _ in 0..3 {
            stats.record_hit();
        }
        stats.record_miss();
        // 3 hits of 4 samples
        assert_eq!(stats.hit_ratio_percent(), 75);
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut stats = CacheStatistics::with_window(4);
        for _ in 0..4 {
            stats.record_miss();
        }
        for _ in 0..4 {
            stats.record_hit();
        }
        // the misses rolled out of the window
        assert_eq!(stats.hit_ratio_percent(), 100);
        assert_eq!(stats.total_misses(), 4);
        assert_eq!(stats.total_hits(), 4);
    }
}
