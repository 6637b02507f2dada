//! Cache activity counters

use serde::Serialize;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of times the render callback was invoked
    pub render_calls: u64,

    /// Self-paints served from an existing node bitmap
    pub hits: u64,

    /// Self-paints that had to populate the node bitmap first
    pub misses: u64,

    /// Nodes split into four children
    pub divisions: u64,

    /// Child sets collapsed back into their parent
    pub joins: u64,

    /// Bitmaps freed by the cleanup pass
    pub evictions: u64,

    /// Pixels freed by the cleanup pass
    pub pixels_evicted: u64,

    /// Bitmaps dropped because their region was damaged
    pub damaged: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
