//! Shared pixel accounting
//!
//! Every node bitmap adds its pixel count to a [`CacheState`] when it is
//! allocated and removes it when it is freed. The state is shared by `Arc`
//! between all nodes of one cache, and between caches linked with
//! `QuadTreeCache::constrain_size_with`, so several trees can draw from one
//! combined budget.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Pixel counter shared by every node of one or more quad-tree caches
#[derive(Debug, Default)]
pub struct CacheState {
    /// Total pixels held in node bitmaps
    cache_size: AtomicUsize,
}

impl CacheState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of cached pixels
    pub fn cache_size(&self) -> usize {
        self.cache_size.load(Ordering::Relaxed)
    }

    /// Number of pixels over `limit`, or 0 when within budget
    pub fn excess_over(&self, limit: usize) -> usize {
        self.cache_size().saturating_sub(limit)
    }

    /// Record a bitmap allocation
    pub(crate) fn record_allocation(&self, pixels: usize) {
        self.cache_size.fetch_add(pixels, Ordering::Relaxed);
    }

    /// Record a bitmap being freed
    pub(crate) fn record_deallocation(&self, pixels: usize) {
        let previous = self
            .cache_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(pixels))
            })
            .unwrap_or_default();

        debug_assert!(
            previous >= pixels,
            "cache size underflow: freeing {pixels} of {previous} pixels"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_allocation_tracking() {
        let state = CacheState::new();
        assert_eq!(state.cache_size(), 0);

        state.record_allocation(512 * 512);
        state.record_allocation(256 * 256);
        assert_eq!(state.cache_size(), 512 * 512 + 256 * 256);

        state.record_deallocation(512 * 512);
        assert_eq!(state.cache_size(), 256 * 256);
    }

    #[test]
    fn test_excess_over() {
        let state = CacheState::new();
        state.record_allocation(1000);

        assert_eq!(state.excess_over(400), 600);
        assert_eq!(state.excess_over(1000), 0);
        assert_eq!(state.excess_over(5000), 0);
    }

    #[test]
    fn test_shared_between_threads() {
        let state = Arc::new(CacheState::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..100 {
                        state.record_allocation(64);
                        state.record_deallocation(64);
                    }
                    state.record_allocation(10);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.cache_size(), 40);
    }
}
