//! Injectable resource-usage counters.
//!
//! Allocation sites that want to be observable take an `Arc<ResourceUsage>`
//! and report object and raw-memory lifetimes to it. Each engine (and each
//! test) owns its own instance, so counts never leak between runs.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ResourceUsage {
    object_count: AtomicI64,
    raw_memory_count: AtomicI64,
}

impl ResourceUsage {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr_object_count(&self) {
        self.object_count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decr_object_count(&self) {
        self.object_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Live objects. Goes negative when decrements outnumber increments.
    pub fn object_count(&self) -> i64 {
        self.object_count.load(Ordering::Acquire)
    }

    pub fn incr_raw_memory(&self, bytes: usize) {
        self.raw_memory_count
            .fetch_add(bytes as i64, Ordering::AcqRel);
    }

    pub fn decr_raw_memory(&self, bytes: usize) {
        self.raw_memory_count
            .fetch_sub(bytes as i64, Ordering::AcqRel);
    }

    /// Raw bytes currently attributed to live allocations.
    pub fn raw_memory_count(&self) -> i64 {
        self.raw_memory_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceUsage;

    #[test]
    fn object_count_tracks_increments_and_decrements() {
        let usage = ResourceUsage::new();
        usage.incr_object_count();
        assert_eq!(usage.object_count(), 1);
        usage.incr_object_count();
        assert_eq!(usage.object_count(), 2);
        usage.decr_object_count();
        usage.decr_object_count();
        assert_eq!(usage.object_count(), 0);
        usage.decr_object_count();
        assert_eq!(usage.object_count(), -1);
        usage.incr_object_count();
        assert_eq!(usage.object_count(), 0);
    }

    #[test]
    fn raw_memory_counts_bytes() {
        let usage = ResourceUsage::new();
        usage.incr_raw_memory(128);
        usage.incr_raw_memory(64);
        assert_eq!(usage.raw_memory_count(), 192);
        usage.decr_raw_memory(192);
        assert_eq!(usage.raw_memory_count(), 0);
    }

    #[test]
    fn instances_do_not_share_state() {
        let a = ResourceUsage::new();
        let b = ResourceUsage::new();
        a.incr_object_count();
        assert_eq!(a.object_count(), 1);
        assert_eq!(b.object_count(), 0);
    }
}
