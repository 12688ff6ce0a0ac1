use std::sync::Arc;

use quiver_common::ResourceUsage;

/// Kind of backing buffer attached to a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBufferType {
    /// Fixed-width slots only.
    Standard,
    /// Fixed-width slots plus a heap arena for long variable-length values.
    Heap,
}

/// Backing storage shared between shallow copies of a vector.
#[derive(Debug)]
pub(crate) struct VectorStorage {
    pub(crate) buffer_type: VectorBufferType,
    pub(crate) width: usize,
    pub(crate) data: Vec<u8>,
    /// One bit per slot, set when the slot is NULL.
    pub(crate) nulls: Vec<u64>,
    pub(crate) heap: Vec<u8>,
    pub(crate) capacity: usize,
    pub(crate) tail_index: usize,
    usage: Option<Arc<ResourceUsage>>,
    accounted: usize,
}

impl VectorStorage {
    pub(crate) fn new(
        buffer_type: VectorBufferType,
        width: usize,
        capacity: usize,
        usage: Option<Arc<ResourceUsage>>,
    ) -> Self {
        if let Some(u) = &usage {
            u.incr_object_count();
        }
        let mut storage = Self {
            buffer_type,
            width,
            data: vec![0; capacity * width],
            nulls: vec![0; bitmap_words(capacity)],
            heap: Vec::new(),
            capacity,
            tail_index: 0,
            usage,
            accounted: 0,
        };
        storage.account();
        storage
    }

    pub(crate) fn slot(&self, i: usize) -> &[u8] {
        &self.data[i * self.width..(i + 1) * self.width]
    }

    pub(crate) fn slot_mut(&mut self, i: usize) -> &mut [u8] {
        let w = self.width;
        &mut self.data[i * w..(i + 1) * w]
    }

    pub(crate) fn is_null(&self, i: usize) -> bool {
        self.nulls[i / 64] & (1u64 << (i % 64)) != 0
    }

    pub(crate) fn set_null(&mut self, i: usize, null: bool) {
        let mask = 1u64 << (i % 64);
        if null {
            self.nulls[i / 64] |= mask;
        } else {
            self.nulls[i / 64] &= !mask;
        }
    }

    /// Grows the fixed region and bitmap. Slot bytes, null bits and the heap
    /// arena are kept as they are.
    pub(crate) fn grow(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.data.resize(capacity * self.width, 0);
        self.nulls.resize(bitmap_words(capacity), 0);
        self.capacity = capacity;
        self.account();
    }

    /// Appends to the heap arena and returns the offset of the first byte.
    pub(crate) fn push_heap(&mut self, bytes: &[u8]) -> usize {
        let offset = self.heap.len();
        self.heap.extend_from_slice(bytes);
        self.account();
        offset
    }

    fn footprint(&self) -> usize {
        self.data.len() + self.nulls.len() * 8 + self.heap.len()
    }

    fn account(&mut self) {
        let Some(usage) = &self.usage else {
            return;
        };
        let now = self.footprint();
        if now > self.accounted {
            usage.incr_raw_memory(now - self.accounted);
        } else {
            usage.decr_raw_memory(self.accounted - now);
        }
        self.accounted = now;
    }
}

impl Drop for VectorStorage {
    fn drop(&mut self) {
        if let Some(u) = &self.usage {
            u.decr_object_count();
            u.decr_raw_memory(self.accounted);
        }
    }
}

fn bitmap_words(capacity: usize) -> usize {
    capacity.div_ceil(64)
}
