//! Dense ID allocation with free-list reuse.
//!
//! Freed IDs are always handed out again, smallest first, before the peak
//! counter grows. Every peer frees and allocates in the same order, so the
//! same IDs come out everywhere.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Allocator for dense `u16` IDs bounded by a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    open: BTreeSet<u16>,
    peak: u32,
    capacity: u32,
}

impl IdAllocator {
    /// Create an allocator handing out IDs in `0..capacity`.
    ///
    /// Capacities above `u16::MAX + 1` are clamped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            open: BTreeSet::new(),
            peak: 0,
            capacity: capacity.min(usize::from(u16::MAX) + 1) as u32,
        }
    }

    /// Take the smallest freed ID, or grow the peak.
    ///
    /// Returns `None` when every ID below the capacity is in use.
    pub fn allocate(&mut self) -> Option<u16> {
        if let Some(id) = self.open.pop_first() {
            return Some(id);
        }
        if self.peak >= self.capacity {
            return None;
        }
        let id = self.peak as u16;
        self.peak += 1;
        Some(id)
    }

    /// Return an ID to the free-list. Releasing an unallocated ID is a no-op.
    pub fn release(&mut self, id: u16) {
        if u32::from(id) < self.peak {
            self.open.insert(id);
        }
    }

    /// One past the highest ID ever handed out.
    #[must_use]
    pub const fn peak(&self) -> u32 {
        self.peak
    }

    /// Maximum number of IDs.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Freed IDs waiting for reuse, ascending.
    #[must_use]
    pub fn open_ids(&self) -> Vec<u16> {
        self.open.iter().copied().collect()
    }

    /// Number of IDs currently in use.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.peak as usize - self.open.len()
    }

    /// Restore allocation state from a snapshot.
    pub fn restore(&mut self, peak: u32, open: &[u16]) {
        self.peak = peak.min(self.capacity);
        self.open = open
            .iter()
            .copied()
            .filter(|&id| u32::from(id) < self.peak)
            .collect();
    }

    /// Forget every allocation.
    pub fn clear(&mut self) {
        self.open.clear();
        self.peak = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_allocates_densely() {
        let mut ids = IdAllocator::new(8);
        assert_eq!(ids.allocate(), Some(0));
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(2));
        assert_eq!(ids.peak(), 3);
    }

    #[test]
    fn test_reuses_smallest_freed_first() {
        let mut ids = IdAllocator::new(8);
        for _ in 0..5 {
            ids.allocate();
        }
        ids.release(3);
        ids.release(1);
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(3));
        assert_eq!(ids.allocate(), Some(5));
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut ids = IdAllocator::new(2);
        assert!(ids.allocate().is_some());
        assert!(ids.allocate().is_some());
        assert_eq!(ids.allocate(), None);
        ids.release(0);
        assert_eq!(ids.allocate(), Some(0));
    }

    #[test]
    fn test_full_u16_range() {
        let mut ids = IdAllocator::new(70_000);
        assert_eq!(ids.capacity(), 65_536);
        ids.restore(65_535, &[]);
        assert_eq!(ids.allocate(), Some(u16::MAX));
        assert_eq!(ids.allocate(), None);
    }

    #[test]
    fn test_release_unallocated_is_noop() {
        let mut ids = IdAllocator::new(4);
        ids.release(2);
        assert!(ids.open_ids().is_empty());
        assert_eq!(ids.allocate(), Some(0));
    }

    #[test]
    fn test_restore_round_trip() {
        let mut ids = IdAllocator::new(16);
        for _ in 0..6 {
            ids.allocate();
        }
        ids.release(4);
        ids.release(2);

        let mut restored = IdAllocator::new(16);
        restored.restore(ids.peak(), &ids.open_ids());
        assert_eq!(restored, ids);
        assert_eq!(restored.in_use(), 4);
    }

    proptest! {
        #[test]
        fn prop_allocation_prefers_smallest_free(ops in prop::collection::vec(any::<Option<u8>>(), 1..200)) {
            let mut ids = IdAllocator::new(64);
            let mut live: BTreeSet<u16> = BTreeSet::new();

            for op in ops {
                match op {
                    Some(n) if !live.is_empty() => {
                        let victim = *live.iter().nth(usize::from(n) % live.len()).unwrap();
                        live.remove(&victim);
                        ids.release(victim);
                    }
                    _ => {
                        let expected = (0..ids.peak() as u16)
                            .find(|id| !live.contains(id))
                            .or_else(|| (ids.peak() < 64).then_some(ids.peak() as u16));
                        let got = ids.allocate();
                        prop_assert_eq!(got, expected);
                        if let Some(id) = got {
                            live.insert(id);
                        }
                    }
                }
            }
        }
    }
}
