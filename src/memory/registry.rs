// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Process-wide cache registry.
//!
//! Holds one (allocated set, free list) pair per (element type, allocator
//! type), created on first use and kept until process exit. Nothing here is
//! torn down implicitly: [`shutdown`] is the explicit hook that hands every
//! cached region back to its backend.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, VecDeque};

use parking_lot::Mutex;

/// Registry key: (element type, allocator type).
pub(crate) type CacheKey = (TypeId, TypeId);

/// Releases one cached region `(address, element count)` to its backend.
pub(crate) type ReleaseFn = unsafe fn(usize, usize);

/// Bookkeeping for one (element type, allocator type) pair.
pub(crate) struct CacheState {
    /// Regions owned by callers: address -> element count.
    pub(crate) allocated: HashMap<usize, usize>,
    /// Regions parked in the cache: element count -> addresses, oldest first.
    pub(crate) free: BTreeMap<usize, VecDeque<usize>>,
    release: ReleaseFn,
    label: &'static str,
}

impl CacheState {
    fn new(release: ReleaseFn, label: &'static str) -> Self {
        Self {
            allocated: HashMap::new(),
            free: BTreeMap::new(),
            release,
            label,
        }
    }

    /// Take the oldest cached region of exactly `count` elements.
    pub(crate) fn take_free(&mut self, count: usize) -> Option<usize> {
        let queue = self.free.get_mut(&count)?;
        let addr = queue.pop_front();
        if queue.is_empty() {
            self.free.remove(&count);
        }
        addr
    }

    pub(crate) fn put_free(&mut self, count: usize, addr: usize) {
        self.free.entry(count).or_default().push_back(addr);
    }

    pub(crate) fn is_cached(&self, addr: usize) -> bool {
        self.free.values().any(|q| q.contains(&addr))
    }

    /// Empty the free list, returning the drained records.
    pub(crate) fn drain_free(&mut self) -> Vec<(usize, usize)> {
        let free = std::mem::take(&mut self.free);
        free.into_iter()
            .flat_map(|(count, queue)| queue.into_iter().map(move |addr| (addr, count)))
            .collect()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let cached = self.free.values().map(VecDeque::len).sum();
        let cached_elements = self.free.iter().map(|(count, q)| count * q.len()).sum();
        CacheStats {
            in_use: self.allocated.len(),
            cached,
            cached_elements,
        }
    }
}

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Regions currently owned by callers.
    pub in_use: usize,
    /// Regions parked in the free list.
    pub cached: usize,
    /// Total elements held by parked regions.
    pub cached_elements: usize,
}

impl std::ops::Add for CacheStats {
    type Output = CacheStats;

    fn add(self, other: CacheStats) -> CacheStats {
        CacheStats {
            in_use: self.in_use + other.in_use,
            cached: self.cached + other.cached,
            cached_elements: self.cached_elements + other.cached_elements,
        }
    }
}

static REGISTRY: Mutex<BTreeMap<CacheKey, CacheState>> = Mutex::new(BTreeMap::new());

/// Run `f` on the state for `key`, creating it on first use.
pub(crate) fn with_state<R>(
    key: CacheKey,
    release: ReleaseFn,
    label: &'static str,
    f: impl FnOnce(&mut CacheState) -> R,
) -> R {
    let mut registry = REGISTRY.lock();
    let state = registry
        .entry(key)
        .or_insert_with(|| {
            tracing::debug!(allocator = label, "registered allocator cache");
            CacheState::new(release, label)
        });
    f(state)
}

/// Run `f` on the state for `key` if it exists.
pub(crate) fn peek<R>(key: CacheKey, f: impl FnOnce(&CacheState) -> R) -> Option<R> {
    REGISTRY.lock().get(&key).map(f)
}

/// Hand the drained records back to their backend.
///
/// Called without the registry lock held so that release paths may allocate
/// through other caches.
pub(crate) fn release_all(release: ReleaseFn, records: &[(usize, usize)]) {
    for &(addr, count) in records {
        // SAFETY: each record was produced by the allocator `release`
        // belongs to and was removed from the free list before this call.
        unsafe { release(addr, count) };
    }
}

/// Release every cached region of every allocator to its backend.
///
/// Regions still owned by callers are untouched. Returns the number of
/// regions released. Intended for controlled shutdown or before measuring
/// backend memory use; never called automatically.
pub fn shutdown() -> usize {
    let drained: Vec<(ReleaseFn, &'static str, Vec<(usize, usize)>)> = {
        let mut registry = REGISTRY.lock();
        registry
            .values_mut()
            .map(|state| (state.release, state.label, state.drain_free()))
            .collect()
    };

    let mut released = 0;
    for (release, label, records) in drained {
        if records.is_empty() {
            continue;
        }
        tracing::debug!(allocator = label, regions = records.len(), "releasing cached regions");
        release_all(release, &records);
        released += records.len();
    }
    released
}

/// Occupancy summed over every registered allocator cache.
pub fn totals() -> CacheStats {
    REGISTRY
        .lock()
        .values()
        .map(CacheState::stats)
        .fold(CacheStats::default(), |acc, s| acc + s)
}

/// Number of (element type, allocator type) pairs seen so far.
pub fn registered() -> usize {
    REGISTRY.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn forget(_addr: usize, _count: usize) {}

    #[test]
    fn free_list_is_fifo_per_size() {
        let mut state = CacheState::new(forget, "test");
        state.put_free(4, 0x100);
        state.put_free(4, 0x200);
        state.put_free(8, 0x300);
        assert_eq!(state.take_free(4), Some(0x100));
        assert_eq!(state.take_free(4), Some(0x200));
        assert_eq!(state.take_free(4), None);
        assert_eq!(state.take_free(8), Some(0x300));
        assert!(state.free.is_empty());
    }

    #[test]
    fn no_best_fit_across_sizes() {
        let mut state = CacheState::new(forget, "test");
        state.put_free(16, 0x100);
        assert_eq!(state.take_free(8), None);
        assert_eq!(state.take_free(32), None);
        assert!(state.is_cached(0x100));
    }

    #[test]
    fn drain_empties_only_free_list() {
        let mut state = CacheState::new(forget, "test");
        state.allocated.insert(0x900, 2);
        state.put_free(4, 0x100);
        state.put_free(4, 0x200);
        state.put_free(1, 0x300);
        let mut drained = state.drain_free();
        drained.sort();
        assert_eq!(drained, vec![(0x100, 4), (0x200, 4), (0x300, 1)]);
        assert!(state.free.is_empty());
        assert_eq!(state.allocated.len(), 1);
    }

    #[test]
    fn stats_count_regions_and_elements() {
        let mut state = CacheState::new(forget, "test");
        state.allocated.insert(0x900, 2);
        state.put_free(4, 0x100);
        state.put_free(4, 0x200);
        state.put_free(3, 0x300);
        assert_eq!(
            state.stats(),
            CacheStats { in_use: 1, cached: 3, cached_elements: 11 }
        );
    }
}
