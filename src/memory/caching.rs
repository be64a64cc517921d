// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Caching allocator.
//!
//! Wraps a backend allocator and parks released regions in a free list keyed
//! by exact element count, so repeated same-size requests skip the backend.
//! State is shared process-wide by every instance with the same element and
//! allocator types (see [`registry`](super::registry)).
//!
//! Release synchronizes the backend before parking a region: an
//! asynchronous copy still in flight may not touch memory a later caller has
//! already been handed.

use std::any::{type_name, TypeId};
use std::fmt;
use std::marker::PhantomData;

use super::allocator::{Allocator, DeviceAllocator};
use super::registry::{self, CacheKey, CacheStats};
use crate::backend::System;
use crate::dispatch::{synchronize, synchronize_with};
use crate::error::{fatal, InvariantViolation};

/// Allocator that reuses exact-size released regions before asking the
/// backend.
pub struct CachingAllocator<T, A = DeviceAllocator> {
    inner: A,
    _element: PhantomData<fn() -> T>,
}

impl<T: 'static, A: Allocator<T>> CachingAllocator<T, A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            _element: PhantomData,
        }
    }

    /// Wrapped backend allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    fn key() -> CacheKey {
        (TypeId::of::<T>(), TypeId::of::<A>())
    }

    fn label() -> &'static str {
        type_name::<A>()
    }

    unsafe fn release(addr: usize, count: usize) {
        A::default().deallocate(addr as *mut T, count)
    }

    fn with_state<R>(f: impl FnOnce(&mut registry::CacheState) -> R) -> R {
        registry::with_state(Self::key(), Self::release, Self::label(), f)
    }

    /// Allocate `n` elements, reusing a cached region of exactly `n`.
    pub fn allocate(&self, n: usize) -> *mut T {
        let reused = Self::with_state(|state| {
            let addr = state.take_free(n)?;
            state.allocated.insert(addr, n);
            Some(addr)
        });
        if let Some(addr) = reused {
            tracing::trace!(allocator = Self::label(), n, addr, "cache hit");
            return addr as *mut T;
        }

        let ptr = self.inner.allocate(n);
        tracing::trace!(allocator = Self::label(), n, addr = ptr as usize, "cache miss");
        Self::with_state(|state| {
            let previous = state.allocated.insert(ptr as usize, n);
            debug_assert!(previous.is_none(), "backend returned a live address");
        });
        ptr
    }

    /// Return `ptr` to the cache.
    ///
    /// The region is filed under the count it was allocated with. An
    /// address this allocator does not own aborts the process.
    ///
    /// # Safety
    /// No reference into the region may be used after this call.
    pub unsafe fn deallocate(&self, ptr: *mut T, n: usize) {
        synchronize();
        if TypeId::of::<A::Backend>() != TypeId::of::<System>() {
            synchronize_with::<A::Backend>();
        }

        let addr = ptr as usize;
        let owned = Self::with_state(|state| {
            let count = state.allocated.remove(&addr)?;
            state.put_free(count, addr);
            Some(count)
        });
        match owned {
            Some(count) if count != n => {
                tracing::warn!(
                    allocator = Self::label(),
                    addr,
                    allocated = count,
                    released = n,
                    "deallocate count differs from allocation; cached under original count"
                );
            }
            Some(_) => {}
            None => {
                let err = InvariantViolation::UnknownAddress { addr, count: n };
                fatal(&err, -1, file!(), line!());
            }
        }
    }

    /// Release every cached region of this pair to the backend.
    ///
    /// Regions still owned by callers are untouched. Returns the number of
    /// regions released.
    pub fn clear_cache(&self) -> usize {
        let records = Self::with_state(|state| state.drain_free());
        if !records.is_empty() {
            tracing::debug!(
                allocator = Self::label(),
                regions = records.len(),
                "clearing allocator cache"
            );
        }
        registry::release_all(Self::release, &records);
        records.len()
    }

    /// Occupancy of this pair's cache.
    pub fn stats(&self) -> CacheStats {
        registry::peek(Self::key(), |state| state.stats()).unwrap_or_default()
    }

    /// True if `ptr` is currently owned by a caller of this pair.
    pub fn owns(&self, ptr: *const T) -> bool {
        registry::peek(Self::key(), |state| state.allocated.contains_key(&(ptr as usize)))
            .unwrap_or(false)
    }

    /// True if `ptr` is parked in this pair's free list.
    pub fn is_cached(&self, ptr: *const T) -> bool {
        registry::peek(Self::key(), |state| state.is_cached(ptr as usize)).unwrap_or(false)
    }
}

impl<T: 'static, A: Allocator<T>> Allocator<T> for CachingAllocator<T, A> {
    type Backend = A::Backend;
    type Space = A::Space;

    fn allocate(&self, n: usize) -> *mut T {
        CachingAllocator::allocate(self, n)
    }

    unsafe fn deallocate(&self, ptr: *mut T, n: usize) {
        CachingAllocator::deallocate(self, ptr, n)
    }
}

impl<T: 'static, A: Allocator<T>> Default for CachingAllocator<T, A> {
    fn default() -> Self {
        Self::new(A::default())
    }
}

impl<T, A: Clone> Clone for CachingAllocator<T, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _element: PhantomData,
        }
    }
}

impl<T, A: fmt::Debug> fmt::Debug for CachingAllocator<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingAllocator")
            .field("element", &type_name::<T>())
            .field("inner", &self.inner)
            .finish()
    }
}

/// Equal iff both wrap the same allocator type for the same element type:
/// such instances share one cache, so either may release what the other
/// allocated.
impl<T, U, A, B> PartialEq<CachingAllocator<U, B>> for CachingAllocator<T, A>
where
    T: 'static,
    U: 'static,
    A: 'static,
    B: 'static,
{
    fn eq(&self, _other: &CachingAllocator<U, B>) -> bool {
        TypeId::of::<T>() == TypeId::of::<U>() && TypeId::of::<A>() == TypeId::of::<B>()
    }
}

impl<T: 'static, A: 'static> Eq for CachingAllocator<T, A> {}

#[cfg(test)]
#[path = "caching_tests.rs"]
mod tests;
