// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Allocator trait and the per-backend allocators (device, managed, pinned,
//! host).
//!
//! These are thin typed wrappers over [`Backend`] primitives: counts are in
//! elements, failures abort the process.

use std::fmt;
use std::marker::PhantomData;

use crate::backend::{Backend, HostBackend, System};
use crate::error::byte_len;
use crate::space::{Host, Space};

/// Typed allocator over one backend.
///
/// Allocators are stateless values: every instance of the same type hands
/// out and accepts the same memory, so any instance may release what another
/// produced.
pub trait Allocator<T>: Default + Send + Sync + 'static {
    /// Backend that owns the memory.
    type Backend: Backend;
    /// Space the returned addresses live in.
    type Space: Space;

    /// Allocate room for `n` elements. Aborts on backend failure.
    fn allocate(&self, n: usize) -> *mut T;

    /// Release `ptr`, which held `n` elements.
    ///
    /// # Safety
    /// `ptr` must come from `allocate` of this allocator type and not have
    /// been released.
    unsafe fn deallocate(&self, ptr: *mut T, n: usize);
}

/// Accelerator-resident memory of backend `B`.
pub struct DeviceAllocator<B = System>(PhantomData<fn() -> B>);

/// Managed memory of backend `B`.
pub struct ManagedAllocator<B = System>(PhantomData<fn() -> B>);

/// Page-locked host memory of backend `B`.
pub struct PinnedAllocator<B = System>(PhantomData<fn() -> B>);

/// Pageable host memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostAllocator;

impl<B: Backend> DeviceAllocator<B> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B: Backend> ManagedAllocator<B> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B: Backend> PinnedAllocator<B> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<B: Backend> Default for DeviceAllocator<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Default for ManagedAllocator<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Default for PinnedAllocator<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for DeviceAllocator<B> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for ManagedAllocator<B> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<B: Backend> Clone for PinnedAllocator<B> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<B: Backend> fmt::Debug for DeviceAllocator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAllocator<{}>", B::KIND)
    }
}

impl<B: Backend> fmt::Debug for ManagedAllocator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManagedAllocator<{}>", B::KIND)
    }
}

impl<B: Backend> fmt::Debug for PinnedAllocator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PinnedAllocator<{}>", B::KIND)
    }
}

impl<T: 'static, B: Backend> Allocator<T> for DeviceAllocator<B> {
    type Backend = B;
    type Space = B::Device;

    fn allocate(&self, n: usize) -> *mut T {
        let nbytes = crate::check!(byte_len::<T>(n));
        crate::check!(B::allocate(nbytes)) as *mut T
    }

    unsafe fn deallocate(&self, ptr: *mut T, _n: usize) {
        crate::check!(B::deallocate(ptr as *mut u8));
    }
}

impl<T: 'static, B: Backend> Allocator<T> for ManagedAllocator<B> {
    type Backend = B;
    type Space = B::Managed;

    fn allocate(&self, n: usize) -> *mut T {
        let nbytes = crate::check!(byte_len::<T>(n));
        crate::check!(B::allocate_managed(nbytes)) as *mut T
    }

    unsafe fn deallocate(&self, ptr: *mut T, _n: usize) {
        crate::check!(B::deallocate_managed(ptr as *mut u8));
    }
}

impl<T: 'static, B: Backend> Allocator<T> for PinnedAllocator<B> {
    type Backend = B;
    type Space = B::Pinned;

    fn allocate(&self, n: usize) -> *mut T {
        let nbytes = crate::check!(byte_len::<T>(n));
        crate::check!(B::allocate_host(nbytes)) as *mut T
    }

    unsafe fn deallocate(&self, ptr: *mut T, _n: usize) {
        crate::check!(B::deallocate_host(ptr as *mut u8));
    }
}

impl<T: 'static> Allocator<T> for HostAllocator {
    type Backend = HostBackend;
    type Space = Host;

    fn allocate(&self, n: usize) -> *mut T {
        let nbytes = crate::check!(byte_len::<T>(n));
        crate::check!(HostBackend::allocate_host(nbytes)) as *mut T
    }

    unsafe fn deallocate(&self, ptr: *mut T, _n: usize) {
        crate::check!(HostBackend::deallocate_host(ptr as *mut u8));
    }
}
