// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Buffer handle backed by an [`Allocator`].
//!
//! Owns `len` elements in the allocator's space and hands them back to the
//! same allocator on drop. Device buffers go through the caching allocator
//! by default.
//!
//! Elements are plain data ([`Pod`]): any byte pattern is a valid value, so
//! fills and transfers can never produce an invalid `T`.

use std::fmt;

use bytemuck::Pod;

use super::allocator::{Allocator, DeviceAllocator, HostAllocator, ManagedAllocator};
use super::caching::CachingAllocator;
use crate::dispatch::{copy_with, memset_with, Fill, Route};
use crate::error::byte_len;
use crate::space::{Host, OnHost, Space};

/// Owned region of `len` elements in the space of allocator `A`.
pub struct Buffer<T: Pod, A: Allocator<T> = CachingAllocator<T, DeviceAllocator>> {
    ptr: *mut T,
    len: usize,
    allocator: A,
}

/// Device storage through the caching allocator of the active backend.
pub type DeviceBuffer<T> = Buffer<T, CachingAllocator<T, DeviceAllocator>>;

/// Managed storage of the active backend, uncached.
pub type ManagedBuffer<T> = Buffer<T, ManagedAllocator>;

/// Pageable host storage.
pub type HostBuffer<T> = Buffer<T, HostAllocator>;

type Loc<T, A> = <<A as Allocator<T>>::Space as Space>::Location;

impl<T: Pod, A: Allocator<T>> Buffer<T, A> {
    /// Zero-filled buffer of `len` elements from a default allocator.
    pub fn new(len: usize) -> Self
    where
        Loc<T, A>: Fill,
    {
        Self::new_in(len, A::default())
    }

    /// Zero-filled buffer of `len` elements from `allocator`.
    pub fn new_in(len: usize, allocator: A) -> Self
    where
        Loc<T, A>: Fill,
    {
        // SAFETY: every byte is written before the buffer is handed out.
        let mut buffer = unsafe { Self::new_uninit_in(len, allocator) };
        buffer.fill_bytes(0);
        buffer
    }

    /// Buffer of `len` elements whose contents are whatever the allocator
    /// returned, possibly a recycled region.
    ///
    /// # Safety
    /// Every element must be written before it is read.
    pub unsafe fn new_uninit(len: usize) -> Self {
        Self::new_uninit_in(len, A::default())
    }

    /// [`Buffer::new_uninit`] from `allocator`.
    ///
    /// # Safety
    /// As [`Buffer::new_uninit`].
    pub unsafe fn new_uninit_in(len: usize, allocator: A) -> Self {
        let ptr = allocator.allocate(len);
        Self { ptr, len, allocator }
    }

    /// Buffer holding a copy of `data`.
    pub fn from_host(data: &[T]) -> Self
    where
        OnHost: Route<Loc<T, A>>,
    {
        // SAFETY: copy_from_host overwrites all `len` elements.
        let mut buffer = unsafe { Self::new_uninit(data.len()) };
        buffer.copy_from_host(data);
        buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw address of the first element, in the allocator's space.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Overwrite the buffer with `src`.
    ///
    /// # Panics
    /// If `src.len()` differs from the buffer length.
    pub fn copy_from_host(&mut self, src: &[T])
    where
        OnHost: Route<Loc<T, A>>,
    {
        assert_eq!(src.len(), self.len, "source length does not match buffer length");
        // SAFETY: both ranges hold `len` elements in their declared spaces.
        unsafe { copy_with::<A::Backend, Host, A::Space, T>(src.as_ptr(), self.ptr, self.len) };
    }

    /// Copy the buffer into `dst`.
    ///
    /// # Panics
    /// If `dst.len()` differs from the buffer length.
    pub fn copy_to_host(&self, dst: &mut [T])
    where
        Loc<T, A>: Route<OnHost>,
    {
        assert_eq!(dst.len(), self.len, "destination length does not match buffer length");
        // SAFETY: both ranges hold `len` elements in their declared spaces.
        unsafe { copy_with::<A::Backend, A::Space, Host, T>(self.ptr, dst.as_mut_ptr(), self.len) };
    }

    /// Copy the contents of `other`, which may live in another space of the
    /// same backend.
    ///
    /// # Panics
    /// If the lengths differ.
    pub fn copy_from<B>(&mut self, other: &Buffer<T, B>)
    where
        B: Allocator<T, Backend = A::Backend>,
        Loc<T, B>: Route<Loc<T, A>>,
    {
        assert_eq!(other.len, self.len, "source length does not match buffer length");
        // SAFETY: both ranges hold `len` elements of the same backend.
        unsafe {
            copy_with::<A::Backend, B::Space, A::Space, T>(other.ptr, self.ptr, self.len)
        };
    }

    /// Host copy of the contents.
    pub fn to_vec(&self) -> Vec<T>
    where
        Loc<T, A>: Route<OnHost>,
    {
        let mut out = Vec::with_capacity(self.len);
        // SAFETY: capacity is len and copy_with initializes every element.
        unsafe {
            copy_with::<A::Backend, A::Space, Host, T>(self.ptr, out.as_mut_ptr(), self.len);
            out.set_len(self.len);
        }
        out
    }

    /// Set every byte of the buffer to `value`. Aborts if the byte length
    /// overflows `usize`.
    pub fn fill_bytes(&mut self, value: u8)
    where
        Loc<T, A>: Fill,
    {
        let nbytes = crate::check!(byte_len::<T>(self.len));
        // SAFETY: the region holds nbytes bytes in A::Space.
        unsafe { memset_with::<A::Backend, A::Space>(self.ptr as *mut u8, value, nbytes) };
    }
}

impl<T: Pod, A: Allocator<T>> Drop for Buffer<T, A> {
    fn drop(&mut self) {
        // SAFETY: ptr came from this allocator type with len elements.
        unsafe { self.allocator.deallocate(self.ptr, self.len) };
    }
}

impl<T: Pod, A: Allocator<T>> fmt::Debug for Buffer<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("space", &<A::Space as Space>::NAME)
            .field("len", &self.len)
            .field("ptr", &self.ptr)
            .finish()
    }
}

// Safety: the buffer exclusively owns its region; allocators are Send + Sync.
unsafe impl<T: Pod + Send, A: Allocator<T>> Send for Buffer<T, A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use crate::memory::allocator::PinnedAllocator;

    type SimBuffer<T> = Buffer<T, CachingAllocator<T, DeviceAllocator<HostBackend>>>;

    #[test]
    fn from_host_round_trips() {
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
        struct Sample(i16);
        let data: Vec<Sample> = (0..32).map(Sample).collect();
        let buffer = SimBuffer::from_host(&data);
        assert_eq!(buffer.len(), 32);
        assert_eq!(buffer.to_vec(), data);
    }

    #[test]
    fn drop_parks_region_in_cache() {
        #[repr(transparent)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Sample(u8);
        let ptr = {
            let buffer = SimBuffer::<Sample>::new(48);
            assert!(buffer.allocator().owns(buffer.as_ptr()));
            buffer.as_ptr()
        };
        let alloc = CachingAllocator::<Sample, DeviceAllocator<HostBackend>>::default();
        assert!(alloc.is_cached(ptr));
        let again = SimBuffer::<Sample>::new(48);
        assert_eq!(again.as_ptr(), ptr);
    }

    #[test]
    fn new_zeroes_a_recycled_region() {
        #[repr(transparent)]
        #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
        struct Sample(u32);
        let first = {
            let mut dirty = SimBuffer::<Sample>::new(16);
            dirty.fill_bytes(0xFF);
            assert_eq!(dirty.to_vec()[15], Sample(u32::MAX));
            dirty.as_ptr()
        };
        let clean = SimBuffer::<Sample>::new(16);
        assert_eq!(clean.as_ptr(), first);
        assert_eq!(clean.to_vec(), vec![Sample(0); 16]);
    }

    #[test]
    fn uninit_buffer_is_usable_once_written() {
        let mut buffer = unsafe { HostBuffer::<f32>::new_uninit(3) };
        buffer.copy_from_host(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn copy_between_spaces_of_one_backend() {
        let src = Buffer::<u32, PinnedAllocator<HostBackend>>::from_host(&[5, 6, 7]);
        let mut dst = Buffer::<u32, DeviceAllocator<HostBackend>>::new(3);
        dst.copy_from(&src);
        let mut out = [0u32; 3];
        dst.copy_to_host(&mut out);
        assert_eq!(out, [5, 6, 7]);
    }

    #[test]
    fn fill_bytes_sets_every_byte() {
        let mut buffer = HostBuffer::<u16>::new(4);
        assert_eq!(buffer.to_vec(), vec![0u16; 4]);
        buffer.fill_bytes(0x01);
        assert_eq!(buffer.to_vec(), vec![0x0101u16; 4]);
    }

    #[test]
    fn empty_buffer_is_valid() {
        let buffer = HostBuffer::<f64>::from_host(&[]);
        assert!(buffer.is_empty());
        assert!(buffer.to_vec().is_empty());
        assert!(HostBuffer::<f64>::new(0).is_empty());
    }

    #[test]
    #[should_panic(expected = "source length does not match")]
    fn length_mismatch_panics() {
        let mut buffer = HostBuffer::<u8>::new(2);
        buffer.copy_from_host(&[1, 2, 3]);
    }

    #[test]
    fn debug_reports_space_and_len() {
        let buffer = HostBuffer::<u8>::new(3);
        let text = format!("{:?}", buffer);
        assert!(text.contains("host"));
        assert!(text.contains("len: 3"));
    }
}
