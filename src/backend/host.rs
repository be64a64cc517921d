// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Host backend: device memory is ordinary heap memory.
//!
//! Serves host-only builds and provides the pageable/pinned staging
//! allocations of accelerator builds that have no page-locking API.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

use super::{Backend, BackendKind};
use crate::error::BackendError;
use crate::space::Host;

/// Alignment of every host allocation; covers any SIMD element type.
pub const HOST_ALIGN: usize = 64;

// The requested size is stored in front of the returned address so release
// needs only the pointer.
const HEADER: usize = HOST_ALIGN;

fn layout_for(nbytes: usize) -> Option<Layout> {
    let total = nbytes.checked_add(HEADER)?;
    Layout::from_size_align(total, HOST_ALIGN).ok()
}

/// Allocate `nbytes` of 64-byte aligned heap memory.
pub(crate) fn host_alloc(nbytes: usize) -> Result<*mut u8, BackendError> {
    let layout = layout_for(nbytes).ok_or(BackendError::HostAllocation { bytes: nbytes })?;
    // SAFETY: layout has non-zero size (HEADER > 0).
    let base = unsafe { alloc(layout) };
    if base.is_null() {
        return Err(BackendError::HostAllocation { bytes: nbytes });
    }
    // SAFETY: base is valid for HEADER bytes and aligned for usize.
    unsafe {
        (base as *mut usize).write(nbytes);
        Ok(base.add(HEADER))
    }
}

/// Release memory obtained from [`host_alloc`].
///
/// # Safety
/// `ptr` must come from [`host_alloc`] and not have been released.
pub(crate) unsafe fn host_free(ptr: *mut u8) -> Result<(), BackendError> {
    if ptr.is_null() {
        return Err(BackendError::UnknownAddress {
            backend: BackendKind::Host,
            addr: 0,
        });
    }
    let base = ptr.sub(HEADER);
    let nbytes = (base as *const usize).read();
    let layout = layout_for(nbytes).ok_or(BackendError::UnknownAddress {
        backend: BackendKind::Host,
        addr: ptr as usize,
    })?;
    dealloc(base, layout);
    Ok(())
}

/// Backend whose "device" is the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HostBackend;

impl Backend for HostBackend {
    const KIND: BackendKind = BackendKind::Host;

    type Device = Host;
    type Managed = Host;
    type Pinned = Host;

    fn allocate(nbytes: usize) -> Result<*mut u8, BackendError> {
        host_alloc(nbytes)
    }

    fn allocate_host(nbytes: usize) -> Result<*mut u8, BackendError> {
        host_alloc(nbytes)
    }

    fn allocate_managed(nbytes: usize) -> Result<*mut u8, BackendError> {
        host_alloc(nbytes)
    }

    unsafe fn deallocate(ptr: *mut u8) -> Result<(), BackendError> {
        host_free(ptr)
    }

    unsafe fn deallocate_host(ptr: *mut u8) -> Result<(), BackendError> {
        host_free(ptr)
    }

    unsafe fn deallocate_managed(ptr: *mut u8) -> Result<(), BackendError> {
        host_free(ptr)
    }

    unsafe fn copy_host_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn copy_host_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn copy_device_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn copy_device_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn memset(dst: *mut u8, value: u8, nbytes: usize) -> Result<(), BackendError> {
        ptr::write_bytes(dst, value, nbytes);
        Ok(())
    }

    fn synchronize() -> Result<(), BackendError> {
        // Host copies complete before returning.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_writable() {
        let p = HostBackend::allocate(100).unwrap();
        assert_eq!(p as usize % HOST_ALIGN, 0);
        unsafe {
            HostBackend::memset(p, 0xAB, 100).unwrap();
            assert_eq!(*p.add(99), 0xAB);
            HostBackend::deallocate(p).unwrap();
        }
    }

    #[test]
    fn zero_byte_allocations_are_distinct() {
        let a = HostBackend::allocate(0).unwrap();
        let b = HostBackend::allocate(0).unwrap();
        assert_ne!(a, b);
        unsafe {
            HostBackend::deallocate(a).unwrap();
            HostBackend::deallocate(b).unwrap();
        }
    }

    #[test]
    fn null_release_is_rejected() {
        let result = unsafe { HostBackend::deallocate(ptr::null_mut()) };
        assert!(matches!(result, Err(BackendError::UnknownAddress { addr: 0, .. })));
    }

    #[test]
    fn huge_request_fails_cleanly() {
        let result = HostBackend::allocate(usize::MAX);
        assert!(matches!(result, Err(BackendError::HostAllocation { .. })));
    }

    #[test]
    fn copies_move_bytes_in_every_direction() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        unsafe {
            HostBackend::copy_host_to_device(src.as_ptr(), dst.as_mut_ptr(), 4).unwrap();
        }
        assert_eq!(dst, src);
        let mut back = [0u8; 4];
        unsafe {
            HostBackend::copy_device_to_host(dst.as_ptr(), back.as_mut_ptr(), 4).unwrap();
        }
        assert_eq!(back, src);
        assert!(HostBackend::synchronize().is_ok());
    }
}
