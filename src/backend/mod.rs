// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Backend Support
//!
//! One implementation of the primitive memory-operations contract per
//! accelerator family. Exactly one family is compiled in and exposed as
//! [`System`]; the host backend is always present because pinned staging,
//! host-only builds and tests need it.

use std::fmt;

use crate::error::BackendError;
use crate::space::Space;

pub mod host;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(all(feature = "metal", target_os = "macos"))]
pub mod metal;

#[cfg(all(feature = "cuda", feature = "metal"))]
compile_error!("features `cuda` and `metal` are mutually exclusive: select one accelerator backend");

#[cfg(all(feature = "metal", not(target_os = "macos")))]
compile_error!("feature `metal` requires macOS");

pub use host::HostBackend;

/// Active backend for this build.
#[cfg(feature = "cuda")]
pub type System = cuda::CudaBackend;

/// Active backend for this build.
#[cfg(all(feature = "metal", target_os = "macos", not(feature = "cuda")))]
pub type System = metal::MetalBackend;

/// Active backend for this build.
#[cfg(not(any(feature = "cuda", feature = "metal")))]
pub type System = HostBackend;

/// Accelerator families known to the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// No accelerator; device memory is host memory.
    Host,
    /// NVIDIA CUDA driver API
    Cuda,
    /// Apple Metal (macOS only)
    Metal,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "Host"),
            BackendKind::Cuda => write!(f, "CUDA"),
            BackendKind::Metal => write!(f, "Metal"),
        }
    }
}

/// Primitive memory operations of one backend family.
///
/// All functions are associated functions: a backend is identified by its
/// type, and any per-process runtime state (contexts, queues) lives behind
/// the implementation. Sizes are in bytes. Every error is treated as fatal
/// by the typed layer above.
pub trait Backend: Send + Sync + 'static {
    const KIND: BackendKind;

    /// Accelerator-resident space.
    type Device: Space;
    /// Managed (migrating) space.
    type Managed: Space;
    /// Page-locked host space.
    type Pinned: Space;

    fn allocate(nbytes: usize) -> Result<*mut u8, BackendError>;
    fn allocate_host(nbytes: usize) -> Result<*mut u8, BackendError>;
    fn allocate_managed(nbytes: usize) -> Result<*mut u8, BackendError>;

    /// # Safety
    /// `ptr` must come from [`Backend::allocate`] of this backend and not
    /// have been released.
    unsafe fn deallocate(ptr: *mut u8) -> Result<(), BackendError>;

    /// # Safety
    /// `ptr` must come from [`Backend::allocate_host`] of this backend.
    unsafe fn deallocate_host(ptr: *mut u8) -> Result<(), BackendError>;

    /// # Safety
    /// `ptr` must come from [`Backend::allocate_managed`] of this backend.
    unsafe fn deallocate_managed(ptr: *mut u8) -> Result<(), BackendError>;

    /// # Safety
    /// Both ranges must be valid host memory for `nbytes` bytes.
    unsafe fn copy_host_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>;

    /// # Safety
    /// `src` must be valid host memory and `dst` device memory of this
    /// backend, both for `nbytes` bytes.
    unsafe fn copy_host_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>;

    /// # Safety
    /// `src` must be device memory of this backend and `dst` valid host
    /// memory, both for `nbytes` bytes.
    unsafe fn copy_device_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>;

    /// # Safety
    /// Both ranges must be device memory of this backend for `nbytes` bytes.
    unsafe fn copy_device_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>;

    /// Enqueue a device-to-device copy without waiting for it.
    ///
    /// # Safety
    /// As [`Backend::copy_device_to_device`]; additionally both ranges must
    /// stay allocated until the next [`Backend::synchronize`].
    unsafe fn copy_device_to_device_async(
        src: *const u8,
        dst: *mut u8,
        nbytes: usize,
    ) -> Result<(), BackendError> {
        Self::copy_device_to_device(src, dst, nbytes)
    }

    /// Fill `nbytes` bytes of device memory with `value`.
    ///
    /// # Safety
    /// `dst` must be device memory of this backend for `nbytes` bytes.
    unsafe fn memset(dst: *mut u8, value: u8, nbytes: usize) -> Result<(), BackendError>;

    /// Block until all work previously issued to the default queue is done.
    fn synchronize() -> Result<(), BackendError>;
}

/// Device enumeration and selection.
///
/// Only accelerator backends implement this; the host backend does not, so
/// device control cannot be requested in a host-only build.
pub trait DeviceControl: Backend {
    fn device_count() -> Result<u32, BackendError>;
    fn device_select(id: u32) -> Result<(), BackendError>;
    fn device_get_current() -> Result<u32, BackendError>;
    fn device_identify(id: u32) -> Result<DeviceIdentity, BackendError>;
}

/// Packed physical identity of an accelerator.
///
/// Bits 0-7 hold the device id on its bus, bits 8-15 the bus id and bits
/// 16-31 the domain id. Stable across process restarts, so it can key
/// persisted per-device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(u32);

impl DeviceIdentity {
    /// Pack the three location fields; excess high bits are masked off.
    pub fn pack(domain: u32, bus: u32, device: u32) -> Self {
        let mut packed = 0u32;
        packed |= 0x0000_00FF & device;
        packed |= 0x0000_FF00 & (bus << 8);
        packed |= 0xFFFF_0000 & (domain << 16);
        Self(packed)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn device(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn bus(self) -> u8 {
        ((self.0 >> 8) & 0xFF) as u8
    }

    pub fn domain(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:02x}:{:02x}", self.domain(), self.bus(), self.device())
    }
}

/// Kind of the backend compiled into this build.
pub fn active() -> BackendKind {
    <System as Backend>::KIND
}
