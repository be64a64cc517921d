// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! CUDA backend over the driver API (`cudarc::driver::result`).
//!
//! The primary context of the selected device is retained once and made
//! current on the calling thread before every driver call. Asynchronous work
//! goes to the null stream, which `synchronize` drains.

use std::ffi::c_void;
use std::ptr;

use cudarc::driver::result;
use cudarc::driver::sys;
use cudarc::driver::DriverError;
use parking_lot::Mutex;

use super::{Backend, BackendKind, DeviceControl, DeviceIdentity};
use crate::error::BackendError;
use crate::space::{Cuda, CudaManaged, CudaPinned};

struct ContextState {
    ordinal: u32,
    context: sys::CUcontext,
}

// SAFETY: a primary context handle may be made current on any thread.
unsafe impl Send for ContextState {}

static CONTEXT: Mutex<Option<ContextState>> = Mutex::new(None);

fn driver_err(call: &'static str) -> impl FnOnce(DriverError) -> BackendError {
    move |err| BackendError::Runtime {
        backend: BackendKind::Cuda,
        call,
        code: err.0 as i32,
    }
}

fn open(ordinal: u32) -> Result<ContextState, BackendError> {
    result::init().map_err(driver_err("cuInit"))?;
    let count = result::device::get_count().map_err(driver_err("cuDeviceGetCount"))? as u32;
    if ordinal >= count {
        return Err(BackendError::InvalidDevice { id: ordinal, count });
    }
    let device = result::device::get(ordinal as i32).map_err(driver_err("cuDeviceGet"))?;
    // SAFETY: device is a valid handle returned by the driver.
    let context = unsafe { result::primary_ctx::retain(device) }
        .map_err(driver_err("cuDevicePrimaryCtxRetain"))?;
    tracing::debug!(ordinal, "retained CUDA primary context");
    Ok(ContextState { ordinal, context })
}

/// Make the selected device's context current, opening device 0 on first use.
fn bind() -> Result<(), BackendError> {
    let mut guard = CONTEXT.lock();
    if guard.is_none() {
        *guard = Some(open(0)?);
    }
    if let Some(state) = guard.as_ref() {
        // SAFETY: the context was retained and is never released.
        unsafe { result::ctx::set_current(state.context) }
            .map_err(driver_err("cuCtxSetCurrent"))?;
    }
    Ok(())
}

/// CUDA driver backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CudaBackend;

impl Backend for CudaBackend {
    const KIND: BackendKind = BackendKind::Cuda;

    type Device = Cuda;
    type Managed = CudaManaged;
    type Pinned = CudaPinned;

    // Zero-byte requests still get a distinct address; the driver rejects
    // empty allocations.
    fn allocate(nbytes: usize) -> Result<*mut u8, BackendError> {
        bind()?;
        // SAFETY: a context is current.
        let dptr = unsafe { result::malloc_sync(nbytes.max(1)) }.map_err(driver_err("cuMemAlloc"))?;
        Ok(dptr as usize as *mut u8)
    }

    fn allocate_host(nbytes: usize) -> Result<*mut u8, BackendError> {
        bind()?;
        // SAFETY: a context is current.
        let p = unsafe { result::malloc_host(nbytes.max(1), 0) }.map_err(driver_err("cuMemHostAlloc"))?;
        Ok(p as *mut u8)
    }

    fn allocate_managed(nbytes: usize) -> Result<*mut u8, BackendError> {
        bind()?;
        // SAFETY: a context is current.
        let dptr = unsafe {
            result::malloc_managed(nbytes.max(1), sys::CUmemAttach_flags::CU_MEM_ATTACH_GLOBAL)
        }
        .map_err(driver_err("cuMemAllocManaged"))?;
        Ok(dptr as usize as *mut u8)
    }

    unsafe fn deallocate(ptr: *mut u8) -> Result<(), BackendError> {
        bind()?;
        result::free_sync(ptr as usize as sys::CUdeviceptr).map_err(driver_err("cuMemFree"))
    }

    unsafe fn deallocate_host(ptr: *mut u8) -> Result<(), BackendError> {
        bind()?;
        result::free_host(ptr as *mut c_void).map_err(driver_err("cuMemFreeHost"))
    }

    unsafe fn deallocate_managed(ptr: *mut u8) -> Result<(), BackendError> {
        bind()?;
        result::free_sync(ptr as usize as sys::CUdeviceptr).map_err(driver_err("cuMemFree"))
    }

    unsafe fn copy_host_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        // Order behind device work that may still write the source.
        Self::synchronize()?;
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn copy_host_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        bind()?;
        let host = std::slice::from_raw_parts(src, nbytes);
        result::memcpy_htod_sync(dst as usize as sys::CUdeviceptr, host)
            .map_err(driver_err("cuMemcpyHtoD"))
    }

    unsafe fn copy_device_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        bind()?;
        let host = std::slice::from_raw_parts_mut(dst, nbytes);
        result::memcpy_dtoh_sync(host, src as usize as sys::CUdeviceptr)
            .map_err(driver_err("cuMemcpyDtoH"))
    }

    unsafe fn copy_device_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        bind()?;
        result::memcpy_dtod_sync(
            dst as usize as sys::CUdeviceptr,
            src as usize as sys::CUdeviceptr,
            nbytes,
        )
        .map_err(driver_err("cuMemcpyDtoD"))
    }

    unsafe fn copy_device_to_device_async(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        bind()?;
        result::memcpy_dtod_async(
            dst as usize as sys::CUdeviceptr,
            src as usize as sys::CUdeviceptr,
            nbytes,
            ptr::null_mut(),
        )
        .map_err(driver_err("cuMemcpyDtoDAsync"))
    }

    unsafe fn memset(dst: *mut u8, value: u8, nbytes: usize) -> Result<(), BackendError> {
        bind()?;
        result::memset_d8_sync(dst as usize as sys::CUdeviceptr, value, nbytes)
            .map_err(driver_err("cuMemsetD8"))
    }

    fn synchronize() -> Result<(), BackendError> {
        bind()?;
        result::ctx::synchronize().map_err(driver_err("cuCtxSynchronize"))
    }
}

impl DeviceControl for CudaBackend {
    fn device_count() -> Result<u32, BackendError> {
        result::init().map_err(driver_err("cuInit"))?;
        let count = result::device::get_count().map_err(driver_err("cuDeviceGetCount"))?;
        Ok(count as u32)
    }

    fn device_select(id: u32) -> Result<(), BackendError> {
        let mut guard = CONTEXT.lock();
        if guard.as_ref().map(|s| s.ordinal) != Some(id) {
            *guard = Some(open(id)?);
            tracing::debug!(device = id, "selected CUDA device");
        }
        drop(guard);
        bind()
    }

    fn device_get_current() -> Result<u32, BackendError> {
        bind()?;
        Ok(CONTEXT.lock().as_ref().map(|s| s.ordinal).unwrap_or(0))
    }

    fn device_identify(id: u32) -> Result<DeviceIdentity, BackendError> {
        let count = Self::device_count()?;
        if id >= count {
            return Err(BackendError::InvalidDevice { id, count });
        }
        let device = result::device::get(id as i32).map_err(driver_err("cuDeviceGet"))?;
        let attr = |attrib, call| {
            // SAFETY: device is a valid handle returned by the driver.
            unsafe { result::device::get_attribute(device, attrib) }.map_err(driver_err(call))
        };
        let pci_device = attr(
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DEVICE_ID,
            "cuDeviceGetAttribute(PCI_DEVICE_ID)",
        )?;
        let pci_bus = attr(
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_BUS_ID,
            "cuDeviceGetAttribute(PCI_BUS_ID)",
        )?;
        let pci_domain = attr(
            sys::CUdevice_attribute::CU_DEVICE_ATTRIBUTE_PCI_DOMAIN_ID,
            "cuDeviceGetAttribute(PCI_DOMAIN_ID)",
        )?;
        Ok(DeviceIdentity::pack(pci_domain as u32, pci_bus as u32, pci_device as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_keep_vendor_code() {
        let err = driver_err("cuMemAlloc")(DriverError(sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY));
        assert_eq!(err.code(), 2);
        assert!(err.to_string().contains("cuMemAlloc"));
    }
}
