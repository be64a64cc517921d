// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Metal backend (macOS).
//!
//! Device allocations are shared-storage `MTLBuffer`s tracked by their
//! contents address, so the rest of the crate can keep treating device
//! memory as plain addresses. Device-side copies and fills are encoded on a
//! single command queue; host-visible copies wait for that queue first.

use std::collections::BTreeMap;
use std::ptr;

use metal::{Buffer, BufferRef, CommandQueue, Device, MTLResourceOptions, NSRange};
use parking_lot::Mutex;

use super::host::{host_alloc, host_free};
use super::{Backend, BackendKind, DeviceControl, DeviceIdentity};
use crate::error::BackendError;
use crate::space::{Metal, MetalPinned, MetalShared};

struct MetalState {
    ordinal: u32,
    device: Device,
    queue: CommandQueue,
    buffers: BTreeMap<usize, Buffer>,
}

// SAFETY: Metal device, queue and buffer objects are thread-safe.
unsafe impl Send for MetalState {}

static STATE: Mutex<Option<MetalState>> = Mutex::new(None);

fn open(ordinal: u32) -> Result<MetalState, BackendError> {
    let devices = Device::all();
    let count = devices.len() as u32;
    if count == 0 {
        return Err(BackendError::NoDevice(BackendKind::Metal));
    }
    let device = devices
        .into_iter()
        .nth(ordinal as usize)
        .ok_or(BackendError::InvalidDevice { id: ordinal, count })?;
    let queue = device.new_command_queue();
    tracing::debug!(ordinal, name = device.name(), "opened Metal device");
    Ok(MetalState {
        ordinal,
        device,
        queue,
        buffers: BTreeMap::new(),
    })
}

fn with_state<R>(f: impl FnOnce(&mut MetalState) -> Result<R, BackendError>) -> Result<R, BackendError> {
    let mut guard = STATE.lock();
    if guard.is_none() {
        *guard = Some(open(0)?);
    }
    match guard.as_mut() {
        Some(state) => f(state),
        None => Err(BackendError::NoDevice(BackendKind::Metal)),
    }
}

/// Buffer containing `addr`, and the offset of `addr` inside it.
fn locate(buffers: &BTreeMap<usize, Buffer>, addr: usize) -> Result<(&BufferRef, u64), BackendError> {
    match buffers.range(..=addr).next_back() {
        Some((&base, buffer)) if addr - base < buffer.length() as usize => {
            Ok((&**buffer, (addr - base) as u64))
        }
        _ => Err(BackendError::UnknownAddress {
            backend: BackendKind::Metal,
            addr,
        }),
    }
}

fn drain(queue: &CommandQueue) {
    let command_buffer = queue.new_command_buffer();
    command_buffer.commit();
    command_buffer.wait_until_completed();
}

fn new_shared_buffer(nbytes: usize) -> Result<*mut u8, BackendError> {
    with_state(|state| {
        // Zero-length buffers are rejected by Metal.
        let length = nbytes.max(1) as u64;
        let buffer = state
            .device
            .new_buffer(length, MTLResourceOptions::StorageModeShared);
        let addr = buffer.contents() as usize;
        if addr == 0 {
            return Err(BackendError::Runtime {
                backend: BackendKind::Metal,
                call: "newBufferWithLength",
                code: -1,
            });
        }
        state.buffers.insert(addr, buffer);
        Ok(addr as *mut u8)
    })
}

fn release_shared_buffer(ptr: *mut u8) -> Result<(), BackendError> {
    with_state(|state| match state.buffers.remove(&(ptr as usize)) {
        Some(_) => Ok(()),
        None => Err(BackendError::UnknownAddress {
            backend: BackendKind::Metal,
            addr: ptr as usize,
        }),
    })
}

/// Metal backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MetalBackend;

impl Backend for MetalBackend {
    const KIND: BackendKind = BackendKind::Metal;

    type Device = Metal;
    type Managed = MetalShared;
    type Pinned = MetalPinned;

    fn allocate(nbytes: usize) -> Result<*mut u8, BackendError> {
        new_shared_buffer(nbytes)
    }

    fn allocate_host(nbytes: usize) -> Result<*mut u8, BackendError> {
        host_alloc(nbytes)
    }

    fn allocate_managed(nbytes: usize) -> Result<*mut u8, BackendError> {
        new_shared_buffer(nbytes)
    }

    unsafe fn deallocate(ptr: *mut u8) -> Result<(), BackendError> {
        release_shared_buffer(ptr)
    }

    unsafe fn deallocate_host(ptr: *mut u8) -> Result<(), BackendError> {
        host_free(ptr)
    }

    unsafe fn deallocate_managed(ptr: *mut u8) -> Result<(), BackendError> {
        release_shared_buffer(ptr)
    }

    unsafe fn copy_host_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        Self::synchronize()?;
        ptr::copy(src, dst, nbytes);
        Ok(())
    }

    unsafe fn copy_host_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        with_state(|state| {
            locate(&state.buffers, dst as usize)?;
            drain(&state.queue);
            ptr::copy(src, dst, nbytes);
            Ok(())
        })
    }

    unsafe fn copy_device_to_host(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        with_state(|state| {
            locate(&state.buffers, src as usize)?;
            drain(&state.queue);
            ptr::copy(src, dst, nbytes);
            Ok(())
        })
    }

    unsafe fn copy_device_to_device(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        Self::copy_device_to_device_async(src, dst, nbytes)?;
        Self::synchronize()
    }

    unsafe fn copy_device_to_device_async(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        if nbytes == 0 {
            return Ok(());
        }
        with_state(|state| {
            let (src_buf, src_off) = locate(&state.buffers, src as usize)?;
            let (dst_buf, dst_off) = locate(&state.buffers, dst as usize)?;
            let command_buffer = state.queue.new_command_buffer();
            let blit = command_buffer.new_blit_command_encoder();
            blit.copy_from_buffer(src_buf, src_off, dst_buf, dst_off, nbytes as u64);
            blit.end_encoding();
            command_buffer.commit();
            Ok(())
        })
    }

    unsafe fn memset(dst: *mut u8, value: u8, nbytes: usize) -> Result<(), BackendError> {
        if nbytes == 0 {
            return Ok(());
        }
        with_state(|state| {
            let (buffer, offset) = locate(&state.buffers, dst as usize)?;
            let command_buffer = state.queue.new_command_buffer();
            let blit = command_buffer.new_blit_command_encoder();
            blit.fill_buffer(buffer, NSRange::new(offset, nbytes as u64), value);
            blit.end_encoding();
            command_buffer.commit();
            Ok(())
        })
    }

    fn synchronize() -> Result<(), BackendError> {
        with_state(|state| {
            drain(&state.queue);
            Ok(())
        })
    }
}

impl DeviceControl for MetalBackend {
    fn device_count() -> Result<u32, BackendError> {
        Ok(Device::all().len() as u32)
    }

    fn device_select(id: u32) -> Result<(), BackendError> {
        let mut guard = STATE.lock();
        if guard.as_ref().map(|s| s.ordinal) == Some(id) {
            return Ok(());
        }
        let mut next = open(id)?;
        if let Some(previous) = guard.take() {
            if !previous.buffers.is_empty() {
                tracing::warn!(
                    outstanding = previous.buffers.len(),
                    "switching Metal device with live buffers"
                );
            }
            drain(&previous.queue);
            next.buffers = previous.buffers;
        }
        *guard = Some(next);
        tracing::debug!(device = id, "selected Metal device");
        Ok(())
    }

    fn device_get_current() -> Result<u32, BackendError> {
        with_state(|state| Ok(state.ordinal))
    }

    fn device_identify(id: u32) -> Result<DeviceIdentity, BackendError> {
        let devices = Device::all();
        let count = devices.len() as u32;
        let device = devices
            .get(id as usize)
            .ok_or(BackendError::InvalidDevice { id, count })?;
        // No PCI location on Apple GPUs: the registry id stands in for bus
        // and domain.
        let registry = device.registry_id();
        Ok(DeviceIdentity::pack(
            ((registry >> 8) & 0xFFFF) as u32,
            (registry & 0xFF) as u32,
            id,
        ))
    }
}
