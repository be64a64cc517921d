// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Copy dispatch and the synchronization facade.
//!
//! The transfer direction of a copy is picked from the static
//! [`Location`](crate::space::Location) of the source and destination spaces;
//! there is no runtime comparison of space tags. Every backend failure
//! reaching this layer aborts the process (see [`check!`](crate::check)).

use std::ptr;

use crate::backend::{Backend, DeviceControl, DeviceIdentity, System};
use crate::error::{byte_len, BackendError};
use crate::pointer::PointerLike;
use crate::space::{Location, OnDevice, OnHost, Space};

/// Backend copy primitive for a (source, destination) location pair.
///
/// Implemented for exactly the four pairs of [`OnHost`] and [`OnDevice`].
pub trait Route<Dst: Location>: Location {
    /// # Safety
    /// Both ranges must be valid for `nbytes` bytes in their locations.
    unsafe fn transfer<B: Backend>(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>;
}

impl Route<OnHost> for OnHost {
    unsafe fn transfer<B: Backend>(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        B::copy_host_to_host(src, dst, nbytes)
    }
}

impl Route<OnDevice> for OnHost {
    unsafe fn transfer<B: Backend>(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        B::copy_host_to_device(src, dst, nbytes)
    }
}

impl Route<OnHost> for OnDevice {
    unsafe fn transfer<B: Backend>(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        B::copy_device_to_host(src, dst, nbytes)
    }
}

impl Route<OnDevice> for OnDevice {
    unsafe fn transfer<B: Backend>(src: *const u8, dst: *mut u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        B::copy_device_to_device(src, dst, nbytes)
    }
}

/// Byte fill for a location.
pub trait Fill: Location {
    /// # Safety
    /// `dst` must be valid for `nbytes` bytes in this location.
    unsafe fn fill<B: Backend>(dst: *mut u8, value: u8, nbytes: usize)
        -> Result<(), BackendError>;
}

impl Fill for OnHost {
    unsafe fn fill<B: Backend>(dst: *mut u8, value: u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        ptr::write_bytes(dst, value, nbytes);
        Ok(())
    }
}

impl Fill for OnDevice {
    unsafe fn fill<B: Backend>(dst: *mut u8, value: u8, nbytes: usize)
        -> Result<(), BackendError>
    {
        B::memset(dst, value, nbytes)
    }
}

/// Copy `count` elements from space `S` to space `D` on the active backend.
///
/// # Safety
/// `src` must be valid for `count` reads in `S`, `dst` for `count` writes in
/// `D`, and the spaces must match where the memory actually lives.
pub unsafe fn copy<S, D, T>(src: *const T, dst: *mut T, count: usize)
where
    S: Space,
    D: Space,
    T: Copy,
    S::Location: Route<D::Location>,
{
    copy_with::<System, S, D, T>(src, dst, count)
}

/// [`copy`] on an explicit backend.
///
/// # Safety
/// As [`copy`], with the device ranges owned by `B`.
pub unsafe fn copy_with<B, S, D, T>(src: *const T, dst: *mut T, count: usize)
where
    B: Backend,
    S: Space,
    D: Space,
    T: Copy,
    S::Location: Route<D::Location>,
{
    if count == 0 {
        return;
    }
    let nbytes = crate::check!(byte_len::<T>(count));
    crate::check!(<S::Location as Route<D::Location>>::transfer::<B>(
        src as *const u8,
        dst as *mut u8,
        nbytes,
    ));
}

/// Copy between two pointer-like handles; spaces come from their
/// descriptions.
///
/// # Safety
/// As [`copy`].
pub unsafe fn copy_n<P, Q>(src: P, dst: Q, count: usize)
where
    P: PointerLike,
    Q: PointerLike<Element = P::Element>,
    P::Element: Copy,
    <P::Space as Space>::Location: Route<<Q::Space as Space>::Location>,
{
    copy::<P::Space, Q::Space, P::Element>(src.address(), dst.address(), count)
}

/// Enqueue a device-to-device copy on the active backend without waiting.
///
/// # Safety
/// Both ranges must be device memory valid for `count` elements until the
/// next [`synchronize`].
pub unsafe fn copy_device_async<T: Copy>(src: *const T, dst: *mut T, count: usize) {
    if count == 0 {
        return;
    }
    let nbytes = crate::check!(byte_len::<T>(count));
    crate::check!(System::copy_device_to_device_async(
        src as *const u8,
        dst as *mut u8,
        nbytes,
    ));
}

/// Fill `nbytes` bytes in space `S` with `value` on the active backend.
///
/// # Safety
/// `dst` must be valid for `nbytes` bytes in `S`.
pub unsafe fn memset<S: Space>(dst: *mut u8, value: u8, nbytes: usize)
where
    S::Location: Fill,
{
    memset_with::<System, S>(dst, value, nbytes)
}

/// [`memset`] on an explicit backend.
///
/// # Safety
/// As [`memset`].
pub unsafe fn memset_with<B: Backend, S: Space>(dst: *mut u8, value: u8, nbytes: usize)
where
    S::Location: Fill,
{
    if nbytes == 0 {
        return;
    }
    crate::check!(<S::Location as Fill>::fill::<B>(dst, value, nbytes));
}

/// Block until all asynchronous work on the active backend is complete.
pub fn synchronize() {
    synchronize_with::<System>();
}

/// [`synchronize`] on an explicit backend.
pub fn synchronize_with<B: Backend>() {
    crate::check!(B::synchronize());
}

/// Number of accelerators visible to backend `B`.
pub fn device_count_on<B: DeviceControl>() -> u32 {
    crate::check!(B::device_count())
}

/// Make device `id` current for backend `B`.
pub fn device_select_on<B: DeviceControl>(id: u32) {
    crate::check!(B::device_select(id));
}

/// Current device of backend `B`.
pub fn device_get_current_on<B: DeviceControl>() -> u32 {
    crate::check!(B::device_get_current())
}

/// Packed physical identity of device `id` of backend `B`.
pub fn device_identify_on<B: DeviceControl>(id: u32) -> DeviceIdentity {
    crate::check!(B::device_identify(id))
}

/// Number of accelerators visible to the active backend.
#[cfg(any(feature = "cuda", feature = "metal"))]
pub fn device_count() -> u32 {
    device_count_on::<System>()
}

/// Make device `id` current for the active backend.
#[cfg(any(feature = "cuda", feature = "metal"))]
pub fn device_select(id: u32) {
    device_select_on::<System>(id)
}

/// Current device of the active backend.
#[cfg(any(feature = "cuda", feature = "metal"))]
pub fn device_get_current() -> u32 {
    device_get_current_on::<System>()
}

/// Packed physical identity of device `id` of the active backend.
#[cfg(any(feature = "cuda", feature = "metal"))]
pub fn device_identify(id: u32) -> DeviceIdentity {
    device_identify_on::<System>(id)
}
