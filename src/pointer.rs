// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Pointer description.
//!
//! [`PointerLike`] lets generic storage code handle a plain host address and
//! a backend-tracked device handle through one interface: both declare their
//! element type, reference type, memory space and how to rebind to another
//! element type. Plain raw pointers get the default description (host space,
//! ordinary references). A type without an impl cannot be used as a pointer.

use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};

use crate::backend::{Backend, System};
use crate::space::{Host, Space};

/// Compile-time description of a pointer-like handle.
pub trait PointerLike: Copy {
    /// Pointee type.
    type Element;
    /// Space the pointee lives in.
    type Space: Space;
    /// What dereferencing yields.
    type Reference<'a>
    where
        Self: 'a;
    /// What dereferencing for reading yields.
    type ConstReference<'a>
    where
        Self: 'a;
    /// Same kind of handle, same space, element type `U`.
    type Rebind<U>: PointerLike<Element = U, Space = Self::Space>;
    /// Read-only handle to the same element and space.
    type ConstPointer: PointerLike<Element = Self::Element, Space = Self::Space>;

    /// Raw address of the pointee.
    fn address(self) -> *mut Self::Element;

    /// Reinterpret as a handle to `U` in the same space.
    fn rebind<U>(self) -> Self::Rebind<U>;

    /// Same address as a read-only handle.
    fn as_const(self) -> Self::ConstPointer;

    /// # Safety
    /// The handle must point to a live, initialized element, and no other
    /// reference to it may exist for `'a`.
    unsafe fn deref<'a>(self) -> Self::Reference<'a>
    where
        Self: 'a;

    /// # Safety
    /// The handle must point to a live, initialized element that is not
    /// mutated for `'a`.
    unsafe fn deref_const<'a>(self) -> Self::ConstReference<'a>
    where
        Self: 'a;
}

pub type ElementOf<P> = <P as PointerLike>::Element;
pub type SpaceOf<P> = <P as PointerLike>::Space;
pub type RebindOf<P, U> = <P as PointerLike>::Rebind<U>;
pub type ConstPointerOf<P> = <P as PointerLike>::ConstPointer;
pub type ReferenceOf<'a, P> = <P as PointerLike>::Reference<'a>;
pub type ConstReferenceOf<'a, P> = <P as PointerLike>::ConstReference<'a>;

/// Raw address behind any pointer-like handle.
pub fn address_of<P: PointerLike>(p: P) -> *mut P::Element {
    p.address()
}

impl<T> PointerLike for *mut T {
    type Element = T;
    type Space = Host;
    type Reference<'a> = &'a mut T where Self: 'a;
    type ConstReference<'a> = &'a T where Self: 'a;
    type Rebind<U> = *mut U;
    type ConstPointer = *const T;

    fn address(self) -> *mut T {
        self
    }

    fn rebind<U>(self) -> *mut U {
        self.cast()
    }

    fn as_const(self) -> *const T {
        self
    }

    unsafe fn deref<'a>(self) -> &'a mut T
    where
        Self: 'a,
    {
        &mut *self
    }

    unsafe fn deref_const<'a>(self) -> &'a T
    where
        Self: 'a,
    {
        &*self
    }
}

impl<T> PointerLike for *const T {
    type Element = T;
    type Space = Host;
    type Reference<'a> = &'a T where Self: 'a;
    type ConstReference<'a> = &'a T where Self: 'a;
    type Rebind<U> = *const U;
    type ConstPointer = *const T;

    fn address(self) -> *mut T {
        self as *mut T
    }

    fn rebind<U>(self) -> *const U {
        self.cast()
    }

    fn as_const(self) -> *const T {
        self
    }

    unsafe fn deref<'a>(self) -> &'a T
    where
        Self: 'a,
    {
        &*self
    }

    unsafe fn deref_const<'a>(self) -> &'a T
    where
        Self: 'a,
    {
        &*self
    }
}

/// Address of device memory owned by backend `B`.
///
/// Carries the backend family in its type, so it can only be passed where
/// that family's device space is expected. Never dereferenced on the host;
/// [`PointerLike::deref`] yields a [`DeviceRef`] proxy instead.
pub struct DevicePtr<T, B = System> {
    ptr: *mut T,
    _backend: PhantomData<B>,
}

impl<T, B> DevicePtr<T, B> {
    pub fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr,
            _backend: PhantomData,
        }
    }

    pub fn as_raw(self) -> *mut T {
        self.ptr
    }

    pub fn is_null(self) -> bool {
        self.ptr.is_null()
    }

    /// Handle `count` elements further on.
    ///
    /// # Safety
    /// The result must stay inside the same allocation.
    pub unsafe fn add(self, count: usize) -> Self {
        Self::from_raw(self.ptr.add(count))
    }
}

impl<T, B> Clone for DevicePtr<T, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, B> Copy for DevicePtr<T, B> {}

impl<T, B> PartialEq for DevicePtr<T, B> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T, B> Eq for DevicePtr<T, B> {}

impl<T, B: Backend> fmt::Debug for DevicePtr<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePtr<{}>({:p})", B::KIND, self.ptr)
    }
}

impl<T, B: Backend> PointerLike for DevicePtr<T, B> {
    type Element = T;
    type Space = B::Device;
    type Reference<'a> = DeviceRef<'a, T, B> where Self: 'a;
    type ConstReference<'a> = DeviceRef<'a, T, B> where Self: 'a;
    type Rebind<U> = DevicePtr<U, B>;
    // Device handles carry no mutability; reads go through DeviceRef::load.
    type ConstPointer = DevicePtr<T, B>;

    fn address(self) -> *mut T {
        self.ptr
    }

    fn rebind<U>(self) -> DevicePtr<U, B> {
        DevicePtr::from_raw(self.ptr.cast())
    }

    fn as_const(self) -> DevicePtr<T, B> {
        self
    }

    unsafe fn deref<'a>(self) -> DeviceRef<'a, T, B>
    where
        Self: 'a,
    {
        DeviceRef::new(self.ptr)
    }

    unsafe fn deref_const<'a>(self) -> DeviceRef<'a, T, B>
    where
        Self: 'a,
    {
        DeviceRef::new(self.ptr)
    }
}

/// Proxy reference to one element in device memory.
///
/// Reads and writes are single-element transfers through the backend.
pub struct DeviceRef<'a, T, B = System> {
    ptr: *mut T,
    _marker: PhantomData<(&'a mut T, B)>,
}

impl<'a, T, B: Backend> DeviceRef<'a, T, B> {
    fn new(ptr: *mut T) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn address(&self) -> *mut T {
        self.ptr
    }
}

impl<'a, T: Copy, B: Backend> DeviceRef<'a, T, B> {
    /// Copy the element to the host.
    pub fn load(&self) -> T {
        let mut value = MaybeUninit::<T>::uninit();
        // SAFETY: the handle was dereferenced under PointerLike::deref's
        // contract; value is a valid host destination for one T.
        unsafe {
            crate::check!(B::copy_device_to_host(
                self.ptr as *const u8,
                value.as_mut_ptr() as *mut u8,
                mem::size_of::<T>(),
            ));
            value.assume_init()
        }
    }

    /// Copy `value` into the element.
    pub fn store(&mut self, value: T) {
        // SAFETY: as in `load`.
        unsafe {
            crate::check!(B::copy_host_to_device(
                &value as *const T as *const u8,
                self.ptr as *mut u8,
                mem::size_of::<T>(),
            ));
        }
    }
}

#[cfg(test)]
#[path = "pointer_tests.rs"]
mod tests;
