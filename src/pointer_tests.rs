//! Tests for pointer description.

use super::*;
use crate::backend::HostBackend;
use crate::space::{Device, Residency};
use std::any::TypeId;

fn type_eq<A: 'static, B: 'static>() -> bool {
    TypeId::of::<A>() == TypeId::of::<B>()
}

fn same_space<P: PointerLike, Q: PointerLike<Space = SpaceOf<P>>>() {}

#[test]
fn raw_mut_pointer_uses_default_description() {
    assert!(type_eq::<ElementOf<*mut f32>, f32>());
    assert!(type_eq::<SpaceOf<*mut f32>, Host>());
    assert!(type_eq::<ReferenceOf<'static, *mut f32>, &'static mut f32>());
    assert!(type_eq::<ConstReferenceOf<'static, *mut f32>, &'static f32>());
}

#[test]
fn raw_const_pointer_references_are_shared() {
    assert!(type_eq::<ElementOf<*const u16>, u16>());
    assert!(type_eq::<ReferenceOf<'static, *const u16>, &'static u16>());
    assert!(type_eq::<RebindOf<*const u16, u64>, *const u64>());
}

#[test]
fn rebind_of_host_address_stays_host() {
    assert!(type_eq::<RebindOf<*mut f32, f64>, *mut f64>());
    assert!(type_eq::<SpaceOf<RebindOf<*mut f32, f64>>, Host>());
    same_space::<*mut f32, RebindOf<*mut f32, i8>>();

    let mut words = [0u32; 2];
    let p: *mut u32 = words.as_mut_ptr();
    let bytes: *mut u8 = p.rebind::<u8>();
    assert_eq!(bytes as usize, p as usize);
}

#[test]
fn address_of_returns_the_raw_address() {
    let mut value = 5i32;
    let p: *mut i32 = &mut value;
    assert_eq!(address_of(p), p);
    let c: *const i32 = &value;
    assert_eq!(address_of(c) as *const i32, c);
}

#[test]
fn deref_of_host_pointer_is_a_plain_reference() {
    let mut value = 1.5f64;
    let p: *mut f64 = &mut value;
    unsafe {
        *p.deref() = 2.5;
        assert_eq!(*p.deref_const(), 2.5);
    }
    assert_eq!(value, 2.5);
}

#[test]
fn device_ptr_declares_backend_device_space() {
    assert!(type_eq::<SpaceOf<DevicePtr<f32, HostBackend>>, Host>());
    assert!(type_eq::<SpaceOf<DevicePtr<f32>>, Device>());
    assert!(type_eq::<ElementOf<DevicePtr<f32>>, f32>());
    assert_eq!(<SpaceOf<DevicePtr<f32>> as Space>::RESIDENCY, <Device as Space>::RESIDENCY);
    assert!(matches!(
        <SpaceOf<DevicePtr<u8>> as Space>::RESIDENCY,
        Residency::Host | Residency::Device
    ));
}

#[test]
fn device_ptr_rebinds_within_its_family() {
    assert!(type_eq::<RebindOf<DevicePtr<f32, HostBackend>, u8>, DevicePtr<u8, HostBackend>>());
    same_space::<DevicePtr<f32>, RebindOf<DevicePtr<f32>, i64>>();

    let raw = 0x1000 as *mut f32;
    let p = DevicePtr::<f32, HostBackend>::from_raw(raw);
    let q = p.rebind::<u8>();
    assert_eq!(q.as_raw() as usize, 0x1000);
    assert_eq!(address_of(p), raw);
}

#[test]
fn device_ref_reads_and_writes_through_backend() {
    let mut cells = [0u64; 4];
    let p = DevicePtr::<u64, HostBackend>::from_raw(cells.as_mut_ptr());
    unsafe {
        let mut r = p.add(2).deref();
        r.store(42);
        assert_eq!(r.load(), 42);
        assert_eq!(p.deref_const().load(), 0);
    }
    assert_eq!(cells, [0, 0, 42, 0]);
}

#[test]
fn device_ptr_debug_names_backend() {
    let p = DevicePtr::<u8, HostBackend>::from_raw(std::ptr::null_mut());
    assert!(p.is_null());
    assert!(format!("{:?}", p).starts_with("DevicePtr<Host>"));
}

#[test]
fn const_pointer_names_a_read_only_handle() {
    assert!(type_eq::<ConstPointerOf<*mut f32>, *const f32>());
    assert!(type_eq::<ConstPointerOf<*const u8>, *const u8>());
    assert!(type_eq::<ConstPointerOf<DevicePtr<u8, HostBackend>>, DevicePtr<u8, HostBackend>>());
    same_space::<*mut f32, ConstPointerOf<*mut f32>>();

    fn first<P: PointerLike<Element = i32, ConstPointer = *const i32>>(p: P) -> i32 {
        // SAFETY: callers pass a live host element.
        unsafe { *p.as_const().deref_const() }
    }
    let mut value = 7i32;
    assert_eq!(first(&mut value as *mut i32), 7);
}
