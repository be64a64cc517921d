//! Pointer descriptions through the public API.

use std::any::TypeId;

use hetmem::pointer::{address_of, DevicePtr, ElementOf, PointerLike, RebindOf, SpaceOf};
use hetmem::space::{Device, Host, Space};
use hetmem::DeviceBuffer;

fn same<A: 'static, B: 'static>() -> bool {
    TypeId::of::<A>() == TypeId::of::<B>()
}

#[test]
fn raw_pointers_live_in_host_space() {
    assert!(same::<SpaceOf<*mut f64>, Host>());
    assert!(same::<SpaceOf<*const u8>, Host>());
    assert!(same::<ElementOf<*const u8>, u8>());
}

#[test]
fn device_pointer_describes_device_space() {
    assert!(same::<SpaceOf<DevicePtr<i32>>, Device>());
    assert!(same::<RebindOf<DevicePtr<i32>, u8>, DevicePtr<u8>>());
    assert_eq!(<SpaceOf<DevicePtr<i32>> as Space>::NAME, <Device as Space>::NAME);
}

#[test]
fn rebind_keeps_the_address() {
    let buffer = DeviceBuffer::<u32>::new(2);
    let p = DevicePtr::<u32>::from_raw(buffer.as_ptr());
    let bytes = p.rebind::<u8>();
    assert_eq!(address_of(bytes) as usize, buffer.as_ptr() as usize);
}

#[test]
fn device_reference_loads_and_stores() {
    let buffer = DeviceBuffer::<i64>::from_host(&[10, 20, 30]);
    let p = DevicePtr::<i64>::from_raw(buffer.as_ptr());
    unsafe {
        let mut second = p.add(1).deref();
        assert_eq!(second.load(), 20);
        second.store(-5);
    }
    assert_eq!(buffer.to_vec(), vec![10, -5, 30]);
}
