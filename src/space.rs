// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Memory space tags.
//!
//! A space tag is a zero-sized marker naming where a region lives. `Host`
//! always exists; the accelerator tags only exist when their backend feature
//! is enabled, and [`Device`] names the active family's device-resident tag
//! (or aliases [`Host`] in a host-only build).

use std::fmt;

/// Residency class of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Ordinary pageable host memory.
    Host,
    /// Accelerator-resident memory, not addressable from the host.
    Device,
    /// Memory migrated on demand between host and accelerator.
    Managed,
    /// Page-locked host memory, optimized for transfers.
    Pinned,
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Residency::Host => write!(f, "host"),
            Residency::Device => write!(f, "device"),
            Residency::Managed => write!(f, "managed"),
            Residency::Pinned => write!(f, "pinned"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Which side of the bus the copy engine must treat a space as.
///
/// Only [`OnHost`] and [`OnDevice`] exist; copy routing is defined over
/// every pair of them.
pub trait Location: sealed::Sealed + 'static {}

/// Copies touching this space use the host side of a transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnHost;

/// Copies touching this space use the device side of a transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnDevice;

impl sealed::Sealed for OnHost {}
impl sealed::Sealed for OnDevice {}
impl Location for OnHost {}
impl Location for OnDevice {}

/// A memory space marker type.
pub trait Space: Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// Human-readable name used in logs.
    const NAME: &'static str;
    /// Residency class of regions in this space.
    const RESIDENCY: Residency;
    /// Transfer side used by copy dispatch.
    type Location: Location;
}

/// Host memory. Always available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Host;

impl Space for Host {
    const NAME: &'static str = "host";
    const RESIDENCY: Residency = Residency::Host;
    type Location = OnHost;
}

/// CUDA device memory.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cuda;

/// CUDA managed (unified) memory.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CudaManaged;

/// Page-locked host memory registered with the CUDA driver.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CudaPinned;

#[cfg(feature = "cuda")]
impl Space for Cuda {
    const NAME: &'static str = "cuda";
    const RESIDENCY: Residency = Residency::Device;
    type Location = OnDevice;
}

#[cfg(feature = "cuda")]
impl Space for CudaManaged {
    const NAME: &'static str = "cuda_managed";
    const RESIDENCY: Residency = Residency::Managed;
    type Location = OnDevice;
}

#[cfg(feature = "cuda")]
impl Space for CudaPinned {
    const NAME: &'static str = "cuda_pinned";
    const RESIDENCY: Residency = Residency::Pinned;
    type Location = OnHost;
}

/// Metal buffer memory.
#[cfg(feature = "metal")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Metal;

/// Metal buffer memory shared with the CPU.
#[cfg(feature = "metal")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MetalShared;

/// Page-aligned host staging memory for Metal transfers.
#[cfg(feature = "metal")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MetalPinned;

#[cfg(feature = "metal")]
impl Space for Metal {
    const NAME: &'static str = "metal";
    const RESIDENCY: Residency = Residency::Device;
    type Location = OnDevice;
}

#[cfg(feature = "metal")]
impl Space for MetalShared {
    const NAME: &'static str = "metal_shared";
    const RESIDENCY: Residency = Residency::Managed;
    type Location = OnDevice;
}

#[cfg(feature = "metal")]
impl Space for MetalPinned {
    const NAME: &'static str = "metal_pinned";
    const RESIDENCY: Residency = Residency::Pinned;
    type Location = OnHost;
}

/// Device-resident space of the active backend (host in host-only builds).
pub type Device = <crate::backend::System as crate::backend::Backend>::Device;

/// Managed space of the active backend.
pub type Managed = <crate::backend::System as crate::backend::Backend>::Managed;

/// Pinned host space of the active backend.
pub type Pinned = <crate::backend::System as crate::backend::Backend>::Pinned;

/// True when `S` is the host space tag itself.
pub fn is_host<S: Space>() -> bool {
    std::any::TypeId::of::<S>() == std::any::TypeId::of::<Host>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_tag_describes_host_memory() {
        assert_eq!(Host::NAME, "host");
        assert_eq!(Host::RESIDENCY, Residency::Host);
        assert!(is_host::<Host>());
    }

    #[test]
    fn residency_display() {
        assert_eq!(Residency::Device.to_string(), "device");
        assert_eq!(Residency::Pinned.to_string(), "pinned");
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn device_aliases_host_without_accelerator() {
        assert!(is_host::<Device>());
        assert!(is_host::<Managed>());
        assert!(is_host::<Pinned>());
    }

    #[cfg(any(feature = "cuda", feature = "metal"))]
    #[test]
    fn device_is_distinct_with_accelerator() {
        assert!(!is_host::<Device>());
        assert_eq!(<Device as Space>::RESIDENCY, Residency::Device);
        assert_eq!(<Pinned as Space>::RESIDENCY, Residency::Pinned);
    }

    #[test]
    fn tags_are_zero_sized() {
        assert_eq!(std::mem::size_of::<Host>(), 0);
        assert_eq!(std::mem::size_of::<Device>(), 0);
    }
}
