// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Typed allocators, the caching allocator and owned buffers.

mod allocator;
mod buffer;
mod caching;
pub mod registry;

pub use allocator::{Allocator, DeviceAllocator, HostAllocator, ManagedAllocator, PinnedAllocator};
pub use buffer::{Buffer, DeviceBuffer, HostBuffer, ManagedBuffer};
pub use caching::CachingAllocator;
pub use registry::CacheStats;
