// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! hetmem
//!
//! Memory layer for heterogeneous host/accelerator code. One accelerator
//! family (CUDA, Metal, or none) is chosen at build time and every memory
//! operation dispatches to it without runtime branching.
//!
//! # Layers
//!
//! - [`space`]: zero-sized tags naming where a region lives
//! - [`pointer`]: uniform description of raw and device pointers
//! - [`backend`]: byte-level primitives per accelerator family
//! - [`memory`]: typed allocators, the caching allocator and [`Buffer`]
//! - [`dispatch`]: space-routed copies, memset and synchronization
//!
//! # Failure model
//!
//! Backend failures, exhausted memory and broken allocator bookkeeping are
//! unrecoverable: they are logged with their call site and the process
//! aborts. Only [`init`] and logging setup return errors.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod pointer;
pub mod space;
pub mod telemetry;

pub use backend::{active, Backend, BackendKind, DeviceControl, DeviceIdentity, System};
pub use config::{Config, ConfigError};
pub use dispatch::{copy, copy_n, memset, synchronize};
pub use memory::{Buffer, CachingAllocator, DeviceBuffer, HostBuffer};
pub use pointer::{DevicePtr, PointerLike};
pub use space::{Device, Host, Managed, Pinned, Space};

/// Prepare the active backend for use.
///
/// Logs the backend in use. In accelerator builds, checks the configured
/// device against the number present and selects it.
pub fn init(config: &Config) -> Result<(), ConfigError> {
    tracing::info!(backend = %active(), "initializing memory layer");
    select_configured_device(config)
}

/// Install logging from `config.log`, then [`init`].
///
/// For binaries that let this crate own the subscriber; libraries embedding
/// hetmem should install their own and call [`init`].
pub fn init_with_logging(config: &Config) -> Result<(), ConfigError> {
    telemetry::init_logging(&config.log)?;
    init(config)
}

#[cfg(any(feature = "cuda", feature = "metal"))]
fn select_configured_device(config: &Config) -> Result<(), ConfigError> {
    let count = System::device_count()?;
    if config.device >= count {
        return Err(ConfigError::DeviceOutOfRange {
            id: config.device,
            count,
        });
    }
    System::device_select(config.device)?;
    let identity = System::device_identify(config.device)?;
    tracing::info!(device = config.device, count, %identity, "selected device");
    Ok(())
}

#[cfg(not(any(feature = "cuda", feature = "metal")))]
fn select_configured_device(config: &Config) -> Result<(), ConfigError> {
    if config.device != 0 {
        tracing::debug!(device = config.device, "device ordinal ignored without an accelerator backend");
    }
    Ok(())
}

/// Return every cached allocator region to its backend.
///
/// Equivalent to [`memory::registry::shutdown`]; call it before process
/// teardown when the backend must see all memory released.
pub fn shutdown() -> usize {
    let released = memory::registry::shutdown();
    tracing::info!(released, "released cached allocations");
    released
}
