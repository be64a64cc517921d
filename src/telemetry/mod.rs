// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Structured logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the embedding application, which may use [`init_logging`].

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
