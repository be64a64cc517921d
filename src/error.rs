// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Error types for the memory layer.
//!
//! Backend and allocator errors are fatal: the typed entry points route them
//! through [`fatal`] (usually via [`check!`](crate::check)), which records the
//! call site and vendor code and aborts the process. Only configuration and
//! logging setup return recoverable errors.

use std::fmt;

use thiserror::Error;

use crate::backend::BackendKind;

/// Failure reported by a vendor runtime primitive.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} runtime call `{call}` failed with code {code}")]
    Runtime {
        backend: BackendKind,
        call: &'static str,
        code: i32,
    },

    #[error("host allocation of {bytes} bytes failed")]
    HostAllocation { bytes: usize },

    #[error("invalid device id {id} ({count} devices present)")]
    InvalidDevice { id: u32, count: u32 },

    #[error("{backend} has no allocation at address {addr:#x}")]
    UnknownAddress { backend: BackendKind, addr: usize },

    #[error("no {0} device available")]
    NoDevice(BackendKind),

    #[error("{count} elements of {elem_size} bytes overflow the address space")]
    SizeOverflow { count: usize, elem_size: usize },
}

/// Byte length of `count` elements of `T`.
pub fn byte_len<T>(count: usize) -> Result<usize, BackendError> {
    let elem_size = std::mem::size_of::<T>();
    count
        .checked_mul(elem_size)
        .ok_or(BackendError::SizeOverflow { count, elem_size })
}

impl BackendError {
    /// Vendor error code, or -1 for failures that carry none.
    pub fn code(&self) -> i32 {
        match self {
            Self::Runtime { code, .. } => *code,
            _ => -1,
        }
    }
}

/// Broken caching-allocator bookkeeping.
#[derive(Debug, Error)]
pub enum InvariantViolation {
    #[error(
        "deallocate of address {addr:#x} ({count} elements) not owned by this allocator \
         (double free or foreign pointer)"
    )]
    UnknownAddress { addr: usize, count: usize },
}

/// Log `err` with its call site and abort the process.
///
/// Accelerator runtime state is not recoverable once a call has failed, so
/// there is no unwinding path here.
#[cold]
pub fn fatal(err: &dyn fmt::Display, code: i32, file: &'static str, line: u32) -> ! {
    tracing::error!(%file, line, code, error = %err, "fatal memory layer error");
    eprintln!("hetmem: fatal error at {}:{}: {} (code {})", file, line, err, code);
    std::process::abort()
}

/// Unwrap a `Result<_, BackendError>` or abort with file/line and vendor code.
#[macro_export]
macro_rules! check {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => {
                let err: $crate::error::BackendError = err;
                $crate::error::fatal(&err, err.code(), file!(), line!())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_carries_vendor_code() {
        let err = BackendError::Runtime {
            backend: BackendKind::Cuda,
            call: "cuMemAlloc",
            code: 2,
        };
        assert_eq!(err.code(), 2);
        assert_eq!(err.to_string(), "CUDA runtime call `cuMemAlloc` failed with code 2");
    }

    #[test]
    fn non_vendor_errors_report_minus_one() {
        let err = BackendError::HostAllocation { bytes: 64 };
        assert_eq!(err.code(), -1);
        let err = BackendError::InvalidDevice { id: 3, count: 1 };
        assert_eq!(err.to_string(), "invalid device id 3 (1 devices present)");
    }

    #[test]
    fn invariant_violation_names_address() {
        let err = InvariantViolation::UnknownAddress { addr: 0x1000, count: 4 };
        assert!(err.to_string().contains("0x1000"));
        assert!(err.to_string().contains("double free"));
    }

    #[test]
    fn byte_len_rejects_overflowing_counts() {
        assert_eq!(byte_len::<u64>(4).unwrap(), 32);
        assert_eq!(byte_len::<()>(usize::MAX).unwrap(), 0);
        let err = byte_len::<u64>(usize::MAX / 8 + 2).unwrap_err();
        assert!(matches!(err, BackendError::SizeOverflow { elem_size: 8, .. }));
        assert_eq!(err.code(), -1);
    }

    #[test]
    fn check_passes_through_ok() {
        let ok: Result<u32, BackendError> = Ok(7);
        assert_eq!(crate::check!(ok), 7);
    }
}
