// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Logging configuration and initialization.
//!
//! One `fmt` layer (JSON or pretty) over a single writer, stderr or a file,
//! filtered by an `EnvFilter` directive. The first event after install
//! records the backend compiled into this build.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "hetmem::memory=trace".
    pub level: String,
    /// Log file, truncated on install. Logs go to stderr when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
            output_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Failed to open log file: {0}")]
    FileOpen(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

fn open_writer(path: Option<&Path>) -> Result<BoxMakeWriter, LogError> {
    match path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| LogError::FileOpen(format!("{}: {}", path.display(), e)))?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

/// Install the global tracing subscriber. Succeeds at most once per process.
///
/// The filter and the output file are validated before anything is
/// installed, so a failed call leaves no subscriber behind.
pub fn init_logging(config: &LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LogError::InvalidFilter(e.to_string()))?;
    let writer = open_writer(config.output_path.as_deref())?;
    let to_file = config.output_path.is_some();

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(fmt::layer().json().with_writer(writer)), None),
        LogFormat::Pretty => (
            None,
            Some(fmt::layer().pretty().with_ansi(!to_file).with_writer(writer)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;

    tracing::info!(
        backend = %backend::active(),
        format = ?config.format,
        file = ?config.output_path,
        "logging initialized"
    );
    Ok(())
}
