// Copyright 2024-2026 hetmem Contributors
// Licensed under the Apache License, Version 2.0

//! Configuration loading from environment variables.
//!
//! All values come from `HETMEM_*` environment variables with defaults.
//! Invalid values fall back to defaults without failing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `HETMEM_DEVICE` | 0 | Accelerator ordinal selected by [`crate::init`] |
//! | `HETMEM_LOG_LEVEL` | `info` | Log filter directive |
//! | `HETMEM_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `HETMEM_LOG_FILE` | unset | Log output file (stderr when unset) |

use std::path::PathBuf;

use thiserror::Error;

use crate::error::BackendError;
use crate::telemetry::{LogConfig, LogError, LogFormat};

/// Configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Accelerator ordinal to select at init. Ignored in host-only builds.
    pub device: u32,
    pub log: LogConfig,
}

/// Errors from setup paths.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configured device {id} is out of range ({count} devices present)")]
    DeviceOutOfRange { id: u32, count: u32 },

    #[error("backend setup failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a log format env var, returning `default` on missing or unknown.
fn parse_format(key: &str, default: LogFormat) -> LogFormat {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => default,
        },
        Err(_) => default,
    }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("HETMEM_LOG_LEVEL")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(defaults.level);
    let output_path = std::env::var_os("HETMEM_LOG_FILE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    LogConfig {
        format: parse_format("HETMEM_LOG_FORMAT", defaults.format),
        level,
        output_path,
    }
}

/// Load all configuration from environment variables.
pub fn load() -> Config {
    Config {
        device: parse_u32("HETMEM_DEVICE", 0),
        log: load_log_config(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "HETMEM_DEVICE",
        "HETMEM_LOG_LEVEL",
        "HETMEM_LOG_FORMAT",
        "HETMEM_LOG_FILE",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.device, 0);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert!(cfg.log.output_path.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HETMEM_DEVICE", "3");
        std::env::set_var("HETMEM_LOG_LEVEL", "hetmem=trace");
        std::env::set_var("HETMEM_LOG_FORMAT", "Pretty");
        std::env::set_var("HETMEM_LOG_FILE", "/tmp/hetmem.log");
        let cfg = load();
        assert_eq!(cfg.device, 3);
        assert_eq!(cfg.log.level, "hetmem=trace");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert_eq!(cfg.log.output_path, Some(PathBuf::from("/tmp/hetmem.log")));
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("HETMEM_DEVICE", "-1");
        std::env::set_var("HETMEM_LOG_FORMAT", "xml");
        std::env::set_var("HETMEM_LOG_LEVEL", "  ");
        std::env::set_var("HETMEM_LOG_FILE", "");
        let cfg = load();
        assert_eq!(cfg.device, 0);
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.log.output_path.is_none());
        clear_env_vars();
    }

    #[test]
    fn test_out_of_range_message_names_count() {
        let err = ConfigError::DeviceOutOfRange { id: 4, count: 2 };
        assert_eq!(
            err.to_string(),
            "configured device 4 is out of range (2 devices present)"
        );
    }

    #[test]
    fn test_log_errors_surface_through_init() {
        let cfg = Config {
            device: 0,
            log: LogConfig {
                level: "hetmem=loudest".to_string(),
                ..LogConfig::default()
            },
        };
        let result = crate::init_with_logging(&cfg);
        assert!(matches!(result, Err(ConfigError::Log(LogError::InvalidFilter(_)))));
    }
}
