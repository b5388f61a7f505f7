//! Configuration loading, environment overrides, and validation.
//!
//! Config files: `attache.toml`, `attache.yaml`, or `attache.json`
//! Searched in `./` then `~/.config/attache/`.
//!
//! `ATTACHE_*` environment variables override values read from disk.

pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, discover_and_load, load_config, set_data_dir,
    },
    schema::{
        AttacheConfig, MetricsConfig, ServerConfig, StorageConfig, TransformsConfig, UrlConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
