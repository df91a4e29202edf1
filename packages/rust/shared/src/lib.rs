//! Shared types, error model, configuration, and plugin registry for slmforge.
//!
//! This crate is the foundation depended on by all other slmforge crates.
//! It provides:
//! - [`ForgeError`]: the unified error type
//! - Data records ([`RawChunk`], [`TrainingExample`], [`Metadata`])
//! - Configuration ([`PipelineConfig`], [`ProcessingConfig`], config loading)
//! - [`Registry`]: the name-keyed factory table used for every plugin family

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    PipelineConfig, PluginSpec, ProcessingConfig, ResourceErrorPolicy, TrainingConfig,
    config_dir, default_config_path, init_config, load_config_from, parse_config,
};
pub use error::{ForgeError, PluginKind, Result};
pub use registry::{Factory, Registry, parse_params};
pub use types::{Metadata, RawChunk, TrainingExample};
