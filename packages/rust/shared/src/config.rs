//! Pipeline configuration for slmforge.
//!
//! A run is described by one TOML document (default location
//! `~/.slmforge/pipeline.toml`). Plugin `params` tables are kept untyped here
//! and deserialized by each plugin factory into its own typed struct.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pipeline.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".slmforge";

// ---------------------------------------------------------------------------
// Config structs (matching pipeline.toml schema)
// ---------------------------------------------------------------------------

/// Top-level pipeline config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered connector entries; extraction visits them in this order.
    pub connectors: Vec<PluginSpec>,

    /// Task builder that turns processed chunks into examples.
    pub task_builder: PluginSpec,

    /// `[processing]` section.
    pub processing: ProcessingConfig,

    /// `[training]` section, forwarded to the training handoff.
    pub training: TrainingConfig,

    /// Optional `[model]` section. Opaque to the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<serde_json::Value>,
}

/// `{ type, params }` entry naming a registered plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Registered plugin name.
    #[serde(rename = "type")]
    pub kind: String,

    /// Variant-specific parameters.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl PluginSpec {
    /// Convenience constructor.
    pub fn new(kind: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

/// What to do when a single resource cannot be listed or extracted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceErrorPolicy {
    /// Log the failure, record it in the run report, keep going.
    #[default]
    Skip,
    /// Fail the whole run on the first failure.
    Abort,
}

/// `[processing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum segment length in characters.
    pub max_chars: usize,

    /// Resources extracted in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the bounded queue between extraction and processing.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Resilience policy for per-resource failures.
    #[serde(default)]
    pub on_resource_error: ResourceErrorPolicy,
}

fn default_concurrency() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    128
}

/// `[training]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Directory the training collaborator writes into.
    pub output_dir: String,

    #[serde(default = "default_epochs")]
    pub epochs: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Any other keys, forwarded untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_epochs() -> u32 {
    1
}
fn default_batch_size() -> u32 {
    1
}
fn default_lr() -> f64 {
    2e-4
}

impl PipelineConfig {
    /// Starter configuration written by `init_config`.
    pub fn example() -> Self {
        Self {
            connectors: vec![PluginSpec::new(
                "documents",
                serde_json::json!({
                    "root_path": "./data/docs",
                    "include_exts": [".txt", ".md", ".html"],
                }),
            )],
            task_builder: PluginSpec::new("summarization", serde_json::Value::Null),
            processing: ProcessingConfig {
                max_chars: 2000,
                concurrency: default_concurrency(),
                queue_capacity: default_queue_capacity(),
                on_resource_error: ResourceErrorPolicy::Skip,
            },
            training: TrainingConfig {
                output_dir: "./outputs/lora-adapter".into(),
                epochs: default_epochs(),
                batch_size: default_batch_size(),
                lr: default_lr(),
                extra: serde_json::Map::new(),
            },
            model: None,
        }
    }

    /// Check required keys and value ranges. Runs before any plugin is built.
    pub fn validate(&self) -> Result<()> {
        if self.connectors.is_empty() {
            return Err(ForgeError::config("at least one [[connectors]] entry is required"));
        }
        for (i, spec) in self.connectors.iter().enumerate() {
            if spec.kind.trim().is_empty() {
                return Err(ForgeError::config(format!("connectors[{i}].type is empty")));
            }
            if !(spec.params.is_null() || spec.params.is_object()) {
                return Err(ForgeError::config(format!(
                    "connectors[{i}].params must be a table"
                )));
            }
        }
        if self.task_builder.kind.trim().is_empty() {
            return Err(ForgeError::config("task_builder.type is empty"));
        }
        if !(self.task_builder.params.is_null() || self.task_builder.params.is_object()) {
            return Err(ForgeError::config("task_builder.params must be a table"));
        }

        let p = &self.processing;
        if p.max_chars == 0 {
            return Err(ForgeError::config("processing.max_chars must be a positive integer"));
        }
        if p.concurrency == 0 {
            return Err(ForgeError::config("processing.concurrency must be at least 1"));
        }
        if p.queue_capacity == 0 {
            return Err(ForgeError::config("processing.queue_capacity must be at least 1"));
        }

        let t = &self.training;
        if t.output_dir.trim().is_empty() {
            return Err(ForgeError::config("training.output_dir is empty"));
        }
        if t.epochs == 0 || t.batch_size == 0 {
            return Err(ForgeError::config(
                "training.epochs and training.batch_size must be positive",
            ));
        }
        if !(t.lr.is_finite() && t.lr > 0.0) {
            return Err(ForgeError::config("training.lr must be a positive number"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.slmforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the default config file (`~/.slmforge/pipeline.toml`).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Parse and validate a pipeline config from TOML text.
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig =
        toml::from_str(content).map_err(|e| ForgeError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the pipeline config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ForgeError::io(path, e))?;

    parse_config(&content).map_err(|e| match e {
        ForgeError::Config { message } => {
            ForgeError::config(format!("failed to load {}: {message}", path.display()))
        }
        other => other,
    })
}

/// Write the starter config to `path`, creating parent directories.
/// Refuses to overwrite an existing file.
pub fn init_config(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(ForgeError::config(format!(
            "{} already exists; remove it first to regenerate",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ForgeError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&PipelineConfig::example())
        .map_err(|e| ForgeError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ForgeError::io(path, e))?;
    tracing::info!(?path, "created starter pipeline config");

    Ok(path.to_path_buf())
}
