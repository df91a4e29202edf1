//! Boundary to the external training collaborator.
//!
//! The pipeline never trains a model itself. It hands the finished examples
//! and the `[training]` hyper-parameters to a [`TrainingHandoff`]. The default
//! handoff, [`DatasetWriter`], persists them as a JSONL dataset plus a
//! `handoff.json` manifest that a trainer picks up.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use slmforge_shared::{ForgeError, Metadata, PipelineConfig, Result, TrainingExample};

/// Dataset file name inside `output_dir`.
pub const DATASET_FILE: &str = "train.jsonl";

/// Manifest file name inside `output_dir`.
pub const MANIFEST_FILE: &str = "handoff.json";

/// Everything the training collaborator needs besides the examples.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRequest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub epochs: u32,
    pub batch_size: u32,
    pub lr: f64,
    /// `[model]` section, untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<serde_json::Value>,
    /// Unrecognised `[training]` keys, untouched.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrainingRequest {
    /// Build the request for run `run_id` from a validated config.
    pub fn from_config(config: &PipelineConfig, run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        let training = &config.training;
        Self {
            run_id,
            started_at,
            output_dir: PathBuf::from(&training.output_dir),
            epochs: training.epochs,
            batch_size: training.batch_size,
            lr: training.lr,
            model: config.model.clone(),
            extra: training.extra.clone(),
        }
    }
}

/// What a handoff did with the examples.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HandoffReport {
    pub examples: usize,
    /// Written dataset, if any.
    pub dataset_path: Option<PathBuf>,
    /// Written manifest, if any.
    pub manifest_path: Option<PathBuf>,
    /// Hex SHA-256 of the dataset bytes.
    pub sha256: Option<String>,
    pub dry_run: bool,
}

/// Receives the finished, fully materialized example set.
pub trait TrainingHandoff: Send + Sync {
    fn deliver(&self, examples: Vec<TrainingExample>, request: &TrainingRequest) -> Result<HandoffReport>;
}

// ---------------------------------------------------------------------------
// DatasetWriter
// ---------------------------------------------------------------------------

/// One line of `train.jsonl`.
#[derive(Serialize)]
struct DatasetRecord<'a> {
    input_text: &'a str,
    target_text: &'a str,
    metadata: &'a Metadata,
    /// Prompt and target joined the way a causal-LM trainer consumes them.
    text: String,
}

#[derive(Serialize)]
struct HandoffManifest<'a> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    written_at: DateTime<Utc>,
    tool_version: &'static str,
    dataset: &'static str,
    examples: usize,
    size_bytes: u64,
    sha256: &'a str,
    epochs: u32,
    batch_size: u32,
    lr: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a serde_json::Value>,
    extra: &'a serde_json::Map<String, serde_json::Value>,
}

/// Writes `<output_dir>/train.jsonl` and `<output_dir>/handoff.json`.
///
/// Both files are written to a temporary name first and renamed into place,
/// so a reader never sees a partial dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetWriter;

impl TrainingHandoff for DatasetWriter {
    #[instrument(skip_all, fields(output_dir = %request.output_dir.display(), examples = examples.len()))]
    fn deliver(&self, examples: Vec<TrainingExample>, request: &TrainingRequest) -> Result<HandoffReport> {
        let dir = &request.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| ForgeError::io(dir, e))?;

        if examples.is_empty() {
            warn!("no training examples were produced; writing an empty dataset");
        }

        let dataset_path = dir.join(DATASET_FILE);
        let (size_bytes, sha256) = write_dataset(&dataset_path, &examples, request.run_id)?;

        let manifest = HandoffManifest {
            run_id: request.run_id,
            started_at: request.started_at,
            written_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION"),
            dataset: DATASET_FILE,
            examples: examples.len(),
            size_bytes,
            sha256: &sha256,
            epochs: request.epochs,
            batch_size: request.batch_size,
            lr: request.lr,
            model: request.model.as_ref(),
            extra: &request.extra,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        write_json(&manifest_path, &manifest, request.run_id)?;

        info!(
            examples = examples.len(),
            size_bytes,
            path = %dataset_path.display(),
            "training dataset handed off"
        );

        Ok(HandoffReport {
            examples: examples.len(),
            dataset_path: Some(dataset_path),
            manifest_path: Some(manifest_path),
            sha256: Some(sha256),
            dry_run: false,
        })
    }
}

/// Write examples as JSON lines, returning the byte count and SHA-256.
fn write_dataset(path: &Path, examples: &[TrainingExample], run_id: Uuid) -> Result<(u64, String)> {
    let temp = temp_path(path, run_id);
    let file = std::fs::File::create(&temp).map_err(|e| ForgeError::io(&temp, e))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = Sha256::new();
    let mut size_bytes = 0u64;

    for example in examples {
        let record = DatasetRecord {
            input_text: &example.input_text,
            target_text: &example.target_text,
            metadata: &example.metadata,
            text: example.supervised_text(),
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| ForgeError::Handoff(format!("JSON serialization failed: {e}")))?;
        line.push(b'\n');

        hasher.update(&line);
        size_bytes += line.len() as u64;
        writer.write_all(&line).map_err(|e| ForgeError::io(&temp, e))?;
    }

    writer.flush().map_err(|e| ForgeError::io(&temp, e))?;
    drop(writer);

    std::fs::rename(&temp, path).map_err(|e| ForgeError::io(path, e))?;
    debug!(path = %path.display(), size_bytes, "wrote dataset");

    Ok((size_bytes, format!("{:x}", hasher.finalize())))
}

/// Write a JSON file (pretty-printed) via temp file and rename.
fn write_json<T: Serialize>(path: &Path, data: &T, run_id: Uuid) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| ForgeError::Handoff(format!("JSON serialization failed: {e}")))?;
    let temp = temp_path(path, run_id);
    std::fs::write(&temp, json).map_err(|e| ForgeError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| ForgeError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Hidden sibling of `path`, unique per run.
fn temp_path(path: &Path, run_id: Uuid) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{run_id}.tmp"))
}

// ---------------------------------------------------------------------------
// DryRun
// ---------------------------------------------------------------------------

/// Logs what would be handed off and writes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRun;

impl TrainingHandoff for DryRun {
    fn deliver(&self, examples: Vec<TrainingExample>, request: &TrainingRequest) -> Result<HandoffReport> {
        info!(
            examples = examples.len(),
            output_dir = %request.output_dir.display(),
            epochs = request.epochs,
            batch_size = request.batch_size,
            lr = request.lr,
            "dry run: skipping training handoff"
        );

        Ok(HandoffReport {
            examples: examples.len(),
            dry_run: true,
            ..HandoffReport::default()
        })
    }
}
