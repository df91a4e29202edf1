//! End-to-end run: config → connectors → ingest → examples → training handoff.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use slmforge_connectors::Connector;
use slmforge_processing::TaskBuilder;
use slmforge_shared::{ForgeError, PipelineConfig, RawChunk, Result, TrainingExample};

use crate::handoff::{HandoffReport, TrainingHandoff, TrainingRequest};
use crate::ingest::{self, IngestOutcome, IngestStats, SkippedResource};
use crate::plugins::PluginRegistry;

/// Linear, non-resumable run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Initialized,
    ConnectorsReady,
    ChunksExtracted,
    Cleaned,
    Chunked,
    ExamplesBuilt,
    Delegated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initialized => "initialized",
            Self::ConnectorsReady => "connectors ready",
            Self::ChunksExtracted => "chunks extracted",
            Self::Cleaned => "cleaned",
            Self::Chunked => "chunked",
            Self::ExamplesBuilt => "examples built",
            Self::Delegated => "delegated to training",
        };
        f.write_str(label)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stats: IngestStats,
    pub skipped: Vec<SkippedResource>,
    pub examples: usize,
    pub elapsed: Duration,
    pub handoff: HandoffReport,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition.
    fn phase(&self, state: PipelineState);
    /// Called when a resource has been fully extracted.
    fn resource_loaded(&self, connector: &str, resource_id: &str, chunks: usize);
    /// Called when a resource failed and was skipped.
    fn resource_skipped(&self, skipped: &SkippedResource);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: PipelineState) {}
    fn resource_loaded(&self, _connector: &str, _resource_id: &str, _chunks: usize) {}
    fn resource_skipped(&self, _skipped: &SkippedResource) {}
    fn done(&self, _report: &RunReport) {}
}

/// A validated pipeline configuration bound to a plugin registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    plugins: Arc<PluginRegistry>,
}

impl Pipeline {
    /// Validate `config` and bind it to `plugins`.
    pub fn new(config: PipelineConfig, plugins: Arc<PluginRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, plugins })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Construct every configured connector, in configuration order.
    ///
    /// The first unknown name or rejected `params` fails the whole call.
    pub fn connectors(&self) -> Result<Vec<Arc<dyn Connector>>> {
        self.config
            .connectors
            .iter()
            .map(|spec| {
                let connector = self.plugins.connectors.create(&spec.kind, spec.params.clone())?;
                Ok(Arc::from(connector))
            })
            .collect()
    }

    /// Construct the configured task builder.
    pub fn task_builder(&self) -> Result<Box<dyn TaskBuilder>> {
        let spec = &self.config.task_builder;
        self.plugins.task_builders.create(&spec.kind, spec.params.clone())
    }

    /// Extract, clean and segment everything the connectors produce.
    pub async fn ingest(
        &self,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestOutcome> {
        let connectors = self.connectors()?;
        ingest::ingest(connectors, &self.config.processing, cancel, progress).await
    }

    /// Run `builder` once over the full segment collection.
    ///
    /// The first failing example aborts the build.
    pub fn build_examples(
        &self,
        builder: &dyn TaskBuilder,
        segments: Vec<RawChunk>,
    ) -> Result<Vec<TrainingExample>> {
        debug!(
            builder = builder.name(),
            materialized = builder.requires_materialization(),
            segments = segments.len(),
            "building examples"
        );
        builder.build_examples(Box::new(segments.into_iter())).collect()
    }

    /// Run the whole pipeline without external cancellation.
    pub async fn run(
        &self,
        handoff: &dyn TrainingHandoff,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        self.run_with_cancel(CancellationToken::new(), handoff, progress)
            .await
    }

    /// Run the whole pipeline.
    ///
    /// 1. Construct connectors and task builder (fail fast, nothing extracted)
    /// 2. Ingest: extract, clean, segment
    /// 3. Build examples
    /// 4. Hand examples and training settings to `handoff`
    ///
    /// Cancelling `cancel` stops extraction; the run then fails with
    /// [`ForgeError::Cancelled`] and nothing is handed off.
    #[instrument(skip_all, fields(connectors = self.config.connectors.len(), task_builder = %self.config.task_builder.kind))]
    pub async fn run_with_cancel(
        &self,
        cancel: CancellationToken,
        handoff: &dyn TrainingHandoff,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::now_v7();

        info!(%run_id, "starting pipeline run");
        progress.phase(PipelineState::Initialized);

        // --- Phase 1: Plugins ---
        let connectors = self.connectors()?;
        let builder = self.task_builder()?;
        progress.phase(PipelineState::ConnectorsReady);

        // --- Phase 2: Extract → clean → segment ---
        let outcome =
            ingest::ingest(connectors, &self.config.processing, &cancel, progress).await?;
        if outcome.cancelled {
            return Err(ForgeError::Cancelled {
                chunks_extracted: outcome.stats.raw_chunks,
            });
        }
        progress.phase(PipelineState::ChunksExtracted);
        progress.phase(PipelineState::Cleaned);
        progress.phase(PipelineState::Chunked);

        let IngestOutcome {
            segments,
            stats,
            skipped,
            ..
        } = outcome;

        // --- Phase 3: Examples ---
        let examples = self.build_examples(builder.as_ref(), segments)?;
        progress.phase(PipelineState::ExamplesBuilt);

        if cancel.is_cancelled() {
            return Err(ForgeError::Cancelled {
                chunks_extracted: stats.raw_chunks,
            });
        }

        // --- Phase 4: Handoff ---
        let example_count = examples.len();
        let request = TrainingRequest::from_config(&self.config, run_id, started_at);
        let handoff_report = handoff.deliver(examples, &request)?;
        progress.phase(PipelineState::Delegated);

        let report = RunReport {
            run_id,
            stats,
            skipped,
            examples: example_count,
            elapsed: start.elapsed(),
            handoff: handoff_report,
        };

        info!(
            %run_id,
            examples = report.examples,
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline run complete"
        );
        progress.done(&report);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slmforge_shared::PluginSpec;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = PipelineConfig::example();
        config.processing.max_chars = 0;
        let err = Pipeline::new(config, Arc::new(PluginRegistry::with_builtins())).expect_err("invalid");
        assert!(matches!(err, ForgeError::Config { .. }));
    }

    #[test]
    fn unknown_connector_fails_construction() {
        let mut config = PipelineConfig::example();
        config.connectors = vec![PluginSpec::new("ftp-mirror", serde_json::Value::Null)];
        let pipeline = Pipeline::new(config, Arc::new(PluginRegistry::with_builtins())).expect("valid");

        let err = pipeline.connectors().err().expect("unknown");
        assert_eq!(err.to_string(), "unknown connector type: ftp-mirror");
    }

    #[test]
    fn unknown_task_builder_fails_construction() {
        let mut config = PipelineConfig::example();
        config.task_builder = PluginSpec::new("translation", serde_json::Value::Null);
        let pipeline = Pipeline::new(config, Arc::new(PluginRegistry::with_builtins())).expect("valid");
        assert!(matches!(pipeline.task_builder(), Err(ForgeError::UnknownPlugin { .. })));
    }

    #[test]
    fn state_labels() {
        assert_eq!(PipelineState::Initialized.to_string(), "initialized");
        assert_eq!(PipelineState::Delegated.to_string(), "delegated to training");
    }
}
