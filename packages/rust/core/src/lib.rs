//! Core pipeline orchestration for slmforge.
//!
//! This crate ties together the connectors, the clean/segment stages, the
//! task builders and the training handoff into one run (see [`Pipeline`]).

pub mod handoff;
pub mod ingest;
pub mod pipeline;
pub mod plugins;

pub use handoff::{DatasetWriter, DryRun, HandoffReport, TrainingHandoff, TrainingRequest};
pub use ingest::{IngestOutcome, IngestStats, SkippedResource};
pub use pipeline::{Pipeline, PipelineState, ProgressReporter, RunReport, SilentProgress};
pub use plugins::PluginRegistry;
