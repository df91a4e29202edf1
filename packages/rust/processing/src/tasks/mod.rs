//! Task builders: turn processed segments into supervised training pairs.
//!
//! Builders are looked up by name through a [`Registry`] and receive their
//! `params` table untyped; each one deserializes it into its own struct.

mod continuation;
mod summarization;

use slmforge_shared::{RawChunk, Registry, Result, TrainingExample};

pub use continuation::{ContinuationBuilder, ContinuationParams};
pub use summarization::{SummarizationBuilder, SummarizationParams};

/// Segments handed to a builder, in pipeline order.
pub type ChunkIter<'a> = Box<dyn Iterator<Item = RawChunk> + Send + 'a>;

/// Examples produced by a builder. An `Err` item aborts the run.
pub type ExampleIter<'a> = Box<dyn Iterator<Item = Result<TrainingExample>> + Send + 'a>;

/// Transforms a sequence of segments into training examples.
pub trait TaskBuilder: Send + Sync {
    /// Registered name, for tracing.
    fn name(&self) -> &str;

    /// Whether the builder needs the whole segment collection before it can
    /// emit anything (e.g. it groups or reorders across resources).
    fn requires_materialization(&self) -> bool {
        false
    }

    /// Build examples from `chunks`. Called once per run.
    fn build_examples<'a>(&'a self, chunks: ChunkIter<'a>) -> ExampleIter<'a>;
}

/// Register every built-in task builder under its configuration name.
pub fn register_builtin(registry: &Registry<dyn TaskBuilder>) {
    registry.register(SummarizationBuilder::NAME, |params| {
        Ok(Box::new(SummarizationBuilder::from_params(params)?) as Box<dyn TaskBuilder>)
    });
    registry.register(ContinuationBuilder::NAME, |params| {
        Ok(Box::new(ContinuationBuilder::from_params(params)?) as Box<dyn TaskBuilder>)
    });
}
