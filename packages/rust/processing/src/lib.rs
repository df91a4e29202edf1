//! Per-chunk transforms and task builders for slmforge.
//!
//! This crate provides:
//! - [`clean`]: flattens a chunk's text to one normalized line
//! - [`segment`]: splits a chunk into size-bounded segments
//! - [`TaskBuilder`]: turns segments into supervised training pairs
//!
//! Cleaning and segmenting are total; neither can fail.

mod chunker;
mod cleaner;
pub mod tasks;

pub use chunker::{CHUNK_IDX_KEY, Segments, parent_id, segment};
pub use cleaner::{clean, clean_text};
pub use tasks::{
    ChunkIter, ContinuationBuilder, ExampleIter, SummarizationBuilder, TaskBuilder,
    register_builtin,
};
